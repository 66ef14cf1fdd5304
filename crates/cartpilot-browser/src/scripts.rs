//! Page-side scripts for the actions CDP has no single command for.
//!
//! Every script is an IIFE returning `"ok"` or `"missing"`. Arguments are
//! embedded as JSON string literals.

/// Result a script returns when its element exists.
pub const FOUND: &str = "ok";
/// Result a script returns when `document.querySelector` came back empty.
pub const MISSING: &str = "missing";

fn literal(text: &str) -> String {
    serde_json::Value::from(text).to_string()
}

/// Fires a bubbling, cancelable `MouseEvent("click")` on the first match of
/// `selector`.
#[must_use]
pub fn dispatch_click(selector: &str) -> String {
    format!(
        r"(() => {{
  const el = document.querySelector({selector});
  if (!el) return {MISSING:?};
  el.dispatchEvent(new MouseEvent('click', {{ bubbles: true, cancelable: true, view: window }}));
  return {FOUND:?};
}})()",
        selector = literal(selector),
    )
}

/// Sets the value of the first match of `selector` through the native
/// setter, so framework-controlled inputs see the change, then fires `input`
/// and `change`.
#[must_use]
pub fn fill(selector: &str, value: &str) -> String {
    format!(
        r"(() => {{
  const el = document.querySelector({selector});
  if (!el) return {MISSING:?};
  el.focus();
  const proto = el instanceof HTMLTextAreaElement ? HTMLTextAreaElement.prototype
    : el instanceof HTMLSelectElement ? HTMLSelectElement.prototype
    : HTMLInputElement.prototype;
  const setter = Object.getOwnPropertyDescriptor(proto, 'value')?.set;
  if (setter) {{ setter.call(el, {value}); }} else {{ el.value = {value}; }}
  el.dispatchEvent(new Event('input', {{ bubbles: true }}));
  el.dispatchEvent(new Event('change', {{ bubbles: true }}));
  return {FOUND:?};
}})()",
        selector = literal(selector),
        value = literal(value),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn selectors_are_embedded_as_escaped_literals() {
        let script = dispatch_click(r#"a[data-filter="brand:Samsung"]"#);
        assert!(script.contains(r#"document.querySelector("a[data-filter=\"brand:Samsung\"]")"#));
        assert!(script.contains(r#"return "missing""#));
        assert!(script.contains("new MouseEvent('click'"));
    }

    #[test]
    fn fill_sets_value_and_fires_input_and_change() {
        let script = fill("#low-price", "10000");
        assert!(script.contains(r#"setter.call(el, "10000")"#));
        assert!(script.contains("new Event('input'"));
        assert!(script.contains("new Event('change'"));
    }

    #[test]
    fn values_cannot_break_out_of_the_literal() {
        let script = fill("#q", "\"); alert(1); (\"");
        assert!(script.contains(r#""\"); alert(1); (\"""#));
    }
}
