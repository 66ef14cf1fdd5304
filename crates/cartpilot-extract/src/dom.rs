//! Small DOM helpers shared by the extraction and filter engines.

use std::sync::LazyLock;

use regex::Regex;
use scraper::{ElementRef, Selector};

use crate::error::ExtractError;

static SIMPLE_ID: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z][A-Za-z0-9_-]*$").expect("valid regex"));

/// Evaluates `strategies` in order and returns the first result that is
/// `Some`. Later strategies are never evaluated once one succeeds.
pub fn first_match<S, T, F>(strategies: impl IntoIterator<Item = S>, attempt: F) -> Option<T>
where
    F: FnMut(S) -> Option<T>,
{
    strategies.into_iter().find_map(attempt)
}

/// Parses a CSS selector.
///
/// # Errors
///
/// Returns [`ExtractError::InvalidSelector`] if `selector` is not valid CSS.
pub fn parse_selector(selector: &str) -> Result<Selector, ExtractError> {
    Selector::parse(selector).map_err(|e| ExtractError::InvalidSelector {
        selector: selector.to_owned(),
        reason: e.to_string(),
    })
}

/// Like [`parse_selector`], but logs and skips invalid selectors. Selector
/// tables are configuration, so one bad entry must not disable the rest.
#[must_use]
pub fn compile(selector: &str) -> Option<Selector> {
    match parse_selector(selector) {
        Ok(parsed) => Some(parsed),
        Err(err) => {
            tracing::debug!(error = %err, "skipping selector");
            None
        }
    }
}

/// Collapses runs of whitespace into single spaces and trims.
#[must_use]
pub fn normalize_text(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Visible text of `element`, whitespace-collapsed.
#[must_use]
pub fn element_text(element: ElementRef<'_>) -> String {
    normalize_text(&element.text().collect::<Vec<_>>().join(" "))
}

/// First element under `scope` (or `scope` itself) matching any of
/// `selectors`, trying selectors in order.
#[must_use]
pub fn select_first<'a>(scope: ElementRef<'a>, selectors: &[String]) -> Option<ElementRef<'a>> {
    first_match(selectors, |selector| {
        let parsed = compile(selector)?;
        if parsed.matches(&scope) {
            return Some(scope);
        }
        scope.select(&parsed).next()
    })
}

/// Text of the first element matching any of `selectors` whose text is
/// non-empty.
#[must_use]
pub fn select_text(scope: ElementRef<'_>, selectors: &[String]) -> Option<String> {
    first_match(selectors, |selector| {
        let parsed = compile(selector)?;
        scope
            .select(&parsed)
            .map(element_text)
            .find(|text| !text.is_empty())
    })
}

/// `true` if `scope` or any descendant matches any of `selectors`.
#[must_use]
pub fn matches_any(scope: ElementRef<'_>, selectors: &[String]) -> bool {
    selectors.iter().filter_map(|s| compile(s)).any(|parsed| {
        parsed.matches(&scope) || scope.select(&parsed).next().is_some()
    })
}

/// Non-empty, trimmed attribute value.
#[must_use]
pub fn attr<'a>(element: ElementRef<'a>, name: &str) -> Option<&'a str> {
    element
        .value()
        .attr(name)
        .map(str::trim)
        .filter(|v| !v.is_empty())
}

/// A selector that identifies `element` within its document.
///
/// Uses `#id` when the element (or the nearest ancestor) has a simple id,
/// otherwise a `tag:nth-child(n)` chain rooted at `html`.
#[must_use]
pub fn css_path(element: ElementRef<'_>) -> String {
    let mut segments = Vec::new();
    let mut current = Some(element);

    while let Some(el) = current {
        if let Some(id) = attr(el, "id").filter(|id| SIMPLE_ID.is_match(id)) {
            segments.push(format!("#{id}"));
            break;
        }
        let tag = el.value().name();
        if tag == "html" {
            segments.push("html".to_owned());
            break;
        }
        let position = el
            .prev_siblings()
            .filter(|sibling| sibling.value().is_element())
            .count()
            + 1;
        segments.push(format!("{tag}:nth-child({position})"));
        current = el.parent().and_then(ElementRef::wrap);
    }

    segments.reverse();
    segments.join(" > ")
}
