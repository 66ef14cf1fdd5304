//! Salvaging one JSON object from free-form model output.
//!
//! Strategies run in a fixed order and the first one that yields a JSON
//! object wins. Later strategies are progressively more forgiving, so an
//! earlier, stricter reading is always preferred.

use std::sync::LazyLock;

use regex::Regex;
use serde_json::{Map, Value};

use crate::error::LlmError;

static CODE_FENCE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"```[A-Za-z0-9_-]*").expect("valid regex"));
static GREEDY_OBJECT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)\{.*\}").expect("valid regex"));
static SHALLOW_OBJECT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\{[^{}]*\}").expect("valid regex"));
static GREEDY_ARRAY: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)\[.*\]").expect("valid regex"));
static TRAILING_COMMA: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r",\s*([}\]])").expect("valid regex"));
static UNQUOTED_KEY: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"([{,]\s*)([A-Za-z_][A-Za-z0-9_]*)\s*:"#).expect("valid regex")
});

type Strategy = fn(&str, &str) -> Option<Map<String, Value>>;

/// Strategies in evaluation order. Each receives the fence-stripped text and
/// the raw text.
const STRATEGIES: [(&str, Strategy); 7] = [
    ("direct", |clean, _| parse_object(clean)),
    ("greedy_span", |clean, _| greedy_span(clean).and_then(parse_object)),
    ("balanced_scan", |clean, _| balanced_span(clean).and_then(parse_object)),
    ("shallow_spans", |clean, _| {
        SHALLOW_OBJECT
            .find_iter(clean)
            .find_map(|m| parse_object(m.as_str()))
    }),
    ("repaired_span", |clean, _| {
        greedy_span(clean).and_then(|span| parse_object(&repair(span)))
    }),
    ("array", |clean, _| array_object(clean)),
    ("outer_braces", |_, raw| outer_braces(raw).and_then(parse_object)),
];

/// Recovers the first JSON object in `text`.
///
/// # Errors
///
/// Returns [`LlmError::RecoveryParseExhausted`] when `text` contains no `{` or
/// no strategy produces a JSON object.
pub fn recover_json(text: &str) -> Result<Map<String, Value>, LlmError> {
    if !text.contains('{') {
        return Err(LlmError::RecoveryParseExhausted);
    }
    let clean = strip_fences(text);
    for (name, strategy) in STRATEGIES {
        if let Some(object) = strategy(&clean, text) {
            tracing::debug!(strategy = name, "recovered JSON object");
            return Ok(object);
        }
    }
    tracing::warn!(chars = text.len(), "every JSON recovery strategy failed");
    Err(LlmError::RecoveryParseExhausted)
}

fn strip_fences(text: &str) -> String {
    CODE_FENCE.replace_all(text, "").trim().to_owned()
}

fn parse_object(text: &str) -> Option<Map<String, Value>> {
    match serde_json::from_str::<Value>(text.trim()) {
        Ok(Value::Object(map)) => Some(map),
        _ => None,
    }
}

fn greedy_span(text: &str) -> Option<&str> {
    GREEDY_OBJECT.find(text).map(|m| m.as_str())
}

/// The span from the first `{` to its matching `}`. Braces inside string
/// literals do not count.
fn balanced_span(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (offset, ch) in text[start..].char_indices() {
        if in_string {
            match ch {
                _ if escaped => escaped = false,
                '\\' => escaped = true,
                '"' => in_string = false,
                _ => {}
            }
            continue;
        }
        match ch {
            '"' => in_string = true,
            '{' => depth += 1,
            '}' => {
                depth = depth.saturating_sub(1);
                if depth == 0 {
                    return Some(&text[start..=start + offset]);
                }
            }
            _ => {}
        }
    }
    None
}

/// Fixes trailing commas, single-quoted strings and bare keys.
fn repair(span: &str) -> String {
    let fixed = TRAILING_COMMA.replace_all(span, "$1");
    let fixed = fixed.replace('\'', "\"");
    UNQUOTED_KEY.replace_all(&fixed, r#"$1"$2":"#).into_owned()
}

/// Reads an array: its first element if that is an object, otherwise the
/// whole array under `data`.
fn array_object(text: &str) -> Option<Map<String, Value>> {
    let span = GREEDY_ARRAY.find(text)?.as_str();
    let Ok(Value::Array(items)) = serde_json::from_str::<Value>(span) else {
        return None;
    };
    match items.first() {
        Some(Value::Object(first)) => Some(first.clone()),
        _ => {
            let mut wrapped = Map::new();
            wrapped.insert("data".to_owned(), Value::Array(items));
            Some(wrapped)
        }
    }
}

fn outer_braces(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let end = text.rfind('}')?;
    (end > start).then(|| &text[start..=end])
}
