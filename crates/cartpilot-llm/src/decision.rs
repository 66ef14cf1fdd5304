//! Decoding a recovered JSON object into one concrete action.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::LlmError;
use crate::recovery::recover_json;

/// The single next step the model asks for.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum Decision {
    Click { selector: String },
    SelectProduct { index: usize },
    Input { selector: String, value: String },
    Completed,
    Error { message: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelDecision {
    #[serde(flatten)]
    pub decision: Decision,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reasoning: Option<String>,
}

const ACTION_FIELDS: &[&str] = &["action", "type", "decision"];
const SELECTOR_FIELDS: &[&str] = &["selector", "target", "element"];
const INDEX_FIELDS: &[&str] = &["index", "product_index", "productIndex"];
const VALUE_FIELDS: &[&str] = &["value", "text"];
const MESSAGE_FIELDS: &[&str] = &["message", "reason", "error"];
const REASONING_FIELDS: &[&str] = &["reasoning", "thought"];

fn field<'a>(object: &'a Map<String, Value>, names: &[&str]) -> Option<&'a Value> {
    names.iter().find_map(|name| object.get(*name))
}

fn text_field(object: &Map<String, Value>, names: &[&str]) -> Option<String> {
    field(object, names)
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_owned)
}

fn index_field(object: &Map<String, Value>) -> Option<usize> {
    match field(object, INDEX_FIELDS)? {
        Value::Number(n) => n.as_u64().and_then(|n| usize::try_from(n).ok()),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn normalize_action(raw: &str) -> String {
    raw.trim()
        .to_ascii_lowercase()
        .replace(['-', ' '], "_")
}

impl Decision {
    /// Reads a decision from a loosely shaped JSON object.
    ///
    /// Accepts `action`, `type` or `decision` as the verb, common aliases for
    /// each verb, and alternative field names for its arguments.
    ///
    /// # Errors
    ///
    /// Returns [`LlmError::InvalidDecision`] when the verb is missing or
    /// unknown, or a required argument is absent.
    pub fn from_value(object: &Map<String, Value>) -> Result<Self, LlmError> {
        let action = text_field(object, ACTION_FIELDS)
            .map(|raw| normalize_action(&raw))
            .ok_or_else(|| LlmError::InvalidDecision("missing action".to_owned()))?;

        let missing = |what: &str| LlmError::InvalidDecision(format!("{action} without {what}"));

        match action.as_str() {
            "click" | "click_element" | "press" | "tap" => Ok(Decision::Click {
                selector: text_field(object, SELECTOR_FIELDS).ok_or_else(|| missing("selector"))?,
            }),
            "select_product" | "select" | "choose_product" | "open_product" => {
                Ok(Decision::SelectProduct {
                    index: index_field(object).ok_or_else(|| missing("index"))?,
                })
            }
            "input" | "type_text" | "fill" | "enter_text" => Ok(Decision::Input {
                selector: text_field(object, SELECTOR_FIELDS).ok_or_else(|| missing("selector"))?,
                value: field(object, VALUE_FIELDS)
                    .and_then(Value::as_str)
                    .map(str::to_owned)
                    .ok_or_else(|| missing("value"))?,
            }),
            "completed" | "complete" | "done" | "finish" | "finished" => Ok(Decision::Completed),
            "error" | "fail" | "failed" | "abort" => Ok(Decision::Error {
                message: text_field(object, MESSAGE_FIELDS)
                    .unwrap_or_else(|| "model reported an error".to_owned()),
            }),
            other => Err(LlmError::InvalidDecision(format!("unknown action '{other}'"))),
        }
    }
}

impl ModelDecision {
    /// # Errors
    ///
    /// See [`Decision::from_value`].
    pub fn from_value(object: &Map<String, Value>) -> Result<Self, LlmError> {
        Ok(Self {
            decision: Decision::from_value(object)?,
            reasoning: text_field(object, REASONING_FIELDS),
        })
    }
}

/// Recovers and decodes a decision from raw model output.
///
/// # Errors
///
/// Returns [`LlmError::RecoveryParseExhausted`] when no JSON object can be
/// salvaged, or [`LlmError::InvalidDecision`] when the object is not a
/// decision.
pub fn parse_decision(text: &str) -> Result<ModelDecision, LlmError> {
    let object = recover_json(text)?;
    let decision = ModelDecision::from_value(&object)?;
    tracing::debug!(decision = ?decision.decision, "decoded model decision");
    Ok(decision)
}
