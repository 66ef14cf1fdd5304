use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ExtractError {
    #[error("no container selector matched a usable product (tried {tried:?})")]
    SelectorNotFound { tried: Vec<String> },

    #[error("invalid selector '{selector}': {reason}")]
    InvalidSelector { selector: String, reason: String },
}
