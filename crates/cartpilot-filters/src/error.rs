use cartpilot_core::{PageError, Retriable};
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum FilterError {
    /// Neither a URL change nor a product-count change followed the action.
    #[error("filter '{key}' not confirmed within {waited_ms}ms")]
    VerificationTimeout { key: String, waited_ms: u64 },

    #[error("no filter group matches '{0}'")]
    NoMatchingGroup(String),

    #[error("no option in group '{group}' matches {key}={value}")]
    NoMatchingElement {
        key: String,
        group: String,
        value: String,
    },

    #[error(transparent)]
    Page(#[from] PageError),
}

impl Retriable for FilterError {
    fn is_transient(&self) -> bool {
        match self {
            FilterError::VerificationTimeout { .. } => true,
            FilterError::NoMatchingGroup(_) | FilterError::NoMatchingElement { .. } => false,
            FilterError::Page(err) => err.is_transient(),
        }
    }
}
