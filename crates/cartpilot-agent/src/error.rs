use cartpilot_core::{PageError, Retriable};
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AdapterError {
    #[error("product index {index} is out of range ({available} results)")]
    IndexOutOfRange { index: usize, available: usize },

    #[error("product '{title}' has no navigable link")]
    MissingLink { title: String },

    /// Every candidate selector for a purchase control missed.
    #[error("no {action} control found (tried {tried:?})")]
    ActionNotFound { action: String, tried: Vec<String> },

    #[error("search could not be started: {0}")]
    SearchUnavailable(String),

    #[error(transparent)]
    Page(#[from] PageError),

    #[error(transparent)]
    Protocol(#[from] ProtocolError),
}

impl Retriable for AdapterError {
    fn is_transient(&self) -> bool {
        match self {
            AdapterError::Page(e) => e.is_transient(),
            AdapterError::IndexOutOfRange { .. }
            | AdapterError::MissingLink { .. }
            | AdapterError::ActionNotFound { .. }
            | AdapterError::SearchUnavailable(_)
            | AdapterError::Protocol(_) => false,
        }
    }
}

/// Failures of the orchestrator-to-page message channel.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    /// A second request was sent before the first one resolved.
    #[error("a request (id {in_flight}) is already in flight for this tab")]
    RequestInFlight { in_flight: u64 },

    #[error("reply id {got} does not match request id {expected}")]
    CorrelationMismatch { expected: u64, got: u64 },

    #[error("page context is gone")]
    Disconnected,

    #[error("no reply to {action} within {ms}ms")]
    Timeout { action: String, ms: u64 },

    #[error("{action} failed in the page context: {message}")]
    Failed { action: String, message: String },

    #[error("unexpected {got} reply to {action}")]
    UnexpectedReply { action: String, got: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_page_errors_can_be_transient() {
        assert!(AdapterError::Page(PageError::SelectorNotFound("#buy".into())).is_transient());
        assert!(!AdapterError::Page(PageError::Closed).is_transient());
        assert!(!AdapterError::IndexOutOfRange {
            index: 4,
            available: 2
        }
        .is_transient());
        assert!(!AdapterError::ActionNotFound {
            action: "buy now".into(),
            tried: vec![]
        }
        .is_transient());
    }
}
