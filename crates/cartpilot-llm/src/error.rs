use cartpilot_core::Retriable;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum LlmError {
    /// Network or TLS failure from the underlying HTTP client.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// The API answered with a non-2xx status.
    #[error("language model API error ({status}): {message}")]
    Api { status: u16, message: String },

    #[error("language model returned no text")]
    EmptyResponse,

    #[error("invalid base URL '{url}': {reason}")]
    InvalidBaseUrl { url: String, reason: String },

    /// No recovery strategy produced a JSON object.
    #[error("no JSON object could be recovered from the model output")]
    RecoveryParseExhausted,

    #[error("invalid decision: {0}")]
    InvalidDecision(String),

    #[error("JSON deserialization error for {context}: {source}")]
    Deserialize {
        context: String,
        #[source]
        source: serde_json::Error,
    },
}

impl Retriable for LlmError {
    /// Timeouts, connection failures, rate limiting and 5xx responses.
    fn is_transient(&self) -> bool {
        match self {
            LlmError::Http(e) => {
                e.is_timeout() || e.is_connect() || e.status().is_some_and(|s| s.is_server_error())
            }
            LlmError::Api { status, .. } => *status == 429 || *status >= 500,
            LlmError::EmptyResponse
            | LlmError::InvalidBaseUrl { .. }
            | LlmError::RecoveryParseExhausted
            | LlmError::InvalidDecision(_)
            | LlmError::Deserialize { .. } => false,
        }
    }
}
