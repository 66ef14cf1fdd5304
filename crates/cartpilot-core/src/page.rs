//! The seam between the agent and a live browser tab.
//!
//! Everything that touches the page goes through [`PageDriver`]. Reads return
//! owned data (the full HTML, the current URL) so that callers parse and
//! discard documents synchronously and never hold a DOM across an await.

use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;

use crate::retry::Retriable;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum PageError {
    #[error("no element matched selector '{0}'")]
    SelectorNotFound(String),

    #[error("element '{selector}' is not clickable: {reason}")]
    ElementNotClickable { selector: String, reason: String },

    #[error("timed out after {ms}ms waiting for {what}")]
    Timeout { what: String, ms: u64 },

    #[error("navigation to {url} failed: {reason}")]
    Navigation { url: String, reason: String },

    #[error("page script failed: {0}")]
    Script(String),

    #[error("page is closed")]
    Closed,
}

impl Retriable for PageError {
    fn is_transient(&self) -> bool {
        !matches!(self, PageError::Script(_) | PageError::Closed)
    }
}

/// A single browser tab.
///
/// Selectors are CSS selectors. `click` performs a native click, while
/// `dispatch_click` fires a synthetic `MouseEvent` for frameworks that ignore
/// native clicks.
#[async_trait]
pub trait PageDriver: Send + Sync {
    async fn current_url(&self) -> Result<String, PageError>;

    /// Serialized HTML of the whole document.
    async fn content(&self) -> Result<String, PageError>;

    async fn navigate(&self, url: &str) -> Result<(), PageError>;

    async fn click(&self, selector: &str) -> Result<(), PageError>;

    async fn dispatch_click(&self, selector: &str) -> Result<(), PageError>;

    /// Replaces the value of an input and fires `input` and `change` events.
    async fn fill(&self, selector: &str, value: &str) -> Result<(), PageError>;

    /// Submits the form owning `selector` (an Enter key press on the input).
    async fn submit(&self, selector: &str) -> Result<(), PageError>;
}

#[async_trait]
impl<T: PageDriver + ?Sized> PageDriver for Arc<T> {
    async fn current_url(&self) -> Result<String, PageError> {
        (**self).current_url().await
    }

    async fn content(&self) -> Result<String, PageError> {
        (**self).content().await
    }

    async fn navigate(&self, url: &str) -> Result<(), PageError> {
        (**self).navigate(url).await
    }

    async fn click(&self, selector: &str) -> Result<(), PageError> {
        (**self).click(selector).await
    }

    async fn dispatch_click(&self, selector: &str) -> Result<(), PageError> {
        (**self).dispatch_click(selector).await
    }

    async fn fill(&self, selector: &str, value: &str) -> Result<(), PageError> {
        (**self).fill(selector, value).await
    }

    async fn submit(&self, selector: &str) -> Result<(), PageError> {
        (**self).submit(selector).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_elements_and_timeouts_are_transient() {
        assert!(PageError::SelectorNotFound("#buy".into()).is_transient());
        assert!(PageError::Timeout {
            what: "results".into(),
            ms: 100
        }
        .is_transient());
        assert!(PageError::Navigation {
            url: "https://example.com".into(),
            reason: "net::ERR_CONNECTION_RESET".into()
        }
        .is_transient());
    }

    #[test]
    fn closed_page_and_script_errors_are_permanent() {
        assert!(!PageError::Closed.is_transient());
        assert!(!PageError::Script("SyntaxError".into()).is_transient());
    }
}
