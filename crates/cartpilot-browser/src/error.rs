use thiserror::Error;

#[derive(Debug, Error)]
pub enum BrowserError {
    #[error("invalid browser configuration: {0}")]
    Config(String),

    #[error("failed to launch browser: {0}")]
    Launch(String),

    #[error("failed to open a tab: {0}")]
    Tab(String),
}
