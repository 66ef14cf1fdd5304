use std::path::PathBuf;
use std::time::Duration;

use crate::retry::RetryPolicy;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Environment {
    Development,
    Test,
    Production,
}

impl std::fmt::Display for Environment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Environment::Development => write!(f, "development"),
            Environment::Test => write!(f, "test"),
            Environment::Production => write!(f, "production"),
        }
    }
}

#[derive(Clone)]
pub struct AppConfig {
    pub env: Environment,
    pub log_level: String,
    pub sites_path: PathBuf,
    pub gemini_api_key: Option<String>,
    pub llm_model: String,
    pub llm_timeout_secs: u64,
    pub llm_max_retries: u32,
    pub retry_initial_delay_ms: u64,
    pub retry_max_delay_ms: u64,
    pub action_timeout_ms: u64,
    pub filter_wait_ms: u64,
    pub poll_interval_ms: u64,
    pub snapshot_max_products: usize,
    pub headless: bool,
    pub chrome_path: Option<PathBuf>,
}

impl AppConfig {
    /// Retry policy for DOM waits and page actions.
    #[must_use]
    pub fn action_retry_policy(&self, max_retries: u32) -> RetryPolicy {
        RetryPolicy {
            max_retries,
            initial_delay_ms: self.retry_initial_delay_ms,
            max_delay_ms: self.retry_max_delay_ms,
            backoff_factor: 2.0,
            jitter: true,
        }
    }

    /// Retry policy for the language-model call path.
    #[must_use]
    pub fn llm_retry_policy(&self) -> RetryPolicy {
        self.action_retry_policy(self.llm_max_retries)
    }

    /// Longest one language-model call can take once every attempt has timed
    /// out and every back-off has been slept.
    #[must_use]
    pub fn llm_call_budget(&self) -> Duration {
        let retries = u64::from(self.llm_max_retries);
        let attempts = self
            .llm_timeout_secs
            .saturating_mul(1000)
            .saturating_mul(retries + 1);
        let backoff = self.retry_max_delay_ms.saturating_mul(retries);
        Duration::from_millis(attempts.saturating_add(backoff))
    }
}

impl std::fmt::Debug for AppConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppConfig")
            .field("env", &self.env)
            .field("log_level", &self.log_level)
            .field("sites_path", &self.sites_path)
            .field(
                "gemini_api_key",
                &self.gemini_api_key.as_ref().map(|_| "[redacted]"),
            )
            .field("llm_model", &self.llm_model)
            .field("llm_timeout_secs", &self.llm_timeout_secs)
            .field("llm_max_retries", &self.llm_max_retries)
            .field("retry_initial_delay_ms", &self.retry_initial_delay_ms)
            .field("retry_max_delay_ms", &self.retry_max_delay_ms)
            .field("action_timeout_ms", &self.action_timeout_ms)
            .field("filter_wait_ms", &self.filter_wait_ms)
            .field("poll_interval_ms", &self.poll_interval_ms)
            .field("snapshot_max_products", &self.snapshot_max_products)
            .field("headless", &self.headless)
            .field("chrome_path", &self.chrome_path)
            .finish()
    }
}
