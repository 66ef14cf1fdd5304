pub mod app_config;
pub mod config;
pub mod intent;
pub mod page;
pub mod platform;
pub mod products;
pub mod retry;
pub mod sites;
pub mod snapshot;
#[cfg(any(test, feature = "test-support"))]
pub mod testing;
pub mod wait;

use thiserror::Error;

pub use app_config::{AppConfig, Environment};
pub use config::{load_app_config, load_app_config_from_env};
pub use intent::{find_brand, parse_intent, CheckoutMode, FilterKey, FilterValue, Intent, IntentError, Sort};
pub use page::{PageDriver, PageError};
pub use platform::Platform;
pub use products::{Availability, Product, ProductAttributes, ProductDetails};
pub use retry::{retry, RetryPolicy, Retriable};
pub use sites::{load_sites, SiteProfile, SitesFile};
pub use snapshot::{
    PageSnapshot, SnapshotButton, SnapshotFilter, SnapshotInput, SnapshotProduct, MAX_FILTER_OPTIONS,
};
pub use wait::{poll_until, wait_for_selector};

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid value for {var}: {reason}")]
    InvalidEnvVar { var: String, reason: String },

    #[error("failed to read sites file {path}: {source}")]
    SitesFileIo {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse sites file: {0}")]
    SitesFileParse(#[from] serde_yaml::Error),

    #[error("sites validation failed: {0}")]
    Validation(String),
}
