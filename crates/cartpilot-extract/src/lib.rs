//! Turns noisy storefront markup into canonical [`Product`] values.
//!
//! Every entry point is synchronous and takes the page HTML as a string:
//! `scraper::Html` is `!Send`, so documents are parsed, read and dropped
//! without ever crossing an await point.
//!
//! [`Product`]: cartpilot_core::Product

pub mod attributes;
pub mod classify;
pub mod dom;
pub mod error;
pub mod extract;
pub mod links;
pub mod urls;

pub use attributes::{infer_attributes, parse_price, parse_rating, parse_review_count};
pub use classify::{classify, filter_products, Classification, ProductPartition};
pub use dom::{css_path, first_match};
pub use error::ExtractError;
pub use extract::{count_products, extract_details, extract_products, ExtractionReport};
pub use links::{resolve_link, LinkSource};
pub use urls::{normalize_link, page_origin};
