//! Filter discovery, matching and application.
//!
//! Two paths exist. Platforms that expose filters as query parameters get a
//! rebuilt URL ([`url_filters`]), which is tried first. Everything else is
//! applied by clicking controls found in the page's filter sidebar
//! ([`discovery`], [`matching`], [`apply`]). Both paths are best-effort: a
//! filter that cannot be confirmed is logged and skipped.

pub mod apply;
pub mod discovery;
pub mod error;
pub mod matching;
pub mod post_filter;
pub mod url_filters;

pub use apply::{AbandonedFilter, FilterEngine, FilterReport, FilterSettings};
pub use discovery::{discover_filters, FilterElement, FilterGroup, GroupKind};
pub use error::FilterError;
pub use matching::{find_group, match_element, synonyms};
pub use post_filter::{retain_satisfying, satisfies};
pub use url_filters::{filtered_url, url_filters_confirmed, UrlFilterPlan};
