//! The capability set the orchestrator drives, and its implementation over a
//! [`PageDriver`].
//!
//! Site differences live in two places: the selector tables of a
//! [`SiteProfile`] (pure configuration) and a small [`Storefront`] value for
//! the behaviour that is not expressible as selectors (search and sort URLs,
//! URL filters, overlays to dismiss).

use std::collections::BTreeMap;
use std::time::Duration;

use async_trait::async_trait;
use cartpilot_core::wait::count_matches;
use cartpilot_core::{
    wait_for_selector, AppConfig, FilterKey, FilterValue, PageDriver, PageSnapshot, Platform,
    Product, ProductDetails, SiteProfile, Sort,
};
use cartpilot_extract::{extract_details, extract_products, page_origin};
use cartpilot_filters::{filtered_url, FilterEngine, FilterSettings, UrlFilterPlan};

use crate::error::AdapterError;
use crate::snapshot::build_snapshot;

/// Everything the orchestrator can ask of one storefront tab.
///
/// Reads always re-read the live page. `search` and `apply_filters` never
/// fail: recoverable page problems are logged and reported as `false`.
#[async_trait]
pub trait PlatformAdapter: Send + Sync {
    fn platform(&self) -> Platform;

    async fn search(&self, query: &str, filters: &BTreeMap<FilterKey, FilterValue>, sort: Sort) -> bool;

    /// Products on the current page in presentation order. Empty when the
    /// page has none or cannot be read.
    async fn search_results(&self) -> Vec<Product>;

    /// Best-effort; `true` when every filter was applied.
    async fn apply_filters(&self, filters: &BTreeMap<FilterKey, FilterValue>) -> bool;

    /// Opens result `index` of the current page.
    ///
    /// # Errors
    ///
    /// [`AdapterError::IndexOutOfRange`] when the page has fewer results,
    /// [`AdapterError::MissingLink`] when the product has nowhere to go.
    async fn select_product(&self, index: usize) -> Result<Product, AdapterError>;

    /// # Errors
    ///
    /// [`AdapterError::ActionNotFound`] when no add-to-cart control exists.
    async fn add_to_cart(&self) -> Result<(), AdapterError>;

    /// # Errors
    ///
    /// [`AdapterError::ActionNotFound`] when no buy-now control exists.
    async fn buy_now(&self) -> Result<(), AdapterError>;

    /// # Errors
    ///
    /// Returns [`AdapterError::Page`] when the page cannot be read.
    async fn product_details(&self) -> Result<ProductDetails, AdapterError>;

    /// # Errors
    ///
    /// Returns [`AdapterError::Page`] when the page cannot be read.
    async fn page_snapshot(&self, max_products: usize) -> Result<PageSnapshot, AdapterError>;

    /// # Errors
    ///
    /// Returns [`AdapterError::Page`] when the click fails.
    async fn click(&self, selector: &str) -> Result<(), AdapterError>;

    /// Types `value` into `selector` and submits it.
    ///
    /// # Errors
    ///
    /// Returns [`AdapterError::Page`] when the input is missing.
    async fn input(&self, selector: &str, value: &str) -> Result<(), AdapterError>;
}

/// Per-site behaviour that selector tables cannot express.
pub trait Storefront: Send + Sync {
    fn platform(&self) -> Platform;

    /// Query parameter for a sort order, when the site has one.
    fn sort_param(&self, sort: Sort) -> Option<(&'static str, &'static str)>;

    /// Close buttons of overlays that block the page after navigation.
    fn overlays(&self) -> &'static [&'static str] {
        &[]
    }

    fn search_url(&self, profile: &SiteProfile, origin: Option<&str>, query: &str, sort: Sort) -> Option<String> {
        let url = profile.render_search_url(query, origin)?;
        Some(match self.sort_param(sort) {
            Some((key, value)) => {
                let separator = if url.contains('?') { '&' } else { '?' };
                format!("{url}{separator}{key}={value}")
            }
            None => url,
        })
    }

    fn filtered_url(&self, current: &str, filters: &BTreeMap<FilterKey, FilterValue>) -> Option<UrlFilterPlan> {
        filtered_url(self.platform(), current, filters)
    }
}

pub struct Amazon;
pub struct Flipkart;
pub struct Shopify;
pub struct Generic;

impl Storefront for Amazon {
    fn platform(&self) -> Platform {
        Platform::Amazon
    }

    fn sort_param(&self, sort: Sort) -> Option<(&'static str, &'static str)> {
        let value = match sort {
            Sort::Relevance => return None,
            Sort::PriceLowToHigh => "price-asc-rank",
            Sort::PriceHighToLow => "price-desc-rank",
            Sort::Rating => "review-rank",
            Sort::Newest => "date-desc-rank",
        };
        Some(("s", value))
    }
}

impl Storefront for Flipkart {
    fn platform(&self) -> Platform {
        Platform::Flipkart
    }

    fn sort_param(&self, sort: Sort) -> Option<(&'static str, &'static str)> {
        let value = match sort {
            Sort::Relevance => return None,
            Sort::PriceLowToHigh => "price_asc",
            Sort::PriceHighToLow => "price_desc",
            Sort::Rating => "popularity",
            Sort::Newest => "recency_desc",
        };
        Some(("sort", value))
    }

    fn overlays(&self) -> &'static [&'static str] {
        // Login prompt shown on first visit.
        &["button._2KpZ6l._2doB4z", "span._30XB9F"]
    }
}

impl Storefront for Shopify {
    fn platform(&self) -> Platform {
        Platform::Shopify
    }

    fn sort_param(&self, sort: Sort) -> Option<(&'static str, &'static str)> {
        let value = match sort {
            Sort::Relevance | Sort::Rating => return None,
            Sort::PriceLowToHigh => "price-ascending",
            Sort::PriceHighToLow => "price-descending",
            Sort::Newest => "created-descending",
        };
        Some(("sort_by", value))
    }
}

impl Storefront for Generic {
    fn platform(&self) -> Platform {
        Platform::Generic
    }

    fn sort_param(&self, _sort: Sort) -> Option<(&'static str, &'static str)> {
        None
    }
}

/// The storefront for `platform`.
#[must_use]
pub fn storefront(platform: Platform) -> Box<dyn Storefront> {
    match platform {
        Platform::Amazon => Box::new(Amazon),
        Platform::Flipkart => Box::new(Flipkart),
        Platform::Shopify => Box::new(Shopify),
        Platform::Generic => Box::new(Generic),
    }
}

#[derive(Debug, Clone)]
pub struct AdapterSettings {
    pub poll_interval: Duration,
    /// Upper bound on waiting for results after a search.
    pub action_timeout: Duration,
    pub filters: FilterSettings,
}

impl Default for AdapterSettings {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_millis(250),
            action_timeout: Duration::from_millis(15_000),
            filters: FilterSettings::default(),
        }
    }
}

impl AdapterSettings {
    #[must_use]
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            poll_interval: Duration::from_millis(config.poll_interval_ms),
            action_timeout: Duration::from_millis(config.action_timeout_ms),
            filters: FilterSettings::from_config(config),
        }
    }
}

/// [`PlatformAdapter`] over any [`PageDriver`].
pub struct StoreAdapter<D> {
    driver: D,
    storefront: Box<dyn Storefront>,
    profile: SiteProfile,
    settings: AdapterSettings,
}

impl<D: PageDriver> StoreAdapter<D> {
    pub fn new(driver: D, profile: SiteProfile, settings: AdapterSettings) -> Self {
        Self {
            driver,
            storefront: storefront(profile.platform),
            profile,
            settings,
        }
    }

    #[must_use]
    pub fn driver(&self) -> &D {
        &self.driver
    }

    #[must_use]
    pub fn profile(&self) -> &SiteProfile {
        &self.profile
    }

    async fn read_page(&self) -> Result<(String, String), AdapterError> {
        let url = self.driver.current_url().await?;
        let html = self.driver.content().await?;
        Ok((url, html))
    }

    async fn dismiss_overlays(&self) {
        let Ok(html) = self.driver.content().await else {
            return;
        };
        for selector in self.storefront.overlays() {
            if count_matches(&html, selector) > 0 {
                match self.driver.click(selector).await {
                    Ok(()) => tracing::debug!(selector, "dismissed overlay"),
                    Err(err) => tracing::debug!(selector, error = %err, "overlay did not close"),
                }
            }
        }
    }

    /// Types `query` into the first search box the page has.
    async fn search_in_page(&self, query: &str) -> Result<(), AdapterError> {
        let html = self.driver.content().await?;
        let input = self
            .profile
            .search_inputs
            .iter()
            .find(|selector| count_matches(&html, selector) > 0)
            .ok_or_else(|| AdapterError::SearchUnavailable("no search URL and no search box".to_owned()))?;
        self.driver.fill(input, query).await?;
        self.driver.submit(input).await?;
        Ok(())
    }

    async fn start_search(&self, query: &str, sort: Sort) -> Result<(), AdapterError> {
        let current = self.driver.current_url().await.ok();
        let origin = current.as_deref().and_then(page_origin);
        match self
            .storefront
            .search_url(&self.profile, origin.as_deref(), query, sort)
        {
            Some(url) => {
                tracing::info!(platform = %self.profile.platform, %url, "navigating to search results");
                self.driver.navigate(&url).await?;
            }
            None => {
                tracing::info!(platform = %self.profile.platform, "searching through the page's search box");
                self.search_in_page(query).await?;
            }
        }
        self.dismiss_overlays().await;
        Ok(())
    }

    async fn click_first(&self, action: &str, selectors: &[String]) -> Result<(), AdapterError> {
        let html = self.driver.content().await?;
        let mut last_error = None;
        for selector in selectors.iter().filter(|s| count_matches(&html, s) > 0) {
            match self.driver.click(selector).await {
                Ok(()) => {
                    tracing::info!(action, selector = %selector, "clicked purchase control");
                    return Ok(());
                }
                Err(err) => {
                    tracing::debug!(action, selector = %selector, error = %err, "purchase control click failed");
                    last_error = Some(err);
                }
            }
        }
        match last_error {
            Some(err) => Err(err.into()),
            None => Err(AdapterError::ActionNotFound {
                action: action.to_owned(),
                tried: selectors.to_vec(),
            }),
        }
    }
}

/// Puts the brand in front of the query unless the query already names it.
fn query_with_brand(query: &str, filters: &BTreeMap<FilterKey, FilterValue>) -> String {
    let Some(brand) = filters.get(&FilterKey::Brand).map(FilterValue::as_text) else {
        return query.to_owned();
    };
    let lower = query.to_lowercase();
    if lower.split_whitespace().any(|word| word == brand.to_lowercase()) {
        query.to_owned()
    } else {
        format!("{brand} {query}")
    }
}

#[async_trait]
impl<D: PageDriver> PlatformAdapter for StoreAdapter<D> {
    fn platform(&self) -> Platform {
        self.profile.platform
    }

    async fn search(&self, query: &str, filters: &BTreeMap<FilterKey, FilterValue>, sort: Sort) -> bool {
        let query = query_with_brand(query, filters);
        if let Err(err) = self.start_search(&query, sort).await {
            tracing::warn!(platform = %self.profile.platform, error = %err, "search failed");
            return false;
        }
        if let Err(err) = wait_for_selector(
            &self.driver,
            &self.profile.containers,
            self.settings.poll_interval,
            self.settings.action_timeout,
        )
        .await
        {
            // A results page with zero hits is still a completed search.
            tracing::debug!(error = %err, "no result containers appeared");
        }
        true
    }

    async fn search_results(&self) -> Vec<Product> {
        let (url, html) = match self.read_page().await {
            Ok(page) => page,
            Err(err) => {
                tracing::warn!(error = %err, "could not read results page");
                return Vec::new();
            }
        };
        match extract_products(&html, Some(&url), &self.profile) {
            Ok(report) => report.products,
            Err(err) => {
                tracing::debug!(error = %err, "no products extracted");
                Vec::new()
            }
        }
    }

    async fn apply_filters(&self, filters: &BTreeMap<FilterKey, FilterValue>) -> bool {
        let plan = match self.driver.current_url().await {
            Ok(current) => self.storefront.filtered_url(&current, filters),
            Err(err) => {
                tracing::warn!(error = %err, "could not read page url, skipping url filters");
                None
            }
        };
        let engine = FilterEngine::new(&self.driver, &self.profile, &self.settings.filters);
        let report = engine.apply(filters, plan.as_ref()).await;
        tracing::info!(
            via_url = ?report.via_url,
            via_dom = ?report.via_dom,
            abandoned = report.abandoned.len(),
            "filters processed"
        );
        report.is_complete()
    }

    async fn select_product(&self, index: usize) -> Result<Product, AdapterError> {
        let mut products = self.search_results().await;
        if index >= products.len() {
            return Err(AdapterError::IndexOutOfRange {
                index,
                available: products.len(),
            });
        }
        let product = products.swap_remove(index);
        if product.link.is_empty() {
            return Err(AdapterError::MissingLink {
                title: product.title,
            });
        }
        tracing::info!(index, title = %product.title, link = %product.link, "opening product");
        self.driver.navigate(&product.link).await?;
        self.dismiss_overlays().await;
        Ok(product)
    }

    async fn add_to_cart(&self) -> Result<(), AdapterError> {
        self.click_first("add to cart", &self.profile.add_to_cart).await
    }

    async fn buy_now(&self) -> Result<(), AdapterError> {
        self.click_first("buy now", &self.profile.buy_now).await
    }

    async fn product_details(&self) -> Result<ProductDetails, AdapterError> {
        let (url, html) = self.read_page().await?;
        Ok(extract_details(&html, &url, &self.profile))
    }

    async fn page_snapshot(&self, max_products: usize) -> Result<PageSnapshot, AdapterError> {
        let (url, html) = self.read_page().await?;
        Ok(build_snapshot(&html, &url, &self.profile, max_products))
    }

    async fn click(&self, selector: &str) -> Result<(), AdapterError> {
        self.driver.click(selector).await?;
        Ok(())
    }

    async fn input(&self, selector: &str, value: &str) -> Result<(), AdapterError> {
        self.driver.fill(selector, value).await?;
        self.driver.submit(selector).await?;
        Ok(())
    }
}

#[cfg(test)]
#[path = "adapter_test.rs"]
mod tests;
