//! Applying filters to a live page and confirming they took effect.

use std::collections::BTreeMap;
use std::time::Duration;

use cartpilot_core::wait::count_matches;
use cartpilot_core::{
    poll_until, retry, AppConfig, FilterKey, FilterValue, PageDriver, RetryPolicy, SiteProfile,
};
use cartpilot_extract::count_products;
use serde::Serialize;

use crate::discovery::{discover_filters, FilterGroup, GroupKind};
use crate::error::FilterError;
use crate::matching::{find_group, match_element};
use crate::url_filters::{url_filters_confirmed, UrlFilterPlan};

/// Retries of the URL path before falling back to the sidebar.
pub const URL_FILTER_RETRIES: u32 = 3;

#[derive(Debug, Clone)]
pub struct FilterSettings {
    pub poll_interval: Duration,
    /// How long to wait for a URL or product-count change after each action.
    pub wait: Duration,
    pub url_retry: RetryPolicy,
}

impl Default for FilterSettings {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_millis(250),
            wait: Duration::from_millis(4000),
            url_retry: RetryPolicy {
                max_retries: URL_FILTER_RETRIES,
                ..RetryPolicy::default()
            },
        }
    }
}

impl FilterSettings {
    #[must_use]
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            poll_interval: Duration::from_millis(config.poll_interval_ms),
            wait: Duration::from_millis(config.filter_wait_ms),
            url_retry: config.action_retry_policy(URL_FILTER_RETRIES),
        }
    }

    #[allow(clippy::cast_possible_truncation)]
    fn wait_ms(&self) -> u64 {
        self.wait.as_millis() as u64
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AbandonedFilter {
    pub key: FilterKey,
    pub reason: String,
}

/// What happened to each requested filter.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FilterReport {
    pub via_url: Vec<FilterKey>,
    pub via_dom: Vec<FilterKey>,
    pub abandoned: Vec<AbandonedFilter>,
}

impl FilterReport {
    pub fn applied(&self) -> impl Iterator<Item = &FilterKey> {
        self.via_url.iter().chain(&self.via_dom)
    }

    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.abandoned.is_empty()
    }

    fn abandon(&mut self, key: &FilterKey, err: &FilterError) {
        tracing::warn!(filter = %key, error = %err, "filter abandoned");
        self.abandoned.push(AbandonedFilter {
            key: key.clone(),
            reason: err.to_string(),
        });
    }
}

#[derive(Debug, PartialEq, Eq)]
struct Observation {
    url: String,
    products: usize,
}

/// Applies filters to the page behind a [`PageDriver`].
pub struct FilterEngine<'a, D: ?Sized> {
    driver: &'a D,
    profile: &'a SiteProfile,
    settings: &'a FilterSettings,
}

impl<'a, D> FilterEngine<'a, D>
where
    D: PageDriver + ?Sized,
{
    pub fn new(driver: &'a D, profile: &'a SiteProfile, settings: &'a FilterSettings) -> Self {
        Self {
            driver,
            profile,
            settings,
        }
    }

    /// Applies `filters`, trying `plan` first when given. Never fails: each
    /// filter ends up applied through the URL, applied through the sidebar,
    /// or abandoned with a reason.
    pub async fn apply(
        &self,
        filters: &BTreeMap<FilterKey, FilterValue>,
        plan: Option<&UrlFilterPlan>,
    ) -> FilterReport {
        let mut report = FilterReport::default();
        // Key order puts brand first.
        let mut pending: Vec<(&FilterKey, &FilterValue)> = filters.iter().collect();

        if let Some(plan) = plan.filter(|p| !p.applied.is_empty()) {
            match self.apply_url_plan(plan).await {
                Ok(()) => {
                    tracing::info!(url = %plan.url, keys = ?plan.applied, "filters applied via url");
                    pending.retain(|(key, _)| !plan.applied.contains(key));
                    report.via_url.clone_from(&plan.applied);
                }
                Err(err) => {
                    tracing::warn!(error = %err, "url filters not confirmed, falling back to the sidebar");
                }
            }
        }

        let (prices, others): (Vec<_>, Vec<_>) =
            pending.into_iter().partition(|(key, _)| key.is_price());

        for (key, value) in others {
            match self.apply_one(key, value).await {
                Ok(()) => report.via_dom.push(key.clone()),
                Err(err) => report.abandon(key, &err),
            }
        }

        if !prices.is_empty() {
            let bound = |wanted: &FilterKey| {
                prices
                    .iter()
                    .find(|(key, _)| *key == wanted)
                    .and_then(|(_, value)| value.as_number())
            };
            let min = bound(&FilterKey::PriceMin);
            let max = bound(&FilterKey::PriceMax);
            match self.apply_price_range(min, max).await {
                Ok(()) => report.via_dom.extend(prices.iter().map(|(key, _)| (*key).clone())),
                Err(err) => {
                    for (key, _) in &prices {
                        report.abandon(key, &err);
                    }
                }
            }
        }

        report
    }

    /// Navigates to the filtered URL until one confirmation signal shows up,
    /// retrying with back-off.
    ///
    /// # Errors
    ///
    /// Returns the last [`FilterError`] once the retry budget is spent.
    pub async fn apply_url_plan(&self, plan: &UrlFilterPlan) -> Result<(), FilterError> {
        let before = self.observe().await?;
        let result = retry(&self.settings.url_retry, || self.navigate_and_confirm(plan, &before)).await;
        if result.is_err() && self.driver.current_url().await.ok().as_deref() != Some(before.url.as_str()) {
            // Leave the sidebar path an unfiltered page to work on.
            if let Err(err) = self.driver.navigate(&before.url).await {
                tracing::debug!(error = %err, "could not return to the unfiltered page");
            }
        }
        result
    }

    async fn navigate_and_confirm(&self, plan: &UrlFilterPlan, before: &Observation) -> Result<(), FilterError> {
        self.driver.navigate(&plan.url).await?;
        poll_until(self.settings.poll_interval, self.settings.wait, || {
            self.url_plan_took_effect(plan, before)
        })
        .await
        .ok_or_else(|| FilterError::VerificationTimeout {
            key: plan
                .applied
                .iter()
                .map(FilterKey::as_str)
                .collect::<Vec<_>>()
                .join(","),
            waited_ms: self.settings.wait_ms(),
        })
    }

    async fn url_plan_took_effect(&self, plan: &UrlFilterPlan, before: &Observation) -> Option<()> {
        let url = self.driver.current_url().await.ok()?;
        let html = self.driver.content().await.ok()?;
        let products = count_products(&html, Some(&url), self.profile);
        let clear_visible = self
            .profile
            .clear_filters
            .iter()
            .any(|selector| count_matches(&html, selector) > 0);
        url_filters_confirmed(plan, &url, before.products, products, clear_visible).then_some(())
    }

    /// Applies one filter through the sidebar.
    ///
    /// # Errors
    ///
    /// [`FilterError::NoMatchingGroup`] or [`FilterError::NoMatchingElement`]
    /// when the sidebar has nothing for the filter,
    /// [`FilterError::VerificationTimeout`] when neither a native nor a
    /// synthetic click changed the page.
    pub async fn apply_one(&self, key: &FilterKey, value: &FilterValue) -> Result<(), FilterError> {
        let groups = self.discover().await?;
        let group = find_group(&groups, key)
            .ok_or_else(|| FilterError::NoMatchingGroup(key.to_string()))?;
        let element = match_element(group, key, value).ok_or_else(|| FilterError::NoMatchingElement {
            key: key.to_string(),
            group: group.label.clone(),
            value: value.as_text(),
        })?;
        tracing::debug!(filter = %key, group = %group.label, option = %element.text, "matched filter option");

        let before = self.observe().await?;
        match self.driver.click(&element.selector).await {
            Ok(()) => {
                if self.changed_since(&before).await {
                    tracing::info!(filter = %key, option = %element.text, "filter applied");
                    return Ok(());
                }
                tracing::debug!(filter = %key, "native click had no visible effect, re-dispatching");
            }
            Err(err) => tracing::debug!(filter = %key, error = %err, "native click failed, re-dispatching"),
        }

        self.driver.dispatch_click(&element.selector).await?;
        if self.changed_since(&before).await {
            tracing::info!(filter = %key, option = %element.text, "filter applied by synthetic click");
            return Ok(());
        }
        Err(FilterError::VerificationTimeout {
            key: key.to_string(),
            waited_ms: self.settings.wait_ms(),
        })
    }

    /// Fills the price range inputs and submits them.
    async fn apply_price_range(&self, min: Option<f64>, max: Option<f64>) -> Result<(), FilterError> {
        let key = if max.is_some() {
            FilterKey::PriceMax
        } else {
            FilterKey::PriceMin
        };
        let ranges: Vec<FilterGroup> = self
            .discover()
            .await?
            .into_iter()
            .filter(|group| group.kind == GroupKind::Range)
            .collect();
        let [min_input, max_input] = find_group(&ranges, &key)
            .and_then(|group| group.inputs.clone())
            .ok_or_else(|| FilterError::NoMatchingGroup(key.to_string()))?;

        let before = self.observe().await?;
        if let Some(min) = min {
            self.driver.fill(&min_input, &format!("{min:.0}")).await?;
        }
        if let Some(max) = max {
            self.driver.fill(&max_input, &format!("{max:.0}")).await?;
        }
        let submit_on = if max.is_some() { &max_input } else { &min_input };
        self.driver.submit(submit_on).await?;

        if self.changed_since(&before).await {
            tracing::info!(?min, ?max, "price range applied");
            Ok(())
        } else {
            Err(FilterError::VerificationTimeout {
                key: key.to_string(),
                waited_ms: self.settings.wait_ms(),
            })
        }
    }

    async fn discover(&self) -> Result<Vec<FilterGroup>, FilterError> {
        let html = self.driver.content().await?;
        Ok(discover_filters(&html, self.profile))
    }

    async fn observe(&self) -> Result<Observation, FilterError> {
        let url = self.driver.current_url().await?;
        let html = self.driver.content().await?;
        let products = count_products(&html, Some(&url), self.profile);
        Ok(Observation { url, products })
    }

    async fn changed_since(&self, before: &Observation) -> bool {
        poll_until(self.settings.poll_interval, self.settings.wait, || {
            self.differs_from(before)
        })
        .await
        .is_some()
    }

    async fn differs_from(&self, before: &Observation) -> Option<()> {
        let now = self.observe().await.ok()?;
        (now.url != before.url || now.products != before.products).then_some(())
    }
}

#[cfg(test)]
#[path = "apply_test.rs"]
mod tests;
