//! Filters expressed as query parameters.
//!
//! Building is pure: the current URL plus the requested filters give a new
//! URL and the decoded fragments that must survive into the page's final URL
//! for the filters to count as applied.

use std::collections::BTreeMap;

use cartpilot_core::{FilterKey, FilterValue, Platform};
use serde::Serialize;
use url::Url;

/// Flipkart's RAM facet buckets below its open-ended top bucket.
const FLIPKART_RAM_BUCKETS: &[u32] = &[1, 2, 3, 4];
const FLIPKART_RAM_TOP: &str = "6 GB & Above";
const FLIPKART_BATTERY_BUCKETS: &[u32] = &[1000, 2000, 3000, 4000, 5000];
const FLIPKART_BATTERY_TOP: &str = "6000 mAh & Above";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UrlFilterPlan {
    pub url: String,
    /// Decoded `key=value` fragments expected in the resulting URL.
    pub signatures: Vec<String>,
    /// Keys this URL expresses.
    pub applied: Vec<FilterKey>,
    /// Keys left for the sidebar.
    pub unsupported: Vec<FilterKey>,
}

#[derive(Default)]
struct Params {
    /// Existing query keys to drop before appending.
    replaces: Vec<String>,
    pairs: Vec<(String, String)>,
    signatures: Vec<String>,
    applied: Vec<FilterKey>,
    unsupported: Vec<FilterKey>,
}

impl Params {
    fn push(&mut self, key: &str, value: String) {
        self.signatures.push(format!("{key}={value}"));
        self.pairs.push((key.to_owned(), value));
    }
}

/// Builds the filtered form of `current` for `platform`.
///
/// Returns `None` for platforms without URL filters, for an unparsable URL,
/// or when none of the requested filters can be expressed.
#[must_use]
pub fn filtered_url(
    platform: Platform,
    current: &str,
    filters: &BTreeMap<FilterKey, FilterValue>,
) -> Option<UrlFilterPlan> {
    let mut url = Url::parse(current).ok()?;
    let params = match platform {
        Platform::Amazon => amazon(&url, filters),
        Platform::Flipkart => flipkart(filters),
        Platform::Shopify => shopify(filters),
        Platform::Generic => return None,
    };
    if params.applied.is_empty() {
        return None;
    }

    let kept: Vec<(String, String)> = url
        .query_pairs()
        .into_owned()
        .filter(|(key, value)| {
            !params.replaces.contains(key)
                && !params.pairs.iter().any(|(k, v)| k == key && v == value)
        })
        .collect();
    url.query_pairs_mut()
        .clear()
        .extend_pairs(kept.iter())
        .extend_pairs(params.pairs.iter());

    Some(UrlFilterPlan {
        url: url.into(),
        signatures: params.signatures,
        applied: params.applied,
        unsupported: params.unsupported,
    })
}

/// Whether navigating to `plan.url` took effect. Any one signal suffices: all
/// signatures present in `url`, a changed non-zero product count, or a visible
/// clear-filters control.
#[must_use]
pub fn url_filters_confirmed(
    plan: &UrlFilterPlan,
    url: &str,
    products_before: usize,
    products_after: usize,
    clear_filters_visible: bool,
) -> bool {
    signatures_present(&plan.signatures, url)
        || (products_after > 0 && products_after != products_before)
        || clear_filters_visible
}

fn signatures_present(signatures: &[String], url: &str) -> bool {
    let Ok(parsed) = Url::parse(url) else {
        return false;
    };
    let decoded: Vec<String> = parsed
        .query_pairs()
        .map(|(key, value)| format!("{key}={value}"))
        .collect();
    let decoded = decoded.join("&");
    !signatures.is_empty() && signatures.iter().all(|sig| decoded.contains(sig.as_str()))
}

fn title_case(text: &str) -> String {
    text.split_whitespace()
        .map(|word| {
            let mut chars = word.chars();
            chars.next().map_or_else(String::new, |first| {
                first.to_uppercase().chain(chars.flat_map(char::to_lowercase)).collect()
            })
        })
        .collect::<Vec<_>>()
        .join(" ")
}

fn price_bounds(filters: &BTreeMap<FilterKey, FilterValue>) -> (Option<f64>, Option<f64>) {
    let bound = |key: &FilterKey| filters.get(key).and_then(FilterValue::as_number);
    (bound(&FilterKey::PriceMin), bound(&FilterKey::PriceMax))
}

#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn whole(amount: f64) -> u64 {
    amount.max(0.0).round() as u64
}

/// Amazon folds every refinement into one comma-separated `rh` parameter;
/// price bounds are in the smallest currency unit.
fn amazon(current: &Url, filters: &BTreeMap<FilterKey, FilterValue>) -> Params {
    let mut params = Params {
        replaces: vec!["rh".to_owned()],
        ..Params::default()
    };
    let mut clauses: Vec<String> = Vec::new();

    for (key, value) in filters {
        match key {
            FilterKey::Brand => {
                clauses.push(format!("p_89:{}", title_case(&value.as_text())));
                params.applied.push(key.clone());
            }
            FilterKey::PriceMin | FilterKey::PriceMax => {}
            _ => params.unsupported.push(key.clone()),
        }
    }

    let (min, max) = price_bounds(filters);
    if min.is_some() || max.is_some() {
        let paise = |v: Option<f64>| v.map(|v| (whole(v) * 100).to_string()).unwrap_or_default();
        clauses.push(format!("p_36:{}-{}", paise(min), paise(max)));
        params.applied.extend(
            [FilterKey::PriceMin, FilterKey::PriceMax]
                .into_iter()
                .filter(|key| filters.contains_key(key)),
        );
    }
    if clauses.is_empty() {
        return params;
    }

    let ours = |clause: &str| clause.starts_with("p_89:") || clause.starts_with("p_36:");
    let mut rh: Vec<String> = current
        .query_pairs()
        .filter(|(key, _)| key == "rh")
        .flat_map(|(_, value)| {
            value
                .split(',')
                .filter(|clause| !clause.is_empty() && !ours(*clause))
                .map(str::to_owned)
                .collect::<Vec<_>>()
        })
        .collect();
    params.signatures.clone_from(&clauses);
    rh.extend(clauses);
    params.pairs.push(("rh".to_owned(), rh.join(",")));
    params
}

fn facet(params: &mut Params, name: &str, value: &str) {
    params.push("p[]", format!("facets.{name}[]={value}"));
}

/// Flipkart takes one `p[]` parameter per facet value and ORs values within a
/// facet, so at-least requests expand to every bucket at or above the value.
fn flipkart(filters: &BTreeMap<FilterKey, FilterValue>) -> Params {
    let mut params = Params::default();
    for (key, value) in filters {
        match (key, value.as_number()) {
            (FilterKey::Brand, _) => facet(&mut params, "brand", &title_case(&value.as_text())),
            (FilterKey::Color, _) => facet(&mut params, "color", &title_case(&value.as_text())),
            (FilterKey::Ram, Some(gb)) => {
                for bucket in FLIPKART_RAM_BUCKETS.iter().filter(|b| f64::from(**b) >= gb) {
                    facet(&mut params, "ram", &format!("{bucket} GB"));
                }
                facet(&mut params, "ram", FLIPKART_RAM_TOP);
            }
            (FilterKey::Battery, Some(mah)) => {
                for low in FLIPKART_BATTERY_BUCKETS.iter().filter(|low| f64::from(**low + 999) >= mah) {
                    facet(&mut params, "battery_capacity", &format!("{low} - {} mAh", low + 999));
                }
                facet(&mut params, "battery_capacity", FLIPKART_BATTERY_TOP);
            }
            (FilterKey::Rating, Some(stars)) => {
                #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
                let stars = stars.floor().clamp(1.0, 4.0) as u8;
                facet(&mut params, "rating", &format!("{stars}★ & above"));
            }
            (FilterKey::PriceMin | FilterKey::PriceMax, _) => continue,
            _ => {
                params.unsupported.push(key.clone());
                continue;
            }
        }
        params.applied.push(key.clone());
    }

    let (min, max) = price_bounds(filters);
    if min.is_some() || max.is_some() {
        let from = min.map_or_else(|| "Min".to_owned(), |v| whole(v).to_string());
        let to = max.map_or_else(|| "Max".to_owned(), |v| whole(v).to_string());
        params.push("p[]", format!("facets.price_range.from={from}"));
        params.push("p[]", format!("facets.price_range.to={to}"));
        params.applied.extend(
            [FilterKey::PriceMin, FilterKey::PriceMax]
                .into_iter()
                .filter(|key| filters.contains_key(key)),
        );
    }
    params
}

/// Shopify storefront filters (`filter.p.*` product fields, `filter.v.*`
/// variant fields).
fn shopify(filters: &BTreeMap<FilterKey, FilterValue>) -> Params {
    let mut params = Params::default();
    for (key, value) in filters {
        let (name, rendered) = match key {
            FilterKey::Brand => ("filter.p.vendor", title_case(&value.as_text())),
            FilterKey::Color => ("filter.v.option.color", title_case(&value.as_text())),
            FilterKey::PriceMin | FilterKey::PriceMax => {
                let Some(amount) = value.as_number() else {
                    params.unsupported.push(key.clone());
                    continue;
                };
                let name = if *key == FilterKey::PriceMin {
                    "filter.v.price.gte"
                } else {
                    "filter.v.price.lte"
                };
                (name, whole(amount).to_string())
            }
            _ => {
                params.unsupported.push(key.clone());
                continue;
            }
        };
        params.replaces.push(name.to_owned());
        params.push(name, rendered);
        params.applied.push(key.clone());
    }
    params
}
