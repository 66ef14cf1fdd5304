//! Structured purchase intents and the free-text intent parser.
//!
//! An [`Intent`] is created once per user request and never mutated. The
//! parser is deliberately conservative: it only lifts out phrases it can
//! recognise with certainty (`"6gb ram"`, `"under 20k"`, `"on flipkart"`)
//! and leaves everything else in the product query.

use std::collections::BTreeMap;
use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::platform::Platform;

/// Brands recognised in intents and product titles, lowercase, matched as
/// whole words only.
pub const KNOWN_BRANDS: &[&str] = &[
    "samsung", "apple", "oneplus", "xiaomi", "redmi", "realme", "oppo", "vivo", "motorola",
    "nokia", "google", "iqoo", "poco", "infinix", "tecno", "nothing", "lava", "honor", "asus",
    "lenovo", "hp", "dell", "acer", "msi", "sony", "lg", "boat", "jbl", "noise", "philips",
    "nike", "adidas", "puma", "reebok", "microsoft", "huawei",
];

#[derive(Debug, Error, PartialEq, Eq)]
pub enum IntentError {
    #[error("intent has no product to search for")]
    EmptyQuery,

    #[error("unknown filter key '{0}'")]
    UnknownFilterKey(String),
}

/// What to do once the product page is open.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CheckoutMode {
    BuyNow,
    AddToCart,
    /// Stop at the product page.
    #[default]
    None,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Sort {
    #[default]
    Relevance,
    PriceLowToHigh,
    PriceHighToLow,
    Rating,
    Newest,
}

/// Filter dimensions the engine understands.
///
/// Declaration order is processing order: `Brand` sorts first because
/// narrowing by brand shrinks the site-side candidate set the most.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(into = "String", try_from = "String")]
pub enum FilterKey {
    Brand,
    Ram,
    Battery,
    Storage,
    Rating,
    Color,
    PriceMin,
    PriceMax,
    Other(String),
}

impl FilterKey {
    /// Numeric kinds are matched with at-least semantics.
    #[must_use]
    pub fn is_numeric_kind(&self) -> bool {
        matches!(self, FilterKey::Ram | FilterKey::Battery | FilterKey::Storage)
    }

    #[must_use]
    pub fn is_price(&self) -> bool {
        matches!(self, FilterKey::PriceMin | FilterKey::PriceMax)
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        match self {
            FilterKey::Brand => "brand",
            FilterKey::Ram => "ram",
            FilterKey::Battery => "battery",
            FilterKey::Storage => "storage",
            FilterKey::Rating => "rating",
            FilterKey::Color => "color",
            FilterKey::PriceMin => "price_min",
            FilterKey::PriceMax => "price_max",
            FilterKey::Other(name) => name,
        }
    }
}

impl std::fmt::Display for FilterKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for FilterKey {
    type Err = IntentError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let key = s.trim().to_ascii_lowercase().replace(['-', ' '], "_");
        Ok(match key.as_str() {
            "brand" | "make" => FilterKey::Brand,
            "ram" | "memory" => FilterKey::Ram,
            "battery" | "battery_capacity" | "mah" => FilterKey::Battery,
            "storage" | "rom" | "internal_storage" => FilterKey::Storage,
            "rating" | "stars" | "customer_rating" => FilterKey::Rating,
            "color" | "colour" => FilterKey::Color,
            "price_min" | "min_price" | "minprice" => FilterKey::PriceMin,
            "price_max" | "max_price" | "maxprice" | "budget" => FilterKey::PriceMax,
            "" => return Err(IntentError::UnknownFilterKey(s.to_owned())),
            _ => FilterKey::Other(key),
        })
    }
}

impl From<FilterKey> for String {
    fn from(key: FilterKey) -> Self {
        key.as_str().to_owned()
    }
}

impl TryFrom<String> for FilterKey {
    type Error = IntentError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

/// A requested filter value. Numbers arrive either typed (`6`) or as text
/// (`"6"`, `"6 GB"`); [`FilterValue::as_number`] accepts both.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FilterValue {
    Number(f64),
    Text(String),
}

impl FilterValue {
    /// Leading number of the value, if any.
    #[must_use]
    pub fn as_number(&self) -> Option<f64> {
        match self {
            FilterValue::Number(n) => Some(*n),
            FilterValue::Text(text) => leading_number(text),
        }
    }

    #[must_use]
    pub fn as_text(&self) -> String {
        match self {
            FilterValue::Number(n) if n.fract() == 0.0 => format!("{n:.0}"),
            FilterValue::Number(n) => n.to_string(),
            FilterValue::Text(text) => text.clone(),
        }
    }
}

impl From<&str> for FilterValue {
    fn from(value: &str) -> Self {
        FilterValue::Text(value.to_owned())
    }
}

impl From<f64> for FilterValue {
    fn from(value: f64) -> Self {
        FilterValue::Number(value)
    }
}

fn leading_number(text: &str) -> Option<f64> {
    static NUMBER: LazyLock<Regex> =
        LazyLock::new(|| Regex::new(r"\d[\d,]*(?:\.\d+)?").expect("valid number regex"));
    NUMBER
        .find(text)
        .and_then(|m| m.as_str().replace(',', "").parse().ok())
}

/// A user's shopping request in structured form.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Intent {
    pub product_query: String,
    pub platform_hint: Option<Platform>,
    #[serde(default)]
    pub filters: BTreeMap<FilterKey, FilterValue>,
    #[serde(default)]
    pub sort: Sort,
    #[serde(default)]
    pub checkout: CheckoutMode,
}

impl Intent {
    /// Creates an intent for `query` with no filters.
    ///
    /// # Errors
    ///
    /// Returns [`IntentError::EmptyQuery`] if `query` is blank.
    pub fn new(query: &str) -> Result<Self, IntentError> {
        let product_query = query.split_whitespace().collect::<Vec<_>>().join(" ");
        if product_query.is_empty() {
            return Err(IntentError::EmptyQuery);
        }
        Ok(Self {
            product_query,
            platform_hint: None,
            filters: BTreeMap::new(),
            sort: Sort::default(),
            checkout: CheckoutMode::default(),
        })
    }

    #[must_use]
    pub fn with_platform(mut self, platform: Platform) -> Self {
        self.platform_hint = Some(platform);
        self
    }

    #[must_use]
    pub fn with_filter(mut self, key: FilterKey, value: impl Into<FilterValue>) -> Self {
        self.filters.insert(key, value.into());
        self
    }

    #[must_use]
    pub fn with_checkout(mut self, checkout: CheckoutMode) -> Self {
        self.checkout = checkout;
        self
    }

    #[must_use]
    pub fn with_sort(mut self, sort: Sort) -> Self {
        self.sort = sort;
        self
    }

    /// Filters in processing order: brand first, then the remaining keys.
    #[must_use]
    pub fn ordered_filters(&self) -> Vec<(&FilterKey, &FilterValue)> {
        let mut ordered: Vec<_> = self.filters.iter().collect();
        ordered.sort_by_key(|(key, _)| (**key != FilterKey::Brand, (*key).clone()));
        ordered
    }

    #[must_use]
    pub fn has_filters(&self) -> bool {
        !self.filters.is_empty()
    }
}

// ---------------------------------------------------------------------------
// Free-text parsing
// ---------------------------------------------------------------------------

static PLATFORM_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\b(?:(?:on|from|at|in|via|using)\s+)?(amazon|flipkart|shopify)\b")
        .expect("valid platform regex")
});
static ADD_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\badd\b").expect("valid add regex"));
static CART_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\b(?:to\s+)?(?:my\s+|the\s+)?(?:cart|basket)\b").expect("valid cart regex")
});
static BUY_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\s*(?:please\s+)?(?:i\s+want\s+to\s+|i\s+wanna\s+)?(?:buy|order|purchase|checkout)\b")
        .expect("valid buy regex")
});
static RAM_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\b(\d{1,3})\s*gb\s*(?:of\s+)?(?:ram|memory)\b|\b(?:ram|memory)\s*(?:of\s+)?(\d{1,3})\s*gb\b")
        .expect("valid ram regex")
});
static STORAGE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\b(\d{1,4})\s*(gb|tb)\s*(?:of\s+)?(?:storage|rom|internal(?:\s+storage)?|ssd|hdd)\b")
        .expect("valid storage regex")
});
static BATTERY_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\b(\d{3,5})\s*mah(?:\s+battery)?\b|\bbattery\s*(?:of\s+)?(\d{3,5})\s*(?:mah)?\b")
        .expect("valid battery regex")
});
static RATING_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\b([1-5](?:\.\d)?)\s*\+?\s*(?:stars?|★)(?:\s*(?:&|and)\s*(?:above|up))?")
        .expect("valid rating regex")
});
static PRICE_MAX_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\b(?:under|below|less\s+than|within|upto|up\s+to|max(?:imum)?|budget(?:\s+of)?)\s*(?:rs\.?|inr|₹|\$)?\s*(\d[\d,]*(?:\.\d+)?)\s*(k)?\b")
        .expect("valid max price regex")
});
static PRICE_MIN_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\b(?:above|over|more\s+than|min(?:imum)?|at\s+least)\s*(?:rs\.?|inr|₹|\$)?\s*(\d[\d,]*(?:\.\d+)?)\s*(k)?\b")
        .expect("valid min price regex")
});
static COLOR_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\b(black|white|blue|red|green|silver|gold|grey|gray|purple|pink|yellow|orange)\b")
        .expect("valid color regex")
});
static FILLER_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\b(?:i\s+want\s+to|i\s+wanna|i\s+need|please|find|search\s+for|search|show\s+me|look\s+for|get\s+me|buy|order|purchase|checkout|me|a|an|the|with|having|and|for|of|that\s+has|which\s+has)\b|[,&+]")
        .expect("valid filler regex")
});

/// Parses a free-text request such as
/// `"buy a samsung phone with 6gb ram and 5000mah battery under 20k on flipkart"`
/// into an [`Intent`].
///
/// Brand and colour words are lifted into filters but also kept in the query,
/// since they are useful search terms on their own.
///
/// # Errors
///
/// Returns [`IntentError::EmptyQuery`] when nothing is left to search for
/// after the recognised phrases are removed.
pub fn parse_intent(text: &str) -> Result<Intent, IntentError> {
    let mut work = text.to_lowercase();
    let mut filters = BTreeMap::new();

    let checkout = if ADD_RE.is_match(&work) && CART_RE.is_match(&work) {
        work = CART_RE.replace_all(&work, " ").into_owned();
        work = ADD_RE.replace_all(&work, " ").into_owned();
        CheckoutMode::AddToCart
    } else if BUY_RE.is_match(&work) {
        CheckoutMode::BuyNow
    } else {
        CheckoutMode::None
    };

    let platform_hint = PLATFORM_RE
        .captures(&work)
        .and_then(|caps| caps.get(1))
        .and_then(|m| m.as_str().parse::<Platform>().ok());
    work = PLATFORM_RE.replace_all(&work, " ").into_owned();

    if let Some(caps) = RAM_RE.captures(&work) {
        if let Some(value) = caps.get(1).or_else(|| caps.get(2)) {
            filters.insert(FilterKey::Ram, FilterValue::Text(value.as_str().to_owned()));
        }
    }
    work = RAM_RE.replace_all(&work, " ").into_owned();

    if let Some(caps) = STORAGE_RE.captures(&work) {
        if let (Some(value), Some(unit)) = (caps.get(1), caps.get(2)) {
            let gb = value.as_str().parse::<u32>().unwrap_or(0)
                * if unit.as_str() == "tb" { 1024 } else { 1 };
            if gb > 0 {
                filters.insert(FilterKey::Storage, FilterValue::Text(gb.to_string()));
            }
        }
    }
    work = STORAGE_RE.replace_all(&work, " ").into_owned();

    if let Some(caps) = BATTERY_RE.captures(&work) {
        if let Some(value) = caps.get(1).or_else(|| caps.get(2)) {
            filters.insert(
                FilterKey::Battery,
                FilterValue::Text(value.as_str().to_owned()),
            );
        }
    }
    work = BATTERY_RE.replace_all(&work, " ").into_owned();

    // Rating before price: "4 stars & above" must not become a minimum price.
    if let Some(value) = RATING_RE.captures(&work).and_then(|caps| caps.get(1)) {
        filters.insert(FilterKey::Rating, FilterValue::Text(value.as_str().to_owned()));
    }
    work = RATING_RE.replace_all(&work, " ").into_owned();

    if let Some(amount) = PRICE_MAX_RE.captures(&work).and_then(|caps| price_amount(&caps)) {
        filters.insert(FilterKey::PriceMax, FilterValue::Number(amount));
    }
    work = PRICE_MAX_RE.replace_all(&work, " ").into_owned();

    if let Some(amount) = PRICE_MIN_RE.captures(&work).and_then(|caps| price_amount(&caps)) {
        filters.insert(FilterKey::PriceMin, FilterValue::Number(amount));
    }
    work = PRICE_MIN_RE.replace_all(&work, " ").into_owned();

    if let Some(color) = COLOR_RE.captures(&work).and_then(|caps| caps.get(1)) {
        filters.insert(FilterKey::Color, FilterValue::Text(color.as_str().to_owned()));
    }

    if let Some(brand) = find_brand(&work) {
        filters.insert(FilterKey::Brand, FilterValue::Text(brand.to_owned()));
    }

    let (sort, remainder) = take_sort(&work);
    work = remainder;

    let query = FILLER_RE.replace_all(&work, " ");
    let mut intent = Intent::new(&query)?;
    intent.platform_hint = platform_hint;
    intent.filters = filters;
    intent.sort = sort;
    intent.checkout = checkout;

    tracing::debug!(
        query = %intent.product_query,
        platform = ?intent.platform_hint,
        filters = intent.filters.len(),
        "parsed free-text intent"
    );
    Ok(intent)
}

fn price_amount(caps: &regex::Captures<'_>) -> Option<f64> {
    let raw = caps.get(1)?.as_str().replace(',', "");
    let value: f64 = raw.parse().ok()?;
    Some(if caps.get(2).is_some() {
        value * 1000.0
    } else {
        value
    })
}

/// Returns the first known brand appearing as a whole word in `lower`.
#[must_use]
pub fn find_brand(lower: &str) -> Option<&'static str> {
    lower
        .split(|c: char| !c.is_alphanumeric())
        .find_map(|word| KNOWN_BRANDS.iter().copied().find(|brand| *brand == word))
}

fn take_sort(work: &str) -> (Sort, String) {
    const PHRASES: &[(&str, Sort)] = &[
        ("lowest price", Sort::PriceLowToHigh),
        ("cheapest", Sort::PriceLowToHigh),
        ("low to high", Sort::PriceLowToHigh),
        ("highest price", Sort::PriceHighToLow),
        ("high to low", Sort::PriceHighToLow),
        ("most expensive", Sort::PriceHighToLow),
        ("best rated", Sort::Rating),
        ("top rated", Sort::Rating),
        ("highest rated", Sort::Rating),
        ("newest", Sort::Newest),
        ("latest", Sort::Newest),
    ];
    for (phrase, sort) in PHRASES {
        if let Some(pos) = work.find(phrase) {
            let mut rest = String::with_capacity(work.len());
            rest.push_str(&work[..pos]);
            rest.push(' ');
            rest.push_str(&work[pos + phrase.len()..]);
            return (*sort, rest);
        }
    }
    (Sort::Relevance, work.to_owned())
}

#[cfg(test)]
#[path = "intent_test.rs"]
mod tests;
