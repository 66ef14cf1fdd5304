//! Attribute inference and numeric parsing for product listings.
//!
//! Everything here works on display text. An attribute that cannot be read
//! with confidence is `None`, never a zero.

use std::sync::LazyLock;

use cartpilot_core::{find_brand, ProductAttributes};
use regex::Regex;

static BATTERY: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\b(\d{3,5})\s*mah\b").expect("valid regex"));

static RAM: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)\b(\d{1,3})\s*gb\s*(?:of\s+)?(?:lpddr\d*x?\s+|ddr\d*\s+)?(?:ram|memory)\b|\b(?:ram|memory)\s*[:\-]?\s*(\d{1,3})\s*gb\b",
    )
    .expect("valid regex")
});

static STORAGE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)\b(\d{1,4})\s*(gb|tb)\s*(?:of\s+)?(?:internal\s+)?(?:storage|rom|ssd|hdd|emmc|ufs)\b|\b(?:storage|rom|ssd|hdd)\s*[:\-]?\s*(\d{1,4})\s*(gb|tb)\b",
    )
    .expect("valid regex")
});

/// `"6GB+128GB"`, `"8 GB / 256 GB"`, `"6GB, 128GB Storage"`: the smaller
/// figure is RAM, the larger is storage.
static MEMORY_PAIR: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(\d{1,2})\s*gb\s*[,/+|]\s*(\d{2,4})\s*(gb|tb)\b").expect("valid regex")
});

static NUMBER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\d[\d,]*(?:\.\d+)?").expect("valid regex"));

static RATING: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b(\d(?:\.\d+)?)\b").expect("valid regex"));

static COUNT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)(\d[\d,]*(?:\.\d+)?)\s*([km])?\b").expect("valid regex"));

/// Infers battery, RAM, storage and brand from a product title.
#[must_use]
pub fn infer_attributes(title: &str) -> ProductAttributes {
    let lower = title.to_lowercase();

    let battery_mah = BATTERY
        .captures(&lower)
        .and_then(|caps| caps.get(1))
        .and_then(|m| m.as_str().parse().ok());

    let mut ram_gb = RAM
        .captures(&lower)
        .and_then(|caps| caps.get(1).or_else(|| caps.get(2)))
        .and_then(|m| m.as_str().parse().ok());

    let mut storage_gb = STORAGE.captures(&lower).and_then(|caps| {
        let (value, unit) = match (caps.get(1), caps.get(2)) {
            (Some(value), Some(unit)) => (value, unit),
            _ => (caps.get(3)?, caps.get(4)?),
        };
        to_gigabytes(value.as_str(), unit.as_str())
    });

    if ram_gb.is_none() || storage_gb.is_none() {
        if let Some(caps) = MEMORY_PAIR.captures(&lower) {
            let small: Option<u32> = caps.get(1).and_then(|m| m.as_str().parse().ok());
            let large = match (caps.get(2), caps.get(3)) {
                (Some(value), Some(unit)) => to_gigabytes(value.as_str(), unit.as_str()),
                _ => None,
            };
            if let (Some(small), Some(large)) = (small, large) {
                if small < large {
                    ram_gb = ram_gb.or(Some(small));
                    storage_gb = storage_gb.or(Some(large));
                }
            }
        }
    }

    ProductAttributes {
        battery_mah,
        ram_gb,
        storage_gb,
        brand: find_brand(&lower).map(str::to_owned),
    }
}

fn to_gigabytes(value: &str, unit: &str) -> Option<u32> {
    let value: u32 = value.parse().ok()?;
    if unit.eq_ignore_ascii_case("tb") {
        value.checked_mul(1024)
    } else {
        Some(value)
    }
}

/// Parses a displayed price such as `"₹12,999"`, `"Rs. 499"` or `"$1,299.99"`.
#[must_use]
pub fn parse_price(text: &str) -> Option<f64> {
    NUMBER
        .find(text)
        .and_then(|m| m.as_str().replace(',', "").parse().ok())
        .filter(|price: &f64| price.is_finite() && *price >= 0.0)
}

/// Parses a star rating such as `"4.2 out of 5 stars"` or `"4.2"`. Values
/// outside `0..=5` are rejected.
#[must_use]
pub fn parse_rating(text: &str) -> Option<f64> {
    RATING
        .captures(text)
        .and_then(|caps| caps.get(1))
        .and_then(|m| m.as_str().parse().ok())
        .filter(|rating: &f64| (0.0..=5.0).contains(rating))
}

/// Parses a rating/review count such as `"(1,204)"`, `"2.3K ratings"` or
/// `"1,204 Ratings & 98 Reviews"` (the first figure wins).
#[must_use]
pub fn parse_review_count(text: &str) -> Option<u64> {
    let caps = COUNT.captures(text)?;
    let value: f64 = caps.get(1)?.as_str().replace(',', "").parse().ok()?;
    let multiplier = match caps.get(2).map(|m| m.as_str().to_ascii_lowercase()) {
        Some(suffix) if suffix == "k" => 1_000.0,
        Some(suffix) if suffix == "m" => 1_000_000.0,
        _ => 1.0,
    };
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    Some((value * multiplier).round() as u64)
}
