//! Post-filtering of extracted products against numeric thresholds.
//!
//! Site-side filters are lower-bound brackets and sometimes ignored, so the
//! product list is checked again. Unknown attributes never disqualify.

use std::collections::BTreeMap;

use cartpilot_core::{FilterKey, FilterValue, Product};

fn at_least(known: Option<u32>, requested: f64) -> bool {
    known.is_none_or(|value| f64::from(value) >= requested)
}

/// Whether nothing known about `product` contradicts `filters`.
#[must_use]
pub fn satisfies(product: &Product, filters: &BTreeMap<FilterKey, FilterValue>) -> bool {
    filters.iter().all(|(key, value)| {
        let Some(requested) = value.as_number() else {
            return true;
        };
        match key {
            FilterKey::Ram => at_least(product.attributes.ram_gb, requested),
            FilterKey::Battery => at_least(product.attributes.battery_mah, requested),
            FilterKey::Storage => at_least(product.attributes.storage_gb, requested),
            FilterKey::Rating => product.rating.is_none_or(|r| r >= requested),
            FilterKey::PriceMin => product.price_numeric.is_none_or(|p| p >= requested),
            FilterKey::PriceMax => product.price_numeric.is_none_or(|p| p <= requested),
            _ => true,
        }
    })
}

/// Keeps the products that satisfy `filters`, preserving order.
#[must_use]
pub fn retain_satisfying(products: Vec<Product>, filters: &BTreeMap<FilterKey, FilterValue>) -> Vec<Product> {
    let before = products.len();
    let kept: Vec<Product> = products
        .into_iter()
        .filter(|product| satisfies(product, filters))
        .collect();
    if kept.len() < before {
        tracing::debug!(
            dropped = before - kept.len(),
            kept = kept.len(),
            "dropped products contradicting filters"
        );
    }
    kept
}

#[cfg(test)]
mod tests {
    use cartpilot_core::{Availability, ProductAttributes};

    use super::*;

    fn phone(title: &str, ram: Option<u32>, battery: Option<u32>, price: Option<f64>) -> Product {
        Product {
            title: title.to_string(),
            price_text: String::new(),
            price_numeric: price,
            link: format!("https://shop.test/p/{title}"),
            image: None,
            rating: None,
            reviews: None,
            attributes: ProductAttributes {
                ram_gb: ram,
                battery_mah: battery,
                ..ProductAttributes::default()
            },
            sponsored: false,
            availability: Availability::InStock,
        }
    }

    fn wanted() -> BTreeMap<FilterKey, FilterValue> {
        [
            (FilterKey::Ram, FilterValue::from("6")),
            (FilterKey::Battery, FilterValue::Number(5000.0)),
            (FilterKey::Brand, FilterValue::from("samsung")),
            (FilterKey::PriceMax, FilterValue::Number(20_000.0)),
        ]
        .into_iter()
        .collect()
    }

    #[test]
    fn drops_known_contradictions_only() {
        let products = vec![
            phone("ok", Some(8), Some(6000), Some(18_999.0)),
            phone("low-ram", Some(4), Some(6000), None),
            phone("small-battery", Some(6), Some(4000), None),
            phone("unknown", None, None, None),
            phone("pricey", Some(8), Some(5000), Some(24_999.0)),
        ];
        let kept: Vec<String> = retain_satisfying(products, &wanted())
            .into_iter()
            .map(|p| p.title)
            .collect();
        assert_eq!(kept, vec!["ok".to_string(), "unknown".to_string()]);
    }

    #[test]
    fn text_only_filters_never_disqualify() {
        let filters: BTreeMap<_, _> = [(FilterKey::Color, FilterValue::from("black"))]
            .into_iter()
            .collect();
        assert!(satisfies(&phone("x", Some(1), None, None), &filters));
    }
}
