use serde::{Deserialize, Serialize};

/// A product listing scraped from a search-results page, normalized so that
/// results from different storefronts compare directly.
///
/// Products are values: every extraction pass produces fresh ones and nothing
/// mutates them afterwards. `link` is the only identity a product has.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Product {
    /// Never empty for a product that survived extraction.
    pub title: String,
    /// Price exactly as displayed, e.g. `"₹12,999"`.
    pub price_text: String,
    /// `price_text` parsed to a number, when it contains one.
    pub price_numeric: Option<f64>,
    /// Absolute `http(s)` URL of the product page, with redirect wrappers removed.
    pub link: String,
    pub image: Option<String>,
    /// Star rating on a 0–5 scale.
    pub rating: Option<f64>,
    /// Number of ratings/reviews.
    pub reviews: Option<u64>,
    pub attributes: ProductAttributes,
    pub sponsored: bool,
    pub availability: Availability,
}

impl Product {
    /// Returns `true` if the product can be bought right now.
    #[must_use]
    pub fn is_purchasable(&self) -> bool {
        matches!(
            self.availability,
            Availability::InStock | Availability::Limited | Availability::Unknown
        )
    }
}

/// Attributes inferred from a product title. Absent means "not stated",
/// never zero.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProductAttributes {
    pub battery_mah: Option<u32>,
    pub ram_gb: Option<u32>,
    /// Storage normalized to gigabytes (`1 TB` → `1024`).
    pub storage_gb: Option<u32>,
    pub brand: Option<String>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Availability {
    InStock,
    OutOfStock,
    /// "Only 3 left" style low-stock notices.
    Limited,
    #[default]
    Unknown,
}

/// Summary of the currently open product page.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProductDetails {
    pub title: String,
    pub price: String,
    pub url: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_product(availability: Availability) -> Product {
        Product {
            title: "Samsung Galaxy M34 5G (6GB RAM, 128GB Storage)".to_string(),
            price_text: "₹16,999".to_string(),
            price_numeric: Some(16_999.0),
            link: "https://www.amazon.in/dp/B0C7Q6ZQ7Z".to_string(),
            image: None,
            rating: Some(4.1),
            reviews: Some(1_204),
            attributes: ProductAttributes::default(),
            sponsored: false,
            availability,
        }
    }

    #[test]
    fn out_of_stock_is_not_purchasable() {
        assert!(!make_product(Availability::OutOfStock).is_purchasable());
    }

    #[test]
    fn unknown_availability_is_optimistically_purchasable() {
        assert!(make_product(Availability::Unknown).is_purchasable());
        assert!(make_product(Availability::Limited).is_purchasable());
    }

    #[test]
    fn serializes_with_camel_case_fields() {
        let json = serde_json::to_value(make_product(Availability::InStock)).unwrap();
        assert_eq!(json["priceText"], "₹16,999");
        assert_eq!(json["availability"], "in_stock");
        assert!(json["attributes"]["ramGb"].is_null());
    }
}
