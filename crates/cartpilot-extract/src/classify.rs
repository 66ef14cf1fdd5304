//! Sponsored and out-of-stock classification.
//!
//! Signals are checked strongest first: structural ad attributes, configured
//! ad-label elements, class-name patterns, and finally short standalone text
//! nodes. Free-text checks never look at the product title, so a title such as
//! "Stock Pot 5L" cannot mark a listing as out of stock.

use std::sync::LazyLock;

use cartpilot_core::{Availability, Product, SiteProfile};
use regex::Regex;
use scraper::{ElementRef, Selector};
use serde::Serialize;

use crate::dom::{attr, element_text, matches_any, normalize_text};

/// Text nodes longer than this are content, not labels.
const MAX_LABEL_LEN: usize = 40;

static SPONSORED_LABEL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^(?:sponsored|ad|ads|advertisement|promoted|featured ad)\s*[:·•ⓘ]?$")
        .expect("valid regex")
});

static OUT_OF_STOCK: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)\b(?:out of stock|sold out|currently unavailable|temporarily unavailable|not available|coming soon|notify me)\b",
    )
    .expect("valid regex")
});

static LIMITED: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(?:only \d+ left|few left|\d+ left in stock|limited stock|hurry)\b")
        .expect("valid regex")
});

static IN_STOCK: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)^in stock\b").expect("valid regex"));

static CLASSED: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("[class]").expect("valid selector"));
static DISABLED_CONTROL: LazyLock<Selector> = LazyLock::new(|| {
    Selector::parse("button[disabled], input[type=submit][disabled]").expect("valid selector")
});

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct Classification {
    pub sponsored: bool,
    pub availability: Availability,
}

impl Classification {
    #[must_use]
    pub fn out_of_stock(&self) -> bool {
        self.availability == Availability::OutOfStock
    }
}

/// Classifies one product container.
#[must_use]
pub fn classify(container: ElementRef<'_>, title: &str, profile: &SiteProfile) -> Classification {
    let title = normalize_text(title).to_lowercase();
    let labels = label_texts(container, &title);

    Classification {
        sponsored: is_sponsored(container, &labels, profile),
        availability: availability(container, &labels, profile),
    }
}

/// Short standalone text nodes of `container`, lowercased, excluding anything
/// that is part of the title.
fn label_texts(container: ElementRef<'_>, title: &str) -> Vec<String> {
    container
        .text()
        .map(|t| normalize_text(t).to_lowercase())
        .filter(|t| !t.is_empty() && t.chars().count() <= MAX_LABEL_LEN)
        .filter(|t| title.is_empty() || !(title.contains(t.as_str()) || t.contains(title)))
        .collect()
}

fn is_sponsored(container: ElementRef<'_>, labels: &[String], profile: &SiteProfile) -> bool {
    structural_ad(container)
        || matches_any(container, &profile.sponsored)
        || ad_class_name(container)
        || labels.iter().any(|t| SPONSORED_LABEL.is_match(t))
}

fn structural_ad(container: ElementRef<'_>) -> bool {
    let element = container.value();
    element
        .attr("data-component-type")
        .is_some_and(|v| v.to_ascii_lowercase().contains("sponsored"))
        || element.attr("data-ad-id").is_some()
        || element.attr("data-sponsored").is_some_and(|v| v != "false")
        || element.classes().any(|c| c.eq_ignore_ascii_case("AdHolder"))
}

fn ad_class_name(container: ElementRef<'_>) -> bool {
    let has_ad_class = |el: ElementRef<'_>| {
        el.value().classes().any(|class| {
            let class = class.to_ascii_lowercase();
            class.contains("sponsor") || class.contains("ad-label") || class.contains("adlabel")
        })
    };
    has_ad_class(container) || container.select(&CLASSED).any(has_ad_class)
}

fn availability(container: ElementRef<'_>, labels: &[String], profile: &SiteProfile) -> Availability {
    if labels.iter().any(|t| OUT_OF_STOCK.is_match(t))
        || matches_any(container, &profile.out_of_stock)
        || disabled_purchase_control(container)
    {
        Availability::OutOfStock
    } else if labels.iter().any(|t| LIMITED.is_match(t)) {
        Availability::Limited
    } else if labels.iter().any(|t| IN_STOCK.is_match(t)) {
        Availability::InStock
    } else {
        Availability::Unknown
    }
}

fn disabled_purchase_control(container: ElementRef<'_>) -> bool {
    container.select(&DISABLED_CONTROL).any(|control| {
        let label = format!(
            "{} {}",
            element_text(control),
            attr(control, "value").unwrap_or_default()
        )
        .to_lowercase();
        label.contains("cart") || label.contains("buy")
    })
}

/// Products split by classification. Partitions are disjoint and together
/// hold every input product.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ProductPartition {
    pub valid: Vec<Product>,
    pub sponsored: Vec<Product>,
    pub out_of_stock: Vec<Product>,
}

impl ProductPartition {
    #[must_use]
    pub fn total(&self) -> usize {
        self.valid.len() + self.sponsored.len() + self.out_of_stock.len()
    }
}

/// Partitions products into valid, sponsored and out-of-stock. A product that
/// is both sponsored and out of stock counts as sponsored.
#[must_use]
pub fn filter_products(products: Vec<Product>) -> ProductPartition {
    let mut partition = ProductPartition::default();
    for product in products {
        if product.sponsored {
            partition.sponsored.push(product);
        } else if product.availability == Availability::OutOfStock {
            partition.out_of_stock.push(product);
        } else {
            partition.valid.push(product);
        }
    }
    tracing::debug!(
        valid = partition.valid.len(),
        sponsored = partition.sponsored.len(),
        out_of_stock = partition.out_of_stock.len(),
        "partitioned products"
    );
    partition
}
