//! Product extraction from a search-results page.
//!
//! The list is rebuilt from scratch on every call, so calling it twice on an
//! unchanged page yields the same products in the same order.

use std::collections::HashSet;
use std::sync::LazyLock;

use cartpilot_core::{Product, ProductDetails, SiteProfile};
use scraper::{ElementRef, Html, Selector};
use serde::Serialize;

use crate::attributes::{infer_attributes, parse_price, parse_rating, parse_review_count};
use crate::classify::classify;
use crate::dom::{attr, compile, element_text, first_match, select_first, select_text};
use crate::error::ExtractError;
use crate::links::resolve_link;
use crate::urls::{normalize_link, page_origin};

/// Containers with less text than this need a title match to count.
const MIN_CONTAINER_TEXT: usize = 20;

/// Phrases that mark page chrome rather than a product card.
const GARBAGE_PHRASES: &[&str] = &[
    "visit the help section",
    "need help?",
    "back to top",
    "try checking your spelling",
    "no results for",
    "see all results",
    "related searches",
    "your browsing history",
    "recently viewed",
    "customers who viewed",
    "sign in for the best experience",
    "shop by category",
    "sponsored products related",
    "sponsored brands",
    "brands related to your search",
];

static TITLE_FALLBACK: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("a[title], img[alt], [aria-label]").expect("valid selector"));
static DOCUMENT_TITLE: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("title").expect("valid selector"));

/// Outcome of one extraction pass.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExtractionReport {
    pub products: Vec<Product>,
    /// The container selector that won.
    pub container_selector: String,
    /// Elements matched by the winning selector.
    pub containers_matched: usize,
    /// Matched elements that failed the validity predicate.
    pub dropped_invalid: usize,
    pub dropped_missing_title: usize,
    pub dropped_missing_link: usize,
    pub dropped_garbage: usize,
    pub dropped_duplicate: usize,
}

enum Dropped {
    MissingTitle,
    MissingLink,
    Garbage,
}

/// Extracts products from `html` using `profile`'s selector tables.
///
/// Container selectors are tried in order; the first one that yields at least
/// one valid container wins and later selectors are never consulted. Links are
/// resolved against `page_url` when given, else against the profile or
/// platform origin.
///
/// A container whose link was already produced by an earlier container is
/// skipped, so a product repeated in a carousel is returned once. Every
/// matched container is accounted for in the report: it is either returned
/// or counted in exactly one `dropped_*` field.
///
/// # Errors
///
/// Returns [`ExtractError::SelectorNotFound`] when no container selector
/// yields a valid container.
pub fn extract_products(
    html: &str,
    page_url: Option<&str>,
    profile: &SiteProfile,
) -> Result<ExtractionReport, ExtractError> {
    let document = Html::parse_document(html);
    let base = base_url(page_url, profile);

    let winner = first_match(&profile.containers, |selector| {
        let parsed = compile(selector)?;
        let matched: Vec<ElementRef<'_>> = document.select(&parsed).collect();
        let valid: Vec<ElementRef<'_>> = matched
            .iter()
            .copied()
            .filter(|container| is_valid_container(*container, profile))
            .collect();
        if valid.is_empty() {
            tracing::debug!(selector = %selector, matched = matched.len(), "container selector yielded nothing usable");
            None
        } else {
            Some((selector.clone(), matched.len(), valid))
        }
    });

    let Some((container_selector, containers_matched, valid)) = winner else {
        return Err(ExtractError::SelectorNotFound {
            tried: profile.containers.clone(),
        });
    };

    let mut report = ExtractionReport {
        container_selector,
        containers_matched,
        dropped_invalid: containers_matched - valid.len(),
        ..ExtractionReport::default()
    };
    let mut seen_links = HashSet::new();

    for container in valid {
        match build_product(container, profile, base.as_deref()) {
            Ok(product) => {
                if seen_links.insert(product.link.clone()) {
                    report.products.push(product);
                } else {
                    report.dropped_duplicate += 1;
                }
            }
            Err(Dropped::MissingTitle) => report.dropped_missing_title += 1,
            Err(Dropped::MissingLink) => report.dropped_missing_link += 1,
            Err(Dropped::Garbage) => report.dropped_garbage += 1,
        }
    }

    tracing::debug!(
        platform = %profile.platform,
        selector = %report.container_selector,
        products = report.products.len(),
        dropped_invalid = report.dropped_invalid,
        dropped_missing_link = report.dropped_missing_link,
        dropped_garbage = report.dropped_garbage,
        "extracted products"
    );
    Ok(report)
}

/// Number of products [`extract_products`] finds, or zero when it finds none.
#[must_use]
pub fn count_products(html: &str, page_url: Option<&str>, profile: &SiteProfile) -> usize {
    extract_products(html, page_url, profile).map_or(0, |report| report.products.len())
}

/// Title, price and URL of a product-detail page.
#[must_use]
pub fn extract_details(html: &str, page_url: &str, profile: &SiteProfile) -> ProductDetails {
    let document = Html::parse_document(html);
    let root = document.root_element();
    let title = select_text(root, &profile.detail_titles)
        .or_else(|| document.select(&DOCUMENT_TITLE).map(element_text).find(|t| !t.is_empty()))
        .unwrap_or_default();
    let price = select_text(root, &profile.detail_prices).unwrap_or_default();
    ProductDetails {
        title,
        price,
        url: page_url.to_owned(),
    }
}

fn base_url(page_url: Option<&str>, profile: &SiteProfile) -> Option<String> {
    page_url
        .filter(|url| page_origin(url).is_some())
        .map(str::to_owned)
        .or_else(|| profile.origin.clone())
}

fn is_garbage(text: &str) -> bool {
    let lower = text.to_lowercase();
    GARBAGE_PHRASES.iter().any(|phrase| lower.contains(phrase))
}

fn is_valid_container(container: ElementRef<'_>, profile: &SiteProfile) -> bool {
    if resolve_link(container, profile).is_none() {
        return false;
    }
    let text = element_text(container);
    let has_title = select_text(container, &profile.titles).is_some();
    (has_title || text.chars().count() >= MIN_CONTAINER_TEXT) && !is_garbage(&text)
}

fn title_of(container: ElementRef<'_>, profile: &SiteProfile) -> Option<String> {
    select_text(container, &profile.titles).or_else(|| {
        container.select(&TITLE_FALLBACK).find_map(|el| {
            attr(el, "title")
                .or_else(|| attr(el, "alt"))
                .or_else(|| attr(el, "aria-label"))
                .map(str::to_owned)
        })
    })
}

fn build_product(
    container: ElementRef<'_>,
    profile: &SiteProfile,
    base: Option<&str>,
) -> Result<Product, Dropped> {
    let title = title_of(container, profile)
        .map(|t| t.trim().to_owned())
        .filter(|t| !t.is_empty())
        .ok_or(Dropped::MissingTitle)?;

    let link = resolve_link(container, profile)
        .and_then(|(_, raw)| normalize_link(&raw, base, profile.platform))
        .ok_or(Dropped::MissingLink)?;

    // Checked again: nested chrome can leak into a container that passed.
    if is_garbage(&title) || is_garbage(&element_text(container)) {
        return Err(Dropped::Garbage);
    }

    let price_text = select_text(container, &profile.prices).unwrap_or_default();
    let price_numeric = parse_price(&price_text);
    let image = image_of(container, profile, base);
    let rating = rating_of(container, profile);
    let reviews = select_text(container, &profile.reviews).and_then(|t| parse_review_count(&t));
    let attributes = infer_attributes(&title);
    let classification = classify(container, &title, profile);

    Ok(Product {
        title,
        price_text,
        price_numeric,
        link,
        image,
        rating,
        reviews,
        attributes,
        sponsored: classification.sponsored,
        availability: classification.availability,
    })
}

fn image_of(container: ElementRef<'_>, profile: &SiteProfile, base: Option<&str>) -> Option<String> {
    let img = select_first(container, &profile.images)?;
    let raw = attr(img, "src")
        .filter(|src| !src.starts_with("data:"))
        .or_else(|| attr(img, "data-src"))
        .or_else(|| attr(img, "srcset").and_then(|set| set.split_whitespace().next()))?;
    normalize_link(raw, base, profile.platform)
}

fn rating_of(container: ElementRef<'_>, profile: &SiteProfile) -> Option<f64> {
    if let Some(rating) = select_text(container, &profile.ratings).and_then(|t| parse_rating(&t)) {
        return Some(rating);
    }
    let element = select_first(container, &profile.ratings)?;
    ["aria-label", "data-rating", "title"]
        .iter()
        .find_map(|name| attr(element, name).and_then(parse_rating))
}

#[cfg(test)]
#[path = "extract_test.rs"]
mod tests;
