//! Ordering candidate products before selection.

use std::cmp::Reverse;

use cartpilot_core::{Availability, Product};

fn tokens(text: &str) -> Vec<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(str::to_lowercase)
        .collect()
}

/// How many distinct query tokens appear in `title`.
#[must_use]
pub fn query_overlap(query: &str, title: &str) -> usize {
    let title = tokens(title);
    let mut query = tokens(query);
    query.sort_unstable();
    query.dedup();
    query.iter().filter(|token| title.contains(token)).count()
}

fn stock_rank(availability: Availability) -> u8 {
    match availability {
        Availability::InStock => 0,
        Availability::Limited => 1,
        Availability::Unknown => 2,
        Availability::OutOfStock => 3,
    }
}

/// Best candidates first: query-token overlap, then stock, then organic over
/// sponsored. Ties keep page order.
#[must_use]
pub fn rank_products(query: &str, mut products: Vec<Product>) -> Vec<Product> {
    products.sort_by_cached_key(|product| {
        (
            Reverse(query_overlap(query, &product.title)),
            stock_rank(product.availability),
            product.sponsored,
        )
    });
    products
}
