//! The simplified page view handed to the language model.

use std::collections::HashSet;
use std::sync::LazyLock;

use cartpilot_core::{
    PageSnapshot, SiteProfile, SnapshotButton, SnapshotFilter, SnapshotInput, SnapshotProduct,
    MAX_FILTER_OPTIONS,
};
use cartpilot_extract::dom::{attr, css_path, element_text};
use cartpilot_extract::extract_products;
use cartpilot_filters::discover_filters;
use scraper::{ElementRef, Html, Selector};

const MAX_BUTTONS: usize = 30;
const MAX_INPUTS: usize = 15;
const MAX_LABEL_CHARS: usize = 80;

static DOCUMENT_TITLE: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("title").expect("valid selector"));
static CLICKABLE: LazyLock<Selector> = LazyLock::new(|| {
    Selector::parse(
        "button, [role=button], input[type=submit], input[type=button], a[href]",
    )
    .expect("valid selector")
});
static FIELDS: LazyLock<Selector> = LazyLock::new(|| {
    Selector::parse(
        "input:not([type=hidden]):not([type=checkbox]):not([type=radio]):not([type=submit]):not([type=button]), textarea, select",
    )
    .expect("valid selector")
});

/// Builds a snapshot of `html` with at most `max_products` products and
/// [`MAX_FILTER_OPTIONS`] options per filter.
#[must_use]
pub fn build_snapshot(html: &str, url: &str, profile: &SiteProfile, max_products: usize) -> PageSnapshot {
    let products = match extract_products(html, Some(url), profile) {
        Ok(report) => report
            .products
            .into_iter()
            .take(max_products)
            .enumerate()
            .map(|(index, product)| SnapshotProduct {
                index,
                title: product.title,
                price: product.price_text,
                link: product.link,
                rating: product.rating,
            })
            .collect(),
        Err(err) => {
            tracing::debug!(error = %err, "snapshot has no products");
            Vec::new()
        }
    };

    let filters = discover_filters(html, profile)
        .into_iter()
        .map(|group| SnapshotFilter {
            category: group.label,
            options: group
                .elements
                .into_iter()
                .map(|element| element.text)
                .take(MAX_FILTER_OPTIONS)
                .collect(),
        })
        .collect();

    let document = Html::parse_document(html);
    let title = document
        .select(&DOCUMENT_TITLE)
        .map(element_text)
        .find(|t| !t.is_empty())
        .unwrap_or_default();

    PageSnapshot {
        title,
        url: url.to_owned(),
        platform: Some(profile.platform),
        products,
        filters,
        buttons: buttons(&document),
        inputs: inputs(&document),
    }
}

fn truncate(text: &str) -> String {
    text.chars().take(MAX_LABEL_CHARS).collect()
}

fn buttons(document: &Html) -> Vec<SnapshotButton> {
    let mut seen = HashSet::new();
    document
        .select(&CLICKABLE)
        .filter(|el| el.value().attr("disabled").is_none())
        .filter_map(|el| {
            let text = element_text(el);
            let text = if text.is_empty() {
                attr(el, "value").or_else(|| attr(el, "aria-label"))?.to_owned()
            } else {
                text
            };
            let text = truncate(&text);
            seen.insert(text.clone()).then(|| SnapshotButton {
                text,
                selector: css_path(el),
            })
        })
        .take(MAX_BUTTONS)
        .collect()
}

fn field_name(el: ElementRef<'_>) -> String {
    attr(el, "name")
        .or_else(|| attr(el, "id"))
        .or_else(|| attr(el, "aria-label"))
        .unwrap_or_else(|| el.value().name())
        .to_owned()
}

fn inputs(document: &Html) -> Vec<SnapshotInput> {
    document
        .select(&FIELDS)
        .map(|el| SnapshotInput {
            name: field_name(el),
            placeholder: attr(el, "placeholder").unwrap_or_default().to_owned(),
            selector: css_path(el),
        })
        .take(MAX_INPUTS)
        .collect()
}
