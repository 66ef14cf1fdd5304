use cartpilot_core::{Availability, Platform, SitesFile};

use super::*;
use crate::classify::filter_products;

fn profile(platform: Platform) -> SiteProfile {
    SitesFile::builtin()
        .unwrap()
        .profile(platform)
        .unwrap()
        .clone()
}

const AMAZON_RESULTS: &str = r#"
<html><head><title>Amazon.in : samsung phone</title></head><body>
  <div class="s-result-item" data-component-type="s-search-result" data-asin="B0C7Q6ZQ7Z">
    <h2><a class="a-link-normal" href="/Samsung-Galaxy-M34/dp/B0C7Q6ZQ7Z/ref=sr_1_1"><span>Samsung Galaxy M34 5G (6GB RAM, 128GB Storage) 6000mAh</span></a></h2>
    <span class="a-price"><span class="a-offscreen">₹16,999</span></span>
    <span class="a-icon-alt">4.1 out of 5 stars</span>
    <span class="a-size-base s-underline-text">1,204</span>
    <img class="s-image" src="https://m.media-amazon.com/images/I/m34.jpg">
  </div>
  <div class="s-result-item" data-component-type="s-search-result" data-asin="B0CSPONS01">
    <h2><a class="a-link-normal" href="/sspa/click?ie=UTF8&amp;url=%2FSamsung-Galaxy-A15%2Fdp%2FB0CSPONS01"><span>Samsung Galaxy A15 (4GB RAM, 128GB Storage)</span></a></h2>
    <span class="puis-sponsored-label-text">Sponsored</span>
    <span class="a-price"><span class="a-offscreen">₹13,499</span></span>
  </div>
  <div class="s-result-item" data-component-type="s-search-result" data-asin="B0COOS0001">
    <h2><a class="a-link-normal" href="/Samsung-Galaxy-M14/dp/B0COOS0001"><span>Samsung Galaxy M14 5G (6GB RAM, 128GB Storage)</span></a></h2>
    <span>Currently unavailable.</span>
  </div>
  <div class="s-result-item" data-component-type="s-search-result">
    <span>Need help? Visit the help section or contact us</span>
    <a href="/gp/help/customer/display.html">Help</a>
  </div>
</body></html>"#;

#[test]
fn every_product_has_title_and_absolute_link() {
    let report = extract_products(
        AMAZON_RESULTS,
        Some("https://www.amazon.in/s?k=samsung+phone"),
        &profile(Platform::Amazon),
    )
    .unwrap();
    assert_eq!(report.products.len(), 3);
    for product in &report.products {
        assert!(!product.title.is_empty());
        assert!(product.link.starts_with("https://www.amazon.in/"), "{}", product.link);
    }
    assert_eq!(report.dropped_invalid, 1, "help-section chrome is not a product");
}

#[test]
fn extracts_fields_and_infers_attributes() {
    let report = extract_products(AMAZON_RESULTS, None, &profile(Platform::Amazon)).unwrap();
    let first = &report.products[0];
    assert_eq!(first.title, "Samsung Galaxy M34 5G (6GB RAM, 128GB Storage) 6000mAh");
    assert_eq!(
        first.link,
        "https://www.amazon.in/Samsung-Galaxy-M34/dp/B0C7Q6ZQ7Z/ref=sr_1_1"
    );
    assert_eq!(first.price_text, "₹16,999");
    assert_eq!(first.price_numeric, Some(16_999.0));
    assert_eq!(first.rating, Some(4.1));
    assert_eq!(first.reviews, Some(1_204));
    assert_eq!(
        first.image.as_deref(),
        Some("https://m.media-amazon.com/images/I/m34.jpg")
    );
    assert_eq!(first.attributes.ram_gb, Some(6));
    assert_eq!(first.attributes.battery_mah, Some(6000));
    assert!(!first.sponsored);
}

#[test]
fn sponsored_redirect_link_is_unwrapped_and_flagged() {
    let report = extract_products(AMAZON_RESULTS, None, &profile(Platform::Amazon)).unwrap();
    let sponsored = &report.products[1];
    assert!(sponsored.sponsored);
    assert_eq!(
        sponsored.link,
        "https://www.amazon.in/Samsung-Galaxy-A15/dp/B0CSPONS01"
    );
    assert_eq!(report.products[2].availability, Availability::OutOfStock);

    let partition = filter_products(report.products.clone());
    assert_eq!(partition.total(), report.products.len());
    assert_eq!(partition.valid.len(), 1);
}

#[test]
fn extraction_is_idempotent() {
    let profile = profile(Platform::Amazon);
    let first = extract_products(AMAZON_RESULTS, None, &profile).unwrap();
    let second = extract_products(AMAZON_RESULTS, None, &profile).unwrap();
    assert_eq!(first, second);
}

#[test]
fn first_matching_container_selector_wins() {
    let report = extract_products(AMAZON_RESULTS, None, &profile(Platform::Amazon)).unwrap();
    assert_eq!(
        report.container_selector,
        r#"div[data-component-type="s-search-result"]"#
    );
}

#[test]
fn falls_through_to_next_selector_when_first_yields_nothing_valid() {
    let mut profile = profile(Platform::Generic);
    profile.containers = vec![".banner".to_string(), ".tile".to_string()];
    let html = r#"<div class="banner">Back to top</div>
        <div class="tile"><h3>Steel Water Bottle 1L</h3><a href="/product/bottle">view</a></div>"#;
    let report = extract_products(html, Some("https://shop.example.com/search?q=bottle"), &profile)
        .unwrap();
    assert_eq!(report.container_selector, ".tile");
    assert_eq!(report.products[0].link, "https://shop.example.com/product/bottle");
}

#[test]
fn garbage_title_is_dropped_after_selection() {
    let mut profile = profile(Platform::Generic);
    profile.containers = vec![".tile".to_string()];
    let html = r#"
        <div class="tile"><h3>Steel Water Bottle 1L</h3><a href="/product/bottle">view</a></div>
        <div class="tile"><h3>Recently viewed</h3><a href="/product/history">x</a></div>"#;
    let report = extract_products(html, Some("https://shop.example.com/"), &profile).unwrap();
    assert_eq!(report.products.len(), 1);
    assert_eq!(report.dropped_invalid + report.dropped_garbage, 1);
}

#[test]
fn duplicate_links_are_reported_once() {
    let mut profile = profile(Platform::Generic);
    profile.containers = vec![".tile".to_string()];
    let html = r#"
        <div class="tile"><h3>Bottle</h3><a href="/product/bottle">view</a></div>
        <div class="tile"><h3>Bottle</h3><a href="/product/bottle">view</a></div>"#;
    let report = extract_products(html, Some("https://shop.example.com/"), &profile).unwrap();
    assert_eq!(report.products.len(), 1);
    assert_eq!(report.dropped_duplicate, 1);
}

fn accounted(report: &ExtractionReport) -> usize {
    report.products.len()
        + report.dropped_invalid
        + report.dropped_missing_title
        + report.dropped_missing_link
        + report.dropped_garbage
        + report.dropped_duplicate
}

#[test]
fn every_matched_container_is_returned_or_counted_as_dropped() {
    let amazon = extract_products(
        AMAZON_RESULTS,
        Some("https://www.amazon.in/s?k=samsung+phone"),
        &profile(Platform::Amazon),
    )
    .unwrap();
    assert_eq!(accounted(&amazon), amazon.containers_matched);

    let mut generic = profile(Platform::Generic);
    generic.containers = vec![".tile".to_string()];
    let html = r#"
        <div class="tile"><h3>Bottle</h3><a href="/product/bottle">view</a></div>
        <div class="tile"><h3>Flask</h3><a href="/product/flask">view</a></div>
        <div class="tile"><h3>Bottle</h3><a href="/product/bottle">view</a></div>"#;
    let report = extract_products(html, Some("https://shop.example.com/"), &generic).unwrap();
    assert_eq!(report.containers_matched, 3);
    assert_eq!(report.products.len(), 2);
    assert_eq!(report.dropped_duplicate, 1);
    assert_eq!(accounted(&report), report.containers_matched);
}

#[test]
fn page_without_products_is_selector_not_found() {
    let err = extract_products(
        "<html><body><p>No results for your query.</p></body></html>",
        None,
        &profile(Platform::Flipkart),
    )
    .unwrap_err();
    assert!(matches!(err, ExtractError::SelectorNotFound { .. }));
    assert_eq!(count_products("<html></html>", None, &profile(Platform::Flipkart)), 0);
}

#[test]
fn product_details_use_detail_selectors() {
    let html = r#"<html><head><title>Buy Galaxy</title></head><body>
        <span id="productTitle"> Samsung Galaxy M34 5G </span>
        <div id="corePrice_feature_div"><span class="a-price"><span class="a-offscreen">₹16,999</span></span></div>
        </body></html>"#;
    let details = extract_details(html, "https://www.amazon.in/dp/B0C7Q6ZQ7Z", &profile(Platform::Amazon));
    assert_eq!(details.title, "Samsung Galaxy M34 5G");
    assert_eq!(details.price, "₹16,999");
    assert_eq!(details.url, "https://www.amazon.in/dp/B0C7Q6ZQ7Z");
}
