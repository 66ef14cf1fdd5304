//! Product link resolution via a fixed priority chain.

use std::sync::LazyLock;

use cartpilot_core::{Platform, SiteProfile};
use regex::Regex;
use scraper::{ElementRef, Selector};
use serde::Serialize;

use crate::dom::{attr, compile, first_match};

/// Data attributes that carry a product URL directly.
const DATA_LINK_ATTRS: &[&str] = &["data-url", "data-link", "data-href", "data-product-url"];

/// Path fragments that mark a product-detail URL.
const PRODUCT_PATH_FRAGMENTS: &[&str] =
    &["/dp/", "/p/", "/product/", "/products/", "/gp/product/", "/itm/"];

static PRODUCT_PATH: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)/(?:dp|gp/product|p|product|products|itm|item|ip)/[^/?#]+|[?&](?:pid|product_?id|sku)=|-p-\d+|[/-]\d{6,}(?:[/?#.]|$)",
    )
    .expect("valid regex")
});

static ANCHOR: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("a[href]").expect("valid selector"));
static IMAGE: LazyLock<Selector> = LazyLock::new(|| Selector::parse("img").expect("valid selector"));

/// Which step of the chain produced a link.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LinkSource {
    ConfiguredSelector,
    DataAttribute,
    ProductPath,
    TitleAnchor,
    ImageAnchor,
    PathPattern,
    Identifier,
    FirstAnchor,
}

impl LinkSource {
    const CHAIN: [LinkSource; 8] = [
        LinkSource::ConfiguredSelector,
        LinkSource::DataAttribute,
        LinkSource::ProductPath,
        LinkSource::TitleAnchor,
        LinkSource::ImageAnchor,
        LinkSource::PathPattern,
        LinkSource::Identifier,
        LinkSource::FirstAnchor,
    ];
}

/// Resolves the raw (not yet normalized) product link of `container`.
///
/// Steps are tried in [`LinkSource`] order and the chain stops at the first
/// one that yields a usable `href`.
#[must_use]
pub fn resolve_link(container: ElementRef<'_>, profile: &SiteProfile) -> Option<(LinkSource, String)> {
    first_match(LinkSource::CHAIN, |source| {
        let href = match source {
            LinkSource::ConfiguredSelector => configured(container, &profile.links),
            LinkSource::DataAttribute => data_attribute(container),
            LinkSource::ProductPath => anchors(container).find(|href| {
                PRODUCT_PATH_FRAGMENTS
                    .iter()
                    .any(|fragment| href.contains(fragment))
            }),
            LinkSource::TitleAnchor => title_anchor(container, &profile.titles),
            LinkSource::ImageAnchor => image_anchor(container),
            LinkSource::PathPattern => anchors(container).find(|href| PRODUCT_PATH.is_match(href)),
            LinkSource::Identifier => identifier_path(container, profile.platform),
            LinkSource::FirstAnchor => anchors(container).next(),
        }?;
        Some((source, href))
    })
}

fn usable(href: &str) -> bool {
    let lower = href.trim().to_ascii_lowercase();
    !(lower.is_empty() || lower.starts_with('#') || lower.starts_with("javascript:"))
}

fn href_of(element: ElementRef<'_>) -> Option<String> {
    attr(element, "href").filter(|h| usable(h)).map(str::to_owned)
}

/// Usable anchor hrefs under `container`, including `container` itself.
fn anchors<'a>(container: ElementRef<'a>) -> impl Iterator<Item = String> + 'a {
    let own = (container.value().name() == "a")
        .then(|| href_of(container))
        .flatten();
    own.into_iter()
        .chain(container.select(&ANCHOR).filter_map(href_of))
}

fn configured(container: ElementRef<'_>, selectors: &[String]) -> Option<String> {
    first_match(selectors, |selector| {
        let parsed = compile(selector)?;
        if parsed.matches(&container) {
            if let Some(href) = href_of(container) {
                return Some(href);
            }
        }
        container.select(&parsed).find_map(|el| {
            href_of(el).or_else(|| {
                el.ancestors()
                    .filter_map(ElementRef::wrap)
                    .take_while(|ancestor| ancestor.id() != container.id())
                    .find_map(href_of)
            })
        })
    })
}

fn data_attribute(container: ElementRef<'_>) -> Option<String> {
    std::iter::once(container)
        .chain(container.descendants().filter_map(ElementRef::wrap))
        .find_map(|el| {
            DATA_LINK_ATTRS
                .iter()
                .find_map(|name| attr(el, name).filter(|v| usable(v)))
                .map(str::to_owned)
        })
}

fn title_anchor(container: ElementRef<'_>, titles: &[String]) -> Option<String> {
    first_match(titles, |selector| {
        let parsed = compile(selector)?;
        let title = container.select(&parsed).next()?;
        if let Some(href) = href_of(title) {
            return Some(href);
        }
        // Anchor wrapping the title, but only up to the container.
        let wrapping = title
            .ancestors()
            .filter_map(ElementRef::wrap)
            .take_while(|el| el.id() != container.id())
            .find_map(href_of);
        wrapping.or_else(|| title.select(&ANCHOR).find_map(href_of))
    })
}

fn image_anchor(container: ElementRef<'_>) -> Option<String> {
    container
        .select(&ANCHOR)
        .find(|a| a.select(&IMAGE).next().is_some())
        .and_then(href_of)
}

/// Builds a canonical product path from identifier attributes.
fn identifier_path(container: ElementRef<'_>, platform: Platform) -> Option<String> {
    let elements = || std::iter::once(container).chain(container.descendants().filter_map(ElementRef::wrap));

    if let Some(asin) = elements().find_map(|el| attr(el, "data-asin")) {
        return Some(format!("/dp/{asin}"));
    }

    let id = elements().find_map(|el| attr(el, "data-product-id").or_else(|| attr(el, "data-id")))?;
    Some(match platform {
        Platform::Amazon => format!("/dp/{id}"),
        Platform::Flipkart => format!("/product/p/itme?pid={id}"),
        Platform::Shopify => format!("/products/{id}"),
        Platform::Generic => format!("/product/{id}"),
    })
}

#[cfg(test)]
mod tests {
    use cartpilot_core::SitesFile;
    use scraper::Html;

    use super::*;

    fn profile(platform: Platform) -> SiteProfile {
        let mut profile = SitesFile::builtin()
            .unwrap()
            .profile(platform)
            .unwrap()
            .clone();
        profile.links = vec!["a.primary".to_string()];
        profile.titles = vec![".title".to_string()];
        profile
    }

    fn resolve(html: &str, platform: Platform) -> Option<(LinkSource, String)> {
        let doc = Html::parse_fragment(html);
        let card = doc
            .select(&Selector::parse(".card").unwrap())
            .next()
            .unwrap();
        resolve_link(card, &profile(platform))
    }

    #[test]
    fn configured_selector_wins_over_everything_else() {
        let html = r#"<div class="card" data-url="/from-data">
            <a href="/dp/B01"><img src="x.jpg"></a>
            <a class="primary" href="/configured">Buy</a></div>"#;
        assert_eq!(
            resolve(html, Platform::Generic),
            Some((LinkSource::ConfiguredSelector, "/configured".to_string()))
        );
    }

    #[test]
    fn data_attribute_beats_anchors() {
        let html = r#"<div class="card"><span data-product-url="/from-data"></span>
            <a href="/dp/B01">x</a></div>"#;
        assert_eq!(
            resolve(html, Platform::Generic),
            Some((LinkSource::DataAttribute, "/from-data".to_string()))
        );
    }

    #[test]
    fn product_path_anchor_is_preferred_over_first_anchor() {
        let html = r##"<div class="card"><a href="#">top</a><a href="/brand/store">brand</a>
            <a href="/galaxy-m34/p/itm123">title</a></div>"##;
        assert_eq!(
            resolve(html, Platform::Flipkart),
            Some((LinkSource::ProductPath, "/galaxy-m34/p/itm123".to_string()))
        );
    }

    #[test]
    fn title_anchor_wraps_title() {
        let html = r#"<div class="card"><a href="/brand/store">brand</a>
            <a href="/listing?ref=42"><h3 class="title">Galaxy</h3></a></div>"#;
        assert_eq!(
            resolve(html, Platform::Generic),
            Some((LinkSource::TitleAnchor, "/listing?ref=42".to_string()))
        );
    }

    #[test]
    fn image_wrapped_anchor() {
        let html = r#"<div class="card"><a href="/a"><span>x</span></a>
            <a href="/listing-img"><img src="x.jpg"></a></div>"#;
        assert_eq!(
            resolve(html, Platform::Generic),
            Some((LinkSource::ImageAnchor, "/listing-img".to_string()))
        );
    }

    #[test]
    fn path_pattern_matches_numeric_ids() {
        let html = r#"<div class="card"><a href="/store">store</a>
            <a href="/shoes/running-shoe-1234567">x</a></div>"#;
        assert_eq!(
            resolve(html, Platform::Generic),
            Some((LinkSource::PathPattern, "/shoes/running-shoe-1234567".to_string()))
        );
    }

    #[test]
    fn asin_builds_dp_path_when_no_anchor_exists() {
        let html = r#"<div class="card" data-asin="B0C7Q6ZQ7Z"><span>Galaxy</span></div>"#;
        assert_eq!(
            resolve(html, Platform::Amazon),
            Some((LinkSource::Identifier, "/dp/B0C7Q6ZQ7Z".to_string()))
        );
    }

    #[test]
    fn product_id_uses_platform_pattern() {
        let html = r#"<div class="card" data-id="MOBGTAGPTB3VS24W"><span>x</span></div>"#;
        assert_eq!(
            resolve(html, Platform::Flipkart),
            Some((
                LinkSource::Identifier,
                "/product/p/itme?pid=MOBGTAGPTB3VS24W".to_string()
            ))
        );
    }

    #[test]
    fn falls_back_to_first_anchor() {
        let html = r#"<div class="card"><a href="javascript:void(0)">x</a><a href="/somewhere">y</a></div>"#;
        assert_eq!(
            resolve(html, Platform::Generic),
            Some((LinkSource::FirstAnchor, "/somewhere".to_string()))
        );
    }

    #[test]
    fn no_link_at_all() {
        assert_eq!(resolve(r#"<div class="card">nothing</div>"#, Platform::Generic), None);
    }
}
