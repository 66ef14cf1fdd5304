//! Filter sidebar discovery.
//!
//! Groups are rebuilt from the current HTML on every call. Any click may
//! re-render the sidebar, so a discovered group is stale as soon as the page
//! is touched.

use std::sync::LazyLock;

use cartpilot_core::SiteProfile;
use cartpilot_extract::dom::{attr, compile, css_path, element_text, first_match, normalize_text};
use regex::Regex;
use scraper::{ElementRef, Html, Selector};
use serde::Serialize;

use crate::matching::label_key;

const DEFAULT_HEADERS: &[&str] = &["legend", "summary", "h2", "h3", "h4", "h5", "[role=heading]"];

static COUNT_SUFFIX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\(\s*\d[\d,.]*\+?\s*\)").expect("valid regex"));
static OPTION_VALUE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)(\d[\d,]*(?:\.\d+)?)\s*(tb|gb|mb|mah)?").expect("valid regex")
});

static UPPER_BOUND: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(concat!(
        r"(?i)^\s*(?:under|below|up\s*to|less\s+than|max(?:imum)?)\b",
        r"|(?:&|\band|\bor)\s*(?:under|below|less)\s*(?:\([^)]*\))?\s*$",
    ))
    .expect("valid regex")
});

static OPTIONS: LazyLock<Selector> = LazyLock::new(|| {
    Selector::parse(
        "a, label, button, input[type=checkbox], input[type=radio], [role=checkbox], [role=option]",
    )
    .expect("valid selector")
});
static RANGE_INPUTS: LazyLock<Selector> = LazyLock::new(|| {
    Selector::parse("input[type=number], input[type=text], input[type=tel], input:not([type])")
        .expect("valid selector")
});

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum GroupKind {
    Selection,
    Range,
}

/// One clickable option inside a filter group.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FilterElement {
    pub text: String,
    /// A selector that addresses this element in the page it came from.
    pub selector: String,
    pub numeric_kind: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub numeric_value: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FilterGroup {
    /// Header text, lowercased with counts such as `(24)` removed.
    pub label: String,
    pub kind: GroupKind,
    pub elements: Vec<FilterElement>,
    /// Selectors of the min and max inputs of a range group.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub inputs: Option<[String; 2]>,
}

/// Discovers the filter groups on a page.
///
/// The first configured sidebar container that yields any group wins; if none
/// does, the whole document is scanned. Groups that share a label are merged.
#[must_use]
pub fn discover_filters(html: &str, profile: &SiteProfile) -> Vec<FilterGroup> {
    let document = Html::parse_document(html);
    let headers: Vec<String> = if profile.filter_headers.is_empty() {
        DEFAULT_HEADERS.iter().map(|h| (*h).to_owned()).collect()
    } else {
        profile.filter_headers.clone()
    };

    let scanned = first_match(&profile.filter_containers, |selector| {
        let parsed = compile(selector)?;
        let groups: Vec<FilterGroup> = document
            .select(&parsed)
            .flat_map(|scope| scan_groups(scope, &profile.filter_groups, &headers))
            .collect();
        (!groups.is_empty()).then_some(groups)
    })
    .unwrap_or_else(|| scan_groups(document.root_element(), &profile.filter_groups, &headers));

    let mut groups: Vec<FilterGroup> = Vec::new();
    for group in scanned {
        merge(&mut groups, group);
    }
    tracing::debug!(
        platform = %profile.platform,
        groups = groups.len(),
        labels = ?groups.iter().map(|g| g.label.as_str()).collect::<Vec<_>>(),
        "discovered filter groups"
    );
    groups
}

/// Lowercases, strips parenthetical counts and collapses whitespace.
#[must_use]
pub fn normalize_label(text: &str) -> String {
    let stripped = COUNT_SUFFIX.replace_all(text, " ");
    normalize_text(&stripped)
        .trim_end_matches(':')
        .trim()
        .to_lowercase()
}

/// True for bucket labels that cap a value (`"Under 4 GB"`, `"Up to 3 GB"`).
#[must_use]
pub fn is_upper_bound(text: &str) -> bool {
    UPPER_BOUND.is_match(text)
}

/// Numeric value of an option label (`"6 GB & Above"` → 6, `"1 TB"` → 1024).
///
/// Upper-bound buckets have no value: they can never satisfy an at-least
/// request.
#[must_use]
pub fn parse_option_value(text: &str) -> Option<f64> {
    if is_upper_bound(text) {
        return None;
    }
    let caps = OPTION_VALUE.captures(text)?;
    let value: f64 = caps.get(1)?.as_str().replace(',', "").parse().ok()?;
    let unit = caps.get(2).map(|u| u.as_str().to_ascii_lowercase());
    Some(match unit.as_deref() {
        Some("tb") => value * 1024.0,
        Some("mb") => value / 1024.0,
        _ => value,
    })
}

fn scan_groups(scope: ElementRef<'_>, group_selectors: &[String], headers: &[String]) -> Vec<FilterGroup> {
    first_match(group_selectors, |selector| {
        let parsed = compile(selector)?;
        let groups: Vec<FilterGroup> = scope
            .select(&parsed)
            .filter_map(|group| build_group(group, headers))
            .collect();
        (!groups.is_empty()).then_some(groups)
    })
    .unwrap_or_default()
}

fn build_group(group: ElementRef<'_>, headers: &[String]) -> Option<FilterGroup> {
    let header = first_match(headers, |selector| {
        let parsed = compile(selector)?;
        group
            .select(&parsed)
            .find(|h| !element_text(*h).is_empty())
    })?;
    let label = normalize_label(&element_text(header));
    if label.is_empty() {
        return None;
    }

    let numeric_kind = label_key(&label).is_some_and(|key| key.is_numeric_kind());
    let elements = group
        .select(&OPTIONS)
        .filter(|el| !inside(*el, header) && !nested_option(*el, group))
        .filter_map(|el| {
            let text = option_text(el);
            (!text.is_empty()).then(|| FilterElement {
                numeric_value: if numeric_kind { parse_option_value(&text) } else { None },
                selector: css_path(el),
                numeric_kind,
                text,
            })
        })
        .collect();

    let inputs: Vec<String> = group.select(&RANGE_INPUTS).map(css_path).collect();
    let (kind, inputs) = match inputs.as_slice() {
        [min, max, ..] => (GroupKind::Range, Some([min.clone(), max.clone()])),
        _ => (GroupKind::Selection, None),
    };

    Some(FilterGroup {
        label,
        kind,
        elements,
        inputs,
    })
}

fn inside(element: ElementRef<'_>, container: ElementRef<'_>) -> bool {
    element.id() == container.id() || element.ancestors().any(|a| a.id() == container.id())
}

/// True when an enclosing option (inside `group`) already represents `element`,
/// such as a checkbox inside its label.
fn nested_option(element: ElementRef<'_>, group: ElementRef<'_>) -> bool {
    element
        .ancestors()
        .filter_map(ElementRef::wrap)
        .take_while(|a| a.id() != group.id())
        .any(|a| OPTIONS.matches(&a))
}

fn option_text(element: ElementRef<'_>) -> String {
    let text = element_text(element);
    if !text.is_empty() {
        return text;
    }
    attr(element, "aria-label")
        .or_else(|| attr(element, "value"))
        .map(normalize_text)
        .or_else(|| {
            element
                .parent()
                .and_then(ElementRef::wrap)
                .map(element_text)
        })
        .unwrap_or_default()
}

fn merge(groups: &mut Vec<FilterGroup>, incoming: FilterGroup) {
    let Some(existing) = groups.iter_mut().find(|g| g.label == incoming.label) else {
        groups.push(incoming);
        return;
    };
    for element in incoming.elements {
        if !existing.elements.iter().any(|e| e.selector == element.selector) {
            existing.elements.push(element);
        }
    }
    if existing.inputs.is_none() && incoming.inputs.is_some() {
        existing.inputs = incoming.inputs;
        existing.kind = GroupKind::Range;
    }
}
