//! Mapping requested filters onto discovered groups and options.

use cartpilot_core::{FilterKey, FilterValue};

use crate::discovery::{is_upper_bound, FilterElement, FilterGroup};

const BRAND: &[&str] = &["brand", "brands", "manufacturer", "featured brands"];
const RAM: &[&str] = &[
    "ram",
    "memory",
    "internal memory",
    "system memory",
    "ram size",
    "installed ram",
];
const BATTERY: &[&str] = &["battery", "battery capacity", "battery power"];
const STORAGE: &[&str] = &[
    "storage",
    "internal storage",
    "rom",
    "storage capacity",
    "hard disk size",
    "ssd capacity",
];
const RATING: &[&str] = &[
    "rating",
    "ratings",
    "customer rating",
    "customer ratings",
    "customer reviews",
    "avg customer review",
];
const COLOR: &[&str] = &["color", "colour", "colors", "colours"];
const PRICE: &[&str] = &["price", "price range"];

/// Keys probed when classifying a group label, in priority order.
const LABELLED_KEYS: [FilterKey; 7] = [
    FilterKey::Brand,
    FilterKey::Ram,
    FilterKey::Battery,
    FilterKey::Storage,
    FilterKey::Rating,
    FilterKey::Color,
    FilterKey::PriceMax,
];

/// Group labels a filter may appear under.
#[must_use]
pub fn synonyms(key: &FilterKey) -> Vec<String> {
    let fixed: &[&str] = match key {
        FilterKey::Brand => BRAND,
        FilterKey::Ram => RAM,
        FilterKey::Battery => BATTERY,
        FilterKey::Storage => STORAGE,
        FilterKey::Rating => RATING,
        FilterKey::Color => COLOR,
        FilterKey::PriceMin | FilterKey::PriceMax => PRICE,
        FilterKey::Other(name) => return vec![name.replace('_', " ")],
    };
    fixed.iter().map(|s| (*s).to_owned()).collect()
}

/// Lowercased tokens of `text`. Decimal points inside numbers survive, so
/// `"4.5★"` stays distinct from `"4"`.
fn tokens(text: &str) -> String {
    text.to_lowercase()
        .split(|c: char| !(c.is_alphanumeric() || c == '.'))
        .map(|t| t.trim_matches('.'))
        .filter(|t| !t.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}

fn phrase_eq(haystack: &str, needle: &str) -> bool {
    let needle = tokens(needle);
    !needle.is_empty() && tokens(haystack) == needle
}

fn contains_phrase(haystack: &str, needle: &str) -> bool {
    let needle = tokens(needle);
    !needle.is_empty() && format!(" {} ", tokens(haystack)).contains(&format!(" {needle} "))
}

/// The filter key a group label stands for, if any.
pub(crate) fn label_key(label: &str) -> Option<FilterKey> {
    let matches = |pred: fn(&str, &str) -> bool| {
        LABELLED_KEYS
            .iter()
            .find(|key| synonyms(key).iter().any(|name| pred(label, name)))
            .cloned()
    };
    matches(phrase_eq).or_else(|| matches(contains_phrase))
}

/// The group that best represents `key`: an exact label match first, then a
/// label containing one of the key's synonyms as a phrase.
#[must_use]
pub fn find_group<'a>(groups: &'a [FilterGroup], key: &FilterKey) -> Option<&'a FilterGroup> {
    let names = synonyms(key);
    groups
        .iter()
        .find(|group| names.iter().any(|name| phrase_eq(&group.label, name)))
        .or_else(|| {
            groups
                .iter()
                .find(|group| names.iter().any(|name| contains_phrase(&group.label, name)))
        })
}

/// An option with value `option` satisfies a request for at least `requested`.
#[must_use]
pub fn numeric_satisfies(option: f64, requested: f64) -> bool {
    option >= requested
}

/// Selects the option within `group` that satisfies `key = value`.
///
/// Numeric kinds pick the tightest option at or above the requested value,
/// preferring the earliest on ties. When no option carries a numeric value
/// the text rules apply instead: exact text, then phrase containment, then
/// plain substring.
#[must_use]
pub fn match_element<'a>(
    group: &'a FilterGroup,
    key: &FilterKey,
    value: &FilterValue,
) -> Option<&'a FilterElement> {
    if key.is_numeric_kind() && group.elements.iter().any(|e| e.numeric_value.is_some()) {
        let requested = value.as_number()?;
        return group
            .elements
            .iter()
            .filter_map(|element| {
                element
                    .numeric_value
                    .filter(|n| numeric_satisfies(*n, requested))
                    .map(|n| (element, n))
            })
            .min_by(|a, b| a.1.total_cmp(&b.1))
            .map(|(element, _)| element);
    }
    if key.is_numeric_kind() {
        let open_ended: Vec<&FilterElement> = group
            .elements
            .iter()
            .filter(|e| !is_upper_bound(&e.text))
            .collect();
        return match_text(&open_ended, &value.as_text());
    }
    let all: Vec<&FilterElement> = group.elements.iter().collect();
    match_text(&all, &value.as_text())
}

fn match_text<'a>(elements: &[&'a FilterElement], wanted: &str) -> Option<&'a FilterElement> {
    let lowered = wanted.trim().to_lowercase();
    if lowered.is_empty() {
        return None;
    }
    let find = |pred: &dyn Fn(&FilterElement) -> bool| elements.iter().copied().find(|e| pred(e));
    find(&|e| phrase_eq(&e.text, wanted))
        .or_else(|| find(&|e| contains_phrase(&e.text, wanted)))
        .or_else(|| find(&|e| e.text.to_lowercase().contains(&lowered)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::discovery::GroupKind;

    fn element(text: &str, numeric_value: Option<f64>) -> FilterElement {
        FilterElement {
            text: text.to_string(),
            selector: format!("#{}", text.len()),
            numeric_kind: numeric_value.is_some(),
            numeric_value,
        }
    }

    fn group(label: &str, elements: Vec<FilterElement>) -> FilterGroup {
        FilterGroup {
            label: label.to_string(),
            kind: GroupKind::Selection,
            elements,
            inputs: None,
        }
    }

    #[test]
    fn ram_synonyms_include_memory() {
        let names = synonyms(&FilterKey::Ram);
        for name in ["ram", "memory", "internal memory", "system memory"] {
            assert!(names.iter().any(|n| n == name), "{name}");
        }
    }

    #[test]
    fn finds_group_by_exact_label_before_containment() {
        let groups = vec![
            group("memory card slot", vec![]),
            group("system memory", vec![]),
        ];
        assert_eq!(
            find_group(&groups, &FilterKey::Ram).unwrap().label,
            "system memory"
        );
    }

    #[test]
    fn finds_group_by_phrase_containment() {
        let groups = vec![group("battery capacity (mah)", vec![])];
        assert!(find_group(&groups, &FilterKey::Battery).is_some());
        let groups = vec![group("from our partners", vec![])];
        assert!(find_group(&groups, &FilterKey::Storage).is_none(), "rom is not a token of from");
    }

    #[test]
    fn numeric_threshold_is_at_least() {
        assert!(numeric_satisfies(6.0, 6.0));
        assert!(numeric_satisfies(8.0, 6.0));
        assert!(!numeric_satisfies(4.0, 6.0));
    }

    #[test]
    fn numeric_kind_picks_tightest_option() {
        let ram = group(
            "ram",
            vec![
                element("4 GB", Some(4.0)),
                element("8 GB & Above", Some(8.0)),
                element("6 GB & Above", Some(6.0)),
            ],
        );
        let chosen = match_element(&ram, &FilterKey::Ram, &FilterValue::from("6")).unwrap();
        assert_eq!(chosen.text, "6 GB & Above");
    }

    #[test]
    fn numeric_ties_keep_dom_order() {
        let battery = group(
            "battery",
            vec![element("5000 mAh+", Some(5000.0)), element("5000 mAh & more", Some(5000.0))],
        );
        let chosen =
            match_element(&battery, &FilterKey::Battery, &FilterValue::Number(4500.0)).unwrap();
        assert_eq!(chosen.text, "5000 mAh+");
    }

    #[test]
    fn numeric_request_above_every_option_has_no_match() {
        let ram = group("ram", vec![element("4 GB", Some(4.0))]);
        assert!(match_element(&ram, &FilterKey::Ram, &FilterValue::Number(6.0)).is_none());
    }

    #[test]
    fn numeric_kind_without_metadata_falls_back_to_text() {
        let ram = group("ram", vec![element("Six GB", None), element("Eight GB", None)]);
        let chosen = match_element(&ram, &FilterKey::Ram, &FilterValue::from("eight")).unwrap();
        assert_eq!(chosen.text, "Eight GB");
    }

    #[test]
    fn upper_bound_options_never_satisfy_a_numeric_request() {
        let ram = group("ram", vec![element("Under 4 GB", None), element("Up to 8 GB", None)]);
        assert!(match_element(&ram, &FilterKey::Ram, &FilterValue::Number(6.0)).is_none());
        assert!(match_element(&ram, &FilterKey::Ram, &FilterValue::from("8")).is_none());

        let ram = group(
            "ram",
            vec![element("Under 6 GB", None), element("6 GB & Above", Some(6.0))],
        );
        let chosen = match_element(&ram, &FilterKey::Ram, &FilterValue::Number(6.0)).unwrap();
        assert_eq!(chosen.text, "6 GB & Above");
    }

    #[test]
    fn brand_matches_by_normalized_text() {
        let brands = group(
            "brand",
            vec![element("Apple", None), element("SAMSUNG  (1,204)", None)],
        );
        let chosen = match_element(&brands, &FilterKey::Brand, &FilterValue::from("samsung")).unwrap();
        assert!(chosen.text.starts_with("SAMSUNG"));
    }

    #[test]
    fn rating_does_not_confuse_decimals() {
        let ratings = group(
            "customer ratings",
            vec![element("4.5★ & above", None), element("4★ & above", None)],
        );
        let chosen = match_element(&ratings, &FilterKey::Rating, &FilterValue::from("4")).unwrap();
        assert_eq!(chosen.text, "4★ & above");
    }

    #[test]
    fn label_key_classifies_numeric_groups() {
        assert_eq!(label_key("ram"), Some(FilterKey::Ram));
        assert_eq!(label_key("internal storage"), Some(FilterKey::Storage));
        assert_eq!(label_key("battery capacity"), Some(FilterKey::Battery));
        assert_eq!(label_key("discount"), None);
    }
}
