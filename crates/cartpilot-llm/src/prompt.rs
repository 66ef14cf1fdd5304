use std::fmt::Write as _;

use cartpilot_core::{Intent, PageSnapshot};

pub const SYSTEM_INSTRUCTION: &str = "You control a web browser on a shopping site. \
You are given the user's goal and a JSON snapshot of the current page. \
Reply with exactly one JSON object and nothing else. \
Allowed actions: \
{\"action\": \"click\", \"selector\": \"<css selector from the snapshot>\"}, \
{\"action\": \"select_product\", \"index\": <product index from the snapshot>}, \
{\"action\": \"input\", \"selector\": \"<css selector>\", \"value\": \"<text>\"}, \
{\"action\": \"completed\"}, \
{\"action\": \"error\", \"message\": \"<why no action can help>\"}. \
Add a short \"reasoning\" field. Only use selectors and indices that appear in the snapshot.";

/// Renders the user prompt for one fallback decision.
#[must_use]
pub fn build_decision_prompt(snapshot: &PageSnapshot, intent: &Intent, phase: &str) -> String {
    let mut prompt = String::new();
    let _ = writeln!(prompt, "Goal: find and open \"{}\".", intent.product_query);
    if let Some(platform) = intent.platform_hint {
        let _ = writeln!(prompt, "Site: {}", platform.as_str());
    }
    if intent.has_filters() {
        let wanted: Vec<String> = intent
            .ordered_filters()
            .into_iter()
            .map(|(key, value)| format!("{key}={}", value.as_text()))
            .collect();
        let _ = writeln!(prompt, "Requirements: {}", wanted.join(", "));
    }
    let _ = writeln!(prompt, "Current phase: {phase}");
    let _ = writeln!(
        prompt,
        "Page snapshot:\n{}",
        serde_json::to_string_pretty(snapshot).unwrap_or_default()
    );
    prompt.push_str("Respond with one JSON action.");
    prompt
}

#[cfg(test)]
mod tests {
    use cartpilot_core::{FilterKey, Platform, SnapshotProduct};

    use super::*;

    #[test]
    fn prompt_carries_goal_requirements_and_snapshot() {
        let intent = Intent::new("galaxy m34")
            .unwrap()
            .with_platform(Platform::Flipkart)
            .with_filter(FilterKey::Ram, 6.0)
            .with_filter(FilterKey::Brand, "samsung");
        let snapshot = PageSnapshot {
            title: "Search results".to_owned(),
            url: "https://www.flipkart.com/search?q=galaxy".to_owned(),
            products: vec![SnapshotProduct {
                index: 0,
                title: "Samsung Galaxy M34".to_owned(),
                price: "₹16,999".to_owned(),
                link: "https://www.flipkart.com/p/itm1".to_owned(),
                rating: Some(4.2),
            }],
            ..PageSnapshot::default()
        };

        let prompt = build_decision_prompt(&snapshot, &intent, "selecting_product");

        assert!(prompt.starts_with("Goal: find and open \"galaxy m34\"."));
        assert!(prompt.contains("Site: flipkart"));
        assert!(prompt.contains("Requirements: brand=samsung, ram=6"));
        assert!(prompt.contains("Current phase: selecting_product"));
        assert!(prompt.contains("\"title\": \"Samsung Galaxy M34\""));
        assert!(prompt.ends_with("Respond with one JSON action."));
    }

    #[test]
    fn system_instruction_lists_every_action() {
        for action in ["click", "select_product", "input", "completed", "error"] {
            assert!(SYSTEM_INSTRUCTION.contains(&format!("\"action\": \"{action}\"")));
        }
    }
}
