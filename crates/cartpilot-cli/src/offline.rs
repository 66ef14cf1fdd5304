//! Commands that need no browser: intent parsing, extraction from saved
//! pages, and decoding model output.

use std::io::Read;
use std::path::Path;

use anyhow::Context;
use cartpilot_core::{load_sites, AppConfig, Platform};
use cartpilot_extract::{extract_products, filter_products, ExtractionReport};
use cartpilot_llm::{recover_json, ModelDecision};
use serde_json::{json, Value};

pub(crate) fn parse_intent(text: &str) -> anyhow::Result<()> {
    let intent = cartpilot_core::parse_intent(text)?;
    println!("{}", serde_json::to_string_pretty(&intent)?);
    Ok(())
}

/// Report for one saved page: the raw extraction plus how the products
/// partition.
pub(crate) fn extraction_summary(report: &ExtractionReport) -> Value {
    let partition = filter_products(report.products.clone());
    json!({
        "extraction": report,
        "valid": partition.valid.len(),
        "sponsored": partition.sponsored.len(),
        "outOfStock": partition.out_of_stock.len(),
    })
}

pub(crate) fn extract(
    config: &AppConfig,
    path: &Path,
    platform: Platform,
    page_url: Option<&str>,
) -> anyhow::Result<()> {
    let html = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    let sites = load_sites(&config.sites_path)?;
    let profile = sites
        .profile(platform)
        .with_context(|| format!("no selector table for {platform}"))?;

    let report = extract_products(&html, page_url, profile)?;
    println!("{}", serde_json::to_string_pretty(&extraction_summary(&report))?);
    Ok(())
}

/// Recovered object and, when it reads as one, the decision it encodes.
pub(crate) fn decode_text(text: &str) -> anyhow::Result<Value> {
    let object = recover_json(text)?;
    let decoded = match ModelDecision::from_value(&object) {
        Ok(decision) => json!({ "decision": decision }),
        Err(err) => json!({ "error": err.to_string() }),
    };
    Ok(json!({ "recovered": object, "decoded": decoded }))
}

pub(crate) fn decode(path: Option<&Path>) -> anyhow::Result<()> {
    let text = match path {
        Some(path) => std::fs::read_to_string(path)
            .with_context(|| format!("failed to read {}", path.display()))?,
        None => {
            let mut buf = String::new();
            std::io::stdin()
                .read_to_string(&mut buf)
                .context("failed to read stdin")?;
            buf
        }
    };
    println!("{}", serde_json::to_string_pretty(&decode_text(&text)?)?);
    Ok(())
}
