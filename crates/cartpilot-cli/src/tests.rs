use super::*;
use cartpilot_core::{Platform, SitesFile};
use cartpilot_extract::ExtractionReport;
use cartpilot_llm::Decision;

#[test]
fn parses_run_with_overrides() {
    let cli = Cli::try_parse_from([
        "cartpilot",
        "run",
        "samsung phone",
        "--platform",
        "flipkart",
        "--filter",
        "ram=8",
        "--filter",
        "color=blue",
        "--checkout",
        "add-to-cart",
    ])
    .expect("expected valid cli args");

    let Commands::Run {
        intent,
        platform,
        filters,
        checkout,
        url,
    } = cli.command
    else {
        panic!("expected run command");
    };
    assert_eq!(intent, "samsung phone");
    assert_eq!(platform, Some(Platform::Flipkart));
    assert_eq!(
        filters,
        vec![
            (FilterKey::Ram, FilterValue::Number(8.0)),
            (FilterKey::Color, FilterValue::Text("blue".into())),
        ]
    );
    assert_eq!(checkout, Some(CheckoutMode::AddToCart));
    assert!(url.is_none());
}

#[test]
fn run_without_flags_has_no_overrides() {
    let cli = Cli::try_parse_from(["cartpilot", "run", "headphones"]).expect("expected valid cli args");
    assert!(matches!(
        cli.command,
        Commands::Run {
            platform: None,
            checkout: None,
            url: None,
            ..
        }
    ));
}

#[test]
fn rejects_malformed_filter() {
    assert!(Cli::try_parse_from(["cartpilot", "run", "phone", "--filter", "ram"]).is_err());
    assert!(Cli::try_parse_from(["cartpilot", "run", "phone", "--filter", "ram="]).is_err());
}

#[test]
fn rejects_unknown_platform_and_checkout() {
    assert!(Cli::try_parse_from(["cartpilot", "run", "phone", "--platform", "ebay"]).is_err());
    assert!(Cli::try_parse_from(["cartpilot", "run", "phone", "--checkout", "later"]).is_err());
}

#[test]
fn checkout_aliases() {
    assert_eq!(parse_checkout("buy"), Ok(CheckoutMode::BuyNow));
    assert_eq!(parse_checkout("BUY_NOW"), Ok(CheckoutMode::BuyNow));
    assert_eq!(parse_checkout("cart"), Ok(CheckoutMode::AddToCart));
    assert_eq!(parse_checkout("none"), Ok(CheckoutMode::None));
}

#[test]
fn parses_extract_command() {
    let cli = Cli::try_parse_from([
        "cartpilot",
        "extract",
        "--html",
        "page.html",
        "--platform",
        "amazon",
    ])
    .expect("expected valid cli args");
    assert!(matches!(
        cli.command,
        Commands::Extract {
            platform: Platform::Amazon,
            url: None,
            ..
        }
    ));
}

#[test]
fn decode_reads_from_stdin_when_no_file() {
    let cli = Cli::try_parse_from(["cartpilot", "decode"]).expect("expected valid cli args");
    assert!(matches!(cli.command, Commands::Decode { file: None }));
}

#[test]
fn build_intent_applies_overrides_over_parsed_text() {
    let options = run::RunOptions {
        platform: Some(Platform::Amazon),
        filters: vec![(FilterKey::Ram, FilterValue::Number(12.0))],
        checkout: Some(CheckoutMode::None),
        start_url: None,
    };
    let intent = run::build_intent("buy samsung phone with 6gb ram on flipkart", &options).unwrap();

    assert_eq!(intent.platform_hint, Some(Platform::Amazon));
    assert_eq!(intent.filters[&FilterKey::Ram], FilterValue::Number(12.0));
    assert_eq!(intent.checkout, CheckoutMode::None);
}

#[test]
fn build_intent_rejects_empty_query() {
    assert!(run::build_intent("buy under 500", &run::RunOptions::default()).is_err());
}

#[test]
fn start_url_prefers_flag_then_origin() {
    let sites = SitesFile::builtin().unwrap();

    let amazon = sites.profile(Platform::Amazon).unwrap();
    let url = run::start_url(amazon, &run::RunOptions::default()).unwrap();
    assert_eq!(url, "https://www.amazon.in");

    let options = run::RunOptions {
        start_url: Some("https://shop.test/".into()),
        ..run::RunOptions::default()
    };
    assert_eq!(run::start_url(amazon, &options).unwrap(), "https://shop.test/");

    let generic = sites.profile(Platform::Generic).unwrap();
    assert!(run::start_url(generic, &run::RunOptions::default()).is_err());
}

#[test]
fn decode_text_reports_decision_or_error() {
    let value = offline::decode_text("Sure!\n```json\n{\"action\": \"select_product\", \"index\": 3}\n```").unwrap();
    let decision: Decision = serde_json::from_value(value["decoded"]["decision"].clone()).unwrap();
    assert_eq!(decision, Decision::SelectProduct { index: 3 });

    let value = offline::decode_text(r#"{"action": "dance"}"#).unwrap();
    assert!(value["decoded"]["error"].is_string());
    assert_eq!(value["recovered"]["action"], "dance");

    assert!(offline::decode_text("no json here").is_err());
}

#[test]
fn extraction_summary_counts_partitions() {
    let summary = offline::extraction_summary(&ExtractionReport::default());
    assert_eq!(summary["valid"], 0);
    assert_eq!(summary["sponsored"], 0);
    assert_eq!(summary["outOfStock"], 0);
    assert_eq!(summary["extraction"]["containerSelector"], "");
}
