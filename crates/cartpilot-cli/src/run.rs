//! The `run` command: one intent against a live Chromium tab.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use cartpilot_agent::{
    AdapterSettings, Orchestrator, OrchestratorSettings, PageChannel, StoreAdapter, TaskReport,
};
use cartpilot_browser::{BrowserSettings, ChromeDriver};
use cartpilot_core::{
    load_sites, parse_intent, AppConfig, CheckoutMode, FilterKey, FilterValue, Intent, PageDriver,
    Platform, SiteProfile,
};
use cartpilot_llm::GeminiClient;

/// The CLI drives a single tab.
const TAB_ID: u64 = 1;

#[derive(Debug, Default)]
pub(crate) struct RunOptions {
    pub platform: Option<Platform>,
    pub filters: Vec<(FilterKey, FilterValue)>,
    pub checkout: Option<CheckoutMode>,
    pub start_url: Option<String>,
}

/// Parses `text` and applies the command-line overrides on top.
pub(crate) fn build_intent(text: &str, options: &RunOptions) -> anyhow::Result<Intent> {
    let mut intent = parse_intent(text)?;
    if let Some(platform) = options.platform {
        intent = intent.with_platform(platform);
    }
    for (key, value) in &options.filters {
        intent = intent.with_filter(key.clone(), value.clone());
    }
    if let Some(checkout) = options.checkout {
        intent = intent.with_checkout(checkout);
    }
    Ok(intent)
}

/// Where the tab starts: `--url`, else the site's own origin.
pub(crate) fn start_url(profile: &SiteProfile, options: &RunOptions) -> anyhow::Result<String> {
    options
        .start_url
        .clone()
        .or_else(|| profile.origin.clone())
        .or_else(|| profile.platform.default_origin().map(str::to_owned))
        .with_context(|| format!("{} has no known origin; pass --url", profile.platform))
}

/// Runs one intent and prints the report as JSON.
///
/// # Errors
///
/// Returns an error if the intent does not parse, the selector tables cannot
/// be loaded, or the browser cannot be started. Task failures are not errors:
/// they are reported in the printed report.
pub(crate) async fn run_intent(
    config: &AppConfig,
    text: &str,
    options: &RunOptions,
) -> anyhow::Result<()> {
    let intent = build_intent(text, options)?;
    let platform = intent.platform_hint.unwrap_or(Platform::Generic);
    let sites = load_sites(&config.sites_path)?;
    let profile = sites
        .profile(platform)
        .with_context(|| format!("no selector table for {platform}"))?
        .clone();
    let start = start_url(&profile, options)?;

    let driver = Arc::new(ChromeDriver::launch(BrowserSettings::from_config(config)).await?);
    let outcome = drive(config, &driver, profile, &start, intent).await;
    driver.close().await;

    let report = outcome?;
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}

async fn drive(
    config: &AppConfig,
    driver: &Arc<ChromeDriver>,
    profile: SiteProfile,
    start: &str,
    intent: Intent,
) -> anyhow::Result<TaskReport> {
    driver
        .navigate(start)
        .await
        .with_context(|| format!("could not open {start}"))?;

    let adapter = StoreAdapter::new(
        Arc::clone(driver),
        profile,
        AdapterSettings::from_config(config),
    );
    let reply_timeout = Duration::from_millis(config.action_timeout_ms.saturating_mul(4));
    let channel = PageChannel::spawn(Arc::new(adapter), TAB_ID, reply_timeout);

    let mut orchestrator =
        Orchestrator::new(channel, OrchestratorSettings::from_config(config)).with_tab_id(TAB_ID);
    match GeminiClient::from_config(config)? {
        Some(client) => orchestrator = orchestrator.with_language_model(Arc::new(client)),
        None => tracing::info!("GEMINI_API_KEY not set, language model fallback disabled"),
    }

    let cancel = orchestrator.cancel_handle();
    let interrupt = tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            cancel.cancel();
        }
    });
    let report = orchestrator.run(intent).await;
    interrupt.abort();
    Ok(report)
}
