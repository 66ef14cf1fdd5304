mod offline;
mod run;

use std::path::PathBuf;

use cartpilot_core::{CheckoutMode, FilterKey, FilterValue, Platform};
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(name = "cartpilot")]
#[command(about = "Shopping agent: search, filter, select and check out from a free-text intent")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Run a purchase intent in Chromium and print the task report as JSON
    Run {
        /// Free-text intent, e.g. "samsung phone 6gb ram under 20000 on amazon"
        intent: String,
        /// Storefront to use; overrides any platform named in the intent
        #[arg(long)]
        platform: Option<Platform>,
        /// Extra filter as key=value; repeatable
        #[arg(long = "filter", value_parser = parse_filter)]
        filters: Vec<(FilterKey, FilterValue)>,
        /// What to do on the product page: buy-now, add-to-cart or none
        #[arg(long, value_parser = parse_checkout)]
        checkout: Option<CheckoutMode>,
        /// Page to open first; defaults to the storefront's origin
        #[arg(long)]
        url: Option<String>,
    },
    /// Parse an intent and print it as JSON
    ParseIntent {
        text: String,
    },
    /// Extract products from a saved results page
    Extract {
        /// HTML file to read
        #[arg(long)]
        html: PathBuf,
        #[arg(long)]
        platform: Platform,
        /// URL the page was saved from, for resolving relative links
        #[arg(long)]
        url: Option<String>,
    },
    /// Recover a JSON decision from model output (stdin when no file is given)
    Decode {
        file: Option<PathBuf>,
    },
}

fn parse_filter(raw: &str) -> Result<(FilterKey, FilterValue), String> {
    let (key, value) = raw
        .split_once('=')
        .ok_or_else(|| format!("expected key=value, got '{raw}'"))?;
    let key: FilterKey = key.parse().map_err(|e: cartpilot_core::IntentError| e.to_string())?;
    let value = value.trim();
    if value.is_empty() {
        return Err(format!("filter '{key}' has no value"));
    }
    Ok(match value.parse::<f64>() {
        Ok(number) => (key, FilterValue::Number(number)),
        Err(_) => (key, FilterValue::from(value)),
    })
}

fn parse_checkout(raw: &str) -> Result<CheckoutMode, String> {
    match raw.trim().to_ascii_lowercase().replace('_', "-").as_str() {
        "buy-now" | "buy" => Ok(CheckoutMode::BuyNow),
        "add-to-cart" | "cart" => Ok(CheckoutMode::AddToCart),
        "none" => Ok(CheckoutMode::None),
        other => Err(format!("unknown checkout mode '{other}'")),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let config = cartpilot_core::load_app_config()?;

    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(config.log_level.clone()))?;
    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    match cli.command {
        Commands::Run {
            intent,
            platform,
            filters,
            checkout,
            url,
        } => {
            let options = run::RunOptions {
                platform,
                filters,
                checkout,
                start_url: url,
            };
            run::run_intent(&config, &intent, &options).await?;
        }
        Commands::ParseIntent { text } => offline::parse_intent(&text)?,
        Commands::Extract { html, platform, url } => {
            offline::extract(&config, &html, platform, url.as_deref())?;
        }
        Commands::Decode { file } => offline::decode(file.as_deref())?,
    }

    Ok(())
}

#[cfg(test)]
mod tests;
