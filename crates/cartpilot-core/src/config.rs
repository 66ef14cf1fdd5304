use crate::app_config::{AppConfig, Environment};
use crate::ConfigError;

/// Load application configuration from environment variables.
///
/// Calls `dotenvy::dotenv().ok()` to load `.env` files before reading env vars.
///
/// # Errors
///
/// Returns `ConfigError` if a value is present but invalid.
pub fn load_app_config() -> Result<AppConfig, ConfigError> {
    dotenvy::dotenv().ok();
    load_app_config_from_env()
}

/// Load application configuration from environment variables already in the process.
///
/// Unlike [`load_app_config`], this does NOT load `.env` files.
///
/// # Errors
///
/// Returns `ConfigError` if a value is present but invalid.
pub fn load_app_config_from_env() -> Result<AppConfig, ConfigError> {
    build_app_config(|key| std::env::var(key))
}

/// Build application configuration using the provided env-var lookup function.
///
/// Decoupled from the real environment so it can be tested with a plain
/// `HashMap` lookup.
fn build_app_config<F>(lookup: F) -> Result<AppConfig, ConfigError>
where
    F: Fn(&str) -> Result<String, std::env::VarError>,
{
    use std::path::PathBuf;

    let or_default = |var: &str, default: &str| -> String {
        lookup(var).unwrap_or_else(|_| default.to_string())
    };

    let invalid = |var: &str, reason: String| ConfigError::InvalidEnvVar {
        var: var.to_string(),
        reason,
    };

    let parse_u32 = |var: &str, default: &str| -> Result<u32, ConfigError> {
        or_default(var, default)
            .parse::<u32>()
            .map_err(|e| invalid(var, e.to_string()))
    };

    let parse_u64 = |var: &str, default: &str| -> Result<u64, ConfigError> {
        or_default(var, default)
            .parse::<u64>()
            .map_err(|e| invalid(var, e.to_string()))
    };

    let parse_usize = |var: &str, default: &str| -> Result<usize, ConfigError> {
        or_default(var, default)
            .parse::<usize>()
            .map_err(|e| invalid(var, e.to_string()))
    };

    let parse_bool = |var: &str, default: &str| -> Result<bool, ConfigError> {
        let raw = or_default(var, default);
        match raw.to_ascii_lowercase().as_str() {
            "1" | "true" | "yes" | "on" => Ok(true),
            "0" | "false" | "no" | "off" => Ok(false),
            _ => Err(invalid(var, format!("expected a boolean, got '{raw}'"))),
        }
    };

    let env = parse_environment(&or_default("CARTPILOT_ENV", "development"))?;
    let log_level = or_default("CARTPILOT_LOG_LEVEL", "info");
    let sites_path = PathBuf::from(or_default("CARTPILOT_SITES_PATH", "./config/sites.yaml"));
    let gemini_api_key = lookup("GEMINI_API_KEY").ok().filter(|k| !k.trim().is_empty());
    let llm_model = or_default("CARTPILOT_LLM_MODEL", "gemini-1.5-flash");
    let llm_timeout_secs = parse_u64("CARTPILOT_LLM_TIMEOUT_SECS", "30")?;
    let llm_max_retries = parse_u32("CARTPILOT_LLM_MAX_RETRIES", "2")?;
    let retry_initial_delay_ms = parse_u64("CARTPILOT_RETRY_INITIAL_DELAY_MS", "500")?;
    let retry_max_delay_ms = parse_u64("CARTPILOT_RETRY_MAX_DELAY_MS", "8000")?;
    let action_timeout_ms = parse_u64("CARTPILOT_ACTION_TIMEOUT_MS", "15000")?;
    let filter_wait_ms = parse_u64("CARTPILOT_FILTER_WAIT_MS", "4000")?;
    let poll_interval_ms = parse_u64("CARTPILOT_POLL_INTERVAL_MS", "250")?;
    let snapshot_max_products = parse_usize("CARTPILOT_SNAPSHOT_MAX_PRODUCTS", "20")?;
    let headless = parse_bool("CARTPILOT_HEADLESS", "true")?;
    let chrome_path = lookup("CARTPILOT_CHROME_PATH").ok().map(PathBuf::from);

    if poll_interval_ms == 0 {
        return Err(invalid(
            "CARTPILOT_POLL_INTERVAL_MS",
            "must be greater than zero".to_string(),
        ));
    }

    Ok(AppConfig {
        env,
        log_level,
        sites_path,
        gemini_api_key,
        llm_model,
        llm_timeout_secs,
        llm_max_retries,
        retry_initial_delay_ms,
        retry_max_delay_ms,
        action_timeout_ms,
        filter_wait_ms,
        poll_interval_ms,
        snapshot_max_products,
        headless,
        chrome_path,
    })
}

/// Parse a string into an `Environment` variant.
fn parse_environment(s: &str) -> Result<Environment, ConfigError> {
    match s {
        "development" => Ok(Environment::Development),
        "test" => Ok(Environment::Test),
        "production" => Ok(Environment::Production),
        other => Err(ConfigError::InvalidEnvVar {
            var: "CARTPILOT_ENV".to_string(),
            reason: format!("unknown environment '{other}'"),
        }),
    }
}

#[cfg(test)]
#[path = "config_test.rs"]
mod tests;
