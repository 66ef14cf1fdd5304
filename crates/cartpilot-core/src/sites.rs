use std::collections::HashSet;
use std::path::Path;

use percent_encoding::{utf8_percent_encode, NON_ALPHANUMERIC};
use serde::{Deserialize, Serialize};

use crate::platform::Platform;
use crate::ConfigError;

const BUILTIN_SITES: &str = include_str!("../../../config/sites.yaml");

/// CSS selector tables for one storefront.
///
/// Every list is ordered: the extraction and filter engines try selectors
/// front to back and stop at the first one that produces a usable match.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SiteProfile {
    pub platform: Platform,
    /// Fallback origin for resolving relative links when the page has none.
    #[serde(default)]
    pub origin: Option<String>,
    /// Template with `{origin}` and `{query}` placeholders.
    #[serde(default)]
    pub search_url: Option<String>,
    pub containers: Vec<String>,
    #[serde(default)]
    pub links: Vec<String>,
    #[serde(default)]
    pub titles: Vec<String>,
    #[serde(default)]
    pub prices: Vec<String>,
    #[serde(default)]
    pub images: Vec<String>,
    #[serde(default)]
    pub ratings: Vec<String>,
    #[serde(default)]
    pub reviews: Vec<String>,
    /// Structural ad markers and dedicated ad-label elements.
    #[serde(default)]
    pub sponsored: Vec<String>,
    /// Sold-out badges and disabled purchase controls.
    #[serde(default)]
    pub out_of_stock: Vec<String>,
    #[serde(default)]
    pub search_inputs: Vec<String>,
    #[serde(default)]
    pub filter_containers: Vec<String>,
    #[serde(default)]
    pub filter_groups: Vec<String>,
    #[serde(default)]
    pub filter_headers: Vec<String>,
    #[serde(default)]
    pub clear_filters: Vec<String>,
    #[serde(default)]
    pub buy_now: Vec<String>,
    #[serde(default)]
    pub add_to_cart: Vec<String>,
    #[serde(default)]
    pub detail_titles: Vec<String>,
    #[serde(default)]
    pub detail_prices: Vec<String>,
}

impl SiteProfile {
    /// Renders `search_url` for `query`, using `origin` when given and the
    /// profile's own origin otherwise. Returns `None` if the template needs an
    /// origin and neither is available.
    #[must_use]
    pub fn render_search_url(&self, query: &str, origin: Option<&str>) -> Option<String> {
        let template = self.search_url.as_deref()?;
        let encoded = utf8_percent_encode(query.trim(), NON_ALPHANUMERIC).to_string();
        let rendered = template.replace("{query}", &encoded);
        if !rendered.contains("{origin}") {
            return Some(rendered);
        }
        let origin = origin.or(self.origin.as_deref())?;
        Some(rendered.replace("{origin}", origin.trim_end_matches('/')))
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct SitesFile {
    pub sites: Vec<SiteProfile>,
}

impl SitesFile {
    /// The selector tables compiled into the binary.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if the embedded table fails to parse or validate.
    pub fn builtin() -> Result<Self, ConfigError> {
        parse_sites(BUILTIN_SITES)
    }

    /// Profile for `platform`, falling back to the generic profile.
    #[must_use]
    pub fn profile(&self, platform: Platform) -> Option<&SiteProfile> {
        self.sites
            .iter()
            .find(|s| s.platform == platform)
            .or_else(|| self.sites.iter().find(|s| s.platform == Platform::Generic))
    }
}

/// Load and validate site selector tables from a YAML file.
///
/// A missing file is not an error: the built-in tables are used instead.
///
/// # Errors
///
/// Returns `ConfigError` if the file exists but cannot be read, parsed, or
/// fails validation.
pub fn load_sites(path: &Path) -> Result<SitesFile, ConfigError> {
    if !path.exists() {
        tracing::info!(path = %path.display(), "sites file not found, using built-in selector tables");
        return SitesFile::builtin();
    }

    let content = std::fs::read_to_string(path).map_err(|e| ConfigError::SitesFileIo {
        path: path.display().to_string(),
        source: e,
    })?;

    parse_sites(&content)
}

fn parse_sites(content: &str) -> Result<SitesFile, ConfigError> {
    let sites_file: SitesFile = serde_yaml::from_str(content).map_err(ConfigError::SitesFileParse)?;
    validate_sites(&sites_file)?;
    Ok(sites_file)
}

fn validate_sites(sites_file: &SitesFile) -> Result<(), ConfigError> {
    let mut seen = HashSet::new();

    for site in &sites_file.sites {
        if !seen.insert(site.platform) {
            return Err(ConfigError::Validation(format!(
                "duplicate site profile for platform '{}'",
                site.platform
            )));
        }

        if site.containers.iter().all(|s| s.trim().is_empty()) {
            return Err(ConfigError::Validation(format!(
                "site '{}' must declare at least one container selector",
                site.platform
            )));
        }

        if let Some(template) = &site.search_url {
            if !template.contains("{query}") {
                return Err(ConfigError::Validation(format!(
                    "site '{}' search_url must contain a {{query}} placeholder",
                    site.platform
                )));
            }
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn minimal(platform: Platform) -> SiteProfile {
        serde_yaml::from_str(&format!(
            "platform: {platform}\ncontainers: ['.item']\nsearch_url: '{{origin}}/s?q={{query}}'"
        ))
        .unwrap()
    }

    #[test]
    fn builtin_tables_cover_every_platform() {
        let sites = SitesFile::builtin().unwrap();
        for platform in Platform::ALL {
            let profile = sites.profile(platform).unwrap();
            assert_eq!(profile.platform, platform);
            assert!(!profile.containers.is_empty());
        }
    }

    #[test]
    fn unknown_platform_falls_back_to_generic() {
        let sites = SitesFile {
            sites: vec![minimal(Platform::Generic)],
        };
        assert_eq!(
            sites.profile(Platform::Amazon).map(|p| p.platform),
            Some(Platform::Generic)
        );
    }

    #[test]
    fn validate_rejects_duplicate_platforms() {
        let sites = SitesFile {
            sites: vec![minimal(Platform::Amazon), minimal(Platform::Amazon)],
        };
        let err = validate_sites(&sites).unwrap_err();
        assert!(err.to_string().contains("duplicate site profile"));
    }

    #[test]
    fn validate_rejects_empty_container_list() {
        let mut profile = minimal(Platform::Flipkart);
        profile.containers = vec!["  ".to_string()];
        let err = validate_sites(&SitesFile {
            sites: vec![profile],
        })
        .unwrap_err();
        assert!(err.to_string().contains("container selector"));
    }

    #[test]
    fn validate_rejects_search_url_without_query() {
        let mut profile = minimal(Platform::Shopify);
        profile.search_url = Some("https://shop.example.com/search".to_string());
        assert!(validate_sites(&SitesFile {
            sites: vec![profile]
        })
        .is_err());
    }

    #[test]
    fn render_search_url_encodes_query_and_prefers_page_origin() {
        let mut profile = minimal(Platform::Amazon);
        profile.origin = Some("https://www.amazon.in".to_string());
        assert_eq!(
            profile.render_search_url("samsung phone", None).as_deref(),
            Some("https://www.amazon.in/s?q=samsung%20phone")
        );
        assert_eq!(
            profile
                .render_search_url("tv", Some("https://www.amazon.com/"))
                .as_deref(),
            Some("https://www.amazon.com/s?q=tv")
        );
    }

    #[test]
    fn render_search_url_needs_an_origin() {
        let profile = minimal(Platform::Shopify);
        assert!(profile.render_search_url("mug", None).is_none());
    }

    #[test]
    fn missing_file_uses_builtin_tables() {
        let sites = load_sites(Path::new("/nonexistent/cartpilot/sites.yaml")).unwrap();
        assert!(sites.profile(Platform::Flipkart).is_some());
    }
}
