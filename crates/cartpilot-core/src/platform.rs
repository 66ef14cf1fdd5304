use serde::{Deserialize, Serialize};

/// A storefront family the agent knows how to drive.
///
/// `Generic` covers any site without a dedicated selector table; it still
/// benefits from the shared extraction heuristics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Platform {
    Amazon,
    Flipkart,
    Shopify,
    Generic,
}

impl Platform {
    pub const ALL: [Platform; 4] = [
        Platform::Amazon,
        Platform::Flipkart,
        Platform::Shopify,
        Platform::Generic,
    ];

    /// Origin used to absolutize relative links when the page origin is
    /// unknown (e.g. extraction from a saved HTML file).
    #[must_use]
    pub fn default_origin(self) -> Option<&'static str> {
        match self {
            Platform::Amazon => Some("https://www.amazon.in"),
            Platform::Flipkart => Some("https://www.flipkart.com"),
            Platform::Shopify | Platform::Generic => None,
        }
    }

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Platform::Amazon => "amazon",
            Platform::Flipkart => "flipkart",
            Platform::Shopify => "shopify",
            Platform::Generic => "generic",
        }
    }

    /// Best-effort platform detection from a page URL.
    #[must_use]
    pub fn detect(url: &str) -> Platform {
        let lower = url.to_ascii_lowercase();
        if lower.contains("amazon.") {
            Platform::Amazon
        } else if lower.contains("flipkart.") {
            Platform::Flipkart
        } else if lower.contains("myshopify.com") || lower.contains("/collections/") {
            Platform::Shopify
        } else {
            Platform::Generic
        }
    }
}

impl std::fmt::Display for Platform {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Platform {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "amazon" => Ok(Platform::Amazon),
            "flipkart" => Ok(Platform::Flipkart),
            "shopify" => Ok(Platform::Shopify),
            "generic" => Ok(Platform::Generic),
            other => Err(format!("unknown platform '{other}'")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn detect_recognises_known_hosts() {
        assert_eq!(
            Platform::detect("https://www.amazon.in/s?k=phone"),
            Platform::Amazon
        );
        assert_eq!(
            Platform::detect("https://www.flipkart.com/search?q=phone"),
            Platform::Flipkart
        );
        assert_eq!(
            Platform::detect("https://store.example.com/collections/all"),
            Platform::Shopify
        );
        assert_eq!(Platform::detect("https://shop.example.org/"), Platform::Generic);
    }

    #[test]
    fn from_str_round_trips_display() {
        for platform in Platform::ALL {
            assert_eq!(platform.to_string().parse::<Platform>(), Ok(platform));
        }
    }

    #[test]
    fn unknown_platform_is_rejected() {
        assert!("ebay".parse::<Platform>().is_err());
    }
}
