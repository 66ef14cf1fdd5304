use std::path::PathBuf;
use std::time::Duration;

use async_trait::async_trait;
use cartpilot_core::{AppConfig, PageDriver, PageError};
use chromiumoxide::browser::{Browser, BrowserConfig};
use chromiumoxide::element::Element;
use chromiumoxide::page::Page;
use futures::StreamExt;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;

use crate::error::BrowserError;
use crate::scripts;

#[derive(Debug, Clone)]
pub struct BrowserSettings {
    pub headless: bool,
    pub chrome_path: Option<PathBuf>,
    pub navigation_timeout: Duration,
    /// Pause after a click or submit so the page can start reacting.
    pub settle: Duration,
}

impl Default for BrowserSettings {
    fn default() -> Self {
        Self {
            headless: true,
            chrome_path: None,
            navigation_timeout: Duration::from_secs(30),
            settle: Duration::from_millis(300),
        }
    }
}

impl BrowserSettings {
    #[must_use]
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            headless: config.headless,
            chrome_path: config.chrome_path.clone(),
            navigation_timeout: Duration::from_millis(config.action_timeout_ms.saturating_mul(2)),
            ..Self::default()
        }
    }

    #[allow(clippy::cast_possible_truncation)]
    fn navigation_timeout_ms(&self) -> u64 {
        self.navigation_timeout.as_millis() as u64
    }
}

/// One Chromium process with a single tab.
pub struct ChromeDriver {
    browser: Mutex<Browser>,
    page: Page,
    events: JoinHandle<()>,
    settings: BrowserSettings,
}

impl ChromeDriver {
    /// Launches Chromium and opens a blank tab.
    ///
    /// # Errors
    ///
    /// Returns [`BrowserError`] if the configuration is rejected, the browser
    /// cannot be started, or the tab cannot be opened.
    pub async fn launch(settings: BrowserSettings) -> Result<Self, BrowserError> {
        let mut builder = BrowserConfig::builder()
            .no_sandbox()
            .window_size(1366, 900)
            .request_timeout(settings.navigation_timeout)
            .arg("--disable-dev-shm-usage");
        if !settings.headless {
            builder = builder.with_head();
        }
        if let Some(path) = &settings.chrome_path {
            builder = builder.chrome_executable(path);
        }
        let config = builder.build().map_err(BrowserError::Config)?;

        let (browser, mut handler) = Browser::launch(config)
            .await
            .map_err(|e| BrowserError::Launch(e.to_string()))?;
        let events = tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if let Err(err) = event {
                    tracing::debug!(error = %err, "browser event error");
                }
            }
        });

        let page = browser
            .new_page("about:blank")
            .await
            .map_err(|e| BrowserError::Tab(e.to_string()))?;
        tracing::info!(headless = settings.headless, "browser launched");

        Ok(Self {
            browser: Mutex::new(browser),
            page,
            events,
            settings,
        })
    }

    /// Closes the browser and stops its event loop.
    pub async fn close(&self) {
        if let Err(err) = self.browser.lock().await.close().await {
            tracing::warn!(error = %err, "browser did not close cleanly");
        }
        self.events.abort();
    }

    async fn element(&self, selector: &str) -> Result<Element, PageError> {
        self.page.find_element(selector).await.map_err(|err| {
            tracing::debug!(selector, error = %err, "element lookup failed");
            PageError::SelectorNotFound(selector.to_owned())
        })
    }

    async fn run_script(&self, selector: &str, script: String) -> Result<(), PageError> {
        let outcome: String = self
            .page
            .evaluate(script)
            .await
            .map_err(|e| PageError::Script(e.to_string()))?
            .into_value()
            .map_err(|e| PageError::Script(e.to_string()))?;
        if outcome == scripts::FOUND {
            Ok(())
        } else {
            Err(PageError::SelectorNotFound(selector.to_owned()))
        }
    }
}

#[async_trait]
impl PageDriver for ChromeDriver {
    async fn current_url(&self) -> Result<String, PageError> {
        let url = self
            .page
            .url()
            .await
            .map_err(|e| PageError::Script(e.to_string()))?;
        Ok(url.unwrap_or_else(|| "about:blank".to_owned()))
    }

    async fn content(&self) -> Result<String, PageError> {
        self.page
            .content()
            .await
            .map_err(|e| PageError::Script(e.to_string()))
    }

    async fn navigate(&self, url: &str) -> Result<(), PageError> {
        tracing::debug!(url, "navigating");
        match tokio::time::timeout(self.settings.navigation_timeout, self.page.goto(url)).await {
            Ok(Ok(_)) => Ok(()),
            Ok(Err(err)) => Err(PageError::Navigation {
                url: url.to_owned(),
                reason: err.to_string(),
            }),
            Err(_) => Err(PageError::Timeout {
                what: format!("navigation to {url}"),
                ms: self.settings.navigation_timeout_ms(),
            }),
        }
    }

    async fn click(&self, selector: &str) -> Result<(), PageError> {
        let element = self.element(selector).await?;
        element
            .click()
            .await
            .map_err(|e| PageError::ElementNotClickable {
                selector: selector.to_owned(),
                reason: e.to_string(),
            })?;
        tokio::time::sleep(self.settings.settle).await;
        Ok(())
    }

    async fn dispatch_click(&self, selector: &str) -> Result<(), PageError> {
        self.run_script(selector, scripts::dispatch_click(selector)).await?;
        tokio::time::sleep(self.settings.settle).await;
        Ok(())
    }

    async fn fill(&self, selector: &str, value: &str) -> Result<(), PageError> {
        self.run_script(selector, scripts::fill(selector, value)).await
    }

    async fn submit(&self, selector: &str) -> Result<(), PageError> {
        let element = self.element(selector).await?;
        element
            .focus()
            .await
            .map_err(|e| PageError::ElementNotClickable {
                selector: selector.to_owned(),
                reason: e.to_string(),
            })?
            .press_key("Enter")
            .await
            .map_err(|e| PageError::Script(e.to_string()))?;
        tokio::time::sleep(self.settings.settle).await;
        Ok(())
    }
}
