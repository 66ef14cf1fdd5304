//! An in-memory [`PageDriver`] for tests.
//!
//! Pages are HTML fixtures keyed by URL. Clicking an element follows its own
//! (or the nearest ancestor's) `href` or `data-goto`; submitting follows the
//! `data-goto` of the element or its form. Nothing touches a network.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use scraper::{ElementRef, Html, Selector};

use crate::page::{PageDriver, PageError};

#[derive(Debug, Default)]
struct State {
    current_url: String,
    visited: Vec<String>,
    clicks: Vec<String>,
    dispatched: Vec<String>,
    filled: HashMap<String, String>,
}

#[derive(Debug, Default)]
pub struct FakePage {
    pages: Mutex<HashMap<String, String>>,
    state: Mutex<State>,
    ignore_native_clicks: bool,
}

impl FakePage {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `html` as the document served at `url`.
    #[must_use]
    pub fn with_page(self, url: &str, html: impl Into<String>) -> Self {
        self.add_page(url, html);
        self
    }

    /// Native `click` becomes a no-op; only `dispatch_click` navigates.
    #[must_use]
    pub fn ignoring_native_clicks(mut self) -> Self {
        self.ignore_native_clicks = true;
        self
    }

    pub fn add_page(&self, url: &str, html: impl Into<String>) {
        lock(&self.pages).insert(url.to_owned(), html.into());
    }

    #[must_use]
    pub fn visited(&self) -> Vec<String> {
        lock(&self.state).visited.clone()
    }

    #[must_use]
    pub fn clicks(&self) -> Vec<String> {
        lock(&self.state).clicks.clone()
    }

    #[must_use]
    pub fn dispatched(&self) -> Vec<String> {
        lock(&self.state).dispatched.clone()
    }

    #[must_use]
    pub fn filled(&self, selector: &str) -> Option<String> {
        lock(&self.state).filled.get(selector).cloned()
    }

    fn go(&self, url: &str) -> Result<(), PageError> {
        let target = {
            let state = lock(&self.state);
            resolve(&state.current_url, url)
        };
        if !lock(&self.pages).contains_key(&target) {
            return Err(PageError::Navigation {
                url: target,
                reason: "no fixture registered".to_owned(),
            });
        }
        let mut state = lock(&self.state);
        state.current_url.clone_from(&target);
        state.visited.push(target);
        Ok(())
    }

    fn html(&self) -> Result<String, PageError> {
        let url = lock(&self.state).current_url.clone();
        lock(&self.pages)
            .get(&url)
            .cloned()
            .ok_or(PageError::Closed)
    }

    /// The navigation target of the first element matching `selector`.
    fn target_of(&self, selector: &str, attrs: &[&str], walk_up: bool) -> Result<Option<String>, PageError> {
        let html = self.html()?;
        let parsed = Selector::parse(selector)
            .map_err(|_| PageError::SelectorNotFound(selector.to_owned()))?;
        let document = Html::parse_document(&html);
        let element = document
            .select(&parsed)
            .next()
            .ok_or_else(|| PageError::SelectorNotFound(selector.to_owned()))?;
        if element.value().attr("disabled").is_some() {
            return Err(PageError::ElementNotClickable {
                selector: selector.to_owned(),
                reason: "disabled".to_owned(),
            });
        }
        let chain: Vec<ElementRef<'_>> = if walk_up {
            std::iter::once(element)
                .chain(element.ancestors().filter_map(ElementRef::wrap))
                .collect()
        } else {
            vec![element]
        };
        Ok(chain
            .into_iter()
            .find_map(|el| attrs.iter().find_map(|a| el.value().attr(a)))
            .map(str::to_owned))
    }
}

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(std::sync::PoisonError::into_inner)
}

fn resolve(current: &str, target: &str) -> String {
    if target.starts_with("http://") || target.starts_with("https://") {
        return target.to_owned();
    }
    let origin_end = current
        .match_indices('/')
        .nth(2)
        .map_or(current.len(), |(i, _)| i);
    format!("{}/{}", &current[..origin_end], target.trim_start_matches('/'))
}

#[async_trait]
impl PageDriver for FakePage {
    async fn current_url(&self) -> Result<String, PageError> {
        Ok(lock(&self.state).current_url.clone())
    }

    async fn content(&self) -> Result<String, PageError> {
        self.html()
    }

    async fn navigate(&self, url: &str) -> Result<(), PageError> {
        self.go(url)
    }

    async fn click(&self, selector: &str) -> Result<(), PageError> {
        let target = self.target_of(selector, &["href", "data-goto"], true)?;
        lock(&self.state).clicks.push(selector.to_owned());
        if self.ignore_native_clicks {
            return Ok(());
        }
        match target {
            Some(url) => self.go(&url),
            None => Ok(()),
        }
    }

    async fn dispatch_click(&self, selector: &str) -> Result<(), PageError> {
        let target = self.target_of(selector, &["href", "data-goto"], true)?;
        lock(&self.state).dispatched.push(selector.to_owned());
        match target {
            Some(url) => self.go(&url),
            None => Ok(()),
        }
    }

    async fn fill(&self, selector: &str, value: &str) -> Result<(), PageError> {
        self.target_of(selector, &[], false)?;
        lock(&self.state)
            .filled
            .insert(selector.to_owned(), value.to_owned());
        Ok(())
    }

    async fn submit(&self, selector: &str) -> Result<(), PageError> {
        match self.target_of(selector, &["data-goto"], true)? {
            Some(url) => self.go(&url),
            None => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn click_follows_ancestor_href() {
        let page = FakePage::new()
            .with_page(
                "https://shop.test/s",
                r#"<a href="/p/1"><span class="t">One</span></a>"#,
            )
            .with_page("https://shop.test/p/1", "<h1>One</h1>");
        page.navigate("https://shop.test/s").await.unwrap();
        page.click(".t").await.unwrap();
        assert_eq!(page.current_url().await.unwrap(), "https://shop.test/p/1");
        assert_eq!(page.clicks(), vec![".t".to_string()]);
    }

    #[tokio::test]
    async fn ignored_native_click_needs_dispatch() {
        let page = FakePage::new()
            .with_page("https://shop.test/s", r#"<a id="go" data-goto="/next">x</a>"#)
            .with_page("https://shop.test/next", "<p>next</p>")
            .ignoring_native_clicks();
        page.navigate("https://shop.test/s").await.unwrap();
        page.click("#go").await.unwrap();
        assert_eq!(page.current_url().await.unwrap(), "https://shop.test/s");
        page.dispatch_click("#go").await.unwrap();
        assert_eq!(page.current_url().await.unwrap(), "https://shop.test/next");
    }

    #[tokio::test]
    async fn missing_element_and_unknown_page_are_errors() {
        let page = FakePage::new().with_page("https://shop.test/s", "<p></p>");
        assert!(matches!(
            page.navigate("https://shop.test/none").await,
            Err(PageError::Navigation { .. })
        ));
        page.navigate("https://shop.test/s").await.unwrap();
        assert!(matches!(
            page.click("#buy").await,
            Err(PageError::SelectorNotFound(_))
        ));
    }
}
