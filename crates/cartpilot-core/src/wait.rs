//! Bounded polling against a page that changes underneath us.

use std::future::Future;
use std::time::Duration;

use scraper::{Html, Selector};

use crate::page::{PageDriver, PageError};

/// Calls `probe` every `interval` until it yields `Some` or `timeout` elapses.
///
/// The probe always runs at least once, even with a zero timeout.
pub async fn poll_until<T, F, Fut>(interval: Duration, timeout: Duration, mut probe: F) -> Option<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Option<T>>,
{
    let deadline = tokio::time::Instant::now() + timeout;
    loop {
        if let Some(value) = probe().await {
            return Some(value);
        }
        let now = tokio::time::Instant::now();
        if now >= deadline {
            return None;
        }
        tokio::time::sleep(interval.min(deadline - now)).await;
    }
}

/// Number of elements in `html` matching `selector`. Invalid selectors match
/// nothing.
#[must_use]
pub fn count_matches(html: &str, selector: &str) -> usize {
    let Ok(parsed) = Selector::parse(selector) else {
        tracing::debug!(selector, "ignoring invalid selector");
        return 0;
    };
    Html::parse_document(html).select(&parsed).count()
}

/// Waits until any of `selectors` matches and returns the first one that did.
///
/// # Errors
///
/// Returns [`PageError::Timeout`] when nothing matched in time, or the
/// driver's error if the page could not be read.
pub async fn wait_for_selector<D>(
    driver: &D,
    selectors: &[String],
    interval: Duration,
    timeout: Duration,
) -> Result<String, PageError>
where
    D: PageDriver + ?Sized,
{
    let deadline = tokio::time::Instant::now() + timeout;
    loop {
        let html = driver.content().await?;
        if let Some(selector) = selectors
            .iter()
            .find(|selector| count_matches(&html, selector) > 0)
        {
            return Ok(selector.clone());
        }
        let now = tokio::time::Instant::now();
        if now >= deadline {
            return Err(PageError::Timeout {
                what: format!("any of {selectors:?}"),
                #[allow(clippy::cast_possible_truncation)]
                ms: timeout.as_millis() as u64,
            });
        }
        tokio::time::sleep(interval.min(deadline - now)).await;
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU32, Ordering};

    use super::*;

    #[tokio::test]
    async fn poll_until_returns_first_some() {
        let calls = &AtomicU32::new(0);
        let result = poll_until(Duration::from_millis(1), Duration::from_secs(1), || async move {
            let n = calls.fetch_add(1, Ordering::SeqCst);
            (n >= 2).then_some(n)
        })
        .await;
        assert_eq!(result, Some(2));
    }

    #[tokio::test]
    async fn poll_until_gives_up_after_timeout() {
        let calls = &AtomicU32::new(0);
        let result: Option<()> =
            poll_until(Duration::from_millis(5), Duration::from_millis(20), || async move {
                calls.fetch_add(1, Ordering::SeqCst);
                None
            })
            .await;
        assert!(result.is_none());
        let n = calls.load(Ordering::SeqCst);
        assert!((2..=6).contains(&n), "unexpected probe count {n}");
    }

    #[tokio::test]
    async fn poll_until_probes_once_with_zero_timeout() {
        let calls = &AtomicU32::new(0);
        let _: Option<()> = poll_until(Duration::from_millis(5), Duration::ZERO, || async move {
            calls.fetch_add(1, Ordering::SeqCst);
            None
        })
        .await;
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn count_matches_ignores_invalid_selectors() {
        let html = r#"<div class="item"></div><div class="item"></div>"#;
        assert_eq!(count_matches(html, ".item"), 2);
        assert_eq!(count_matches(html, "div[[["), 0);
    }
}
