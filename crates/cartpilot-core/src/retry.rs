//! Bounded retry with exponential back-off and optional jitter.
//!
//! [`retry`] wraps any fallible async operation. Errors are classified through
//! [`Retriable`] before a retry is scheduled: transient failures (element not
//! found yet, timeouts, network) sleep and try again, while permanent failures
//! (validation, programmer errors) are returned immediately without consuming
//! the budget.

use std::future::Future;
use std::time::Duration;

/// Classifies an error as worth retrying or not.
pub trait Retriable {
    fn is_transient(&self) -> bool;
}

/// Retry configuration for one call site. Immutable; pass by reference.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Additional attempts after the first. Total attempts = `max_retries + 1`.
    pub max_retries: u32,
    pub initial_delay_ms: u64,
    pub max_delay_ms: u64,
    pub backoff_factor: f64,
    /// Spread each delay by ±25 % to avoid lock-step retries.
    pub jitter: bool,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            initial_delay_ms: 500,
            max_delay_ms: 8_000,
            backoff_factor: 2.0,
            jitter: true,
        }
    }
}

impl RetryPolicy {
    /// A policy that never sleeps; used by tests and polling call sites that
    /// already wait on their own.
    #[must_use]
    pub fn immediate(max_retries: u32) -> Self {
        Self {
            max_retries,
            initial_delay_ms: 0,
            max_delay_ms: 0,
            backoff_factor: 1.0,
            jitter: false,
        }
    }

    /// Un-jittered delay before retry number `attempt` (0-based):
    /// `min(max_delay_ms, initial_delay_ms * backoff_factor^attempt)`.
    #[must_use]
    pub fn base_delay_ms(&self, attempt: u32) -> u64 {
        #[allow(
            clippy::cast_possible_truncation,
            clippy::cast_sign_loss,
            clippy::cast_precision_loss,
            clippy::cast_possible_wrap
        )]
        let computed = (self.initial_delay_ms as f64
            * self.backoff_factor.max(0.0).powi(attempt.min(62) as i32))
        .min(self.max_delay_ms as f64) as u64;
        computed.min(self.max_delay_ms)
    }

    fn delay(&self, attempt: u32) -> Duration {
        let base = self.base_delay_ms(attempt);
        if !self.jitter || base == 0 {
            return Duration::from_millis(base);
        }
        #[allow(
            clippy::cast_possible_truncation,
            clippy::cast_sign_loss,
            clippy::cast_precision_loss
        )]
        let jittered = (base as f64 * (rand::random::<f64>() * 0.5 + 0.75)) as u64;
        Duration::from_millis(jittered.min(self.max_delay_ms))
    }
}

/// Runs `operation` until it succeeds, fails permanently, or exhausts
/// `policy.max_retries` retries. The last error is returned unchanged.
///
/// With `max_retries = 2` a permanently-transient failure calls `operation`
/// exactly three times.
///
/// # Errors
///
/// Returns the first non-transient error, or the last transient error once the
/// budget is spent.
pub async fn retry<T, E, F, Fut>(policy: &RetryPolicy, mut operation: F) -> Result<T, E>
where
    E: Retriable + std::fmt::Display,
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
{
    let mut attempt = 0u32;
    loop {
        match operation().await {
            Ok(value) => return Ok(value),
            Err(err) => {
                if !err.is_transient() || attempt >= policy.max_retries {
                    return Err(err);
                }
                let delay = policy.delay(attempt);
                #[allow(clippy::cast_possible_truncation)]
                let delay_ms = delay.as_millis() as u64;
                tracing::warn!(
                    attempt = attempt + 1,
                    max_retries = policy.max_retries,
                    delay_ms,
                    error = %err,
                    "transient error, retrying after back-off"
                );
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    use super::*;

    #[derive(Debug, PartialEq)]
    enum TestError {
        NotFoundYet,
        Invalid,
    }

    impl std::fmt::Display for TestError {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            write!(f, "{self:?}")
        }
    }

    impl Retriable for TestError {
        fn is_transient(&self) -> bool {
            matches!(self, TestError::NotFoundYet)
        }
    }

    #[test]
    fn base_delay_grows_exponentially_and_caps() {
        let policy = RetryPolicy {
            max_retries: 10,
            initial_delay_ms: 100,
            max_delay_ms: 1_000,
            backoff_factor: 2.0,
            jitter: false,
        };
        assert_eq!(policy.base_delay_ms(0), 100);
        assert_eq!(policy.base_delay_ms(1), 200);
        assert_eq!(policy.base_delay_ms(3), 800);
        assert_eq!(policy.base_delay_ms(4), 1_000);
        assert_eq!(policy.base_delay_ms(40), 1_000);
    }

    #[test]
    fn jittered_delay_never_exceeds_cap() {
        let policy = RetryPolicy {
            max_retries: 3,
            initial_delay_ms: 1_000,
            max_delay_ms: 1_000,
            backoff_factor: 2.0,
            jitter: true,
        };
        for attempt in 0..5 {
            assert!(policy.delay(attempt) <= Duration::from_millis(1_000));
        }
    }

    #[tokio::test]
    async fn succeeds_immediately_on_first_try() {
        let calls = Arc::new(AtomicU32::new(0));
        let c = Arc::clone(&calls);
        let result = retry(&RetryPolicy::immediate(3), || {
            let c = Arc::clone(&c);
            async move {
                c.fetch_add(1, Ordering::SeqCst);
                Ok::<u32, TestError>(42)
            }
        })
        .await;
        assert_eq!(result.unwrap(), 42);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn always_failing_transient_error_is_called_max_retries_plus_one_times() {
        let calls = Arc::new(AtomicU32::new(0));
        let c = Arc::clone(&calls);
        let result = retry(&RetryPolicy::immediate(2), || {
            let c = Arc::clone(&c);
            async move {
                c.fetch_add(1, Ordering::SeqCst);
                Err::<u32, _>(TestError::NotFoundYet)
            }
        })
        .await;
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        assert_eq!(result, Err(TestError::NotFoundYet));
    }

    #[tokio::test]
    async fn retries_then_succeeds() {
        let calls = Arc::new(AtomicU32::new(0));
        let c = Arc::clone(&calls);
        let result = retry(&RetryPolicy::immediate(3), || {
            let c = Arc::clone(&c);
            async move {
                if c.fetch_add(1, Ordering::SeqCst) < 2 {
                    Err(TestError::NotFoundYet)
                } else {
                    Ok(7)
                }
            }
        })
        .await;
        assert_eq!(result, Ok(7));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn permanent_error_is_not_retried() {
        let calls = Arc::new(AtomicU32::new(0));
        let c = Arc::clone(&calls);
        let result = retry(&RetryPolicy::immediate(5), || {
            let c = Arc::clone(&c);
            async move {
                c.fetch_add(1, Ordering::SeqCst);
                Err::<u32, _>(TestError::Invalid)
            }
        })
        .await;
        assert_eq!(calls.load(Ordering::SeqCst), 1, "Invalid must not be retried");
        assert_eq!(result, Err(TestError::Invalid));
    }

    #[tokio::test]
    async fn sleeps_between_attempts() {
        let policy = RetryPolicy {
            max_retries: 2,
            initial_delay_ms: 10,
            max_delay_ms: 1_000,
            backoff_factor: 2.0,
            jitter: false,
        };
        let started = std::time::Instant::now();
        let _ = retry(&policy, || async { Err::<(), _>(TestError::NotFoundYet) }).await;
        // 10 ms + 20 ms of back-off.
        assert!(started.elapsed() >= Duration::from_millis(30));
    }
}
