//! Retry Logic with Exponential Backoff
//!
//! A producer session never retries on its own: an interrupted commit leaves
//! the outcome unknown and the caller decides whether to repeat it here or
//! from a resumed session. This module is the caller-side helper for that.
//!
//! ## Schedule
//!
//! ```text
//! ┌──────────────────────────────┐
//! │  RetryPolicy                 │
//! │  - max_retries: 5            │
//! │  - initial_backoff: 100ms    │
//! │  - max_backoff: 30s          │
//! │  - backoff_multiplier: 2.0   │
//! └──────┬───────────────────────┘
//!        │
//!        ├─→ Attempt 1: Immediate
//!        ├─→ Attempt 2: Wait 100ms
//!        ├─→ Attempt 3: Wait 200ms
//!        ├─→ Attempt 4: Wait 400ms
//!        ├─→ Attempt 5: Wait 800ms
//!        └─→ Attempt 6: Wait 1.6s
//! ```
//!
//! ## Retryable vs Non-Retryable Errors
//!
//! Only [`ErrorClass::Retriable`](crate::ErrorClass) errors are retried:
//! broker unavailable, request timed out, connection closed. Fencing, broker
//! rejections, illegal state and configuration errors are returned at once.
//!
//! ## Examples
//!
//! ```ignore
//! use handoff_client::retry::{RetryPolicy, retry_with_backoff};
//!
//! let policy = RetryPolicy::default();
//! retry_with_backoff(&policy, || session.flush()).await?;
//! ```

use crate::error::SessionError;
use std::future::Future;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, warn};

/// Retry policy configuration for exponential backoff.
///
/// # Backoff Calculation
///
/// ```text
/// backoff = min(initial_backoff * multiplier^attempt, max_backoff)
/// ```
///
/// # Examples
///
/// ```ignore
/// // Recovery after a broker restart: few, patient attempts
/// let policy = RetryPolicy {
///     max_retries: 3,
///     initial_backoff: Duration::from_millis(500),
///     max_backoff: Duration::from_secs(60),
///     backoff_multiplier: 3.0,
/// };
/// ```
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Maximum number of retry attempts
    pub max_retries: usize,

    pub initial_backoff: Duration,

    pub max_backoff: Duration,

    /// Backoff multiplier for exponential growth
    pub backoff_multiplier: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 5,
            initial_backoff: Duration::from_millis(100),
            max_backoff: Duration::from_secs(30),
            backoff_multiplier: 2.0,
        }
    }
}

impl RetryPolicy {
    pub fn new(
        max_retries: usize,
        initial_backoff: Duration,
        max_backoff: Duration,
        backoff_multiplier: f64,
    ) -> Self {
        Self {
            max_retries,
            initial_backoff,
            max_backoff,
            backoff_multiplier,
        }
    }

    /// Backoff before retry number `attempt + 1` (0-indexed).
    pub fn backoff(&self, attempt: usize) -> Duration {
        let backoff_ms =
            self.initial_backoff.as_millis() as f64 * self.backoff_multiplier.powi(attempt as i32);
        let backoff = Duration::from_millis(backoff_ms as u64);
        backoff.min(self.max_backoff)
    }

    /// `backoff(attempt)` scaled by a random factor in 0.75..1.25.
    pub fn jittered_backoff(&self, attempt: usize) -> Duration {
        let jitter = 0.75 + (rand::random::<f64>() * 0.5);
        Duration::from_millis((self.backoff(attempt).as_millis() as f64 * jitter) as u64)
    }

    pub fn is_retryable(&self, err: &SessionError) -> bool {
        err.is_retriable()
    }
}

/// Retry a session operation with exponential backoff.
///
/// Returns the first success, the first non-retryable error, or the last
/// error once `max_retries` retries are exhausted.
pub async fn retry_with_backoff<F, Fut, T>(
    policy: &RetryPolicy,
    operation: F,
) -> Result<T, SessionError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, SessionError>>,
{
    retry(policy, operation, false).await
}

/// Like [`retry_with_backoff`], with ±25% jitter on each wait.
///
/// Useful when many resumed sessions retry against the same recovering broker.
pub async fn retry_with_jittered_backoff<F, Fut, T>(
    policy: &RetryPolicy,
    operation: F,
) -> Result<T, SessionError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, SessionError>>,
{
    retry(policy, operation, true).await
}

async fn retry<F, Fut, T>(
    policy: &RetryPolicy,
    mut operation: F,
    jitter: bool,
) -> Result<T, SessionError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, SessionError>>,
{
    let mut attempt = 0;

    loop {
        match operation().await {
            Ok(result) => {
                if attempt > 0 {
                    debug!(attempt = attempt + 1, "Operation succeeded after retry");
                }
                return Ok(result);
            }
            Err(err) => {
                if !policy.is_retryable(&err) {
                    warn!(error = %err, class = ?err.class(), "Non-retryable error, giving up");
                    return Err(err);
                }

                if attempt >= policy.max_retries {
                    warn!(
                        attempt = attempt + 1,
                        max_retries = policy.max_retries,
                        error = %err,
                        "Max retries exhausted, giving up"
                    );
                    return Err(err);
                }

                let backoff = if jitter {
                    policy.jittered_backoff(attempt)
                } else {
                    policy.backoff(attempt)
                };
                warn!(
                    attempt = attempt + 1,
                    max_retries = policy.max_retries,
                    backoff_ms = backoff.as_millis() as u64,
                    error = %err,
                    "Retryable error, backing off"
                );

                sleep(backoff).await;
                attempt += 1;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::SessionState;
    use handoff_core::BrokerError;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    fn fast_policy(max_retries: usize) -> RetryPolicy {
        RetryPolicy::new(
            max_retries,
            Duration::from_millis(1),
            Duration::from_millis(5),
            2.0,
        )
    }

    fn unavailable() -> SessionError {
        SessionError::Transport(BrokerError::Unavailable("coordinator loading".to_string()))
    }

    #[test]
    fn test_retry_policy_default() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.max_retries, 5);
        assert_eq!(policy.initial_backoff, Duration::from_millis(100));
        assert_eq!(policy.max_backoff, Duration::from_secs(30));
        assert_eq!(policy.backoff_multiplier, 2.0);
    }

    #[test]
    fn test_backoff_exponential_growth_default() {
        let policy = RetryPolicy::default();

        assert_eq!(policy.backoff(0), Duration::from_millis(100));
        assert_eq!(policy.backoff(1), Duration::from_millis(200));
        assert_eq!(policy.backoff(2), Duration::from_millis(400));
        assert_eq!(policy.backoff(3), Duration::from_millis(800));
        assert_eq!(policy.backoff(4), Duration::from_millis(1600));
    }

    #[test]
    fn test_backoff_max_cap() {
        let policy = RetryPolicy::new(10, Duration::from_secs(1), Duration::from_secs(10), 2.0);

        assert_eq!(policy.backoff(3), Duration::from_secs(8));
        assert_eq!(policy.backoff(4), Duration::from_secs(10)); // Capped
        assert_eq!(policy.backoff(100), Duration::from_secs(10));
    }

    #[test]
    fn test_jittered_backoff_within_bounds() {
        let policy = RetryPolicy::default();
        for _ in 0..50 {
            let backoff = policy.jittered_backoff(2);
            assert!(backoff >= Duration::from_millis(300));
            assert!(backoff <= Duration::from_millis(500));
        }
    }

    #[test]
    fn test_is_retryable_by_class() {
        let policy = RetryPolicy::default();
        assert!(policy.is_retryable(&unavailable()));
        assert!(policy.is_retryable(&SessionError::Transport(BrokerError::RequestTimedOut(
            Duration::from_secs(1)
        ))));

        assert!(!policy.is_retryable(&SessionError::Fenced {
            transactional_id: "tx".to_string(),
            producer_id: 1,
            epoch: 0,
        }));
        assert!(!policy.is_retryable(&SessionError::IllegalState {
            operation: "send",
            state: SessionState::Ready,
        }));
        assert!(!policy.is_retryable(&SessionError::Config("bad".to_string())));
    }

    #[tokio::test]
    async fn test_retry_succeeds_after_transient_failures() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();

        let result = retry_with_backoff(&fast_policy(5), || {
            let counter = counter.clone();
            async move {
                if counter.fetch_add(1, Ordering::SeqCst) < 2 {
                    Err(unavailable())
                } else {
                    Ok(42)
                }
            }
        })
        .await;

        assert_eq!(result.unwrap(), 42);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_retry_stops_on_non_retryable() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();

        let result: Result<(), _> = retry_with_backoff(&fast_policy(5), || {
            let counter = counter.clone();
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Err(SessionError::Config("nope".to_string()))
            }
        })
        .await;

        assert!(matches!(result, Err(SessionError::Config(_))));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_retry_exhausts_max_retries() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();

        let result: Result<(), _> = retry_with_jittered_backoff(&fast_policy(3), || {
            let counter = counter.clone();
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Err(unavailable())
            }
        })
        .await;

        assert!(result.unwrap_err().is_retriable());
        // 1 initial + 3 retries
        assert_eq!(calls.load(Ordering::SeqCst), 4);
    }

    #[tokio::test]
    async fn test_zero_retries_tries_once() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();

        let _ = retry_with_backoff(&fast_policy(0), || {
            let counter = counter.clone();
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Err::<(), _>(unavailable())
            }
        })
        .await;

        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
