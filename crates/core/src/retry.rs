//! Exponential backoff retry utility
//!
//! Used around collaborator reads that the caller cannot do without, such as
//! fetching the candidate content set.
//!
//! # Examples
//!
//! ```
//! use herbwise_core::retry::{retry_with_backoff, RetryPolicy};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let result = retry_with_backoff(
//!     || async { Ok::<_, std::io::Error>("candidates") },
//!     RetryPolicy::default(),
//!     |err: &std::io::Error| err.kind() == std::io::ErrorKind::TimedOut,
//! )
//! .await?;
//! assert_eq!(result, "candidates");
//! # Ok(())
//! # }
//! ```

use std::future::Future;
use std::time::Duration;
use tokio::time::sleep;

/// Retry policy configuration for exponential backoff
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Maximum number of retry attempts (0 means only the initial attempt)
    pub max_retries: u32,

    /// Delay in milliseconds before the first retry
    pub base_delay_ms: u64,

    /// Upper bound on any single delay
    pub max_delay_ms: u64,

    /// Add up to 30% random jitter to each delay
    pub jitter: bool,
}

impl Default for RetryPolicy {
    /// - max_retries: 2
    /// - base_delay_ms: 20
    /// - max_delay_ms: 200
    /// - jitter: true
    fn default() -> Self {
        Self {
            max_retries: 2,
            base_delay_ms: 20,
            max_delay_ms: 200,
            jitter: true,
        }
    }
}

impl RetryPolicy {
    pub fn new(max_retries: u32, base_delay_ms: u64, max_delay_ms: u64, jitter: bool) -> Self {
        Self {
            max_retries,
            base_delay_ms,
            max_delay_ms,
            jitter,
        }
    }

    /// A policy that never retries
    pub fn none() -> Self {
        Self::new(0, 0, 0, false)
    }

    /// Delay before retry number `attempt` (0-indexed):
    /// `min(base * 2^attempt, max)` plus optional jitter.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let exponential = self
            .base_delay_ms
            .saturating_mul(2_u64.saturating_pow(attempt));
        let capped = exponential.min(self.max_delay_ms);

        let delay = if self.jitter {
            let jitter_range = (capped as f64 * 0.3) as u64;
            if jitter_range > 0 {
                let nanos = std::time::SystemTime::now()
                    .duration_since(std::time::UNIX_EPOCH)
                    .unwrap_or_default()
                    .subsec_nanos() as u64;
                capped.saturating_add(nanos % (jitter_range + 1))
            } else {
                capped
            }
        } else {
            capped
        };

        Duration::from_millis(delay)
    }
}

/// Run `operation`, retrying failures accepted by `is_retryable` according
/// to `policy`. The last error is returned once retries are exhausted.
pub async fn retry_with_backoff<F, Fut, T, E, P>(
    mut operation: F,
    policy: RetryPolicy,
    is_retryable: P,
) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    P: Fn(&E) -> bool,
{
    let mut attempt = 0;

    loop {
        match operation().await {
            Ok(result) => {
                if attempt > 0 {
                    tracing::debug!(attempt, "Operation succeeded after retry");
                }
                return Ok(result);
            }
            Err(error) => {
                if attempt >= policy.max_retries {
                    if policy.max_retries > 0 {
                        tracing::warn!(
                            attempt,
                            max_retries = policy.max_retries,
                            "All retry attempts exhausted"
                        );
                    }
                    return Err(error);
                }

                if !is_retryable(&error) {
                    tracing::debug!(attempt, "Error is not retryable, failing immediately");
                    return Err(error);
                }

                let delay = policy.delay_for(attempt);
                tracing::debug!(
                    attempt,
                    delay_ms = delay.as_millis() as u64,
                    "Retrying after delay"
                );

                sleep(delay).await;
                attempt += 1;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    #[test]
    fn test_delay_without_jitter() {
        let policy = RetryPolicy::new(5, 10, 50, false);
        assert_eq!(policy.delay_for(0), Duration::from_millis(10));
        assert_eq!(policy.delay_for(1), Duration::from_millis(20));
        assert_eq!(policy.delay_for(2), Duration::from_millis(40));
        assert_eq!(policy.delay_for(3), Duration::from_millis(50));
        assert_eq!(policy.delay_for(30), Duration::from_millis(50));
    }

    #[test]
    fn test_delay_with_jitter_bounded() {
        let policy = RetryPolicy::new(3, 100, 1000, true);
        for attempt in 0..4 {
            let base = (100u64 << attempt).min(1000);
            let delay = policy.delay_for(attempt).as_millis() as u64;
            assert!(delay >= base && delay <= base + base * 3 / 10);
        }
    }

    #[tokio::test]
    async fn test_succeeds_after_transient_failures() {
        let calls = Arc::new(AtomicU32::new(0));
        let counter = Arc::clone(&calls);

        let result: Result<&str, &str> = retry_with_backoff(
            || {
                let counter = Arc::clone(&counter);
                async move {
                    if counter.fetch_add(1, Ordering::SeqCst) < 2 {
                        Err("unavailable")
                    } else {
                        Ok("ok")
                    }
                }
            },
            RetryPolicy::new(3, 1, 2, false),
            |_| true,
        )
        .await;

        assert_eq!(result, Ok("ok"));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_non_retryable_fails_immediately() {
        let calls = Arc::new(AtomicU32::new(0));
        let counter = Arc::clone(&calls);

        let result: Result<(), &str> = retry_with_backoff(
            || {
                let counter = Arc::clone(&counter);
                async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                    Err("bad request")
                }
            },
            RetryPolicy::new(3, 1, 2, false),
            |_| false,
        )
        .await;

        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_exhausts_retries() {
        let calls = AtomicU32::new(0);

        let result: Result<(), &str> = tokio_test::block_on(retry_with_backoff(
            || {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err("down") }
            },
            RetryPolicy::new(2, 1, 1, false),
            |_| true,
        ));

        assert_eq!(result, Err("down"));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }
}
