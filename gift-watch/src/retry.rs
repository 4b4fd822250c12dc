//! Bounded retry on rate-limit errors.
//!
//! Only [`Error::RateLimited`] is retried: the operation is re-run after the
//! remote's advertised delay, at most `max_attempts` times in total. Every
//! other error is returned to the caller immediately. The back-off sleep races
//! the cancellation token so shutdown never waits out a long `retry_after`.

use std::future::Future;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::{Error, Result};

/// Attempt ceiling for rate-limited operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts including the first one. Zero behaves like one.
    pub max_attempts: u32,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self { max_attempts: 3 }
    }
}

impl RetryPolicy {
    pub fn new(max_attempts: u32) -> Self {
        Self { max_attempts }
    }

    fn ceiling(&self) -> u32 {
        self.max_attempts.max(1)
    }
}

/// Sleep for `duration` unless cancelled first.
pub async fn sleep_or_cancel(duration: Duration, cancel: &CancellationToken) -> Result<()> {
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(Error::Cancelled),
        _ = tokio::time::sleep(duration) => Ok(()),
    }
}

/// Run `op`, retrying it after the advertised delay while it is rate limited.
///
/// Returns the last `RateLimited` error once the ceiling is reached, or
/// [`Error::Cancelled`] if cancellation interrupts a back-off sleep.
pub async fn retry_on_rate_limit<T, F, Fut>(
    op_name: &str,
    policy: RetryPolicy,
    cancel: &CancellationToken,
    mut op: F,
) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let ceiling = policy.ceiling();
    let mut attempt = 1u32;

    loop {
        let err = match op().await {
            Ok(value) => return Ok(value),
            Err(err) => err,
        };

        let Some(wait) = err.retry_after() else {
            return Err(err);
        };

        if attempt >= ceiling {
            warn!(
                op = op_name,
                attempts = attempt,
                retry_after = ?wait,
                "Rate limit: max attempts exceeded"
            );
            return Err(err);
        }

        debug!(
            op = op_name,
            retry_after = ?wait,
            attempt,
            max_attempts = ceiling,
            "Rate limited, waiting before retry"
        );
        sleep_or_cancel(wait, cancel).await?;
        attempt += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicU32, Ordering};
    use tokio::time::Instant;

    #[tokio::test(start_paused = true)]
    async fn test_retries_after_advertised_delay() {
        let calls = Arc::new(AtomicU32::new(0));
        let cancel = CancellationToken::new();
        let start = Instant::now();

        let c = calls.clone();
        let result = retry_on_rate_limit("op", RetryPolicy::new(3), &cancel, || {
            let c = c.clone();
            async move {
                if c.fetch_add(1, Ordering::SeqCst) == 0 {
                    Err(Error::rate_limited(Duration::from_secs(5)))
                } else {
                    Ok(42)
                }
            }
        })
        .await;

        assert_eq!(result.unwrap(), 42);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert!(start.elapsed() >= Duration::from_secs(5));
    }

    #[tokio::test(start_paused = true)]
    async fn test_gives_up_at_ceiling() {
        let calls = Arc::new(AtomicU32::new(0));
        let cancel = CancellationToken::new();
        let start = Instant::now();

        let c = calls.clone();
        let result: Result<()> = retry_on_rate_limit("op", RetryPolicy::new(3), &cancel, || {
            let c = c.clone();
            async move {
                c.fetch_add(1, Ordering::SeqCst);
                Err(Error::rate_limited(Duration::from_secs(2)))
            }
        })
        .await;

        assert!(result.unwrap_err().is_rate_limited());
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        // Two sleeps between three attempts.
        assert!(start.elapsed() >= Duration::from_secs(4));
    }

    #[tokio::test]
    async fn test_other_errors_are_not_retried() {
        let calls = Arc::new(AtomicU32::new(0));
        let cancel = CancellationToken::new();

        let c = calls.clone();
        let result: Result<()> = retry_on_rate_limit("op", RetryPolicy::default(), &cancel, || {
            let c = c.clone();
            async move {
                c.fetch_add(1, Ordering::SeqCst);
                Err(Error::transient("connection reset"))
            }
        })
        .await;

        assert!(result.unwrap_err().is_transient());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_interrupts_backoff() {
        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(1)).await;
            trigger.cancel();
        });

        let start = Instant::now();
        let result: Result<()> = retry_on_rate_limit("op", RetryPolicy::new(5), &cancel, || async {
            Err(Error::rate_limited(Duration::from_secs(3600)))
        })
        .await;

        assert!(matches!(result, Err(Error::Cancelled)));
        assert!(start.elapsed() < Duration::from_secs(3600));
    }

    #[test]
    fn test_zero_attempts_behaves_like_one() {
        assert_eq!(RetryPolicy::new(0).ceiling(), 1);
    }
}
