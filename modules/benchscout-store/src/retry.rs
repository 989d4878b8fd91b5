//! Explicit retry combinator. Every outbound call that may hit a transient
//! failure (grid writes, token fetches, downloads, uploads) goes through one
//! of these instead of an ad-hoc loop.

use std::future::Future;
use std::time::Duration;

use rand::Rng;
use tracing::warn;

#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub attempts: u32,
    pub initial_delay: Duration,
    pub multiplier: f64,
}

impl RetryPolicy {
    pub fn new(attempts: u32, initial_delay: Duration, multiplier: f64) -> Self {
        Self {
            attempts: attempts.max(1),
            initial_delay,
            multiplier,
        }
    }

    /// The grid backend's policy: 3 attempts, exponential backoff from 1.5 s.
    pub fn grid() -> Self {
        Self::new(
            benchscout_common::constants::GRID_MAX_RETRIES,
            Duration::from_secs_f64(benchscout_common::constants::GRID_RETRY_INITIAL_DELAY_SECS),
            2.0,
        )
    }

    pub fn download() -> Self {
        Self::new(
            benchscout_common::constants::PDF_DOWNLOAD_MAX_RETRIES,
            Duration::from_secs(2),
            2.0,
        )
    }

    fn delay_for(&self, attempt: u32) -> Duration {
        let base = self.initial_delay.as_secs_f64() * self.multiplier.powi(attempt as i32);
        let jitter = rand::thread_rng().gen_range(0.0..0.250);
        Duration::from_secs_f64(base + jitter)
    }
}

/// Run a fallible async operation under a retry policy. The final error is
/// returned once attempts are exhausted; intermediate errors log at WARN.
pub async fn retry_async<T, E, F, Fut>(policy: RetryPolicy, label: &str, mut op: F) -> Result<T, E>
where
    E: std::fmt::Display,
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
{
    let mut attempt = 0;
    loop {
        match op().await {
            Ok(value) => return Ok(value),
            Err(e) if attempt + 1 < policy.attempts => {
                let delay = policy.delay_for(attempt);
                warn!(
                    label,
                    attempt = attempt + 1,
                    max = policy.attempts,
                    delay_ms = delay.as_millis() as u64,
                    error = %e,
                    "retrying after failure"
                );
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
            Err(e) => return Err(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[tokio::test]
    async fn succeeds_first_try() {
        let calls = AtomicU32::new(0);
        let result: Result<u32, String> = retry_async(
            RetryPolicy::new(3, Duration::from_millis(1), 1.0),
            "test",
            || {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Ok(7) }
            },
        )
        .await;
        assert_eq!(result.unwrap(), 7);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn retries_until_success() {
        let calls = AtomicU32::new(0);
        let result: Result<u32, String> = retry_async(
            RetryPolicy::new(3, Duration::from_millis(1), 1.0),
            "test",
            || {
                let n = calls.fetch_add(1, Ordering::SeqCst);
                async move {
                    if n < 2 {
                        Err("transient".to_string())
                    } else {
                        Ok(42)
                    }
                }
            },
        )
        .await;
        assert_eq!(result.unwrap(), 42);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn exhaustion_returns_last_error() {
        let calls = AtomicU32::new(0);
        let result: Result<u32, String> = retry_async(
            RetryPolicy::new(3, Duration::from_millis(1), 1.0),
            "test",
            || {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err("down".to_string()) }
            },
        )
        .await;
        assert_eq!(result.unwrap_err(), "down");
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn zero_attempts_clamped_to_one() {
        let policy = RetryPolicy::new(0, Duration::from_millis(1), 2.0);
        assert_eq!(policy.attempts, 1);
    }
}
