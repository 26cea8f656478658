//! Browser launch with bounded exponential backoff
//!
//! The first attempt runs immediately; attempt `i` (1-based retry) waits
//! `2^(i-1)` backoff units first. The final failure is what surfaces.

use std::future::Future;
use std::time::Duration;
use tracing::{info, warn};

use super::crawl_types::CrawlError;
use crate::utils::{DEFAULT_LAUNCH_RETRIES, LAUNCH_BACKOFF_BASE};

/// Retry policy for launching the browser process
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Retries after the first attempt
    pub retries: u32,
    /// Delay before the first retry; doubles for each subsequent retry
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            retries: DEFAULT_LAUNCH_RETRIES,
            base_delay: LAUNCH_BACKOFF_BASE,
        }
    }
}

impl RetryPolicy {
    #[must_use]
    pub fn with_retries(retries: u32) -> Self {
        Self {
            retries,
            ..Self::default()
        }
    }

    /// Delay before `attempt` (0-based). Attempt 0 is never delayed.
    #[must_use]
    pub fn delay_for(&self, attempt: u32) -> Duration {
        if attempt == 0 {
            return Duration::ZERO;
        }
        let factor = 2u32.saturating_pow(attempt - 1);
        self.base_delay.saturating_mul(factor)
    }

    /// Total number of calls the policy allows
    #[must_use]
    pub fn max_attempts(&self) -> u32 {
        self.retries.saturating_add(1)
    }
}

/// Run `launch` until it succeeds or the policy is spent
///
/// `launch` receives the 0-based attempt number. Partially started
/// resources from a failed attempt are the launcher's responsibility.
///
/// # Errors
/// `CrawlError::LaunchExhausted` carrying the last underlying failure.
pub async fn launch_with_retry<F, Fut, T, E>(policy: RetryPolicy, mut launch: F) -> Result<T, CrawlError>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: std::fmt::Display,
{
    let mut last_error = String::from("no launch attempted");

    for attempt in 0..policy.max_attempts() {
        let delay = policy.delay_for(attempt);
        if !delay.is_zero() {
            info!(
                target: "pagegraph::launch",
                "Retrying browser launch in {:?} (attempt {}/{})",
                delay,
                attempt + 1,
                policy.max_attempts()
            );
            tokio::time::sleep(delay).await;
        }

        match launch(attempt).await {
            Ok(handle) => {
                if attempt > 0 {
                    info!(target: "pagegraph::launch", "Browser launched after {} failed attempts", attempt);
                }
                return Ok(handle);
            }
            Err(e) => {
                warn!(
                    target: "pagegraph::launch",
                    "Browser launch attempt {}/{} failed: {e:#}",
                    attempt + 1,
                    policy.max_attempts()
                );
                last_error = format!("{e:#}");
            }
        }
    }

    Err(CrawlError::LaunchExhausted {
        attempts: policy.max_attempts(),
        last_error,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_delays_are_1_2_4_seconds() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.delay_for(0), Duration::ZERO);
        assert_eq!(policy.delay_for(1), Duration::from_secs(1));
        assert_eq!(policy.delay_for(2), Duration::from_secs(2));
        assert_eq!(policy.delay_for(3), Duration::from_secs(4));
        assert_eq!(policy.max_attempts(), 4);
    }

    #[tokio::test(start_paused = true)]
    async fn test_success_on_first_attempt_does_not_sleep() {
        let start = tokio::time::Instant::now();
        let result = launch_with_retry(RetryPolicy::default(), |_| async { Ok::<_, String>(7) }).await;
        assert_eq!(result.unwrap(), 7);
        assert_eq!(start.elapsed(), Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn test_zero_retries_means_single_attempt() {
        let mut calls = 0;
        let result = launch_with_retry(RetryPolicy::with_retries(0), |_| {
            calls += 1;
            async { Err::<(), _>("nope") }
        })
        .await;
        assert!(matches!(result, Err(CrawlError::LaunchExhausted { attempts: 1, .. })));
        assert_eq!(calls, 1);
    }
}
