//! Bounded, cancellable wait for the capture window
//!
//! The waiter polls an early-stop predicate on a fixed interval and returns
//! once either the predicate fires or the deadline passes. The predicate is
//! the only cancellation mechanism.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::time::{Instant, MissedTickBehavior, interval};
use tracing::debug;

use crate::utils::WAIT_POLL_INTERVAL;

/// Shared early-stop cell
///
/// Written by the navigation gate when a page's trajectory is known, read by
/// the waiter. Created per capture cycle and dropped with it.
#[derive(Debug, Clone, Default)]
pub struct EarlyStop(Arc<AtomicBool>);

impl EarlyStop {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Request an early stop. Returns `true` only for the call that flipped it.
    pub fn trigger(&self) -> bool {
        !self.0.swap(true, Ordering::SeqCst)
    }

    #[must_use]
    pub fn is_triggered(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Wait up to `duration`, polling `should_stop` every 500 ms
///
/// Returns `true` when the deadline was reached and `false` when
/// `should_stop` returned true first. The poll timer is owned by this call
/// and released on both exit paths.
pub async fn wait_for<F>(duration: Duration, should_stop: F) -> bool
where
    F: Fn() -> bool,
{
    wait_with_interval(duration, WAIT_POLL_INTERVAL, should_stop).await
}

/// `wait_for` with an explicit poll interval
pub async fn wait_with_interval<F>(duration: Duration, poll: Duration, should_stop: F) -> bool
where
    F: Fn() -> bool,
{
    let deadline = Instant::now() + duration;
    let mut ticker = interval(poll);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        ticker.tick().await;

        if should_stop() {
            debug!(target: "pagegraph::wait", "Early stop requested, ending wait");
            return false;
        }
        if Instant::now() >= deadline {
            debug!(target: "pagegraph::wait", "Wait of {:?} elapsed", duration);
            return true;
        }
    }
}

/// Wait for the capture window using an `EarlyStop` cell as the predicate
pub async fn wait_until_stopped(duration: Duration, stop: &EarlyStop) -> bool {
    wait_for(duration, || stop.is_triggered()).await
}
