//! Top-level navigation policy
//!
//! `NavigationPolicy::decide` is the pure decision table consulted for every
//! intercepted request. `NavigationGate` applies the side effects of a
//! decision (early-stop flag, stop-loading command, redirect target) so the
//! table itself stays free of state mutation.
//!
//! Every request is allowed through regardless of the decision: a request
//! left paused would stall the browser's pending-request accounting. The
//! decision only controls whether the capture window ends early and where
//! the lineage goes next.

use std::sync::Mutex;
use tracing::{debug, info};

use super::history::NavigationHistory;
use super::waiter::EarlyStop;

/// Classification of one intercepted request
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NavigationDecision {
    /// Let the request through with no state change
    Allow,
    /// Top-level navigation to a URL this lineage has not seen
    RedirectDetected(String),
    /// Top-level navigation back to a visited URL with duplicates disabled
    LoopDetected,
}

impl NavigationDecision {
    /// Whether the decision ends the capture window early
    #[must_use]
    pub fn stops_capture(&self) -> bool {
        !matches!(self, Self::Allow)
    }
}

/// Crawl options the decision table consults
#[derive(Debug, Clone, Copy, Default)]
pub struct NavigationPolicy {
    pub crawl_duplicates: bool,
}

impl NavigationPolicy {
    #[must_use]
    pub fn new(crawl_duplicates: bool) -> Self {
        Self { crawl_duplicates }
    }

    /// Classify one request, in strict priority order:
    ///
    /// 1. not top-level: allow
    /// 2. the invocation's own target: allow
    /// 3. never seen: redirect detected
    /// 4. seen, duplicates enabled: allow
    /// 5. seen, duplicates disabled: loop detected
    #[must_use]
    pub fn decide(&self, history: &NavigationHistory, url: &str, is_top_level: bool) -> NavigationDecision {
        if !is_top_level {
            return NavigationDecision::Allow;
        }
        if history.is_current_url(url) {
            return NavigationDecision::Allow;
        }
        if !history.is_in_history(url) {
            return NavigationDecision::RedirectDetected(url.to_string());
        }
        if self.crawl_duplicates {
            return NavigationDecision::Allow;
        }
        NavigationDecision::LoopDetected
    }
}

/// Halts further loading of the page without blocking the caller
///
/// Implementations fire the command and return; the interception is
/// released without waiting for the stop to take effect.
pub trait StopLoading: Send + Sync {
    fn stop_loading(&self);
}

/// Applies navigation decisions for one capture cycle
pub struct NavigationGate {
    policy: NavigationPolicy,
    history: NavigationHistory,
    early_stop: EarlyStop,
    redirect_target: Mutex<Option<String>>,
}

impl NavigationGate {
    #[must_use]
    pub fn new(policy: NavigationPolicy, history: NavigationHistory, early_stop: EarlyStop) -> Self {
        Self {
            policy,
            history,
            early_stop,
            redirect_target: Mutex::new(None),
        }
    }

    /// Decide on one request and apply the decision's side effects
    ///
    /// The caller must always release the request afterwards.
    pub fn on_request(&self, url: &str, is_top_level: bool, page: &dyn StopLoading) -> NavigationDecision {
        let decision = self.policy.decide(&self.history, url, is_top_level);

        match &decision {
            NavigationDecision::Allow => {
                if is_top_level {
                    debug!(target: "pagegraph::policy", "Allowing top-level navigation to {url}");
                }
            }
            NavigationDecision::RedirectDetected(target) => {
                info!(target: "pagegraph::policy", "Redirect detected: {} -> {target}", self.history.current());
                // Last detected redirect wins; it is where the page ends up
                *self.lock_redirect() = Some(target.clone());
                self.early_stop.trigger();
                page.stop_loading();
            }
            NavigationDecision::LoopDetected => {
                info!(
                    target: "pagegraph::policy",
                    "Redirect loop detected: {url} already crawled in this lineage"
                );
                self.early_stop.trigger();
                page.stop_loading();
            }
        }

        decision
    }

    fn lock_redirect(&self) -> std::sync::MutexGuard<'_, Option<String>> {
        self.redirect_target
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    /// Pending redirect continuation target, if a redirect was detected
    #[must_use]
    pub fn redirect_target(&self) -> Option<String> {
        self.lock_redirect().clone()
    }

    #[must_use]
    pub fn early_stop(&self) -> &EarlyStop {
        &self.early_stop
    }

    #[must_use]
    pub fn history(&self) -> &NavigationHistory {
        &self.history
    }
}
