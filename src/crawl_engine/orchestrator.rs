//! Lineage loop and batch runner
//!
//! A lineage is a sequence of invocations linked by continuation
//! decisions. It runs as a loop over `CrawlState`, never as recursion.

use futures::StreamExt;
use futures::stream::FuturesUnordered;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tracing::{debug, error, info, warn};

use super::crawl_types::{CrawlReport, CrawlState};
use super::session::run_invocation;
use crate::config::CrawlConfig;
use crate::display::{self, needs_virtual_display};

/// Upper bound on invocations in one lineage
///
/// Depth bounds child continuations; a page redirecting to a fresh URL
/// every time is only bounded by this.
pub const MAX_LINEAGE_LENGTH: usize = 100;

/// Crawl `config.url` and follow continuations until the lineage ends
///
/// Returns one report per invocation, in order.
pub async fn crawl_lineage(config: &CrawlConfig, shared_display: Option<&str>) -> Vec<CrawlReport> {
    let mut reports = Vec::new();
    let mut next = Some(CrawlState::new(config.url(), config.recursive_depth()));

    while let Some(state) = next.take() {
        if reports.len() >= MAX_LINEAGE_LENGTH {
            warn!(
                target: "pagegraph::session",
                "Lineage reached {MAX_LINEAGE_LENGTH} invocations; not following {}",
                state.url
            );
            break;
        }

        let invocation_config = config
            .with_url(state.url.clone())
            .with_recursive_depth(state.depth);
        let outcome =
            run_invocation(&invocation_config, &state, reports.is_empty(), shared_display).await;

        if outcome.report.continuation.is_terminal() {
            debug!(target: "pagegraph::session", "Lineage ends at {}", state.url);
        }
        next = state.advance(&outcome.report.continuation, outcome.history);
        reports.push(outcome.report);
    }

    info!(
        target: "pagegraph::session",
        "Lineage from {} finished after {} invocation(s)",
        config.url(),
        reports.len()
    );
    reports
}

/// Result of one lineage in a batch
#[derive(Debug, Clone, Serialize)]
pub struct BatchOutcome {
    /// Position of the lineage's config in the batch input
    pub index: usize,
    pub url: String,
    pub reports: Vec<CrawlReport>,
    /// The lineage was abandoned at the per-crawl timeout
    pub timed_out: bool,
}

/// Run several lineages concurrently
///
/// At most `max_parallel` lineages run at once and each is abandoned after
/// `per_crawl_timeout`. Non-interactive crawls share one virtual display.
/// Outcomes come back in input order.
pub async fn crawl_batch(
    configs: Vec<CrawlConfig>,
    max_parallel: usize,
    per_crawl_timeout: Option<Duration>,
) -> Vec<BatchOutcome> {
    let needs_display = configs.iter().any(|c| needs_virtual_display(c.interactive()));
    let display = display::acquire(needs_display).await;
    let display_name: Option<Arc<str>> = display.as_ref().map(|d| Arc::from(d.display()));

    let semaphore = Arc::new(Semaphore::new(max_parallel.max(1)));
    let mut active_tasks = FuturesUnordered::new();

    for (index, config) in configs.into_iter().enumerate() {
        let semaphore = Arc::clone(&semaphore);
        let display_name = display_name.clone();

        active_tasks.push(tokio::spawn(async move {
            // The semaphore is never closed
            let _permit = semaphore.acquire_owned().await.ok();
            let url = config.url().to_string();
            let shared = display_name.as_deref().filter(|_| !config.interactive());

            let lineage = crawl_lineage(&config, shared);
            let (reports, timed_out) = match per_crawl_timeout {
                Some(limit) => match tokio::time::timeout(limit, lineage).await {
                    Ok(reports) => (reports, false),
                    Err(_) => {
                        warn!(
                            target: "pagegraph::session",
                            "Crawl of {url} exceeded {limit:?}; abandoning it"
                        );
                        (Vec::new(), true)
                    }
                },
                None => (lineage.await, false),
            };

            BatchOutcome {
                index,
                url,
                reports,
                timed_out,
            }
        }));
    }

    let mut outcomes = Vec::new();
    while let Some(joined) = active_tasks.next().await {
        match joined {
            Ok(outcome) => outcomes.push(outcome),
            Err(e) => error!(target: "pagegraph::session", "Crawl task panicked: {e}"),
        }
    }
    outcomes.sort_by_key(|o| o.index);

    if let Some(display) = display {
        display.stop().await;
    }
    outcomes
}
