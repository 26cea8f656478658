//! One crawl invocation
//!
//! `Init -> EnvReady -> BrowserLaunched -> PageOpened -> Navigated ->
//! Captured -> Persisted`, then a continuation decision. Failures are
//! caught at three nested boundaries (page, browser, invocation) and
//! recorded in the report; teardown runs on every path.

use anyhow::{Context, Result};
use chromiumoxide::cdp::browser_protocol::page::{EventDomContentEventFired, NavigateParams};
use chromiumoxide::{Browser, Page};
use chrono::Utc;
use futures::StreamExt;
use std::path::Path;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use super::child_links::select_random_child_url;
use super::cleanup::{CleanupResult, cleanup_browser, close_page, teardown_environment};
use super::crawl_types::{ArtifactPaths, ContinuationDecision, CrawlReport, CrawlState};
use super::history::NavigationHistory;
use super::interception::{self, CrashWatcher};
use super::launch::{RetryPolicy, launch_with_retry};
use super::navigation_policy::{NavigationGate, NavigationPolicy};
use super::page_timeout::{is_navigation_timeout, with_page_timeout};
use super::waiter::{EarlyStop, wait_until_stopped};
use crate::artifacts::{self, ArtifactTarget};
use crate::browser_profile::prepare_profile;
use crate::browser_setup::{apply_stealth_measures, build_browser_config, launch_once, resolve_executable};
use crate::config::CrawlConfig;
use crate::display::{self, VirtualDisplay, needs_virtual_display};
use crate::har::build_har;
use crate::page_graph::generate_page_graph;
use crate::telemetry;
use crate::utils::constants::BODY_SETTLE_TIMEOUT;

/// What one invocation hands back to the lineage loop
#[derive(Debug)]
pub struct InvocationOutcome {
    pub report: CrawlReport,
    /// Lineage history including this invocation's target
    pub history: Vec<String>,
}

/// Aborts a background task when dropped
struct TaskGuard(JoinHandle<()>);

impl Drop for TaskGuard {
    fn drop(&mut self) {
        self.0.abort();
    }
}

/// Results that survive a failure part-way through the page scope
#[derive(Debug, Default)]
struct Progress {
    artifacts: ArtifactPaths,
    child_url: Option<String>,
    timed_out: Option<bool>,
}

/// Run one invocation for `state`
///
/// `first` marks the first invocation of the lineage. `shared_display`
/// is an X display owned by the caller; without one, a virtual display is
/// started and stopped here when needed.
pub async fn run_invocation(
    config: &CrawlConfig,
    state: &CrawlState,
    first: bool,
    shared_display: Option<&str>,
) -> InvocationOutcome {
    info!(target: "pagegraph::session", "Crawling {} (depth {})", state.url, state.depth);

    let history = NavigationHistory::new(&state.url, state.history.iter().cloned());
    let gate = Arc::new(NavigationGate::new(
        NavigationPolicy::new(config.crawl_duplicates()),
        history,
        EarlyStop::new(),
    ));
    let mut report = CrawlReport::new(&state.url, state.depth);
    let mut progress = Progress::default();

    // Init -> EnvReady
    let own_display = match shared_display {
        Some(_) => None,
        None => display::acquire(needs_virtual_display(config.interactive())).await,
    };
    let display_name = shared_display
        .map(str::to_string)
        .or_else(|| own_display.as_ref().map(VirtualDisplay::display));

    let profile = match prepare_profile(
        config.existing_profile().map(|p| p.as_path()),
        config.persist_profile(),
    ) {
        Ok(profile) => Some(profile),
        Err(e) => {
            error!(target: "pagegraph::session", "Invocation failed before launch: {e:#}");
            report.error = Some(format!("{e:#}"));
            None
        }
    };

    if let Some(profile) = profile.as_ref() {
        let target = ArtifactTarget::plan(config.output_path(), &state.url, first, Utc::now());
        if let Err(e) = browser_scope(
            config,
            &state.url,
            state.depth,
            &gate,
            &target,
            profile.path(),
            display_name.as_deref(),
            &mut progress,
        )
        .await
        {
            error!(target: "pagegraph::session", "Runtime failure in browser scope: {e:#}");
            report.error = Some(format!("{e:#}"));
        }
    }

    teardown_environment(own_display, profile).await;

    report.artifacts = progress.artifacts;
    report.timed_out = progress.timed_out;
    report.continuation =
        ContinuationDecision::decide(gate.redirect_target(), progress.child_url, state.depth);
    debug!(target: "pagegraph::session", "Continuation: {:?}", report.continuation);

    InvocationOutcome {
        report,
        history: gate.history().to_history(),
    }
}

#[allow(clippy::too_many_arguments)]
async fn browser_scope(
    config: &CrawlConfig,
    url: &str,
    depth: u32,
    gate: &Arc<NavigationGate>,
    target: &ArtifactTarget,
    profile_dir: &Path,
    display: Option<&str>,
    progress: &mut Progress,
) -> Result<()> {
    // EnvReady -> BrowserLaunched
    let executable = resolve_executable(config).await?;
    let policy = RetryPolicy::with_retries(config.launch_retries());
    let (browser, handler) = launch_with_retry(policy, |attempt| {
        debug!(target: "pagegraph::launch", "Launch attempt {}", attempt + 1);
        let browser_config = build_browser_config(config, &executable, profile_dir, display);
        async move { launch_once(browser_config?).await }
    })
    .await?;

    let result = page_scope(&browser, config, url, depth, gate, target, progress).await;
    if let Err(e) = &result {
        error!(target: "pagegraph::session", "Runtime failure in page scope: {e:#}");
    }

    if let CleanupResult::PartialFailure(errors) = cleanup_browser(browser, handler).await {
        warn!(target: "pagegraph::cleanup", "Browser cleanup incomplete: {}", errors.join("; "));
    }
    result
}

async fn page_scope(
    browser: &Browser,
    config: &CrawlConfig,
    url: &str,
    depth: u32,
    gate: &Arc<NavigationGate>,
    target: &ArtifactTarget,
    progress: &mut Progress,
) -> Result<()> {
    // BrowserLaunched -> PageOpened
    let page = browser
        .new_page("about:blank")
        .await
        .context("Failed to open page")?;
    for existing in browser.pages().await.context("Failed to list pages")? {
        if existing.target_id() != page.target_id() {
            close_page(existing).await;
        }
    }

    let mut crash = CrashWatcher::install(browser, &page).await?;
    let result = tokio::select! {
        result = capture(browser, &page, config, url, depth, gate, target, progress) => result,
        crashed = crash.crashed() => Err(crashed.into()),
    };

    close_page(page).await;
    result
}

#[allow(clippy::too_many_arguments)]
async fn capture(
    browser: &Browser,
    page: &Page,
    config: &CrawlConfig,
    url: &str,
    depth: u32,
    gate: &Arc<NavigationGate>,
    target: &ArtifactTarget,
    progress: &mut Progress,
) -> Result<()> {
    if let Some(user_agent) = config.user_agent() {
        page.set_user_agent(user_agent)
            .await
            .context("Failed to set user agent")?;
    }
    if config.stealth() {
        apply_stealth_measures(page).await?;
    }

    let _interception = TaskGuard(interception::install(page, Arc::clone(gate)).await?);
    // The telemetry session must be attached before the first navigation request
    let capture = if config.capture_network() {
        Some(
            telemetry::attach(
                browser.websocket_address(),
                page.target_id(),
                config.capture_har_bodies(),
                BODY_SETTLE_TIMEOUT,
            )
            .await?,
        )
    } else {
        None
    };

    // PageOpened -> Navigated
    navigate(page, url, config.navigation_timeout_secs(), gate.early_stop()).await?;

    // Navigated -> Captured
    let timed_out = wait_until_stopped(config.wait_duration(), gate.early_stop()).await;
    progress.timed_out = Some(timed_out);
    info!(
        target: "pagegraph::session",
        "Capture window ended ({})",
        if timed_out { "timed out" } else { "stopped early" }
    );
    let graph = generate_page_graph(page).await?;

    // Captured -> Persisted
    let graph_path = target.graph();
    artifacts::write_graph(&graph_path, &graph).await?;
    progress.artifacts.graph = Some(graph_path);

    if let Some(capture) = capture {
        let events = capture.finish().await?.into_export();
        let har = build_har(&events, config.capture_har_bodies());
        let har_path = target.har();
        artifacts::write_har(&har_path, &har).await?;
        progress.artifacts.har = Some(har_path);
    }

    // Sampled before the screenshot and before the page closes
    if depth > 1 {
        match select_random_child_url(page).await {
            Ok(child) => progress.child_url = child,
            Err(e) => warn!(target: "pagegraph::session", "Could not sample child link: {e:#}"),
        }
    }

    if config.screenshot() {
        let screenshot_path = target.screenshot();
        artifacts::write_screenshot(page, &screenshot_path).await?;
        progress.artifacts.screenshot = Some(screenshot_path);
    }
    Ok(())
}

/// Navigate and wait for DOM content loaded
///
/// A timeout is tolerated. An early stop also ends the wait, since a
/// stopped page may never fire the event.
async fn navigate(page: &Page, url: &str, timeout_secs: u64, early_stop: &EarlyStop) -> Result<()> {
    let mut dom_ready = page
        .event_listener::<EventDomContentEventFired>()
        .await
        .context("Failed to subscribe to Page.domContentEventFired")?;

    let navigation = async {
        let returns = page
            .execute(NavigateParams::new(url))
            .await
            .with_context(|| format!("Navigation to {url} failed"))?
            .result;
        if let Some(error_text) = returns.error_text {
            anyhow::bail!("Navigation to {url} failed: {error_text}");
        }
        let limit = std::time::Duration::from_secs(timeout_secs);
        tokio::select! {
            _ = dom_ready.next() => debug!(target: "pagegraph::session", "DOM content loaded"),
            _ = wait_until_stopped(limit, early_stop) => {
                debug!(target: "pagegraph::session", "Stopped before DOM content loaded");
            }
        }
        Ok(())
    };

    match with_page_timeout(navigation, timeout_secs, url).await {
        Ok(()) => Ok(()),
        Err(e) if is_navigation_timeout(&e) => {
            warn!(target: "pagegraph::session", "{e:#}; continuing with what loaded");
            Ok(())
        }
        Err(e) => Err(e),
    }
}
