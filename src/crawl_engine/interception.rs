//! Fetch-domain adapter that routes paused requests through the gate
//!
//! Every request is paused at the request stage, classified by the
//! `NavigationGate` and then continued. Requests are never failed or left
//! paused. Also hosts the crash watcher for the crawled target.

use anyhow::{Context, Result};
use chromiumoxide::listeners::EventStream;
use chromiumoxide::{Browser, Page};
use chromiumoxide_cdp::cdp::browser_protocol::fetch::{
    ContinueRequestParams, EnableParams as FetchEnableParams, EventRequestPaused, RequestPattern,
    RequestStage,
};
use chromiumoxide_cdp::cdp::browser_protocol::network::ResourceType;
use chromiumoxide_cdp::cdp::browser_protocol::page::StopLoadingParams;
use chromiumoxide_cdp::cdp::browser_protocol::target::{EventTargetCrashed, TargetId};
use futures::StreamExt;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{debug, trace, warn};

use super::crawl_types::CrawlError;
use super::navigation_policy::{NavigationDecision, NavigationGate, StopLoading};
use crate::utils::is_http_url;

/// Issues `Page.stopLoading` without waiting for it
#[derive(Clone)]
pub struct PageStopper {
    page: Page,
}

impl PageStopper {
    #[must_use]
    pub fn new(page: Page) -> Self {
        Self { page }
    }
}

impl StopLoading for PageStopper {
    fn stop_loading(&self) {
        let page = self.page.clone();
        tokio::spawn(async move {
            if let Err(e) = page.execute(StopLoadingParams::default()).await {
                debug!(target: "pagegraph::policy", "Page.stopLoading failed: {e}");
            }
        });
    }
}

/// A request counts as a top-level navigation when it loads a document
/// into the page's main frame
fn is_top_level(event: &EventRequestPaused, main_frame: Option<&str>) -> bool {
    event.resource_type == ResourceType::Document
        && main_frame.is_some_and(|frame| event.frame_id.inner() == frame)
}

/// What happens to one paused request
#[derive(Debug)]
struct PausedOutcome {
    /// `None` when the URL is not http(s) and the gate never sees it
    decision: Option<NavigationDecision>,
    /// Sent for every request, whatever the decision
    release: ContinueRequestParams,
}

/// Classify one paused request, apply the gate's decision and build the
/// command that releases it
fn handle_paused(
    event: &EventRequestPaused,
    main_frame: Option<&str>,
    gate: &NavigationGate,
    stopper: &dyn StopLoading,
) -> PausedOutcome {
    let url = event.request.url.as_str();
    let decision = is_http_url(url).then(|| {
        let top_level = is_top_level(event, main_frame);
        let decision = gate.on_request(url, top_level, stopper);
        trace!(target: "pagegraph::policy", "{url} (top-level: {top_level}) -> {decision:?}");
        decision
    });
    if decision.as_ref().is_some_and(NavigationDecision::stops_capture) {
        debug!(target: "pagegraph::policy", "Capture window closing at {url}");
    }

    PausedOutcome {
        decision,
        release: ContinueRequestParams::new(event.request_id.clone()),
    }
}

/// Enable request interception on `page` and drive `gate` from it
///
/// The returned task runs until the page's event stream closes; abort it
/// during teardown.
pub async fn install(page: &Page, gate: Arc<NavigationGate>) -> Result<JoinHandle<()>> {
    let mut paused = page
        .event_listener::<EventRequestPaused>()
        .await
        .context("Failed to subscribe to Fetch.requestPaused")?;

    let pattern = RequestPattern::builder()
        .url_pattern("*")
        .request_stage(RequestStage::Request)
        .build();
    page.execute(FetchEnableParams::builder().pattern(pattern).build())
        .await
        .context("Failed to enable request interception")?;

    let page = page.clone();
    let stopper = PageStopper::new(page.clone());

    let task = tokio::spawn(async move {
        while let Some(event) = paused.next().await {
            // Only documents can be top-level, so only they need the frame lookup
            let main_frame = if event.resource_type == ResourceType::Document {
                page.mainframe().await.ok().flatten()
            } else {
                None
            };
            let outcome = handle_paused(
                &event,
                main_frame.as_ref().map(|f| f.inner().as_str()),
                &gate,
                &stopper,
            );

            // Stopping only ends the capture; the request itself always goes on
            let page = page.clone();
            tokio::spawn(async move {
                if let Err(e) = page.execute(outcome.release).await {
                    trace!(target: "pagegraph::policy", "Fetch.continueRequest failed: {e}");
                }
            });
        }
        debug!(target: "pagegraph::policy", "Request interception stream closed");
    });

    Ok(task)
}

/// Watches the browser for a crash of one target
pub struct CrashWatcher {
    events: EventStream<EventTargetCrashed>,
    target_id: TargetId,
}

impl CrashWatcher {
    pub async fn install(browser: &Browser, page: &Page) -> Result<Self> {
        let events = browser
            .event_listener::<EventTargetCrashed>()
            .await
            .context("Failed to subscribe to Target.targetCrashed")?;
        Ok(Self {
            events,
            target_id: page.target_id().clone(),
        })
    }

    /// Resolves only when the watched target crashes
    pub async fn crashed(&mut self) -> CrawlError {
        while let Some(event) = self.events.next().await {
            if event.target_id != self.target_id {
                continue;
            }
            warn!(
                target: "pagegraph::session",
                "Target {} crashed: {} ({})",
                event.target_id.inner(),
                event.status,
                event.error_code
            );
            return CrawlError::TargetCrashed {
                target_id: event.target_id.inner().clone(),
                status: event.status.clone(),
                error_code: event.error_code,
            };
        }
        // Browser connection gone; other paths report that
        std::future::pending().await
    }
}
