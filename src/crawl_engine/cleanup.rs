//! Page, browser and environment teardown
//!
//! Every step is attempted regardless of earlier failures; failures are
//! logged and collected, never propagated.

use chromiumoxide::{Browser, Page};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::artifacts;
use crate::browser_profile::BrowserProfile;
use crate::display::VirtualDisplay;

/// Result of cleanup operations
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CleanupResult {
    /// All cleanup operations succeeded
    Success,
    /// Some cleanup operations failed, with error details
    PartialFailure(Vec<String>),
}

impl CleanupResult {
    fn from_errors(errors: Vec<String>) -> Self {
        if errors.is_empty() {
            Self::Success
        } else {
            Self::PartialFailure(errors)
        }
    }
}

/// Close the crawled page; failure is logged only
pub async fn close_page(page: Page) {
    debug!(target: "pagegraph::cleanup", "Closing page");
    if let Err(e) = page.close().await {
        warn!(target: "pagegraph::cleanup", "Failed to close page: {e}");
    }
}

/// Close the browser, wait for its process and stop the handler task
pub async fn cleanup_browser(mut browser: Browser, handler: JoinHandle<()>) -> CleanupResult {
    let mut errors = Vec::new();

    debug!(target: "pagegraph::cleanup", "Closing browser");
    if let Err(e) = browser.close().await {
        warn!(target: "pagegraph::cleanup", "Failed to close browser: {e}");
        errors.push(format!("Browser close failed: {e}"));
    }

    // Reap the process so no zombie outlives the invocation
    if let Err(e) = browser.wait().await {
        warn!(target: "pagegraph::cleanup", "Failed to wait for browser exit: {e}");
        errors.push(format!("Browser wait failed: {e}"));
    } else {
        debug!(target: "pagegraph::cleanup", "Browser process exited");
    }

    handler.abort();
    CleanupResult::from_errors(errors)
}

/// Environment teardown, always the last step of an invocation
///
/// A transient profile is deleted when dropped here.
pub async fn teardown_environment(display: Option<VirtualDisplay>, profile: Option<BrowserProfile>) {
    if let Some(path) = profile.and_then(BrowserProfile::into_removal_path)
        && let Err(e) = artifacts::delete_path(&path).await
    {
        warn!(target: "pagegraph::cleanup", "Failed to remove profile directory: {e:#}");
    }
    if let Some(display) = display {
        display.stop().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cleanup_result_from_errors() {
        assert_eq!(CleanupResult::from_errors(Vec::new()), CleanupResult::Success);
        assert_eq!(
            CleanupResult::from_errors(vec!["x".to_string()]),
            CleanupResult::PartialFailure(vec!["x".to_string()])
        );
    }

    #[tokio::test]
    async fn test_teardown_removes_transient_profile() {
        let base = tempfile::tempdir().unwrap();
        let profile = crate::browser_profile::create_unique_profile_in(base.path()).unwrap();
        let path = profile.path().to_path_buf();

        teardown_environment(None, Some(profile)).await;
        assert!(!path.exists());
    }

    #[tokio::test]
    async fn test_teardown_keeps_persistent_profile() {
        let base = tempfile::tempdir().unwrap();
        let mut profile = crate::browser_profile::create_unique_profile_in(base.path()).unwrap();
        profile.persist();
        let path = profile.path().to_path_buf();
        std::fs::write(path.join("Preferences"), "{}").unwrap();

        teardown_environment(None, Some(profile)).await;
        assert!(path.join("Preferences").exists());
    }
}
