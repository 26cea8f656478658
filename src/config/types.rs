//! Core configuration types for a crawl invocation
//!
//! `CrawlConfig` is the immutable request handed to one crawl invocation.
//! Continuations shallow-copy it with a new target URL or depth.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::utils::{
    DEFAULT_LAUNCH_RETRIES, DEFAULT_NAVIGATION_TIMEOUT_SECS, DEFAULT_RECURSIVE_DEPTH,
    DEFAULT_WAIT_SECS,
};

/// Configuration for one crawl lineage
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CrawlConfig {
    /// Target URL of this invocation.
    ///
    /// **INVARIANT:** Always an http(s) URL (validated in builder).
    pub(crate) url: String,

    /// Directory (or file stem) where graph, HAR and screenshot land
    pub(crate) output_path: PathBuf,

    /// Browser binary; discovered or downloaded when absent
    pub(crate) executable_path: Option<PathBuf>,

    /// Capture window in seconds after the initial navigation commits
    pub(crate) seconds: u64,

    /// Remaining depth budget. 1 crawls the target only; each child
    /// continuation consumes one level.
    pub(crate) recursive_depth: u32,

    /// Run a headed browser on the real display instead of headless + Xvfb
    pub(crate) interactive: bool,

    /// Re-crawl URLs already present in the lineage history
    pub(crate) crawl_duplicates: bool,

    /// Capture network and page events and write a HAR file
    pub(crate) capture_network: bool,

    /// Include decoded response bodies in the HAR (implies body fetching)
    pub(crate) capture_har_bodies: bool,

    /// Save a full-page screenshot before closing the page
    pub(crate) screenshot: bool,

    /// Override the page user agent
    pub(crate) user_agent: Option<String>,

    /// Launch with automation-hiding arguments
    pub(crate) stealth: bool,

    /// Existing profile to start from. It is copied, never mutated.
    pub(crate) existing_profile: Option<PathBuf>,

    /// Keep the transient profile directory after the crawl
    pub(crate) persist_profile: bool,

    /// Directory of unpacked extensions to load
    pub(crate) extensions_path: Option<PathBuf>,

    /// Proxy server passed to the browser (`--proxy-server`)
    pub(crate) proxy_server: Option<String>,

    /// Additional raw browser arguments
    pub(crate) extra_args: Vec<String>,

    /// Timeout for the initial navigation's DOM-content-loaded signal
    ///
    /// Default: 30 seconds
    pub(crate) navigation_timeout_secs: u64,

    /// Launch retries after the first attempt (backoff 1s, 2s, 4s, ...)
    ///
    /// Default: 3
    pub(crate) launch_retries: u32,
}

impl Default for CrawlConfig {
    fn default() -> Self {
        Self {
            url: String::new(),
            output_path: PathBuf::from("./output"),
            executable_path: None,
            seconds: DEFAULT_WAIT_SECS,
            recursive_depth: DEFAULT_RECURSIVE_DEPTH,
            interactive: false,
            crawl_duplicates: false,
            capture_network: false,
            capture_har_bodies: false,
            screenshot: false,
            user_agent: None,
            stealth: false,
            existing_profile: None,
            persist_profile: false,
            extensions_path: None,
            proxy_server: None,
            extra_args: Vec::new(),
            navigation_timeout_secs: DEFAULT_NAVIGATION_TIMEOUT_SECS,
            launch_retries: DEFAULT_LAUNCH_RETRIES,
        }
    }
}

// Continuation overrides
impl CrawlConfig {
    /// Shallow copy targeting a different URL
    #[must_use]
    pub fn with_url(&self, url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            ..self.clone()
        }
    }

    /// Shallow copy with a different depth budget
    #[must_use]
    pub fn with_recursive_depth(&self, depth: u32) -> Self {
        Self {
            recursive_depth: depth,
            ..self.clone()
        }
    }
}
