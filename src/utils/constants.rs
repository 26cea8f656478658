//! Shared configuration constants for pagegraph-crawl
//!
//! Default values and timing constants used across the crawl engine so the
//! launch, wait and capture paths agree on the same numbers.

use std::time::Duration;

/// Poll interval of the bounded waiter
///
/// Coarse enough to avoid busy-waiting, fine enough that an early stop
/// costs at most half a second of crawl latency.
pub const WAIT_POLL_INTERVAL: Duration = Duration::from_millis(500);

/// Default capture window in seconds
pub const DEFAULT_WAIT_SECS: u64 = 30;

/// Default recursion depth: 1 means the target page only, no children
pub const DEFAULT_RECURSIVE_DEPTH: u32 = 1;

/// Default number of launch retries after the first attempt
pub const DEFAULT_LAUNCH_RETRIES: u32 = 3;

/// Base backoff between launch attempts; attempt `i` waits `2^(i-1)` of these
pub const LAUNCH_BACKOFF_BASE: Duration = Duration::from_secs(1);

/// Default timeout for the initial top-level navigation (DOM content loaded)
pub const DEFAULT_NAVIGATION_TIMEOUT_SECS: u64 = 30;

/// Upper bound on settling outstanding response-body fetches before export
pub const BODY_SETTLE_TIMEOUT: Duration = Duration::from_secs(30);

/// Browser window geometry, shared with the virtual framebuffer
pub const WINDOW_WIDTH: u32 = 1920;
pub const WINDOW_HEIGHT: u32 = 1280;

/// Extra arguments for the virtual framebuffer server
///
/// Parallel batch crawls share one display, so the client limit is raised.
pub const XVFB_EXTRA_ARGS: &[&str] = &["-maxclients", "2048"];

/// Chrome user agent string used in stealth mode when no override is given
///
/// Chrome releases a new stable version roughly every 4 weeks; bump this
/// alongside the pinned chromiumoxide revision.
pub const CHROME_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/132.0.6834.160 Safari/537.36";

/// Prefix for transient profile directories in the temp dir
pub const PROFILE_DIR_PREFIX: &str = "pagegraph_profile";
