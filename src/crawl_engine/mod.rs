//! Crawl Engine Module
//!
//! Navigation policy, bounded wait, launch retry and the session state
//! machine, plus the lineage loop that chains invocations together.

// Sub-modules
pub mod child_links;
pub mod cleanup;
pub mod crawl_types;
pub mod history;
pub mod interception;
pub mod launch;
pub mod navigation_policy;
pub mod orchestrator;
pub mod page_timeout;
pub mod session;
pub mod waiter;

// Re-export crawl types
pub use crawl_types::{
    ArtifactPaths, ContinuationDecision, CrawlError, CrawlReport, CrawlState,
};

// Re-export wait and launch primitives
pub use launch::{RetryPolicy, launch_with_retry};
pub use waiter::{EarlyStop, wait_for, wait_until_stopped, wait_with_interval};

// Re-export navigation policy types
pub use history::NavigationHistory;
pub use navigation_policy::{NavigationDecision, NavigationGate, NavigationPolicy, StopLoading};

// Re-export orchestration entry points
pub use child_links::{choose_child_url, select_random_child_url};
pub use orchestrator::{BatchOutcome, MAX_LINEAGE_LENGTH, crawl_batch, crawl_lineage};
pub use session::{InvocationOutcome, run_invocation};
