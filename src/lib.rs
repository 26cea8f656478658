pub mod artifacts;
pub mod browser_profile;
pub mod browser_setup;
pub mod config;
pub mod crawl_engine;
pub mod display;
pub mod har;
pub mod page_graph;
pub mod telemetry;
pub mod utils;

pub use browser_setup::{download_managed_browser, find_browser_executable};
pub use config::CrawlConfig;
pub use crawl_engine::{
    ArtifactPaths, BatchOutcome, ContinuationDecision, CrawlError, CrawlReport,
    crawl_batch, crawl_lineage,
};
pub use har::{Har, build_har};

/// Crawl one lineage starting at `config.url`
///
/// Runtime failures are logged and recorded in the returned reports; only a
/// configuration that violates its invariants is an `Err`.
pub async fn crawl(config: CrawlConfig) -> Result<Vec<CrawlReport>, CrawlError> {
    config
        .validate()
        .map_err(|e| CrawlError::Config(format!("{e:#}")))?;
    Ok(crawl_lineage(&config, None).await)
}
