//! Configuration module for crawl invocations
//!
//! This module provides the `CrawlConfig` struct and its type-safe builder
//! for configuring a crawl lineage with validation and sensible defaults.

// Sub-modules
pub mod builder;
pub mod getters;
pub mod types;

// Re-exports for public API
pub use builder::{CrawlConfigBuilder, WithOutputPath, WithUrl};
pub use types::CrawlConfig;
