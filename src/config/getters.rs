//! Getter methods for `CrawlConfig`

use std::path::{Path, PathBuf};
use std::time::Duration;

use super::types::CrawlConfig;

impl CrawlConfig {
    #[must_use]
    pub fn url(&self) -> &str {
        &self.url
    }

    #[must_use]
    pub fn output_path(&self) -> &Path {
        &self.output_path
    }

    #[must_use]
    pub fn executable_path(&self) -> Option<&PathBuf> {
        self.executable_path.as_ref()
    }

    #[must_use]
    pub fn seconds(&self) -> u64 {
        self.seconds
    }

    /// Capture window as a `Duration`
    #[must_use]
    pub fn wait_duration(&self) -> Duration {
        Duration::from_secs(self.seconds)
    }

    #[must_use]
    pub fn recursive_depth(&self) -> u32 {
        self.recursive_depth
    }

    #[must_use]
    pub fn interactive(&self) -> bool {
        self.interactive
    }

    /// Headless unless the user asked for an interactive session
    #[must_use]
    pub fn headless(&self) -> bool {
        !self.interactive
    }

    #[must_use]
    pub fn crawl_duplicates(&self) -> bool {
        self.crawl_duplicates
    }

    #[must_use]
    pub fn capture_network(&self) -> bool {
        self.capture_network
    }

    #[must_use]
    pub fn capture_har_bodies(&self) -> bool {
        self.capture_har_bodies
    }

    #[must_use]
    pub fn screenshot(&self) -> bool {
        self.screenshot
    }

    #[must_use]
    pub fn user_agent(&self) -> Option<&str> {
        self.user_agent.as_deref()
    }

    #[must_use]
    pub fn stealth(&self) -> bool {
        self.stealth
    }

    #[must_use]
    pub fn existing_profile(&self) -> Option<&PathBuf> {
        self.existing_profile.as_ref()
    }

    #[must_use]
    pub fn persist_profile(&self) -> bool {
        self.persist_profile
    }

    #[must_use]
    pub fn extensions_path(&self) -> Option<&PathBuf> {
        self.extensions_path.as_ref()
    }

    #[must_use]
    pub fn proxy_server(&self) -> Option<&str> {
        self.proxy_server.as_deref()
    }

    #[must_use]
    pub fn extra_args(&self) -> &[String] {
        &self.extra_args
    }

    /// Returns the configured timeout for the initial navigation.
    #[must_use]
    pub fn navigation_timeout_secs(&self) -> u64 {
        self.navigation_timeout_secs
    }

    #[must_use]
    pub fn launch_retries(&self) -> u32 {
        self.launch_retries
    }
}
