//! Type-safe builder for `CrawlConfig` using the typestate pattern
//!
//! Output path and target URL are required; the builder only exposes
//! `build()` once both are set.

use anyhow::{Result, anyhow, bail};
use std::marker::PhantomData;
use std::path::PathBuf;

use super::types::CrawlConfig;
use crate::utils::parse_http_url;

// Type states for the builder
pub struct WithOutputPath;
pub struct WithUrl;

pub struct CrawlConfigBuilder<State = ()> {
    pub(crate) inner: CrawlConfig,
    pub(crate) output_path: Option<PathBuf>,
    pub(crate) url: Option<String>,
    pub(crate) _phantom: PhantomData<State>,
}

impl Default for CrawlConfigBuilder<()> {
    fn default() -> Self {
        Self {
            inner: CrawlConfig::default(),
            output_path: None,
            url: None,
            _phantom: PhantomData,
        }
    }
}

impl CrawlConfig {
    /// Create a builder for configuring a `CrawlConfig` with a fluent interface
    #[must_use]
    pub fn builder() -> CrawlConfigBuilder<()> {
        CrawlConfigBuilder::default()
    }
}

impl CrawlConfigBuilder<()> {
    pub fn output_path(self, path: impl Into<PathBuf>) -> CrawlConfigBuilder<WithOutputPath> {
        CrawlConfigBuilder {
            inner: self.inner,
            output_path: Some(path.into()),
            url: self.url,
            _phantom: PhantomData,
        }
    }
}

impl CrawlConfigBuilder<WithOutputPath> {
    pub fn url(self, url: impl Into<String>) -> CrawlConfigBuilder<WithUrl> {
        let url_string = url.into();

        // Normalize URL: add https:// if no scheme is present
        let normalized_url = if url_string.contains("://") {
            url_string
        } else {
            format!("https://{url_string}")
        };

        CrawlConfigBuilder {
            inner: self.inner,
            output_path: self.output_path,
            url: Some(normalized_url),
            _phantom: PhantomData,
        }
    }
}

// Build method only available when all required fields are set
impl CrawlConfigBuilder<WithUrl> {
    pub fn build(self) -> Result<CrawlConfig> {
        let url = self.url.ok_or_else(|| anyhow!("url is required"))?;

        let output_path = self
            .output_path
            .ok_or_else(|| anyhow!("output_path is required"))?;

        let config = CrawlConfig {
            url,
            output_path,
            ..self.inner
        };
        config.validate()?;

        if config.persist_profile && config.existing_profile.is_none() {
            tracing::debug!("persist_profile set without existing_profile; transient profile will be kept");
        }

        Ok(config)
    }
}

impl CrawlConfig {
    /// Check the invariants `build()` enforces
    ///
    /// Configs deserialized from a batch file bypass the builder and are
    /// checked here before crawling.
    pub fn validate(&self) -> Result<()> {
        parse_http_url(&self.url)?;
        if self.recursive_depth == 0 {
            bail!("recursive_depth must be at least 1");
        }
        if self.capture_har_bodies && !self.capture_network {
            bail!("capture_har_bodies requires capture_network");
        }
        Ok(())
    }
}

// Optional fields are settable in any state
impl<State> CrawlConfigBuilder<State> {
    #[must_use]
    pub fn executable_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.inner.executable_path = Some(path.into());
        self
    }

    /// Set the capture window in seconds
    #[must_use]
    pub fn seconds(mut self, seconds: u64) -> Self {
        self.inner.seconds = seconds;
        self
    }

    /// Set the recursion depth budget (1 = target page only)
    #[must_use]
    pub fn recursive_depth(mut self, depth: u32) -> Self {
        self.inner.recursive_depth = depth;
        self
    }

    #[must_use]
    pub fn interactive(mut self, interactive: bool) -> Self {
        self.inner.interactive = interactive;
        self
    }

    #[must_use]
    pub fn crawl_duplicates(mut self, crawl_duplicates: bool) -> Self {
        self.inner.crawl_duplicates = crawl_duplicates;
        self
    }

    #[must_use]
    pub fn capture_network(mut self, capture: bool) -> Self {
        self.inner.capture_network = capture;
        self
    }

    /// Include response bodies in the HAR
    ///
    /// Turning this on also turns on network capture.
    #[must_use]
    pub fn capture_har_bodies(mut self, capture: bool) -> Self {
        self.inner.capture_har_bodies = capture;
        if capture {
            self.inner.capture_network = true;
        }
        self
    }

    #[must_use]
    pub fn screenshot(mut self, screenshot: bool) -> Self {
        self.inner.screenshot = screenshot;
        self
    }

    #[must_use]
    pub fn user_agent(mut self, user_agent: Option<String>) -> Self {
        self.inner.user_agent = user_agent;
        self
    }

    #[must_use]
    pub fn stealth(mut self, stealth: bool) -> Self {
        self.inner.stealth = stealth;
        self
    }

    #[must_use]
    pub fn existing_profile(mut self, path: Option<PathBuf>) -> Self {
        self.inner.existing_profile = path;
        self
    }

    #[must_use]
    pub fn persist_profile(mut self, persist: bool) -> Self {
        self.inner.persist_profile = persist;
        self
    }

    #[must_use]
    pub fn extensions_path(mut self, path: Option<PathBuf>) -> Self {
        self.inner.extensions_path = path;
        self
    }

    #[must_use]
    pub fn proxy_server(mut self, proxy: Option<String>) -> Self {
        self.inner.proxy_server = proxy;
        self
    }

    #[must_use]
    pub fn extra_args(mut self, args: Vec<String>) -> Self {
        self.inner.extra_args = args;
        self
    }

    #[must_use]
    pub fn navigation_timeout_secs(mut self, secs: u64) -> Self {
        self.inner.navigation_timeout_secs = secs;
        self
    }

    /// Set launch retries after the first attempt
    ///
    /// # Example
    /// ```rust
    /// # use pagegraph_crawl::config::CrawlConfig;
    /// # fn main() -> anyhow::Result<()> {
    /// let config = CrawlConfig::builder()
    ///     .output_path("./output")
    ///     .url("https://example.com")
    ///     .launch_retries(5)
    ///     .build()?;
    /// assert_eq!(config.launch_retries(), 5);
    /// # Ok(())
    /// # }
    /// ```
    #[must_use]
    pub fn launch_retries(mut self, retries: u32) -> Self {
        self.inner.launch_retries = retries;
        self
    }
}
