//! Core types for crawl operations.
//!
//! Error taxonomy, the continuation decision produced at the end of every
//! invocation, and the lineage state that the orchestrator loop threads
//! from one invocation to the next.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use thiserror::Error;

/// Error type for crawl operations
#[derive(Debug, Error)]
pub enum CrawlError {
    /// Browser process failed to start after every retry
    #[error("Browser launch failed after {attempts} attempts: {last_error}")]
    LaunchExhausted { attempts: u32, last_error: String },

    /// Initial navigation did not reach DOM content loaded in time
    #[error("Navigation to {url} timed out after {secs} seconds")]
    NavigationTimeout { url: String, secs: u64 },

    /// The page's renderer terminated unexpectedly
    #[error("Target {target_id} crashed (status: {status}, code: {error_code})")]
    TargetCrashed {
        target_id: String,
        status: String,
        error_code: i64,
    },

    /// A response body could not be fetched for one request
    #[error("Failed to fetch response body for request {request_id}: {message}")]
    BodyFetch { request_id: String, message: String },

    /// Configuration precondition violated
    #[error("Configuration error: {0}")]
    Config(String),

    /// Browser or protocol error
    #[error("Browser error: {0}")]
    Browser(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Other errors
    #[error("{0}")]
    Other(String),
}

impl From<anyhow::Error> for CrawlError {
    fn from(err: anyhow::Error) -> Self {
        // Keep typed errors that travelled through anyhow
        match err.downcast::<CrawlError>() {
            Ok(crawl_error) => crawl_error,
            // Use {:#} to preserve full error chain with context
            Err(err) => Self::Other(format!("{err:#}")),
        }
    }
}

impl From<chromiumoxide::error::CdpError> for CrawlError {
    fn from(err: chromiumoxide::error::CdpError) -> Self {
        Self::Browser(err.to_string())
    }
}

/// Terminal output of one crawl invocation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ContinuationDecision {
    /// Lineage ends here
    None,
    /// The page navigated away; crawl the new URL with the same depth
    RedirectTo { url: String },
    /// Crawl a sampled child link with one less level of depth
    RecurseIntoChild { url: String, depth: u32 },
}

impl ContinuationDecision {
    /// Decide how the lineage continues after an invocation
    ///
    /// A detected redirect always wins over a sampled child. Children are
    /// only followed while more than one level of depth remains.
    #[must_use]
    pub fn decide(redirect_target: Option<String>, child_url: Option<String>, depth: u32) -> Self {
        if let Some(url) = redirect_target {
            return Self::RedirectTo { url };
        }
        match child_url {
            Some(url) if depth > 1 => Self::RecurseIntoChild {
                url,
                depth: depth - 1,
            },
            _ => Self::None,
        }
    }

    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::None)
    }
}

/// Mutable lineage state carried across invocations
///
/// Replaces recursion: each finished invocation's decision is applied here
/// and the orchestrator loops until the decision is terminal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CrawlState {
    pub url: String,
    pub depth: u32,
    pub history: Vec<String>,
}

impl CrawlState {
    #[must_use]
    pub fn new(url: impl Into<String>, depth: u32) -> Self {
        Self {
            url: url.into(),
            depth,
            history: Vec::new(),
        }
    }

    /// Advance to the next invocation, or `None` when the lineage ends
    ///
    /// `history` is the list the finished invocation handed back; it already
    /// contains every URL the lineage has visited.
    #[must_use]
    pub fn advance(self, decision: &ContinuationDecision, history: Vec<String>) -> Option<Self> {
        match decision {
            ContinuationDecision::None => None,
            ContinuationDecision::RedirectTo { url } => Some(Self {
                url: url.clone(),
                depth: self.depth,
                history,
            }),
            ContinuationDecision::RecurseIntoChild { url, depth } => Some(Self {
                url: url.clone(),
                depth: *depth,
                history,
            }),
        }
    }
}

/// Artifacts written by one invocation
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ArtifactPaths {
    pub graph: Option<PathBuf>,
    pub har: Option<PathBuf>,
    pub screenshot: Option<PathBuf>,
}

/// Summary of one invocation in a lineage
///
/// Failures are logged rather than raised, so the report is how a caller
/// learns what was actually produced.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CrawlReport {
    pub url: String,
    pub depth: u32,
    pub artifacts: ArtifactPaths,
    pub continuation: ContinuationDecision,
    /// Whether the capture window ran out rather than being stopped early
    pub timed_out: Option<bool>,
    pub error: Option<String>,
}

impl CrawlReport {
    #[must_use]
    pub fn new(url: impl Into<String>, depth: u32) -> Self {
        Self {
            url: url.into(),
            depth,
            artifacts: ArtifactPaths::default(),
            continuation: ContinuationDecision::None,
            timed_out: None,
            error: None,
        }
    }

    #[must_use]
    pub fn succeeded(&self) -> bool {
        self.error.is_none() && self.artifacts.graph.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_redirect_takes_precedence_over_child() {
        let decision = ContinuationDecision::decide(
            Some("https://b.example/".to_string()),
            Some("https://a.example/child".to_string()),
            3,
        );
        assert_eq!(
            decision,
            ContinuationDecision::RedirectTo {
                url: "https://b.example/".to_string()
            }
        );
    }

    #[test]
    fn test_child_decrements_depth_by_one() {
        let decision =
            ContinuationDecision::decide(None, Some("https://a.example/c".to_string()), 3);
        assert_eq!(
            decision,
            ContinuationDecision::RecurseIntoChild {
                url: "https://a.example/c".to_string(),
                depth: 2
            }
        );
    }

    #[test]
    fn test_child_never_followed_at_depth_one() {
        let decision =
            ContinuationDecision::decide(None, Some("https://a.example/c".to_string()), 1);
        assert_eq!(decision, ContinuationDecision::None);

        let decision =
            ContinuationDecision::decide(None, Some("https://a.example/c".to_string()), 0);
        assert_eq!(decision, ContinuationDecision::None);
    }

    #[test]
    fn test_redirect_keeps_depth_and_history() {
        let state = CrawlState::new("https://a.example/", 2);
        let history = vec!["https://a.example/".to_string()];
        let next = state
            .advance(
                &ContinuationDecision::RedirectTo {
                    url: "https://b.example/".to_string(),
                },
                history.clone(),
            )
            .expect("redirect continues the lineage");

        assert_eq!(next.url, "https://b.example/");
        assert_eq!(next.depth, 2);
        assert_eq!(next.history, history);
    }

    #[test]
    fn test_none_ends_lineage() {
        let state = CrawlState::new("https://a.example/", 2);
        assert!(ContinuationDecision::None.is_terminal());
        assert!(state.advance(&ContinuationDecision::None, Vec::new()).is_none());
        assert!(
            !ContinuationDecision::RedirectTo {
                url: "https://b.example/".to_string()
            }
            .is_terminal()
        );
    }

    #[test]
    fn test_report_success_needs_graph_and_no_error() {
        let mut report = CrawlReport::new("https://a.example/", 1);
        assert!(!report.succeeded());

        report.artifacts.graph = Some(PathBuf::from("a.graphml"));
        assert!(report.succeeded());

        report.error = Some("Target crashed".to_string());
        assert!(!report.succeeded());
    }

    #[test]
    fn test_anyhow_roundtrip_preserves_variant() {
        let err = anyhow::Error::new(CrawlError::LaunchExhausted {
            attempts: 4,
            last_error: "boom".to_string(),
        });
        assert!(matches!(
            CrawlError::from(err),
            CrawlError::LaunchExhausted { attempts: 4, .. }
        ));
    }
}
