//! Persistence of crawl artifacts
//!
//! An output path with an extension names the graph file of the first
//! invocation; HAR and screenshot sit next to it with their own
//! extensions. Any other output path is a directory, and every invocation
//! writes `<host-and-path>_<timestamp>.{graphml,har,png}` inside it.

use anyhow::{Context, Result};
use chromiumoxide::Page;
use chromiumoxide::cdp::browser_protocol::page::{CaptureScreenshotFormat, CaptureScreenshotParams};
use chrono::{DateTime, Utc};
use std::path::{Path, PathBuf};
use tracing::{debug, info};
use url::Url;

use crate::har::Har;

pub const GRAPH_EXTENSION: &str = "graphml";
pub const HAR_EXTENSION: &str = "har";
pub const SCREENSHOT_EXTENSION: &str = "png";

/// Output file locations for one invocation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtifactTarget {
    stem: PathBuf,
}

impl ArtifactTarget {
    /// Plan file names for the invocation crawling `url`
    ///
    /// `first` marks the first invocation of a lineage; only it may use an
    /// explicit file name from `output_path`.
    #[must_use]
    pub fn plan(output_path: &Path, url: &str, first: bool, now: DateTime<Utc>) -> Self {
        let names_file = output_path.extension().is_some() && !output_path.is_dir();
        if names_file && first {
            return Self {
                stem: output_path.with_extension(""),
            };
        }

        let dir = if names_file {
            output_path.parent().map(Path::to_path_buf).unwrap_or_default()
        } else {
            output_path.to_path_buf()
        };
        let name = format!("{}_{}", url_slug(url), now.format("%Y%m%dT%H%M%S%.3fZ"));
        Self {
            stem: dir.join(sanitize_filename::sanitize(name)),
        }
    }

    #[must_use]
    pub fn graph(&self) -> PathBuf {
        self.with_extension(GRAPH_EXTENSION)
    }

    #[must_use]
    pub fn har(&self) -> PathBuf {
        self.with_extension(HAR_EXTENSION)
    }

    #[must_use]
    pub fn screenshot(&self) -> PathBuf {
        self.with_extension(SCREENSHOT_EXTENSION)
    }

    fn with_extension(&self, extension: &str) -> PathBuf {
        let mut name = self.stem.as_os_str().to_owned();
        name.push(".");
        name.push(extension);
        PathBuf::from(name)
    }
}

/// Host and path of `url`, flattened into one file name component
fn url_slug(url: &str) -> String {
    match Url::parse(url) {
        Ok(parsed) => {
            let host = parsed.host_str().unwrap_or("unknown");
            let path = parsed.path().trim_matches('/').replace('/', "_");
            if path.is_empty() {
                host.to_string()
            } else {
                format!("{host}_{path}")
            }
        }
        Err(_) => url.to_string(),
    }
}

async fn ensure_parent(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        tokio::fs::create_dir_all(parent)
            .await
            .with_context(|| format!("Failed to create directory {}", parent.display()))?;
    }
    Ok(())
}

/// Write the page-graph blob verbatim
pub async fn write_graph(path: &Path, graph: &str) -> Result<()> {
    ensure_parent(path).await?;
    tokio::fs::write(path, graph)
        .await
        .with_context(|| format!("Failed to write graph to {}", path.display()))?;
    info!(target: "pagegraph::session", "Wrote page graph to {}", path.display());
    Ok(())
}

pub async fn write_har(path: &Path, har: &Har) -> Result<()> {
    ensure_parent(path).await?;
    let json = serde_json::to_vec_pretty(har).context("Failed to serialize HAR")?;
    tokio::fs::write(path, json)
        .await
        .with_context(|| format!("Failed to write HAR to {}", path.display()))?;
    info!(
        target: "pagegraph::session",
        "Wrote HAR with {} entries to {}",
        har.log.entries.len(),
        path.display()
    );
    Ok(())
}

/// Capture a full-page PNG of `page`
pub async fn write_screenshot(page: &Page, path: &Path) -> Result<()> {
    let params = CaptureScreenshotParams {
        format: Some(CaptureScreenshotFormat::Png),
        capture_beyond_viewport: Some(true),
        ..Default::default()
    };

    let data = page
        .screenshot(params)
        .await
        .map_err(|e| anyhow::anyhow!("Failed to capture screenshot: {e}"))?;

    ensure_parent(path).await?;
    tokio::fs::write(path, data)
        .await
        .with_context(|| format!("Failed to write screenshot to {}", path.display()))?;
    info!(target: "pagegraph::session", "Wrote screenshot to {}", path.display());
    Ok(())
}

/// Remove a file or directory; a missing path is not an error
pub async fn delete_path(path: &Path) -> Result<()> {
    let result = match tokio::fs::metadata(path).await {
        Ok(meta) if meta.is_dir() => tokio::fs::remove_dir_all(path).await,
        Ok(_) => tokio::fs::remove_file(path).await,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(()),
        Err(e) => Err(e),
    };
    result.with_context(|| format!("Failed to delete {}", path.display()))?;
    debug!(target: "pagegraph::cleanup", "Deleted {}", path.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at_noon() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap()
    }

    #[test]
    fn test_explicit_file_name_for_first_invocation() {
        let target = ArtifactTarget::plan(
            Path::new("/out/site.graphml"),
            "https://example.com/",
            true,
            at_noon(),
        );
        assert_eq!(target.graph(), PathBuf::from("/out/site.graphml"));
        assert_eq!(target.har(), PathBuf::from("/out/site.har"));
        assert_eq!(target.screenshot(), PathBuf::from("/out/site.png"));
    }

    #[test]
    fn test_continuations_get_generated_names() {
        let target = ArtifactTarget::plan(
            Path::new("/out/site.graphml"),
            "https://example.com/docs/intro",
            false,
            at_noon(),
        );
        assert_eq!(
            target.graph(),
            PathBuf::from("/out/example.com_docs_intro_20240501T120000.000Z.graphml")
        );
    }

    #[test]
    fn test_directory_output() {
        let dir = tempfile::tempdir().unwrap();
        let target = ArtifactTarget::plan(dir.path(), "https://example.com/", true, at_noon());
        assert_eq!(target.graph().parent(), Some(dir.path()));
        assert!(
            target
                .graph()
                .file_name()
                .unwrap()
                .to_string_lossy()
                .starts_with("example.com_2024")
        );
    }

    #[tokio::test]
    async fn test_write_and_delete() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested/graph.graphml");

        write_graph(&path, "<graphml/>").await.unwrap();
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "<graphml/>");

        delete_path(&path).await.unwrap();
        assert!(!path.exists());
        // Deleting again is fine
        delete_path(&path).await.unwrap();
    }

    #[tokio::test]
    async fn test_write_har_is_json() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.har");
        let har = crate::har::build_har(&[], false);

        write_har(&path, &har).await.unwrap();
        let parsed: serde_json::Value =
            serde_json::from_slice(&std::fs::read(&path).unwrap()).unwrap();
        assert_eq!(parsed["log"]["version"], "1.2");
    }
}
