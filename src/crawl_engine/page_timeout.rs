//! Timeout wrapper for the initial navigation

use anyhow::Result;
use std::future::Future;
use std::time::Duration;

use super::crawl_types::CrawlError;

/// Run `operation` for at most `timeout_secs`
///
/// Elapsing yields `CrawlError::NavigationTimeout` for `url`, wrapped in
/// `anyhow` so callers can downcast and tolerate it.
pub async fn with_page_timeout<F, T>(operation: F, timeout_secs: u64, url: &str) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    match tokio::time::timeout(Duration::from_secs(timeout_secs), operation).await {
        Ok(result) => result,
        Err(_) => Err(CrawlError::NavigationTimeout {
            url: url.to_string(),
            secs: timeout_secs,
        }
        .into()),
    }
}

/// Whether `err` is a navigation timeout
#[must_use]
pub fn is_navigation_timeout(err: &anyhow::Error) -> bool {
    matches!(
        err.downcast_ref::<CrawlError>(),
        Some(CrawlError::NavigationTimeout { .. })
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_timeout_is_recognised() {
        let err = with_page_timeout(
            std::future::pending::<Result<()>>(),
            5,
            "https://example.com/",
        )
        .await
        .unwrap_err();
        assert!(is_navigation_timeout(&err));
    }

    #[tokio::test]
    async fn test_inner_error_passes_through() {
        let err = with_page_timeout(
            async { Err::<(), _>(anyhow::anyhow!("net::ERR_NAME_NOT_RESOLVED")) },
            5,
            "https://example.com/",
        )
        .await
        .unwrap_err();
        assert!(!is_navigation_timeout(&err));
    }
}
