//! URL validation and normalization helpers.

use anyhow::{Result, bail};
use url::Url;

/// Check if a URL is a crawlable http(s) URL
#[must_use]
pub fn is_http_url(url: &str) -> bool {
    if url.is_empty() {
        return false;
    }

    // Skip data URLs, javascript URLs, and other non-http schemes
    if url.starts_with("data:") || url.starts_with("javascript:") || url.starts_with("mailto:") {
        return false;
    }

    match Url::parse(url) {
        Ok(parsed) => matches!(parsed.scheme(), "http" | "https"),
        Err(_) => false,
    }
}

/// Parse a URL, rejecting anything that is not http or https
pub fn parse_http_url(url: &str) -> Result<Url> {
    let parsed = Url::parse(url).map_err(|e| anyhow::anyhow!("Invalid URL '{url}': {e}"))?;
    match parsed.scheme() {
        "http" | "https" => Ok(parsed),
        other => bail!("Unsupported URL scheme '{other}' in '{url}'"),
    }
}

/// Normalize a URL for history comparison
///
/// Fragments never produce a new top-level navigation, so they are dropped.
/// Unparseable input is returned unchanged so comparisons stay total.
#[must_use]
pub fn normalize_url(url: &str) -> String {
    match Url::parse(url) {
        Ok(mut parsed) => {
            parsed.set_fragment(None);
            parsed.to_string()
        }
        Err(_) => url.to_string(),
    }
}
