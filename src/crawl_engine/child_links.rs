//! Random child-link sampling for depth continuations

use anyhow::{Context, Result};
use chromiumoxide::Page;
use rand::Rng;
use rand::seq::IndexedRandom;
use tracing::debug;

use crate::utils::{is_http_url, normalize_url};

const COLLECT_LINKS_JS: &str = r"
    Array.from(document.querySelectorAll('a[href]'))
        .map(a => a.href)
        .filter(href => typeof href === 'string' && href.length > 0)
";

/// Pick one outgoing link uniformly at random
///
/// Only http(s) links that differ from `current` (ignoring fragments) are
/// candidates. Duplicates count once.
pub fn choose_child_url<R>(links: &[String], current: &str, rng: &mut R) -> Option<String>
where
    R: Rng + ?Sized,
{
    let current = normalize_url(current);
    let mut candidates: Vec<String> = links
        .iter()
        .filter(|link| is_http_url(link))
        .map(|link| normalize_url(link))
        .filter(|link| *link != current)
        .collect();
    candidates.sort();
    candidates.dedup();

    candidates.choose(rng).cloned()
}

/// Sample a child URL from the links on the loaded page
pub async fn select_random_child_url(page: &Page) -> Result<Option<String>> {
    let links: Vec<String> = page
        .evaluate(COLLECT_LINKS_JS)
        .await
        .context("Failed to collect links from page")?
        .into_value()
        .context("Link list was not an array of strings")?;

    let current = page.url().await.ok().flatten().unwrap_or_default();
    let child = choose_child_url(&links, &current, &mut rand::rng());
    debug!(
        target: "pagegraph::session",
        "Sampled child {:?} from {} links",
        child,
        links.len()
    );
    Ok(child)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    fn links(raw: &[&str]) -> Vec<String> {
        raw.iter().map(|s| (*s).to_string()).collect()
    }

    #[test]
    fn test_filters_non_http_and_current() {
        let mut rng = StdRng::seed_from_u64(7);
        let found = choose_child_url(
            &links(&[
                "mailto:someone@example.com",
                "javascript:void(0)",
                "https://example.com/#top",
                "https://example.com/about",
            ]),
            "https://example.com/",
            &mut rng,
        );
        assert_eq!(found.as_deref(), Some("https://example.com/about"));
    }

    #[test]
    fn test_no_candidates() {
        let mut rng = StdRng::seed_from_u64(1);
        assert_eq!(choose_child_url(&[], "https://example.com/", &mut rng), None);
        assert_eq!(
            choose_child_url(&links(&["https://example.com/"]), "https://example.com/", &mut rng),
            None
        );
    }

    #[test]
    fn test_every_candidate_reachable() {
        let pool = links(&["https://a.example/", "https://b.example/", "https://c.example/"]);
        let mut rng = StdRng::seed_from_u64(42);
        let mut seen = std::collections::HashSet::new();
        for _ in 0..200 {
            seen.insert(choose_child_url(&pool, "https://start.example/", &mut rng).unwrap());
        }
        assert_eq!(seen.len(), 3);
    }
}
