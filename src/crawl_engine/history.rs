//! Navigation history of a crawl lineage
//!
//! The history spans every invocation of a lineage (redirect and child
//! continuations alike) and never shrinks. Each invocation also knows its
//! own current target, which is added to the history when the tracker is
//! built.

use std::collections::HashSet;

use crate::utils::normalize_url;

/// URLs visited by a lineage plus the current invocation's target
#[derive(Debug, Clone, Default)]
pub struct NavigationHistory {
    /// Visit order, for handing back to the next invocation
    visited: Vec<String>,
    seen: HashSet<String>,
    current: String,
}

impl NavigationHistory {
    /// Build the tracker for one invocation
    ///
    /// `previous` is the list handed over by the prior invocation; the
    /// current target joins it immediately.
    #[must_use]
    pub fn new(current: &str, previous: impl IntoIterator<Item = String>) -> Self {
        let mut history = Self {
            current: normalize_url(current),
            ..Self::default()
        };
        for url in previous {
            history.push(&url);
        }
        let current = history.current.clone();
        history.push(&current);
        history
    }

    fn push(&mut self, url: &str) {
        let normalized = normalize_url(url);
        if self.seen.insert(normalized.clone()) {
            self.visited.push(normalized);
        }
    }

    /// Has the lineage already visited `url`
    #[must_use]
    pub fn is_in_history(&self, url: &str) -> bool {
        self.seen.contains(&normalize_url(url))
    }

    /// Is `url` this invocation's own target
    #[must_use]
    pub fn is_current_url(&self, url: &str) -> bool {
        self.current == normalize_url(url)
    }

    #[must_use]
    pub fn current(&self) -> &str {
        &self.current
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.visited.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.visited.is_empty()
    }

    /// Plain list for the recursion boundary, in visit order
    #[must_use]
    pub fn to_history(&self) -> Vec<String> {
        self.visited.clone()
    }
}
