use crate::record::SearchResultItem;
use std::collections::HashSet;

/// Run-scoped set of identities already dispatched for resolution
///
/// Only the orchestrator touches the tracker, and always before it hands
/// items to the pool, so a plain set is enough.
#[derive(Debug, Default)]
pub struct DedupTracker {
    seen: HashSet<String>,
}

impl DedupTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Marks an identity; returns true if it was not marked before
    pub fn mark_seen(&mut self, identity: &str) -> bool {
        self.seen.insert(identity.to_string())
    }

    /// Keeps only items not yet seen and marks them
    ///
    /// Repeats within the same page are dropped as well. Returns the
    /// surviving items and the number dropped.
    pub fn filter_unseen(&mut self, items: Vec<SearchResultItem>) -> (Vec<SearchResultItem>, usize) {
        let total = items.len();
        let fresh: Vec<_> = items
            .into_iter()
            .filter(|item| {
                let fresh = self.mark_seen(&item.identity);
                if !fresh {
                    tracing::debug!(url = %item.identity, "Skipping already dispatched item");
                }
                fresh
            })
            .collect();

        let skipped = total - fresh.len();
        (fresh, skipped)
    }
}
