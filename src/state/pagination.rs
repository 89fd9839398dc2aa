use std::collections::HashSet;
use url::Url;

/// Outcome of trying to move to the next listing page
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Advance {
    /// Moved to the next page
    Moved,

    /// The next page is the current page or one already visited
    LoopDetected { url: Url },
}

/// Tracks where the traversal is and where it has been
///
/// The page number starts at 1 and only increases. Every page the traversal
/// has left is kept in the visited set so a "next" marker pointing backwards
/// ends the run instead of cycling.
#[derive(Debug, Clone)]
pub struct PaginationState {
    current: Url,
    page_number: u32,
    visited: HashSet<String>,
}

impl PaginationState {
    /// Creates the state for a traversal starting at `root`
    pub fn new(root: Url) -> Self {
        Self {
            current: root,
            page_number: 1,
            visited: HashSet::new(),
        }
    }

    /// The URL of the page being processed
    pub fn current(&self) -> &Url {
        &self.current
    }

    /// The 1-based number of the page being processed
    pub fn page_number(&self) -> u32 {
        self.page_number
    }

    /// Returns true if `url` is the current page or was visited before
    pub fn is_visited(&self, url: &Url) -> bool {
        *url == self.current || self.visited.contains(url.as_str())
    }

    /// Moves to `next` unless doing so would revisit a page
    ///
    /// On success the current page is recorded as visited and the page
    /// number is incremented. On a loop the state is left untouched.
    pub fn advance(&mut self, next: Url) -> Advance {
        if self.is_visited(&next) {
            return Advance::LoopDetected { url: next };
        }

        let previous = std::mem::replace(&mut self.current, next);
        self.visited.insert(previous.into());
        self.page_number += 1;
        Advance::Moved
    }
}
