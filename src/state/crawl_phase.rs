/// Crawl phase definitions for the orchestrator state machine
///
/// One pass over a listing page moves through the active phases in order;
/// `Done` and `Aborted` end the run.
use std::fmt;

/// Represents the phase the orchestrator is currently in
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CrawlPhase {
    // ===== Active Phases =====
    /// Fetching the current listing page
    FetchingPage,

    /// Running the page extractor on the listing body
    Extracting,

    /// Dropping already-seen identities and marking the rest
    Deduping,

    /// Waiting on the worker pool for every detail resolution of the page
    Resolving,

    /// Appending resolved records to the batch
    Accumulating,

    /// Writing the batch to the store
    Flushing,

    /// Computing the next page and checking for loops
    Advancing,

    // ===== Terminal Phases =====
    /// Traversal finished normally
    Done,

    /// Traversal stopped on a fatal page-level failure
    Aborted,
}

impl CrawlPhase {
    /// Returns true if this is a terminal phase
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Done | Self::Aborted)
    }

    /// Returns true if the transition `self -> next` is part of the state machine
    pub fn can_transition_to(&self, next: CrawlPhase) -> bool {
        use CrawlPhase::*;

        match (self, next) {
            (FetchingPage, Extracting) | (FetchingPage, Aborted) => true,
            (Extracting, Deduping) | (Extracting, Done) | (Extracting, Aborted) => true,
            (Deduping, Resolving) => true,
            (Resolving, Accumulating) => true,
            (Accumulating, Flushing) | (Accumulating, Advancing) => true,
            (Flushing, Advancing) => true,
            (Advancing, FetchingPage) | (Advancing, Done) => true,
            _ => false,
        }
    }

    /// Converts the phase to its log representation
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::FetchingPage => "fetching_page",
            Self::Extracting => "extracting",
            Self::Deduping => "deduping",
            Self::Resolving => "resolving",
            Self::Accumulating => "accumulating",
            Self::Flushing => "flushing",
            Self::Advancing => "advancing",
            Self::Done => "done",
            Self::Aborted => "aborted",
        }
    }
}

impl fmt::Display for CrawlPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_terminal() {
        assert!(CrawlPhase::Done.is_terminal());
        assert!(CrawlPhase::Aborted.is_terminal());

        assert!(!CrawlPhase::FetchingPage.is_terminal());
        assert!(!CrawlPhase::Resolving.is_terminal());
        assert!(!CrawlPhase::Advancing.is_terminal());
    }

    #[test]
    fn test_page_cycle_transitions() {
        let cycle = [
            CrawlPhase::FetchingPage,
            CrawlPhase::Extracting,
            CrawlPhase::Deduping,
            CrawlPhase::Resolving,
            CrawlPhase::Accumulating,
            CrawlPhase::Flushing,
            CrawlPhase::Advancing,
            CrawlPhase::FetchingPage,
        ];

        for pair in cycle.windows(2) {
            assert!(
                pair[0].can_transition_to(pair[1]),
                "{} -> {} should be allowed",
                pair[0],
                pair[1]
            );
        }
    }

    #[test]
    fn test_flushing_is_optional() {
        assert!(CrawlPhase::Accumulating.can_transition_to(CrawlPhase::Advancing));
    }

    #[test]
    fn test_invalid_transitions() {
        assert!(!CrawlPhase::Done.can_transition_to(CrawlPhase::FetchingPage));
        assert!(!CrawlPhase::Resolving.can_transition_to(CrawlPhase::Aborted));
        assert!(!CrawlPhase::Deduping.can_transition_to(CrawlPhase::Flushing));
        assert!(!CrawlPhase::FetchingPage.can_transition_to(CrawlPhase::Done));
    }

    #[test]
    fn test_display() {
        assert_eq!(format!("{}", CrawlPhase::FetchingPage), "fetching_page");
        assert_eq!(format!("{}", CrawlPhase::Aborted), "aborted");
    }
}
