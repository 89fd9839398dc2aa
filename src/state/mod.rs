//! State module for tracking harvest progress
//!
//! # Components
//!
//! - `CrawlPhase`: the orchestrator's state machine phases
//! - `PaginationState`: current listing page, page counter and the set of
//!   visited pages used for loop detection

mod crawl_phase;
mod pagination;

// Re-export main types
pub use crawl_phase::CrawlPhase;
pub use pagination::{Advance, PaginationState};
