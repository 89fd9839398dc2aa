//! Crawler module for catalog traversal and record resolution
//!
//! This module contains the core harvesting logic, including:
//! - HTTP fetching with retry logic
//! - HTML extraction of listing, detail and original-text pages
//! - Detail resolution through a bounded worker pool
//! - Deduplication and batched persistence
//! - Overall run orchestration

mod batch;
mod coordinator;
mod dedup;
mod fetcher;
mod parser;
mod pool;
mod resolver;

pub use batch::{BatchPersister, FlushResult};
pub use coordinator::{run_harvest, Orchestrator, RunSummary, Termination};
pub use dedup::DedupTracker;
pub use fetcher::{
    build_http_client, FetchError, HttpTransport, ResilientFetcher, RetryPolicy, Transport,
    TransportError,
};
pub use parser::{CatalogExtractor, ExtractError, PageExtractor, SearchPage};
pub use pool::{PoolError, TaskHandle, WorkerPool};
pub use resolver::{DetailResolver, Resolution, ResolveOutcome};
