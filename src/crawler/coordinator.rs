//! Harvest orchestrator - main traversal logic
//!
//! This module contains the state machine that drives one harvest run:
//! - Walking the listing pages in order, with loop detection and a page cap
//! - Deduplicating discovered items and resolving them through the worker pool
//! - Accumulating resolved records and flushing them to the store
//! - Reporting the outcome as a `RunSummary`

use crate::config::Config;
use crate::crawler::batch::{BatchPersister, FlushResult};
use crate::crawler::dedup::DedupTracker;
use crate::crawler::fetcher::{HttpTransport, ResilientFetcher, RetryPolicy, Transport};
use crate::crawler::parser::{CatalogExtractor, PageExtractor, SearchPage};
use crate::crawler::pool::WorkerPool;
use crate::crawler::resolver::{DetailResolver, Resolution, ResolveOutcome};
use crate::record::{LegislationRecord, SearchResultItem};
use crate::state::{Advance, CrawlPhase, PaginationState};
use crate::storage::{SqliteStore, Store};
use crate::url::{canonical_identity, resolve_reference};
use crate::HarvestError;
use chrono::Utc;
use std::fmt;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use url::Url;

/// Why a harvest run stopped
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Termination {
    /// A well-formed listing page had no items
    EndOfResults,

    /// The last listing page had no next-page marker
    NoNextPage,

    /// The next-page marker pointed at a page already visited
    LoopDetected { url: String },

    /// The configured number of pages was visited
    PageLimitReached,

    /// A listing page could not be fetched after all retries
    PageFetchFailed { url: String },

    /// A listing page body was not a listing page
    MalformedPage { url: String },
}

impl Termination {
    /// Returns true if the run ended on a failure rather than a natural end
    pub fn is_aborted(&self) -> bool {
        matches!(
            self,
            Self::PageFetchFailed { .. } | Self::MalformedPage { .. }
        )
    }

    /// The terminal phase this termination puts the orchestrator in
    pub fn phase(&self) -> CrawlPhase {
        if self.is_aborted() {
            CrawlPhase::Aborted
        } else {
            CrawlPhase::Done
        }
    }
}

impl fmt::Display for Termination {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::EndOfResults => write!(f, "end_of_results"),
            Self::NoNextPage => write!(f, "no_next_page"),
            Self::LoopDetected { url } => write!(f, "loop_detected: {}", url),
            Self::PageLimitReached => write!(f, "page_limit_reached"),
            Self::PageFetchFailed { url } => write!(f, "page_fetch_failed: {}", url),
            Self::MalformedPage { url } => write!(f, "malformed_page: {}", url),
        }
    }
}

/// Outcome of a harvest run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunSummary {
    pub run_id: i64,
    pub pages_visited: u32,
    pub items_discovered: usize,
    pub duplicates_skipped: usize,
    /// Items resolved, including those stored as minimal records
    pub items_processed: usize,
    /// Items whose detail page was unavailable
    pub items_failed: usize,
    pub records_inserted: usize,
    pub records_updated: usize,
    /// Records that never reached the store
    pub records_dropped: usize,
    pub flushes: usize,
    pub termination: Termination,
    pub elapsed: Duration,
}

impl RunSummary {
    pub fn records_written(&self) -> usize {
        self.records_inserted + self.records_updated
    }

    pub fn is_aborted(&self) -> bool {
        self.termination.is_aborted()
    }
}

#[derive(Debug, Default)]
struct Tally {
    pages_visited: u32,
    items_discovered: usize,
    duplicates_skipped: usize,
    items_processed: usize,
    items_failed: usize,
    records_inserted: usize,
    records_updated: usize,
    records_dropped: usize,
    flushes: usize,
}

impl Tally {
    fn record_flush(&mut self, result: &FlushResult) {
        if *result == FlushResult::Empty {
            return;
        }

        self.flushes += 1;
        self.records_dropped += result.dropped();
        if let FlushResult::Written {
            inserted, updated, ..
        } = result
        {
            self.records_inserted += inserted;
            self.records_updated += updated;
        }
    }

    fn into_summary(self, run_id: i64, termination: Termination, elapsed: Duration) -> RunSummary {
        RunSummary {
            run_id,
            pages_visited: self.pages_visited,
            items_discovered: self.items_discovered,
            duplicates_skipped: self.duplicates_skipped,
            items_processed: self.items_processed,
            items_failed: self.items_failed,
            records_inserted: self.records_inserted,
            records_updated: self.records_updated,
            records_dropped: self.records_dropped,
            flushes: self.flushes,
            termination,
            elapsed,
        }
    }
}

/// Main harvest orchestrator
///
/// Owns all run-scoped state: the visited pages, the dedup set and the
/// batch. A fresh instance is created for every run.
pub struct Orchestrator {
    config: Config,
    fetcher: Arc<ResilientFetcher>,
    extractor: Arc<dyn PageExtractor>,
    resolver: Arc<DetailResolver>,
    dedup: DedupTracker,
    batch: BatchPersister,
    pagination: PaginationState,
    phase: CrawlPhase,
    run_id: i64,
    tally: Tally,
}

impl Orchestrator {
    /// Creates a new orchestrator instance
    ///
    /// Ensures the store's unique index and records the start of a run.
    ///
    /// # Arguments
    ///
    /// * `config` - The harvest configuration
    /// * `transport` - Network access for every fetch of the run
    /// * `extractor` - Page extractor for listing, detail and original-text pages
    /// * `store` - Destination of the resolved records
    /// * `config_hash` - Fingerprint of the configuration, stored with the run
    ///
    /// # Returns
    ///
    /// * `Ok(Orchestrator)` - Ready to run
    /// * `Err(HarvestError)` - The run cannot start
    pub fn new(
        config: Config,
        transport: Arc<dyn Transport>,
        extractor: Arc<dyn PageExtractor>,
        mut store: Box<dyn Store>,
        config_hash: &str,
    ) -> Result<Self, HarvestError> {
        let root = canonical_identity(&config.catalog.root_url)?;

        store.ensure_unique_index()?;
        let run_id = store.begin_run(config_hash)?;

        let fetcher = Arc::new(ResilientFetcher::new(
            transport,
            RetryPolicy::from_config(&config.fetch),
        ));
        let resolver = Arc::new(DetailResolver::new(fetcher.clone(), extractor.clone()));
        let batch = BatchPersister::new(store, config.crawler.batch_threshold as usize);

        Ok(Self {
            config,
            fetcher,
            extractor,
            resolver,
            dedup: DedupTracker::new(),
            batch,
            pagination: PaginationState::new(root),
            phase: CrawlPhase::FetchingPage,
            run_id,
            tally: Tally::default(),
        })
    }

    /// Runs the harvest to completion
    ///
    /// Failures of individual items never stop the run; only a listing page
    /// that cannot be fetched or read ends it early. Either way the residual
    /// batch is flushed and the run is recorded before the summary is
    /// returned.
    pub async fn run(mut self) -> RunSummary {
        let started = Instant::now();
        let pool = WorkerPool::new(
            self.config.crawler.concurrency as usize,
            self.config.crawler.task_delay(),
        );

        tracing::info!(
            run_id = self.run_id,
            "Starting harvest run {}. Max pages: {}, concurrency: {}",
            self.run_id,
            self.config.crawler.max_pages,
            pool.width()
        );

        let mut body = Vec::new();
        let mut page = SearchPage::default();
        let mut fresh: Vec<SearchResultItem> = Vec::new();
        let mut resolved: Vec<Resolution> = Vec::new();

        let termination = loop {
            let page_number = self.pagination.page_number();
            let current = self.pagination.current().to_string();

            match self.phase {
                CrawlPhase::FetchingPage => {
                    tracing::info!(page = page_number, url = %current, "Fetching search results page");
                    match self.fetcher.fetch(&current).await {
                        Ok(fetched) => {
                            self.tally.pages_visited += 1;
                            body = fetched;
                            self.transition(CrawlPhase::Extracting);
                        }
                        Err(e) => {
                            tracing::error!(
                                page = page_number,
                                "Failed to fetch search page {}, stopping: {}",
                                page_number,
                                e
                            );
                            break Termination::PageFetchFailed { url: current };
                        }
                    }
                }

                CrawlPhase::Extracting => {
                    match self.extractor.extract_search_results(&body) {
                        Ok(extracted) => page = extracted,
                        Err(e) => {
                            tracing::error!(page = page_number, url = %current, "Unreadable search page: {}", e);
                            break Termination::MalformedPage { url: current };
                        }
                    }

                    tracing::info!(
                        page = page_number,
                        count = page.items.len(),
                        "Found {} items on page {}",
                        page.items.len(),
                        page_number
                    );

                    if page.items.is_empty() {
                        tracing::info!("No items found on page, end of results");
                        break Termination::EndOfResults;
                    }
                    self.tally.items_discovered += page.items.len();
                    self.transition(CrawlPhase::Deduping);
                }

                CrawlPhase::Deduping => {
                    let (kept, skipped) = self.dedup.filter_unseen(std::mem::take(&mut page.items));
                    if skipped > 0 {
                        tracing::debug!(page = page_number, "Skipped {} already seen items", skipped);
                    }
                    self.tally.duplicates_skipped += skipped;
                    fresh = kept;
                    self.transition(CrawlPhase::Resolving);
                }

                CrawlPhase::Resolving => {
                    resolved = self.resolve_all(&pool, std::mem::take(&mut fresh)).await;
                    self.transition(CrawlPhase::Accumulating);
                }

                CrawlPhase::Accumulating => {
                    for resolution in resolved.drain(..) {
                        self.tally.items_processed += 1;
                        if resolution.is_failure() {
                            self.tally.items_failed += 1;
                        }
                        self.batch.add(resolution.record);
                    }

                    if self.batch.is_full() || (self.is_last_page(&page) && !self.batch.is_empty())
                    {
                        self.transition(CrawlPhase::Flushing);
                    } else {
                        self.transition(CrawlPhase::Advancing);
                    }
                }

                CrawlPhase::Flushing => {
                    while self.batch.is_full() {
                        self.flush();
                    }
                    if self.is_last_page(&page) {
                        self.flush_all();
                    }
                    self.transition(CrawlPhase::Advancing);
                }

                CrawlPhase::Advancing => match self.advance(&page).await {
                    Some(termination) => break termination,
                    None => self.transition(CrawlPhase::FetchingPage),
                },

                CrawlPhase::Done | CrawlPhase::Aborted => {
                    // Terminal phases are only entered after the loop
                    break Termination::EndOfResults;
                }
            }
        };

        self.transition(termination.phase());
        self.flush_all();

        let run_id = self.run_id;
        let summary = std::mem::take(&mut self.tally).into_summary(
            run_id,
            termination,
            started.elapsed(),
        );

        if let Err(e) = self.batch.store_mut().finish_run(run_id, &summary) {
            tracing::warn!(run_id, "Failed to record run completion: {}", e);
        }

        tracing::info!(
            run_id,
            "Harvest run {} finished ({}): {} pages, {} items processed, {} failed, {} records written, {} dropped",
            run_id,
            summary.termination,
            summary.pages_visited,
            summary.items_processed,
            summary.items_failed,
            summary.records_written(),
            summary.records_dropped
        );

        summary
    }

    /// Resolves every item through the pool and waits for all of them
    async fn resolve_all(&self, pool: &WorkerPool, items: Vec<SearchResultItem>) -> Vec<Resolution> {
        let handles: Vec<_> = items
            .iter()
            .cloned()
            .map(|item| {
                let resolver = self.resolver.clone();
                pool.submit(async move { resolver.resolve(item).await })
            })
            .collect();

        let results = WorkerPool::join_all(handles).await;

        items
            .into_iter()
            .zip(results)
            .map(|(item, result)| match result {
                Ok(resolution) => resolution,
                Err(e) => {
                    tracing::warn!(url = %item.identity, "Detail resolution aborted: {}", e);
                    Resolution {
                        record: LegislationRecord::minimal(item, Utc::now()),
                        outcome: ResolveOutcome::DetailUnavailable,
                    }
                }
            })
            .collect()
    }

    /// Moves to the next listing page, or returns why the traversal ends
    async fn advance(&mut self, page: &SearchPage) -> Option<Termination> {
        let Some(next_ref) = page.next_page_ref.as_deref() else {
            tracing::info!("No next page link, end of results");
            return Some(Termination::NoNextPage);
        };

        if self.pagination.page_number() >= self.config.crawler.max_pages {
            tracing::info!(
                "Reached page limit of {}",
                self.config.crawler.max_pages
            );
            return Some(Termination::PageLimitReached);
        }

        let next = match resolve_reference(self.pagination.current(), next_ref) {
            Ok(next) => next,
            Err(e) => {
                tracing::warn!("Unusable next page link '{}': {}", next_ref, e);
                return Some(Termination::NoNextPage);
            }
        };

        match self.pagination.advance(next) {
            Advance::LoopDetected { url } => {
                tracing::warn!(url = %url, "Detected pagination loop, stopping");
                Some(Termination::LoopDetected {
                    url: url.to_string(),
                })
            }
            Advance::Moved => {
                let delay = self.config.crawler.page_delay();
                if !delay.is_zero() {
                    tracing::debug!("Waiting {:?} before the next page", delay);
                    tokio::time::sleep(delay).await;
                }
                None
            }
        }
    }

    /// Returns true if no page follows the current one
    fn is_last_page(&self, page: &SearchPage) -> bool {
        page.next_page_ref.is_none()
            || self.pagination.page_number() >= self.config.crawler.max_pages
    }

    fn flush(&mut self) {
        let result = self.batch.flush();
        self.tally.record_flush(&result);
    }

    fn flush_all(&mut self) {
        while !self.batch.is_empty() {
            self.flush();
        }
    }

    fn transition(&mut self, next: CrawlPhase) {
        debug_assert!(
            self.phase.can_transition_to(next),
            "invalid transition {} -> {}",
            self.phase,
            next
        );
        tracing::trace!("Phase {} -> {}", self.phase, next);
        if next.is_terminal() {
            tracing::debug!(run_id = self.run_id, "Traversal finished in phase {}", next);
        }
        self.phase = next;
    }
}

/// Runs a complete harvest against the live catalog
///
/// This is the main entry point for starting a harvest. It will:
/// 1. Build the HTTP transport and the catalog extractor
/// 2. Open the SQLite store
/// 3. Walk the listing pages and resolve every new item
/// 4. Persist the records and record the run
///
/// # Example
///
/// ```no_run
/// use legis_harvest::config::load_config_with_hash;
/// use legis_harvest::crawler::run_harvest;
/// use std::path::Path;
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let (config, hash) = load_config_with_hash(Path::new("harvest.toml"))?;
/// let summary = run_harvest(config, &hash).await?;
/// println!("{} records written", summary.records_written());
/// # Ok(())
/// # }
/// ```
pub async fn run_harvest(config: Config, config_hash: &str) -> Result<RunSummary, HarvestError> {
    let transport = Arc::new(HttpTransport::from_config(&config.fetch)?);
    let extractor = Arc::new(CatalogExtractor::new(Url::parse(
        &config.catalog.detail_base_url,
    )?)?);
    let store = SqliteStore::new(Path::new(&config.output.database_path))?;

    let orchestrator = Orchestrator::new(
        config,
        transport,
        extractor,
        Box::new(store),
        config_hash,
    )?;

    Ok(orchestrator.run().await)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::parse_config;
    use crate::crawler::fetcher::TransportError;
    use crate::storage::{ItemError, RunRecord, StorageError, StorageResult, StoredRecord, UpsertReport};
    use async_trait::async_trait;
    use std::collections::HashMap;
    use std::sync::Mutex;

    const ROOT: &str = "https://catalog.test/busca";

    /// Transport serving fixed pages; unknown URLs answer 404
    struct SiteTransport {
        pages: HashMap<String, String>,
        requests: Mutex<Vec<String>>,
    }

    impl SiteTransport {
        fn new(pages: Vec<(String, String)>) -> Self {
            Self {
                pages: pages.into_iter().collect(),
                requests: Mutex::new(Vec::new()),
            }
        }

        fn requests_for(&self, url: &str) -> usize {
            self.requests
                .lock()
                .unwrap()
                .iter()
                .filter(|requested| *requested == url)
                .count()
        }
    }

    #[async_trait]
    impl Transport for SiteTransport {
        async fn get(&self, url: &str) -> Result<Vec<u8>, TransportError> {
            self.requests.lock().unwrap().push(url.to_string());
            self.pages
                .get(url)
                .map(|body| body.as_bytes().to_vec())
                .ok_or(TransportError::Status(404))
        }
    }

    fn config(max_pages: u32, batch_threshold: u32) -> Config {
        parse_config(&format!(
            r#"
            [catalog]
            root-url = "{}"
            detail-base-url = "https://catalog.test"

            [crawler]
            max-pages = {}
            concurrency = 3
            batch-threshold = {}
            page-delay-ms = 0
            task-delay-ms = 0

            [fetch]
            max-retries = 2
            retry-base-delay-ms = 1

            [output]
            database-path = ":memory:"
            "#,
            ROOT, max_pages, batch_threshold
        ))
        .unwrap()
    }

    fn listing(ids: &[u32], next: Option<&str>) -> String {
        let items: String = ids
            .iter()
            .map(|id| {
                format!(
                    r#"<li class="busca-resultados__item">
                        <h3 class="busca-resultados__cabecalho"><a href="/lei-{id}.html">Resumo {id}</a></h3>
                        <p class="busca-resultados__situacao">Situação: Em vigor</p>
                    </li>"#,
                    id = id
                )
            })
            .collect();
        let nav = next
            .map(|href| {
                format!(
                    r#"<a class="pagination-list__nav-link" href="{}">Próxima</a>"#,
                    href
                )
            })
            .unwrap_or_default();
        format!("<html><body><ul>{}</ul>{}</body></html>", items, nav)
    }

    fn detail(id: u32) -> String {
        format!(
            r#"<html><body><div class="dadosNorma"><h1>Lei {}</h1></div></body></html>"#,
            id
        )
    }

    fn site(pages: Vec<(&str, String)>, details: &[u32]) -> Arc<SiteTransport> {
        let mut all: Vec<(String, String)> = pages
            .into_iter()
            .map(|(url, body)| (url.to_string(), body))
            .collect();
        for id in details {
            all.push((format!("https://catalog.test/lei-{}.html", id), detail(*id)));
        }
        Arc::new(SiteTransport::new(all))
    }

    fn orchestrator(config: Config, transport: Arc<SiteTransport>) -> (Orchestrator, Arc<SiteTransport>) {
        let extractor =
            CatalogExtractor::new(Url::parse("https://catalog.test").unwrap()).unwrap();
        let store = SqliteStore::open_in_memory().unwrap();
        let orchestrator = Orchestrator::new(
            config,
            transport.clone(),
            Arc::new(extractor),
            Box::new(store),
            "test",
        )
        .unwrap();
        (orchestrator, transport)
    }

    /// Store that rejects chosen bulk writes and chosen records
    struct FaultyStore {
        inner: SqliteStore,
        calls: usize,
        failing_calls: Vec<usize>,
        rejected: Vec<String>,
        written: Arc<Mutex<Vec<String>>>,
    }

    impl FaultyStore {
        fn new(failing_calls: Vec<usize>, rejected: Vec<&str>) -> (Self, Arc<Mutex<Vec<String>>>) {
            let written = Arc::new(Mutex::new(Vec::new()));
            let store = Self {
                inner: SqliteStore::open_in_memory().unwrap(),
                calls: 0,
                failing_calls,
                rejected: rejected.into_iter().map(str::to_string).collect(),
                written: written.clone(),
            };
            (store, written)
        }
    }

    impl Store for FaultyStore {
        fn ensure_unique_index(&mut self) -> StorageResult<()> {
            self.inner.ensure_unique_index()
        }

        fn bulk_upsert(&mut self, records: &[LegislationRecord]) -> StorageResult<UpsertReport> {
            self.calls += 1;
            if self.failing_calls.contains(&self.calls) {
                return Err(StorageError::Database("connection lost".to_string()));
            }

            let (rejected, accepted): (Vec<_>, Vec<_>) = records
                .iter()
                .cloned()
                .partition(|record| self.rejected.contains(&record.identity));

            let mut report = self.inner.bulk_upsert(&accepted)?;
            report.errors.extend(rejected.into_iter().map(|record| ItemError {
                identity: record.identity,
                message: "constraint failed".to_string(),
            }));
            self.written
                .lock()
                .unwrap()
                .extend(accepted.into_iter().map(|record| record.identity));
            Ok(report)
        }

        fn get_record(&self, identity: &str) -> StorageResult<Option<StoredRecord>> {
            self.inner.get_record(identity)
        }

        fn count_records(&self) -> StorageResult<u64> {
            self.inner.count_records()
        }

        fn count_failed_records(&self) -> StorageResult<u64> {
            self.inner.count_failed_records()
        }

        fn begin_run(&mut self, config_hash: &str) -> StorageResult<i64> {
            self.inner.begin_run(config_hash)
        }

        fn finish_run(&mut self, run_id: i64, summary: &RunSummary) -> StorageResult<()> {
            self.inner.finish_run(run_id, summary)
        }

        fn get_run(&self, run_id: i64) -> StorageResult<RunRecord> {
            self.inner.get_run(run_id)
        }

        fn latest_run(&self) -> StorageResult<Option<RunRecord>> {
            self.inner.latest_run()
        }
    }

    fn orchestrator_with_store(
        config: Config,
        transport: Arc<SiteTransport>,
        store: Box<dyn Store>,
    ) -> Orchestrator {
        let extractor =
            CatalogExtractor::new(Url::parse("https://catalog.test").unwrap()).unwrap();
        Orchestrator::new(config, transport, Arc::new(extractor), store, "test").unwrap()
    }

    fn two_pages() -> Arc<SiteTransport> {
        site(
            vec![
                (ROOT, listing(&[1, 2, 3], Some("?pagina=2"))),
                ("https://catalog.test/busca?pagina=2", listing(&[4, 5], None)),
            ],
            &[1, 2, 3, 4, 5],
        )
    }

    #[tokio::test]
    async fn test_single_page_without_next() {
        let transport = site(vec![(ROOT, listing(&[1, 2, 3], None))], &[1, 2, 3]);
        let (orchestrator, _) = orchestrator(config(10, 50), transport);

        let summary = orchestrator.run().await;

        assert_eq!(summary.termination, Termination::NoNextPage);
        assert_eq!(summary.pages_visited, 1);
        assert_eq!(summary.items_processed, 3);
        assert_eq!(summary.items_failed, 0);
        assert_eq!(summary.records_inserted, 3);
        assert_eq!(summary.flushes, 1);
        assert!(!summary.is_aborted());
    }

    #[tokio::test]
    async fn test_duplicates_across_pages_resolved_once() {
        let page2 = "https://catalog.test/busca?pagina=2";
        let transport = site(
            vec![
                (ROOT, listing(&[1, 2], Some("?pagina=2"))),
                (page2, listing(&[2, 3], None)),
            ],
            &[1, 2, 3],
        );
        let (orchestrator, transport) = orchestrator(config(10, 50), transport);

        let summary = orchestrator.run().await;

        assert_eq!(summary.pages_visited, 2);
        assert_eq!(summary.items_discovered, 4);
        assert_eq!(summary.duplicates_skipped, 1);
        assert_eq!(summary.items_processed, 3);
        assert_eq!(transport.requests_for("https://catalog.test/lei-2.html"), 1);
    }

    #[tokio::test]
    async fn test_loop_back_to_first_page() {
        let page2 = "https://catalog.test/busca?pagina=2";
        let page3 = "https://catalog.test/busca?pagina=3";
        let transport = site(
            vec![
                (ROOT, listing(&[1], Some("?pagina=2"))),
                (page2, listing(&[2], Some("?pagina=3"))),
                (page3, listing(&[3], Some("/busca"))),
            ],
            &[1, 2, 3],
        );
        let (orchestrator, transport) = orchestrator(config(10, 50), transport);

        let summary = orchestrator.run().await;

        assert_eq!(
            summary.termination,
            Termination::LoopDetected {
                url: ROOT.to_string()
            }
        );
        assert!(!summary.is_aborted());
        assert_eq!(summary.pages_visited, 3);
        assert_eq!(transport.requests_for(ROOT), 1);
        assert_eq!(summary.records_inserted, 3);
    }

    #[tokio::test]
    async fn test_page_limit() {
        let page2 = "https://catalog.test/busca?pagina=2";
        let transport = site(
            vec![
                (ROOT, listing(&[1], Some("?pagina=2"))),
                (page2, listing(&[2], Some("?pagina=3"))),
            ],
            &[1, 2],
        );
        let (orchestrator, _) = orchestrator(config(2, 50), transport);

        let summary = orchestrator.run().await;

        assert_eq!(summary.termination, Termination::PageLimitReached);
        assert_eq!(summary.pages_visited, 2);
        assert_eq!(summary.records_inserted, 2);
    }

    #[tokio::test]
    async fn test_empty_listing_ends_run() {
        let transport = site(vec![(ROOT, listing(&[], Some("?pagina=2")))], &[]);
        let (orchestrator, _) = orchestrator(config(10, 50), transport);

        let summary = orchestrator.run().await;

        assert_eq!(summary.termination, Termination::EndOfResults);
        assert_eq!(summary.flushes, 0);
    }

    #[tokio::test]
    async fn test_page_fetch_failure_aborts_after_flushing() {
        let transport = site(
            vec![(ROOT, listing(&[1, 2], Some("?pagina=2")))],
            &[1, 2],
        );
        let (orchestrator, _) = orchestrator(config(10, 50), transport);

        let summary = orchestrator.run().await;

        assert_eq!(
            summary.termination,
            Termination::PageFetchFailed {
                url: "https://catalog.test/busca?pagina=2".to_string()
            }
        );
        assert!(summary.is_aborted());
        assert_eq!(summary.pages_visited, 1);
        assert_eq!(summary.records_inserted, 2);
    }

    #[tokio::test]
    async fn test_malformed_listing_aborts() {
        let transport = site(vec![(ROOT, String::new())], &[]);
        let (orchestrator, _) = orchestrator(config(10, 50), transport);

        let summary = orchestrator.run().await;

        assert!(matches!(summary.termination, Termination::MalformedPage { .. }));
        assert!(summary.is_aborted());
    }

    #[tokio::test]
    async fn test_detail_failure_counts_as_failed_item() {
        let transport = site(vec![(ROOT, listing(&[1, 2], None))], &[1]);
        let (orchestrator, _) = orchestrator(config(10, 50), transport);

        let summary = orchestrator.run().await;

        assert_eq!(summary.items_processed, 2);
        assert_eq!(summary.items_failed, 1);
        assert_eq!(summary.records_inserted, 2);
    }

    #[tokio::test]
    async fn test_threshold_flush_mid_run() {
        let page2 = "https://catalog.test/busca?pagina=2";
        let transport = site(
            vec![
                (ROOT, listing(&[1, 2, 3], Some("?pagina=2"))),
                (page2, listing(&[4, 5], None)),
            ],
            &[1, 2, 3, 4, 5],
        );
        let (orchestrator, _) = orchestrator(config(10, 2), transport);

        let summary = orchestrator.run().await;

        // Page 1 flushes one full batch of 2 and carries 1; page 2 is last
        // and flushes 2 + 1
        assert_eq!(summary.flushes, 3);
        assert_eq!(summary.records_inserted, 5);
    }

    #[tokio::test]
    async fn test_failed_flush_drops_batch_and_run_continues() {
        let (store, written) = FaultyStore::new(vec![1], vec![]);
        let transport = two_pages();
        let orchestrator = orchestrator_with_store(config(10, 2), transport.clone(), Box::new(store));

        let summary = orchestrator.run().await;

        // The first batch (items 1 and 2) is lost; page 2 is still visited
        // and the later batches reach the store
        assert_eq!(summary.termination, Termination::NoNextPage);
        assert_eq!(summary.pages_visited, 2);
        assert_eq!(transport.requests_for("https://catalog.test/busca?pagina=2"), 1);
        assert_eq!(summary.flushes, 3);
        assert_eq!(summary.records_dropped, 2);
        assert_eq!(summary.records_inserted, 3);
        assert_eq!(
            *written.lock().unwrap(),
            vec![
                "https://catalog.test/lei-3.html".to_string(),
                "https://catalog.test/lei-4.html".to_string(),
                "https://catalog.test/lei-5.html".to_string(),
            ]
        );
    }

    #[tokio::test]
    async fn test_rejected_records_count_as_dropped() {
        let (store, written) = FaultyStore::new(vec![], vec!["https://catalog.test/lei-2.html"]);
        let orchestrator = orchestrator_with_store(config(10, 2), two_pages(), Box::new(store));

        let summary = orchestrator.run().await;

        assert_eq!(summary.records_dropped, 1);
        assert_eq!(summary.records_inserted, 4);
        assert_eq!(summary.records_written(), 4);
        assert!(!written
            .lock()
            .unwrap()
            .contains(&"https://catalog.test/lei-2.html".to_string()));
    }

    #[test]
    fn test_termination_classification() {
        assert!(!Termination::EndOfResults.is_aborted());
        assert!(!Termination::NoNextPage.is_aborted());
        assert!(!Termination::PageLimitReached.is_aborted());
        assert!(!Termination::LoopDetected {
            url: ROOT.to_string()
        }
        .is_aborted());
        assert!(Termination::PageFetchFailed {
            url: ROOT.to_string()
        }
        .is_aborted());
        assert_eq!(
            Termination::MalformedPage {
                url: ROOT.to_string()
            }
            .phase(),
            CrawlPhase::Aborted
        );
    }
}
