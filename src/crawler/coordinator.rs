//! Pagination controller - main crawl orchestration logic
//!
//! This module drives the page-by-page crawl:
//! - Preparing a fresh or resumed retrieval state
//! - Fetching each listing page through the transport
//! - Handing page bodies to the field extractor and inserting records
//! - Deciding whether to continue, and why not
//! - Persisting state periodically and on every stop
//!
//! # States
//!
//! ```text
//! Start → Fetching → Extracting → Deciding ─┬→ Fetching
//!             │                              └→ Stopped
//!             └→ Stopped (blocked / error / interrupted)
//! ```

use crate::config::CrawlerConfig;
use crate::crawler::fetcher::Fetch;
use crate::crawler::parser::FieldExtractor;
use crate::crawler::shutdown::ShutdownSignal;
use crate::state::{CandidateRecord, Record, RetrievalState};
use crate::storage::{persist, StateStore, StorageResult};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

/// Why a crawl stopped
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StopReason {
    /// The source answered with a challenge page
    Blocked,

    /// A page failed and no successor could be named
    Error,

    /// No next page, or the page budget is spent
    Exhausted,

    /// The record limit was reached
    MaxReached,

    /// Shutdown was requested
    Interrupted,
}

impl StopReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Blocked => "blocked",
            Self::Error => "error",
            Self::Exhausted => "exhausted",
            Self::MaxReached => "max_reached",
            Self::Interrupted => "interrupted",
        }
    }
}

impl fmt::Display for StopReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Result of one crawl run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CrawlOutcome {
    pub reason: StopReason,

    /// Distinct records added by this run
    pub records_added: usize,

    /// Distinct records in the state after this run
    pub total_records: usize,

    /// Pages fetched successfully by this run
    pub pages_fetched: u32,

    /// Whether the final snapshot was written
    pub persisted: bool,
}

/// Limits and cadence for a crawl
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CrawlOptions {
    pub max_records: usize,

    /// Page attempts allowed per run, failed pages included
    pub max_pages: u32,

    pub persist_every_pages: u32,
}

impl Default for CrawlOptions {
    fn default() -> Self {
        Self::from_config(&CrawlerConfig::default())
    }
}

impl CrawlOptions {
    pub fn from_config(config: &CrawlerConfig) -> Self {
        Self {
            max_records: config.max_records,
            max_pages: config.max_pages,
            persist_every_pages: config.persist_every_pages.max(1),
        }
    }
}

/// Loads the state a crawl starts from
///
/// # Arguments
///
/// * `store` - Where snapshots live
/// * `seed_url` - First listing page of a fresh run
/// * `resume` - Continue from the persisted snapshot if one exists
///
/// # Returns
///
/// * `Ok(RetrievalState)` - A resumed snapshot, or a fresh state at `seed_url`
/// * `Err(StorageError)` - A snapshot exists but cannot be read
pub fn prepare_state(
    store: &dyn StateStore,
    seed_url: &str,
    resume: bool,
) -> StorageResult<RetrievalState> {
    if !resume {
        tracing::info!("Starting fresh crawl at {}", seed_url);
        return Ok(RetrievalState::new(seed_url));
    }

    match store.load()? {
        Some(state) => {
            if let Some(query) = state.query() {
                if query.url != seed_url {
                    tracing::warn!(
                        "Resuming snapshot for {} (requested {})",
                        query.url,
                        seed_url
                    );
                }
            }
            tracing::info!(
                "Resuming with {} records, next page: {}",
                state.len(),
                state.next_page_url().unwrap_or("none")
            );
            Ok(state)
        }
        None => {
            tracing::info!("No snapshot found, starting fresh crawl at {}", seed_url);
            Ok(RetrievalState::new(seed_url))
        }
    }
}

/// Drives the page-by-page crawl
pub struct PaginationController {
    transport: Arc<dyn Fetch>,
    extractor: Arc<dyn FieldExtractor>,
    store: Arc<dyn StateStore>,
    options: CrawlOptions,
    shutdown: ShutdownSignal,
}

impl PaginationController {
    /// Creates a controller
    ///
    /// # Arguments
    ///
    /// * `transport` - Fetches listing pages
    /// * `extractor` - Turns page bodies into candidates
    /// * `store` - Receives periodic and final snapshots
    /// * `options` - Limits and persistence cadence; a cadence of 0 is treated as 1
    pub fn new(
        transport: Arc<dyn Fetch>,
        extractor: Arc<dyn FieldExtractor>,
        store: Arc<dyn StateStore>,
        mut options: CrawlOptions,
    ) -> Self {
        options.persist_every_pages = options.persist_every_pages.max(1);
        Self {
            transport,
            extractor,
            store,
            options,
            shutdown: ShutdownSignal::never(),
        }
    }

    /// Observes `signal` for cancellation
    pub fn with_shutdown(mut self, signal: ShutdownSignal) -> Self {
        self.shutdown = signal;
        self
    }

    /// Runs the crawl until a stop condition is met
    ///
    /// Never fails: every stop, including blocks and transport errors, ends
    /// with a persisted snapshot and a [`CrawlOutcome`] naming the reason.
    pub async fn run(&self, state: &mut RetrievalState) -> CrawlOutcome {
        let initial_records = state.len();
        let mut shutdown = self.shutdown.clone();
        let mut pages_attempted: u32 = 0;
        let mut pages_fetched: u32 = 0;

        let reason = loop {
            if state.len() >= self.options.max_records {
                break StopReason::MaxReached;
            }

            let url = match state.next_page_url() {
                Some(url) => url.to_string(),
                None => break StopReason::Exhausted,
            };

            if pages_attempted >= self.options.max_pages {
                break StopReason::Exhausted;
            }

            if shutdown.is_triggered() {
                break StopReason::Interrupted;
            }

            pages_attempted += 1;
            tracing::info!("Fetching page {}: {}", pages_attempted, url);

            let fetched = tokio::select! {
                biased;
                _ = shutdown.triggered() => None,
                result = self.transport.fetch(&url) => Some(result),
            };

            let result = match fetched {
                Some(result) => result,
                None => break StopReason::Interrupted,
            };

            match result {
                Ok(body) => {
                    let page = self.extractor.extract(&String::from_utf8_lossy(&body), &url);
                    state.record_page_fetched(page.candidates.len());
                    pages_fetched += 1;

                    let added = self.insert_candidates(state, page.candidates);
                    tracing::info!(
                        "Page {}: {} new records ({} total)",
                        pages_attempted,
                        added,
                        state.len()
                    );
                    state.set_next_page_url(page.next_page);
                }
                Err(e) if e.is_blocked() => {
                    tracing::warn!("Blocked while fetching {}: {}", url, e);
                    break StopReason::Blocked;
                }
                Err(e) => {
                    state.record_page_failed();
                    tracing::warn!("Failed to fetch {}: {}", url, e);

                    match self.extractor.successor(&url) {
                        Some(next) => {
                            tracing::info!("Skipping to {}", next);
                            state.set_next_page_url(Some(next));
                        }
                        None => break StopReason::Error,
                    }
                }
            }

            if pages_attempted % self.options.persist_every_pages == 0 {
                persist(self.store.as_ref(), state);
            }
        };

        state.set_last_stop(reason);
        let persisted = persist(self.store.as_ref(), state);
        log_stop(reason, state);

        CrawlOutcome {
            reason,
            records_added: state.len().saturating_sub(initial_records),
            total_records: state.len(),
            pages_fetched,
            persisted,
        }
    }

    /// Validates and inserts candidates, stopping exactly at the record limit
    fn insert_candidates(
        &self,
        state: &mut RetrievalState,
        candidates: Vec<CandidateRecord>,
    ) -> usize {
        let mut added = 0;

        for candidate in candidates {
            if state.len() >= self.options.max_records {
                tracing::debug!("Record limit reached, dropping remaining candidates");
                break;
            }

            let title = candidate.title.clone();
            match Record::from_candidate(candidate) {
                Ok(record) => {
                    if state.insert(record) {
                        added += 1;
                    } else {
                        tracing::debug!("Duplicate record: {}", title);
                    }
                }
                Err(e) => tracing::warn!("Skipping invalid record '{}': {}", title, e),
            }
        }

        added
    }
}

fn log_stop(reason: StopReason, state: &RetrievalState) {
    let total = state.len();
    match reason {
        StopReason::Blocked => tracing::warn!(
            "Crawl stopped: source is blocking requests ({} records kept, resume later)",
            total
        ),
        StopReason::Error => tracing::warn!(
            "Crawl stopped: page failed with no way past it ({} records kept)",
            total
        ),
        StopReason::Exhausted => {
            tracing::info!("Crawl finished: no more pages ({} records)", total)
        }
        StopReason::MaxReached => {
            tracing::info!("Crawl finished: record limit reached ({} records)", total)
        }
        StopReason::Interrupted => tracing::warn!(
            "Crawl interrupted: state saved with {} records, next page {}",
            total,
            state.next_page_url().unwrap_or("none")
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crawler::parser::ExtractedPage;
    use crate::crawler::shutdown::Shutdown;
    use crate::storage::MemoryStateStore;
    use crate::{TransportError, TransportResult};
    use async_trait::async_trait;
    use std::collections::HashMap;
    use std::sync::Mutex;

    /// Serves canned responses keyed by URL and counts requests
    #[derive(Default)]
    struct ScriptedFetch {
        responses: HashMap<String, Result<String, &'static str>>,
        stalled: Option<String>,
        calls: Mutex<Vec<String>>,
    }

    impl ScriptedFetch {
        /// Requests for `url` take far longer than any test runs
        fn stalling(mut self, url: &str) -> Self {
            self.stalled = Some(url.to_string());
            self
        }

        fn page(mut self, url: &str, body: &str) -> Self {
            self.responses.insert(url.to_string(), Ok(body.to_string()));
            self
        }

        fn failing(mut self, url: &str, kind: &'static str) -> Self {
            self.responses.insert(url.to_string(), Err(kind));
            self
        }

        fn calls(&self) -> Vec<String> {
            self.calls.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl Fetch for ScriptedFetch {
        async fn fetch(&self, url: &str) -> TransportResult<Vec<u8>> {
            self.calls.lock().unwrap().push(url.to_string());
            if self.stalled.as_deref() == Some(url) {
                tokio::time::sleep(std::time::Duration::from_secs(30)).await;
            }
            match self.responses.get(url) {
                Some(Ok(body)) => Ok(body.clone().into_bytes()),
                Some(Err("blocked")) => Err(TransportError::Blocked {
                    url: url.to_string(),
                    reason: "captcha".to_string(),
                }),
                _ => Err(TransportError::Exhausted {
                    url: url.to_string(),
                    attempts: 3,
                    last_error: "HTTP 503".to_string(),
                }),
            }
        }

        async fn fetch_artifact(&self, url: &str) -> TransportResult<Vec<u8>> {
            self.fetch(url).await
        }
    }

    /// Bodies look like `next=<url>;A|B|C`
    struct LineExtractor {
        successors: bool,
    }

    impl FieldExtractor for LineExtractor {
        fn extract(&self, body: &str, _page_url: &str) -> ExtractedPage {
            let (next, titles) = body.split_once(';').unwrap_or(("", body));
            let next = next.strip_prefix("next=").filter(|n| !n.is_empty());
            ExtractedPage {
                candidates: titles
                    .split('|')
                    .filter(|t| !t.is_empty())
                    .map(|t| CandidateRecord {
                        title: t.to_string(),
                        ..Default::default()
                    })
                    .collect(),
                next_page: next.map(str::to_string),
            }
        }

        fn successor(&self, page_url: &str) -> Option<String> {
            self.successors.then(|| format!("{}+", page_url))
        }
    }

    fn controller(
        fetch: Arc<ScriptedFetch>,
        store: Arc<MemoryStateStore>,
        options: CrawlOptions,
    ) -> PaginationController {
        PaginationController::new(
            fetch,
            Arc::new(LineExtractor { successors: false }),
            store,
            options,
        )
    }

    fn options(max_records: usize) -> CrawlOptions {
        CrawlOptions {
            max_records,
            max_pages: 10,
            persist_every_pages: 2,
        }
    }

    #[tokio::test]
    async fn test_two_page_listing_is_exhausted() {
        let fetch = Arc::new(
            ScriptedFetch::default()
                .page("p1", "next=p2;A|B|C")
                .page("p2", "next=;D|E"),
        );
        let store = Arc::new(MemoryStateStore::new());
        let mut state = RetrievalState::new("p1");

        let outcome = controller(fetch.clone(), store.clone(), options(10))
            .run(&mut state)
            .await;

        assert_eq!(outcome.reason, StopReason::Exhausted);
        assert_eq!(outcome.total_records, 5);
        assert_eq!(outcome.pages_fetched, 2);
        assert!(outcome.persisted);
        assert_eq!(state.ids_needing_acquisition().len(), 5);
        assert_eq!(state.next_page_url(), None);
        assert_eq!(fetch.calls(), vec!["p1", "p2"]);
        assert_eq!(store.snapshot().unwrap().len(), 5);
    }

    #[tokio::test]
    async fn test_block_keeps_earlier_records_and_cursor() {
        let fetch = Arc::new(
            ScriptedFetch::default()
                .page("p1", "next=p2;A|B|C")
                .failing("p2", "blocked"),
        );
        let store = Arc::new(MemoryStateStore::new());
        let mut state = RetrievalState::new("p1");

        let outcome = controller(fetch, store.clone(), options(10))
            .run(&mut state)
            .await;

        assert_eq!(outcome.reason, StopReason::Blocked);
        assert_eq!(outcome.total_records, 3);
        let saved = store.snapshot().unwrap();
        assert_eq!(saved.len(), 3);
        assert_eq!(saved.next_page_url(), Some("p2"));
        assert_eq!(saved.last_stop(), Some(StopReason::Blocked));
    }

    #[tokio::test]
    async fn test_max_records_truncates_page() {
        let fetch = Arc::new(ScriptedFetch::default().page("p1", "next=p2;A|B|C|D|E"));
        let store = Arc::new(MemoryStateStore::new());
        let mut state = RetrievalState::new("p1");

        let outcome = controller(fetch.clone(), store, options(3))
            .run(&mut state)
            .await;

        assert_eq!(outcome.reason, StopReason::MaxReached);
        assert_eq!(outcome.total_records, 3);
        assert_eq!(fetch.calls().len(), 1);
    }

    #[tokio::test]
    async fn test_failed_page_without_successor_stops_with_error() {
        let fetch = Arc::new(
            ScriptedFetch::default()
                .page("p1", "next=p2;A")
                .failing("p2", "exhausted"),
        );
        let store = Arc::new(MemoryStateStore::new());
        let mut state = RetrievalState::new("p1");

        let outcome = controller(fetch, store, options(10)).run(&mut state).await;

        assert_eq!(outcome.reason, StopReason::Error);
        assert_eq!(outcome.total_records, 1);
        assert_eq!(state.counters().pages_failed, 1);
    }

    #[tokio::test]
    async fn test_failed_page_skips_to_successor() {
        let fetch = Arc::new(
            ScriptedFetch::default()
                .failing("p1", "exhausted")
                .page("p1+", "next=;A|B"),
        );
        let store = Arc::new(MemoryStateStore::new());
        let mut state = RetrievalState::new("p1");

        let controller = PaginationController::new(
            fetch.clone(),
            Arc::new(LineExtractor { successors: true }),
            store,
            options(10),
        );
        let outcome = controller.run(&mut state).await;

        assert_eq!(outcome.reason, StopReason::Exhausted);
        assert_eq!(outcome.total_records, 2);
        assert_eq!(fetch.calls(), vec!["p1", "p1+"]);
    }

    #[tokio::test]
    async fn test_page_budget_counts_attempts() {
        let fetch = Arc::new(
            ScriptedFetch::default()
                .page("p1", "next=p2;A")
                .page("p2", "next=p3;B")
                .page("p3", "next=p4;C"),
        );
        let store = Arc::new(MemoryStateStore::new());
        let mut state = RetrievalState::new("p1");

        let outcome = controller(
            fetch.clone(),
            store,
            CrawlOptions {
                max_pages: 2,
                ..options(10)
            },
        )
        .run(&mut state)
        .await;

        assert_eq!(outcome.reason, StopReason::Exhausted);
        assert_eq!(fetch.calls().len(), 2);
        assert_eq!(state.next_page_url(), Some("p3"));
    }

    #[tokio::test]
    async fn test_periodic_persistence() {
        let fetch = Arc::new(
            ScriptedFetch::default()
                .page("p1", "next=p2;A")
                .page("p2", "next=p3;B")
                .page("p3", "next=p4;C")
                .page("p4", "next=;D"),
        );
        let store = Arc::new(MemoryStateStore::new());
        let mut state = RetrievalState::new("p1");

        controller(fetch, store.clone(), options(10))
            .run(&mut state)
            .await;

        // After pages 2 and 4, plus the final save
        assert_eq!(store.save_count(), 3);
    }

    #[tokio::test]
    async fn test_zero_persist_cadence_saves_every_page() {
        let fetch = Arc::new(
            ScriptedFetch::default()
                .page("p1", "next=p2;A")
                .page("p2", "next=;B"),
        );
        let store = Arc::new(MemoryStateStore::new());
        let mut state = RetrievalState::new("p1");

        let outcome = controller(
            fetch,
            store.clone(),
            CrawlOptions {
                persist_every_pages: 0,
                ..options(10)
            },
        )
        .run(&mut state)
        .await;

        assert_eq!(outcome.reason, StopReason::Exhausted);
        assert_eq!(outcome.total_records, 2);
        // One save per page, plus the final save
        assert_eq!(store.save_count(), 3);
    }

    #[tokio::test]
    async fn test_persistence_failure_is_reported() {
        let fetch = Arc::new(ScriptedFetch::default().page("p1", "next=;A"));
        let store = Arc::new(MemoryStateStore::new());
        store.fail_saves(true);
        let mut state = RetrievalState::new("p1");

        let outcome = controller(fetch, store, options(10)).run(&mut state).await;

        assert_eq!(outcome.reason, StopReason::Exhausted);
        assert_eq!(outcome.total_records, 1);
        assert!(!outcome.persisted);
    }

    #[tokio::test]
    async fn test_triggered_shutdown_stops_before_fetching() {
        let fetch = Arc::new(ScriptedFetch::default().page("p1", "next=;A"));
        let store = Arc::new(MemoryStateStore::new());
        let (shutdown, signal) = Shutdown::new();
        shutdown.trigger();
        let mut state = RetrievalState::new("p1");

        let outcome = controller(fetch.clone(), store.clone(), options(10))
            .with_shutdown(signal)
            .run(&mut state)
            .await;

        assert_eq!(outcome.reason, StopReason::Interrupted);
        assert!(fetch.calls().is_empty());
        assert_eq!(store.snapshot().unwrap().next_page_url(), Some("p1"));
    }

    #[tokio::test]
    async fn test_shutdown_during_slow_fetch_keeps_cursor_on_that_page() {
        let fetch = Arc::new(
            ScriptedFetch::default()
                .page("p1", "next=p2;A|B")
                .page("p2", "next=p3;C")
                .stalling("p2"),
        );
        let store = Arc::new(MemoryStateStore::new());
        let (shutdown, signal) = Shutdown::new();
        let mut state = RetrievalState::new("p1");

        tokio::spawn(async move {
            tokio::time::sleep(std::time::Duration::from_millis(100)).await;
            shutdown.trigger();
        });

        let started = std::time::Instant::now();
        let outcome = controller(fetch.clone(), store.clone(), options(10))
            .with_shutdown(signal)
            .run(&mut state)
            .await;

        assert!(started.elapsed() < std::time::Duration::from_secs(5));
        assert_eq!(outcome.reason, StopReason::Interrupted);
        assert_eq!(outcome.total_records, 2);
        assert_eq!(fetch.calls(), vec!["p1", "p2"]);
        assert!(outcome.persisted);

        let saved = store.snapshot().unwrap();
        assert_eq!(saved.len(), 2);
        assert_eq!(saved.next_page_url(), Some("p2"));
        assert_eq!(saved.last_stop(), Some(StopReason::Interrupted));
    }

    #[tokio::test]
    async fn test_resume_at_limit_stops_immediately() {
        let fetch = Arc::new(ScriptedFetch::default());
        let store = Arc::new(MemoryStateStore::new());
        let mut state = RetrievalState::new("p1");
        state.insert(Record::from_candidate(CandidateRecord {
            title: "A".to_string(),
            ..Default::default()
        })
        .unwrap());

        let outcome = controller(fetch.clone(), store, options(1))
            .run(&mut state)
            .await;

        assert_eq!(outcome.reason, StopReason::MaxReached);
        assert_eq!(outcome.records_added, 0);
        assert!(fetch.calls().is_empty());
    }

    #[test]
    fn test_prepare_state_resumes_snapshot() {
        let mut saved = RetrievalState::new("p1");
        saved.set_next_page_url(Some("p7".to_string()));
        let store = MemoryStateStore::with_state(saved);

        let state = prepare_state(&store, "p1", true).unwrap();
        assert_eq!(state.next_page_url(), Some("p7"));

        let fresh = prepare_state(&store, "p1", false).unwrap();
        assert_eq!(fresh.next_page_url(), Some("p1"));
    }

    #[test]
    fn test_prepare_state_without_snapshot_is_fresh() {
        let store = MemoryStateStore::new();
        let state = prepare_state(&store, "p1", true).unwrap();
        assert!(state.is_empty());
        assert_eq!(state.next_page_url(), Some("p1"));
    }

    #[test]
    fn test_stop_reason_serializes_snake_case() {
        assert_eq!(
            serde_json::to_string(&StopReason::MaxReached).unwrap(),
            "\"max_reached\""
        );
    }
}
