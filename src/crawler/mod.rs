//! Crawler module for paginated listing retrieval
//!
//! This module contains the core retrieval logic, including:
//! - The rate-limited transport with retry and block detection
//! - HTML field extraction and next-page discovery
//! - The pagination controller and its stop reasons
//! - Cooperative shutdown

mod coordinator;
mod fetcher;
mod parser;
mod retry;
mod shutdown;

pub use coordinator::{prepare_state, CrawlOptions, CrawlOutcome, PaginationController, StopReason};
pub use fetcher::{
    build_http_client, BlockDetector, Fetch, KeywordBlockDetector, Pacer, RateLimitedTransport,
};
pub use parser::{build_search_url, ExtractedPage, FieldExtractor, ScholarExtractor};
pub use retry::{RetryDecision, RetryPolicy};
pub use shutdown::{Shutdown, ShutdownSignal};

use crate::config::Config;
use crate::storage::StateStore;
use std::sync::Arc;

/// Runs a complete crawl from configuration
///
/// This is the main entry point for the search phase. It will:
/// 1. Load the snapshot (when resuming) or start fresh at `seed_url`
/// 2. Build the extractor from `config`
/// 3. Page through the listing until a stop condition is met
///
/// # Arguments
///
/// * `config` - The configuration
/// * `transport` - Fetches listing pages; pass the same transport to the
///   download phase so both share one pacing clock
/// * `store` - Where snapshots are read from and written to
/// * `seed_url` - First listing page
/// * `resume` - Continue from the persisted snapshot
/// * `shutdown` - Cancellation signal
///
/// # Returns
///
/// * `Ok((state, outcome))` - The final state and why the crawl stopped
/// * `Err(RippleError)` - The snapshot exists but cannot be read
pub async fn crawl(
    config: &Config,
    transport: Arc<dyn Fetch>,
    store: Arc<dyn StateStore>,
    seed_url: &str,
    resume: bool,
    shutdown: ShutdownSignal,
) -> crate::Result<(crate::state::RetrievalState, CrawlOutcome)> {
    let mut state = prepare_state(store.as_ref(), seed_url, resume)?;

    let extractor = Arc::new(ScholarExtractor::new(config.crawler.page_size));
    let controller = PaginationController::new(
        transport,
        extractor,
        store,
        CrawlOptions::from_config(&config.crawler),
    )
    .with_shutdown(shutdown);

    let outcome = controller.run(&mut state).await;
    Ok((state, outcome))
}
