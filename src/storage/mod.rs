//! Storage module for persisting retrieval data
//!
//! This module handles everything that outlives a single run:
//! - The resumable JSON snapshot of records, dispositions and counters
//! - The SQLite download log of artifact attempts
//! - In-memory stand-ins for both, used by tests

mod json;
mod memory;
mod schema;
mod sqlite;
mod traits;

pub use json::{atomic_write, JsonStateStore};
pub use memory::{MemoryDownloadLog, MemoryStateStore};
pub use sqlite::SqliteDownloadLog;
pub use traits::{DownloadLog, DownloadLogEntry, StateStore, StorageError, StorageResult};

use crate::state::RetrievalState;

/// Stamps and saves `state`, logging instead of failing
///
/// A failed save never aborts the caller; the next checkpoint retries it.
///
/// # Returns
///
/// `true` if the snapshot was written
pub fn persist(store: &dyn StateStore, state: &mut RetrievalState) -> bool {
    state.mark_saved();
    match store.save(state) {
        Ok(()) => true,
        Err(e) => {
            tracing::warn!("Failed to persist state: {}", e);
            false
        }
    }
}
