//! Storage traits and error types
//!
//! This module defines the trait interfaces for the snapshot store and the
//! download log, and the error type they share.

use crate::state::{Disposition, RetrievalState};
use chrono::{DateTime, Utc};
use std::collections::BTreeMap;
use std::path::PathBuf;
use thiserror::Error;

/// Errors that can occur during storage operations
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("IO error on {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("Corrupt entry: {0}")]
    Corrupt(String),
}

impl StorageError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

/// Result type for storage operations
pub type StorageResult<T> = Result<T, StorageError>;

/// Durable home of the resumable snapshot
pub trait StateStore: Send + Sync {
    /// Loads the last persisted snapshot
    ///
    /// # Returns
    ///
    /// * `Ok(None)` - No snapshot exists yet (a fresh run, not an error)
    /// * `Ok(Some(state))` - The persisted state
    /// * `Err(StorageError)` - A snapshot exists but could not be read
    fn load(&self) -> StorageResult<Option<RetrievalState>>;

    /// Replaces the persisted snapshot with `state`
    ///
    /// Implementations must never leave a half-written snapshot behind.
    fn save(&self, state: &RetrievalState) -> StorageResult<()>;
}

/// One artifact attempt as recorded in the download log
#[derive(Debug, Clone, PartialEq)]
pub struct DownloadLogEntry {
    pub identifier: String,
    pub status: Disposition,
    pub timestamp: DateTime<Utc>,
    /// Local file for successful downloads
    pub path: Option<PathBuf>,
    /// Why the attempt did not produce a file
    pub reason: Option<String>,
    pub url: Option<String>,
}

/// Append/update log of artifact attempts, keyed by record identifier
pub trait DownloadLog: Send {
    /// Writes `entry`, replacing any earlier entry for the same identifier
    fn record(&mut self, entry: &DownloadLogEntry) -> StorageResult<()>;

    /// Gets the latest entry for an identifier
    fn get(&self, identifier: &str) -> StorageResult<Option<DownloadLogEntry>>;

    /// Gets all entries ordered by identifier
    fn entries(&self) -> StorageResult<Vec<DownloadLogEntry>>;

    /// Counts entries per status
    fn count_by_status(&self) -> StorageResult<BTreeMap<Disposition, u64>>;
}
