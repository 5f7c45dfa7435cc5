//! In-memory storage backends
//!
//! Used by tests and by dry runs that should leave nothing on disk.

use crate::state::{Disposition, RetrievalState};
use crate::storage::traits::{
    DownloadLog, DownloadLogEntry, StateStore, StorageError, StorageResult,
};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;

/// [`StateStore`] that keeps the latest snapshot in memory
#[derive(Debug, Default)]
pub struct MemoryStateStore {
    snapshot: Mutex<Option<RetrievalState>>,
    saves: AtomicUsize,
    fail_saves: AtomicBool,
}

impl MemoryStateStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a store that already holds `state`
    pub fn with_state(state: RetrievalState) -> Self {
        Self {
            snapshot: Mutex::new(Some(state)),
            ..Self::default()
        }
    }

    /// Number of successful saves so far
    pub fn save_count(&self) -> usize {
        self.saves.load(Ordering::SeqCst)
    }

    /// Makes every subsequent save fail with an IO error
    pub fn fail_saves(&self, fail: bool) {
        self.fail_saves.store(fail, Ordering::SeqCst);
    }

    /// Clone of the last saved snapshot
    pub fn snapshot(&self) -> Option<RetrievalState> {
        self.snapshot.lock().ok().and_then(|guard| guard.clone())
    }
}

impl StateStore for MemoryStateStore {
    fn load(&self) -> StorageResult<Option<RetrievalState>> {
        let guard = self
            .snapshot
            .lock()
            .map_err(|_| StorageError::Corrupt("snapshot lock poisoned".to_string()))?;
        Ok(guard.clone())
    }

    fn save(&self, state: &RetrievalState) -> StorageResult<()> {
        if self.fail_saves.load(Ordering::SeqCst) {
            return Err(StorageError::io(
                "<memory>",
                std::io::Error::new(std::io::ErrorKind::Other, "save disabled"),
            ));
        }

        let mut guard = self
            .snapshot
            .lock()
            .map_err(|_| StorageError::Corrupt("snapshot lock poisoned".to_string()))?;
        *guard = Some(state.clone());
        self.saves.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// [`DownloadLog`] backed by a map
#[derive(Debug, Default)]
pub struct MemoryDownloadLog {
    entries: BTreeMap<String, DownloadLogEntry>,
}

impl MemoryDownloadLog {
    pub fn new() -> Self {
        Self::default()
    }
}

impl DownloadLog for MemoryDownloadLog {
    fn record(&mut self, entry: &DownloadLogEntry) -> StorageResult<()> {
        self.entries.insert(entry.identifier.clone(), entry.clone());
        Ok(())
    }

    fn get(&self, identifier: &str) -> StorageResult<Option<DownloadLogEntry>> {
        Ok(self.entries.get(identifier).cloned())
    }

    fn entries(&self) -> StorageResult<Vec<DownloadLogEntry>> {
        Ok(self.entries.values().cloned().collect())
    }

    fn count_by_status(&self) -> StorageResult<BTreeMap<Disposition, u64>> {
        let mut counts = BTreeMap::new();
        for entry in self.entries.values() {
            *counts.entry(entry.status).or_insert(0) += 1;
        }
        Ok(counts)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_memory_store_roundtrip() {
        let store = MemoryStateStore::new();
        assert!(store.load().unwrap().is_none());

        store.save(&RetrievalState::new("https://example.com/")).unwrap();
        assert_eq!(store.save_count(), 1);
        assert!(store.load().unwrap().is_some());
    }

    #[test]
    fn test_memory_store_failing_saves() {
        let store = MemoryStateStore::new();
        store.fail_saves(true);

        assert!(store.save(&RetrievalState::default()).is_err());
        assert_eq!(store.save_count(), 0);
        assert!(store.snapshot().is_none());
    }
}
