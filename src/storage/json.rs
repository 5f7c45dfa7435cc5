//! JSON snapshot store
//!
//! Snapshots are written to a temporary file next to the target and renamed
//! into place, so a process killed mid-write leaves the previous snapshot intact.

use crate::state::RetrievalState;
use crate::storage::traits::{StateStore, StorageError, StorageResult};
use std::fs;
use std::path::{Path, PathBuf};

/// File-backed [`StateStore`] holding a pretty-printed JSON snapshot
#[derive(Debug, Clone)]
pub struct JsonStateStore {
    path: PathBuf,
}

impl JsonStateStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl StateStore for JsonStateStore {
    fn load(&self) -> StorageResult<Option<RetrievalState>> {
        let bytes = match fs::read(&self.path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!("No snapshot at {}", self.path.display());
                return Ok(None);
            }
            Err(e) => return Err(StorageError::io(&self.path, e)),
        };

        let state: RetrievalState = serde_json::from_slice(&bytes)?;
        tracing::debug!(
            "Loaded snapshot with {} records from {}",
            state.len(),
            self.path.display()
        );
        Ok(Some(state))
    }

    fn save(&self, state: &RetrievalState) -> StorageResult<()> {
        let bytes = serde_json::to_vec_pretty(state)?;
        atomic_write(&self.path, &bytes)?;
        tracing::debug!(
            "Saved snapshot with {} records to {}",
            state.len(),
            self.path.display()
        );
        Ok(())
    }
}

/// Writes `content` to `path` through a temp file and a rename
///
/// Parent directories are created as needed. On failure the temp file is
/// removed and the previous content of `path`, if any, is untouched.
pub fn atomic_write(path: &Path, content: &[u8]) -> StorageResult<()> {
    let parent = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
        _ => PathBuf::from("."),
    };
    fs::create_dir_all(&parent).map_err(|e| StorageError::io(&parent, e))?;

    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "snapshot".to_string());
    let tmp_path = parent.join(format!(".{}.{}.tmp", file_name, std::process::id()));

    fs::write(&tmp_path, content).map_err(|e| StorageError::io(&tmp_path, e))?;

    fs::rename(&tmp_path, path).map_err(|e| {
        let _ = fs::remove_file(&tmp_path);
        StorageError::io(path, e)
    })?;

    Ok(())
}
