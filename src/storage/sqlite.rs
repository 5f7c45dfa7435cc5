//! SQLite download log implementation
//!
//! This module provides a SQLite-based implementation of the DownloadLog trait.

use crate::state::Disposition;
use crate::storage::schema::initialize_schema;
use crate::storage::traits::{DownloadLog, DownloadLogEntry, StorageError, StorageResult};
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// SQLite download log backend
pub struct SqliteDownloadLog {
    conn: Connection,
}

impl SqliteDownloadLog {
    /// Opens or creates the download log at `path`
    ///
    /// # Arguments
    ///
    /// * `path` - Path to the SQLite database file
    ///
    /// # Returns
    ///
    /// * `Ok(SqliteDownloadLog)` - Successfully opened/created database
    /// * `Err(StorageError)` - Failed to open database
    pub fn new(path: &Path) -> StorageResult<Self> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| StorageError::io(parent, e))?;
        }

        let conn = Connection::open(path)?;

        conn.execute_batch(
            "
            PRAGMA journal_mode = WAL;
            PRAGMA synchronous = NORMAL;
            PRAGMA temp_store = MEMORY;
        ",
        )?;

        initialize_schema(&conn)?;

        Ok(Self { conn })
    }

    /// Creates an in-memory log (for tests and dry runs)
    pub fn new_in_memory() -> StorageResult<Self> {
        let conn = Connection::open_in_memory()?;
        initialize_schema(&conn)?;
        Ok(Self { conn })
    }
}

/// Raw `download_log` columns: identifier, status, timestamp, path, reason, url
type RawEntry = (
    String,
    String,
    String,
    Option<String>,
    Option<String>,
    Option<String>,
);

fn entry_from_row(row: &Row<'_>) -> rusqlite::Result<RawEntry> {
    Ok((
        row.get(0)?,
        row.get(1)?,
        row.get(2)?,
        row.get(3)?,
        row.get(4)?,
        row.get(5)?,
    ))
}

fn decode_entry(raw: RawEntry) -> StorageResult<DownloadLogEntry> {
    let (identifier, status, timestamp, path, reason, url) = raw;

    let status = Disposition::from_db_string(&status).ok_or_else(|| {
        StorageError::Corrupt(format!("unknown status '{}' for {}", status, identifier))
    })?;
    let timestamp = timestamp
        .parse::<DateTime<Utc>>()
        .map_err(|e| StorageError::Corrupt(format!("bad timestamp for {}: {}", identifier, e)))?;

    Ok(DownloadLogEntry {
        identifier,
        status,
        timestamp,
        path: path.map(PathBuf::from),
        reason,
        url,
    })
}

impl DownloadLog for SqliteDownloadLog {
    fn record(&mut self, entry: &DownloadLogEntry) -> StorageResult<()> {
        self.conn.execute(
            "INSERT INTO download_log (identifier, status, timestamp, path, reason, url)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)
             ON CONFLICT(identifier) DO UPDATE SET
                status = excluded.status,
                timestamp = excluded.timestamp,
                path = excluded.path,
                reason = excluded.reason,
                url = excluded.url",
            params![
                entry.identifier,
                entry.status.as_str(),
                entry.timestamp.to_rfc3339(),
                entry.path.as_ref().map(|p| p.to_string_lossy().into_owned()),
                entry.reason,
                entry.url,
            ],
        )?;
        Ok(())
    }

    fn get(&self, identifier: &str) -> StorageResult<Option<DownloadLogEntry>> {
        let raw = self
            .conn
            .query_row(
                "SELECT identifier, status, timestamp, path, reason, url
                 FROM download_log WHERE identifier = ?1",
                params![identifier],
                entry_from_row,
            )
            .optional()?;

        raw.map(decode_entry).transpose()
    }

    fn entries(&self) -> StorageResult<Vec<DownloadLogEntry>> {
        let mut stmt = self.conn.prepare(
            "SELECT identifier, status, timestamp, path, reason, url
             FROM download_log ORDER BY identifier",
        )?;

        let rows = stmt.query_map([], entry_from_row)?;
        let mut entries = Vec::new();
        for raw in rows {
            entries.push(decode_entry(raw?)?);
        }
        Ok(entries)
    }

    fn count_by_status(&self) -> StorageResult<BTreeMap<Disposition, u64>> {
        let mut stmt = self
            .conn
            .prepare("SELECT status, COUNT(*) FROM download_log GROUP BY status")?;

        let rows = stmt.query_map([], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?))
        })?;

        let mut counts = BTreeMap::new();
        for row in rows {
            let (status, count) = row?;
            match Disposition::from_db_string(&status) {
                Some(disposition) => {
                    counts.insert(disposition, count as u64);
                }
                None => tracing::warn!("Ignoring unknown download status '{}'", status),
            }
        }
        Ok(counts)
    }
}
