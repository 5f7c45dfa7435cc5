//! Database schema definitions
//!
//! This module contains the SQL schema for the download log database.

use rusqlite::Connection;

/// SQL schema for the database
pub const SCHEMA_SQL: &str = r#"
-- One row per record identifier; later attempts replace earlier ones
CREATE TABLE IF NOT EXISTS download_log (
    identifier TEXT PRIMARY KEY,
    status TEXT NOT NULL,
    timestamp TEXT NOT NULL,
    path TEXT,
    reason TEXT,
    url TEXT
);

CREATE INDEX IF NOT EXISTS idx_download_log_status ON download_log(status);
"#;

/// Initializes the database schema
///
/// Safe to call on an existing database.
pub fn initialize_schema(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute_batch(SCHEMA_SQL)
}
