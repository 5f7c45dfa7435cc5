//! Output module for exports and summaries
//!
//! This module handles:
//! - Exporting records as JSON and CSV
//! - Computing and printing collection statistics

mod export;
pub mod stats;

pub use export::{write_csv, write_json, ExportFormat};
pub use stats::{collect_statistics, print_statistics, CollectionStatistics};

use crate::state::RetrievalState;
use std::path::Path;

/// Writes the requested export formats
///
/// # Arguments
///
/// * `state` - Records to export
/// * `format` - Which files to write
/// * `json_path` / `csv_path` - Destinations
///
/// # Returns
///
/// * `Ok(usize)` - Number of records exported
/// * `Err(RippleError)` - A file could not be written
pub fn export(
    state: &RetrievalState,
    format: ExportFormat,
    json_path: &Path,
    csv_path: &Path,
) -> crate::Result<usize> {
    if format.includes_json() {
        write_json(state, json_path)?;
    }
    if format.includes_csv() {
        write_csv(state, csv_path)?;
    }
    Ok(state.len())
}
