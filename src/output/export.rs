//! Metadata export
//!
//! Pure transforms from the retrieval state to JSON and CSV files.

use crate::state::{QueryInfo, Record, RetrievalState};
use crate::storage::atomic_write;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::path::Path;

/// Output format for `export`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportFormat {
    Json,
    Csv,
    Both,
}

impl ExportFormat {
    pub fn includes_json(&self) -> bool {
        matches!(self, Self::Json | Self::Both)
    }

    pub fn includes_csv(&self) -> bool {
        matches!(self, Self::Csv | Self::Both)
    }
}

#[derive(Serialize)]
struct JsonExport<'a> {
    papers: &'a [Record],
    query: Option<&'a QueryInfo>,
    total_papers: usize,
    saved_at: DateTime<Utc>,
}

/// One CSV row; list fields are flattened
#[derive(Serialize)]
struct CsvRow<'a> {
    id: &'a str,
    title: &'a str,
    authors: String,
    year: Option<u16>,
    venue: &'a str,
    #[serde(rename = "abstract")]
    abstract_text: &'a str,
    citations: u32,
    url: &'a str,
    pdf_url: Option<&'a str>,
    doi: Option<&'a str>,
    pdf_downloaded: bool,
    pdf_path: Option<String>,
    extracted_at: String,
}

impl<'a> From<&'a Record> for CsvRow<'a> {
    fn from(record: &'a Record) -> Self {
        Self {
            id: &record.id,
            title: &record.title,
            authors: record.authors.join("; "),
            year: record.year,
            venue: &record.venue,
            abstract_text: &record.abstract_text,
            citations: record.citations,
            url: &record.url,
            pdf_url: record.pdf_url.as_deref(),
            doi: record.doi.as_deref(),
            pdf_downloaded: record.pdf_downloaded,
            pdf_path: record
                .pdf_path
                .as_ref()
                .map(|p| p.to_string_lossy().into_owned()),
            extracted_at: record.extracted_at.to_rfc3339(),
        }
    }
}

/// Writes all records as `{papers, query, total_papers, saved_at}`
///
/// # Returns
///
/// * `Ok(usize)` - Number of records written
/// * `Err(RippleError)` - Serialization or write failure
pub fn write_json(state: &RetrievalState, path: &Path) -> crate::Result<usize> {
    let export = JsonExport {
        papers: state.records(),
        query: state.query(),
        total_papers: state.len(),
        saved_at: Utc::now(),
    };

    let bytes = serde_json::to_vec_pretty(&export)?;
    atomic_write(path, &bytes)?;
    tracing::info!("Saved {} records to {}", state.len(), path.display());
    Ok(state.len())
}

/// Writes one CSV row per record, authors joined by `"; "`
///
/// # Returns
///
/// * `Ok(usize)` - Number of rows written
/// * `Err(RippleError)` - Serialization or write failure
pub fn write_csv(state: &RetrievalState, path: &Path) -> crate::Result<usize> {
    let mut writer = csv::WriterBuilder::new()
        .has_headers(true)
        .from_writer(Vec::new());

    for record in state.records() {
        writer.serialize(CsvRow::from(record))?;
    }

    let bytes = writer
        .into_inner()
        .map_err(|e| crate::RippleError::Io(e.into_error()))?;
    atomic_write(path, &bytes)?;
    tracing::info!("Saved {} records to {}", state.len(), path.display());
    Ok(state.len())
}
