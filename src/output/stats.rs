//! Statistics over a retrieval state
//!
//! This module provides functionality for summarizing a collection and the
//! download log, and for displaying the summary.

use crate::crawler::StopReason;
use crate::state::{Counters, Disposition, RetrievalState};
use crate::storage::{DownloadLog, StorageResult};
use chrono::{DateTime, Utc};
use std::collections::BTreeMap;

/// Collection statistics summary
#[derive(Debug, Clone, PartialEq)]
pub struct CollectionStatistics {
    /// Number of distinct records
    pub total_records: usize,

    /// Records whose artifact is on disk
    pub with_pdf: usize,

    /// Records with an artifact URL
    pub with_pdf_url: usize,

    pub with_abstract: usize,
    pub with_doi: usize,

    /// Records per disposition in the state
    pub dispositions: BTreeMap<Disposition, usize>,

    /// Entries per status in the download log, when one was consulted
    pub download_log: Option<BTreeMap<Disposition, u64>>,

    pub counters: Counters,
    pub query_url: Option<String>,
    pub next_page_url: Option<String>,
    pub last_stop: Option<StopReason>,
    pub saved_at: Option<DateTime<Utc>>,
}

impl CollectionStatistics {
    /// Share of records with an artifact URL that were downloaded, in percent
    pub fn pdf_success_rate(&self) -> f64 {
        if self.with_pdf_url == 0 {
            0.0
        } else {
            self.with_pdf as f64 / self.with_pdf_url as f64 * 100.0
        }
    }
}

/// Computes statistics for a state
///
/// # Arguments
///
/// * `state` - The retrieval state
/// * `log` - Optional download log to include per-status counts from
///
/// # Returns
///
/// * `Ok(CollectionStatistics)` - The summary
/// * `Err(StorageError)` - The download log could not be queried
pub fn collect_statistics(
    state: &RetrievalState,
    log: Option<&dyn DownloadLog>,
) -> StorageResult<CollectionStatistics> {
    let records = state.records();

    let download_log = match log {
        Some(log) => Some(log.count_by_status()?),
        None => None,
    };

    Ok(CollectionStatistics {
        total_records: records.len(),
        with_pdf: records.iter().filter(|r| r.pdf_downloaded).count(),
        with_pdf_url: records.iter().filter(|r| r.artifact_url().is_some()).count(),
        with_abstract: records.iter().filter(|r| !r.abstract_text.is_empty()).count(),
        with_doi: records.iter().filter(|r| r.doi.is_some()).count(),
        dispositions: state.disposition_counts(),
        download_log,
        counters: state.counters(),
        query_url: state.query().map(|q| q.url.clone()),
        next_page_url: state.next_page_url().map(str::to_string),
        last_stop: state.last_stop(),
        saved_at: state.saved_at(),
    })
}

/// Prints statistics to stdout in a formatted manner
///
/// # Arguments
///
/// * `stats` - The statistics to display
pub fn print_statistics(stats: &CollectionStatistics) {
    println!("=== Collection Statistics ===\n");

    println!("Query:");
    println!("  Seed URL: {}", stats.query_url.as_deref().unwrap_or("-"));
    println!(
        "  Next page: {}",
        stats.next_page_url.as_deref().unwrap_or("none (listing exhausted)")
    );
    println!(
        "  Last stop: {}",
        stats.last_stop.map(|r| r.as_str()).unwrap_or("-")
    );
    if let Some(saved_at) = stats.saved_at {
        println!("  Saved at: {}", saved_at.to_rfc3339());
    }
    println!();

    println!("Overview:");
    println!("  Total records: {}", stats.total_records);
    println!("  With abstract: {}", stats.with_abstract);
    println!("  With DOI: {}", stats.with_doi);
    println!("  With PDF URL: {}", stats.with_pdf_url);
    println!("  PDFs downloaded: {}", stats.with_pdf);
    println!(
        "  Pages fetched: {} ({} failed, {} items seen)",
        stats.counters.pages_fetched, stats.counters.pages_failed, stats.counters.items_seen
    );
    println!();

    println!("Dispositions:");
    for disposition in Disposition::all() {
        let count = stats.dispositions.get(&disposition).copied().unwrap_or(0);
        let percentage = if stats.total_records > 0 {
            count as f64 / stats.total_records as f64 * 100.0
        } else {
            0.0
        };
        println!("  {}: {} ({:.1}%)", disposition, count, percentage);
    }
    println!();

    if let Some(log) = &stats.download_log {
        println!("Download Log:");
        if log.is_empty() {
            println!("  (empty)");
        }
        for (status, count) in log {
            println!("  {}: {}", status, count);
        }
        println!();
    }

    println!(
        "PDF Success Rate: {:.1}% ({} / {} records with a PDF URL)",
        stats.pdf_success_rate(),
        stats.with_pdf,
        stats.with_pdf_url
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::{CandidateRecord, Record};
    use crate::storage::{DownloadLogEntry, MemoryDownloadLog};

    fn state() -> RetrievalState {
        let mut state = RetrievalState::new("https://example.com/scholar?q=x");
        for (title, pdf, doi) in [
            ("One", Some("https://x.org/1.pdf"), Some("10.1000/1")),
            ("Two", Some("https://x.org/2.pdf"), None),
            ("Three", None, None),
        ] {
            state.insert(
                Record::from_candidate(CandidateRecord {
                    title: title.to_string(),
                    abstract_text: format!("About {}", title),
                    pdf_url: pdf.map(str::to_string),
                    doi: doi.map(str::to_string),
                    ..Default::default()
                })
                .unwrap(),
            );
        }
        state
    }

    #[test]
    fn test_collect_statistics() {
        let mut state = state();
        let first = state.records()[0].id.clone();
        state.get_mut(&first).unwrap().pdf_downloaded = true;
        state.set_disposition(&first, Disposition::Downloaded);

        let stats = collect_statistics(&state, None).unwrap();
        assert_eq!(stats.total_records, 3);
        assert_eq!(stats.with_pdf, 1);
        assert_eq!(stats.with_pdf_url, 2);
        assert_eq!(stats.with_abstract, 3);
        assert_eq!(stats.with_doi, 1);
        assert_eq!(stats.dispositions.get(&Disposition::Pending), Some(&2));
        assert!((stats.pdf_success_rate() - 50.0).abs() < f64::EPSILON);
        assert!(stats.download_log.is_none());
    }

    #[test]
    fn test_statistics_include_download_log() {
        let mut log = MemoryDownloadLog::new();
        log.record(&DownloadLogEntry {
            identifier: "abc".to_string(),
            status: Disposition::Failed,
            timestamp: Utc::now(),
            path: None,
            reason: Some("HTTP 404".to_string()),
            url: None,
        })
        .unwrap();

        let stats = collect_statistics(&state(), Some(&log)).unwrap();
        assert_eq!(
            stats.download_log.unwrap().get(&Disposition::Failed),
            Some(&1)
        );
    }

    #[test]
    fn test_empty_state_rate_is_zero() {
        let stats = collect_statistics(&RetrievalState::default(), None).unwrap();
        assert_eq!(stats.pdf_success_rate(), 0.0);
    }
}
