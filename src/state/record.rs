//! Bibliographic record types
//!
//! A [`CandidateRecord`] is the loose field bag produced by an extractor; a
//! [`Record`] is the validated, fixed-shape value the rest of the crate works
//! with. The only way from one to the other is [`Record::from_candidate`].

use crate::RecordError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::ops::RangeInclusive;
use std::path::PathBuf;

/// Publication years accepted at construction
pub const PLAUSIBLE_YEARS: RangeInclusive<i32> = 1000..=2100;

/// Number of hex characters kept from the title digest
const ID_LENGTH: usize = 12;

/// Unvalidated record fields as produced by a field extractor
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CandidateRecord {
    pub title: String,
    pub authors: Vec<String>,
    pub year: Option<i32>,
    pub venue: String,
    pub abstract_text: String,
    pub citations: u32,
    pub url: String,
    pub pdf_url: Option<String>,
    pub doi: Option<String>,
    pub bibtex: Option<String>,
}

/// One discovered bibliographic item
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
    /// Stable identifier derived from the title
    pub id: String,
    pub title: String,
    pub authors: Vec<String>,
    pub year: Option<u16>,
    pub venue: String,
    #[serde(rename = "abstract")]
    pub abstract_text: String,
    pub citations: u32,
    /// Canonical source URL
    pub url: String,
    pub pdf_url: Option<String>,
    pub doi: Option<String>,
    pub bibtex: Option<String>,
    #[serde(default)]
    pub pdf_downloaded: bool,
    #[serde(default)]
    pub pdf_path: Option<PathBuf>,
    pub extracted_at: DateTime<Utc>,
}

impl Record {
    /// Validates a candidate and builds a record from it
    ///
    /// # Errors
    ///
    /// * `RecordError::EmptyTitle` - the title is blank after whitespace cleanup
    /// * `RecordError::ImplausibleYear` - the year lies outside [`PLAUSIBLE_YEARS`]
    pub fn from_candidate(candidate: CandidateRecord) -> Result<Self, RecordError> {
        let title = collapse_whitespace(&candidate.title);
        if title.is_empty() {
            return Err(RecordError::EmptyTitle);
        }

        let year = match candidate.year {
            Some(year) if PLAUSIBLE_YEARS.contains(&year) => Some(year as u16),
            Some(year) => return Err(RecordError::ImplausibleYear(year)),
            None => None,
        };

        let authors = candidate
            .authors
            .iter()
            .map(|a| collapse_whitespace(a))
            .filter(|a| !a.is_empty())
            .collect();

        Ok(Self {
            id: record_id(&title),
            title,
            authors,
            year,
            venue: candidate.venue.trim().to_string(),
            abstract_text: candidate.abstract_text.trim().to_string(),
            citations: candidate.citations,
            url: candidate.url.trim().to_string(),
            pdf_url: non_empty(candidate.pdf_url),
            doi: non_empty(candidate.doi),
            bibtex: non_empty(candidate.bibtex),
            pdf_downloaded: false,
            pdf_path: None,
            extracted_at: Utc::now(),
        })
    }

    /// Returns the artifact URL if the record has a usable one
    pub fn artifact_url(&self) -> Option<&str> {
        self.pdf_url.as_deref().filter(|u| !u.trim().is_empty())
    }
}

/// Derives the stable identifier for a title
///
/// Re-extracting the same title always yields the same identifier, which is
/// what makes insertion into the state idempotent across pages and runs.
pub fn record_id(title: &str) -> String {
    let digest = Sha256::digest(collapse_whitespace(title).as_bytes());
    let mut id = hex::encode(digest);
    id.truncate(ID_LENGTH);
    id
}

fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn non_empty(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}
