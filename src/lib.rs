//! Scholar-Ripple: a resilient bibliographic retrieval engine
//!
//! This crate crawls a paginated, rate-limited scholarly search listing,
//! extracts bibliographic records into a resumable state snapshot, and
//! downloads and verifies the PDF artifacts those records point to.

pub mod config;
pub mod crawler;
pub mod download;
pub mod output;
pub mod state;
pub mod storage;

use thiserror::Error;

/// Main error type for Scholar-Ripple operations
#[derive(Debug, Error)]
pub enum RippleError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("Storage error: {0}")]
    Storage(#[from] storage::StorageError),

    #[error("URL parse error: {0}")]
    UrlParse(#[from] ::url::ParseError),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Configuration-specific errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Invalid URL in config: {0}")]
    InvalidUrl(String),
}

/// Failures raised by the rate-limited transport
///
/// `Blocked` is the only variant that is terminal for a crawl; every other
/// variant is local to the unit of work that triggered it.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("Blocked by challenge page at {url}: {reason}")]
    Blocked { url: String, reason: String },

    #[error("Gave up on {url} after {attempts} attempts: {last_error}")]
    Exhausted {
        url: String,
        attempts: u32,
        last_error: String,
    },

    #[error("HTTP {status} for {url}")]
    Status { url: String, status: u16 },

    #[error("Response from {url} exceeds {limit} bytes")]
    TooLarge { url: String, limit: u64 },

    #[error("Failed to build HTTP client: {0}")]
    Build(String),
}

impl TransportError {
    /// Returns true if the source refused service with a challenge page
    pub fn is_blocked(&self) -> bool {
        matches!(self, Self::Blocked { .. })
    }
}

/// Record validation errors
#[derive(Debug, Error, PartialEq, Eq)]
pub enum RecordError {
    #[error("Record title is empty")]
    EmptyTitle,

    #[error("Implausible publication year: {0}")]
    ImplausibleYear(i32),
}

/// Result type alias for Scholar-Ripple operations
pub type Result<T> = std::result::Result<T, RippleError>;

/// Result type alias for transport operations
pub type TransportResult<T> = std::result::Result<T, TransportError>;

// Re-export commonly used types
pub use config::Config;
pub use crawler::{CrawlOutcome, PaginationController, RateLimitedTransport, StopReason};
pub use download::{AcquireTotals, ArtifactAcquirer, ArtifactVerifier};
pub use state::{Disposition, Record, RetrievalState};
