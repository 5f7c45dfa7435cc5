//! State module for tracking retrieval progress
//!
//! This module provides the data model shared by the search and download phases.
//!
//! # Components
//!
//! - `Record`: A validated bibliographic record
//! - `Disposition`: Outcome of acquiring one record's artifact
//! - `RetrievalState`: The resumable collection of records, dispositions and counters

mod disposition;
mod record;
mod retrieval;

// Re-export main types
pub use disposition::Disposition;
pub use record::{record_id, CandidateRecord, Record, PLAUSIBLE_YEARS};
pub use retrieval::{Counters, QueryInfo, RetrievalState, SNAPSHOT_VERSION};
