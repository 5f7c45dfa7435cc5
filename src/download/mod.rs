//! Download module for record artifacts
//!
//! This module handles the second phase of a job:
//! - Verifying that fetched bytes are a real PDF
//! - Naming artifacts deterministically from record metadata
//! - Finding open-access copies for records that only carry a DOI
//! - Acquiring artifacts and recording a disposition for each record

mod acquirer;
mod filename;
mod locator;
mod verifier;

pub use acquirer::{AcquireTotals, ArtifactAcquirer};
pub use filename::{artifact_filename, disambiguated_filename, sanitize_filename};
pub use locator::{
    ArtifactLocator, CrossRefLocator, LocatedArtifact, OpenAccessResolver, UnpaywallLocator,
};
pub use verifier::{ArtifactVerifier, DEFAULT_MIN_BYTES, PDF_MAGIC};
