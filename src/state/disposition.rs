/// Artifact disposition definitions
///
/// This module defines the outcome classification of one artifact
/// acquisition attempt.
use serde::{Deserialize, Serialize};
use std::fmt;

/// Outcome of acquiring the artifact behind one record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Disposition {
    /// Record is known but its artifact has not been attempted
    Pending,

    /// Artifact was fetched, verified and written to disk
    Downloaded,

    /// Record carries no artifact URL
    SkippedNoUrl,

    /// Fetched bytes were not a valid PDF
    InvalidFormat,

    /// Transport failed or the source blocked the request
    Failed,
}

impl Disposition {
    /// Returns true once an attempt has settled the record for this run
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Pending)
    }

    /// Returns true if the artifact is on disk
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Downloaded)
    }

    /// Returns true if a later run should try the artifact again
    pub fn needs_acquisition(&self) -> bool {
        !self.is_success()
    }

    /// Converts the disposition to its stored string form
    ///
    /// Used by the download log table and the snapshot.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Downloaded => "downloaded",
            Self::SkippedNoUrl => "skipped_no_url",
            Self::InvalidFormat => "invalid_format",
            Self::Failed => "failed",
        }
    }

    /// Parses a disposition from its stored string form
    pub fn from_db_string(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(Self::Pending),
            "downloaded" => Some(Self::Downloaded),
            "skipped_no_url" => Some(Self::SkippedNoUrl),
            "invalid_format" => Some(Self::InvalidFormat),
            "failed" => Some(Self::Failed),
            _ => None,
        }
    }

    /// Returns all dispositions
    pub fn all() -> [Self; 5] {
        [
            Self::Pending,
            Self::Downloaded,
            Self::SkippedNoUrl,
            Self::InvalidFormat,
            Self::Failed,
        ]
    }
}

impl fmt::Display for Disposition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
