//! Artifact verification

use std::path::Path;

/// Leading signature of a PDF document
pub const PDF_MAGIC: &[u8] = b"%PDF-";

/// Default minimum size of a plausible artifact
pub const DEFAULT_MIN_BYTES: usize = 1024;

/// Checks that bytes are a well-formed instance of the expected format
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ArtifactVerifier {
    min_bytes: usize,
}

impl Default for ArtifactVerifier {
    fn default() -> Self {
        Self::new(DEFAULT_MIN_BYTES)
    }
}

impl ArtifactVerifier {
    pub fn new(min_bytes: usize) -> Self {
        Self {
            min_bytes: min_bytes.max(PDF_MAGIC.len()),
        }
    }

    pub fn min_bytes(&self) -> usize {
        self.min_bytes
    }

    /// Returns true iff `bytes` start with the PDF signature and are at
    /// least `min_bytes` long
    pub fn verify(&self, bytes: &[u8]) -> bool {
        bytes.len() >= self.min_bytes && bytes.starts_with(PDF_MAGIC)
    }

    /// Reads `path` and verifies its content; unreadable files fail
    pub fn verify_file(&self, path: &Path) -> bool {
        match std::fs::read(path) {
            Ok(bytes) => self.verify(&bytes),
            Err(e) => {
                tracing::debug!("Cannot verify {}: {}", path.display(), e);
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pdf_bytes(len: usize) -> Vec<u8> {
        let mut bytes = PDF_MAGIC.to_vec();
        bytes.resize(len, b'x');
        bytes
    }

    #[test]
    fn test_valid_pdf() {
        assert!(ArtifactVerifier::default().verify(&pdf_bytes(2048)));
    }

    #[test]
    fn test_empty_is_invalid() {
        assert!(!ArtifactVerifier::default().verify(b""));
    }

    #[test]
    fn test_wrong_signature_is_invalid() {
        let mut bytes = b"<html>".to_vec();
        bytes.resize(4096, b'x');
        assert!(!ArtifactVerifier::default().verify(&bytes));
    }

    #[test]
    fn test_too_small_is_invalid() {
        assert!(!ArtifactVerifier::default().verify(&pdf_bytes(100)));
        assert!(ArtifactVerifier::new(100).verify(&pdf_bytes(100)));
    }

    #[test]
    fn test_min_bytes_never_below_signature() {
        let verifier = ArtifactVerifier::new(0);
        assert!(!verifier.verify(b"%PD"));
        assert!(verifier.verify(b"%PDF-"));
    }

    #[test]
    fn test_verify_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("a.pdf");
        std::fs::write(&path, pdf_bytes(2048)).unwrap();

        let verifier = ArtifactVerifier::default();
        assert!(verifier.verify_file(&path));
        assert!(!verifier.verify_file(&dir.path().join("missing.pdf")));
    }
}
