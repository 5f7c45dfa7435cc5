//! Artifact acquisition
//!
//! This module downloads the PDF behind each record:
//! - Looking up an open-access copy by DOI when the record has no artifact URL
//! - Skipping records for which no artifact URL can be found
//! - Reusing files that are already present and verify
//! - Keeping records whose names collide from sharing one file
//! - Verifying fetched bytes before anything is written
//! - Recording a disposition per record, in the state and in the download log

use crate::config::DownloadConfig;
use crate::crawler::{Fetch, ShutdownSignal};
use crate::download::filename::{artifact_filename, disambiguated_filename};
use crate::download::locator::OpenAccessResolver;
use crate::download::verifier::ArtifactVerifier;
use crate::state::{Disposition, RetrievalState};
use crate::storage::{atomic_write, persist, DownloadLog, DownloadLogEntry, StateStore};
use chrono::Utc;
use serde::Serialize;
use std::path::PathBuf;
use std::sync::Arc;

/// Running totals of one acquisition pass
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct AcquireTotals {
    pub downloaded: usize,
    pub skipped: usize,
    pub invalid: usize,
    pub failed: usize,

    /// Records that needed acquisition when the pass started
    pub total: usize,

    /// The pass stopped early on shutdown
    pub interrupted: bool,

    /// Whether the final snapshot was written
    pub persisted: bool,
}

impl AcquireTotals {
    fn count(&mut self, disposition: Disposition) {
        match disposition {
            Disposition::Downloaded => self.downloaded += 1,
            Disposition::SkippedNoUrl => self.skipped += 1,
            Disposition::InvalidFormat => self.invalid += 1,
            Disposition::Failed => self.failed += 1,
            Disposition::Pending => {}
        }
    }

    /// Records handled so far
    pub fn processed(&self) -> usize {
        self.downloaded + self.skipped + self.invalid + self.failed
    }
}

/// Downloads and verifies record artifacts
pub struct ArtifactAcquirer {
    transport: Arc<dyn Fetch>,
    verifier: ArtifactVerifier,
    log: Box<dyn DownloadLog>,
    resolver: Option<OpenAccessResolver>,
    papers_dir: PathBuf,
    filename_max_length: usize,
    persist_every: usize,
    shutdown: ShutdownSignal,
}

impl ArtifactAcquirer {
    /// Creates an acquirer
    ///
    /// # Arguments
    ///
    /// * `transport` - Fetches artifact bytes
    /// * `log` - Receives one entry per attempt
    /// * `papers_dir` - Directory artifacts are written to
    /// * `config` - Verification threshold, filename length, persistence cadence
    pub fn new(
        transport: Arc<dyn Fetch>,
        log: Box<dyn DownloadLog>,
        papers_dir: impl Into<PathBuf>,
        config: &DownloadConfig,
    ) -> Self {
        Self {
            transport,
            verifier: ArtifactVerifier::new(config.min_artifact_bytes),
            log,
            resolver: None,
            papers_dir: papers_dir.into(),
            filename_max_length: config.filename_max_length,
            persist_every: config.persist_every.max(1),
            shutdown: ShutdownSignal::never(),
        }
    }

    /// Observes `signal` for cancellation in [`acquire_all`](Self::acquire_all)
    pub fn with_shutdown(mut self, signal: ShutdownSignal) -> Self {
        self.shutdown = signal;
        self
    }

    /// Looks up open-access copies by DOI for records without an artifact URL
    pub fn with_resolver(mut self, resolver: OpenAccessResolver) -> Self {
        self.resolver = Some(resolver);
        self
    }

    pub fn download_log(&self) -> &dyn DownloadLog {
        self.log.as_ref()
    }

    /// Acquires the artifact of one record
    ///
    /// Never fails: every outcome, transport errors included, becomes a
    /// [`Disposition`] stored in `state` and in the download log.
    pub async fn acquire(&mut self, state: &mut RetrievalState, record_id: &str) -> Disposition {
        let (title, listed_url, doi) = match state.get(record_id) {
            Some(record) => (
                record.title.clone(),
                record.artifact_url().map(str::to_string),
                record.doi.clone(),
            ),
            None => {
                tracing::warn!("No record with id {}", record_id);
                return Disposition::Failed;
            }
        };

        let url = match listed_url {
            Some(url) => url,
            None => match self.locate(doi.as_deref()).await {
                Some(url) => {
                    if let Some(record) = state.get_mut(record_id) {
                        record.pdf_url = Some(url.clone());
                    }
                    url
                }
                None => {
                    tracing::debug!("No artifact URL for: {}", title);
                    return self.finish(
                        state,
                        record_id,
                        Disposition::SkippedNoUrl,
                        None,
                        Some("no artifact URL".to_string()),
                        None,
                    );
                }
            },
        };

        let destination = self.destination(state, record_id);

        if self.verifier.verify_file(&destination) {
            tracing::info!("Artifact already present: {}", destination.display());
            return self.finish(
                state,
                record_id,
                Disposition::Downloaded,
                Some(destination),
                None,
                Some(url),
            );
        }

        tracing::info!("Downloading: {}", title);
        let bytes = match self.transport.fetch_artifact(&url).await {
            Ok(bytes) => bytes,
            Err(e) => {
                if e.is_blocked() {
                    tracing::warn!("Artifact host is blocking: {}", e);
                } else {
                    tracing::warn!("Download failed for {}: {}", url, e);
                }
                return self.finish(
                    state,
                    record_id,
                    Disposition::Failed,
                    None,
                    Some(e.to_string()),
                    Some(url),
                );
            }
        };

        if !self.verifier.verify(&bytes) {
            tracing::warn!("Not a valid PDF ({} bytes) from {}", bytes.len(), url);
            if destination.exists() {
                if let Err(e) = std::fs::remove_file(&destination) {
                    tracing::warn!("Failed to remove {}: {}", destination.display(), e);
                }
            }
            let reason = format!("not a valid PDF ({} bytes)", bytes.len());
            return self.finish(
                state,
                record_id,
                Disposition::InvalidFormat,
                None,
                Some(reason),
                Some(url),
            );
        }

        match atomic_write(&destination, &bytes) {
            Ok(()) => {
                tracing::info!("Saved {}", destination.display());
                self.finish(
                    state,
                    record_id,
                    Disposition::Downloaded,
                    Some(destination),
                    None,
                    Some(url),
                )
            }
            Err(e) => {
                tracing::warn!("Failed to write {}: {}", destination.display(), e);
                self.finish(
                    state,
                    record_id,
                    Disposition::Failed,
                    None,
                    Some(e.to_string()),
                    Some(url),
                )
            }
        }
    }

    /// Acquires every record whose artifact is not yet downloaded
    ///
    /// Persists `state` every `persist-every` records and once at the end.
    /// Stops early, after persisting, when shutdown is requested.
    pub async fn acquire_all(
        &mut self,
        state: &mut RetrievalState,
        store: &dyn StateStore,
    ) -> AcquireTotals {
        let ids = state.ids_needing_acquisition();
        let mut totals = AcquireTotals {
            total: ids.len(),
            ..AcquireTotals::default()
        };
        let mut shutdown = self.shutdown.clone();

        tracing::info!("Acquiring artifacts for {} records", ids.len());

        for id in &ids {
            if shutdown.is_triggered() {
                totals.interrupted = true;
                break;
            }

            let disposition = tokio::select! {
                biased;
                _ = shutdown.triggered() => None,
                d = self.acquire(state, id) => Some(d),
            };

            match disposition {
                Some(d) => totals.count(d),
                None => {
                    totals.interrupted = true;
                    break;
                }
            }

            if totals.processed() % self.persist_every == 0 {
                persist(store, state);
            }
        }

        totals.persisted = persist(store, state);

        if totals.interrupted {
            tracing::warn!(
                "Acquisition interrupted after {} of {} records",
                totals.processed(),
                totals.total
            );
        }
        tracing::info!(
            "Acquisition finished: {} downloaded, {} invalid, {} failed, {} skipped",
            totals.downloaded,
            totals.invalid,
            totals.failed,
            totals.skipped
        );

        totals
    }

    async fn locate(&self, doi: Option<&str>) -> Option<String> {
        let resolver = self.resolver.as_ref()?;
        let doi = doi?;
        resolver.resolve(doi).await.map(|found| found.url)
    }

    /// Picks the file a record's artifact is written to
    ///
    /// The plain name is used unless another record already owns that path,
    /// in which case the id-suffixed name is used.
    fn destination(&self, state: &RetrievalState, record_id: &str) -> PathBuf {
        let record = match state.get(record_id) {
            Some(record) => record,
            None => return self.papers_dir.join(record_id),
        };

        let plain = self
            .papers_dir
            .join(artifact_filename(record, self.filename_max_length));
        let taken = state
            .records()
            .iter()
            .any(|other| other.id != record.id && other.pdf_path.as_ref() == Some(&plain));
        if !taken {
            return plain;
        }

        let name = disambiguated_filename(record, self.filename_max_length);
        tracing::debug!(
            "{} belongs to another record, using {}",
            plain.display(),
            name
        );
        self.papers_dir.join(name)
    }

    fn finish(
        &mut self,
        state: &mut RetrievalState,
        record_id: &str,
        disposition: Disposition,
        path: Option<PathBuf>,
        reason: Option<String>,
        url: Option<String>,
    ) -> Disposition {
        if let Some(record) = state.get_mut(record_id) {
            record.pdf_downloaded = disposition.is_success();
            record.pdf_path = path.clone();
        }
        state.set_disposition(record_id, disposition);

        let entry = DownloadLogEntry {
            identifier: record_id.to_string(),
            status: disposition,
            timestamp: Utc::now(),
            path,
            reason,
            url,
        };
        if let Err(e) = self.log.record(&entry) {
            tracing::warn!("Failed to update download log for {}: {}", record_id, e);
        }

        disposition
    }
}
