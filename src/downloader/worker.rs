//! Download worker: resolve, fetch and record a single admitted hash.
//!
//! Each admitted hash runs through one [`DownloadWorker::process`] call inside a pool
//! task. The [`AdmissionPermit`] travels with it and is resolved on every exit path.

use std::path::Path;
use std::sync::Arc;

use tracing::{debug, error, info, warn};

use crate::admission::AdmissionPermit;
use crate::config::Config;
use crate::error::Error;
use crate::fetcher::ArtifactFetcher;
use crate::processed::ProcessedSet;
use crate::resolver::LinkResolver;
use crate::retry::{RetryOutcome, with_retry};
use crate::stats::{IssueKind, Statistics};
use crate::types::{DownloadOutcome, FailureStage, FetchReceipt, HashRecord};
use crate::utils::{artifact_path, partial_path, remove_partial_file};

/// A feed record whose identifier has already been validated
#[derive(Clone, Debug)]
pub(crate) struct PendingHash {
    pub(crate) hash: String,
    pub(crate) record: HashRecord,
}

impl PendingHash {
    /// Returns `None` for records without a usable identifier
    pub(crate) fn from_record(record: HashRecord) -> Option<Self> {
        let hash = record.hash()?.to_string();
        Some(Self { hash, record })
    }
}

/// Shared state needed to process one hash
#[derive(Clone)]
pub(crate) struct DownloadWorker {
    pub(crate) config: Arc<Config>,
    pub(crate) processed: Arc<ProcessedSet>,
    pub(crate) stats: Statistics,
    pub(crate) resolver: Arc<dyn LinkResolver>,
    pub(crate) fetcher: Arc<dyn ArtifactFetcher>,
}

impl DownloadWorker {
    /// Resolve, fetch and record `pending`, resolving `permit` exactly once
    pub(crate) async fn process(
        &self,
        pending: PendingHash,
        permit: AdmissionPermit,
    ) -> DownloadOutcome {
        let hash = pending.hash.as_str();
        let name = pending.record.display_name();
        debug!(hash, name = %name, "Processing hash");

        let link = match self.resolve_link(hash).await {
            Ok(link) => link,
            Err(stage) => {
                warn!(hash, name = %name, reason = %stage, "No download link, attempt aborted");
                permit.record_failure();
                return DownloadOutcome::Failed(stage);
            }
        };

        let dest = artifact_path(self.config.download_dir(), hash);
        if tokio::fs::try_exists(&dest).await.unwrap_or(false) {
            info!(hash, path = %dest.display(), "File already exists, skipping download");
            self.stats.record_already_present();
            self.persist(hash).await;
            permit.record_already_present();
            return DownloadOutcome::AlreadyPresent;
        }

        match self.fetch_artifact(hash, &name, &link, &dest).await {
            Ok(receipt) => {
                self.persist(hash).await;
                self.stats.record_download(&name, receipt);
                permit.record_success();
                info!(
                    hash,
                    path = %dest.display(),
                    bytes = receipt.bytes,
                    elapsed_ms = receipt.elapsed.as_millis() as u64,
                    "Downloaded"
                );
                DownloadOutcome::Downloaded(receipt)
            }
            Err(stage) => {
                permit.record_failure();
                DownloadOutcome::Failed(stage)
            }
        }
    }

    async fn resolve_link(&self, hash: &str) -> Result<String, FailureStage> {
        let resolver = &self.resolver;
        let outcome = with_retry(&self.config.retry, move |attempt| {
            debug!(hash, attempt, "Getting download link");
            resolver.resolve(hash)
        })
        .await;

        match outcome {
            RetryOutcome::Success(link) => Ok(link),
            RetryOutcome::NotFound(_) => {
                self.stats.record_issue(IssueKind::LinkNotFound);
                Err(FailureStage::LinkNotFound)
            }
            RetryOutcome::Exhausted { error, attempts } => {
                error!(hash, attempts, error = %error, "Could not get download link");
                self.stats.record_issue(IssueKind::LinkRequestFailed);
                Err(FailureStage::LinkUnavailable)
            }
        }
    }

    async fn fetch_artifact(
        &self,
        hash: &str,
        name: &str,
        link: &str,
        dest: &Path,
    ) -> Result<FetchReceipt, FailureStage> {
        let fetcher = &self.fetcher;
        let stats = &self.stats;
        let max_attempts = self.config.retry.total_attempts();
        let part = &partial_path(dest);

        let outcome = with_retry(&self.config.retry, move |attempt| async move {
            info!(
                hash,
                name,
                path = %dest.display(),
                attempt,
                max_attempts,
                "Starting download"
            );
            let result = match fetcher.fetch_to_file(link, part).await {
                Ok(receipt) => tokio::fs::rename(part, dest)
                    .await
                    .map(|()| receipt)
                    .map_err(Error::from),
                Err(e) => Err(e),
            };
            if let Err(e) = &result {
                warn!(hash, attempt, max_attempts, error = %e, "Download attempt failed");
                if let Err(cleanup) = remove_partial_file(part).await {
                    error!(
                        path = %part.display(),
                        error = %cleanup,
                        "Error removing partial file"
                    );
                    stats.record_issue(IssueKind::PartialCleanupFailed);
                }
            }
            result
        })
        .await;

        match outcome {
            RetryOutcome::Success(receipt) => Ok(receipt),
            RetryOutcome::NotFound(error) => {
                warn!(hash, error = %error, "Artifact not found");
                self.stats.record_issue(IssueKind::ArtifactNotFound);
                Err(FailureStage::ArtifactNotFound)
            }
            RetryOutcome::Exhausted { error, attempts } => {
                error!(
                    hash,
                    name,
                    attempts,
                    error = %error,
                    "FINAL FAILED download"
                );
                self.stats.record_issue(IssueKind::TransferFailed);
                Err(FailureStage::TransferFailed)
            }
        }
    }

    /// Append to the durable log; failures are counted and otherwise ignored
    async fn persist(&self, hash: &str) {
        if let Err(e) = self.processed.persist(hash).await {
            error!(
                hash,
                path = %self.processed.log_path().display(),
                error = %e,
                "Failed to save processed hash"
            );
            self.stats.record_issue(IssueKind::ProcessedLogWriteFailed);
        }
    }
}
