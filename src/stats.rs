//! Run statistics
//!
//! [`Statistics`] is cheap to clone and shared by the paginator, the workers and the
//! HTTP collaborators. Scalar counters are atomics; maps sit behind their own locks,
//! held only for a single insert.

use crate::types::FetchReceipt;
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

/// Categories of problems counted during a run
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum IssueKind {
    /// Feed entry without a usable SHA256
    MissingHash,
    /// Feed page request failed after all retries
    FeedRequestFailed,
    /// Feed page body could not be decoded
    FeedDecodeFailed,
    /// Link resolution answered "not found"
    LinkNotFound,
    /// Link resolution failed after all retries
    LinkRequestFailed,
    /// Artifact URL answered "not found"
    ArtifactNotFound,
    /// Artifact transfer failed after all retries
    TransferFailed,
    /// A partially written file could not be removed
    PartialCleanupFailed,
    /// Appending to the processed log failed
    ProcessedLogWriteFailed,
    /// A worker task ended abnormally
    WorkerAborted,
}

impl std::fmt::Display for IssueKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            IssueKind::MissingHash => "Missing SHA256 in feed",
            IssueKind::FeedRequestFailed => "API request failed (hash feed)",
            IssueKind::FeedDecodeFailed => "JSON decode error (hash feed)",
            IssueKind::LinkNotFound => "Download link not found",
            IssueKind::LinkRequestFailed => "API request failed (download link)",
            IssueKind::ArtifactNotFound => "Artifact not found",
            IssueKind::TransferFailed => "Download failed after retries",
            IssueKind::PartialCleanupFailed => "Could not remove partial file",
            IssueKind::ProcessedLogWriteFailed => "Could not append to processed log",
            IssueKind::WorkerAborted => "Worker task aborted",
        };
        f.write_str(s)
    }
}

/// One completed transfer
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct FileTransfer {
    /// Display name of the artifact
    pub name: String,
    /// Bytes written
    pub bytes: u64,
    /// Transfer time
    #[serde(with = "secs_f64")]
    pub elapsed: Duration,
}

impl FileTransfer {
    /// Bytes per second, when measurable
    pub fn rate(&self) -> Option<f64> {
        let secs = self.elapsed.as_secs_f64();
        (secs > 0.0).then(|| self.bytes as f64 / secs)
    }
}

#[derive(Default)]
struct StatsInner {
    pages_fetched: AtomicU64,
    hashes_seen: AtomicU64,
    malformed: AtomicU64,
    skipped_processed: AtomicU64,
    page_duplicates: AtomicU64,
    already_present: AtomicU64,
    downloaded: AtomicU64,
    bytes_downloaded: AtomicU64,
    transfers: Mutex<Vec<FileTransfer>>,
    status_codes: Mutex<BTreeMap<u16, u64>>,
    issues: Mutex<BTreeMap<IssueKind, u64>>,
}

/// Thread-safe statistics shared across the whole run
#[derive(Clone, Default)]
pub struct Statistics {
    inner: Arc<StatsInner>,
}

impl Statistics {
    /// Create an empty statistics collector
    pub fn new() -> Self {
        Self::default()
    }

    /// A feed page was received
    pub fn record_page(&self, records: usize) {
        self.inner.pages_fetched.fetch_add(1, Ordering::Relaxed);
        self.inner
            .hashes_seen
            .fetch_add(records as u64, Ordering::Relaxed);
    }

    /// A feed entry had no usable identifier
    pub fn record_malformed(&self) {
        self.inner.malformed.fetch_add(1, Ordering::Relaxed);
        self.record_issue(IssueKind::MissingHash);
    }

    /// A feed entry was already processed (loaded from the log or submitted earlier)
    pub fn record_skipped_processed(&self) {
        self.inner.skipped_processed.fetch_add(1, Ordering::Relaxed);
    }

    /// A feed entry repeated an earlier entry of the same page
    pub fn record_page_duplicate(&self) {
        self.inner.page_duplicates.fetch_add(1, Ordering::Relaxed);
    }

    /// The destination already existed locally
    pub fn record_already_present(&self) {
        self.inner.already_present.fetch_add(1, Ordering::Relaxed);
    }

    /// A transfer completed
    pub fn record_download(&self, name: &str, receipt: FetchReceipt) {
        self.inner.downloaded.fetch_add(1, Ordering::Relaxed);
        self.inner
            .bytes_downloaded
            .fetch_add(receipt.bytes, Ordering::Relaxed);
        lock(&self.inner.transfers).push(FileTransfer {
            name: name.to_string(),
            bytes: receipt.bytes,
            elapsed: receipt.elapsed,
        });
    }

    /// An HTTP response carried this status
    pub fn record_status(&self, status: u16) {
        *lock(&self.inner.status_codes).entry(status).or_insert(0) += 1;
    }

    /// A problem of this kind occurred
    pub fn record_issue(&self, kind: IssueKind) {
        *lock(&self.inner.issues).entry(kind).or_insert(0) += 1;
    }

    /// Copy everything collected so far
    pub fn snapshot(&self) -> StatisticsSnapshot {
        let inner = &self.inner;
        StatisticsSnapshot {
            pages_fetched: inner.pages_fetched.load(Ordering::Relaxed),
            hashes_seen: inner.hashes_seen.load(Ordering::Relaxed),
            malformed: inner.malformed.load(Ordering::Relaxed),
            skipped_processed: inner.skipped_processed.load(Ordering::Relaxed),
            page_duplicates: inner.page_duplicates.load(Ordering::Relaxed),
            already_present: inner.already_present.load(Ordering::Relaxed),
            downloaded: inner.downloaded.load(Ordering::Relaxed),
            bytes_downloaded: inner.bytes_downloaded.load(Ordering::Relaxed),
            transfers: lock(&inner.transfers).clone(),
            status_codes: lock(&inner.status_codes).clone(),
            issues: lock(&inner.issues).clone(),
        }
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Read-only copy of [`Statistics`], consumed by the report
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct StatisticsSnapshot {
    /// Feed pages received
    pub pages_fetched: u64,
    /// Raw number of feed entries seen
    pub hashes_seen: u64,
    /// Entries without a usable identifier
    pub malformed: u64,
    /// Entries skipped because they were already processed
    pub skipped_processed: u64,
    /// Entries skipped as repeats within one page
    pub page_duplicates: u64,
    /// Admitted hashes whose file already existed
    pub already_present: u64,
    /// Fresh transfers completed
    pub downloaded: u64,
    /// Total bytes written by fresh transfers
    pub bytes_downloaded: u64,
    /// Per-file transfer details, in completion order
    pub transfers: Vec<FileTransfer>,
    /// Count per HTTP status code
    pub status_codes: BTreeMap<u16, u64>,
    /// Count per issue kind
    pub issues: BTreeMap<IssueKind, u64>,
}

impl StatisticsSnapshot {
    /// Aggregate rate over transfers with a measurable duration (Σbytes / Σtime)
    pub fn aggregate_rate(&self) -> Option<f64> {
        let (bytes, secs) = self
            .transfers
            .iter()
            .filter(|t| t.bytes > 0 && !t.elapsed.is_zero())
            .fold((0u64, 0f64), |(bytes, secs), t| {
                (bytes + t.bytes, secs + t.elapsed.as_secs_f64())
            });
        (secs > 0.0).then(|| bytes as f64 / secs)
    }
}

mod secs_f64 {
    use serde::Serializer;
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_f64(duration.as_secs_f64())
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;

    fn receipt(bytes: u64, millis: u64) -> FetchReceipt {
        FetchReceipt {
            bytes,
            elapsed: Duration::from_millis(millis),
        }
    }

    #[test]
    fn counters_accumulate() {
        let stats = Statistics::new();
        stats.record_page(3);
        stats.record_page(2);
        stats.record_malformed();
        stats.record_skipped_processed();
        stats.record_page_duplicate();
        stats.record_already_present();
        stats.record_download("a.bin", receipt(100, 10));

        let snap = stats.snapshot();
        assert_eq!(snap.pages_fetched, 2);
        assert_eq!(snap.hashes_seen, 5);
        assert_eq!(snap.malformed, 1);
        assert_eq!(snap.skipped_processed, 1);
        assert_eq!(snap.page_duplicates, 1);
        assert_eq!(snap.already_present, 1);
        assert_eq!(snap.downloaded, 1);
        assert_eq!(snap.bytes_downloaded, 100);
        assert_eq!(snap.issues.get(&IssueKind::MissingHash), Some(&1));
    }

    #[test]
    fn status_codes_and_issues_are_counted_per_key() {
        let stats = Statistics::new();
        stats.record_status(200);
        stats.record_status(200);
        stats.record_status(404);
        stats.record_issue(IssueKind::LinkNotFound);
        stats.record_issue(IssueKind::LinkNotFound);

        let snap = stats.snapshot();
        assert_eq!(snap.status_codes.get(&200), Some(&2));
        assert_eq!(snap.status_codes.get(&404), Some(&1));
        assert_eq!(snap.issues.get(&IssueKind::LinkNotFound), Some(&2));
    }

    #[test]
    fn aggregate_rate_ignores_unmeasurable_transfers() {
        let stats = Statistics::new();
        stats.record_download("a", receipt(1000, 1000));
        stats.record_download("b", receipt(3000, 1000));
        stats.record_download("c", receipt(500, 0));

        let rate = stats.snapshot().aggregate_rate().unwrap();
        assert!((rate - 2000.0).abs() < f64::EPSILON);
    }

    #[test]
    fn aggregate_rate_is_none_without_transfers() {
        assert_eq!(Statistics::new().snapshot().aggregate_rate(), None);
    }

    #[test]
    fn clones_share_state_across_threads() {
        let stats = Statistics::new();
        let handles: Vec<_> = (0..4)
            .map(|_| {
                let stats = stats.clone();
                std::thread::spawn(move || {
                    for _ in 0..250 {
                        stats.record_status(200);
                        stats.record_already_present();
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        let snap = stats.snapshot();
        assert_eq!(snap.status_codes.get(&200), Some(&1000));
        assert_eq!(snap.already_present, 1000);
    }

    #[test]
    fn snapshot_serializes_to_json() {
        let stats = Statistics::new();
        stats.record_issue(IssueKind::TransferFailed);
        stats.record_status(503);
        stats.record_download("x", receipt(10, 500));

        let value = serde_json::to_value(stats.snapshot()).unwrap();
        assert_eq!(value["issues"]["transfer_failed"], 1);
        assert_eq!(value["status_codes"]["503"], 1);
        assert_eq!(value["transfers"][0]["elapsed"], 0.5);
    }
}
