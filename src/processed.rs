//! Processed-hash tracking
//!
//! [`ProcessedSet`] is the union of the durable log read at startup and every hash
//! submitted during this run. It only grows. The durable log is newline-delimited and
//! append-only; it receives a hash once that hash is downloaded or found on disk.

use crate::error::Result;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tokio::io::AsyncWriteExt;

/// In-memory processed set backed by an append-only log file
pub struct ProcessedSet {
    /// Hashes that must not be submitted again
    hashes: Mutex<HashSet<String>>,
    /// Location of the durable log
    log_path: PathBuf,
    /// Serializes appends so lines never interleave
    append_lock: tokio::sync::Mutex<()>,
    /// How many hashes came from the log at startup
    loaded: usize,
}

impl ProcessedSet {
    /// Load the durable log at `log_path`
    ///
    /// A missing file yields an empty set. Any other read error is logged and also
    /// yields an empty set: losing this state only risks redundant downloads.
    pub async fn load(log_path: impl Into<PathBuf>) -> Self {
        let log_path = log_path.into();

        let hashes: HashSet<String> = match tokio::fs::read_to_string(&log_path).await {
            Ok(content) => content
                .lines()
                .map(str::trim)
                .filter(|line| !line.is_empty())
                .map(str::to_string)
                .collect(),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!(path = %log_path.display(), "No processed log yet, starting empty");
                HashSet::new()
            }
            Err(e) => {
                tracing::error!(
                    path = %log_path.display(),
                    error = %e,
                    "Failed to load processed hashes, starting empty"
                );
                HashSet::new()
            }
        };

        let loaded = hashes.len();
        tracing::info!(
            path = %log_path.display(),
            loaded,
            "Loaded processed hashes; these will be skipped"
        );

        Self {
            hashes: Mutex::new(hashes),
            log_path,
            append_lock: tokio::sync::Mutex::new(()),
            loaded,
        }
    }

    /// True if `hash` was loaded or inserted earlier
    pub fn contains(&self, hash: &str) -> bool {
        self.lock().contains(hash)
    }

    /// Mark `hash` as handled for the rest of this run
    ///
    /// Returns `false` if it was already present.
    pub fn insert(&self, hash: &str) -> bool {
        self.lock().insert(hash.to_string())
    }

    /// Append `hash` to the durable log
    ///
    /// A failed append leaves the in-memory set untouched; the caller decides how to
    /// report it.
    pub async fn persist(&self, hash: &str) -> Result<()> {
        let _guard = self.append_lock.lock().await;

        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.log_path)
            .await?;
        file.write_all(format!("{hash}\n").as_bytes()).await?;
        file.flush().await?;
        Ok(())
    }

    /// Number of hashes read from the durable log at startup
    pub fn loaded_count(&self) -> usize {
        self.loaded
    }

    /// Total number of hashes currently considered processed
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    /// True when nothing has been processed
    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Location of the durable log
    pub fn log_path(&self) -> &Path {
        &self.log_path
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashSet<String>> {
        self.hashes
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[tokio::test]
    async fn missing_log_loads_empty() {
        let dir = tempdir().unwrap();
        let set = ProcessedSet::load(dir.path().join("processed_hashes.log")).await;

        assert!(set.is_empty());
        assert_eq!(set.loaded_count(), 0);
    }

    #[tokio::test]
    async fn load_skips_blank_lines_and_trims() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("processed_hashes.log");
        std::fs::write(&path, "aaa\n\n  bbb  \naaa\n").unwrap();

        let set = ProcessedSet::load(&path).await;

        assert_eq!(set.loaded_count(), 2, "duplicates collapse");
        assert!(set.contains("aaa"));
        assert!(set.contains("bbb"));
        assert!(!set.contains(""));
    }

    #[tokio::test]
    async fn unreadable_log_fails_open() {
        let dir = tempdir().unwrap();
        // A directory cannot be read as a file
        let set = ProcessedSet::load(dir.path()).await;
        assert!(set.is_empty());
    }

    #[tokio::test]
    async fn insert_reports_novelty() {
        let dir = tempdir().unwrap();
        let set = ProcessedSet::load(dir.path().join("log")).await;

        assert!(set.insert("abc"));
        assert!(!set.insert("abc"));
        assert!(set.contains("abc"));
        assert_eq!(set.len(), 1);
    }

    #[tokio::test]
    async fn persisted_hashes_survive_reload() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("processed_hashes.log");

        let set = ProcessedSet::load(&path).await;
        set.persist("first").await.unwrap();
        set.persist("second").await.unwrap();

        let content = std::fs::read_to_string(&path).unwrap();
        assert_eq!(content, "first\nsecond\n");

        let reloaded = ProcessedSet::load(&path).await;
        assert_eq!(reloaded.loaded_count(), 2);
        assert!(reloaded.contains("first"));
        assert!(reloaded.contains("second"));
    }

    #[tokio::test]
    async fn failed_persist_keeps_in_memory_state() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("missing_dir").join("log");

        let set = ProcessedSet::load(&path).await;
        set.insert("abc");
        assert!(set.persist("abc").await.is_err());
        assert!(set.contains("abc"));
    }

    #[tokio::test]
    async fn concurrent_appends_do_not_interleave() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("log");
        let set = std::sync::Arc::new(ProcessedSet::load(&path).await);

        let mut handles = Vec::new();
        for i in 0..20 {
            let set = set.clone();
            handles.push(tokio::spawn(async move {
                set.persist(&format!("hash{i:02}")).await.unwrap();
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        let content = std::fs::read_to_string(&path).unwrap();
        let mut lines: Vec<&str> = content.lines().collect();
        lines.sort();
        assert_eq!(lines.len(), 20);
        assert_eq!(lines[0], "hash00");
        assert_eq!(lines[19], "hash19");
    }
}
