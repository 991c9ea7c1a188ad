//! Core types for hashfeed-dl

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// One entry of the hash feed
///
/// Every field is optional on the wire; entries without a usable SHA256 are counted
/// as malformed and skipped.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HashRecord {
    /// SHA256 of the artifact, used as identifier and destination file name
    #[serde(default)]
    pub sha256: Option<String>,

    /// Upstream download hint (usually a URL); only used for display
    #[serde(default, rename = "download")]
    pub download_hint: Option<String>,

    /// SHA1 of the artifact
    #[serde(default)]
    pub sha1: Option<String>,

    /// MD5 of the artifact
    #[serde(default)]
    pub md5: Option<String>,
}

impl HashRecord {
    /// Create a record carrying only a SHA256
    pub fn new(sha256: impl Into<String>) -> Self {
        Self {
            sha256: Some(sha256.into()),
            ..Default::default()
        }
    }

    /// The record's identifier, if it has a usable one
    ///
    /// The identifier becomes a file name, so anything other than ASCII alphanumerics
    /// is rejected along with empty values.
    pub fn hash(&self) -> Option<&str> {
        let hash = self.sha256.as_deref()?.trim();
        if hash.is_empty() || !hash.chars().all(|c| c.is_ascii_alphanumeric()) {
            return None;
        }
        Some(hash)
    }

    /// Best-effort human-readable name for logs and per-file statistics
    ///
    /// Uses the last path segment of the download hint, then falls back to the
    /// SHA256, SHA1 and MD5 in that order.
    pub fn display_name(&self) -> String {
        if let Some(name) = self
            .download_hint
            .as_deref()
            .and_then(|hint| url::Url::parse(hint).ok())
            .and_then(|url| {
                url.path_segments()
                    .and_then(|mut segments| segments.next_back().map(str::to_string))
            })
            .filter(|name| !name.is_empty())
        {
            return name;
        }

        [&self.sha256, &self.sha1, &self.md5]
            .into_iter()
            .flatten()
            .map(|s| s.trim())
            .find(|s| !s.is_empty())
            .map(str::to_string)
            .unwrap_or_else(|| "unknown_entry".to_string())
    }
}

/// One page of the hash feed
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeedPage {
    /// Records in feed order
    #[serde(default)]
    pub data: Vec<HashRecord>,
}

impl FeedPage {
    /// True when the feed has nothing more to offer
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

/// What a completed transfer reports back
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FetchReceipt {
    /// Bytes written to the destination
    pub bytes: u64,
    /// Wall-clock time of the transfer
    pub elapsed: Duration,
}

impl FetchReceipt {
    /// Transfer rate in bytes per second, when the elapsed time is measurable
    pub fn rate(&self) -> Option<f64> {
        let secs = self.elapsed.as_secs_f64();
        (secs > 0.0).then(|| self.bytes as f64 / secs)
    }
}

/// Final state of one admitted hash
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum DownloadOutcome {
    /// Fresh transfer completed
    Downloaded(FetchReceipt),
    /// Destination already existed; no transfer performed
    AlreadyPresent,
    /// The hash could not be acquired
    Failed(FailureStage),
}

/// Where a failed acquisition gave up
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureStage {
    /// Link resolution answered "not found"
    LinkNotFound,
    /// Link resolution kept failing
    LinkUnavailable,
    /// Artifact transfer answered "not found"
    ArtifactNotFound,
    /// Artifact transfer kept failing
    TransferFailed,
}

impl std::fmt::Display for FailureStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            FailureStage::LinkNotFound => "link not found",
            FailureStage::LinkUnavailable => "link unavailable",
            FailureStage::ArtifactNotFound => "artifact not found",
            FailureStage::TransferFailed => "transfer failed",
        };
        f.write_str(s)
    }
}
