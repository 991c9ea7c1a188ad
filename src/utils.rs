//! Utility functions shared by the HTTP collaborators and the download worker

use crate::error::{Error, Result};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// User agent sent with every request
pub const USER_AGENT: &str = concat!("hashfeed-dl/", env!("CARGO_PKG_VERSION"));

/// Build an HTTP client with the given connect timeout and optional total timeout
///
/// Artifact transfers pass `None` for the total timeout and bound each chunk instead,
/// so large files are not cut off while still making progress.
pub fn build_http_client(
    connect_timeout: Duration,
    total_timeout: Option<Duration>,
) -> Result<reqwest::Client> {
    let mut builder = reqwest::Client::builder()
        .connect_timeout(connect_timeout)
        .user_agent(USER_AGENT);
    if let Some(timeout) = total_timeout {
        builder = builder.timeout(timeout);
    }
    builder
        .build()
        .map_err(|e| Error::Other(format!("Failed to create HTTP client: {}", e)))
}

/// Join an endpoint path onto a base URL without doubling or dropping slashes
///
/// # Examples
///
/// ```
/// use hashfeed_dl::utils::join_url;
///
/// assert_eq!(
///     join_url("https://api.example.com/v4/", "/feed/hashes"),
///     "https://api.example.com/v4/feed/hashes"
/// );
/// ```
pub fn join_url(base: &str, path: &str) -> String {
    format!(
        "{}/{}",
        base.trim_end_matches('/'),
        path.trim_start_matches('/')
    )
}

/// Destination path for an artifact: the download directory joined with its hash
pub fn artifact_path(download_dir: &Path, hash: &str) -> PathBuf {
    download_dir.join(hash)
}

/// In-progress path for an artifact: `<dest>.part`
///
/// Transfers land here and are renamed onto `dest` only once complete, so an
/// interrupted process never leaves a truncated file at the final path.
pub fn partial_path(dest: &Path) -> PathBuf {
    let mut name = dest.as_os_str().to_owned();
    name.push(".part");
    PathBuf::from(name)
}

/// Remove a partially written file
///
/// A file that is already gone counts as removed.
pub async fn remove_partial_file(path: &Path) -> std::io::Result<()> {
    match tokio::fs::remove_file(path).await {
        Ok(()) => {
            tracing::debug!(path = %path.display(), "Removed partial file");
            Ok(())
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e),
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn join_url_normalizes_slashes() {
        assert_eq!(join_url("http://a/b", "c"), "http://a/b/c");
        assert_eq!(join_url("http://a/b/", "c"), "http://a/b/c");
        assert_eq!(join_url("http://a/b", "/c"), "http://a/b/c");
        assert_eq!(join_url("http://a/b//", "//c/d"), "http://a/b/c/d");
    }

    #[test]
    fn artifact_path_is_named_after_the_hash() {
        let path = artifact_path(Path::new("/tmp/samples"), "abc123");
        assert_eq!(path, PathBuf::from("/tmp/samples/abc123"));
    }

    #[test]
    fn partial_path_appends_suffix() {
        let dest = artifact_path(Path::new("/data/samples"), "abc123");
        assert_eq!(partial_path(&dest), PathBuf::from("/data/samples/abc123.part"));
    }

    #[tokio::test]
    async fn remove_partial_file_deletes_existing_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("partial");
        std::fs::write(&path, b"half").unwrap();

        remove_partial_file(&path).await.unwrap();
        assert!(!path.exists());
    }

    #[tokio::test]
    async fn remove_partial_file_tolerates_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        assert!(remove_partial_file(&dir.path().join("never")).await.is_ok());
    }

    #[tokio::test]
    async fn remove_partial_file_reports_other_errors() {
        let dir = tempfile::tempdir().unwrap();
        // remove_file on a directory fails with something other than NotFound
        assert!(remove_partial_file(dir.path()).await.is_err());
    }

    #[test]
    fn http_client_builds_with_and_without_total_timeout() {
        assert!(build_http_client(Duration::from_secs(1), Some(Duration::from_secs(2))).is_ok());
        assert!(build_http_client(Duration::from_secs(1), None).is_ok());
    }
}
