//! Configuration types for hashfeed-dl

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::{path::PathBuf, time::Duration};

/// Hash feed endpoint and pacing
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct FeedConfig {
    /// API base URL; the feed lives at `{base_url}/feed/hashes` and link resolution at
    /// `{base_url}/file/{hash}/download` (default: MetaDefender Cloud v4)
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// API key sent in the `apikey` header
    #[serde(default)]
    pub api_key: Option<String>,

    /// First page to request (default: 1)
    #[serde(default = "default_start_page")]
    pub start_page: u64,

    /// Pause after a page whose batch was processed (default: 500ms)
    #[serde(default = "default_page_delay", with = "millis_serde")]
    pub page_delay: Duration,

    /// Pause after a page that contained no new work (default: 100ms)
    #[serde(default = "default_empty_page_delay", with = "millis_serde")]
    pub empty_page_delay: Duration,
}

impl Default for FeedConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            api_key: None,
            start_page: default_start_page(),
            page_delay: default_page_delay(),
            empty_page_delay: default_empty_page_delay(),
        }
    }
}

/// Download behavior configuration (directory, limit, concurrency, timeouts)
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct DownloadConfig {
    /// Download directory (default: "./downloaded_samples")
    #[serde(default = "default_download_dir")]
    pub download_dir: PathBuf,

    /// Maximum number of successful acquisitions (None = until the feed ends, 0 = none)
    ///
    /// Files that already exist locally count toward this limit.
    #[serde(default)]
    pub max_downloads: Option<u64>,

    /// Number of parallel download workers (default: 16)
    #[serde(default = "default_threads")]
    pub threads: usize,

    /// Timeout for feed and link-resolution requests (default: 15 seconds)
    #[serde(default = "default_request_timeout", with = "duration_serde")]
    pub request_timeout: Duration,

    /// Maximum wait for the next chunk of an artifact transfer (default: 30 seconds)
    #[serde(default = "default_download_timeout", with = "duration_serde")]
    pub download_timeout: Duration,
}

impl Default for DownloadConfig {
    fn default() -> Self {
        Self {
            download_dir: default_download_dir(),
            max_downloads: None,
            threads: default_threads(),
            request_timeout: default_request_timeout(),
            download_timeout: default_download_timeout(),
        }
    }
}

/// Retry behavior configuration
///
/// The default is a fixed delay (`backoff_multiplier` of 1.0, no jitter).
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Number of retries after the first attempt (default: 3)
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Delay before the first retry (default: 5 seconds)
    #[serde(default = "default_initial_delay", with = "duration_serde")]
    pub initial_delay: Duration,

    /// Maximum delay between retries (default: 60 seconds)
    #[serde(default = "default_max_delay", with = "duration_serde")]
    pub max_delay: Duration,

    /// Multiplier applied to the delay after each retry (default: 1.0)
    #[serde(default = "default_backoff_multiplier")]
    pub backoff_multiplier: f64,

    /// Add random jitter to delays (default: false)
    #[serde(default)]
    pub jitter: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            initial_delay: default_initial_delay(),
            max_delay: default_max_delay(),
            backoff_multiplier: default_backoff_multiplier(),
            jitter: false,
        }
    }
}

impl RetryConfig {
    /// Total calls allowed for one operation: the first try plus `max_attempts` retries
    pub fn total_attempts(&self) -> u32 {
        self.max_attempts.saturating_add(1)
    }
}

/// Durable state and report locations
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PersistenceConfig {
    /// Newline-delimited log of processed hashes (default: "processed_hashes.log")
    #[serde(default = "default_processed_log")]
    pub processed_log: PathBuf,

    /// Directory for `acquisition_report_<timestamp>.txt` (None = do not write a file)
    #[serde(default)]
    pub report_dir: Option<PathBuf>,
}

impl Default for PersistenceConfig {
    fn default() -> Self {
        Self {
            processed_log: default_processed_log(),
            report_dir: None,
        }
    }
}

/// Main configuration for [`HashFeedDownloader`](crate::HashFeedDownloader)
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct Config {
    /// Feed endpoint and pacing
    #[serde(default)]
    pub feed: FeedConfig,

    /// Download settings
    #[serde(default)]
    pub download: DownloadConfig,

    /// Retry policy shared by feed, resolver and fetcher calls
    #[serde(default)]
    pub retry: RetryConfig,

    /// Durable state locations
    #[serde(default)]
    pub persistence: PersistenceConfig,
}

impl Config {
    /// Load a configuration from a JSON file; missing fields take their defaults
    pub fn from_json_file(path: &std::path::Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| Error::Config {
            message: format!("cannot read config file '{}': {}", path.display(), e),
            key: None,
        })?;
        Ok(serde_json::from_str(&content)?)
    }

    /// Check settings that would make a run meaningless
    pub fn validate(&self) -> Result<()> {
        if self.download.threads == 0 {
            return Err(Error::config("threads", "must be at least 1"));
        }
        if self.feed.base_url.trim().is_empty() {
            return Err(Error::config("base_url", "must not be empty"));
        }
        if url::Url::parse(&self.feed.base_url).is_err() {
            return Err(Error::config(
                "base_url",
                format!("'{}' is not a valid URL", self.feed.base_url),
            ));
        }
        if self.download.request_timeout.is_zero() {
            return Err(Error::config("request_timeout", "must be greater than zero"));
        }
        if self.download.download_timeout.is_zero() {
            return Err(Error::config(
                "download_timeout",
                "must be greater than zero",
            ));
        }
        if self.retry.backoff_multiplier < 1.0 {
            return Err(Error::config(
                "backoff_multiplier",
                "must be at least 1.0",
            ));
        }
        Ok(())
    }

    /// Download directory
    pub fn download_dir(&self) -> &PathBuf {
        &self.download.download_dir
    }

    /// Human-readable description of the download limit
    pub fn limit_description(&self) -> String {
        match self.download.max_downloads {
            Some(n) => n.to_string(),
            None => "Unlimited (until feed ends)".to_string(),
        }
    }
}

fn default_base_url() -> String {
    "https://api.metadefender.com/v4".to_string()
}

fn default_start_page() -> u64 {
    1
}

fn default_page_delay() -> Duration {
    Duration::from_millis(500)
}

fn default_empty_page_delay() -> Duration {
    Duration::from_millis(100)
}

fn default_download_dir() -> PathBuf {
    PathBuf::from("./downloaded_samples")
}

fn default_threads() -> usize {
    16
}

fn default_request_timeout() -> Duration {
    Duration::from_secs(15)
}

fn default_download_timeout() -> Duration {
    Duration::from_secs(30)
}

fn default_max_attempts() -> u32 {
    3
}

fn default_initial_delay() -> Duration {
    Duration::from_secs(5)
}

fn default_max_delay() -> Duration {
    Duration::from_secs(60)
}

fn default_backoff_multiplier() -> f64 {
    1.0
}

fn default_processed_log() -> PathBuf {
    PathBuf::from("processed_hashes.log")
}

// Duration serialization helper (seconds)
mod duration_serde {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_u64(duration.as_secs())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let secs = u64::deserialize(deserializer)?;
        Ok(Duration::from_secs(secs))
    }
}

// Duration serialization helper (milliseconds)
mod millis_serde {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_u64(duration.as_millis() as u64)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let millis = u64::deserialize(deserializer)?;
        Ok(Duration::from_millis(millis))
    }
}
