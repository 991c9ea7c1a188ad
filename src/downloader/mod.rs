//! Core downloader implementation split into focused submodules.
//!
//! The `HashFeedDownloader` struct and its methods are organized by concern:
//! - [`lifecycle`] - Run entry point, limit short-circuit, summary
//! - [`paginator`] - Feed pagination, page deduplication, per-page submission barrier
//! - [`worker`] - Resolve, fetch and record one admitted hash

mod lifecycle;
mod paginator;
mod worker;

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
pub(crate) mod test_helpers;

use std::sync::Arc;

use crate::admission::AdmissionController;
use crate::config::Config;
use crate::error::Result;
use crate::feed::{FeedClient, HttpFeedClient};
use crate::fetcher::{ArtifactFetcher, HttpArtifactFetcher};
use crate::processed::ProcessedSet;
use crate::resolver::{HttpLinkResolver, LinkResolver};
use crate::stats::Statistics;

pub(crate) use worker::DownloadWorker;

/// Main downloader instance (cloneable - all fields are Arc-wrapped)
#[derive(Clone)]
pub struct HashFeedDownloader {
    /// Configuration (wrapped in Arc for sharing across tasks)
    pub(crate) config: Arc<Config>,
    /// Gate enforcing the download limit
    pub(crate) admission: Arc<AdmissionController>,
    /// Hashes loaded from the durable log plus hashes submitted this run
    pub(crate) processed: Arc<ProcessedSet>,
    /// Run statistics shared with workers and HTTP collaborators
    pub(crate) stats: Statistics,
    /// Source of feed pages
    pub(crate) feed: Arc<dyn FeedClient>,
    /// Per-hash download pipeline
    pub(crate) worker: DownloadWorker,
    /// Bounds how many workers run at once (respects `threads`)
    pub(crate) worker_slots: Arc<tokio::sync::Semaphore>,
}

impl HashFeedDownloader {
    /// Create a downloader talking to the configured HTTP API
    ///
    /// This validates the configuration, loads the processed log, ensures the
    /// download directory exists and builds the `reqwest`-backed collaborators.
    pub async fn new(config: Config) -> Result<Self> {
        config.validate()?;
        let stats = Statistics::new();

        let feed = Arc::new(HttpFeedClient::new(&config, stats.clone())?);
        let resolver = Arc::new(HttpLinkResolver::new(&config, stats.clone())?);
        let fetcher = Arc::new(HttpArtifactFetcher::new(&config, stats.clone())?);

        Ok(Self::assemble(config, stats, feed, resolver, fetcher).await)
    }

    /// Create a downloader with caller-supplied collaborators
    ///
    /// Used by embedders that talk to a different feed or transfer mechanism, and by tests.
    pub async fn with_collaborators(
        config: Config,
        feed: Arc<dyn FeedClient>,
        resolver: Arc<dyn LinkResolver>,
        fetcher: Arc<dyn ArtifactFetcher>,
    ) -> Result<Self> {
        config.validate()?;
        Ok(Self::assemble(config, Statistics::new(), feed, resolver, fetcher).await)
    }

    async fn assemble(
        config: Config,
        stats: Statistics,
        feed: Arc<dyn FeedClient>,
        resolver: Arc<dyn LinkResolver>,
        fetcher: Arc<dyn ArtifactFetcher>,
    ) -> Self {
        // A missing directory only fails individual transfers later
        if let Err(e) = tokio::fs::create_dir_all(&config.download.download_dir).await {
            tracing::error!(
                path = %config.download.download_dir.display(),
                error = %e,
                "Failed to create download directory"
            );
        }

        let processed = Arc::new(ProcessedSet::load(&config.persistence.processed_log).await);
        let admission = AdmissionController::new(config.download.max_downloads);
        let worker_slots = Arc::new(tokio::sync::Semaphore::new(config.download.threads));
        let config = Arc::new(config);

        let worker = DownloadWorker {
            config: Arc::clone(&config),
            processed: Arc::clone(&processed),
            stats: stats.clone(),
            resolver,
            fetcher,
        };

        Self {
            config,
            admission,
            processed,
            stats,
            feed,
            worker,
            worker_slots,
        }
    }

    /// Stop admitting new hashes; downloads already in flight run to completion
    pub fn stop(&self) {
        self.admission.stop();
    }

    /// Run statistics collected so far
    pub fn statistics(&self) -> &Statistics {
        &self.stats
    }

    /// The admission gate (limit counters and stop flag)
    pub fn admission(&self) -> &Arc<AdmissionController> {
        &self.admission
    }

    /// Hashes considered processed for this run
    pub fn processed(&self) -> &ProcessedSet {
        &self.processed
    }

    /// Active configuration
    pub fn config(&self) -> &Config {
        &self.config
    }
}
