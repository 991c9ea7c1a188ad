//! # hashfeed-dl
//!
//! Bounded, concurrent artifact acquisition driven by a paginated hash feed.
//!
//! ## Design Philosophy
//!
//! hashfeed-dl is designed to be:
//! - **Exact about limits** - At most N successful acquisitions, however many workers run
//! - **Restartable** - A durable processed log means a second run never repeats work
//! - **Failure tolerant** - One bad hash never ends the run; every problem is counted
//! - **Library-first** - The `hashfeed-dl` binary is a thin shell over this crate
//!
//! ## Quick Start
//!
//! ```no_run
//! use hashfeed_dl::{Config, HashFeedDownloader, run_with_shutdown};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let mut config = Config::default();
//!     config.feed.api_key = Some("my-api-key".to_string());
//!     config.download.max_downloads = Some(100);
//!     config.download.threads = 8;
//!
//!     let downloader = HashFeedDownloader::new(config).await?;
//!
//!     // Stops admitting new work on SIGINT/SIGTERM, in-flight downloads finish
//!     let summary = run_with_shutdown(downloader).await;
//!     println!("{summary}");
//!
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::unwrap_used)]
#![warn(clippy::expect_used)]

/// Admission control for the download limit
pub mod admission;
/// Configuration types
pub mod config;
/// Core downloader implementation (decomposed into focused submodules)
pub mod downloader;
/// Error types
pub mod error;
/// Hash feed client
pub mod feed;
/// Artifact transfer
pub mod fetcher;
/// Console and file logging for the binary
pub mod logging;
/// Durable processed-hash log
pub mod processed;
/// Run summary and report file
pub mod report;
/// Download link resolution
pub mod resolver;
/// Retry logic with backoff
pub mod retry;
/// Run statistics
pub mod stats;
/// Core types
pub mod types;
/// Utility functions
pub mod utils;

// Re-export commonly used types
pub use admission::{AdmissionController, AdmissionPermit, AdmissionSnapshot};
pub use config::{Config, DownloadConfig, FeedConfig, PersistenceConfig, RetryConfig};
pub use downloader::HashFeedDownloader;
pub use error::{Error, Result};
pub use feed::{FeedClient, HttpFeedClient};
pub use fetcher::{ArtifactFetcher, HttpArtifactFetcher};
pub use processed::ProcessedSet;
pub use report::{RunSummary, write_report};
pub use resolver::{HttpLinkResolver, LinkResolver};
pub use stats::{IssueKind, Statistics, StatisticsSnapshot};
pub use types::{DownloadOutcome, FailureStage, FeedPage, FetchReceipt, HashRecord};

/// Helper function to run the downloader with graceful signal handling.
///
/// Runs [`HashFeedDownloader::run`] to completion. If a termination signal arrives
/// first, admission is stopped and the run is awaited until in-flight downloads drain,
/// so a summary is produced either way.
///
/// - **Unix:** listens for SIGTERM and SIGINT, with fallbacks if signal registration fails.
/// - **Windows/other:** listens for Ctrl+C via `tokio::signal::ctrl_c()`.
///
/// # Example
///
/// ```no_run
/// use hashfeed_dl::{HashFeedDownloader, Config, run_with_shutdown};
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let config = Config::default();
///     let downloader = HashFeedDownloader::new(config).await?;
///
///     let summary = run_with_shutdown(downloader).await;
///     println!("{}", summary.render());
///
///     Ok(())
/// }
/// ```
pub async fn run_with_shutdown(downloader: HashFeedDownloader) -> RunSummary {
    let run = downloader.run();
    tokio::pin!(run);

    tokio::select! {
        summary = &mut run => summary,
        _ = wait_for_signal() => {
            tracing::info!("Stopping admissions, waiting for in-flight downloads");
            downloader.stop();
            run.await
        }
    }
}

#[cfg(unix)]
async fn wait_for_signal() {
    use tokio::signal::unix::{SignalKind, signal};

    // Set up signal handlers - these may fail in restricted environments (containers, tests)
    let sigterm_result = signal(SignalKind::terminate());
    let sigint_result = signal(SignalKind::interrupt());

    match (sigterm_result, sigint_result) {
        (Ok(mut sigterm), Ok(mut sigint)) => {
            tokio::select! {
                _ = sigterm.recv() => {
                    tracing::info!("Received SIGTERM signal");
                }
                _ = sigint.recv() => {
                    tracing::info!("Received SIGINT signal (Ctrl+C)");
                }
            }
        }
        (Err(e), _) => {
            tracing::warn!(error = %e, "Could not register SIGTERM handler, waiting for SIGINT only");
            if let Ok(mut sigint) = signal(SignalKind::interrupt()) {
                sigint.recv().await;
                tracing::info!("Received SIGINT signal (Ctrl+C)");
            } else {
                tracing::error!("Could not register any signal handlers, using ctrl_c fallback");
                ctrl_c_or_never().await;
            }
        }
        (_, Err(e)) => {
            tracing::warn!(error = %e, "Could not register SIGINT handler, waiting for SIGTERM only");
            if let Ok(mut sigterm) = signal(SignalKind::terminate()) {
                sigterm.recv().await;
                tracing::info!("Received SIGTERM signal");
            } else {
                tracing::error!("Could not register any signal handlers, using ctrl_c fallback");
                ctrl_c_or_never().await;
            }
        }
    }
}

#[cfg(not(unix))]
async fn wait_for_signal() {
    ctrl_c_or_never().await;
}

/// Resolves on Ctrl+C; never resolves if the handler cannot be installed
async fn ctrl_c_or_never() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => {
            tracing::info!("Received Ctrl+C signal");
        }
        Err(e) => {
            tracing::error!(error = %e, "Failed to listen for Ctrl+C signal");
            std::future::pending::<()>().await;
        }
    }
}
