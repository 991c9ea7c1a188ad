//! `hashfeed-dl` command line entry point.
//!
//! Layers configuration (JSON file, then flags), installs logging, runs the pipeline
//! with signal handling and prints and saves the acquisition report.

use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;

use clap::Parser;
use hashfeed_dl::logging::{DEFAULT_LOG_FILE, init_logging};
use hashfeed_dl::{Config, HashFeedDownloader, run_with_shutdown, write_report};

/// Download artifacts listed in a paginated hash feed
#[derive(Debug, Parser)]
#[command(name = "hashfeed-dl", version, about)]
struct Cli {
    /// JSON configuration file; flags override its values
    #[arg(long)]
    config: Option<PathBuf>,

    /// Maximum number of successful acquisitions (omit for unlimited, 0 for none)
    #[arg(long = "maximum-download")]
    maximum_download: Option<u64>,

    /// Number of concurrent download workers
    #[arg(long)]
    threads: Option<usize>,

    /// Directory artifacts are written to
    #[arg(long)]
    download_dir: Option<PathBuf>,

    /// Durable log of processed hashes
    #[arg(long)]
    processed_log: Option<PathBuf>,

    /// First feed page to request
    #[arg(long)]
    start_page: Option<u64>,

    /// Retries after the first attempt of each request
    #[arg(long)]
    retries: Option<u32>,

    /// Seconds to wait between retries
    #[arg(long)]
    retry_delay: Option<u64>,

    /// Directory the acquisition report is written to
    #[arg(long, default_value = ".")]
    report_dir: PathBuf,

    /// File the run log is appended to, in addition to the console
    #[arg(long, default_value = DEFAULT_LOG_FILE)]
    log_file: PathBuf,

    /// API key sent with feed and link requests
    #[arg(long, env = "METADEFENDER_API_KEY", hide_env_values = true)]
    api_key: Option<String>,
}

impl Cli {
    fn into_config(self) -> hashfeed_dl::Result<Config> {
        let mut config = match &self.config {
            Some(path) => Config::from_json_file(path)?,
            None => Config::default(),
        };

        if let Some(limit) = self.maximum_download {
            config.download.max_downloads = Some(limit);
        }
        if let Some(threads) = self.threads {
            config.download.threads = threads;
        }
        if let Some(dir) = self.download_dir {
            config.download.download_dir = dir;
        }
        if let Some(log) = self.processed_log {
            config.persistence.processed_log = log;
        }
        if let Some(page) = self.start_page {
            config.feed.start_page = page;
        }
        if let Some(retries) = self.retries {
            config.retry.max_attempts = retries;
        }
        if let Some(secs) = self.retry_delay {
            config.retry.initial_delay = Duration::from_secs(secs);
        }
        if let Some(key) = self.api_key {
            config.feed.api_key = Some(key);
        }
        if config.persistence.report_dir.is_none() {
            config.persistence.report_dir = Some(self.report_dir);
        }

        Ok(config)
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    // Held until exit so buffered log lines reach the file
    let _logging = match init_logging(&cli.log_file) {
        Ok(guard) => guard,
        Err(e) => {
            eprintln!("Could not open log file {}: {e}", cli.log_file.display());
            return ExitCode::FAILURE;
        }
    };

    let config = match cli.into_config() {
        Ok(config) => config,
        Err(e) => {
            tracing::error!(error = %e, "Invalid configuration");
            return ExitCode::FAILURE;
        }
    };

    if config.feed.api_key.as_deref().is_none_or(str::is_empty) {
        tracing::error!(
            "API key is not set. Pass --api-key or set the METADEFENDER_API_KEY environment variable"
        );
        return ExitCode::FAILURE;
    }

    let report_dir = config.persistence.report_dir.clone();

    let downloader = match HashFeedDownloader::new(config).await {
        Ok(downloader) => downloader,
        Err(e) => {
            tracing::error!(error = %e, "Failed to start downloader");
            return ExitCode::FAILURE;
        }
    };

    let summary = run_with_shutdown(downloader).await;
    println!("\n{summary}\n");

    if let Some(dir) = report_dir
        && let Err(e) = write_report(&summary, &dir).await
    {
        tracing::error!(dir = %dir.display(), error = %e, "Could not write report file");
    }

    ExitCode::SUCCESS
}
