//! Run entry point and end-of-run summary.

use std::time::Instant;

use crate::report::RunSummary;

use super::HashFeedDownloader;

impl HashFeedDownloader {
    /// Walk the feed and download until it is exhausted, fails, or the limit is reached
    ///
    /// Never returns an error: every failure is counted in the statistics and the
    /// summary is always produced. Call [`HashFeedDownloader::stop`] from another task
    /// to end the run early; in-flight downloads still complete.
    pub async fn run(&self) -> RunSummary {
        let started = Instant::now();
        let started_at = chrono::Local::now();

        tracing::info!(
            limit = %self.config.limit_description(),
            threads = self.config.download.threads,
            download_dir = %self.config.download.download_dir.display(),
            already_processed = self.processed.loaded_count(),
            "Starting hash feed download"
        );

        if self.admission.limit() == Some(0) {
            tracing::info!("Download limit is zero, nothing to do");
            self.admission.stop();
        }

        if self.admission.is_stopped() {
            tracing::info!("Run stopped before the first page, skipping feed");
        } else {
            self.paginate(self.config.feed.start_page).await;
        }

        let summary = RunSummary {
            started_at,
            duration: started.elapsed(),
            limit: self.admission.limit(),
            threads: self.config.download.threads,
            processed_log: self.processed.log_path().to_path_buf(),
            loaded_from_log: self.processed.loaded_count(),
            admission: self.admission.snapshot(),
            statistics: self.stats.snapshot(),
        };

        tracing::info!(
            downloaded = summary.statistics.downloaded,
            already_present = summary.statistics.already_present,
            failed = summary.admission.failed,
            duration_secs = summary.duration.as_secs_f64(),
            "Run finished"
        );

        summary
    }
}
