//! Feed pagination and per-page submission.
//!
//! Pages are processed strictly one after another: every task spawned for page N is
//! joined before page N+1 is requested. Within a page, admission is attempted in
//! feed order and submission stops at the first denial.

use std::collections::HashSet;
use std::sync::Arc;

use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

use crate::error::Error;
use crate::retry::{RetryOutcome, with_retry};
use crate::stats::IssueKind;
use crate::types::{DownloadOutcome, FeedPage};

use super::HashFeedDownloader;
use super::worker::PendingHash;

/// Result of fetching one page under the retry policy
enum PageFetch {
    Page(FeedPage),
    Failed,
}

impl HashFeedDownloader {
    /// Walk the feed from `start_page` until it is exhausted, fails or the run stops
    pub(crate) async fn paginate(&self, start_page: u64) {
        let mut page = start_page;

        loop {
            if self.admission.is_stopped() {
                info!(page, "Admission stopped, not requesting further pages");
                break;
            }

            let feed_page = match self.fetch_page_with_retry(page).await {
                PageFetch::Page(feed_page) => feed_page,
                PageFetch::Failed => {
                    self.admission.stop();
                    break;
                }
            };

            if feed_page.is_empty() {
                info!(page, "No more hashes in feed, finishing");
                break;
            }

            self.stats.record_page(feed_page.data.len());
            info!(page, hashes = feed_page.data.len(), "Fetched feed page");

            let batch = self.build_page_batch(feed_page);
            if batch.is_empty() {
                debug!(page, "Nothing new on page");
                tokio::time::sleep(self.config.feed.empty_page_delay).await;
                page += 1;
                continue;
            }

            self.submit_batch(page, batch).await;

            if self.admission.stop_if_limit_reached() {
                info!(page, "Download limit reached or run stopped");
                break;
            }

            tokio::time::sleep(self.config.feed.page_delay).await;
            page += 1;
        }
    }

    async fn fetch_page_with_retry(&self, page: u64) -> PageFetch {
        let feed = &self.feed;
        let outcome = with_retry(&self.config.retry, move |attempt| {
            debug!(page, attempt, "Fetching feed page");
            feed.fetch_page(page)
        })
        .await;

        match outcome {
            RetryOutcome::Success(feed_page) => PageFetch::Page(feed_page),
            RetryOutcome::Exhausted { error, attempts } => {
                error!(page, attempts, error = %error, "Failed to get feed page, stopping");
                let kind = match error {
                    Error::MalformedFeed { .. } => IssueKind::FeedDecodeFailed,
                    _ => IssueKind::FeedRequestFailed,
                };
                self.stats.record_issue(kind);
                PageFetch::Failed
            }
            RetryOutcome::NotFound(error) => {
                error!(page, error = %error, "Feed page not found, stopping");
                self.stats.record_issue(IssueKind::FeedRequestFailed);
                PageFetch::Failed
            }
        }
    }

    /// Filter a page down to hashes worth submitting, in feed order
    ///
    /// Drops records without an identifier, hashes already processed and repeats of a
    /// hash earlier on the same page.
    pub(crate) fn build_page_batch(&self, feed_page: FeedPage) -> Vec<PendingHash> {
        let mut seen_on_page = HashSet::new();
        let mut batch = Vec::new();

        for record in feed_page.data {
            let Some(pending) = PendingHash::from_record(record) else {
                warn!("Feed entry without a usable hash, skipping");
                self.stats.record_malformed();
                continue;
            };

            if self.processed.contains(&pending.hash) {
                debug!(hash = %pending.hash, "Already processed, skipping");
                self.stats.record_skipped_processed();
                continue;
            }

            if !seen_on_page.insert(pending.hash.clone()) {
                debug!(hash = %pending.hash, "Duplicate on page, skipping");
                self.stats.record_page_duplicate();
                continue;
            }

            batch.push(pending);
        }

        batch
    }

    /// Admit and spawn `batch`, then wait for every spawned task
    async fn submit_batch(&self, page: u64, batch: Vec<PendingHash>) {
        let mut tasks = JoinSet::new();

        for pending in batch {
            let Some(permit) = self.admission.try_admit() else {
                info!(
                    page,
                    hash = %pending.hash,
                    "Download limit reached, not submitting further hashes"
                );
                break;
            };

            self.processed.insert(&pending.hash);

            let worker = self.worker.clone();
            let slots = Arc::clone(&self.worker_slots);
            tasks.spawn(async move {
                // The semaphore is never closed
                let _slot = slots.acquire_owned().await.ok();
                worker.process(pending, permit).await
            });
        }

        let submitted = tasks.len();
        let mut downloaded = 0usize;
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok(DownloadOutcome::Downloaded(_)) => downloaded += 1,
                Ok(_) => {}
                Err(e) => {
                    error!(page, error = %e, "Download task aborted");
                    self.stats.record_issue(IssueKind::WorkerAborted);
                }
            }
        }

        debug!(page, submitted, downloaded, "Page batch complete");
    }
}
