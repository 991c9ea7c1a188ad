//! Scripted collaborators and a downloader factory for pipeline tests.

use std::collections::{HashMap, VecDeque};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::{Duration, Instant};

use crate::config::Config;
use crate::downloader::HashFeedDownloader;
use crate::error::{Error, Result};
use crate::feed::FeedClient;
use crate::fetcher::ArtifactFetcher;
use crate::resolver::LinkResolver;
use crate::types::{FeedPage, FetchReceipt, HashRecord};

/// Build a feed page from plain sha256 values
pub(crate) fn page(hashes: &[&str]) -> FeedPage {
    FeedPage {
        data: hashes.iter().map(|h| HashRecord::new(*h)).collect(),
    }
}

/// Feed returning scripted pages in order, then empty pages
pub(crate) struct MockFeed {
    responses: Mutex<VecDeque<Result<FeedPage>>>,
    requested: Mutex<Vec<u64>>,
}

impl MockFeed {
    pub(crate) fn with_pages(pages: Vec<FeedPage>) -> Self {
        Self::with_responses(pages.into_iter().map(Ok).collect())
    }

    pub(crate) fn with_responses(responses: Vec<Result<FeedPage>>) -> Self {
        Self {
            responses: Mutex::new(VecDeque::from(responses)),
            requested: Mutex::new(Vec::new()),
        }
    }

    /// Page numbers requested so far, including retries
    pub(crate) fn requested(&self) -> Vec<u64> {
        self.requested.lock().unwrap().clone()
    }
}

#[async_trait::async_trait]
impl FeedClient for MockFeed {
    async fn fetch_page(&self, page: u64) -> Result<FeedPage> {
        self.requested.lock().unwrap().push(page);
        self.responses
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Ok(FeedPage::default()))
    }
}

/// Scripted resolver outcome
#[derive(Clone, Debug)]
pub(crate) enum Resolve {
    Link(String),
    NotFound,
    Unavailable,
}

/// Resolver answering `mock://<hash>` unless scripted otherwise per hash
#[derive(Default)]
pub(crate) struct MockResolver {
    scripts: Mutex<HashMap<String, VecDeque<Resolve>>>,
    calls: Mutex<Vec<String>>,
}

impl MockResolver {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Queue outcomes for `hash`; once exhausted the default link is returned
    pub(crate) fn script(self, hash: &str, outcomes: Vec<Resolve>) -> Self {
        self.scripts
            .lock()
            .unwrap()
            .insert(hash.to_string(), VecDeque::from(outcomes));
        self
    }

    /// Hashes resolved so far, one entry per attempt
    pub(crate) fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait::async_trait]
impl LinkResolver for MockResolver {
    async fn resolve(&self, hash: &str) -> Result<String> {
        self.calls.lock().unwrap().push(hash.to_string());
        let scripted = self
            .scripts
            .lock()
            .unwrap()
            .get_mut(hash)
            .and_then(VecDeque::pop_front);

        match scripted.unwrap_or_else(|| Resolve::Link(format!("mock://{hash}"))) {
            Resolve::Link(link) => Ok(link),
            Resolve::NotFound => Err(Error::NotFound(format!("download link for {hash}"))),
            Resolve::Unavailable => Err(Error::HttpStatus {
                status: 503,
                url: format!("mock://resolver/{hash}"),
            }),
        }
    }
}

/// Scripted fetch outcome
#[derive(Clone, Debug)]
pub(crate) enum Fetch {
    Write(Vec<u8>),
    /// Leave a partial file behind, then fail with a retryable error
    PartialThenStall,
    NotFound,
}

/// Fetcher writing `payload:<url>` unless scripted otherwise per URL
#[derive(Default)]
pub(crate) struct MockFetcher {
    scripts: Mutex<HashMap<String, VecDeque<Fetch>>>,
    calls: Mutex<Vec<String>>,
    /// Destination of each attempt and whether it already existed when the attempt began
    destinations: Mutex<Vec<(PathBuf, bool)>>,
    delay: Duration,
    active: AtomicUsize,
    max_active: AtomicUsize,
}

impl MockFetcher {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Hold every transfer for `delay` so concurrency can be observed
    pub(crate) fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub(crate) fn script(self, url: &str, outcomes: Vec<Fetch>) -> Self {
        self.scripts
            .lock()
            .unwrap()
            .insert(url.to_string(), VecDeque::from(outcomes));
        self
    }

    /// URLs fetched so far, one entry per attempt
    pub(crate) fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    /// Paths handed to each attempt, in call order
    pub(crate) fn destinations(&self) -> Vec<PathBuf> {
        let destinations = self.destinations.lock().unwrap();
        destinations.iter().map(|(path, _)| path.clone()).collect()
    }

    /// Whether the destination was already on disk when each attempt started
    pub(crate) fn existed_at_start(&self) -> Vec<bool> {
        let destinations = self.destinations.lock().unwrap();
        destinations.iter().map(|(_, existed)| *existed).collect()
    }

    /// Highest number of transfers observed running at once
    pub(crate) fn max_active(&self) -> usize {
        self.max_active.load(Ordering::SeqCst)
    }
}

#[async_trait::async_trait]
impl ArtifactFetcher for MockFetcher {
    async fn fetch_to_file(&self, url: &str, dest: &Path) -> Result<FetchReceipt> {
        let started = Instant::now();
        self.calls.lock().unwrap().push(url.to_string());
        let existed = tokio::fs::try_exists(dest).await.unwrap_or(false);
        self.destinations
            .lock()
            .unwrap()
            .push((dest.to_path_buf(), existed));

        let now_active = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_active.fetch_max(now_active, Ordering::SeqCst);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        self.active.fetch_sub(1, Ordering::SeqCst);

        let scripted = self
            .scripts
            .lock()
            .unwrap()
            .get_mut(url)
            .and_then(VecDeque::pop_front);

        match scripted.unwrap_or_else(|| Fetch::Write(format!("payload:{url}").into_bytes())) {
            Fetch::Write(bytes) => {
                tokio::fs::write(dest, &bytes).await?;
                Ok(FetchReceipt {
                    bytes: bytes.len() as u64,
                    elapsed: started.elapsed(),
                })
            }
            Fetch::PartialThenStall => {
                tokio::fs::write(dest, b"partial").await?;
                Err(Error::Stalled(Duration::from_millis(1)))
            }
            Fetch::NotFound => Err(Error::NotFound(url.to_string())),
        }
    }
}

/// Configuration rooted in `dir` with instant retries
pub(crate) fn test_config(dir: &Path) -> Config {
    let mut config = Config::default();
    config.download.download_dir = dir.join("downloads");
    config.persistence.processed_log = dir.join("processed_hashes.log");
    config.download.threads = 4;
    config.retry.max_attempts = 2;
    config.retry.initial_delay = Duration::ZERO;
    config.retry.max_delay = Duration::ZERO;
    config.feed.page_delay = Duration::ZERO;
    config.feed.empty_page_delay = Duration::ZERO;
    config
}

/// Build a downloader over the given mocks
pub(crate) async fn create_test_downloader(
    config: Config,
    feed: Arc<MockFeed>,
    resolver: Arc<MockResolver>,
    fetcher: Arc<MockFetcher>,
) -> HashFeedDownloader {
    HashFeedDownloader::with_collaborators(config, feed, resolver, fetcher)
        .await
        .unwrap()
}
