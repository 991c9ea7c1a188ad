//! Hash feed access
//!
//! The paginator only needs "give me page N". [`HttpFeedClient`] implements that
//! against `{base_url}/feed/hashes?page=N`; retries are applied by the caller.

use crate::config::Config;
use crate::error::{Error, Result};
use crate::stats::Statistics;
use crate::types::{FeedPage, HashRecord};
use crate::utils::{build_http_client, join_url};
use tracing::{debug, warn};

/// Source of hash feed pages
#[async_trait::async_trait]
pub trait FeedClient: Send + Sync {
    /// Fetch one page of the feed
    ///
    /// An empty page means the feed is exhausted.
    async fn fetch_page(&self, page: u64) -> Result<FeedPage>;
}

/// Production [`FeedClient`] backed by `reqwest`
pub struct HttpFeedClient {
    client: reqwest::Client,
    endpoint: String,
    api_key: Option<String>,
    stats: Statistics,
}

impl HttpFeedClient {
    /// Create a feed client from the feed and timeout settings in `config`
    ///
    /// # Errors
    /// Returns error if the HTTP client cannot be created
    pub fn new(config: &Config, stats: Statistics) -> Result<Self> {
        let timeout = config.download.request_timeout;
        Ok(Self {
            client: build_http_client(timeout, Some(timeout))?,
            endpoint: join_url(&config.feed.base_url, "feed/hashes"),
            api_key: config.feed.api_key.clone(),
            stats,
        })
    }
}

#[async_trait::async_trait]
impl FeedClient for HttpFeedClient {
    async fn fetch_page(&self, page: u64) -> Result<FeedPage> {
        debug!(page, "Requesting hash feed page");

        let mut request = self.client.get(&self.endpoint).query(&[("page", page)]);
        if let Some(key) = &self.api_key {
            request = request.header("apikey", key);
        }

        let response = request.send().await?;
        let status = response.status();
        self.stats.record_status(status.as_u16());

        if !status.is_success() {
            return Err(Error::HttpStatus {
                status: status.as_u16(),
                url: self.endpoint.clone(),
            });
        }

        let body = response.text().await?;
        decode_page(page, &body)
    }
}

/// Decode a feed page body
///
/// A body that is not JSON is an error. A JSON document without a `data` array is
/// treated as an empty page. Individual entries that do not fit [`HashRecord`] are
/// kept as empty records so they are counted as malformed rather than failing the page.
pub fn decode_page(page: u64, body: &str) -> Result<FeedPage> {
    let value: serde_json::Value =
        serde_json::from_str(body).map_err(|e| Error::MalformedFeed {
            page,
            reason: e.to_string(),
        })?;

    let Some(entries) = value.get("data").and_then(|data| data.as_array()) else {
        let preview: String = body.chars().take(200).collect();
        warn!(page, response = %preview, "Feed page has no data array, treating as empty");
        return Ok(FeedPage::default());
    };

    let data = entries
        .iter()
        .map(|entry| {
            serde_json::from_value::<HashRecord>(entry.clone()).unwrap_or_else(|e| {
                debug!(page, error = %e, "Unreadable feed entry");
                HashRecord::default()
            })
        })
        .collect();

    Ok(FeedPage { data })
}
