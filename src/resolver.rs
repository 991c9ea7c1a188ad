//! Link resolution: hash to download URL

use crate::config::Config;
use crate::error::{Error, Result};
use crate::stats::Statistics;
use crate::utils::{build_http_client, join_url};

/// Turns a hash into a URL the artifact can be fetched from
#[async_trait::async_trait]
pub trait LinkResolver: Send + Sync {
    /// Resolve `hash` to a download URL
    ///
    /// Returns [`Error::NotFound`] when the hash definitively has no download.
    async fn resolve(&self, hash: &str) -> Result<String>;
}

/// Production [`LinkResolver`] calling `{base_url}/file/{hash}/download`
///
/// The endpoint answers with a JSON object whose `file_path` field holds the URL.
pub struct HttpLinkResolver {
    client: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
    stats: Statistics,
}

impl HttpLinkResolver {
    /// Create a resolver from the feed and timeout settings in `config`
    ///
    /// # Errors
    /// Returns error if the HTTP client cannot be created
    pub fn new(config: &Config, stats: Statistics) -> Result<Self> {
        let timeout = config.download.request_timeout;
        Ok(Self {
            client: build_http_client(timeout, Some(timeout))?,
            base_url: config.feed.base_url.clone(),
            api_key: config.feed.api_key.clone(),
            stats,
        })
    }
}

#[async_trait::async_trait]
impl LinkResolver for HttpLinkResolver {
    async fn resolve(&self, hash: &str) -> Result<String> {
        let url = join_url(&self.base_url, &format!("file/{hash}/download"));

        let mut request = self.client.get(&url);
        if let Some(key) = &self.api_key {
            request = request.header("apikey", key);
        }

        let response = request.send().await?;
        let status = response.status();
        self.stats.record_status(status.as_u16());

        if status == reqwest::StatusCode::NOT_FOUND {
            tracing::warn!(hash, "Download link not found (404)");
            return Err(Error::NotFound(format!("download link for {hash}")));
        }
        if !status.is_success() {
            return Err(Error::HttpStatus {
                status: status.as_u16(),
                url,
            });
        }

        let body = response.text().await?;
        let value: serde_json::Value = serde_json::from_str(&body)?;
        match value.get("file_path").and_then(|v| v.as_str()) {
            Some(link) if !link.trim().is_empty() => Ok(link.to_string()),
            _ => Err(Error::NotFound(format!(
                "no file_path in link response for {hash}"
            ))),
        }
    }
}
