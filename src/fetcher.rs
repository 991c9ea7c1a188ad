//! Artifact transfer: URL to bytes on disk

use crate::config::Config;
use crate::error::{Error, Result};
use crate::stats::Statistics;
use crate::types::FetchReceipt;
use crate::utils::build_http_client;
use futures::StreamExt;
use std::path::Path;
use std::time::{Duration, Instant};
use tokio::io::AsyncWriteExt;

/// Writes the content behind a URL to a local file
///
/// Implementations may leave a partial file behind on error. The download worker
/// always passes a `.part` path, removes it before retrying or giving up, and renames
/// it onto the final path after a successful transfer.
#[async_trait::async_trait]
pub trait ArtifactFetcher: Send + Sync {
    /// Stream `url` into `dest`, creating or truncating it
    async fn fetch_to_file(&self, url: &str, dest: &Path) -> Result<FetchReceipt>;
}

/// Production [`ArtifactFetcher`] streaming a `reqwest` response body to disk
pub struct HttpArtifactFetcher {
    client: reqwest::Client,
    chunk_timeout: Duration,
    stats: Statistics,
}

impl HttpArtifactFetcher {
    /// Create a fetcher using `request_timeout` for connecting and the response head,
    /// and `download_timeout` as the longest wait for each body chunk
    ///
    /// # Errors
    /// Returns error if the HTTP client cannot be created
    pub fn new(config: &Config, stats: Statistics) -> Result<Self> {
        Ok(Self {
            client: build_http_client(config.download.request_timeout, None)?,
            chunk_timeout: config.download.download_timeout,
            stats,
        })
    }
}

#[async_trait::async_trait]
impl ArtifactFetcher for HttpArtifactFetcher {
    async fn fetch_to_file(&self, url: &str, dest: &Path) -> Result<FetchReceipt> {
        let started = Instant::now();

        let response = tokio::time::timeout(self.chunk_timeout, self.client.get(url).send())
            .await
            .map_err(|_| Error::Stalled(self.chunk_timeout))??;
        let status = response.status();
        self.stats.record_status(status.as_u16());

        if status == reqwest::StatusCode::NOT_FOUND {
            return Err(Error::NotFound(url.to_string()));
        }
        if !status.is_success() {
            return Err(Error::HttpStatus {
                status: status.as_u16(),
                url: url.to_string(),
            });
        }

        let mut file = tokio::fs::File::create(dest).await?;
        let mut stream = response.bytes_stream();
        let mut bytes: u64 = 0;

        loop {
            let next = tokio::time::timeout(self.chunk_timeout, stream.next())
                .await
                .map_err(|_| Error::Stalled(self.chunk_timeout))?;
            match next {
                Some(chunk) => {
                    let chunk = chunk?;
                    file.write_all(&chunk).await?;
                    bytes += chunk.len() as u64;
                }
                None => break,
            }
        }
        file.flush().await?;

        Ok(FetchReceipt {
            bytes,
            elapsed: started.elapsed(),
        })
    }
}
