//! Error types for hashfeed-dl
//!
//! Every collaborator (feed, resolver, fetcher) reports failures through [`Error`].
//! Whether a failure is worth another attempt is decided by
//! [`IsRetryable`](crate::retry::IsRetryable), not by the call site.

use thiserror::Error;

/// Result type alias for hashfeed-dl operations
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for hashfeed-dl
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration error with context about which setting is invalid
    #[error("configuration error: {message}")]
    Config {
        /// Human-readable error message describing the configuration issue
        message: String,
        /// The configuration key that caused the error (e.g., "threads")
        key: Option<String>,
    },

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Network error
    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),

    /// Serialization error
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Remote endpoint answered with a non-success status
    #[error("HTTP {status} from {url}")]
    HttpStatus {
        /// HTTP status code
        status: u16,
        /// Requested URL
        url: String,
    },

    /// The remote side definitively reported that the resource does not exist
    #[error("not found: {0}")]
    NotFound(String),

    /// A feed page could not be decoded
    #[error("malformed feed page {page}: {reason}")]
    MalformedFeed {
        /// Page number that failed to decode
        page: u64,
        /// Decoder message
        reason: String,
    },

    /// A chunk of the transfer did not arrive within the configured timeout
    #[error("transfer stalled for more than {0:?}")]
    Stalled(std::time::Duration),

    /// Other error
    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Convenience constructor for configuration errors tied to a key
    pub fn config(key: &str, message: impl Into<String>) -> Self {
        Error::Config {
            message: message.into(),
            key: Some(key.to_string()),
        }
    }

    /// True when the failure is a definitive "does not exist" answer
    pub fn is_not_found(&self) -> bool {
        match self {
            Error::NotFound(_) => true,
            Error::HttpStatus { status, .. } => *status == 404,
            _ => false,
        }
    }

    /// HTTP status carried by the error, if any
    pub fn status_code(&self) -> Option<u16> {
        match self {
            Error::HttpStatus { status, .. } => Some(*status),
            Error::Network(e) => e.status().map(|s| s.as_u16()),
            _ => None,
        }
    }
}
