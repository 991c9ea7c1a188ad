//! Retry logic with fixed or exponential backoff
//!
//! One retry policy is applied uniformly to feed pages, link resolution and artifact
//! transfers. The caller gets a tagged [`RetryOutcome`] back instead of a bare error, so
//! "definitively missing" and "gave up after N attempts" can be told apart without
//! inspecting the error.
//!
//! # Example
//!
//! ```no_run
//! use hashfeed_dl::retry::{IsRetryable, RetryOutcome, with_retry};
//! use hashfeed_dl::config::RetryConfig;
//!
//! #[derive(Debug)]
//! enum MyError {
//!     Transient,
//!     Permanent,
//! }
//!
//! impl std::fmt::Display for MyError {
//!     fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
//!         write!(f, "{:?}", self)
//!     }
//! }
//!
//! impl IsRetryable for MyError {
//!     fn is_retryable(&self) -> bool {
//!         matches!(self, MyError::Transient)
//!     }
//! }
//!
//! # async fn example() {
//! let config = RetryConfig::default();
//! match with_retry(&config, |_attempt| async { Ok::<_, MyError>(42) }).await {
//!     RetryOutcome::Success(value) => println!("got {value}"),
//!     RetryOutcome::NotFound(_) => println!("gone"),
//!     RetryOutcome::Exhausted { attempts, .. } => println!("gave up after {attempts}"),
//! }
//! # }
//! ```

use crate::config::RetryConfig;
use crate::error::Error;
use rand::Rng;
use std::future::Future;
use std::time::Duration;

/// Trait for errors that can be classified as retryable or not
///
/// Transient failures (network timeouts, server busy, connection reset) should return `true`.
/// Permanent failures (not found, bad configuration, disk full) should return `false`.
pub trait IsRetryable {
    /// Returns true if the error is transient and the operation should be retried
    fn is_retryable(&self) -> bool;

    /// Returns true if the error is a definitive "does not exist" answer
    fn is_not_found(&self) -> bool {
        false
    }
}

impl IsRetryable for Error {
    fn is_retryable(&self) -> bool {
        match self {
            // Any transport-level failure, including timeouts, is transient
            Error::Network(_) => true,
            Error::Io(e) => matches!(
                e.kind(),
                std::io::ErrorKind::TimedOut
                    | std::io::ErrorKind::ConnectionRefused
                    | std::io::ErrorKind::ConnectionReset
                    | std::io::ErrorKind::ConnectionAborted
                    | std::io::ErrorKind::NotConnected
                    | std::io::ErrorKind::BrokenPipe
                    | std::io::ErrorKind::Interrupted
                    | std::io::ErrorKind::UnexpectedEof
            ),
            Error::HttpStatus { status, .. } => {
                *status >= 500 || *status == 408 || *status == 429
            }
            // Undecodable pages share the network retry budget
            Error::MalformedFeed { .. } => true,
            Error::Stalled(_) => true,
            Error::NotFound(_) => false,
            Error::Config { .. } => false,
            Error::Serialization(_) => false,
            Error::Other(_) => false,
        }
    }

    fn is_not_found(&self) -> bool {
        Error::is_not_found(self)
    }
}

/// Result of running an operation under a retry policy
#[derive(Debug)]
pub enum RetryOutcome<T, E> {
    /// The operation succeeded (possibly after retries)
    Success(T),
    /// The remote side said the resource does not exist; never retried
    NotFound(E),
    /// Retries ran out, or a permanent error ended the attempt early
    Exhausted {
        /// The last error observed
        error: E,
        /// Total number of attempts made
        attempts: u32,
    },
}

impl<T, E> RetryOutcome<T, E> {
    /// Returns the success value, if any
    pub fn success(self) -> Option<T> {
        match self {
            RetryOutcome::Success(value) => Some(value),
            _ => None,
        }
    }

    /// True for [`RetryOutcome::Success`]
    pub fn is_success(&self) -> bool {
        matches!(self, RetryOutcome::Success(_))
    }
}

/// Execute an async operation under the retry policy described by `config`
///
/// `operation` receives the 1-based attempt number. `config.max_attempts` counts the
/// retries after the first try, so the operation runs at most `max_attempts + 1` times.
/// Retry waits happen on the calling task only.
pub async fn with_retry<F, Fut, T, E>(config: &RetryConfig, mut operation: F) -> RetryOutcome<T, E>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: IsRetryable + std::fmt::Display,
{
    let mut attempt: u32 = 0;
    let mut delay = config.initial_delay;

    loop {
        match operation(attempt.saturating_add(1)).await {
            Ok(result) => {
                if attempt > 0 {
                    tracing::info!(
                        attempts = attempt.saturating_add(1),
                        "Operation succeeded after retry"
                    );
                }
                return RetryOutcome::Success(result);
            }
            Err(e) if e.is_not_found() => {
                tracing::debug!(error = %e, "Operation reported not found, not retrying");
                return RetryOutcome::NotFound(e);
            }
            Err(e) if e.is_retryable() && attempt < config.max_attempts => {
                attempt += 1;

                tracing::warn!(
                    error = %e,
                    attempt = attempt,
                    max_attempts = config.max_attempts,
                    delay_ms = delay.as_millis(),
                    "Operation failed, retrying"
                );

                let wait = if config.jitter { add_jitter(delay) } else { delay };
                tokio::time::sleep(wait).await;

                let next_delay =
                    Duration::try_from_secs_f64(delay.as_secs_f64() * config.backoff_multiplier)
                        .unwrap_or(config.max_delay);
                delay = next_delay.min(config.max_delay);
            }
            Err(e) => {
                if e.is_retryable() {
                    tracing::error!(
                        error = %e,
                        attempts = attempt.saturating_add(1),
                        "Operation failed after all retry attempts exhausted"
                    );
                } else {
                    tracing::error!(error = %e, "Operation failed with non-retryable error");
                }
                return RetryOutcome::Exhausted {
                    error: e,
                    attempts: attempt.saturating_add(1),
                };
            }
        }
    }
}

/// Add random jitter to a delay to prevent thundering herd
///
/// The result lies between `delay` and `2 * delay`.
fn add_jitter(delay: Duration) -> Duration {
    let mut rng = rand::thread_rng();
    let jitter_factor: f64 = rng.gen_range(0.0..=1.0);
    Duration::from_secs_f64(delay.as_secs_f64() * (1.0 + jitter_factor))
}
