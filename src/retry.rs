//! Retry logic with exponential backoff
//!
//! Storage backends never retry on their own. The pipeline wraps `persist_file`
//! calls with [`with_retry`], which retries transient failures with exponential
//! backoff and optional jitter.
//!
//! # Example
//!
//! ```no_run
//! use media_pipeline::retry::{IsRetryable, with_retry};
//! use media_pipeline::config::RetryConfig;
//!
//! #[derive(Debug)]
//! enum MyError {
//!     Transient,
//!     Permanent,
//! }
//!
//! impl std::fmt::Display for MyError {
//!     fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
//!         write!(f, "{self:?}")
//!     }
//! }
//!
//! impl IsRetryable for MyError {
//!     fn is_retryable(&self) -> bool {
//!         matches!(self, MyError::Transient)
//!     }
//! }
//!
//! # async fn example() -> Result<(), MyError> {
//! let config = RetryConfig::default();
//! with_retry(&config, || async {
//!     // Your operation here
//!     Ok::<_, MyError>(())
//! }).await?;
//! # Ok(())
//! # }
//! ```

use crate::config::RetryConfig;
use crate::error::{Error, FileError, StoreError};
use rand::Rng;
use std::future::Future;
use std::time::Duration;

/// Trait for errors that can be classified as retryable or not
///
/// Transient failures (timeouts, connection resets, server-side 5xx) return `true`.
/// Permanent failures (access denied, bad URI, disk full) return `false`.
pub trait IsRetryable {
    /// Returns true if the error is transient and the operation should be retried
    fn is_retryable(&self) -> bool;
}

fn io_is_transient(e: &std::io::Error) -> bool {
    matches!(
        e.kind(),
        std::io::ErrorKind::TimedOut
            | std::io::ErrorKind::ConnectionRefused
            | std::io::ErrorKind::ConnectionReset
            | std::io::ErrorKind::ConnectionAborted
            | std::io::ErrorKind::NotConnected
            | std::io::ErrorKind::BrokenPipe
            | std::io::ErrorKind::Interrupted
    )
}

impl IsRetryable for StoreError {
    fn is_retryable(&self) -> bool {
        match self {
            StoreError::Io { source, .. } => io_is_transient(source),
            // 5xx, request timeout and throttling
            StoreError::Http { status, .. } => {
                *status >= 500 || *status == 408 || *status == 429
            }
            StoreError::Transport { source, .. } => {
                source.is_timeout() || source.is_connect() || source.is_request()
            }
            StoreError::Ftp(msg) => {
                // 4xx FTP replies are transient by protocol definition
                let msg = msg.to_ascii_lowercase();
                msg.contains("timed out")
                    || msg.contains("connection")
                    || msg.contains("421")
                    || msg.contains("425")
                    || msg.contains("426")
                    || msg.contains("450")
                    || msg.contains("451")
            }
            StoreError::InvalidUri { .. } => false,
            StoreError::InvalidResponse { .. } => false,
            StoreError::Signing(_) => false,
            StoreError::Join(_) => false,
        }
    }
}

impl IsRetryable for FileError {
    fn is_retryable(&self) -> bool {
        match self {
            FileError::Store(e) => e.is_retryable(),
            _ => false,
        }
    }
}

impl IsRetryable for Error {
    fn is_retryable(&self) -> bool {
        match self {
            Error::Store(e) => e.is_retryable(),
            Error::Config { .. }
            | Error::NotConfigured(_)
            | Error::InvalidItemField { .. }
            | Error::Serialization(_)
            | Error::Other(_) => false,
        }
    }
}

/// Delays to sleep between attempts
///
/// Starts at `initial_delay`, grows by `backoff_multiplier` and never exceeds
/// `max_delay`. Yields one delay per allowed retry, then ends.
#[derive(Debug, Clone)]
pub struct Backoff {
    next: Duration,
    remaining: u32,
    multiplier: f64,
    cap: Duration,
    jitter: bool,
}

impl Backoff {
    /// Delay schedule for `config`
    pub fn new(config: &RetryConfig) -> Self {
        Self {
            next: config.initial_delay,
            remaining: config.max_attempts,
            multiplier: config.backoff_multiplier,
            cap: config.max_delay,
            jitter: config.jitter,
        }
    }
}

impl Iterator for Backoff {
    type Item = Duration;

    fn next(&mut self) -> Option<Duration> {
        if self.remaining == 0 {
            return None;
        }
        self.remaining -= 1;

        let base = self.next.min(self.cap);
        self.next = Duration::try_from_secs_f64(base.as_secs_f64() * self.multiplier)
            .map_or(self.cap, |grown| grown.min(self.cap));

        Some(if self.jitter { jittered(base) } else { base })
    }
}

/// Somewhere in `[delay, 2 * delay]`
fn jittered(delay: Duration) -> Duration {
    let factor: f64 = rand::thread_rng().gen_range(1.0..=2.0);
    delay.mul_f64(factor)
}

/// Run `operation` until it succeeds, fails permanently, or the [`Backoff`]
/// schedule for `config` runs out
///
/// Returns the first success or the last error.
pub async fn with_retry<F, Fut, T, E>(config: &RetryConfig, mut operation: F) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: IsRetryable + std::fmt::Display,
{
    let mut delays = Backoff::new(config);
    let mut attempt: u32 = 1;

    loop {
        let err = match operation().await {
            Ok(value) => {
                if attempt > 1 {
                    tracing::info!(attempts = attempt, "Succeeded after retrying");
                }
                return Ok(value);
            }
            Err(err) => err,
        };

        if !err.is_retryable() {
            tracing::debug!(error = %err, "Permanent failure, not retrying");
            return Err(err);
        }
        let Some(delay) = delays.next() else {
            tracing::error!(error = %err, attempts = attempt, "Giving up after retries");
            return Err(err);
        };

        tracing::warn!(
            error = %err,
            attempt,
            delay_ms = delay.as_millis(),
            "Transient failure, backing off"
        );
        tokio::time::sleep(delay).await;
        attempt += 1;
    }
}
