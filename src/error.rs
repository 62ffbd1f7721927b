//! Error types for media-pipeline
//!
//! This module provides the error taxonomy for the library:
//! - Configuration errors (bad settings, unknown store scheme, malformed item fields)
//! - Store errors raised by the storage backends
//! - Fetch errors raised by the downloader
//! - Per-file errors that drop a single URL from an item's results

use thiserror::Error;

/// Result type alias for media-pipeline operations
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for media-pipeline
///
/// Only configuration-class variants ever abort an item. Per-URL failures are
/// reported through [`FileError`] and never escape `process_item`.
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration error with context about which setting is invalid
    #[error("configuration error: {message}")]
    Config {
        /// Human-readable error message describing the configuration issue
        message: String,
        /// The settings key that caused the error (e.g., "FILES_EXPIRES")
        key: Option<String>,
    },

    /// A required component is not configured (e.g. missing FILES_STORE)
    #[error("not configured: {0}")]
    NotConfigured(String),

    /// The item's URL field does not hold a list of URL strings
    #[error("{field} must be a list of URLs, got {found}")]
    InvalidItemField {
        /// The item field that was read
        field: String,
        /// Type name of the value that was found
        found: String,
    },

    /// Storage backend error
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    /// Serialization error
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Other error
    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Shorthand for a configuration error tied to a settings key
    pub fn config(key: impl Into<String>, message: impl Into<String>) -> Self {
        Error::Config {
            message: message.into(),
            key: Some(key.into()),
        }
    }
}

/// Errors raised by a [`FilesStore`](crate::store::FilesStore) backend
///
/// "Not found" is never an error: `stat_file` returns `Ok(None)` instead.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Local filesystem failure
    #[error("I/O error on {path}: {source}")]
    Io {
        /// Path that was being accessed
        path: String,
        /// Underlying I/O error
        #[source]
        source: std::io::Error,
    },

    /// Remote object store answered with an unexpected HTTP status
    #[error("{backend} returned HTTP {status} for {key}: {message}")]
    Http {
        /// Backend name (e.g. "s3")
        backend: &'static str,
        /// Object key
        key: String,
        /// HTTP status code
        status: u16,
        /// Response body or reason phrase
        message: String,
    },

    /// Transport failure talking to a remote store (connect, timeout, reset)
    #[error("{backend} transport error: {source}")]
    Transport {
        /// Backend name
        backend: &'static str,
        /// Underlying HTTP client error
        #[source]
        source: reqwest::Error,
    },

    /// FTP protocol or connection failure
    #[error("FTP error: {0}")]
    Ftp(String),

    /// The store URI could not be parsed
    #[error("invalid store URI {uri}: {reason}")]
    InvalidUri {
        /// The offending URI
        uri: String,
        /// Why it was rejected
        reason: String,
    },

    /// The remote store returned a response that could not be interpreted
    #[error("{backend} returned an invalid response: {reason}")]
    InvalidResponse {
        /// Backend name
        backend: &'static str,
        /// What was wrong with it
        reason: String,
    },

    /// A request to a remote store could not be signed
    #[error("request signing failed: {0}")]
    Signing(String),

    /// A blocking store task panicked or was aborted
    #[error("store task failed: {0}")]
    Join(String),
}

/// Errors raised by a [`Downloader`](crate::downloader::Downloader)
#[derive(Debug, Error)]
pub enum FetchError {
    /// Network-level failure (DNS, connect, TLS, timeout)
    #[error("network failure fetching {url}: {reason}")]
    Network {
        /// Requested URL
        url: String,
        /// Failure description
        reason: String,
    },

    /// Request refused by a downloader policy (robots, size limit, ...)
    #[error("request to {url} rejected by policy: {reason}")]
    Policy {
        /// Requested URL
        url: String,
        /// Policy that rejected it
        reason: String,
    },
}

/// Why a single file was dropped from an item's results
#[derive(Debug, Error)]
pub enum FileError {
    /// The response status was not a success
    #[error("download-error: HTTP {status}")]
    DownloadError {
        /// HTTP status code of the response
        status: u16,
    },

    /// The response body was empty
    #[error("empty-content")]
    EmptyContent,

    /// Persisting the file failed
    #[error("store failure: {0}")]
    Store(#[from] StoreError),

    /// The downloader failed
    #[error("fetch failure: {0}")]
    Fetch(#[from] FetchError),

    /// The spider closed while the file was in flight
    #[error("cancelled")]
    Cancelled,
}

impl FileError {
    /// Short machine-readable reason used in logs
    pub fn reason(&self) -> &'static str {
        match self {
            FileError::DownloadError { .. } => "download-error",
            FileError::EmptyContent => "empty-content",
            FileError::Store(_) => "store-error",
            FileError::Fetch(_) => "fetch-error",
            FileError::Cancelled => "cancelled",
        }
    }
}
