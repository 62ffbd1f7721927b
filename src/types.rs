//! Core types for media-pipeline

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

use crate::fingerprint::safe_url_string;

/// Response flag set by a downloader that served the body from its HTTP cache
pub const FLAG_CACHED: &str = "cached";

/// A single file download request derived from an item's URL field
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MediaRequest {
    /// Escaped URL (surrounding whitespace trimmed, unsafe bytes percent-encoded)
    pub url: String,
    /// Opaque request flags
    pub flags: BTreeSet<String>,
    /// Whether the downloader may follow redirects for this request
    pub allow_redirects: bool,
    /// Optional referring page
    pub referer: Option<String>,
}

impl MediaRequest {
    /// Build a request for `url`, making the URL safe first
    pub fn new(url: &str) -> Self {
        Self {
            url: safe_url_string(url),
            flags: BTreeSet::new(),
            allow_redirects: false,
            referer: None,
        }
    }

    /// Set the redirect policy
    pub fn with_allow_redirects(mut self, allow: bool) -> Self {
        self.allow_redirects = allow;
        self
    }

    /// Set the referring page
    pub fn with_referer(mut self, referer: impl Into<String>) -> Self {
        self.referer = Some(referer.into());
        self
    }
}

/// What a [`Downloader`](crate::downloader::Downloader) returns for a request
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Response {
    /// Final URL of the response
    pub url: String,
    /// HTTP status code
    pub status: u16,
    /// Response body
    pub body: Bytes,
    /// Response flags; [`FLAG_CACHED`] means no real network transfer happened
    pub flags: BTreeSet<String>,
}

impl Response {
    /// A response with no flags
    pub fn new(url: impl Into<String>, status: u16, body: impl Into<Bytes>) -> Self {
        Self {
            url: url.into(),
            status,
            body: body.into(),
            flags: BTreeSet::new(),
        }
    }

    /// Add a flag
    pub fn with_flag(mut self, flag: impl Into<String>) -> Self {
        self.flags.insert(flag.into());
        self
    }

    /// Whether the status is 2xx
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// Whether the downloader served this from its cache
    pub fn is_cached(&self) -> bool {
        self.flags.contains(FLAG_CACHED)
    }
}

/// How a file came to be present in the store
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FileStatus {
    /// Fetched over the network and persisted
    Downloaded,
    /// Already stored and fresh, no fetch was made
    Uptodate,
    /// Served from the downloader's cache
    Cached,
}

impl FileStatus {
    /// Lowercase name, as serialized and used in stats keys
    pub fn as_str(&self) -> &'static str {
        match self {
            FileStatus::Downloaded => "downloaded",
            FileStatus::Uptodate => "uptodate",
            FileStatus::Cached => "cached",
        }
    }
}

impl std::fmt::Display for FileStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One successfully handled URL, as written back into the item
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResultRecord {
    /// The escaped request URL
    pub url: String,
    /// Store key the file lives under
    pub path: String,
    /// Hex content checksum, if known
    pub checksum: Option<String>,
    /// How the file was obtained
    pub status: FileStatus,
}

/// What a store reports about an existing object
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct StoredFileMetadata {
    /// Hex content checksum
    pub checksum: Option<String>,
    /// Last modification time in POSIX seconds
    pub last_modified: Option<f64>,
}

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_serializes_lowercase() {
        let record = ResultRecord {
            url: "http://x/a.pdf".into(),
            path: "full/a.pdf".into(),
            checksum: Some("abc".into()),
            status: FileStatus::Uptodate,
        };
        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(json["status"], "uptodate");
        assert_eq!(json["checksum"], "abc");
        assert_eq!(FileStatus::Downloaded.to_string(), "downloaded");
    }

    #[test]
    fn request_url_is_made_safe() {
        let request = MediaRequest::new("  http://x/a b.pdf \n");
        assert_eq!(request.url, "http://x/a%20b.pdf");
        assert!(!request.allow_redirects);
    }

    #[test]
    fn response_flags() {
        let response = Response::new("http://x", 204, "data").with_flag(FLAG_CACHED);
        assert!(response.is_success());
        assert!(response.is_cached());
        assert!(!Response::new("http://x", 404, "").is_success());
    }
}
