//! Downloader seam and the default HTTP implementation

use async_trait::async_trait;
use std::time::Duration;

use crate::config::Settings;
use crate::error::{Error, FetchError, Result};
use crate::types::{MediaRequest, Response};

/// Settings key: request timeout in seconds
pub const DOWNLOAD_TIMEOUT: &str = "DOWNLOAD_TIMEOUT";

/// Settings key: maximum accepted body size in bytes (0 = unlimited)
pub const DOWNLOAD_MAXSIZE: &str = "DOWNLOAD_MAXSIZE";

/// Settings key: User-Agent header
pub const USER_AGENT: &str = "USER_AGENT";

const DEFAULT_TIMEOUT_SECS: u64 = 180;
const MAX_REDIRECTS: usize = 10;

/// Fetches a request, resolving to a response or a failure
///
/// Non-2xx statuses are responses, not failures; the pipeline decides what to
/// do with them.
#[async_trait]
pub trait Downloader: Send + Sync {
    /// Perform the request
    async fn fetch(&self, request: &MediaRequest) -> std::result::Result<Response, FetchError>;
}

/// reqwest-backed downloader
///
/// Holds one client per redirect policy so both can share their connection
/// pools across requests.
#[derive(Clone, Debug)]
pub struct HttpDownloader {
    following: reqwest::Client,
    direct: reqwest::Client,
    max_size: Option<u64>,
}

impl HttpDownloader {
    /// Downloader with the default timeout and no size limit
    pub fn new() -> Result<Self> {
        Self::from_settings(&Settings::new())
    }

    /// Build from `DOWNLOAD_TIMEOUT`, `DOWNLOAD_MAXSIZE` and `USER_AGENT`
    pub fn from_settings(settings: &Settings) -> Result<Self> {
        let timeout = match settings.get_int(DOWNLOAD_TIMEOUT)? {
            Some(secs) if secs > 0 => Duration::from_secs(secs as u64),
            Some(secs) => {
                return Err(Error::config(
                    DOWNLOAD_TIMEOUT,
                    format!("timeout must be positive, got {secs}"),
                ));
            }
            None => Duration::from_secs(DEFAULT_TIMEOUT_SECS),
        };
        let max_size = settings
            .get_int(DOWNLOAD_MAXSIZE)?
            .filter(|n| *n > 0)
            .map(|n| n as u64);
        let user_agent = settings
            .get_str(USER_AGENT)?
            .unwrap_or_else(|| format!("media-pipeline/{}", env!("CARGO_PKG_VERSION")));

        let build = |policy: reqwest::redirect::Policy| {
            reqwest::Client::builder()
                .timeout(timeout)
                .user_agent(user_agent.clone())
                .redirect(policy)
                .build()
                .map_err(|e| Error::Other(format!("Failed to create HTTP client: {}", e)))
        };

        Ok(Self {
            following: build(reqwest::redirect::Policy::limited(MAX_REDIRECTS))?,
            direct: build(reqwest::redirect::Policy::none())?,
            max_size,
        })
    }

    fn too_large(&self, url: &str, size: u64) -> Option<FetchError> {
        let limit = self.max_size?;
        (size > limit).then(|| FetchError::Policy {
            url: url.to_string(),
            reason: format!("body of {size} bytes exceeds DOWNLOAD_MAXSIZE {limit}"),
        })
    }
}

#[async_trait]
impl Downloader for HttpDownloader {
    #[tracing::instrument(skip(self, request), fields(url = %request.url))]
    async fn fetch(&self, request: &MediaRequest) -> std::result::Result<Response, FetchError> {
        let client = if request.allow_redirects {
            &self.following
        } else {
            &self.direct
        };

        let mut builder = client.get(&request.url);
        if let Some(referer) = &request.referer {
            builder = builder.header(reqwest::header::REFERER, referer);
        }

        let network = |e: reqwest::Error| {
            let reason = if e.is_timeout() {
                format!("timed out: {e}")
            } else if e.is_connect() {
                format!("connection failed: {e}")
            } else {
                e.to_string()
            };
            FetchError::Network {
                url: request.url.clone(),
                reason,
            }
        };

        let response = builder.send().await.map_err(network)?;
        if let Some(err) = response
            .content_length()
            .and_then(|len| self.too_large(&request.url, len))
        {
            return Err(err);
        }

        let url = response.url().to_string();
        let status = response.status().as_u16();
        let body = response.bytes().await.map_err(network)?;
        if let Some(err) = self.too_large(&request.url, body.len() as u64) {
            return Err(err);
        }

        tracing::debug!(status, bytes = body.len(), "Fetched media");
        Ok(Response::new(url, status, body))
    }
}

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn fetches_body_and_status() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/a.pdf"))
            .and(header("referer", "http://site/page"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(b"%PDF-1.4".to_vec()))
            .mount(&server)
            .await;

        let downloader = HttpDownloader::new().unwrap();
        let request =
            MediaRequest::new(&format!("{}/a.pdf", server.uri())).with_referer("http://site/page");
        let response = downloader.fetch(&request).await.unwrap();

        assert_eq!(response.status, 200);
        assert_eq!(&response.body[..], b"%PDF-1.4");
        assert!(!response.is_cached());
    }

    #[tokio::test]
    async fn error_statuses_are_responses() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let downloader = HttpDownloader::new().unwrap();
        let response = downloader
            .fetch(&MediaRequest::new(&format!("{}/missing", server.uri())))
            .await
            .unwrap();
        assert_eq!(response.status, 404);
    }

    #[tokio::test]
    async fn redirects_follow_request_policy() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/old"))
            .respond_with(
                ResponseTemplate::new(302).insert_header("location", format!("{}/new", server.uri())),
            )
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/new"))
            .respond_with(ResponseTemplate::new(200).set_body_string("moved"))
            .mount(&server)
            .await;

        let downloader = HttpDownloader::new().unwrap();
        let url = format!("{}/old", server.uri());

        let direct = downloader.fetch(&MediaRequest::new(&url)).await.unwrap();
        assert_eq!(direct.status, 302);

        let followed = downloader
            .fetch(&MediaRequest::new(&url).with_allow_redirects(true))
            .await
            .unwrap();
        assert_eq!(followed.status, 200);
        assert!(followed.url.ends_with("/new"));
    }

    #[tokio::test]
    async fn max_size_is_a_policy_failure() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(vec![0u8; 64]))
            .mount(&server)
            .await;

        let settings = Settings::new().with(DOWNLOAD_MAXSIZE, 16);
        let downloader = HttpDownloader::from_settings(&settings).unwrap();
        let err = downloader
            .fetch(&MediaRequest::new(&format!("{}/big", server.uri())))
            .await
            .unwrap_err();
        assert!(matches!(err, FetchError::Policy { .. }));
    }

    #[tokio::test]
    async fn connection_failure_is_network_error() {
        let downloader = HttpDownloader::new().unwrap();
        let err = downloader
            .fetch(&MediaRequest::new("http://127.0.0.1:1/a.pdf"))
            .await
            .unwrap_err();
        assert!(matches!(err, FetchError::Network { .. }));
    }
}
