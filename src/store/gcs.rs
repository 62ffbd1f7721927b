//! Google Cloud Storage store over the JSON API

use async_trait::async_trait;
use base64::Engine;
use bytes::Bytes;
use chrono::DateTime;
use serde::Deserialize;
use serde_json::json;
use std::collections::HashMap;

use super::{FilesStore, split_bucket_uri};
use crate::config::{Settings, keys};
use crate::error::{Result, StoreError};
use crate::types::StoredFileMetadata;

const BACKEND: &str = "gcs";
const DEFAULT_ENDPOINT: &str = "https://storage.googleapis.com";
const DEFAULT_CACHE_CONTROL: &str = "max-age=172800";
const DEFAULT_CONTENT_TYPE: &str = "application/octet-stream";
const BOUNDARY: &str = "media_pipeline_boundary_5f8e2c";

/// Stores files as objects under `gs://bucket/prefix`
#[derive(Clone)]
pub struct GcsFilesStore {
    client: reqwest::Client,
    endpoint: String,
    bucket: String,
    prefix: String,
    project_id: Option<String>,
    access_token: Option<String>,
    acl: Option<String>,
}

impl std::fmt::Debug for GcsFilesStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GcsFilesStore")
            .field("endpoint", &self.endpoint)
            .field("bucket", &self.bucket)
            .field("prefix", &self.prefix)
            .field("project_id", &self.project_id)
            .field("acl", &self.acl)
            .finish_non_exhaustive()
    }
}

/// Subset of the object resource the store reads
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ObjectResource {
    md5_hash: Option<String>,
    updated: Option<String>,
}

impl GcsFilesStore {
    /// Build from a `gs://bucket/prefix` URI and the GCS settings
    pub fn from_settings(uri: &str, settings: &Settings) -> Result<Self> {
        let (bucket, prefix) = split_bucket_uri(uri, "gs")?;
        let endpoint = settings
            .get_str(keys::GCS_ENDPOINT_URL)?
            .unwrap_or_else(|| DEFAULT_ENDPOINT.to_string())
            .trim_end_matches('/')
            .to_string();

        Ok(Self {
            client: reqwest::Client::new(),
            endpoint,
            bucket,
            prefix,
            project_id: settings.get_str(keys::GCS_PROJECT_ID)?,
            access_token: settings.get_str(keys::GCS_ACCESS_TOKEN)?,
            acl: settings.get_str(keys::FILES_STORE_GCS_ACL)?,
        })
    }

    fn object_name(&self, path: &str) -> String {
        format!("{}{}", self.prefix, path)
    }

    fn authorize(&self, mut request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        if let Some(token) = &self.access_token {
            request = request.bearer_auth(token);
        }
        if let Some(project) = &self.project_id {
            request = request.header("x-goog-user-project", project);
        }
        request
    }

    fn transport(source: reqwest::Error) -> StoreError {
        StoreError::Transport {
            backend: BACKEND,
            source,
        }
    }
}

async fn http_error(name: &str, response: reqwest::Response) -> StoreError {
    let status = response.status().as_u16();
    let message = response.text().await.unwrap_or_default();
    StoreError::Http {
        backend: BACKEND,
        key: name.to_string(),
        status,
        message,
    }
}

/// `multipart/related` upload body: JSON metadata part, then the media part
fn multipart_body(metadata: &serde_json::Value, content_type: &str, data: &[u8]) -> Vec<u8> {
    let mut body = Vec::with_capacity(data.len() + 512);
    body.extend_from_slice(
        format!(
            "--{BOUNDARY}\r\nContent-Type: application/json; charset=UTF-8\r\n\r\n{metadata}\r\n"
        )
        .as_bytes(),
    );
    body.extend_from_slice(
        format!("--{BOUNDARY}\r\nContent-Type: {content_type}\r\n\r\n").as_bytes(),
    );
    body.extend_from_slice(data);
    body.extend_from_slice(format!("\r\n--{BOUNDARY}--\r\n").as_bytes());
    body
}

#[async_trait]
impl FilesStore for GcsFilesStore {
    fn name(&self) -> &'static str {
        BACKEND
    }

    #[tracing::instrument(skip(self), fields(bucket = %self.bucket))]
    async fn stat_file(
        &self,
        path: &str,
    ) -> std::result::Result<Option<StoredFileMetadata>, StoreError> {
        let name = self.object_name(path);
        let url = format!(
            "{}/storage/v1/b/{}/o/{}",
            self.endpoint,
            self.bucket,
            urlencoding::encode(&name)
        );
        let response = self
            .authorize(self.client.get(&url))
            .send()
            .await
            .map_err(Self::transport)?;

        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !response.status().is_success() {
            return Err(http_error(&name, response).await);
        }

        let object: ObjectResource = response.json().await.map_err(|e| {
            StoreError::InvalidResponse {
                backend: BACKEND,
                reason: e.to_string(),
            }
        })?;

        let checksum = object
            .md5_hash
            .and_then(|b64| base64::engine::general_purpose::STANDARD.decode(b64).ok())
            .map(hex::encode);
        let last_modified = object
            .updated
            .and_then(|raw| DateTime::parse_from_rfc3339(&raw).ok())
            .map(|ts| ts.timestamp_millis() as f64 / 1000.0);

        Ok(Some(StoredFileMetadata {
            checksum,
            last_modified,
        }))
    }

    #[tracing::instrument(skip(self, data, meta, headers), fields(bucket = %self.bucket, size = data.len()))]
    async fn persist_file(
        &self,
        path: &str,
        data: Bytes,
        meta: &HashMap<String, String>,
        headers: Option<&HashMap<String, String>>,
    ) -> std::result::Result<(), StoreError> {
        let name = self.object_name(path);
        let header = |wanted: &str| {
            headers.and_then(|h| {
                h.iter()
                    .find(|(k, _)| k.eq_ignore_ascii_case(wanted))
                    .map(|(_, v)| v.clone())
            })
        };
        let content_type =
            header("content-type").unwrap_or_else(|| DEFAULT_CONTENT_TYPE.to_string());
        let cache_control =
            header("cache-control").unwrap_or_else(|| DEFAULT_CACHE_CONTROL.to_string());

        let metadata = json!({
            "name": name,
            "cacheControl": cache_control,
            "contentType": content_type,
            "metadata": meta,
        });

        let mut url = format!(
            "{}/upload/storage/v1/b/{}/o?uploadType=multipart",
            self.endpoint, self.bucket
        );
        if let Some(acl) = &self.acl {
            url.push_str(&format!("&predefinedAcl={}", urlencoding::encode(acl)));
        }

        let response = self
            .authorize(self.client.post(&url))
            .header(
                reqwest::header::CONTENT_TYPE,
                format!("multipart/related; boundary={BOUNDARY}"),
            )
            .body(multipart_body(&metadata, &content_type, &data))
            .send()
            .await
            .map_err(Self::transport)?;
        if !response.status().is_success() {
            return Err(http_error(&name, response).await);
        }

        tracing::debug!(object = %name, "Stored object");
        Ok(())
    }
}
