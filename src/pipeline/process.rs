//! Per-URL processing: freshness check, download, checksum, persist

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};
use tokio_util::sync::CancellationToken;

use super::session::OutcomeKey;
use super::{FileOutcome, FilesPipeline};
use crate::error::FileError;
use crate::item::ItemAdapter;
use crate::retry::with_retry;
use crate::stats::{FILE_COUNT, file_status_key};
use crate::store::file_checksum;
use crate::types::{FileStatus, MediaRequest, ResultRecord, Response};

const SECONDS_PER_DAY: f64 = 86_400.0;

/// Result of checking the store before downloading
#[derive(Clone, Debug, PartialEq)]
pub enum Freshness {
    /// The stored copy is fresh; no download needed
    UpToDate(ResultRecord),
    /// The file must be downloaded; carries the stored checksum, if any
    Stale {
        /// Checksum reported by the store for the existing copy
        stored_checksum: Option<String>,
    },
}

impl FilesPipeline {
    /// Process one distinct request, consulting and updating the session cache
    pub(super) async fn process_request(
        &self,
        key: &OutcomeKey,
        request: &MediaRequest,
        item: &dyn ItemAdapter,
        token: &CancellationToken,
    ) -> FileOutcome {
        if let Some(outcome) = self.session.get(key) {
            tracing::debug!(url = %request.url, "File already processed in this session");
            return outcome;
        }

        let outcome = tokio::select! {
            biased;
            _ = token.cancelled() => Err(FileError::Cancelled),
            result = self.fetch_and_store(request, item) => result,
        };

        let outcome = outcome.map_err(|e| {
            self.log_failure(request, &e);
            self.stats.inc_value(&file_status_key("failed"), 1);
            Arc::new(e)
        });
        self.session.remember(key, &outcome);
        outcome
    }

    async fn fetch_and_store(
        &self,
        request: &MediaRequest,
        item: &dyn ItemAdapter,
    ) -> Result<ResultRecord, FileError> {
        let stored_checksum = match self.media_to_download(request, Some(item)).await {
            Freshness::UpToDate(record) => return Ok(record),
            Freshness::Stale { stored_checksum } => stored_checksum,
        };

        let response = self.downloader.fetch(request).await?;
        self.media_downloaded(&response, request, Some(item), stored_checksum)
            .await
    }

    /// Check whether the stored copy of `request` can be reused
    ///
    /// Store errors are logged and treated as "unknown", which forces a
    /// download.
    pub async fn media_to_download(
        &self,
        request: &MediaRequest,
        item: Option<&dyn ItemAdapter>,
    ) -> Freshness {
        let path = self.file_path(request, None, item);
        let stale = |stored_checksum| Freshness::Stale { stored_checksum };

        let metadata = match self.store.stat_file(&path).await {
            Ok(Some(metadata)) => metadata,
            Ok(None) => return stale(None),
            Err(e) => {
                tracing::warn!(
                    url = %request.url,
                    path = %path,
                    error = %e,
                    "Unable to check stored file, downloading"
                );
                return stale(None);
            }
        };

        let Some(last_modified) = metadata.last_modified else {
            return stale(metadata.checksum);
        };
        if self.config.expires_days == 0 {
            return stale(metadata.checksum);
        }
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs_f64())
            .unwrap_or_default();
        let age_days = (now - last_modified) / SECONDS_PER_DAY;
        if age_days > f64::from(self.config.expires_days) {
            return stale(metadata.checksum);
        }

        tracing::debug!(
            url = %request.url,
            path = %path,
            age_days,
            "File is up to date, skipping download"
        );
        self.inc_stats(FileStatus::Uptodate);
        Freshness::UpToDate(ResultRecord {
            url: request.url.clone(),
            path,
            checksum: metadata.checksum,
            status: FileStatus::Uptodate,
        })
    }

    /// Turn a download response into a stored file
    ///
    /// Non-2xx and empty responses fail. A response served from the
    /// downloader's cache keeps `stored_checksum` and is not written again
    /// when that checksum is known.
    pub async fn media_downloaded(
        &self,
        response: &Response,
        request: &MediaRequest,
        item: Option<&dyn ItemAdapter>,
        stored_checksum: Option<String>,
    ) -> Result<ResultRecord, FileError> {
        if !response.is_success() {
            return Err(FileError::DownloadError {
                status: response.status,
            });
        }
        if response.body.is_empty() {
            return Err(FileError::EmptyContent);
        }

        let status = if response.is_cached() {
            FileStatus::Cached
        } else {
            FileStatus::Downloaded
        };
        let path = self.file_path(request, Some(response), item);

        let checksum = match (status, stored_checksum) {
            (FileStatus::Cached, Some(checksum)) => checksum,
            _ => {
                let checksum = file_checksum(&response.body);
                self.persist(&path, response).await?;
                checksum
            }
        };

        tracing::debug!(url = %request.url, path = %path, %status, "File stored");
        self.inc_stats(status);
        Ok(ResultRecord {
            url: request.url.clone(),
            path,
            checksum: Some(checksum),
            status,
        })
    }

    async fn persist(&self, path: &str, response: &Response) -> Result<(), FileError> {
        let meta = HashMap::new();
        with_retry(&self.retry, || {
            self.store
                .persist_file(path, response.body.clone(), &meta, None)
        })
        .await
        .map_err(|e| {
            tracing::error!(
                backend = self.store.name(),
                path = %path,
                error = %e,
                "Failed to persist file"
            );
            FileError::Store(e)
        })
    }

    fn inc_stats(&self, status: FileStatus) {
        self.stats.inc_value(FILE_COUNT, 1);
        self.stats.inc_value(&file_status_key(status.as_str()), 1);
    }

    fn log_failure(&self, request: &MediaRequest, error: &FileError) {
        match error {
            FileError::Cancelled => {
                tracing::debug!(url = %request.url, "File processing cancelled")
            }
            _ => tracing::warn!(
                url = %request.url,
                reason = error.reason(),
                error = %error,
                "File download failed"
            ),
        }
    }
}
