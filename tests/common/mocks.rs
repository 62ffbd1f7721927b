//! In-memory downloader and store doubles

use async_trait::async_trait;
use bytes::Bytes;
use media_pipeline::store::file_checksum;
use media_pipeline::{
    Downloader, FetchError, FilesStore, MediaRequest, Response, StoreError, StoredFileMetadata,
};
use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// How the mock downloader answers one URL
#[derive(Clone, Debug)]
pub enum Reply {
    /// Respond with a status and body
    Body(u16, &'static [u8]),
    /// Respond 200 with the body, flagged as served from cache
    Cached(&'static [u8]),
    /// Respond 200 after a delay
    Delayed(Duration, &'static [u8]),
    /// Network failure
    Fail,
    /// Never respond
    Hang,
}

/// Downloader answering from a URL table; unknown URLs get a 200 with `data`
#[derive(Default)]
pub struct MockDownloader {
    replies: Mutex<HashMap<String, Reply>>,
    calls: Mutex<Vec<String>>,
}

impl MockDownloader {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reply(self, url: &str, reply: Reply) -> Self {
        self.replies.lock().unwrap().insert(url.to_string(), reply);
        self
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }
}

#[async_trait]
impl Downloader for MockDownloader {
    async fn fetch(&self, request: &MediaRequest) -> Result<Response, FetchError> {
        self.calls.lock().unwrap().push(request.url.clone());
        let reply = self
            .replies
            .lock()
            .unwrap()
            .get(&request.url)
            .cloned()
            .unwrap_or(Reply::Body(200, b"data"));

        match reply {
            Reply::Body(status, body) => Ok(Response::new(request.url.clone(), status, body)),
            Reply::Cached(body) => {
                Ok(Response::new(request.url.clone(), 200, body).with_flag("cached"))
            }
            Reply::Delayed(delay, body) => {
                tokio::time::sleep(delay).await;
                Ok(Response::new(request.url.clone(), 200, body))
            }
            Reply::Fail => Err(FetchError::Network {
                url: request.url.clone(),
                reason: "connection refused".into(),
            }),
            Reply::Hang => {
                std::future::pending::<()>().await;
                unreachable!()
            }
        }
    }
}

/// Seconds since the epoch, `days` ago
pub fn days_ago(days: f64) -> f64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap()
        .as_secs_f64()
        - days * 86_400.0
}

/// Store keeping objects in a map
#[derive(Default)]
pub struct MemoryStore {
    objects: Mutex<HashMap<String, (Bytes, StoredFileMetadata)>>,
    persist_failures: Mutex<VecDeque<StoreError>>,
    fail_stat: Mutex<bool>,
    pub persist_calls: AtomicUsize,
    pub stat_calls: AtomicUsize,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Pretend an object with this checksum was stored `age_days` ago
    pub fn preload(&self, path: &str, checksum: &str, age_days: f64) {
        self.objects.lock().unwrap().insert(
            path.to_string(),
            (
                Bytes::new(),
                StoredFileMetadata {
                    checksum: Some(checksum.to_string()),
                    last_modified: Some(days_ago(age_days)),
                },
            ),
        );
    }

    /// The next persist calls fail with these errors, in order
    pub fn fail_next_persists(&self, errors: Vec<StoreError>) {
        self.persist_failures.lock().unwrap().extend(errors);
    }

    pub fn fail_stats(&self) {
        *self.fail_stat.lock().unwrap() = true;
    }

    pub fn object(&self, path: &str) -> Option<Bytes> {
        self.objects
            .lock()
            .unwrap()
            .get(path)
            .map(|(data, _)| data.clone())
    }

    pub fn checksum(&self, path: &str) -> Option<String> {
        self.objects
            .lock()
            .unwrap()
            .get(path)
            .and_then(|(_, meta)| meta.checksum.clone())
    }
}

#[async_trait]
impl FilesStore for MemoryStore {
    fn name(&self) -> &'static str {
        "memory"
    }

    async fn stat_file(&self, path: &str) -> Result<Option<StoredFileMetadata>, StoreError> {
        self.stat_calls.fetch_add(1, Ordering::SeqCst);
        if *self.fail_stat.lock().unwrap() {
            return Err(StoreError::Http {
                backend: "memory",
                key: path.to_string(),
                status: 500,
                message: "stat unavailable".into(),
            });
        }
        Ok(self
            .objects
            .lock()
            .unwrap()
            .get(path)
            .map(|(_, meta)| meta.clone()))
    }

    async fn persist_file(
        &self,
        path: &str,
        data: Bytes,
        _meta: &HashMap<String, String>,
        _headers: Option<&HashMap<String, String>>,
    ) -> Result<(), StoreError> {
        self.persist_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(err) = self.persist_failures.lock().unwrap().pop_front() {
            return Err(err);
        }
        let meta = StoredFileMetadata {
            checksum: Some(file_checksum(&data)),
            last_modified: Some(days_ago(0.0)),
        };
        self.objects
            .lock()
            .unwrap()
            .insert(path.to_string(), (data, meta));
        Ok(())
    }
}

/// A store error with the given HTTP status
pub fn http_error(status: u16) -> StoreError {
    StoreError::Http {
        backend: "memory",
        key: "k".into(),
        status,
        message: String::new(),
    }
}
