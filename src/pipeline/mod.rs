//! The files pipeline
//!
//! For every item the pipeline reads the configured URL field, processes each
//! distinct URL concurrently (freshness check, download, checksum, persist)
//! and writes the successful results back into the configured result field,
//! in input order. Individual file failures are logged, counted and dropped;
//! only a malformed URL field fails the item.

use async_trait::async_trait;
use futures::future::join_all;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;

use crate::config::{PipelineClass, PipelineConfig, RetryConfig, Settings, json_type_name};
use crate::downloader::Downloader;
use crate::error::{Error, Result};
use crate::fingerprint::{DefaultFilePath, FilePathStrategy, RequestFingerprinter};
use crate::item::ItemAdapter;
use crate::stats::{NoopStats, StatsCollector};
use crate::store::{FilesStore, StoreRegistry};
use crate::types::{MediaRequest, ResultRecord, Response};

mod process;
mod session;

pub use process::Freshness;
pub use session::FileOutcome;
use session::{OutcomeKey, Session};

/// An item-processing stage driven by spider lifecycle hooks
#[async_trait]
pub trait ItemPipeline<I: ItemAdapter + 'static>: Send + Sync {
    /// Pipeline name used in logs
    fn name(&self) -> &str;

    /// Called when the spider starts
    async fn open_spider(&self) {}

    /// Process one item and pass it on
    async fn process_item(&self, item: I) -> Result<I>;

    /// Called when the spider stops
    async fn close_spider(&self) {}
}

/// Downloads the files referenced by items and records where they were stored
pub struct FilesPipeline {
    class: PipelineClass,
    config: PipelineConfig,
    store: Arc<dyn FilesStore>,
    downloader: Arc<dyn Downloader>,
    path_strategy: Arc<dyn FilePathStrategy>,
    fingerprinter: RequestFingerprinter,
    stats: Arc<dyn StatsCollector>,
    retry: RetryConfig,
    session: Session,
}

impl std::fmt::Debug for FilesPipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FilesPipeline")
            .field("class", &self.class.name)
            .field("config", &self.config)
            .field("store", &self.store.name())
            .field("retry", &self.retry)
            .finish_non_exhaustive()
    }
}

/// Builder for [`FilesPipeline`]
pub struct FilesPipelineBuilder {
    downloader: Arc<dyn Downloader>,
    class: PipelineClass,
    settings: Settings,
    store: Option<Arc<dyn FilesStore>>,
    registry: StoreRegistry,
    path_strategy: Arc<dyn FilePathStrategy>,
    stats: Arc<dyn StatsCollector>,
    retry: RetryConfig,
}

impl FilesPipelineBuilder {
    fn new(downloader: Arc<dyn Downloader>) -> Self {
        Self {
            downloader,
            class: PipelineClass::default(),
            settings: Settings::new(),
            store: None,
            registry: StoreRegistry::default(),
            path_strategy: Arc::new(DefaultFilePath::default()),
            stats: Arc::new(NoopStats),
            retry: RetryConfig::default(),
        }
    }

    /// Pipeline identity and attribute overrides
    pub fn class(mut self, class: PipelineClass) -> Self {
        self.class = class;
        self
    }

    /// Settings to resolve configuration (and, unless [`store`](Self::store)
    /// is given, the `FILES_STORE` backend) from
    pub fn settings(mut self, settings: Settings) -> Self {
        self.settings = settings;
        self
    }

    /// Use this store instead of building one from `FILES_STORE`
    pub fn store(mut self, store: Arc<dyn FilesStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// Scheme registry used to build the store from `FILES_STORE`
    pub fn registry(mut self, registry: StoreRegistry) -> Self {
        self.registry = registry;
        self
    }

    /// Replace the store key derivation
    pub fn file_path(mut self, strategy: impl FilePathStrategy + 'static) -> Self {
        self.path_strategy = Arc::new(strategy);
        self
    }

    /// Counter sink
    pub fn stats(mut self, stats: Arc<dyn StatsCollector>) -> Self {
        self.stats = stats;
        self
    }

    /// Retry policy for store writes
    pub fn retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    /// Resolve configuration and build the pipeline
    pub fn build(self) -> Result<FilesPipeline> {
        let config = PipelineConfig::resolve(&self.class, &self.settings)?;
        let store = match self.store {
            Some(store) => store,
            None => self.registry.from_settings(&self.settings)?,
        };

        tracing::info!(
            pipeline = %self.class.name,
            store = store.name(),
            expires_days = config.expires_days,
            "Files pipeline created"
        );

        Ok(FilesPipeline {
            class: self.class,
            config,
            store,
            downloader: self.downloader,
            path_strategy: self.path_strategy,
            fingerprinter: RequestFingerprinter,
            stats: self.stats,
            retry: self.retry,
            session: Session::default(),
        })
    }
}

impl FilesPipeline {
    /// Start building a pipeline around `downloader`
    pub fn builder(downloader: Arc<dyn Downloader>) -> FilesPipelineBuilder {
        FilesPipelineBuilder::new(downloader)
    }

    /// Base pipeline with its store built from `FILES_STORE`
    pub fn from_settings(settings: &Settings, downloader: Arc<dyn Downloader>) -> Result<Self> {
        Self::builder(downloader).settings(settings.clone()).build()
    }

    /// Resolved configuration
    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Backing store
    pub fn store(&self) -> &Arc<dyn FilesStore> {
        &self.store
    }

    /// Store key for `request`, through the configured strategy
    pub fn file_path(
        &self,
        request: &MediaRequest,
        response: Option<&Response>,
        item: Option<&dyn ItemAdapter>,
    ) -> String {
        self.path_strategy.file_path(request, response, item)
    }

    /// Requests for every URL in the item's URL field, in order
    ///
    /// A missing field yields no requests. Anything other than a list of
    /// strings is an error naming the field.
    pub fn get_media_requests(&self, item: &dyn ItemAdapter) -> Result<Vec<MediaRequest>> {
        let field = &self.config.urls_field;
        let invalid = |found: &str| Error::InvalidItemField {
            field: field.clone(),
            found: found.to_string(),
        };
        let urls = match item.get_field(field) {
            None => return Ok(Vec::new()),
            Some(Value::Array(urls)) => urls,
            Some(other) => return Err(invalid(json_type_name(&other))),
        };
        urls.iter()
            .map(|url| match url {
                Value::String(url) => Ok(MediaRequest::new(url)
                    .with_allow_redirects(self.config.allow_redirects)),
                other => Err(invalid(&format!("list containing {}", json_type_name(other)))),
            })
            .collect()
    }

    /// Download the item's files and record the results in it
    ///
    /// Fails only when the URL field is malformed; that check happens before
    /// any I/O.
    #[tracing::instrument(skip_all, fields(pipeline = %self.class.name))]
    pub async fn process_item<I: ItemAdapter>(&self, item: I) -> Result<I> {
        let requests = self.get_media_requests(&item)?;
        if requests.is_empty() {
            return Ok(self.item_completed(&[], item));
        }

        // Equivalent URLs resolving to the same store key share one operation
        let item_ref: &dyn ItemAdapter = &item;
        let keys: Vec<OutcomeKey> = requests
            .iter()
            .map(|request| OutcomeKey {
                fingerprint: self.fingerprinter.fingerprint(request),
                path: self.file_path(request, None, Some(item_ref)),
            })
            .collect();
        let mut unique: Vec<(&OutcomeKey, &MediaRequest)> = Vec::new();
        for (key, request) in keys.iter().zip(&requests) {
            if !unique.iter().any(|(seen, _)| *seen == key) {
                unique.push((key, request));
            }
        }

        let token = self.session.token();
        let outcomes = join_all(
            unique
                .iter()
                .map(|(key, request)| self.process_request(key, request, item_ref, &token)),
        )
        .await;
        let by_key: HashMap<&OutcomeKey, FileOutcome> = unique
            .iter()
            .map(|(key, _)| *key)
            .zip(outcomes)
            .collect();

        let results: Vec<FileOutcome> = keys
            .iter()
            .filter_map(|key| by_key.get(key).cloned())
            .collect();

        Ok(self.item_completed(&results, item))
    }

    /// Write the successful records, in order, into the result field
    ///
    /// An item that cannot hold the result field is returned unchanged.
    pub fn item_completed<I: ItemAdapter>(&self, results: &[FileOutcome], mut item: I) -> I {
        let records: Vec<&ResultRecord> = results.iter().filter_map(|r| r.as_ref().ok()).collect();
        let value = match serde_json::to_value(&records) {
            Ok(value) => value,
            Err(e) => {
                tracing::error!(error = %e, "Failed to serialize file results");
                return item;
            }
        };
        if let Err(e) = item.set_field(&self.config.result_field, value) {
            tracing::debug!(
                field = %self.config.result_field,
                error = %e,
                "Item cannot hold file results, skipping"
            );
        }
        item
    }

    /// Start a spider session: clears remembered outcomes
    pub fn open_spider(&self) {
        self.session.reset();
        tracing::info!(pipeline = %self.class.name, "Spider opened");
    }

    /// End the spider session: in-flight files resolve as cancelled
    pub fn close_spider(&self) {
        self.session.close();
        tracing::info!(pipeline = %self.class.name, "Spider closed");
    }
}

#[async_trait]
impl<I: ItemAdapter + 'static> ItemPipeline<I> for FilesPipeline {
    fn name(&self) -> &str {
        &self.class.name
    }

    async fn open_spider(&self) {
        FilesPipeline::open_spider(self);
    }

    async fn process_item(&self, item: I) -> Result<I> {
        FilesPipeline::process_item(self, item).await
    }

    async fn close_spider(&self) {
        FilesPipeline::close_spider(self);
    }
}
