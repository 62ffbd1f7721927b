//! Items and pipelines used across the integration tests

use super::mocks::{MemoryStore, MockDownloader};
use media_pipeline::{
    FilesPipeline, MemoryStatsCollector, PipelineClass, RetryConfig, SchemaItem, Settings,
};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};
use std::sync::Arc;
use std::time::Duration;

/// Store key of `http://x/a.pdf` under the default strategy
pub const A_PDF_PATH: &str = "full/0c32dca357e51d92e3c7e204231286ce0ab5155b.pdf";

/// Hex MD5 of `data`, the mock downloader's default body
pub const DATA_MD5: &str = "8d777f385d3dfec8815d20f7496026dc";

/// Attribute-style item
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
pub struct FileItem {
    pub name: String,
    pub file_urls: Value,
    pub files: Option<Value>,
}

pub fn map_item(urls: Value) -> Map<String, Value> {
    let mut item = Map::new();
    item.insert("name".into(), json!("item"));
    item.insert("file_urls".into(), urls);
    item
}

pub fn schema_item(urls: Value) -> SchemaItem {
    SchemaItem::new("FileItem", ["name", "file_urls", "files"])
        .with("file_urls", urls)
        .unwrap()
}

/// Retry policy that does not slow tests down
pub fn fast_retry() -> RetryConfig {
    RetryConfig {
        max_attempts: 2,
        initial_delay: Duration::from_millis(5),
        max_delay: Duration::from_millis(20),
        backoff_multiplier: 2.0,
        jitter: false,
    }
}

/// Everything a pipeline test needs to inspect
pub struct Harness {
    pub pipeline: Arc<FilesPipeline>,
    pub downloader: Arc<MockDownloader>,
    pub store: Arc<MemoryStore>,
    pub stats: Arc<MemoryStatsCollector>,
}

pub fn harness(downloader: MockDownloader) -> Harness {
    harness_with(downloader, PipelineClass::default(), Settings::new())
}

pub fn harness_with(downloader: MockDownloader, class: PipelineClass, settings: Settings) -> Harness {
    let downloader = Arc::new(downloader);
    let store = Arc::new(MemoryStore::new());
    let stats = Arc::new(MemoryStatsCollector::new());
    let pipeline = FilesPipeline::builder(downloader.clone())
        .class(class)
        .settings(settings)
        .store(store.clone())
        .stats(stats.clone())
        .retry(fast_retry())
        .build()
        .unwrap();
    pipeline.open_spider();
    Harness {
        pipeline: Arc::new(pipeline),
        downloader,
        store,
        stats,
    }
}
