//! # media-pipeline
//!
//! The files stage of a web crawler: takes items that carry lists of file
//! URLs, downloads each file once, keeps stored copies fresh, checksums what it
//! stores and writes the results back into the item.
//!
//! ## Design
//!
//! - **Pluggable storage** - local filesystem, S3, Google Cloud Storage and FTP
//!   behind one [`FilesStore`] trait, chosen by the `FILES_STORE` URI scheme
//! - **Layered configuration** - class-prefixed settings, plain settings, class
//!   attributes and built-in defaults, resolved once into [`PipelineConfig`]
//! - **Failure isolation** - a failed file is logged, counted and dropped; the
//!   item still moves on
//! - **Library-first** - emits `tracing` events, installs no subscriber
//!
//! ## Quick Start
//!
//! ```no_run
//! use media_pipeline::{FilesPipeline, HttpDownloader, Settings};
//! use serde_json::{Map, Value, json};
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let settings = Settings::new().with("FILES_STORE", "/var/lib/crawler/files");
//!     let pipeline = FilesPipeline::from_settings(&settings, Arc::new(HttpDownloader::new()?))?;
//!
//!     let mut item = Map::new();
//!     item.insert("file_urls".into(), json!(["https://example.com/report.pdf"]));
//!
//!     pipeline.open_spider();
//!     let item = pipeline.process_item(item).await?;
//!     println!("{}", Value::Object(item));
//!     pipeline.close_spider();
//!
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::unwrap_used)]
#![warn(clippy::expect_used)]

use std::sync::Arc;

/// Configuration types and settings resolution
pub mod config;
/// Downloader trait and the reqwest implementation
pub mod downloader;
/// Error types
pub mod error;
/// Store keys and request fingerprints
pub mod fingerprint;
/// Item field access
pub mod item;
/// Extension and MIME type table
pub mod media_types;
/// The files pipeline
pub mod pipeline;
/// Retry logic with exponential backoff
pub mod retry;
/// Counters
pub mod stats;
/// Storage backends
pub mod store;
/// Core types
pub mod types;

// Re-export commonly used types
pub use config::{PipelineClass, PipelineConfig, RetryConfig, Settings};
pub use downloader::{Downloader, HttpDownloader};
pub use error::{Error, FetchError, FileError, Result, StoreError};
pub use fingerprint::{DefaultFilePath, FilePathStrategy, RequestFingerprinter};
pub use item::{ItemAdapter, SchemaItem, SerdeItem};
pub use pipeline::{FileOutcome, FilesPipeline, FilesPipelineBuilder, Freshness, ItemPipeline};
pub use stats::{MemoryStatsCollector, StatsCollector};
pub use store::{
    FilesStore, FsFilesStore, FtpFilesStore, GcsFilesStore, S3FilesStore, StoreRegistry,
};
pub use types::{FileStatus, MediaRequest, ResultRecord, Response, StoredFileMetadata};

/// Close the pipeline's spider session once a termination signal arrives
///
/// In-flight files resolve as cancelled; stores never expose partial writes.
///
/// # Example
///
/// ```no_run
/// use media_pipeline::{FilesPipeline, HttpDownloader, Settings, close_on_shutdown};
/// use std::sync::Arc;
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let settings = Settings::new().with("FILES_STORE", "/tmp/files");
///     let pipeline = Arc::new(FilesPipeline::from_settings(
///         &settings,
///         Arc::new(HttpDownloader::new()?),
///     )?);
///     pipeline.open_spider();
///     tokio::spawn(close_on_shutdown(pipeline.clone()));
///     Ok(())
/// }
/// ```
pub async fn close_on_shutdown(pipeline: Arc<FilesPipeline>) {
    close_on(pipeline, termination_signal()).await;
}

/// Close the pipeline's spider session once `shutdown` resolves
///
/// Lets embedders drive the close from their own shutdown source, such as a
/// oneshot channel or a parent task's cancellation token.
pub async fn close_on<F>(pipeline: Arc<FilesPipeline>, shutdown: F)
where
    F: std::future::Future<Output = ()>,
{
    shutdown.await;
    tracing::info!("Shutdown requested, closing files pipeline");
    pipeline.close_spider();
}

/// Resolves on SIGTERM or Ctrl+C
///
/// A source that cannot be registered never fires, so the other one still
/// works in restricted environments.
async fn termination_signal() {
    let interrupt = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::warn!(error = %e, "Ctrl+C handler unavailable");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{SignalKind, signal};
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::warn!(error = %e, "SIGTERM handler unavailable");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = interrupt => tracing::debug!("Received Ctrl+C"),
        _ = terminate => tracing::debug!("Received SIGTERM"),
    }
}
