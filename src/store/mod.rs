//! Storage backends for downloaded files
//!
//! Every backend implements [`FilesStore`]: `stat_file` reports what is already
//! stored under a key, `persist_file` writes bytes under a key. Backends are
//! selected from the `FILES_STORE` URI by scheme through a [`StoreRegistry`].
//!
//! | Scheme | Backend |
//! |---|---|
//! | none, `file` | [`FsFilesStore`] |
//! | `s3` | [`S3FilesStore`] |
//! | `gs` | [`GcsFilesStore`] |
//! | `ftp` | [`FtpFilesStore`] |

use async_trait::async_trait;
use bytes::Bytes;
use std::collections::HashMap;
use std::sync::Arc;

use crate::config::{Settings, keys};
use crate::error::{Error, Result, StoreError};
use crate::types::StoredFileMetadata;

mod filesystem;
mod ftp;
#[cfg(test)]
mod ftp_server;
mod gcs;
mod s3;
mod sigv4;

pub use filesystem::FsFilesStore;
pub use ftp::FtpFilesStore;
pub use gcs::GcsFilesStore;
pub use s3::S3FilesStore;

/// Persistence backend for downloaded files
///
/// Implementations must be safe for concurrent use. A missing object is
/// `Ok(None)` from `stat_file`, never an error. Backends do not retry.
#[async_trait]
pub trait FilesStore: Send + Sync {
    /// Short backend name used in logs
    fn name(&self) -> &'static str;

    /// Checksum and modification time of the object stored under `path`
    async fn stat_file(&self, path: &str) -> std::result::Result<Option<StoredFileMetadata>, StoreError>;

    /// Store `data` under `path`, replacing any previous object
    ///
    /// `meta` is attached as object metadata where the backend supports it;
    /// `headers` carries optional HTTP-style headers such as `Content-Type`.
    async fn persist_file(
        &self,
        path: &str,
        data: Bytes,
        meta: &HashMap<String, String>,
        headers: Option<&HashMap<String, String>>,
    ) -> std::result::Result<(), StoreError>;
}

/// Builds a store from its URI and the settings
pub type StoreFactory = fn(&str, &Settings) -> Result<Arc<dyn FilesStore>>;

/// Scheme -> backend constructor table
#[derive(Clone)]
pub struct StoreRegistry {
    factories: HashMap<String, StoreFactory>,
}

impl std::fmt::Debug for StoreRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut schemes: Vec<_> = self.factories.keys().collect();
        schemes.sort();
        f.debug_struct("StoreRegistry").field("schemes", &schemes).finish()
    }
}

impl Default for StoreRegistry {
    fn default() -> Self {
        let mut registry = Self::empty();
        registry
            .register("", |uri, _| Ok(Arc::new(FsFilesStore::new(uri))))
            .register("file", |uri, _| Ok(Arc::new(FsFilesStore::new(uri))))
            .register("s3", |uri, settings| {
                Ok(Arc::new(S3FilesStore::from_settings(uri, settings)?))
            })
            .register("gs", |uri, settings| {
                Ok(Arc::new(GcsFilesStore::from_settings(uri, settings)?))
            })
            .register("ftp", |uri, settings| {
                Ok(Arc::new(FtpFilesStore::from_settings(uri, settings)?))
            });
        registry
    }
}

impl StoreRegistry {
    /// A registry with no schemes
    pub fn empty() -> Self {
        Self {
            factories: HashMap::new(),
        }
    }

    /// Register (or replace) the constructor for `scheme`
    pub fn register(&mut self, scheme: &str, factory: StoreFactory) -> &mut Self {
        self.factories.insert(scheme.to_ascii_lowercase(), factory);
        self
    }

    /// Whether `scheme` has a constructor
    pub fn supports(&self, scheme: &str) -> bool {
        self.factories.contains_key(&scheme.to_ascii_lowercase())
    }

    /// Build the store for `uri`
    pub fn open(&self, uri: &str, settings: &Settings) -> Result<Arc<dyn FilesStore>> {
        let scheme = store_scheme(uri);
        let factory = self.factories.get(&scheme).ok_or_else(|| {
            Error::config(
                keys::FILES_STORE,
                format!("unsupported store scheme '{scheme}' in {uri}"),
            )
        })?;
        let store = factory(uri, settings)?;
        tracing::info!(backend = store.name(), uri = %redact(uri), "Created files store");
        Ok(store)
    }

    /// Build the store named by the `FILES_STORE` setting
    pub fn from_settings(&self, settings: &Settings) -> Result<Arc<dyn FilesStore>> {
        let uri = settings
            .get_str(keys::FILES_STORE)?
            .filter(|uri| !uri.trim().is_empty())
            .ok_or_else(|| Error::NotConfigured("FILES_STORE setting is missing".into()))?;
        self.open(&uri, settings)
    }
}

/// Whether `uri` is a plain filesystem path rather than a URI
///
/// Absolute and relative POSIX paths, `~` paths, Windows drive paths and UNC
/// paths all qualify.
pub fn is_filesystem_path(uri: &str) -> bool {
    let bytes = uri.as_bytes();
    if uri.starts_with('/')
        || uri.starts_with("./")
        || uri.starts_with("../")
        || uri == "."
        || uri == ".."
        || uri == "~"
        || uri.starts_with("~/")
        || uri.starts_with("\\\\")
        || uri.starts_with(".\\")
        || uri.starts_with("..\\")
    {
        return true;
    }
    // C:\ or C:/
    bytes.len() >= 3
        && bytes[0].is_ascii_alphabetic()
        && bytes[1] == b':'
        && (bytes[2] == b'\\' || bytes[2] == b'/')
}

/// Lowercase scheme of a store URI; `"file"` for filesystem paths, `""` when
/// there is none
pub fn store_scheme(uri: &str) -> String {
    if is_filesystem_path(uri) {
        return "file".to_string();
    }
    match url::Url::parse(uri) {
        Ok(url) => url.scheme().to_ascii_lowercase(),
        Err(_) => String::new(),
    }
}

/// Hex MD5 of `data`, the checksum reported for stored files
pub fn file_checksum(data: &[u8]) -> String {
    format!("{:x}", md5::compute(data))
}

/// Path segments of a store key for backends that map keys onto directories
///
/// Empty segments collapse. `.`, `..` and segments containing a backslash are
/// rejected so a key can never leave the store's base directory.
pub(crate) fn key_segments(path: &str) -> std::result::Result<Vec<&str>, StoreError> {
    let invalid = |reason: &str| StoreError::InvalidUri {
        uri: path.to_string(),
        reason: reason.to_string(),
    };
    let segments: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();
    if segments.is_empty() {
        return Err(invalid("empty store key"));
    }
    if segments
        .iter()
        .any(|s| *s == "." || *s == ".." || s.contains('\\'))
    {
        return Err(invalid("store key must not contain relative segments"));
    }
    Ok(segments)
}

/// Split `scheme://bucket/prefix` into bucket and prefix
pub(crate) fn split_bucket_uri(uri: &str, scheme: &str) -> std::result::Result<(String, String), StoreError> {
    let invalid = |reason: &str| StoreError::InvalidUri {
        uri: uri.to_string(),
        reason: reason.to_string(),
    };
    let rest = uri
        .get(..scheme.len() + 3)
        .filter(|head| head.eq_ignore_ascii_case(&format!("{scheme}://")))
        .map(|_| &uri[scheme.len() + 3..])
        .ok_or_else(|| invalid(&format!("expected {scheme}://bucket/prefix")))?;
    let (bucket, prefix) = rest.split_once('/').unwrap_or((rest, ""));
    if bucket.is_empty() {
        return Err(invalid("missing bucket name"));
    }
    Ok((bucket.to_string(), prefix.to_string()))
}

/// Strip credentials from a URI before logging it
fn redact(uri: &str) -> String {
    match url::Url::parse(uri) {
        Ok(mut url) if url.password().is_some() => {
            let _ = url.set_password(Some("***"));
            url.to_string()
        }
        _ => uri.to_string(),
    }
}
