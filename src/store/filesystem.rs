//! Local filesystem store

use async_trait::async_trait;
use bytes::Bytes;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::UNIX_EPOCH;

use super::{FilesStore, file_checksum, key_segments};
use crate::error::StoreError;
use crate::types::StoredFileMetadata;

/// Stores files under a base directory
///
/// Key `a/b/c` maps to `<basedir>/a/b/c`; keys with `.` or `..` segments are
/// rejected. Parent directories are created on demand and every write goes
/// through a temporary sibling file that is then renamed into place, so
/// readers never observe a partial file.
#[derive(Clone, Debug)]
pub struct FsFilesStore {
    basedir: PathBuf,
}

impl FsFilesStore {
    /// Store rooted at `uri` (a path, optionally prefixed with `file://`)
    pub fn new(uri: &str) -> Self {
        let basedir = uri.split_once("://").map_or(uri, |(_, rest)| rest);
        Self {
            basedir: PathBuf::from(basedir),
        }
    }

    /// Root directory
    pub fn basedir(&self) -> &Path {
        &self.basedir
    }

    fn full_path(&self, path: &str) -> Result<PathBuf, StoreError> {
        Ok(key_segments(path)?
            .into_iter()
            .fold(self.basedir.clone(), |acc, segment| acc.join(segment)))
    }
}

/// Temporary sibling of a target file, removed on drop unless it was renamed
/// into place
struct TempFile {
    path: PathBuf,
    armed: bool,
}

impl TempFile {
    fn beside(target: &Path) -> Self {
        let file_name = target
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default();
        Self {
            path: target.with_file_name(format!(
                ".{}.{:08x}.tmp",
                file_name,
                rand::random::<u32>()
            )),
            armed: true,
        }
    }

    fn rename_to(mut self, target: &Path) -> std::io::Result<()> {
        std::fs::rename(&self.path, target)?;
        self.armed = false;
        Ok(())
    }
}

impl Drop for TempFile {
    fn drop(&mut self) {
        if self.armed {
            let _ = std::fs::remove_file(&self.path);
        }
    }
}

/// Write `data` to `target` through a temporary sibling
///
/// Runs on the blocking pool as one unit: once started it finishes even if
/// the awaiting task is cancelled, and a failed write leaves no temp file.
fn write_atomically(target: &Path, data: &[u8]) -> Result<(), StoreError> {
    if let Some(parent) = target.parent() {
        std::fs::create_dir_all(parent).map_err(|e| io_error(parent, e))?;
    }
    let temp = TempFile::beside(target);
    std::fs::write(&temp.path, data).map_err(|e| io_error(&temp.path, e))?;
    temp.rename_to(target).map_err(|e| io_error(target, e))
}

fn io_error(path: &Path, source: std::io::Error) -> StoreError {
    StoreError::Io {
        path: path.display().to_string(),
        source,
    }
}

#[async_trait]
impl FilesStore for FsFilesStore {
    fn name(&self) -> &'static str {
        "filesystem"
    }

    #[tracing::instrument(skip(self), fields(basedir = %self.basedir.display()))]
    async fn stat_file(&self, path: &str) -> Result<Option<StoredFileMetadata>, StoreError> {
        let full = self.full_path(path)?;
        let metadata = match tokio::fs::metadata(&full).await {
            Ok(metadata) => metadata,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(io_error(&full, e)),
        };
        let last_modified = metadata
            .modified()
            .ok()
            .and_then(|mtime| mtime.duration_since(UNIX_EPOCH).ok())
            .map(|age| age.as_secs_f64());

        let data = match tokio::fs::read(&full).await {
            Ok(data) => data,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(io_error(&full, e)),
        };

        Ok(Some(StoredFileMetadata {
            checksum: Some(file_checksum(&data)),
            last_modified,
        }))
    }

    #[tracing::instrument(skip(self, data, _meta, _headers), fields(size = data.len()))]
    async fn persist_file(
        &self,
        path: &str,
        data: Bytes,
        _meta: &HashMap<String, String>,
        _headers: Option<&HashMap<String, String>>,
    ) -> Result<(), StoreError> {
        let full = self.full_path(path)?;
        let target = full.clone();
        let size = data.len();
        tokio::task::spawn_blocking(move || write_atomically(&target, &data))
            .await
            .map_err(|e| StoreError::Join(e.to_string()))??;

        tracing::debug!(path = %full.display(), size, "Stored file");
        Ok(())
    }
}
