//! On-disk cache of downloaded module files.
//!
//! Remote track content is immutable, so blobs never expire. Each blob is
//! stored under a key chosen by its catalog (`zxart.ee/12345`), which maps
//! directly to a relative path under the cache directory.
//!
//! Payloads smaller than [`DEFAULT_MIN_CACHED_SIZE`] are not persisted:
//! remote archives answer missing files with tiny placeholder pages and
//! those must not shadow a later successful download.

use std::fs;
use std::io::Write;
use std::path::{Component, Path, PathBuf};

use tempfile::NamedTempFile;
use tracing::{debug, info, warn};
use url::Url;

use crate::remote::{HttpClient, RemoteError};
use crate::vfs::{VfsError, VfsResult};

/// Smallest payload written to the cache, in bytes.
pub const DEFAULT_MIN_CACHED_SIZE: usize = 256;

/// Result of clearing the cache.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ClearResult {
    pub files_deleted: u64,
    pub bytes_freed: u64,
}

/// Content-addressed file cache.
#[derive(Debug, Clone)]
pub struct BlobCache {
    root: PathBuf,
    min_size: usize,
}

impl BlobCache {
    /// Creates a cache rooted at `root` (created lazily).
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            min_size: DEFAULT_MIN_CACHED_SIZE,
        }
    }

    /// Sets the minimum persisted payload size.
    pub fn with_min_size(mut self, min_size: usize) -> Self {
        self.min_size = min_size;
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Filesystem path of `key`, `None` for keys escaping the cache root.
    pub fn path_for(&self, key: &str) -> Option<PathBuf> {
        let relative = Path::new(key);
        let safe = relative
            .components()
            .all(|c| matches!(c, Component::Normal(_)));
        if key.is_empty() || !safe {
            return None;
        }
        Some(self.root.join(relative))
    }

    /// Returns true if `key` is cached.
    pub fn contains(&self, key: &str) -> bool {
        self.path_for(key).is_some_and(|path| path.is_file())
    }

    /// Cached content of `key`.
    pub fn get(&self, key: &str) -> Option<Vec<u8>> {
        let path = self.path_for(key)?;
        match fs::read(&path) {
            Ok(data) => Some(data),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => None,
            Err(e) => {
                warn!(key = %key, error = %e, "Failed to read cached blob");
                None
            }
        }
    }

    /// Stores `data` under `key`. Returns false if the payload was too small.
    pub fn put(&self, key: &str, data: &[u8]) -> VfsResult<bool> {
        if data.len() < self.min_size {
            debug!(key = %key, size = data.len(), "Payload below cache threshold");
            return Ok(false);
        }
        let path = self
            .path_for(key)
            .ok_or_else(|| VfsError::Fatal(format!("invalid cache key '{}'", key)))?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        // Each writer gets its own sibling, renamed into place when complete
        let dir = path.parent().unwrap_or(&self.root);
        let mut tmp = NamedTempFile::new_in(dir)?;
        tmp.write_all(data)?;
        tmp.as_file().sync_all()?;
        tmp.persist(&path).map_err(|e| e.error)?;
        debug!(key = %key, size = data.len(), "Cached blob");
        Ok(true)
    }

    /// Content of `key`, downloading it from the first working URI on a miss.
    pub fn fetch(&self, key: &str, uris: &[Url], http: &dyn HttpClient) -> VfsResult<Vec<u8>> {
        if let Some(data) = self.get(key) {
            debug!(key = %key, "Blob cache hit");
            return Ok(data);
        }
        let mut last_error = RemoteError::Http(format!("no download location for '{}'", key));
        for uri in uris {
            match http.get(uri.as_str()) {
                Ok(data) => {
                    if let Err(e) = self.put(key, &data) {
                        warn!(key = %key, error = %e, "Failed to cache blob");
                    }
                    return Ok(data);
                }
                Err(e) => {
                    debug!(uri = %uri, error = %e, "Download failed, trying next location");
                    last_error = e;
                }
            }
        }
        Err(last_error.into())
    }

    /// Number of cached files and their total size.
    pub fn stats(&self) -> VfsResult<(u64, u64)> {
        let mut files = 0;
        let mut bytes = 0;
        walk(&self.root, &mut |path| {
            files += 1;
            bytes += fs::metadata(path).map(|m| m.len()).unwrap_or(0);
        })?;
        Ok((files, bytes))
    }

    /// Deletes every cached file.
    pub fn clear(&self) -> VfsResult<ClearResult> {
        let mut result = ClearResult::default();
        walk(&self.root, &mut |path| {
            let size = fs::metadata(path).map(|m| m.len()).unwrap_or(0);
            match fs::remove_file(path) {
                Ok(()) => {
                    result.files_deleted += 1;
                    result.bytes_freed += size;
                }
                Err(e) => warn!(path = %path.display(), error = %e, "Failed to delete"),
            }
        })?;
        info!(
            files = result.files_deleted,
            bytes = result.bytes_freed,
            "Cleared blob cache"
        );
        Ok(result)
    }
}

fn walk(dir: &Path, on_file: &mut dyn FnMut(&Path)) -> VfsResult<()> {
    let entries = match fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(()),
        Err(e) => return Err(e.into()),
    };
    for entry in entries {
        let path = entry?.path();
        if path.is_dir() {
            walk(&path, on_file)?;
        } else {
            on_file(&path);
        }
    }
    Ok(())
}
