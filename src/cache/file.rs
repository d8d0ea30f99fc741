//! Filesystem cache store: one file per key.

use super::{CacheStore, CachedResult};
use async_trait::async_trait;
use sha2::{Digest, Sha256};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use tracing::warn;

const CACHE_SUFFIX: &str = ".cache";

/// Durable cache store backed by a directory.
///
/// Each entry lives in its own file named by the hex SHA-256 of the
/// key with a `.cache` suffix, so concurrent writes to distinct keys
/// never contend. Entries persist across processes; two processes
/// writing the same key race last-writer-wins, which is acceptable
/// because entries are recomputable outputs. A missing or unreadable
/// entry reads as a miss.
#[derive(Debug)]
pub struct FileStore {
    dir: PathBuf,
}

impl FileStore {
    /// Creates the store, creating the directory if absent.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory cannot be created.
    pub fn new(dir: impl Into<PathBuf>) -> io::Result<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir)?;
        Ok(Self { dir })
    }

    /// Returns the managed directory.
    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, key: &str) -> PathBuf {
        let digest = Sha256::digest(key.as_bytes());
        self.dir.join(format!("{}{CACHE_SUFFIX}", hex::encode(digest)))
    }
}

#[async_trait]
impl CacheStore for FileStore {
    async fn exists(&self, key: &str) -> bool {
        self.path_for(key).is_file()
    }

    async fn read(&self, key: &str) -> Option<CachedResult> {
        let path = self.path_for(key);
        let bytes = fs::read(&path).ok()?;
        match serde_json::from_slice(&bytes) {
            Ok(entry) => Some(entry),
            Err(err) => {
                // Corruption degrades to a miss; the next run recomputes.
                warn!(path = %path.display(), %err, "discarding unreadable cache entry");
                None
            }
        }
    }

    async fn write(&self, key: &str, entry: CachedResult) {
        let path = self.path_for(key);
        match serde_json::to_vec(&entry) {
            Ok(bytes) => {
                if let Err(err) = fs::write(&path, bytes) {
                    warn!(path = %path.display(), %err, "failed to write cache entry");
                }
            }
            Err(err) => {
                warn!(key, %err, "failed to serialize cache entry");
            }
        }
    }

    async fn delete(&self, key: &str) {
        let path = self.path_for(key);
        if let Err(err) = fs::remove_file(&path) {
            if err.kind() != io::ErrorKind::NotFound {
                warn!(path = %path.display(), %err, "failed to delete cache entry");
            }
        }
    }

    async fn clear(&self) {
        let entries = match fs::read_dir(&self.dir) {
            Ok(entries) => entries,
            Err(err) => {
                warn!(dir = %self.dir.display(), %err, "failed to list cache directory");
                return;
            }
        };

        for entry in entries.flatten() {
            let path = entry.path();
            let is_cache_file = path
                .file_name()
                .and_then(|name| name.to_str())
                .is_some_and(|name| name.ends_with(CACHE_SUFFIX));
            if is_cache_file {
                if let Err(err) = fs::remove_file(&path) {
                    warn!(path = %path.display(), %err, "failed to delete cache entry");
                }
            }
        }
    }
}
