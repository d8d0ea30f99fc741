//! Durable result cache: pluggable storage of prior step outcomes.
//!
//! Only successful and skipped outcomes are ever persisted. A cache
//! entry is keyed by the step's `cache_key` function when one is
//! configured, and by the step name otherwise. Stores are borrowed
//! across runs and must tolerate concurrent access to distinct keys
//! within a run.

mod file;
mod memory;

pub use file::FileStore;
pub use memory::MemoryStore;

use crate::core::StepStatus;
use crate::errors::FlowdagError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt::Debug;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Schema version stamped into every persisted entry. Entries carrying
/// a different version read as misses.
pub const CACHE_SCHEMA_VERSION: u32 = 1;

/// A cached step outcome.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CachedResult {
    /// Entry schema version; mismatches fail closed.
    pub version: u32,
    /// The step output. `Null` for skipped entries.
    pub output: Value,
    /// The terminal status the entry materializes.
    pub status: StepStatus,
    /// Whether the entry records a skip decision rather than an output.
    pub skipped: bool,
}

impl CachedResult {
    /// Creates an entry recording a successful output.
    #[must_use]
    pub fn success(output: Value) -> Self {
        Self {
            version: CACHE_SCHEMA_VERSION,
            output,
            status: StepStatus::Success,
            skipped: false,
        }
    }

    /// Creates an entry recording a skip decision.
    #[must_use]
    pub fn skipped() -> Self {
        Self {
            version: CACHE_SCHEMA_VERSION,
            output: Value::Null,
            status: StepStatus::Skipped,
            skipped: true,
        }
    }

    /// Returns true if the entry was written by this schema version.
    #[must_use]
    pub fn is_current(&self) -> bool {
        self.version == CACHE_SCHEMA_VERSION
    }
}

/// Pluggable storage backend for cached step outcomes.
///
/// Writes are best-effort: backends log and swallow storage failures,
/// since the next run simply recomputes the value.
#[async_trait]
pub trait CacheStore: Send + Sync + Debug {
    /// Returns true if an entry exists for the key, even one holding a
    /// null output.
    async fn exists(&self, key: &str) -> bool;

    /// Reads the entry for a key. Missing or unreadable entries read
    /// as `None`.
    async fn read(&self, key: &str) -> Option<CachedResult>;

    /// Writes an entry under a key, replacing any previous value.
    async fn write(&self, key: &str, entry: CachedResult);

    /// Deletes the entry for a key; missing keys are a no-op.
    async fn delete(&self, key: &str);

    /// Removes every entry managed by this store.
    async fn clear(&self);
}

/// Cache selection for a pipeline run.
#[derive(Debug, Clone, Default)]
pub enum CacheChoice {
    /// No caching for the run.
    #[default]
    Disabled,
    /// A [`FileStore`] rooted at the given directory.
    Dir(PathBuf),
    /// An explicit store instance, shared across runs.
    Store(Arc<dyn CacheStore>),
}

impl CacheChoice {
    /// Resolves the choice into a concrete store, if any.
    ///
    /// # Errors
    ///
    /// Returns [`FlowdagError::Io`] if a directory-backed store cannot
    /// be constructed.
    pub fn resolve(&self) -> Result<Option<Arc<dyn CacheStore>>, FlowdagError> {
        match self {
            Self::Disabled => Ok(None),
            Self::Dir(path) => Ok(Some(Arc::new(FileStore::new(path)?))),
            Self::Store(store) => Ok(Some(Arc::clone(store))),
        }
    }
}

impl From<PathBuf> for CacheChoice {
    fn from(path: PathBuf) -> Self {
        Self::Dir(path)
    }
}

impl From<&Path> for CacheChoice {
    fn from(path: &Path) -> Self {
        Self::Dir(path.to_path_buf())
    }
}

impl From<Arc<dyn CacheStore>> for CacheChoice {
    fn from(store: Arc<dyn CacheStore>) -> Self {
        Self::Store(store)
    }
}
