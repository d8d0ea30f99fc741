//! In-memory cache store.

use super::{CacheStore, CachedResult};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::HashMap;

/// In-process cache store. Entries are lost when the process exits.
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: Mutex<HashMap<String, CachedResult>>,
}

impl MemoryStore {
    /// Creates a new empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the number of entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    /// Returns true if the store is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }
}

#[async_trait]
impl CacheStore for MemoryStore {
    async fn exists(&self, key: &str) -> bool {
        self.entries.lock().contains_key(key)
    }

    async fn read(&self, key: &str) -> Option<CachedResult> {
        self.entries.lock().get(key).cloned()
    }

    async fn write(&self, key: &str, entry: CachedResult) {
        self.entries.lock().insert(key.to_string(), entry);
    }

    async fn delete(&self, key: &str) {
        self.entries.lock().remove(key);
    }

    async fn clear(&self) {
        self.entries.lock().clear();
    }
}
