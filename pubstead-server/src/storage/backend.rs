//! The narrow key-value interface the stores are written against.

use std::collections::BTreeMap;

use async_trait::async_trait;
use bytes::Bytes;
use tokio::sync::RwLock;

use crate::error::RegistryResult;

/// Ordered key-value engine.
///
/// Keys are `/`-separated paths. A `put` must replace the value for its key
/// atomically: readers see either the old bytes or the new ones.
#[async_trait]
pub trait KvBackend: Send + Sync {
    /// Read a key. Absence is `Ok(None)`, never an error.
    async fn get(&self, key: &str) -> RegistryResult<Option<Bytes>>;

    async fn put(&self, key: &str, value: Bytes) -> RegistryResult<()>;

    /// Remove a key, returning whether it existed.
    async fn delete(&self, key: &str) -> RegistryResult<bool>;

    /// Whether a key is present, without reading its value.
    async fn exists(&self, key: &str) -> RegistryResult<bool>;

    /// Every key that starts with `prefix`, sorted. Values are not read.
    async fn list_keys(&self, prefix: &str) -> RegistryResult<Vec<String>>;

    /// Every entry whose key starts with `prefix`, sorted by key.
    async fn scan_prefix(&self, prefix: &str) -> RegistryResult<Vec<(String, Bytes)>>;

    /// Short label for status output.
    fn kind(&self) -> &'static str;
}

/// In-process backend used when nothing should outlive the server.
#[derive(Default)]
pub struct MemoryBackend {
    entries: RwLock<BTreeMap<String, Bytes>>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl KvBackend for MemoryBackend {
    async fn get(&self, key: &str) -> RegistryResult<Option<Bytes>> {
        Ok(self.entries.read().await.get(key).cloned())
    }

    async fn put(&self, key: &str, value: Bytes) -> RegistryResult<()> {
        self.entries.write().await.insert(key.to_string(), value);
        Ok(())
    }

    async fn delete(&self, key: &str) -> RegistryResult<bool> {
        Ok(self.entries.write().await.remove(key).is_some())
    }

    async fn exists(&self, key: &str) -> RegistryResult<bool> {
        Ok(self.entries.read().await.contains_key(key))
    }

    async fn list_keys(&self, prefix: &str) -> RegistryResult<Vec<String>> {
        let entries = self.entries.read().await;
        Ok(entries
            .range(prefix.to_string()..)
            .map(|(key, _)| key)
            .take_while(|key| key.starts_with(prefix))
            .cloned()
            .collect())
    }

    async fn scan_prefix(&self, prefix: &str) -> RegistryResult<Vec<(String, Bytes)>> {
        let entries = self.entries.read().await;
        Ok(entries
            .range(prefix.to_string()..)
            .take_while(|(key, _)| key.starts_with(prefix))
            .map(|(key, value)| (key.clone(), value.clone()))
            .collect())
    }

    fn kind(&self) -> &'static str {
        "memory"
    }
}
