//! Archive bytes keyed by `(package, version)`.

use std::sync::Arc;

use bytes::Bytes;
use tracing::info;

use super::backend::KvBackend;
use super::ARCHIVES_PREFIX;
use crate::error::{RegistryError, RegistryResult};
use crate::validation::validate_key_segment;

pub struct ArtifactStore {
    backend: Arc<dyn KvBackend>,
}

impl ArtifactStore {
    pub fn new(backend: Arc<dyn KvBackend>) -> Self {
        Self { backend }
    }

    fn key(name: &str, version: &str) -> RegistryResult<String> {
        validate_key_segment(name)?;
        validate_key_segment(version)?;
        Ok(format!("{ARCHIVES_PREFIX}{name}/{version}"))
    }

    /// Store the archive, replacing any previous bytes under the same key.
    pub async fn put(&self, name: &str, version: &str, bytes: Bytes) -> RegistryResult<()> {
        let key = Self::key(name, version)?;
        let size = bytes.len();
        self.backend.put(&key, bytes).await?;
        info!(package = %name, version = %version, size, "Stored archive");
        Ok(())
    }

    /// Read an archive. A name or version that could never have been stored
    /// is reported as [`RegistryError::NotFound`], like any other miss.
    pub async fn get(&self, name: &str, version: &str) -> RegistryResult<Bytes> {
        let missing = || RegistryError::NotFound(format!("archive {name} {version}"));
        let key = Self::key(name, version).map_err(|_| missing())?;
        self.backend.get(&key).await?.ok_or_else(missing)
    }

    pub async fn exists(&self, name: &str, version: &str) -> RegistryResult<bool> {
        match Self::key(name, version) {
            Ok(key) => self.backend.exists(&key).await,
            Err(_) => Ok(false),
        }
    }

    pub(crate) async fn count(&self) -> RegistryResult<usize> {
        Ok(self.backend.list_keys(ARCHIVES_PREFIX).await?.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::{FsBackend, MemoryBackend};
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_put_is_idempotent() {
        let store = ArtifactStore::new(Arc::new(MemoryBackend::new()));
        let bytes = Bytes::from_static(b"\x1f\x8b archive");

        store.put("http", "1.0.0", bytes.clone()).await.unwrap();
        let once = store.get("http", "1.0.0").await.unwrap();
        store.put("http", "1.0.0", bytes.clone()).await.unwrap();
        let twice = store.get("http", "1.0.0").await.unwrap();

        assert_eq!(once, bytes);
        assert_eq!(once, twice);
        assert_eq!(store.count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_missing_archive_is_not_found() {
        let dir = TempDir::new().unwrap();
        let store = ArtifactStore::new(Arc::new(FsBackend::new(dir.path())));
        assert!(store.get("http", "9.9.9").await.unwrap_err().is_not_found());
        assert!(!store.exists("http", "9.9.9").await.unwrap());

        store
            .put("http", "9.9.9", Bytes::from_static(b"x"))
            .await
            .unwrap();
        assert!(store.exists("http", "9.9.9").await.unwrap());
    }

    #[tokio::test]
    async fn test_rejects_unsafe_keys() {
        let store = ArtifactStore::new(Arc::new(MemoryBackend::new()));
        assert!(matches!(
            store.put("..", "1.0.0", Bytes::new()).await,
            Err(RegistryError::InvalidInput(_))
        ));
        assert!(store.get("http", "1.0.0/../x").await.unwrap_err().is_not_found());
        assert!(!store.exists(".hidden", "1.0.0").await.unwrap());
    }

    #[tokio::test]
    async fn test_unstorable_names_read_as_missing_on_every_backend() {
        let dir = TempDir::new().unwrap();
        for store in [
            ArtifactStore::new(Arc::new(MemoryBackend::new())),
            ArtifactStore::new(Arc::new(FsBackend::new(dir.path()))),
        ] {
            let err = store.get(".hidden_pkg", "1.0.0").await.unwrap_err();
            assert!(err.is_not_found(), "{err}");
        }
    }
}
