//! One file per key below a root directory.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use bytes::Bytes;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::{debug, warn};

use super::backend::KvBackend;
use crate::error::{RegistryError, RegistryResult};
use crate::validation::validate_key_segment;

/// Filesystem-backed [`KvBackend`].
///
/// A key such as `archives/http/1.2.0` maps to `<root>/archives/http/1.2.0`.
/// Every segment is validated so a key can never escape `root`. Writes land in
/// a hidden temporary sibling first and are renamed into place, which makes
/// each `put` atomic on POSIX filesystems.
pub struct FsBackend {
    root: PathBuf,
}

impl FsBackend {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn key_to_path(&self, key: &str) -> RegistryResult<PathBuf> {
        let mut path = self.root.clone();
        for segment in key.split('/') {
            validate_key_segment(segment)?;
            path.push(segment);
        }
        Ok(path)
    }

    /// Keys and paths of every file whose key starts with `prefix`, sorted.
    async fn files_under(&self, prefix: &str) -> RegistryResult<Vec<(String, PathBuf)>> {
        let start = match prefix.rsplit_once('/') {
            Some((dir, _)) if !dir.is_empty() => self.key_to_path(dir)?,
            _ => self.root.clone(),
        };

        let mut files = Vec::new();
        self.collect_files(start, &mut files).await?;
        files.retain(|(key, _)| key.starts_with(prefix));
        files.sort_by(|(a, _), (b, _)| a.cmp(b));
        Ok(files)
    }

    async fn collect_files(&self, dir: PathBuf, out: &mut Vec<(String, PathBuf)>) -> RegistryResult<()> {
        let mut pending = vec![dir];
        while let Some(dir) = pending.pop() {
            let mut entries = match fs::read_dir(&dir).await {
                Ok(entries) => entries,
                Err(e) if e.kind() == ErrorKind::NotFound => continue,
                Err(e) => return Err(RegistryError::storage(dir.display(), e)),
            };

            while let Some(entry) = entries
                .next_entry()
                .await
                .map_err(|e| RegistryError::storage(dir.display(), e))?
            {
                let file_name = entry.file_name();
                let Some(file_name) = file_name.to_str() else {
                    warn!(path = %entry.path().display(), "Skipping non UTF-8 path");
                    continue;
                };
                if file_name.starts_with('.') {
                    continue;
                }

                let path = entry.path();
                let file_type = entry
                    .file_type()
                    .await
                    .map_err(|e| RegistryError::storage(path.display(), e))?;
                if file_type.is_dir() {
                    pending.push(path);
                } else if file_type.is_file() {
                    let Ok(relative) = path.strip_prefix(&self.root) else {
                        continue;
                    };
                    let key = relative
                        .components()
                        .map(|c| c.as_os_str().to_string_lossy())
                        .collect::<Vec<_>>()
                        .join("/");
                    out.push((key, path));
                }
            }
        }
        Ok(())
    }
}

#[async_trait]
impl KvBackend for FsBackend {
    async fn get(&self, key: &str) -> RegistryResult<Option<Bytes>> {
        let path = self.key_to_path(key)?;
        match fs::read(&path).await {
            Ok(content) => Ok(Some(Bytes::from(content))),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(RegistryError::storage(format!("read {key}"), e)),
        }
    }

    async fn put(&self, key: &str, value: Bytes) -> RegistryResult<()> {
        let path = self.key_to_path(key)?;
        let (Some(parent), Some(file_name)) = (path.parent(), path.file_name()) else {
            return Err(RegistryError::InvalidInput(format!("invalid key: {key}")));
        };

        fs::create_dir_all(parent)
            .await
            .map_err(|e| RegistryError::storage(parent.display(), e))?;

        let tmp = parent.join(format!(
            ".{}.{}.tmp",
            file_name.to_string_lossy(),
            uuid::Uuid::new_v4()
        ));
        let write = async {
            let mut file = fs::File::create(&tmp).await?;
            file.write_all(&value).await?;
            file.sync_all().await?;
            fs::rename(&tmp, &path).await
        };
        if let Err(e) = write.await {
            let _ = fs::remove_file(&tmp).await;
            return Err(RegistryError::storage(format!("write {key}"), e));
        }

        debug!(key = %key, size = value.len(), "Stored key");
        Ok(())
    }

    async fn delete(&self, key: &str) -> RegistryResult<bool> {
        let path = self.key_to_path(key)?;
        match fs::remove_file(&path).await {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
            Err(e) => Err(RegistryError::storage(format!("delete {key}"), e)),
        }
    }

    async fn exists(&self, key: &str) -> RegistryResult<bool> {
        let path = self.key_to_path(key)?;
        match fs::metadata(&path).await {
            Ok(meta) => Ok(meta.is_file()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
            Err(e) => Err(RegistryError::storage(format!("stat {key}"), e)),
        }
    }

    async fn list_keys(&self, prefix: &str) -> RegistryResult<Vec<String>> {
        Ok(self
            .files_under(prefix)
            .await?
            .into_iter()
            .map(|(key, _)| key)
            .collect())
    }

    async fn scan_prefix(&self, prefix: &str) -> RegistryResult<Vec<(String, Bytes)>> {
        let files = self.files_under(prefix).await?;
        let mut entries = Vec::with_capacity(files.len());
        for (key, path) in files {
            match fs::read(&path).await {
                Ok(content) => entries.push((key, Bytes::from(content))),
                // Deleted between listing and reading.
                Err(e) if e.kind() == ErrorKind::NotFound => continue,
                Err(e) => return Err(RegistryError::storage(format!("read {key}"), e)),
            }
        }
        Ok(entries)
    }

    fn kind(&self) -> &'static str {
        "disk"
    }
}
