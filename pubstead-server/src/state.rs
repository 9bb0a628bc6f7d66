//! # Application State
//!
//! Shared state handed to every request handler behind an `Arc`. It owns the
//! storage handles, so nothing in the request path reaches for global state.

use std::sync::Arc;

use serde::Serialize;

use crate::config::{Config, StorageBackendKind};
use crate::error::AppResult;
use crate::identity::{self, IdentityResolver};
use crate::resolution::ResolutionPolicy;
use crate::storage::{ArtifactStore, FsBackend, KvBackend, MemoryBackend, PackageStore};
use crate::upload::UploadPipeline;
use crate::upstream::UpstreamClient;

pub struct AppState {
    pub config: Arc<Config>,
    /// Base URL used when generating links (scheme://host:port).
    pub server_addr: String,
    pub backend: Arc<dyn KvBackend>,
    pub packages: Arc<PackageStore>,
    pub artifacts: Arc<ArtifactStore>,
    pub uploads: UploadPipeline,
    pub identity: Arc<dyn IdentityResolver>,
    pub resolution: ResolutionPolicy,
    pub upstream: UpstreamClient,
}

impl AppState {
    /// Build state over an explicit backend.
    pub fn with_backend(config: Config, backend: Arc<dyn KvBackend>) -> AppResult<Self> {
        let packages = Arc::new(PackageStore::new(Arc::clone(&backend)));
        let artifacts = Arc::new(ArtifactStore::new(Arc::clone(&backend)));
        let uploads = UploadPipeline::new(
            Arc::clone(&packages),
            Arc::clone(&artifacts),
            config.limits.max_upload_size,
        );

        Ok(Self {
            server_addr: config.public_url(),
            identity: identity::from_config(&config.security),
            resolution: ResolutionPolicy::from_config(&config),
            upstream: UpstreamClient::new(&config.upstream)?,
            config: Arc::new(config),
            backend,
            packages,
            artifacts,
            uploads,
        })
    }

    /// Build state with the backend the configuration selects.
    pub fn from_config(config: Config) -> AppResult<Self> {
        let backend: Arc<dyn KvBackend> = match config.storage.backend {
            StorageBackendKind::Memory => Arc::new(MemoryBackend::new()),
            StorageBackendKind::Disk => {
                std::fs::create_dir_all(&config.storage.data_dir)?;
                Arc::new(FsBackend::new(config.storage.data_dir.clone()))
            }
        };
        Self::with_backend(config, backend)
    }

    /// Public URL of an archive.
    pub fn archive_url(&self, name: &str, version: &str) -> String {
        format!("{}/packages/{name}/versions/{version}.tar.gz", self.server_addr)
    }
}

/// Body of the upload-finish acknowledgement: `{"success": {"message": ...}}`.
#[derive(Serialize)]
pub struct SuccessResponse {
    pub success: SuccessMessage,
}

#[derive(Serialize)]
pub struct SuccessMessage {
    pub message: String,
}

impl SuccessResponse {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            success: SuccessMessage {
                message: message.into(),
            },
        }
    }
}
