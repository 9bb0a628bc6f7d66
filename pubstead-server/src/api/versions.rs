//! Package metadata and archive downloads, as consumed by `dart pub get`.

use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::{header, HeaderMap, Uri},
    response::{IntoResponse, Json, Response},
};
use serde::Serialize;
use tracing::{info, warn};

use super::{defer_upstream, request_path};
use crate::error::{AppError, AppResult, RegistryError};
use crate::model::{Package, Version};
use crate::resolution::Resolution;
use crate::state::AppState;

#[derive(Debug, Serialize)]
pub struct VersionEntry {
    pub version: String,
    pub archive_url: String,
    pub pubspec: serde_json::Value,
    pub published: chrono::DateTime<chrono::Utc>,
}

#[derive(Debug, Serialize)]
pub struct VersionListing {
    pub name: String,
    pub latest: VersionEntry,
    pub versions: Vec<VersionEntry>,
}

fn entry(state: &AppState, name: &str, version: &Version) -> AppResult<VersionEntry> {
    Ok(VersionEntry {
        version: version.version().to_string(),
        archive_url: state.archive_url(name, version.version()),
        pubspec: version.pubspec_json()?,
        published: version.created_at(),
    })
}

fn listing(state: &AppState, package: &Package) -> AppResult<VersionListing> {
    let name = package.name();
    let versions = package
        .versions_sorted()
        .into_iter()
        .map(|v| entry(state, name, v))
        .collect::<AppResult<Vec<_>>>()?;
    Ok(VersionListing {
        name: name.to_string(),
        latest: entry(state, name, package.latest_version()?)?,
        versions,
    })
}

/// `GET /api/packages/{name}`
pub async fn list_versions(
    State(state): State<Arc<AppState>>,
    Path(name): Path<String>,
    uri: Uri,
) -> AppResult<Response> {
    let local = state.packages.get(&name).await;
    match state.resolution.resolve(local, request_path(&uri))? {
        Resolution::Local(package) => Ok(Json(listing(&state, &package)?).into_response()),
        Resolution::Upstream(url) => defer_upstream(&state, url).await,
    }
}

/// `GET /api/packages/{name}/versions/{version}`
pub async fn get_version(
    State(state): State<Arc<AppState>>,
    Path((name, version)): Path<(String, String)>,
    uri: Uri,
) -> AppResult<Response> {
    let local = state.packages.get(&name).await.and_then(|package| {
        package
            .version(&version)
            .cloned()
            .ok_or_else(|| RegistryError::NotFound(format!("{name} {version}")))
    });
    match state.resolution.resolve(local, request_path(&uri))? {
        Resolution::Local(found) => Ok(Json(entry(&state, &name, &found)?).into_response()),
        Resolution::Upstream(url) => defer_upstream(&state, url).await,
    }
}

/// `GET /packages/{name}/versions/{version}.tar.gz`
pub async fn download(
    State(state): State<Arc<AppState>>,
    Path((name, archive)): Path<(String, String)>,
    headers: HeaderMap,
    uri: Uri,
) -> AppResult<Response> {
    let Some(version) = archive.strip_suffix(".tar.gz") else {
        return Err(RegistryError::NotFound(format!("archive {archive}")).into());
    };

    let local = state.packages.get(&name).await.and_then(|package| {
        if package.version(version).is_some() {
            Ok(())
        } else {
            Err(RegistryError::NotFound(format!("{name} {version}")))
        }
    });
    if let Resolution::Upstream(url) = state.resolution.resolve(local, request_path(&uri))? {
        return defer_upstream(&state, url).await;
    }

    let bytes = match state.artifacts.get(&name, version).await {
        Ok(bytes) => bytes,
        Err(RegistryError::NotFound(_)) => {
            return Err(AppError::InternalError(format!(
                "metadata for {name} {version} exists but its archive is missing"
            )));
        }
        Err(e) => return Err(e.into()),
    };

    let user_agent = headers
        .get(header::USER_AGENT)
        .and_then(|v| v.to_str().ok());
    if state.resolution.is_tool_client(user_agent) {
        if let Err(e) = count_download(&state, &name).await {
            warn!(package = %name, error = %e, "Failed to record download");
        }
    }

    info!(package = %name, version = %version, size = bytes.len(), "Serving archive");
    Ok((
        [
            (header::CONTENT_TYPE, "application/octet-stream".to_string()),
            (
                header::CONTENT_DISPOSITION,
                format!("attachment; filename=\"{name}-{version}.tar.gz\""),
            ),
        ],
        bytes,
    )
        .into_response())
}

async fn count_download(state: &AppState, name: &str) -> Result<(), RegistryError> {
    let txn = state.packages.transaction(name).await;
    let Some(mut package) = txn.load().await? else {
        return Ok(());
    };
    package.increase_downloads();
    txn.commit(&package).await
}
