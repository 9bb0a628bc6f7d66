//! JSON endpoints backing the web UI: package search and package detail.

use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    response::Json,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{AppResult, RegistryError};
use crate::model::{Manifest, Package};
use crate::state::AppState;
use crate::storage::{PackageFilter, PackageQuery, Pagination, SortOrder};

#[derive(Debug, Default, Deserialize)]
pub struct ListParams {
    pub size: Option<usize>,
    pub page: Option<usize>,
    pub sort: Option<String>,
    pub q: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct Envelope<T> {
    pub data: T,
}

#[derive(Debug, Serialize)]
pub struct PackageList {
    pub count: usize,
    pub packages: Vec<PackageSummary>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PackageSummary {
    pub name: String,
    pub description: Option<String>,
    pub tags: Vec<String>,
    pub latest: String,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VersionTimestamp {
    pub version: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PackageDetail {
    pub name: String,
    pub version: String,
    pub description: Option<String>,
    pub homepage: Option<String>,
    pub repository: Option<String>,
    pub uploaders: Vec<String>,
    pub created_at: DateTime<Utc>,
    pub readme: Option<String>,
    pub changelog: Option<String>,
    pub versions: Vec<VersionTimestamp>,
    pub authors: Vec<String>,
    pub dependencies: Vec<String>,
    pub tags: Vec<String>,
}

/// `flutter` or `dart` depending on the SDK the package builds on, plus
/// `private` for packages that may not be published publicly.
pub fn tags(package: &Package, manifest: Option<&Manifest>) -> Vec<String> {
    let mut tags = Vec::new();
    if manifest.is_some_and(|m| m.depends_on("flutter")) {
        tags.push("flutter".to_string());
    } else {
        tags.push("dart".to_string());
    }
    if package.is_private() {
        tags.push("private".to_string());
    }
    tags
}

fn summary(package: &Package) -> PackageSummary {
    let manifest = package
        .latest_version()
        .ok()
        .and_then(|v| v.manifest().ok());
    PackageSummary {
        name: package.name().to_string(),
        description: manifest.as_ref().and_then(|m| m.description.clone()),
        tags: tags(package, manifest.as_ref()),
        latest: package.latest().to_string(),
        updated_at: package.updated_at(),
    }
}

/// `GET /webapi/packages?size=&page=&sort=&q=`
pub async fn list_packages(
    State(state): State<Arc<AppState>>,
    Query(params): Query<ListParams>,
) -> AppResult<Json<Envelope<PackageList>>> {
    let query = PackageQuery {
        filter: PackageFilter::parse(params.q.as_deref()),
        sort: SortOrder::parse(params.sort.as_deref()),
    };
    let pagination = Pagination::new(params.page, params.size);
    let (packages, count) = state.packages.scan(&query, pagination).await?;

    Ok(Json(Envelope {
        data: PackageList {
            count,
            packages: packages.iter().map(summary).collect(),
        },
    }))
}

/// `GET /webapi/package/{name}/{version}`, where `version` may be `latest`.
pub async fn package_detail(
    State(state): State<Arc<AppState>>,
    Path((name, version)): Path<(String, String)>,
) -> AppResult<Json<Envelope<PackageDetail>>> {
    let package = state.packages.get(&name).await?;
    let selected = if version == "latest" {
        package.latest_version()?
    } else {
        package
            .version(&version)
            .ok_or_else(|| RegistryError::NotFound(format!("{name} {version}")))?
    };
    let manifest = selected.manifest()?;

    let versions = package
        .versions_sorted()
        .into_iter()
        .map(|v| VersionTimestamp {
            version: v.version().to_string(),
            created_at: v.created_at(),
        })
        .collect();

    Ok(Json(Envelope {
        data: PackageDetail {
            name: package.name().to_string(),
            version: selected.version().to_string(),
            description: manifest.description.clone(),
            homepage: manifest.homepage.clone(),
            repository: manifest.repository.clone(),
            uploaders: package.uploaders().iter().cloned().collect(),
            created_at: selected.created_at(),
            readme: selected.readme().map(str::to_string),
            changelog: selected.changelog().map(str::to_string),
            versions,
            authors: manifest.all_authors(),
            dependencies: manifest.dependency_names(),
            tags: tags(&package, Some(&manifest)),
        },
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Version;

    #[test]
    fn test_tags() {
        let mut package = Package::create("ui_kit", true, ["a@example.com"]).unwrap();
        package
            .add_version(
                Version::new("name: ui_kit\nversion: 1.0.0\ndependencies:\n  flutter:\n    sdk: flutter\n")
                    .unwrap(),
            )
            .unwrap();
        let manifest = package.latest_version().unwrap().manifest().unwrap();
        assert_eq!(tags(&package, Some(&manifest)), vec!["flutter", "private"]);

        let plain = Package::create("cli", false, ["a@example.com"]).unwrap();
        assert_eq!(tags(&plain, None), vec!["dart"]);
    }
}
