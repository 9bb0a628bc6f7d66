//! The package aggregate: every version of one package plus its uploaders.
//!
//! All mutation goes through the methods below, which keep `latest` equal to
//! the highest version present and reject any version that is not strictly
//! greater than it.

use std::cmp::Ordering;
use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{RegistryError, RegistryResult};
use crate::model::version::{now_millis, precedence, Version};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Package {
    name: String,
    versions: BTreeMap<String, Version>,
    latest: String,
    private: bool,
    uploaders: BTreeSet<String>,
    downloads: u64,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl Package {
    /// Create an empty package owned by `uploaders`.
    pub fn create<I, S>(name: impl Into<String>, private: bool, uploaders: I) -> RegistryResult<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let name = name.into();
        if name.trim().is_empty() {
            return Err(RegistryError::InvalidInput(
                "package name must not be empty".to_string(),
            ));
        }

        let uploaders: BTreeSet<String> = uploaders
            .into_iter()
            .map(Into::into)
            .filter(|email: &String| !email.trim().is_empty())
            .collect();
        if uploaders.is_empty() {
            return Err(RegistryError::InvalidInput(format!(
                "package {name} needs at least one uploader"
            )));
        }

        let now = now_millis();
        Ok(Self {
            name,
            versions: BTreeMap::new(),
            latest: String::new(),
            private,
            uploaders,
            downloads: 0,
            created_at: now,
            updated_at: now,
        })
    }

    /// Insert a new version, which must be strictly greater than `latest`.
    pub fn add_version(&mut self, version: Version) -> RegistryResult<()> {
        if self.versions.contains_key(version.version()) {
            return Err(RegistryError::VersionConflict {
                package: self.name.clone(),
                version: version.version().to_string(),
            });
        }

        let attempted = version.semver()?;
        if let Some(current) = self.versions.get(&self.latest) {
            if precedence(&current.semver()?, &attempted) != Ordering::Less {
                return Err(RegistryError::VersionOutOfOrder {
                    package: self.name.clone(),
                    latest: self.latest.clone(),
                    attempted: version.version().to_string(),
                });
            }
        }

        self.latest = version.version().to_string();
        self.versions.insert(self.latest.clone(), version);
        self.updated_at = now_millis();
        Ok(())
    }

    pub fn latest_version(&self) -> RegistryResult<&Version> {
        self.versions
            .get(&self.latest)
            .ok_or_else(|| RegistryError::NotFound(format!("latest version of {}", self.name)))
    }

    /// Look up a version by its exact version string.
    pub fn version(&self, version: &str) -> Option<&Version> {
        self.versions.get(version)
    }

    /// All versions, lowest first.
    pub fn versions_sorted(&self) -> Vec<&Version> {
        let mut versions: Vec<(semver::Version, &Version)> = self
            .versions
            .values()
            .filter_map(|v| v.semver().ok().map(|parsed| (parsed, v)))
            .collect();
        versions.sort_by(|(a, _), (b, _)| precedence(a, b));
        versions.into_iter().map(|(_, v)| v).collect()
    }

    pub fn add_uploader(&mut self, email: &str) -> RegistryResult<()> {
        if self.uploaders.contains(email) {
            return Err(RegistryError::AlreadyExists(email.to_string()));
        }
        self.uploaders.insert(email.to_string());
        self.updated_at = now_millis();
        Ok(())
    }

    /// Remove an uploader. The last remaining uploader cannot be removed.
    pub fn remove_uploader(&mut self, email: &str) -> RegistryResult<()> {
        if !self.uploaders.contains(email) {
            return Err(RegistryError::UploaderNotFound(email.to_string()));
        }
        if self.uploaders.len() == 1 {
            return Err(RegistryError::Forbidden(format!(
                "cannot remove {email}, the last uploader of {}",
                self.name
            )));
        }
        self.uploaders.remove(email);
        self.updated_at = now_millis();
        Ok(())
    }

    /// Count one download. Leaves `updated_at` alone, which tracks publishing activity.
    pub fn increase_downloads(&mut self) {
        self.downloads = self.downloads.saturating_add(1);
    }

    pub fn is_uploader(&self, email: &str) -> bool {
        self.uploaders.iter().any(|u| u == email)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn latest(&self) -> &str {
        &self.latest
    }

    pub fn is_private(&self) -> bool {
        self.private
    }

    pub fn uploaders(&self) -> &BTreeSet<String> {
        &self.uploaders
    }

    pub fn downloads(&self) -> u64 {
        self.downloads
    }

    pub fn version_count(&self) -> usize {
        self.versions.len()
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }
}
