//! A single published release of a package.

use std::cmp::Ordering;

use chrono::{DateTime, SubsecRound, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{RegistryError, RegistryResult};
use crate::model::manifest::{self, Manifest};

/// Current time truncated to millisecond precision, the resolution timestamps are stored at.
pub fn now_millis() -> DateTime<Utc> {
    Utc::now().trunc_subsecs(3)
}

/// Compare two version strings by semantic-version precedence.
///
/// Build metadata is ignored, so `1.0.0+a` and `1.0.0+b` compare equal.
/// Strings that are not valid semantic versions yield an error.
pub fn compare_versions(a: &str, b: &str) -> Result<Ordering, semver::Error> {
    let a = semver::Version::parse(a.trim())?;
    let b = semver::Version::parse(b.trim())?;
    Ok(precedence(&a, &b))
}

pub(crate) fn precedence(a: &semver::Version, b: &semver::Version) -> Ordering {
    (a.major, a.minor, a.patch)
        .cmp(&(b.major, b.minor, b.patch))
        .then_with(|| match (a.pre.is_empty(), b.pre.is_empty()) {
            (true, true) => Ordering::Equal,
            // A pre-release sorts before its release.
            (true, false) => Ordering::Greater,
            (false, true) => Ordering::Less,
            (false, false) => a.pre.cmp(&b.pre),
        })
}

/// One immutable version of a package.
///
/// Fields are private: a `Version` is only produced from a manifest that
/// parsed successfully and carried a valid semantic version, and is never
/// changed once it has been added to a [`Package`](crate::model::Package).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Version {
    version: String,
    pubspec_yaml: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    readme: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    changelog: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    uploader: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    archive_sha256: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl Version {
    /// Build a version from raw `pubspec.yaml` text.
    pub fn new(pubspec_yaml: impl Into<String>) -> RegistryResult<Self> {
        let pubspec_yaml = pubspec_yaml.into();
        if pubspec_yaml.trim().is_empty() {
            return Err(RegistryError::InvalidManifest(
                "pubspec.yaml is empty".to_string(),
            ));
        }
        let manifest = manifest::parse_manifest(&pubspec_yaml)?;
        Self::from_manifest(pubspec_yaml, &manifest)
    }

    /// Build a version from raw text that has already been parsed into `manifest`.
    pub fn from_manifest(pubspec_yaml: String, manifest: &Manifest) -> RegistryResult<Self> {
        if pubspec_yaml.trim().is_empty() {
            return Err(RegistryError::InvalidManifest(
                "pubspec.yaml is empty".to_string(),
            ));
        }
        manifest.semver()?;

        let now = now_millis();
        Ok(Self {
            version: manifest.version.trim().to_string(),
            pubspec_yaml,
            readme: None,
            changelog: None,
            uploader: None,
            archive_sha256: None,
            created_at: now,
            updated_at: now,
        })
    }

    pub fn with_readme(mut self, readme: Option<String>) -> Self {
        self.readme = readme;
        self
    }

    pub fn with_changelog(mut self, changelog: Option<String>) -> Self {
        self.changelog = changelog;
        self
    }

    pub fn with_uploader(mut self, uploader: impl Into<String>) -> Self {
        self.uploader = Some(uploader.into());
        self
    }

    /// Hex-encoded SHA-256 of the archive this version was published from.
    pub fn with_archive_sha256(mut self, digest: impl Into<String>) -> Self {
        self.archive_sha256 = Some(digest.into());
        self
    }

    pub fn version(&self) -> &str {
        &self.version
    }

    pub fn pubspec_yaml(&self) -> &str {
        &self.pubspec_yaml
    }

    pub fn readme(&self) -> Option<&str> {
        self.readme.as_deref()
    }

    pub fn changelog(&self) -> Option<&str> {
        self.changelog.as_deref()
    }

    pub fn uploader(&self) -> Option<&str> {
        self.uploader.as_deref()
    }

    pub fn archive_sha256(&self) -> Option<&str> {
        self.archive_sha256.as_deref()
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }

    /// Re-parse the stored manifest text.
    pub fn manifest(&self) -> RegistryResult<Manifest> {
        Ok(manifest::parse_manifest(&self.pubspec_yaml)?)
    }

    /// Stored manifest rendered as a JSON object.
    pub fn pubspec_json(&self) -> RegistryResult<serde_json::Value> {
        Ok(manifest::manifest_to_json(&self.pubspec_yaml)?)
    }

    pub(crate) fn semver(&self) -> RegistryResult<semver::Version> {
        semver::Version::parse(&self.version).map_err(|e| {
            RegistryError::InvalidManifest(format!("version `{}`: {e}", self.version))
        })
    }
}
