//! Typed view of a `pubspec.yaml`.
//!
//! Only the fields the registry consumes are modelled; the raw text is kept on
//! the [`Version`](crate::model::Version) and re-emitted verbatim (as JSON) to
//! clients through [`manifest_to_json`].

use std::collections::BTreeMap;

use serde::{Deserialize, Deserializer, Serialize};

/// Failure to read a manifest.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ManifestError {
    #[error("pubspec is not valid YAML: {0}")]
    Malformed(String),

    #[error("pubspec is missing the `{0}` field")]
    MissingField(&'static str),

    #[error("pubspec version `{version}` is not a semantic version: {reason}")]
    InvalidVersion { version: String, reason: String },
}

impl From<ManifestError> for crate::error::RegistryError {
    fn from(err: ManifestError) -> Self {
        crate::error::RegistryError::InvalidManifest(err.to_string())
    }
}

/// Structured contents of a `pubspec.yaml`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Manifest {
    #[serde(default, deserialize_with = "null_as_default")]
    pub name: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub version: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub homepage: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub repository: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub author: Option<String>,
    #[serde(
        default,
        deserialize_with = "null_as_default",
        skip_serializing_if = "Vec::is_empty"
    )]
    pub authors: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub publish_to: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub environment: Option<Environment>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub dependencies: BTreeMap<String, DependencySpec>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub dev_dependencies: BTreeMap<String, DependencySpec>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub dependency_overrides: BTreeMap<String, DependencySpec>,
}

/// SDK constraints of a package.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Environment {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sdk: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub flutter: Option<String>,
}

/// Where a dependency comes from, as written under `dependencies:`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum DependencySpec {
    /// `foo: ^1.2.0`
    Constraint(String),
    /// `flutter: { sdk: flutter }`
    Sdk {
        sdk: String,
        #[serde(default)]
        version: Option<String>,
    },
    /// `foo: { git: ... }`
    Git { git: GitSource },
    /// `foo: { path: ../foo }`
    Path { path: String },
    /// `foo: { hosted: ..., version: ^1.0.0 }`
    Hosted {
        hosted: HostedSource,
        #[serde(default)]
        version: Option<String>,
    },
    /// `foo:` with no value, meaning any version.
    Any,
    Other(serde_yaml_ng::Value),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum GitSource {
    Url(String),
    Detailed {
        url: String,
        #[serde(default, rename = "ref")]
        git_ref: Option<String>,
        #[serde(default)]
        path: Option<String>,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum HostedSource {
    Url(String),
    Detailed {
        #[serde(default)]
        name: Option<String>,
        url: String,
    },
}

fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

/// Parse manifest text, requiring non-empty `name` and `version` fields.
pub fn parse_manifest(raw: &str) -> Result<Manifest, ManifestError> {
    let manifest: Manifest =
        serde_yaml_ng::from_str(raw).map_err(|e| ManifestError::Malformed(e.to_string()))?;

    if manifest.name.trim().is_empty() {
        return Err(ManifestError::MissingField("name"));
    }
    if manifest.version.trim().is_empty() {
        return Err(ManifestError::MissingField("version"));
    }

    Ok(manifest)
}

/// Re-encode raw manifest text as a JSON object for API responses.
pub fn manifest_to_json(raw: &str) -> Result<serde_json::Value, ManifestError> {
    serde_yaml_ng::from_str(raw).map_err(|e| ManifestError::Malformed(e.to_string()))
}

impl Manifest {
    /// The manifest's version as a semantic version.
    pub fn semver(&self) -> Result<semver::Version, ManifestError> {
        semver::Version::parse(self.version.trim()).map_err(|e| ManifestError::InvalidVersion {
            version: self.version.clone(),
            reason: e.to_string(),
        })
    }

    /// `publish_to: none` marks a package that must never reach the public registry.
    pub fn is_private(&self) -> bool {
        self.publish_to.as_deref() == Some("none")
    }

    /// Names of regular dependencies, sorted.
    pub fn dependency_names(&self) -> Vec<String> {
        self.dependencies.keys().cloned().collect()
    }

    pub fn depends_on(&self, name: &str) -> bool {
        self.dependencies.contains_key(name)
    }

    /// `author` followed by any `authors` entries, without duplicates.
    pub fn all_authors(&self) -> Vec<String> {
        let mut authors: Vec<String> = Vec::new();
        for author in self.author.iter().chain(self.authors.iter()) {
            if !author.is_empty() && !authors.contains(author) {
                authors.push(author.clone());
            }
        }
        authors
    }
}
