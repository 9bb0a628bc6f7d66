//! Registry data model: manifests, versions and the package aggregate.

pub mod manifest;
pub mod package;
pub mod version;

pub use manifest::{parse_manifest, DependencySpec, Manifest, ManifestError};
pub use package::Package;
pub use version::{compare_versions, Version};
