//! Persistence for package metadata and archive bytes.
//!
//! Both stores sit on one [`KvBackend`] and partition its namespace by key
//! prefix:
//!
//! | Prefix                       | Value                          |
//! |------------------------------|--------------------------------|
//! | `packages/<name>`            | JSON-encoded [`Package`]       |
//! | `archives/<name>/<version>`  | raw `.tar.gz` bytes            |
//!
//! [`Package`]: crate::model::Package

pub mod artifacts;
pub mod backend;
pub mod fs;
pub mod packages;

pub use artifacts::ArtifactStore;
pub use backend::{KvBackend, MemoryBackend};
pub use fs::FsBackend;
pub use packages::{PackageFilter, PackageQuery, PackageStore, PackageTxn, Pagination, SortOrder};

pub(crate) const PACKAGES_PREFIX: &str = "packages/";
pub(crate) const ARCHIVES_PREFIX: &str = "archives/";
