//! # Pubstead
//!
//! A self-hosted registry for the pub package manager that overlays the
//! public registry: packages published here are served locally, everything
//! else is deferred upstream.
//!
//! ## Layout
//!
//! - [`model`]: versions, manifests and the package aggregate with its
//!   strictly increasing version invariant.
//! - [`storage`]: the key-value backend interface and the package and
//!   artifact stores built on it.
//! - [`upload`]: archive scanning and the artifact-then-metadata commit.
//! - [`access`]: uploader management.
//! - [`resolution`] and [`upstream`]: local-or-upstream decisions for reads.
//! - [`api`] and [`server`]: the HTTP surface.

pub mod access;
pub mod api;
pub mod config;
pub mod error;
pub mod identity;
pub mod model;
pub mod resolution;
pub mod server;
pub mod state;
pub mod storage;
pub mod upload;
pub mod upstream;
pub mod validation;

#[cfg(test)]
pub(crate) mod test_support;

pub use config::Config;
pub use error::{AppError, AppResult, RegistryError, RegistryResult};
pub use server::{build_router, run_server};
pub use state::AppState;
