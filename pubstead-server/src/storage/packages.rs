//! Package metadata store with per-package serializable transactions.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use bytes::Bytes;
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};
use tracing::{debug, warn};

use super::backend::KvBackend;
use super::PACKAGES_PREFIX;
use crate::error::{RegistryError, RegistryResult};
use crate::model::Package;
use crate::validation::validate_key_segment;

/// Which packages a listing should include.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum PackageFilter {
    #[default]
    All,
    /// Case-sensitive substring of the package name.
    Keyword(String),
    /// Packages the given email may publish.
    Uploader(String),
    /// Packages whose latest version depends on the given package.
    Dependency(String),
}

impl PackageFilter {
    /// Parse a search box value. `email:` and `dependency:` select the
    /// qualified filters; anything else is a name keyword.
    pub fn parse(q: Option<&str>) -> Self {
        let Some(q) = q.map(str::trim).filter(|q| !q.is_empty()) else {
            return PackageFilter::All;
        };
        if let Some(email) = q.strip_prefix("email:") {
            PackageFilter::Uploader(email.trim().to_string())
        } else if let Some(dep) = q.strip_prefix("dependency:") {
            PackageFilter::Dependency(dep.trim().to_string())
        } else {
            PackageFilter::Keyword(q.to_string())
        }
    }

    pub fn matches(&self, package: &Package) -> bool {
        match self {
            PackageFilter::All => true,
            PackageFilter::Keyword(keyword) => package.name().contains(keyword.as_str()),
            PackageFilter::Uploader(email) => package.is_uploader(email),
            PackageFilter::Dependency(dep) => package
                .latest_version()
                .and_then(|v| v.manifest())
                .map(|m| m.depends_on(dep))
                .unwrap_or(false),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SortOrder {
    /// Most downloaded first.
    #[default]
    Downloads,
    /// Most recently updated first.
    Updated,
    /// Alphabetical.
    Name,
}

impl SortOrder {
    pub fn parse(raw: Option<&str>) -> Self {
        match raw.map(str::trim) {
            Some("updated") => SortOrder::Updated,
            Some("name") => SortOrder::Name,
            _ => SortOrder::Downloads,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PackageQuery {
    pub filter: PackageFilter,
    pub sort: SortOrder,
}

/// Zero-based page selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Pagination {
    pub page: usize,
    pub size: usize,
}

impl Pagination {
    pub const DEFAULT_SIZE: usize = 10;
    pub const MAX_SIZE: usize = 100;

    pub fn new(page: Option<usize>, size: Option<usize>) -> Self {
        Self {
            page: page.unwrap_or(0),
            size: size
                .filter(|s| *s > 0)
                .unwrap_or(Self::DEFAULT_SIZE)
                .min(Self::MAX_SIZE),
        }
    }

    fn offset(&self) -> usize {
        self.page.saturating_mul(self.size)
    }
}

impl Default for Pagination {
    fn default() -> Self {
        Self::new(None, None)
    }
}

fn package_key(name: &str) -> String {
    format!("{PACKAGES_PREFIX}{name}")
}

fn decode(key: &str, bytes: &[u8]) -> RegistryResult<Package> {
    serde_json::from_slice(bytes).map_err(|e| RegistryError::storage(format!("decode {key}"), e))
}

/// Stores whole [`Package`] aggregates keyed by name.
pub struct PackageStore {
    backend: Arc<dyn KvBackend>,
    locks: Mutex<HashMap<String, Arc<AsyncMutex<()>>>>,
}

impl PackageStore {
    pub fn new(backend: Arc<dyn KvBackend>) -> Self {
        Self {
            backend,
            locks: Mutex::new(HashMap::new()),
        }
    }

    /// Fetch a package. Absence is [`RegistryError::NotFound`].
    pub async fn get(&self, name: &str) -> RegistryResult<Package> {
        self.find(name)
            .await?
            .ok_or_else(|| RegistryError::NotFound(format!("package {name}")))
    }

    async fn find(&self, name: &str) -> RegistryResult<Option<Package>> {
        // Names that could never be stored are plain misses on every backend.
        if validate_key_segment(name).is_err() {
            return Ok(None);
        }
        let key = package_key(name);
        match self.backend.get(&key).await? {
            Some(bytes) => decode(&key, &bytes).map(Some),
            None => Ok(None),
        }
    }

    /// Overwrite the stored aggregate. Last write wins; use
    /// [`PackageStore::transaction`] for read-modify-write.
    pub async fn put(&self, package: &Package) -> RegistryResult<()> {
        let key = package_key(package.name());
        let bytes = serde_json::to_vec(package)
            .map_err(|e| RegistryError::storage(format!("encode {key}"), e))?;
        self.backend.put(&key, Bytes::from(bytes)).await
    }

    /// Filter, sort and page through every stored package.
    ///
    /// The returned count is the size of the filtered set, not of the page.
    pub async fn scan(
        &self,
        query: &PackageQuery,
        pagination: Pagination,
    ) -> RegistryResult<(Vec<Package>, usize)> {
        let mut matched = Vec::new();
        for (key, bytes) in self.backend.scan_prefix(PACKAGES_PREFIX).await? {
            match decode(&key, &bytes) {
                Ok(package) if query.filter.matches(&package) => matched.push(package),
                Ok(_) => {}
                Err(e) => warn!(key = %key, error = %e, "Skipping unreadable package entry"),
            }
        }

        match query.sort {
            SortOrder::Downloads => matched.sort_by(|a, b| {
                b.downloads()
                    .cmp(&a.downloads())
                    .then_with(|| a.name().cmp(b.name()))
            }),
            SortOrder::Updated => matched.sort_by(|a, b| {
                b.updated_at()
                    .cmp(&a.updated_at())
                    .then_with(|| a.name().cmp(b.name()))
            }),
            SortOrder::Name => matched.sort_by(|a, b| a.name().cmp(b.name())),
        }

        let total = matched.len();
        let page = matched
            .into_iter()
            .skip(pagination.offset())
            .take(pagination.size)
            .collect();
        Ok((page, total))
    }

    pub async fn count(&self) -> RegistryResult<usize> {
        Ok(self.backend.list_keys(PACKAGES_PREFIX).await?.len())
    }

    /// Open a read-modify-write transaction on one package name.
    ///
    /// Transactions on the same name run one at a time; the next one starts
    /// only after the previous [`PackageTxn`] is dropped, so it loads whatever
    /// the previous one committed.
    pub async fn transaction(&self, name: &str) -> PackageTxn<'_> {
        let lock = {
            let mut locks = self.locks.lock().unwrap_or_else(|e| e.into_inner());
            // Drop locks nobody is holding or waiting on.
            locks.retain(|_, lock| Arc::strong_count(lock) > 1);
            locks
                .entry(name.to_string())
                .or_insert_with(|| Arc::new(AsyncMutex::new(())))
                .clone()
        };
        let guard = lock.lock_owned().await;
        debug!(package = %name, "Opened package transaction");

        PackageTxn {
            store: self,
            name: name.to_string(),
            _guard: guard,
        }
    }
}

/// Exclusive access to one package key until dropped.
pub struct PackageTxn<'a> {
    store: &'a PackageStore,
    name: String,
    _guard: OwnedMutexGuard<()>,
}

impl PackageTxn<'_> {
    /// Current stored state, `None` if the package does not exist yet.
    pub async fn load(&self) -> RegistryResult<Option<Package>> {
        self.store.find(&self.name).await
    }

    /// Persist the aggregate. Its name must be the one the transaction locked.
    pub async fn commit(&self, package: &Package) -> RegistryResult<()> {
        if package.name() != self.name {
            return Err(RegistryError::InvalidInput(format!(
                "transaction for {} cannot write package {}",
                self.name,
                package.name()
            )));
        }
        self.store.put(package).await
    }
}
