//! Uploader management and the permission check guarding it.

use tracing::info;

use crate::error::{RegistryError, RegistryResult};
use crate::model::Package;
use crate::storage::PackageStore;

/// The acting identity must already be an uploader of `package`.
pub fn authorize_uploader_change(package: &Package, acting_email: &str) -> RegistryResult<()> {
    if package.is_uploader(acting_email) {
        Ok(())
    } else {
        Err(RegistryError::Forbidden(format!(
            "{acting_email} is not an uploader of {}",
            package.name()
        )))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Change {
    Add,
    Remove,
}

async fn change_uploaders(
    store: &PackageStore,
    name: &str,
    acting_email: &str,
    target: &str,
    change: Change,
) -> RegistryResult<Package> {
    let target = target.trim();
    if target.is_empty() {
        return Err(RegistryError::InvalidInput("email must not be empty".to_string()));
    }

    let txn = store.transaction(name).await;
    let mut package = txn
        .load()
        .await?
        .ok_or_else(|| RegistryError::NotFound(format!("package {name}")))?;

    authorize_uploader_change(&package, acting_email)?;
    match change {
        Change::Add => package.add_uploader(target)?,
        Change::Remove => package.remove_uploader(target)?,
    }
    txn.commit(&package).await?;

    info!(package = %name, actor = %acting_email, uploader = %target, ?change, "Updated uploaders");
    Ok(package)
}

/// Grant `email` upload rights on `name`.
pub async fn add_uploader(
    store: &PackageStore,
    name: &str,
    acting_email: &str,
    email: &str,
) -> RegistryResult<Package> {
    change_uploaders(store, name, acting_email, email, Change::Add).await
}

/// Revoke `email`'s upload rights on `name`.
pub async fn remove_uploader(
    store: &PackageStore,
    name: &str,
    acting_email: &str,
    email: &str,
) -> RegistryResult<Package> {
    change_uploaders(store, name, acting_email, email, Change::Remove).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Version;
    use crate::storage::MemoryBackend;
    use std::sync::Arc;

    const OWNER: &str = "owner@example.com";

    async fn seeded() -> PackageStore {
        let store = PackageStore::new(Arc::new(MemoryBackend::new()));
        let mut package = Package::create("retry", false, [OWNER]).unwrap();
        package
            .add_version(Version::new("name: retry\nversion: 1.0.0\n").unwrap())
            .unwrap();
        store.put(&package).await.unwrap();
        store
    }

    #[tokio::test]
    async fn test_only_uploaders_may_change_uploaders() {
        let store = seeded().await;
        let err = add_uploader(&store, "retry", "stranger@example.com", "friend@example.com")
            .await
            .unwrap_err();
        assert!(matches!(err, RegistryError::Forbidden(_)));
        assert!(!store.get("retry").await.unwrap().is_uploader("friend@example.com"));
    }

    #[tokio::test]
    async fn test_add_and_remove_round_trip() {
        let store = seeded().await;
        add_uploader(&store, "retry", OWNER, "friend@example.com")
            .await
            .unwrap();
        assert!(store.get("retry").await.unwrap().is_uploader("friend@example.com"));

        // The new uploader may now remove the first one.
        remove_uploader(&store, "retry", "friend@example.com", OWNER)
            .await
            .unwrap();
        let package = store.get("retry").await.unwrap();
        assert!(!package.is_uploader(OWNER));
        assert_eq!(package.uploaders().len(), 1);
    }

    #[tokio::test]
    async fn test_error_kinds_leave_store_unchanged() {
        let store = seeded().await;
        let before = store.get("retry").await.unwrap();

        assert_eq!(
            add_uploader(&store, "retry", OWNER, OWNER).await.unwrap_err(),
            RegistryError::AlreadyExists(OWNER.to_string())
        );
        assert_eq!(
            remove_uploader(&store, "retry", OWNER, "ghost@example.com")
                .await
                .unwrap_err(),
            RegistryError::UploaderNotFound("ghost@example.com".to_string())
        );
        assert!(add_uploader(&store, "missing", OWNER, "a@example.com")
            .await
            .unwrap_err()
            .is_not_found());
        assert!(matches!(
            add_uploader(&store, "retry", OWNER, "  ").await,
            Err(RegistryError::InvalidInput(_))
        ));

        assert_eq!(store.get("retry").await.unwrap(), before);
    }
}
