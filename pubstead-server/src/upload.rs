//! # Upload Pipeline
//!
//! Turns an uploaded `.tar.gz` into a new [`Version`] of a [`Package`] and
//! commits it to both stores.
//!
//! The archive is read in a single pass. Only three entries matter, matched
//! case-insensitively on their base name: `pubspec.yaml`, `readme.md` and
//! `changelog.md`. When an archive carries several (an `example/pubspec.yaml`
//! next to the real one, say) the shallowest path wins. A manifest is parsed
//! as soon as it is read, and a malformed top-level manifest aborts the scan.
//!
//! ## Commit order
//!
//! The archive bytes are written before the package metadata that points at
//! them. A failed artifact write therefore leaves no trace, and a failed
//! metadata write leaves only an unreferenced archive, which readers never see.
//! Metadata naming a missing archive cannot happen.

use std::io::Read;
use std::sync::Arc;

use bytes::Bytes;
use flate2::read::GzDecoder;
use sha2::{Digest, Sha256};
use tracing::{debug, error, info, warn};

use crate::error::{RegistryError, RegistryResult};
use crate::model::{manifest, Manifest, Package, Version};
use crate::storage::{ArtifactStore, PackageStore};
use crate::validation::{
    validate_file_size, validate_package_name, validate_version_text, MAX_TEXT_ENTRY_SIZE,
    MAX_UNPACKED_SIZE,
};

const MANIFEST_FILE: &str = "pubspec.yaml";
const README_FILE: &str = "readme.md";
const CHANGELOG_FILE: &str = "changelog.md";

/// The parts of an archive the registry keeps.
#[derive(Debug, Clone)]
pub struct ArchiveContents {
    pub pubspec_yaml: String,
    pub manifest: Manifest,
    pub readme: Option<String>,
    pub changelog: Option<String>,
}

// A text entry and how deep in the archive it sat.
struct Found<T> {
    depth: usize,
    value: T,
}

fn is_shallower<T>(slot: &Option<Found<T>>, depth: usize) -> bool {
    slot.as_ref().map_or(true, |found| depth < found.depth)
}

// Read a readme or changelog into `slot` if it is the shallowest so far.
// Oversize nested copies are skipped; only a top-level one fails the upload.
fn offer_doc<R: Read>(
    slot: &mut Option<Found<String>>,
    entry: &mut R,
    size: u64,
    depth: usize,
    name: &str,
) -> RegistryResult<()> {
    if !is_shallower(slot, depth) {
        return Ok(());
    }
    if depth > 0 && size > MAX_TEXT_ENTRY_SIZE {
        debug!(file = name, size, depth, "Skipping oversize nested document");
        return Ok(());
    }
    let bytes = read_text(entry, size, name)?;
    *slot = Some(Found {
        depth,
        value: String::from_utf8_lossy(&bytes).into_owned(),
    });
    Ok(())
}

enum ScanState {
    AwaitingManifest,
    HaveManifest(Found<Result<(String, Manifest), RegistryError>>),
}

impl ScanState {
    fn offer_manifest(&mut self, depth: usize, raw: Result<String, RegistryError>) -> RegistryResult<()> {
        if let ScanState::HaveManifest(found) = self {
            if depth >= found.depth {
                return Ok(());
            }
        }

        let parsed = raw.and_then(|text| {
            let manifest = manifest::parse_manifest(&text)?;
            Ok((text, manifest))
        });
        if depth == 0 {
            if let Err(e) = &parsed {
                return Err(e.clone());
            }
        }
        *self = ScanState::HaveManifest(Found {
            depth,
            value: parsed,
        });
        Ok(())
    }

    fn finish(self) -> RegistryResult<(String, Manifest)> {
        match self {
            ScanState::AwaitingManifest => Err(RegistryError::MissingManifest),
            ScanState::HaveManifest(found) => found.value,
        }
    }
}

fn read_text<R: Read>(entry: &mut R, size: u64, name: &str) -> RegistryResult<Vec<u8>> {
    if size > MAX_TEXT_ENTRY_SIZE {
        return Err(RegistryError::InvalidArchive(format!(
            "{name} is {size} bytes, more than the {MAX_TEXT_ENTRY_SIZE} byte limit"
        )));
    }
    let mut buf = Vec::with_capacity(size as usize);
    entry
        .take(MAX_TEXT_ENTRY_SIZE)
        .read_to_end(&mut buf)
        .map_err(|e| RegistryError::InvalidArchive(format!("reading {name}: {e}")))?;
    Ok(buf)
}

/// Scan a gzip-compressed tarball for the manifest and docs.
pub fn scan_archive(archive: &[u8]) -> RegistryResult<ArchiveContents> {
    let mut tar = tar::Archive::new(GzDecoder::new(archive));
    let entries = tar
        .entries()
        .map_err(|e| RegistryError::InvalidArchive(e.to_string()))?;

    let mut state = ScanState::AwaitingManifest;
    let mut readme: Option<Found<String>> = None;
    let mut changelog: Option<Found<String>> = None;
    let mut unpacked: u64 = 0;

    for entry in entries {
        let mut entry = entry.map_err(|e| RegistryError::InvalidArchive(e.to_string()))?;
        if !entry.header().entry_type().is_file() {
            continue;
        }

        let size = entry.header().size().unwrap_or(0);
        unpacked = unpacked.saturating_add(size);
        if unpacked > MAX_UNPACKED_SIZE {
            return Err(RegistryError::InvalidArchive(format!(
                "archive unpacks to more than {MAX_UNPACKED_SIZE} bytes"
            )));
        }

        let path = entry
            .path()
            .map_err(|e| RegistryError::InvalidArchive(e.to_string()))?
            .into_owned();
        let components: Vec<String> = path
            .components()
            .filter_map(|c| match c {
                std::path::Component::Normal(part) => Some(part.to_string_lossy().into_owned()),
                _ => None,
            })
            .collect();
        let Some(base) = components.last() else {
            continue;
        };
        let depth = components.len() - 1;
        let base = base.to_ascii_lowercase();

        match base.as_str() {
            MANIFEST_FILE => {
                debug!(path = %path.display(), depth, "Found manifest entry");
                let raw = read_text(&mut entry, size, MANIFEST_FILE).and_then(|bytes| {
                    String::from_utf8(bytes).map_err(|_| {
                        RegistryError::InvalidManifest("pubspec.yaml is not UTF-8".to_string())
                    })
                });
                state.offer_manifest(depth, raw)?;
            }
            README_FILE => offer_doc(&mut readme, &mut entry, size, depth, README_FILE)?,
            CHANGELOG_FILE => {
                offer_doc(&mut changelog, &mut entry, size, depth, CHANGELOG_FILE)?
            }
            _ => {}
        }
    }

    let (pubspec_yaml, manifest) = state.finish()?;
    Ok(ArchiveContents {
        pubspec_yaml,
        manifest,
        readme: readme.map(|f| f.value),
        changelog: changelog.map(|f| f.value),
    })
}

/// Outcome of a successful publish.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Published {
    pub package: String,
    pub version: String,
    /// The upload created the package.
    pub created: bool,
}

/// Validates uploads and commits them to the package and artifact stores.
pub struct UploadPipeline {
    packages: Arc<PackageStore>,
    artifacts: Arc<ArtifactStore>,
    max_upload_size: u64,
}

impl UploadPipeline {
    pub fn new(packages: Arc<PackageStore>, artifacts: Arc<ArtifactStore>, max_upload_size: u64) -> Self {
        Self {
            packages,
            artifacts,
            max_upload_size,
        }
    }

    /// Publish `archive` on behalf of `uploader`.
    ///
    /// New packages are created with `uploader` as the only uploader. Existing
    /// packages only accept versions from one of their uploaders.
    pub async fn publish(&self, uploader: &str, archive: Bytes) -> RegistryResult<Published> {
        validate_file_size(archive.len() as u64, Some(self.max_upload_size))?;

        let scan_input = archive.clone();
        let contents = tokio::task::spawn_blocking(move || scan_archive(&scan_input))
            .await
            .map_err(|e| RegistryError::storage("archive scan task", e))??;

        let name = contents.manifest.name.trim().to_string();
        validate_package_name(&name)
            .map_err(|e| RegistryError::InvalidManifest(format!("package name `{name}`: {e}")))?;
        validate_version_text(contents.manifest.version.trim()).map_err(|e| {
            RegistryError::InvalidManifest(format!(
                "version `{}`: {e}",
                contents.manifest.version
            ))
        })?;

        let digest = format!("{:x}", Sha256::digest(&archive));
        let version = Version::from_manifest(contents.pubspec_yaml, &contents.manifest)?
            .with_readme(contents.readme)
            .with_changelog(contents.changelog)
            .with_uploader(uploader)
            .with_archive_sha256(digest);
        let version_str = version.version().to_string();

        let txn = self.packages.transaction(&name).await;
        let (mut package, created) = match txn.load().await? {
            Some(package) => {
                if !package.is_uploader(uploader) {
                    return Err(RegistryError::Forbidden(format!(
                        "{uploader} is not an uploader of {name}"
                    )));
                }
                (package, false)
            }
            None => (
                Package::create(&name, contents.manifest.is_private(), [uploader])?,
                true,
            ),
        };

        package.add_version(version)?;

        if let Err(e) = self.artifacts.put(&name, &version_str, archive).await {
            error!(package = %name, version = %version_str, error = %e, "Archive write failed, metadata left untouched");
            return Err(e);
        }
        if let Err(e) = txn.commit(&package).await {
            warn!(
                package = %name,
                version = %version_str,
                error = %e,
                "Metadata write failed after archive was stored, archive is orphaned"
            );
            return Err(e);
        }

        info!(package = %name, version = %version_str, uploader = %uploader, created, "Published version");
        Ok(Published {
            package: name,
            version: version_str,
            created,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::{KvBackend, MemoryBackend};
    use crate::test_support::{build_archive, pubspec};
    use async_trait::async_trait;

    const EMAIL: &str = "dev@example.com";

    fn pipeline(backend: Arc<dyn KvBackend>) -> (UploadPipeline, Arc<PackageStore>, Arc<ArtifactStore>) {
        let packages = Arc::new(PackageStore::new(Arc::clone(&backend)));
        let artifacts = Arc::new(ArtifactStore::new(backend));
        (
            UploadPipeline::new(Arc::clone(&packages), Arc::clone(&artifacts), 1024 * 1024),
            packages,
            artifacts,
        )
    }

    #[test]
    fn test_scan_collects_manifest_and_docs() {
        let archive = build_archive(&[
            ("lib/retry.dart", "library retry;"),
            ("PUBSPEC.YAML", &pubspec("retry", "1.0.0")),
            ("README.md", "# retry"),
            ("CHANGELOG.md", "## 1.0.0"),
        ]);
        let contents = scan_archive(&archive).unwrap();
        assert_eq!(contents.manifest.name, "retry");
        assert_eq!(contents.readme.as_deref(), Some("# retry"));
        assert_eq!(contents.changelog.as_deref(), Some("## 1.0.0"));
    }

    #[test]
    fn test_scan_prefers_top_level_manifest() {
        let archive = build_archive(&[
            ("example/pubspec.yaml", &pubspec("retry_example", "0.0.1")),
            ("example/README.md", "example readme"),
            ("pubspec.yaml", &pubspec("retry", "2.0.0")),
            ("README.md", "real readme"),
        ]);
        let contents = scan_archive(&archive).unwrap();
        assert_eq!(contents.manifest.name, "retry");
        assert_eq!(contents.readme.as_deref(), Some("real readme"));
    }

    #[test]
    fn test_scan_tolerates_broken_nested_manifest() {
        let archive = build_archive(&[
            ("example/pubspec.yaml", "name: [broken"),
            ("pubspec.yaml", &pubspec("retry", "2.0.0")),
        ]);
        assert_eq!(scan_archive(&archive).unwrap().manifest.version, "2.0.0");
    }

    #[test]
    fn test_scan_skips_oversize_nested_docs() {
        let huge = "x".repeat(MAX_TEXT_ENTRY_SIZE as usize + 1);
        let archive = build_archive(&[
            ("example/README.md", &huge),
            ("pubspec.yaml", &pubspec("retry", "2.0.0")),
            ("README.md", "real readme"),
            ("doc/CHANGELOG.md", &huge),
        ]);
        let contents = scan_archive(&archive).unwrap();
        assert_eq!(contents.readme.as_deref(), Some("real readme"));
        assert_eq!(contents.changelog, None);

        let top_level = build_archive(&[
            ("pubspec.yaml", &pubspec("retry", "2.0.0")),
            ("README.md", &huge),
        ]);
        assert!(matches!(
            scan_archive(&top_level),
            Err(RegistryError::InvalidArchive(_))
        ));
    }

    #[test]
    fn test_scan_errors() {
        let no_manifest = build_archive(&[("README.md", "hi")]);
        assert_eq!(
            scan_archive(&no_manifest).unwrap_err(),
            RegistryError::MissingManifest
        );

        let bad_manifest = build_archive(&[("pubspec.yaml", "version: 1.0.0\n")]);
        assert!(matches!(
            scan_archive(&bad_manifest),
            Err(RegistryError::InvalidManifest(_))
        ));

        assert!(matches!(
            scan_archive(b"definitely not gzip"),
            Err(RegistryError::InvalidArchive(_))
        ));
    }

    #[tokio::test]
    async fn test_publish_creates_package_and_archive() {
        let (pipeline, packages, artifacts) = pipeline(Arc::new(MemoryBackend::new()));
        let archive = build_archive(&[
            ("pubspec.yaml", &format!("{}publish_to: none\n", pubspec("retry", "1.0.0"))),
            ("CHANGELOG.md", "## 1.0.0"),
        ]);

        let published = pipeline.publish(EMAIL, Bytes::from(archive.clone())).await.unwrap();
        assert_eq!(
            published,
            Published {
                package: "retry".to_string(),
                version: "1.0.0".to_string(),
                created: true,
            }
        );

        let package = packages.get("retry").await.unwrap();
        assert!(package.is_private());
        assert!(package.is_uploader(EMAIL));
        let version = package.latest_version().unwrap();
        assert_eq!(version.uploader(), Some(EMAIL));
        assert_eq!(version.changelog(), Some("## 1.0.0"));
        assert_eq!(version.readme(), None);
        assert_eq!(version.archive_sha256().map(str::len), Some(64));
        assert_eq!(
            artifacts.get("retry", "1.0.0").await.unwrap(),
            Bytes::from(archive)
        );
    }

    #[tokio::test]
    async fn test_publish_without_manifest_touches_nothing() {
        let backend = Arc::new(MemoryBackend::new());
        let (pipeline, _, _) = pipeline(backend.clone());
        let archive = build_archive(&[("lib/a.dart", "")]);

        let err = pipeline.publish(EMAIL, Bytes::from(archive)).await.unwrap_err();
        assert_eq!(err, RegistryError::MissingManifest);
        assert!(backend.scan_prefix("").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_publish_rejects_non_uploader_and_old_versions() {
        let backend = Arc::new(MemoryBackend::new());
        let (pipeline, packages, artifacts) = pipeline(backend);
        let v = |version: &str| Bytes::from(build_archive(&[("pubspec.yaml", &pubspec("retry", version))]));

        pipeline.publish(EMAIL, v("1.0.0")).await.unwrap();

        assert!(matches!(
            pipeline.publish("intruder@example.com", v("1.1.0")).await,
            Err(RegistryError::Forbidden(_))
        ));
        assert!(matches!(
            pipeline.publish(EMAIL, v("1.0.0")).await,
            Err(RegistryError::VersionConflict { .. })
        ));
        assert!(matches!(
            pipeline.publish(EMAIL, v("0.9.0")).await,
            Err(RegistryError::VersionOutOfOrder { .. })
        ));
        assert!(!artifacts.exists("retry", "0.9.0").await.unwrap());

        let published = pipeline.publish(EMAIL, v("1.1.0")).await.unwrap();
        assert!(!published.created);
        assert_eq!(packages.get("retry").await.unwrap().latest(), "1.1.0");
    }

    #[tokio::test]
    async fn test_publish_enforces_size_and_name() {
        let (pipeline, _, _) = pipeline(Arc::new(MemoryBackend::new()));
        let too_big = Bytes::from(vec![0u8; 1024 * 1024 + 1]);
        assert!(matches!(
            pipeline.publish(EMAIL, too_big).await,
            Err(RegistryError::UploadTooLarge { .. })
        ));

        let bad_name = build_archive(&[("pubspec.yaml", &pubspec("../evil", "1.0.0"))]);
        assert!(matches!(
            pipeline.publish(EMAIL, Bytes::from(bad_name)).await,
            Err(RegistryError::InvalidManifest(_))
        ));
    }

    // Accepts archive writes and fails package writes.
    struct FailingMetadata(MemoryBackend);

    #[async_trait]
    impl KvBackend for FailingMetadata {
        async fn get(&self, key: &str) -> RegistryResult<Option<Bytes>> {
            self.0.get(key).await
        }
        async fn put(&self, key: &str, value: Bytes) -> RegistryResult<()> {
            if key.starts_with("packages/") {
                return Err(RegistryError::Storage("disk full".to_string()));
            }
            self.0.put(key, value).await
        }
        async fn delete(&self, key: &str) -> RegistryResult<bool> {
            self.0.delete(key).await
        }
        async fn exists(&self, key: &str) -> RegistryResult<bool> {
            self.0.exists(key).await
        }
        async fn list_keys(&self, prefix: &str) -> RegistryResult<Vec<String>> {
            self.0.list_keys(prefix).await
        }
        async fn scan_prefix(&self, prefix: &str) -> RegistryResult<Vec<(String, Bytes)>> {
            self.0.scan_prefix(prefix).await
        }
        fn kind(&self) -> &'static str {
            "failing"
        }
    }

    // Rejects archive writes.
    struct FailingArchives(MemoryBackend);

    #[async_trait]
    impl KvBackend for FailingArchives {
        async fn get(&self, key: &str) -> RegistryResult<Option<Bytes>> {
            self.0.get(key).await
        }
        async fn put(&self, key: &str, value: Bytes) -> RegistryResult<()> {
            if key.starts_with("archives/") {
                return Err(RegistryError::Storage("bucket unavailable".to_string()));
            }
            self.0.put(key, value).await
        }
        async fn delete(&self, key: &str) -> RegistryResult<bool> {
            self.0.delete(key).await
        }
        async fn exists(&self, key: &str) -> RegistryResult<bool> {
            self.0.exists(key).await
        }
        async fn list_keys(&self, prefix: &str) -> RegistryResult<Vec<String>> {
            self.0.list_keys(prefix).await
        }
        async fn scan_prefix(&self, prefix: &str) -> RegistryResult<Vec<(String, Bytes)>> {
            self.0.scan_prefix(prefix).await
        }
        fn kind(&self) -> &'static str {
            "failing"
        }
    }

    #[tokio::test]
    async fn test_artifact_failure_leaves_no_metadata() {
        let (pipeline, packages, _) = pipeline(Arc::new(FailingArchives(MemoryBackend::new())));
        let archive = build_archive(&[("pubspec.yaml", &pubspec("retry", "1.0.0"))]);

        let err = pipeline.publish(EMAIL, Bytes::from(archive)).await.unwrap_err();
        assert!(matches!(err, RegistryError::Storage(_)));
        assert!(packages.get("retry").await.unwrap_err().is_not_found());
    }

    #[tokio::test]
    async fn test_metadata_failure_only_orphans_the_archive() {
        let (pipeline, packages, artifacts) =
            pipeline(Arc::new(FailingMetadata(MemoryBackend::new())));
        let archive = build_archive(&[("pubspec.yaml", &pubspec("retry", "1.0.0"))]);

        let err = pipeline.publish(EMAIL, Bytes::from(archive)).await.unwrap_err();
        assert!(matches!(err, RegistryError::Storage(_)));
        assert!(packages.get("retry").await.unwrap_err().is_not_found());
        assert!(artifacts.exists("retry", "1.0.0").await.unwrap());
    }

    #[tokio::test]
    async fn test_concurrent_publishes_never_lose_versions() {
        let (pipeline, packages, _) = pipeline(Arc::new(MemoryBackend::new()));
        let pipeline = Arc::new(pipeline);
        let archive = |v: &str| Bytes::from(build_archive(&[("pubspec.yaml", &pubspec("retry", v))]));
        pipeline.publish(EMAIL, archive("1.0.0")).await.unwrap();

        // Same version twice: exactly one winner.
        let (a, b) = tokio::join!(
            pipeline.publish(EMAIL, archive("1.1.0")),
            pipeline.publish(EMAIL, archive("1.1.0")),
        );
        assert_eq!(a.is_ok() as u8 + b.is_ok() as u8, 1);
        let loser = if a.is_ok() { b } else { a };
        assert!(matches!(loser, Err(RegistryError::VersionConflict { .. })));

        // Two different versions: every accepted one is persisted.
        let mut handles = Vec::new();
        for v in ["1.2.0", "1.3.0"] {
            let pipeline = Arc::clone(&pipeline);
            let bytes = archive(v);
            handles.push(tokio::spawn(async move { pipeline.publish(EMAIL, bytes).await }));
        }
        let mut accepted = vec!["1.0.0".to_string(), "1.1.0".to_string()];
        for handle in handles {
            match handle.await.unwrap() {
                Ok(published) => accepted.push(published.version),
                Err(e) => assert!(matches!(e, RegistryError::VersionOutOfOrder { .. }), "{e}"),
            }
        }

        let package = packages.get("retry").await.unwrap();
        assert_eq!(package.version_count(), accepted.len());
        for v in &accepted {
            assert!(package.version(v).is_some(), "lost {v}");
        }
        assert_eq!(package.latest(), "1.3.0");
    }
}
