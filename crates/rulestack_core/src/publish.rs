//! The publish engine: upload every staged archive to the active registry.

use std::path::{Path, PathBuf};

use exact_version::Version;
use tracing::{info, warn};

use crate::archive::unpack_archive;
use crate::manifest::PackageManifest;
use crate::project::Project;
use crate::registry::{PublishResult, RegistryClient, RegistryError, RegistryResult};
use crate::PROJECT_MANIFEST;

#[derive(Debug)]
pub struct ArchiveResult {
    /// File name of the staged archive.
    pub archive: String,
    pub result: RegistryResult<PublishResult>,
}

#[derive(Debug, Default)]
pub struct PublishOutcome {
    pub results: Vec<ArchiveResult>,
}

impl PublishOutcome {
    pub fn is_success(&self) -> bool {
        self.results.iter().all(|r| r.result.is_ok())
    }
}

/// The staged archives under `.rulestack/staged/`, sorted by file name.
pub fn staged_archives(project: &Project) -> anyhow::Result<Vec<PathBuf>> {
    let staged_dir = project.staged_dir();
    if !staged_dir.is_dir() {
        return Ok(vec![]);
    }
    let mut archives: Vec<PathBuf> = fs_err::read_dir(&staged_dir)?
        .filter_map(Result::ok)
        .map(|e| e.path())
        .filter(|p| p.extension().and_then(|e| e.to_str()) == Some("tgz"))
        .collect();
    archives.sort();
    Ok(archives)
}

/// Publish all staged archives, continuing past per-archive failures.
///
/// Successfully published archives are removed from the staging area;
/// failed ones stay behind for another attempt.
pub async fn publish(
    project: &Project,
    client: &dyn RegistryClient,
) -> anyhow::Result<PublishOutcome> {
    let mut outcome = PublishOutcome::default();
    for archive_path in staged_archives(project)? {
        let archive_name = archive_path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let result = publish_one(client, &archive_path).await;
        match &result {
            Ok(published) => {
                info!(
                    "published {}@{} ({})",
                    published.name, published.version, published.sha256
                );
                fs_err::remove_file(&archive_path)?;
            }
            Err(e) => warn!("failed to publish {archive_name}: {e}"),
        }
        outcome.results.push(ArchiveResult {
            archive: archive_name,
            result,
        });
    }
    Ok(outcome)
}

async fn publish_one(
    client: &dyn RegistryClient,
    archive_path: &Path,
) -> RegistryResult<PublishResult> {
    let (name, version) = parse_archive_name(archive_path)?;

    // Cross-check the embedded manifest against the file name before
    // anything leaves the machine.
    let unpacked = tempfile::tempdir()
        .map_err(|e| RegistryError::PublishFailed(e.to_string()))?;
    unpack_archive(archive_path, unpacked.path())
        .map_err(|e| RegistryError::InvalidManifest(e.to_string()))?;
    let manifest = PackageManifest::load(&unpacked.path().join(PROJECT_MANIFEST))
        .map_err(|e| RegistryError::InvalidManifest(e.to_string()))?;
    if manifest.name != name || manifest.version != version.to_string() {
        return Err(RegistryError::InvalidManifest(format!(
            "archive is named {name}-{version} but its manifest says {}@{}",
            manifest.name, manifest.version
        )));
    }

    // Hand the backend a standalone single-package manifest file.
    let manifest_file = unpacked.path().join("publish-manifest.json");
    manifest
        .save(&manifest_file)
        .map_err(|e| RegistryError::InvalidManifest(e.to_string()))?;

    client.publish(&manifest_file, archive_path).await
}

/// `<name>-<version>.tgz` → coordinate. Names may contain dashes, so the
/// version is everything after the last one.
fn parse_archive_name(path: &Path) -> RegistryResult<(String, Version)> {
    let stem = path
        .file_stem()
        .and_then(|s| s.to_str())
        .ok_or_else(|| RegistryError::InvalidManifest("unreadable archive name".to_string()))?;
    let (name, version) = stem.rsplit_once('-').ok_or_else(|| {
        RegistryError::InvalidManifest(format!(
            "archive name `{stem}` is not of the form <name>-<version>"
        ))
    })?;
    let version = exact_version::parse(version)
        .map_err(|e| RegistryError::InvalidManifest(e.to_string()))?;
    if name.is_empty() {
        return Err(RegistryError::InvalidManifest(format!(
            "archive name `{stem}` has an empty package name"
        )));
    }
    Ok((name.to_string(), version))
}
