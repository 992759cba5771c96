//! The install engine.
//!
//! Reconciles `.rulestack/` with the project manifest: one decision per
//! declared package (install, update, or skip), with failures contained to
//! the package they occurred in.

use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;

use anyhow::{Context, bail};
use exact_version::Version;
use tracing::{info, warn};

use crate::archive::{sha256_file, unpack_archive};
use crate::context_file::regenerate_context_file;
use crate::manifest::LockedPackage;
use crate::project::Project;
use crate::registry::RegistryClient;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PackageAction {
    Installed,
    Updated,
    Skipped,
    Failed,
}

#[derive(Debug)]
pub struct PackageResult {
    pub name: String,
    pub version: String,
    pub action: PackageAction,
    pub detail: Option<String>,
}

/// Per-package results plus the counts the summary line reports.
#[derive(Debug, Default)]
pub struct InstallOutcome {
    pub results: Vec<PackageResult>,
}

impl InstallOutcome {
    fn count(&self, action: PackageAction) -> usize {
        self.results.iter().filter(|r| r.action == action).count()
    }

    pub fn failed(&self) -> usize {
        self.count(PackageAction::Failed)
    }

    pub fn is_success(&self) -> bool {
        self.failed() == 0
    }
}

impl fmt::Display for InstallOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} installed, {} updated, {} skipped, {} failed",
            self.count(PackageAction::Installed),
            self.count(PackageAction::Updated),
            self.count(PackageAction::Skipped),
            self.failed()
        )
    }
}

/// Parse `<name>@<version>` into a package coordinate.
///
/// Scoped names (leading `@`) are rejected.
pub fn parse_package_spec(spec: &str) -> anyhow::Result<(String, Version)> {
    if spec.starts_with('@') {
        bail!("scoped package names are not supported: {spec}");
    }
    let Some((name, version)) = spec.split_once('@') else {
        bail!("invalid package spec `{spec}`: expected <name>@<version>");
    };
    if name.is_empty() || version.is_empty() {
        bail!("invalid package spec `{spec}`: expected <name>@<version>");
    }
    let version = exact_version::parse(version)?;
    Ok((name.to_string(), version))
}

/// Reconcile every dependency of the project manifest.
pub async fn install(
    project: &Project,
    client: &dyn RegistryClient,
) -> anyhow::Result<InstallOutcome> {
    let dependencies = project.load_manifest()?.dependencies;
    install_dependencies(project, client, &dependencies).await
}

/// Install a single `<name>@<version>` and record it in the project manifest.
pub async fn add(
    project: &Project,
    client: &dyn RegistryClient,
    spec: &str,
) -> anyhow::Result<InstallOutcome> {
    let (name, version) = parse_package_spec(spec)?;
    let single = BTreeMap::from([(name, version.to_string())]);
    install_dependencies(project, client, &single).await
}

async fn install_dependencies(
    project: &Project,
    client: &dyn RegistryClient,
    dependencies: &BTreeMap<String, String>,
) -> anyhow::Result<InstallOutcome> {
    let mut outcome = InstallOutcome::default();
    let mut manifest = project.load_manifest()?;
    let mut manifest_dirty = false;

    for (name, required) in dependencies {
        let result = install_one(project, client, name, required).await;
        if result.action != PackageAction::Failed
            && manifest.dependencies.get(name) != Some(required)
        {
            manifest
                .dependencies
                .insert(name.clone(), required.clone());
            manifest_dirty = true;
        }
        if let Some(detail) = &result.detail {
            match result.action {
                PackageAction::Failed => warn!("{name}@{required}: {detail}"),
                _ => info!("{name}@{required}: {detail}"),
            }
        }
        outcome.results.push(result);
    }

    if manifest_dirty {
        manifest.save(&project.manifest_path())?;
    }
    regenerate_context_file(project)?;
    Ok(outcome)
}

async fn install_one(
    project: &Project,
    client: &dyn RegistryClient,
    name: &str,
    required: &str,
) -> PackageResult {
    let failed = |detail: String| PackageResult {
        name: name.to_string(),
        version: required.to_string(),
        action: PackageAction::Failed,
        detail: Some(detail),
    };

    let required_version = match exact_version::parse(required) {
        Ok(v) => v,
        Err(e) => return failed(e.to_string()),
    };
    let installed = match project.installed_version(name) {
        Ok(v) => v,
        Err(e) => return failed(e.to_string()),
    };

    let action = match &installed {
        None => PackageAction::Installed,
        Some(have) if *have < required_version => PackageAction::Updated,
        Some(have) if *have == required_version => {
            return PackageResult {
                name: name.to_string(),
                version: required.to_string(),
                action: PackageAction::Skipped,
                detail: None,
            };
        }
        Some(have) => {
            // Installed version is ahead of the manifest. Leave it alone.
            return PackageResult {
                name: name.to_string(),
                version: required.to_string(),
                action: PackageAction::Skipped,
                detail: Some(format!(
                    "installed version {have} is newer than required {required_version}"
                )),
            };
        }
    };

    match fetch_and_swap(project, client, name, &required_version, installed.as_ref()).await {
        Ok(()) => PackageResult {
            name: name.to_string(),
            version: required.to_string(),
            action,
            detail: None,
        },
        Err(e) => failed(format!("{e:#}")),
    }
}

/// Download, verify, unpack into a staging directory, swap it in, and
/// commit the result to the lock manifest.
///
/// The pre-existing package directory survives any failure: the staging
/// directory is swapped in only after a complete unpack, and the old
/// version's directory is removed last.
async fn fetch_and_swap(
    project: &Project,
    client: &dyn RegistryClient,
    name: &str,
    version: &Version,
    installed: Option<&Version>,
) -> anyhow::Result<()> {
    let version_info = client.get_version(name, version).await?;

    fs_err::create_dir_all(project.rulestack_dir())?;
    let download = tempfile::NamedTempFile::new_in(project.rulestack_dir())
        .context("cannot create download file")?;
    client
        .download_blob(&version_info.sha256, download.path())
        .await?;

    let actual = sha256_file(download.path())?;
    if actual != version_info.sha256 {
        bail!(
            "downloaded archive is corrupt: expected sha256 {}, got {actual}",
            version_info.sha256
        );
    }

    let staging = project
        .rulestack_dir()
        .join(format!(".staging-{name}.{version}"));
    if staging.exists() {
        fs_err::remove_dir_all(&staging)?;
    }
    if let Err(e) = unpack_archive(download.path(), &staging) {
        let _ = fs_err::remove_dir_all(&staging);
        return Err(e);
    }

    let dest = project.package_dir(name, version);
    if dest.exists() {
        fs_err::remove_dir_all(&dest)?;
    }
    fs_err::rename(&staging, &dest)?;

    // The old version's directory goes away only after the new one is in place.
    let old_dir: Option<PathBuf> = installed
        .filter(|old| *old != version)
        .map(|old| project.package_dir(name, old));
    if let Some(old_dir) = old_dir {
        if old_dir.exists() {
            fs_err::remove_dir_all(&old_dir)?;
        }
    }

    let mut lock = project.load_lock()?;
    lock.packages.insert(
        name.to_string(),
        LockedPackage {
            version: version.to_string(),
            sha256: version_info.sha256.clone(),
        },
    );
    if let Err(e) = lock.save(&project.lock_path()) {
        // A stale lock would claim the wrong hash; take the package back out.
        let _ = fs_err::remove_dir_all(&dest);
        return Err(e);
    }
    info!("installed {name}@{version}");
    Ok(())
}
