//! The pack engine: turn a rule file into a staged, publishable archive.

use std::path::PathBuf;

use anyhow::{Context, bail};
use exact_version::Version;

use crate::archive::{create_archive, sha256_file};
use crate::context_file::regenerate_context_file;
use crate::manifest::PackageManifest;
use crate::project::Project;
use crate::PROJECT_MANIFEST;

#[derive(Debug)]
pub struct PackRequest {
    /// The `.mdc` rule file to pack.
    pub file: PathBuf,
    /// Package name; defaults to the file stem.
    pub package: Option<String>,
    /// Explicit version. Without one, an existing package gets a patch
    /// bump and a new package starts at 1.0.0.
    pub version: Option<Version>,
}

#[derive(Debug)]
pub struct PackOutcome {
    pub name: String,
    pub version: Version,
    pub archive_path: PathBuf,
    pub sha256: String,
    pub size: u64,
}

pub fn pack(project: &Project, request: &PackRequest) -> anyhow::Result<PackOutcome> {
    let extension = request.file.extension().and_then(|e| e.to_str());
    if extension != Some("mdc") {
        bail!(
            "{} is not a .mdc rule file",
            request.file.display()
        );
    }
    fs_err::metadata(&request.file)
        .with_context(|| format!("cannot read {}", request.file.display()))?;

    let name = match &request.package {
        Some(name) => name.clone(),
        None => request
            .file
            .file_stem()
            .and_then(|s| s.to_str())
            .map(str::to_string)
            .context("cannot derive a package name from the file name")?,
    };
    if name.is_empty() || name.starts_with('@') || name.contains('/') {
        bail!("invalid package name `{name}`");
    }

    let installed = project.installed_version(&name)?;
    let version = match (&installed, &request.version) {
        (Some(old), Some(requested)) => {
            exact_version::validate_increase(old, requested)?;
            requested.clone()
        }
        (Some(old), None) => exact_version::increment_patch(old),
        (None, Some(requested)) => requested.clone(),
        (None, None) => Version::new(1, 0, 0),
    };

    let new_dir = project.package_dir(&name, &version);
    if new_dir.exists() {
        bail!("{} already exists", new_dir.display());
    }
    fs_err::create_dir_all(&new_dir)?;

    let result = populate_and_stage(project, request, &name, &version, installed.as_ref());
    if result.is_err() {
        let _ = fs_err::remove_dir_all(&new_dir);
    }
    result
}

fn populate_and_stage(
    project: &Project,
    request: &PackRequest,
    name: &str,
    version: &Version,
    installed: Option<&Version>,
) -> anyhow::Result<PackOutcome> {
    let new_dir = project.package_dir(name, version);
    let new_file_name = request
        .file
        .file_name()
        .context("rule file has no file name")?
        .to_owned();

    // Carry the previous version's rule files over.
    if let Some(old_version) = installed {
        let old_dir = project.package_dir(name, old_version);
        if old_dir.is_dir() {
            for entry in fs_err::read_dir(&old_dir)? {
                let entry = entry?;
                if !entry.file_type()?.is_file() {
                    continue;
                }
                let file_name = entry.file_name();
                if file_name.to_str() == Some(PROJECT_MANIFEST) {
                    continue;
                }
                if file_name == new_file_name {
                    bail!(
                        "{} already contains a file named {}",
                        name,
                        new_file_name.to_string_lossy()
                    );
                }
                fs_err::copy(entry.path(), new_dir.join(&file_name))?;
            }
        }
    }

    fs_err::copy(&request.file, new_dir.join(&new_file_name))?;

    let mut files: Vec<String> = fs_err::read_dir(&new_dir)?
        .filter_map(Result::ok)
        .filter_map(|e| e.file_name().to_str().map(str::to_string))
        .collect();
    files.sort();

    let manifest = PackageManifest {
        name: name.to_string(),
        version: version.to_string(),
        description: String::new(),
        files,
        targets: vec![],
        tags: vec![],
        license: String::new(),
    };
    manifest.save(&new_dir.join(PROJECT_MANIFEST))?;

    let archive_path = project
        .staged_dir()
        .join(format!("{name}-{version}.tgz"));
    create_archive(&new_dir, &archive_path)?;
    let sha256 = sha256_file(&archive_path)?;
    let size = fs_err::metadata(&archive_path)?.len();

    // The old version directory is replaced wholesale, and only now that
    // the new one is complete.
    if let Some(old_version) = installed {
        let old_dir = project.package_dir(name, old_version);
        if old_dir.exists() {
            fs_err::remove_dir_all(&old_dir)?;
        }
    }

    let mut project_manifest = project.load_manifest()?;
    if project_manifest.dependencies.get(name) != Some(&version.to_string()) {
        project_manifest
            .dependencies
            .insert(name.to_string(), version.to_string());
        project_manifest.save(&project.manifest_path())?;
    }
    regenerate_context_file(project)?;

    Ok(PackOutcome {
        name: name.to_string(),
        version: version.clone(),
        archive_path,
        sha256,
        size,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::STAGED_DIR;

    fn project_with_rule_file(contents: &str) -> (tempfile::TempDir, Project, PathBuf) {
        let dir = tempfile::tempdir().unwrap();
        let project = Project::init(dir.path(), false).unwrap();
        let rule = dir.path().join("careful.mdc");
        fs_err::write(&rule, contents).unwrap();
        (dir, project, rule)
    }

    #[test]
    fn new_package_starts_at_1_0_0() {
        let (_dir, project, rule) = project_with_rule_file("# careful\n");
        let outcome = pack(
            &project,
            &PackRequest {
                file: rule,
                package: None,
                version: None,
            },
        )
        .unwrap();

        assert_eq!(outcome.name, "careful");
        assert_eq!(outcome.version, Version::new(1, 0, 0));
        assert!(outcome.archive_path.ends_with(
            PathBuf::from(STAGED_DIR).join("careful-1.0.0.tgz")
        ));
        assert!(outcome.archive_path.is_file());
        assert!(outcome.size > 0);

        let package_dir = project.package_dir("careful", &outcome.version);
        assert!(package_dir.join("careful.mdc").is_file());
        let manifest = PackageManifest::load(&package_dir.join(PROJECT_MANIFEST)).unwrap();
        assert_eq!(manifest.name, "careful");
        assert!(manifest.files.contains(&"careful.mdc".to_string()));

        let deps = project.load_manifest().unwrap().dependencies;
        assert_eq!(deps["careful"], "1.0.0");
    }

    #[test]
    fn repacking_bumps_the_patch_and_carries_files() {
        let (dir, project, rule) = project_with_rule_file("# careful\n");
        pack(
            &project,
            &PackRequest {
                file: rule,
                package: Some("my".to_string()),
                version: None,
            },
        )
        .unwrap();

        let second = dir.path().join("second.mdc");
        fs_err::write(&second, "# second\n").unwrap();
        let outcome = pack(
            &project,
            &PackRequest {
                file: second,
                package: Some("my".to_string()),
                version: None,
            },
        )
        .unwrap();

        assert_eq!(outcome.version, Version::new(1, 0, 1));
        let new_dir = project.package_dir("my", &outcome.version);
        assert!(new_dir.join("careful.mdc").is_file());
        assert!(new_dir.join("second.mdc").is_file());
        // Replaced wholesale.
        assert!(!project.package_dir("my", &Version::new(1, 0, 0)).exists());
    }

    #[test]
    fn non_monotonic_version_is_rejected() {
        let (dir, project, rule) = project_with_rule_file("# careful\n");
        pack(
            &project,
            &PackRequest {
                file: rule,
                package: Some("my".to_string()),
                version: Some(Version::new(1, 2, 0)),
            },
        )
        .unwrap();

        let next = dir.path().join("new.mdc");
        fs_err::write(&next, "# new\n").unwrap();
        let err = pack(
            &project,
            &PackRequest {
                file: next,
                package: Some("my".to_string()),
                version: Some(Version::new(1, 1, 0)),
            },
        )
        .unwrap_err();
        assert!(err.to_string().contains("not an increase"));
        // Nothing was created or removed.
        assert!(project.package_dir("my", &Version::new(1, 2, 0)).exists());
        assert!(!project.package_dir("my", &Version::new(1, 1, 0)).exists());
    }

    #[test]
    fn filename_collisions_are_rejected() {
        let (dir, project, rule) = project_with_rule_file("# careful\n");
        pack(
            &project,
            &PackRequest {
                file: rule,
                package: Some("my".to_string()),
                version: None,
            },
        )
        .unwrap();

        let duplicate = dir.path().join("sub");
        fs_err::create_dir_all(&duplicate).unwrap();
        let duplicate = duplicate.join("careful.mdc");
        fs_err::write(&duplicate, "# other careful\n").unwrap();

        let err = pack(
            &project,
            &PackRequest {
                file: duplicate,
                package: Some("my".to_string()),
                version: None,
            },
        )
        .unwrap_err();
        assert!(err.to_string().contains("already contains"));
        // The old version survives a failed pack.
        assert!(project.package_dir("my", &Version::new(1, 0, 0)).exists());
    }

    #[test]
    fn only_mdc_files_are_packable() {
        let (dir, project, _) = project_with_rule_file("# careful\n");
        let wrong = dir.path().join("rules.md");
        fs_err::write(&wrong, "# md\n").unwrap();
        let err = pack(
            &project,
            &PackRequest {
                file: wrong,
                package: None,
                version: None,
            },
        )
        .unwrap_err();
        assert!(err.to_string().contains(".mdc"));
    }
}
