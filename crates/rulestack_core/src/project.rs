//! Project discovery and filesystem layout.

use std::path::{Path, PathBuf};

use anyhow::{Context, bail};
use exact_version::Version;

use crate::manifest::{LockManifest, ProjectManifest};
use crate::{CONTEXT_FILE, LOCK_MANIFEST, PROJECT_MANIFEST, RULESTACK_DIR, STAGED_DIR};

/// A rulestack project rooted at the directory containing `rulestack.json`.
#[derive(Debug, Clone)]
pub struct Project {
    root: PathBuf,
}

impl Project {
    /// Find the project containing `start` by walking up the directory tree.
    pub fn discover(start: &Path) -> anyhow::Result<Self> {
        let mut dir = Some(start);
        while let Some(current) = dir {
            if current.join(PROJECT_MANIFEST).is_file() {
                return Ok(Self {
                    root: current.to_path_buf(),
                });
            }
            dir = current.parent();
        }
        bail!(
            "no {PROJECT_MANIFEST} found in {} or any parent directory. Run `rulestack init` first.",
            start.display()
        )
    }

    /// Scaffold a new project at `root`.
    ///
    /// Refuses to overwrite an existing manifest unless `force` is set.
    pub fn init(root: &Path, force: bool) -> anyhow::Result<Self> {
        let manifest_path = root.join(PROJECT_MANIFEST);
        if manifest_path.exists() && !force {
            bail!(
                "{} already exists. Use --force to overwrite.",
                manifest_path.display()
            );
        }
        ProjectManifest::default().save(&manifest_path)?;
        let project = Self {
            root: root.to_path_buf(),
        };
        fs_err::create_dir_all(project.staged_dir())?;
        crate::context_file::ensure_context_file(&project)?;
        Ok(project)
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn manifest_path(&self) -> PathBuf {
        self.root.join(PROJECT_MANIFEST)
    }

    pub fn lock_path(&self) -> PathBuf {
        self.root.join(LOCK_MANIFEST)
    }

    pub fn rulestack_dir(&self) -> PathBuf {
        self.root.join(RULESTACK_DIR)
    }

    pub fn staged_dir(&self) -> PathBuf {
        self.rulestack_dir().join(STAGED_DIR)
    }

    pub fn context_file_path(&self) -> PathBuf {
        self.root.join(CONTEXT_FILE)
    }

    /// Directory an installed package lives in: `.rulestack/<name>.<version>`.
    pub fn package_dir(&self, name: &str, version: &Version) -> PathBuf {
        self.rulestack_dir().join(format!("{name}.{version}"))
    }

    pub fn load_manifest(&self) -> anyhow::Result<ProjectManifest> {
        ProjectManifest::load(&self.manifest_path())?.with_context(|| {
            format!(
                "project manifest disappeared from {}",
                self.manifest_path().display()
            )
        })
    }

    pub fn load_lock(&self) -> anyhow::Result<LockManifest> {
        LockManifest::load(&self.lock_path())
    }

    /// The version of `name` currently unpacked under `.rulestack/`, if any.
    ///
    /// Highest version wins if several directories for the same package are
    /// lying around.
    pub fn installed_version(&self, name: &str) -> anyhow::Result<Option<Version>> {
        Ok(self
            .installed_packages()?
            .into_iter()
            .filter(|(installed, _)| installed == name)
            .map(|(_, version)| version)
            .max())
    }

    /// All `(name, version)` pairs unpacked under `.rulestack/`.
    pub fn installed_packages(&self) -> anyhow::Result<Vec<(String, Version)>> {
        let dir = self.rulestack_dir();
        if !dir.is_dir() {
            return Ok(vec![]);
        }
        let mut packages = vec![];
        for entry in fs_err::read_dir(&dir)? {
            let entry = entry?;
            if !entry.file_type()?.is_dir() {
                continue;
            }
            let dir_name = entry.file_name();
            let Some(dir_name) = dir_name.to_str() else {
                continue;
            };
            if let Some((name, version)) = parse_package_dir_name(dir_name) {
                packages.push((name, version));
            }
        }
        packages.sort();
        Ok(packages)
    }
}

/// Split `<name>.<version>` into its coordinate.
///
/// Package names may themselves contain dots, so the version is taken from
/// the last three dot-separated components.
fn parse_package_dir_name(dir_name: &str) -> Option<(String, Version)> {
    let mut split = dir_name.rsplitn(4, '.');
    let patch = split.next()?;
    let minor = split.next()?;
    let major = split.next()?;
    let name = split.next()?;
    if name.is_empty() {
        return None;
    }
    let version = exact_version::parse(&format!("{major}.{minor}.{patch}")).ok()?;
    Some((name.to_string(), version))
}
