//! Project, lock, and package manifests.
//!
//! `rulestack.json` declares what a workspace depends on,
//! `rulestack.lock.json` pins the archive hash each installed package came
//! from, and the embedded `rulestack.json` inside an archive describes the
//! package itself. All three are plain JSON written with two-space
//! indentation.

use std::collections::BTreeMap;
use std::io::Write;
use std::path::Path;

use anyhow::Context;

/// Schema version written into new project manifests.
pub const MANIFEST_SCHEMA_VERSION: &str = "1.0.0";

/// `rulestack.json` at the project root.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct ProjectManifest {
    pub version: String,
    #[serde(default)]
    pub dependencies: BTreeMap<String, String>,
}

impl Default for ProjectManifest {
    fn default() -> Self {
        Self {
            version: MANIFEST_SCHEMA_VERSION.to_string(),
            dependencies: BTreeMap::new(),
        }
    }
}

impl ProjectManifest {
    /// Read the manifest at `path`. `Ok(None)` if the file doesn't exist,
    /// an error if it exists but can't be parsed.
    pub fn load(path: &Path) -> anyhow::Result<Option<Self>> {
        let Some(contents) = read_optional(path)? else {
            return Ok(None);
        };
        let manifest = serde_json::from_str(&contents)
            .with_context(|| format!("malformed project manifest {}", path.display()))?;
        Ok(Some(manifest))
    }

    pub fn save(&self, path: &Path) -> anyhow::Result<()> {
        write_json(path, self)
    }
}

/// One pinned entry of the lock manifest.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct LockedPackage {
    pub version: String,
    pub sha256: String,
}

/// `rulestack.lock.json`: `name → {version, sha256}`.
#[derive(Debug, Clone, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(transparent)]
pub struct LockManifest {
    pub packages: BTreeMap<String, LockedPackage>,
}

impl LockManifest {
    /// Read the lock at `path`, defaulting to an empty lock when absent.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let Some(contents) = read_optional(path)? else {
            return Ok(Self::default());
        };
        serde_json::from_str(&contents)
            .with_context(|| format!("malformed lock manifest {}", path.display()))
    }

    pub fn save(&self, path: &Path) -> anyhow::Result<()> {
        write_json(path, self)
    }
}

/// The manifest embedded in a package archive (object form).
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct PackageManifest {
    pub name: String,
    pub version: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub files: Vec<String>,
    #[serde(default)]
    pub targets: Vec<String>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub license: String,
}

impl PackageManifest {
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let contents = fs_err::read_to_string(path)?;
        serde_json::from_str(&contents)
            .with_context(|| format!("malformed package manifest {}", path.display()))
    }

    pub fn save(&self, path: &Path) -> anyhow::Result<()> {
        write_json(path, self)
    }
}

fn read_optional(path: &Path) -> anyhow::Result<Option<String>> {
    match fs_err::read_to_string(path) {
        Ok(contents) => Ok(Some(contents)),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e.into()),
    }
}

/// Serialize `value` as pretty JSON and atomically replace `path`.
fn write_json<T: serde::Serialize>(path: &Path, value: &T) -> anyhow::Result<()> {
    let parent = path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .map(Path::to_path_buf)
        .unwrap_or_else(|| Path::new(".").to_path_buf());
    let json = serde_json::to_string_pretty(value)?;
    let mut tmp = tempfile::NamedTempFile::new_in(&parent)
        .with_context(|| format!("cannot create temp file next to {}", path.display()))?;
    tmp.write_all(json.as_bytes())?;
    tmp.write_all(b"\n")?;
    tmp.persist(path)
        .with_context(|| format!("cannot write {}", path.display()))?;
    Ok(())
}
