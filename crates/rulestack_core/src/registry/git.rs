//! The Git registry backend.
//!
//! A Git repository is treated as a package store:
//!
//! ```text
//! index.json                          top-level lookup table
//! packages/<name>/metadata.json       per-package version summaries
//! packages/<name>/versions/<v>/manifest.json
//! packages/<name>/versions/<v>/archive.tar.gz
//! ```
//!
//! Reads go through a per-user clone cache. Writes go to the publishing
//! user's fork on a `publish/<name>/<version>` branch; merging the branch
//! upstream happens through a pull request outside of rulestack.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::SecondsFormat;
use exact_version::Version;
use git_run::Repo;
use secrecy::{ExposeSecret, SecretString};
use sha2::{Digest, Sha256};
use tracing::{debug, info};
use url::Url;

use super::{
    PackageInfo, PackageSummary, PublishResult, RegistryClient, RegistryError, RegistryKind,
    RegistryResult, RegistrySettings, VersionInfo,
};
use crate::archive::sha256_file;
use crate::manifest::PackageManifest;

const INDEX_FILE: &str = "index.json";
const PACKAGES_DIR: &str = "packages";
const METADATA_FILE: &str = "metadata.json";
const ARCHIVE_FILE: &str = "archive.tar.gz";
const VERSION_MANIFEST_FILE: &str = "manifest.json";
const DEFAULT_SEARCH_LIMIT: usize = 50;

#[derive(Debug, Clone)]
pub struct GitRegistry {
    url: String,
    username: Option<String>,
    token: Option<SecretString>,
    cache_root: PathBuf,
}

/// Top-level `index.json`.
#[derive(Debug, Clone, Default, serde::Serialize, serde::Deserialize)]
struct RegistryIndex {
    #[serde(default)]
    version: String,
    #[serde(default)]
    updated_at: String,
    #[serde(default)]
    package_count: u64,
    #[serde(default)]
    packages: BTreeMap<String, IndexEntry>,
}

#[derive(Debug, Clone, Default, serde::Serialize, serde::Deserialize)]
struct IndexEntry {
    name: String,
    #[serde(default)]
    description: String,
    #[serde(default)]
    latest: Option<String>,
    #[serde(default)]
    tags: Vec<String>,
    #[serde(default)]
    targets: Vec<String>,
    #[serde(default)]
    updated_at: String,
}

/// `packages/<name>/metadata.json`.
#[derive(Debug, Clone, Default, serde::Serialize, serde::Deserialize)]
struct PackageMetadata {
    name: String,
    #[serde(default)]
    description: String,
    #[serde(default)]
    latest: Option<String>,
    #[serde(default)]
    versions: Vec<VersionSummary>,
    #[serde(default)]
    created_at: String,
    #[serde(default)]
    updated_at: String,
}

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
struct VersionSummary {
    version: String,
    sha256: String,
    #[serde(default)]
    size: u64,
}

impl GitRegistry {
    pub fn new(settings: RegistrySettings) -> anyhow::Result<Self> {
        anyhow::ensure!(!settings.url.is_empty(), "git registry url is empty");
        let cache_root = default_cache_root(&settings.url);
        Ok(Self {
            url: settings.url,
            username: settings.username,
            token: settings.git_token,
            cache_root,
        })
    }

    /// Override the clone cache location. Used by tests.
    pub fn with_cache_root(mut self, cache_root: impl Into<PathBuf>) -> Self {
        self.cache_root = cache_root.into();
        self
    }

    /// URL used for clone/fetch/push, with credentials embedded when the
    /// host speaks HTTP.
    fn authenticated_url(&self, url: &str) -> String {
        let Some(token) = &self.token else {
            return url.to_string();
        };
        let Ok(mut parsed) = Url::parse(url) else {
            return url.to_string();
        };
        if !matches!(parsed.scheme(), "http" | "https") {
            return url.to_string();
        }
        let host = parsed.host_str().unwrap_or_default().to_string();
        let user = basic_auth_username(&host, self.username.as_deref());
        if parsed.set_username(&user).is_err()
            || parsed.set_password(Some(token.expose_secret())).is_err()
        {
            return url.to_string();
        }
        parsed.to_string()
    }

    /// Clone (or refresh) the read cache and return the repo.
    fn reader_repo(&self) -> RegistryResult<Repo> {
        let dir = self.cache_root.join("upstream");
        let repo = if dir.join(".git").exists() {
            let repo = Repo::open(&dir).map_err(network)?;
            repo.fetch("origin").map_err(network)?;
            let default = repo.default_branch("origin").map_err(network)?;
            repo.checkout(&default).map_err(network)?;
            repo.fast_forward(&format!("origin/{default}"))
                .map_err(network)?;
            repo
        } else {
            debug!("cloning registry {} into {}", self.url, dir.display());
            Repo::clone(&self.authenticated_url(&self.url), &dir).map_err(network)?
        };
        Ok(repo)
    }

    /// Load `index.json`, or rebuild an ephemeral index from the package
    /// metadata files when it is missing.
    fn load_index(&self, repo: &Repo) -> RegistryResult<RegistryIndex> {
        let path = repo.directory().join(INDEX_FILE);
        match fs_err::read_to_string(&path) {
            Ok(contents) => serde_json::from_str(&contents)
                .map_err(|e| RegistryError::Network(format!("corrupt registry index: {e}"))),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Ok(rebuild_index(repo.directory()))
            }
            Err(e) => Err(network(e)),
        }
    }

    fn load_metadata(&self, repo: &Repo, name: &str) -> RegistryResult<PackageMetadata> {
        let path = repo
            .directory()
            .join(PACKAGES_DIR)
            .join(name)
            .join(METADATA_FILE);
        match fs_err::read_to_string(&path) {
            Ok(contents) => serde_json::from_str(&contents).map_err(|e| {
                RegistryError::Network(format!("corrupt metadata for {name}: {e}"))
            }),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(RegistryError::PackageNotFound(name.to_string()))
            }
            Err(e) => Err(network(e)),
        }
    }

    /// Create the default structure of a brand new registry repository and
    /// push it as the first commit of the default branch.
    pub fn init_registry(&self) -> RegistryResult<()> {
        if self.token.is_none() {
            return Err(RegistryError::Unauthorized(
                "a token is required to initialize a git registry".to_string(),
            ));
        }
        let work = tempfile::tempdir().map_err(network)?;
        let repo = Repo::init(work.path()).map_err(network)?;

        let index = RegistryIndex {
            version: "1.0.0".to_string(),
            updated_at: timestamp(),
            package_count: 0,
            packages: BTreeMap::new(),
        };
        write_pretty_json(&repo.directory().join(INDEX_FILE), &index).map_err(network)?;
        fs_err::create_dir_all(repo.directory().join(PACKAGES_DIR)).map_err(network)?;
        fs_err::write(
            repo.directory().join(PACKAGES_DIR).join(".gitkeep"),
            "",
        )
        .map_err(network)?;
        fs_err::write(
            repo.directory().join("README.md"),
            "# Rulestack registry\n\nPackages are published under `packages/`.\n",
        )
        .map_err(network)?;

        repo.add_all().map_err(network)?;
        repo.commit("initialize registry").map_err(network)?;
        repo.add_remote("origin", &self.authenticated_url(&self.url))
            .map_err(network)?;
        repo.push("origin", "main")
            .map_err(|e| RegistryError::PublishFailed(format!("cannot push initial commit: {e}")))?;
        info!("initialized git registry at {}", self.url);
        Ok(())
    }

    /// Clone (or refresh) the fork used for publishing.
    fn fork_repo(&self, fork_url: &str) -> RegistryResult<Repo> {
        let dir = self.cache_root.join("fork");
        let repo = if dir.join(".git").exists() {
            Repo::open(&dir).map_err(publish_failed)?
        } else {
            debug!("cloning fork {fork_url} into {}", dir.display());
            let repo =
                Repo::clone(&self.authenticated_url(fork_url), &dir).map_err(publish_failed)?;
            repo.add_remote("upstream", &self.authenticated_url(&self.url))
                .map_err(publish_failed)?;
            repo
        };
        if !repo.has_remote("upstream") {
            repo.add_remote("upstream", &self.authenticated_url(&self.url))
                .map_err(publish_failed)?;
        }
        Ok(repo)
    }
}

#[async_trait]
impl RegistryClient for GitRegistry {
    async fn search(
        &self,
        query: &str,
        tag: Option<&str>,
        target: Option<&str>,
        limit: Option<u32>,
    ) -> RegistryResult<Vec<PackageSummary>> {
        let repo = self.reader_repo()?;
        let index = self.load_index(&repo)?;
        let query = query.to_lowercase();
        let limit = limit.map_or(DEFAULT_SEARCH_LIMIT, |l| l as usize);

        let results = index
            .packages
            .into_values()
            .filter(|entry| {
                query.is_empty()
                    || entry.name.to_lowercase().contains(&query)
                    || entry.description.to_lowercase().contains(&query)
            })
            .filter(|entry| tag.is_none_or(|t| entry.tags.iter().any(|have| have == t)))
            .filter(|entry| target.is_none_or(|t| entry.targets.iter().any(|have| have == t)))
            .take(limit)
            .map(|entry| PackageSummary {
                name: entry.name,
                description: entry.description,
                latest: entry.latest,
                tags: entry.tags,
                targets: entry.targets,
            })
            .collect();
        Ok(results)
    }

    async fn get_package(&self, name: &str) -> RegistryResult<PackageInfo> {
        let repo = self.reader_repo()?;
        let metadata = self.load_metadata(&repo, name)?;
        Ok(PackageInfo {
            name: metadata.name,
            description: metadata.description,
            latest: metadata.latest,
            versions: metadata.versions.into_iter().map(|v| v.version).collect(),
        })
    }

    async fn get_version(&self, name: &str, version: &Version) -> RegistryResult<VersionInfo> {
        let repo = self.reader_repo()?;
        let metadata = self.load_metadata(&repo, name)?;
        let summary = metadata
            .versions
            .iter()
            .find(|v| v.version == version.to_string())
            .ok_or_else(|| RegistryError::VersionNotFound(format!("{name}@{version}")))?;

        // The per-version manifest carries description/targets/tags.
        let manifest_path = repo
            .directory()
            .join(PACKAGES_DIR)
            .join(name)
            .join("versions")
            .join(version.to_string())
            .join(VERSION_MANIFEST_FILE);
        let manifest = PackageManifest::load(&manifest_path)
            .map_err(|e| RegistryError::Network(format!("corrupt version manifest: {e}")))?;

        Ok(VersionInfo {
            name: name.to_string(),
            version: version.to_string(),
            description: manifest.description,
            targets: manifest.targets,
            tags: manifest.tags,
            sha256: summary.sha256.clone(),
            size_bytes: summary.size,
        })
    }

    async fn publish(
        &self,
        manifest_path: &Path,
        archive_path: &Path,
    ) -> RegistryResult<PublishResult> {
        if self.token.is_none() {
            return Err(RegistryError::Unauthorized(
                "a git token is required to publish".to_string(),
            ));
        }
        let Some(username) = self.username.as_deref() else {
            return Err(RegistryError::PublishFailed(
                "a username is required to locate your registry fork".to_string(),
            ));
        };

        let manifest = PackageManifest::load(manifest_path)
            .map_err(|e| RegistryError::InvalidManifest(e.to_string()))?;
        let sha256 = sha256_file(archive_path).map_err(publish_failed)?;
        let size = fs_err::metadata(archive_path).map_err(publish_failed)?.len();

        let upstream = GitHubRepo::parse(&self.url)?;
        let fork_url = format!("https://github.com/{username}/{}.git", upstream.repo);

        let repo = self.fork_repo(&fork_url)?;
        repo.fetch("upstream").map_err(publish_failed)?;
        let default = repo.default_branch("upstream").map_err(publish_failed)?;
        repo.force_checkout_new_branch(&default, &format!("upstream/{default}"))
            .map_err(publish_failed)?;

        let branch = format!("publish/{}/{}", manifest.name, manifest.version);
        repo.force_checkout_new_branch(&branch, &format!("upstream/{default}"))
            .map_err(publish_failed)?;

        write_package_files(repo.directory(), &manifest, archive_path, &sha256, size)
            .map_err(publish_failed)?;

        repo.add_all().map_err(publish_failed)?;
        repo.commit(&format!(
            "publish {}@{}\n\nsha256: {sha256}\nsize: {size} bytes",
            manifest.name, manifest.version
        ))
        .map_err(publish_failed)?;
        // A push failure leaves the local branch in place for manual recovery.
        repo.push("origin", &branch)
            .map_err(|e| RegistryError::PublishFailed(format!("cannot push {branch}: {e}")))?;

        let pr_url = format!(
            "https://github.com/{}/{}/compare/{default}...{username}:{}:{branch}",
            upstream.owner, upstream.repo, upstream.repo
        );
        info!("pushed {branch} to {fork_url}");
        Ok(PublishResult {
            name: manifest.name,
            version: manifest.version,
            sha256,
            size,
            pr_url: Some(pr_url),
        })
    }

    async fn download_blob(&self, sha256: &str, dest: &Path) -> RegistryResult<()> {
        let repo = self.reader_repo()?;
        let packages_dir = repo.directory().join(PACKAGES_DIR);

        // The metadata files act as a hash → path side-index.
        let mut candidate = None;
        if packages_dir.is_dir() {
            'outer: for entry in fs_err::read_dir(&packages_dir).map_err(network)? {
                let entry = entry.map_err(network)?;
                let name = entry.file_name().to_string_lossy().into_owned();
                let Ok(metadata) = self.load_metadata(&repo, &name) else {
                    continue;
                };
                for version in &metadata.versions {
                    if version.sha256 == sha256 {
                        candidate = Some(
                            packages_dir
                                .join(&name)
                                .join("versions")
                                .join(&version.version)
                                .join(ARCHIVE_FILE),
                        );
                        break 'outer;
                    }
                }
            }
        }

        // Fall back to hashing every stored archive.
        let path = match candidate {
            Some(path) if path.is_file() && sha256_file(&path).map_err(network)? == sha256 => path,
            _ => scan_for_archive(&packages_dir, sha256)?
                .ok_or_else(|| RegistryError::PackageNotFound(format!("blob {sha256}")))?,
        };

        fs_err::copy(&path, dest).map_err(network)?;
        Ok(())
    }

    async fn health(&self) -> RegistryResult<()> {
        self.reader_repo().map(|_| ())
    }

    fn kind(&self) -> RegistryKind {
        RegistryKind::Git
    }
}

/// Owner and repository name of a GitHub-hosted registry.
#[derive(Debug, PartialEq, Eq)]
struct GitHubRepo {
    owner: String,
    repo: String,
}

impl GitHubRepo {
    fn parse(url: &str) -> RegistryResult<Self> {
        let parsed = Url::parse(url)
            .map_err(|e| RegistryError::PublishFailed(format!("invalid registry url: {e}")))?;
        let host = parsed.host_str().unwrap_or_default();
        if !host.contains("github.com") {
            return Err(RegistryError::PublishFailed(format!(
                "publish requires a GitHub-hosted registry, got {host}"
            )));
        }
        let mut segments = parsed.path_segments().into_iter().flatten();
        let owner = segments.next().unwrap_or_default().to_string();
        let repo = segments
            .next()
            .unwrap_or_default()
            .trim_end_matches(".git")
            .to_string();
        if owner.is_empty() || repo.is_empty() {
            return Err(RegistryError::PublishFailed(format!(
                "cannot determine owner/repository from {url}"
            )));
        }
        Ok(Self { owner, repo })
    }
}

/// Basic-auth username each git host expects for token authentication.
fn basic_auth_username(host: &str, configured: Option<&str>) -> String {
    if host.contains("gitlab") {
        "oauth2".to_string()
    } else if host.contains("bitbucket") {
        "x-token-auth".to_string()
    } else if host.contains("github") {
        configured.unwrap_or("x-access-token").to_string()
    } else {
        configured.unwrap_or("git").to_string()
    }
}

fn default_cache_root(url: &str) -> PathBuf {
    let base = dirs::cache_dir().unwrap_or_else(std::env::temp_dir);
    base.join("rulestack").join("registries").join(url_key(url))
}

/// Stable directory key for a registry URL.
fn url_key(url: &str) -> String {
    let digest = Sha256::digest(url.as_bytes());
    hex::encode(digest)[..16].to_string()
}

fn timestamp() -> String {
    chrono::Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true)
}

fn network(e: impl std::fmt::Display) -> RegistryError {
    RegistryError::Network(e.to_string())
}

fn publish_failed(e: impl std::fmt::Display) -> RegistryError {
    RegistryError::PublishFailed(e.to_string())
}

fn write_pretty_json<T: serde::Serialize>(path: &Path, value: &T) -> anyhow::Result<()> {
    if let Some(parent) = path.parent() {
        fs_err::create_dir_all(parent)?;
    }
    let mut json = serde_json::to_string_pretty(value)?;
    json.push('\n');
    fs_err::write(path, json)?;
    Ok(())
}

/// Walk `packages/*/metadata.json` to recover a missing index.
fn rebuild_index(root: &Path) -> RegistryIndex {
    let mut index = RegistryIndex {
        version: "1.0.0".to_string(),
        ..RegistryIndex::default()
    };
    let packages_dir = root.join(PACKAGES_DIR);
    let Ok(entries) = fs_err::read_dir(&packages_dir) else {
        return index;
    };
    for entry in entries.filter_map(Result::ok) {
        let metadata_path = entry.path().join(METADATA_FILE);
        let Ok(contents) = fs_err::read_to_string(&metadata_path) else {
            continue;
        };
        let Ok(metadata) = serde_json::from_str::<PackageMetadata>(&contents) else {
            continue;
        };
        index.packages.insert(
            metadata.name.clone(),
            IndexEntry {
                name: metadata.name,
                description: metadata.description,
                latest: metadata.latest,
                updated_at: metadata.updated_at,
                ..IndexEntry::default()
            },
        );
    }
    index.package_count = index.packages.len() as u64;
    index
}

fn scan_for_archive(packages_dir: &Path, sha256: &str) -> RegistryResult<Option<PathBuf>> {
    if !packages_dir.is_dir() {
        return Ok(None);
    }
    for entry in walkdir::WalkDir::new(packages_dir)
        .into_iter()
        .filter_map(Result::ok)
        .filter(|e| e.file_type().is_file() && e.file_name() == ARCHIVE_FILE)
    {
        if sha256_file(entry.path()).map_err(network)? == sha256 {
            return Ok(Some(entry.into_path()));
        }
    }
    Ok(None)
}

/// Write manifest, archive, per-package metadata, and the top-level index
/// for one published version.
fn write_package_files(
    root: &Path,
    manifest: &PackageManifest,
    archive_path: &Path,
    sha256: &str,
    size: u64,
) -> anyhow::Result<()> {
    let package_dir = root.join(PACKAGES_DIR).join(&manifest.name);
    let version_dir = package_dir.join("versions").join(&manifest.version);
    fs_err::create_dir_all(&version_dir)?;

    write_pretty_json(&version_dir.join(VERSION_MANIFEST_FILE), manifest)?;
    fs_err::copy(archive_path, version_dir.join(ARCHIVE_FILE))?;

    let metadata_path = package_dir.join(METADATA_FILE);
    let mut metadata = match fs_err::read_to_string(&metadata_path) {
        Ok(contents) => serde_json::from_str::<PackageMetadata>(&contents)?,
        Err(_) => PackageMetadata {
            name: manifest.name.clone(),
            created_at: timestamp(),
            ..PackageMetadata::default()
        },
    };
    metadata.description = manifest.description.clone();
    metadata.latest = Some(manifest.version.clone());
    metadata.updated_at = timestamp();
    metadata.versions.retain(|v| v.version != manifest.version);
    metadata.versions.push(VersionSummary {
        version: manifest.version.clone(),
        sha256: sha256.to_string(),
        size,
    });
    write_pretty_json(&metadata_path, &metadata)?;

    let index_path = root.join(INDEX_FILE);
    let mut index = match fs_err::read_to_string(&index_path) {
        Ok(contents) => serde_json::from_str::<RegistryIndex>(&contents)?,
        Err(_) => RegistryIndex {
            version: "1.0.0".to_string(),
            ..RegistryIndex::default()
        },
    };
    index.packages.insert(
        manifest.name.clone(),
        IndexEntry {
            name: manifest.name.clone(),
            description: manifest.description.clone(),
            latest: Some(manifest.version.clone()),
            tags: manifest.tags.clone(),
            targets: manifest.targets.clone(),
            updated_at: timestamp(),
        },
    );
    index.package_count = index.packages.len() as u64;
    index.updated_at = timestamp();
    write_pretty_json(&index_path, &index)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::create_archive;

    fn settings(url: &str) -> RegistrySettings {
        RegistrySettings {
            name: "test".to_string(),
            url: url.to_string(),
            kind: RegistryKind::Git,
            username: Some("alice".to_string()),
            jwt_token: None,
            git_token: None,
        }
    }

    /// Build a registry repo with one published package and return its path.
    fn upstream_with_package() -> (tempfile::TempDir, String) {
        let dir = tempfile::tempdir().unwrap();
        let repo = Repo::init(dir.path()).unwrap();

        let rules = tempfile::tempdir().unwrap();
        fs_err::write(rules.path().join("rules.md"), "# rules\n").unwrap();
        let staged = dir.path().join("staged.tgz");
        create_archive(rules.path(), &staged).unwrap();
        let sha256 = sha256_file(&staged).unwrap();
        let size = fs_err::metadata(&staged).unwrap().len();

        let manifest = PackageManifest {
            name: "sec".to_string(),
            version: "1.0.0".to_string(),
            description: "security rules".to_string(),
            files: vec!["rules.md".to_string()],
            targets: vec!["claude".to_string()],
            tags: vec!["security".to_string()],
            license: "MIT".to_string(),
        };
        write_package_files(dir.path(), &manifest, &staged, &sha256, size).unwrap();
        fs_err::remove_file(&staged).unwrap();

        repo.add_all().unwrap();
        repo.commit("publish sec@1.0.0").unwrap();
        let url = dir.path().display().to_string();
        (dir, url)
    }

    fn test_registry(url: &str, cache: &Path) -> GitRegistry {
        GitRegistry::new(settings(url))
            .unwrap()
            .with_cache_root(cache)
    }

    #[test]
    fn url_keys_are_stable_and_distinct() {
        assert_eq!(url_key("https://a"), url_key("https://a"));
        assert_ne!(url_key("https://a"), url_key("https://b"));
        assert_eq!(url_key("https://a").len(), 16);
    }

    #[test]
    fn basic_auth_usernames_follow_the_host() {
        assert_eq!(basic_auth_username("gitlab.com", Some("me")), "oauth2");
        assert_eq!(
            basic_auth_username("bitbucket.org", Some("me")),
            "x-token-auth"
        );
        assert_eq!(basic_auth_username("github.com", Some("me")), "me");
        assert_eq!(basic_auth_username("github.com", None), "x-access-token");
    }

    #[test]
    fn github_repo_parsing() {
        let repo = GitHubRepo::parse("https://github.com/acme/rules-registry.git").unwrap();
        assert_eq!(repo.owner, "acme");
        assert_eq!(repo.repo, "rules-registry");

        let err = GitHubRepo::parse("https://gitlab.com/acme/rules-registry").unwrap_err();
        assert!(matches!(err, RegistryError::PublishFailed(_)));
    }

    #[tokio::test]
    async fn reads_package_metadata_from_clone() {
        let (_upstream, url) = upstream_with_package();
        let cache = tempfile::tempdir().unwrap();
        let registry = test_registry(&url, cache.path());

        let package = registry.get_package("sec").await.unwrap();
        assert_eq!(package.latest.as_deref(), Some("1.0.0"));
        assert_eq!(package.versions, vec!["1.0.0"]);

        let version = registry
            .get_version("sec", &Version::new(1, 0, 0))
            .await
            .unwrap();
        assert_eq!(version.description, "security rules");
        assert!(!version.sha256.is_empty());

        let missing = registry.get_version("sec", &Version::new(2, 0, 0)).await;
        assert!(matches!(missing, Err(RegistryError::VersionNotFound(_))));
    }

    #[tokio::test]
    async fn search_filters_by_query_and_tag() {
        let (_upstream, url) = upstream_with_package();
        let cache = tempfile::tempdir().unwrap();
        let registry = test_registry(&url, cache.path());

        let hits = registry.search("sec", None, None, None).await.unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].name, "sec");

        let hits = registry
            .search("", Some("security"), None, None)
            .await
            .unwrap();
        assert_eq!(hits.len(), 1);

        let hits = registry
            .search("", Some("nope"), None, None)
            .await
            .unwrap();
        assert!(hits.is_empty());
    }

    #[tokio::test]
    async fn missing_index_is_rebuilt_from_metadata() {
        let (upstream, url) = upstream_with_package();
        let repo = Repo::open(upstream.path()).unwrap();
        fs_err::remove_file(upstream.path().join(INDEX_FILE)).unwrap();
        repo.add_all().unwrap();
        repo.commit("drop index").unwrap();

        let cache = tempfile::tempdir().unwrap();
        let registry = test_registry(&url, cache.path());
        let hits = registry.search("sec", None, None, None).await.unwrap();
        assert_eq!(hits.len(), 1);
    }

    #[tokio::test]
    async fn download_blob_finds_archive_by_hash() {
        let (_upstream, url) = upstream_with_package();
        let cache = tempfile::tempdir().unwrap();
        let registry = test_registry(&url, cache.path());

        let version = registry
            .get_version("sec", &Version::new(1, 0, 0))
            .await
            .unwrap();
        let dest_dir = tempfile::tempdir().unwrap();
        let dest = dest_dir.path().join("blob.tgz");
        registry.download_blob(&version.sha256, &dest).await.unwrap();
        assert_eq!(sha256_file(&dest).unwrap(), version.sha256);

        let missing = registry.download_blob("0000", &dest).await;
        assert!(matches!(missing, Err(RegistryError::PackageNotFound(_))));
    }

    #[tokio::test]
    async fn publish_without_token_is_unauthorized() {
        let registry = GitRegistry::new(settings("https://github.com/acme/registry")).unwrap();
        let dir = tempfile::tempdir().unwrap();
        let manifest = dir.path().join("m.json");
        let archive = dir.path().join("a.tgz");
        fs_err::write(&manifest, "{}").unwrap();
        fs_err::write(&archive, "gz").unwrap();

        let err = registry.publish(&manifest, &archive).await.unwrap_err();
        assert!(matches!(err, RegistryError::Unauthorized(_)));
    }
}
