//! Registry clients.
//!
//! Two backends stand behind one operation surface: a bespoke HTTP API and
//! a Git repository treated as a package store. Callers hold a
//! `Box<dyn RegistryClient>` and never care which one they got.

mod git;
mod http;

use std::path::Path;

use anyhow::bail;
use async_trait::async_trait;
use exact_version::Version;
use secrecy::SecretString;

pub use git::GitRegistry;
pub use http::{HttpRegistry, LoginResponse, UserInfo};

/// Errors every backend maps its failures into.
#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    #[error("package not found: {0}")]
    PackageNotFound(String),
    #[error("version not found: {0}")]
    VersionNotFound(String),
    #[error("unauthorized: {0}")]
    Unauthorized(String),
    #[error("rate limited: {0}")]
    RateLimited(String),
    #[error("network error: {0}")]
    Network(String),
    #[error("invalid manifest: {0}")]
    InvalidManifest(String),
    #[error("publish failed: {0}")]
    PublishFailed(String),
}

pub type RegistryResult<T> = Result<T, RegistryError>;

/// Which kind of backend a registry entry declares.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegistryKind {
    RemoteHttp,
    Git,
}

impl RegistryKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::RemoteHttp => "remote-http",
            Self::Git => "git",
        }
    }
}

impl std::fmt::Display for RegistryKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for RegistryKind {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "remote-http" => Ok(Self::RemoteHttp),
            "git" => Ok(Self::Git),
            other => bail!("unknown registry type `{other}`. Use `remote-http` or `git`."),
        }
    }
}

/// One entry of the user's registry configuration.
#[derive(Debug, Clone)]
pub struct RegistrySettings {
    pub name: String,
    pub url: String,
    pub kind: RegistryKind,
    pub username: Option<String>,
    pub jwt_token: Option<SecretString>,
    pub git_token: Option<SecretString>,
}

/// Search result row.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct PackageSummary {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub latest: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub targets: Vec<String>,
}

/// A package with its known versions.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct PackageInfo {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub latest: Option<String>,
    #[serde(default)]
    pub versions: Vec<String>,
}

/// A fully resolved package version.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct VersionInfo {
    pub name: String,
    pub version: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub targets: Vec<String>,
    #[serde(default)]
    pub tags: Vec<String>,
    pub sha256: String,
    #[serde(default)]
    pub size_bytes: u64,
}

/// What a successful publish reports back.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct PublishResult {
    pub name: String,
    pub version: String,
    pub sha256: String,
    pub size: u64,
    #[serde(default)]
    pub pr_url: Option<String>,
}

/// The operation surface both backends satisfy.
#[async_trait]
pub trait RegistryClient: Send + Sync {
    async fn search(
        &self,
        query: &str,
        tag: Option<&str>,
        target: Option<&str>,
        limit: Option<u32>,
    ) -> RegistryResult<Vec<PackageSummary>>;

    async fn get_package(&self, name: &str) -> RegistryResult<PackageInfo>;

    async fn get_version(&self, name: &str, version: &Version) -> RegistryResult<VersionInfo>;

    /// Upload one archive together with its manifest file.
    async fn publish(&self, manifest_path: &Path, archive_path: &Path)
    -> RegistryResult<PublishResult>;

    /// Download the archive with the given hash to `dest`.
    ///
    /// The destination holds the exact archive bytes; the caller verifies
    /// the hash.
    async fn download_blob(&self, sha256: &str, dest: &Path) -> RegistryResult<()>;

    async fn health(&self) -> RegistryResult<()>;

    fn kind(&self) -> RegistryKind;
}

/// Build the client for a configured registry.
pub fn make_client(settings: &RegistrySettings) -> anyhow::Result<Box<dyn RegistryClient>> {
    match settings.kind {
        RegistryKind::RemoteHttp => Ok(Box::new(HttpRegistry::new(
            &settings.url,
            settings.jwt_token.clone(),
        )?)),
        RegistryKind::Git => Ok(Box::new(GitRegistry::new(settings.clone())?)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn registry_kind_round_trips() {
        assert_eq!(
            "remote-http".parse::<RegistryKind>().unwrap(),
            RegistryKind::RemoteHttp
        );
        assert_eq!("git".parse::<RegistryKind>().unwrap(), RegistryKind::Git);
        assert!("svn".parse::<RegistryKind>().is_err());
        assert_eq!(RegistryKind::RemoteHttp.to_string(), "remote-http");
    }
}
