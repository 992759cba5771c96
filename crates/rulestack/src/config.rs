//! User configuration: `<config_dir>/rulestack/config.toml`.

use std::collections::BTreeMap;
use std::path::PathBuf;

use anyhow::{Context, bail};
use rulestack_core::registry::{RegistryKind, RegistrySettings};
use secrecy::SecretString;

#[derive(Debug, Clone, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct UserConfig {
    /// Name of the active registry; empty when none is selected.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub current: String,
    /// Legacy single-user section, kept as a fallback for username and
    /// token when a registry entry doesn't carry its own.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user: Option<LegacyUser>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub registries: BTreeMap<String, RegistryEntry>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct LegacyUser {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct RegistryEntry {
    pub url: String,
    #[serde(rename = "type", default = "default_kind")]
    pub kind: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub jwt_token: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub git_token: Option<String>,
}

fn default_kind() -> String {
    RegistryKind::RemoteHttp.as_str().to_string()
}

impl UserConfig {
    pub fn default_path() -> anyhow::Result<PathBuf> {
        if let Ok(path) = std::env::var("RULESTACK_CONFIG") {
            return Ok(PathBuf::from(path));
        }
        let base = dirs::config_dir().context("cannot determine the user config directory")?;
        Ok(base.join("rulestack").join("config.toml"))
    }

    pub fn load() -> anyhow::Result<Self> {
        Self::load_from(&Self::default_path()?)
    }

    pub fn load_from(path: &PathBuf) -> anyhow::Result<Self> {
        match fs_err::read_to_string(path) {
            Ok(contents) => toml::from_str(&contents)
                .with_context(|| format!("invalid config file {}", path.display())),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Self::default()),
            Err(e) => Err(e.into()),
        }
    }

    pub fn save(&self) -> anyhow::Result<()> {
        self.save_to(&Self::default_path()?)
    }

    pub fn save_to(&self, path: &PathBuf) -> anyhow::Result<()> {
        if let Some(parent) = path.parent() {
            fs_err::create_dir_all(parent)?;
        }
        let contents = toml::to_string_pretty(self)?;
        fs_err::write(path, contents)?;
        Ok(())
    }

    /// Select the active registry, enforcing that it is configured.
    pub fn set_current(&mut self, name: &str) -> anyhow::Result<()> {
        if !self.registries.contains_key(name) {
            bail!("registry `{name}` is not configured. Run `rulestack registry list`.");
        }
        self.current = name.to_string();
        Ok(())
    }

    /// Resolve the active registry into client settings, applying the
    /// legacy `[user]` fallback.
    pub fn active(&self) -> anyhow::Result<RegistrySettings> {
        if self.current.is_empty() {
            bail!("no active registry. Run `rulestack registry use <name>` first.");
        }
        self.settings_for(&self.current)
    }

    pub fn settings_for(&self, name: &str) -> anyhow::Result<RegistrySettings> {
        let entry = self
            .registries
            .get(name)
            .with_context(|| format!("registry `{name}` is not configured"))?;
        let kind: RegistryKind = entry.kind.parse()?;
        let legacy = self.user.clone().unwrap_or_default();

        let username = entry.username.clone().or(legacy.username);
        let jwt_token = entry
            .jwt_token
            .clone()
            .or_else(|| (kind == RegistryKind::RemoteHttp).then(|| legacy.token.clone()).flatten())
            .map(SecretString::from);
        let git_token = entry
            .git_token
            .clone()
            .or_else(|| (kind == RegistryKind::Git).then(|| legacy.token.clone()).flatten())
            .map(SecretString::from);

        Ok(RegistrySettings {
            name: name.to_string(),
            url: entry.url.clone(),
            kind,
            username,
            jwt_token,
            git_token,
        })
    }
}
