//! Service configuration, read from the environment at startup.

use std::net::SocketAddr;
use std::path::PathBuf;

use anyhow::Context;

#[derive(Debug, Clone)]
pub struct Config {
    /// sqlx connection string, e.g. `sqlite://rulestack-registry.db?mode=rwc`.
    pub database_url: String,
    pub addr: SocketAddr,
    /// Directory uploaded archives are stored in.
    pub storage_dir: PathBuf,
    /// HS256 signing secret for issued JWTs.
    pub jwt_secret: String,
    /// Lifetime of issued tokens, in hours.
    pub jwt_ttl_hours: i64,
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        let database_url = std::env::var("RULESTACK_DB")
            .unwrap_or_else(|_| "sqlite://rulestack-registry.db?mode=rwc".to_string());
        let addr = std::env::var("RULESTACK_ADDR")
            .unwrap_or_else(|_| "127.0.0.1:8373".to_string())
            .parse()
            .context("invalid RULESTACK_ADDR")?;
        let storage_dir =
            PathBuf::from(std::env::var("RULESTACK_STORAGE").unwrap_or_else(|_| "blobs".to_string()));
        let jwt_secret = std::env::var("RULESTACK_JWT_SECRET")
            .context("RULESTACK_JWT_SECRET must be set to a non-empty secret")?;
        anyhow::ensure!(!jwt_secret.is_empty(), "RULESTACK_JWT_SECRET is empty");
        let jwt_ttl_hours = match std::env::var("RULESTACK_JWT_TTL_HOURS") {
            Ok(value) => value.parse().context("invalid RULESTACK_JWT_TTL_HOURS")?,
            Err(_) => 24 * 30,
        };
        Ok(Self {
            database_url,
            addr,
            storage_dir,
            jwt_secret,
            jwt_ttl_hours,
        })
    }
}
