use std::io::Write;

use anyhow::{Context, bail};
use rulestack_core::registry::{HttpRegistry, RegistryKind};
use secrecy::SecretString;
use tracing::warn;

use crate::args::{Auth, AuthLogin, AuthRegister};
use crate::config::UserConfig;

pub async fn run(args: &Auth) -> anyhow::Result<()> {
    match args {
        Auth::Register(register_args) => register(register_args).await,
        Auth::Login(login_args) => login(login_args).await,
        Auth::Logout => logout().await,
        Auth::Whoami => whoami().await,
    }
}

/// The active registry as an HTTP client. Auth is an HTTP-registry feature.
fn active_http(config: &UserConfig) -> anyhow::Result<HttpRegistry> {
    let settings = config.active()?;
    if settings.kind != RegistryKind::RemoteHttp {
        bail!(
            "`auth` requires a remote-http registry; `{}` is a {} registry",
            settings.name,
            settings.kind
        );
    }
    HttpRegistry::new(&settings.url, settings.jwt_token)
}

fn prompt(label: &str) -> anyhow::Result<String> {
    eprint!("{label}: ");
    std::io::stderr().flush()?;
    let mut line = String::new();
    std::io::stdin()
        .read_line(&mut line)
        .context("cannot read from stdin")?;
    let value = line.trim().to_string();
    if value.is_empty() {
        bail!("{label} must not be empty");
    }
    Ok(value)
}

fn required(value: &Option<String>, label: &str) -> anyhow::Result<String> {
    match value {
        Some(value) => Ok(value.clone()),
        None => prompt(label),
    }
}

async fn register(args: &AuthRegister) -> anyhow::Result<()> {
    let config = UserConfig::load()?;
    let client = active_http(&config)?;

    let username = required(&args.username, "username")?;
    let email = required(&args.email, "email")?;
    let password = SecretString::from(required(&args.password, "password")?);

    let user = client.register(&username, &email, &password).await?;
    println!("Created account `{}`. Log in with `rulestack auth login`.", user.username);
    Ok(())
}

async fn login(args: &AuthLogin) -> anyhow::Result<()> {
    let mut config = UserConfig::load()?;
    let client = active_http(&config)?;

    let username = required(&args.username, "username")?;
    let password = SecretString::from(required(&args.password, "password")?);

    let session = client.login(&username, &password).await?;
    let current = config.current.clone();
    let entry = config
        .registries
        .get_mut(&current)
        .context("active registry disappeared from the configuration")?;
    entry.jwt_token = Some(session.token);
    entry.username = Some(session.user.username.clone());
    config.save()?;

    println!(
        "Logged in as `{}` (session expires {})",
        session.user.username, session.expires_at
    );
    Ok(())
}

async fn logout() -> anyhow::Result<()> {
    let mut config = UserConfig::load()?;
    let client = active_http(&config)?;

    // Revoke the session server-side, but always forget the local token.
    if let Err(e) = client.logout().await {
        warn!("could not revoke the session: {e}");
    }
    let current = config.current.clone();
    if let Some(entry) = config.registries.get_mut(&current) {
        entry.jwt_token = None;
    }
    config.save()?;
    println!("Logged out.");
    Ok(())
}

async fn whoami() -> anyhow::Result<()> {
    let config = UserConfig::load()?;
    let client = active_http(&config)?;
    let user = client.profile().await?;
    println!("{} <{}> ({})", user.username, user.email, user.role);
    Ok(())
}
