use anyhow::bail;
use rulestack_core::registry::{GitRegistry, RegistryKind};
use secrecy::SecretString;

use crate::args::{Registry, RegistryAdd, RegistryInit, RegistryType};
use crate::config::{RegistryEntry, UserConfig};

pub async fn run(args: &Registry) -> anyhow::Result<()> {
    match args {
        Registry::Add(add_args) => add(add_args),
        Registry::List => list(),
        Registry::Use(use_args) => use_registry(&use_args.name),
        Registry::Remove(remove_args) => remove(&remove_args.name),
        Registry::Init(init_args) => init(init_args),
    }
}

fn kind_of(registry_type: RegistryType) -> RegistryKind {
    match registry_type {
        RegistryType::RemoteHttp => RegistryKind::RemoteHttp,
        RegistryType::Git => RegistryKind::Git,
    }
}

fn add(args: &RegistryAdd) -> anyhow::Result<()> {
    let mut config = UserConfig::load()?;
    let kind = kind_of(args.r#type);
    config.registries.insert(
        args.name.clone(),
        RegistryEntry {
            url: args.url.trim_end_matches('/').to_string(),
            kind: kind.as_str().to_string(),
            username: None,
            jwt_token: None,
            git_token: None,
        },
    );
    // The first configured registry becomes the active one.
    if config.current.is_empty() {
        config.set_current(&args.name)?;
    }
    config.save()?;
    println!("Added {kind} registry `{}`", args.name);
    Ok(())
}

fn list() -> anyhow::Result<()> {
    let config = UserConfig::load()?;
    if config.registries.is_empty() {
        println!("No registries configured. Run `rulestack registry add <name> <url>`.");
        return Ok(());
    }
    for (name, entry) in &config.registries {
        let marker = if *name == config.current { "*" } else { " " };
        println!("{marker} {name} ({}) {}", entry.kind, entry.url);
    }
    Ok(())
}

fn use_registry(name: &str) -> anyhow::Result<()> {
    let mut config = UserConfig::load()?;
    config.set_current(name)?;
    config.save()?;
    println!("Active registry is now `{name}`");
    Ok(())
}

fn remove(name: &str) -> anyhow::Result<()> {
    let mut config = UserConfig::load()?;
    if config.registries.remove(name).is_none() {
        bail!("registry `{name}` is not configured");
    }
    if config.current == name {
        config.current = String::new();
    }
    config.save()?;
    println!("Removed registry `{name}`");
    Ok(())
}

/// Push the default structure of a brand new Git registry.
fn init(args: &RegistryInit) -> anyhow::Result<()> {
    let config = UserConfig::load()?;
    let mut settings = config.active()?;
    if settings.kind != RegistryKind::Git {
        bail!("`registry init` only applies to git registries");
    }
    settings.git_token = Some(SecretString::from(args.token.clone()));

    let registry = GitRegistry::new(settings)?;
    registry.init_registry()?;
    println!("Initialized git registry `{}`", config.current);
    Ok(())
}
