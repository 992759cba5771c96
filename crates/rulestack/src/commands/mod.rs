pub mod add;
pub mod auth;
pub mod init;
pub mod install;
pub mod pack;
pub mod publish;
pub mod registry;
pub mod search;
pub mod status;

use rulestack_core::Project;
use rulestack_core::registry::{RegistryClient, make_client};

use crate::config::UserConfig;

/// The project the current working directory belongs to.
fn discover_project() -> anyhow::Result<Project> {
    Project::discover(&std::env::current_dir()?)
}

/// A client for the user's active registry.
fn active_client(config: &UserConfig) -> anyhow::Result<Box<dyn RegistryClient>> {
    make_client(&config.active()?)
}
