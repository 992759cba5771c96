use anyhow::bail;

use crate::args::Add;
use crate::commands::{active_client, discover_project};
use crate::config::UserConfig;

pub async fn run(args: &Add) -> anyhow::Result<()> {
    let project = discover_project()?;
    let config = UserConfig::load()?;
    let client = active_client(&config)?;

    let outcome = rulestack_core::add(&project, client.as_ref(), &args.package).await?;
    super::install::print_results(&outcome);
    println!("{outcome}");
    if !outcome.is_success() {
        bail!("failed to add {}", args.package);
    }
    Ok(())
}
