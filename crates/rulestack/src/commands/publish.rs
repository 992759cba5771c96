use anyhow::bail;

use crate::commands::{active_client, discover_project};
use crate::config::UserConfig;

pub async fn run() -> anyhow::Result<()> {
    let project = discover_project()?;
    let config = UserConfig::load()?;
    let client = active_client(&config)?;

    let outcome = rulestack_core::publish(&project, client.as_ref()).await?;
    if outcome.results.is_empty() {
        println!("Nothing to publish. Stage an archive with `rulestack pack` first.");
        return Ok(());
    }

    let mut failures = 0;
    for archive in &outcome.results {
        match &archive.result {
            Ok(published) => {
                println!("  published {}@{}", published.name, published.version);
                if let Some(pr_url) = &published.pr_url {
                    println!("    open a pull request: {pr_url}");
                }
            }
            Err(e) => {
                failures += 1;
                println!("  failed {}: {e}", archive.archive);
            }
        }
    }
    if failures > 0 {
        bail!("{failures} archive(s) failed to publish");
    }
    Ok(())
}
