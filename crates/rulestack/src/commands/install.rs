use anyhow::bail;
use rulestack_core::{InstallOutcome, PackageAction, Project};

use crate::args::Install;
use crate::commands::active_client;
use crate::config::UserConfig;

pub async fn run(args: &Install) -> anyhow::Result<()> {
    let start = fs_err::canonicalize(&args.path)?;
    let project = Project::discover(&start)?;
    let config = UserConfig::load()?;
    let client = active_client(&config)?;

    let outcome = rulestack_core::install(&project, client.as_ref()).await?;
    print_results(&outcome);
    println!("{outcome}");
    if !outcome.is_success() {
        bail!("{} package(s) failed to install", outcome.failed());
    }
    Ok(())
}

pub(super) fn print_results(outcome: &InstallOutcome) {
    for result in &outcome.results {
        let verb = match result.action {
            PackageAction::Installed => "installed",
            PackageAction::Updated => "updated",
            PackageAction::Skipped => "skipped",
            PackageAction::Failed => "failed",
        };
        match &result.detail {
            Some(detail) => println!("  {verb} {}@{}: {detail}", result.name, result.version),
            None => println!("  {verb} {}@{}", result.name, result.version),
        }
    }
}
