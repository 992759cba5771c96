use rulestack_core::{PackRequest, pack};

use crate::args::Pack;
use crate::commands::discover_project;

pub fn run(args: &Pack) -> anyhow::Result<()> {
    let project = discover_project()?;
    let version = args
        .version
        .as_deref()
        .map(exact_version::parse)
        .transpose()?;

    let outcome = pack(
        &project,
        &PackRequest {
            file: args.file.clone(),
            package: args.package.clone(),
            version,
        },
    )?;

    println!("Staged {}@{}", outcome.name, outcome.version);
    println!("  archive: {}", outcome.archive_path.display());
    println!("  sha256:  {}", outcome.sha256);
    println!("  size:    {} bytes", outcome.size);
    println!("Run `rulestack publish` to upload it.");
    Ok(())
}
