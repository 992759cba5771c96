use rulestack_core::staged_archives;

use crate::commands::discover_project;

pub fn run() -> anyhow::Result<()> {
    let project = discover_project()?;
    let archives = staged_archives(&project)?;
    if archives.is_empty() {
        println!("No staged archives.");
        return Ok(());
    }
    println!("Staged archives:");
    for archive in archives {
        let size = fs_err::metadata(&archive)?.len();
        println!(
            "  {} ({size} bytes)",
            archive
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default()
        );
    }
    Ok(())
}
