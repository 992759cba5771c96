use rulestack_core::Project;

use crate::args::Init;

pub fn run(args: &Init) -> anyhow::Result<()> {
    let cwd = std::env::current_dir()?;
    let project = Project::init(&cwd, args.force)?;
    println!(
        "Initialized rulestack project in {}",
        project.root().display()
    );
    println!("Declare dependencies in rulestack.json, then run `rulestack install .`");
    Ok(())
}
