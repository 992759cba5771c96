use crate::args::Search;
use crate::commands::active_client;
use crate::config::UserConfig;

pub async fn run(args: &Search) -> anyhow::Result<()> {
    let config = UserConfig::load()?;
    let client = active_client(&config)?;

    let results = client
        .search(
            &args.query,
            args.tag.as_deref(),
            args.target.as_deref(),
            args.limit,
        )
        .await?;

    if results.is_empty() {
        println!("No packages matched `{}`.", args.query);
        return Ok(());
    }
    for package in results {
        let latest = package.latest.as_deref().unwrap_or("-");
        if package.description.is_empty() {
            println!("{} {latest}", package.name);
        } else {
            println!("{} {latest}  {}", package.name, package.description);
        }
    }
    Ok(())
}
