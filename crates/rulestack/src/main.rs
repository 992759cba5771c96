mod args;
mod commands;
mod config;
mod log;

use clap::Parser;
use tracing::error;

use crate::args::{CliArgs, Command};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = CliArgs::parse();
    log::init(args.log_level());
    run(args).await.map_err(|e| {
        error!("{:?}", e);
        e
    })?;

    Ok(())
}

async fn run(args: CliArgs) -> anyhow::Result<()> {
    match args.command {
        Command::Init(cmd_args) => commands::init::run(&cmd_args),
        Command::Add(cmd_args) => commands::add::run(&cmd_args).await,
        Command::Install(cmd_args) => commands::install::run(&cmd_args).await,
        Command::Pack(cmd_args) => commands::pack::run(&cmd_args),
        Command::Publish => commands::publish::run().await,
        Command::Search(cmd_args) => commands::search::run(&cmd_args).await,
        Command::Registry(cmd_args) => commands::registry::run(&cmd_args).await,
        Command::Auth(cmd_args) => commands::auth::run(&cmd_args).await,
        Command::Status => commands::status::run(),
    }
}
