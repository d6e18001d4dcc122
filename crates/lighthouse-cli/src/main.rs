mod bootstrap;
mod cli_args;
mod commands;

use anyhow::Result;
use clap::Parser;

use crate::bootstrap::{init_tracing, shutdown_token};
use crate::cli_args::{Cli, Command};
use crate::commands::{plugin_help, run_poller, run_webhooks};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.log_json)?;

    match cli.command {
        Command::Webhooks(args) => run_webhooks(args, shutdown_token()?).await,
        Command::Poller(args) => run_poller(args, shutdown_token()?).await,
        Command::PluginHelp => {
            println!("{}", plugin_help()?);
            Ok(())
        }
    }
}
