mod cli;
mod commands;
mod layout;
mod output;
mod reconstruct;

use anyhow::Result;
use clap::Parser;
use tracing_subscriber::EnvFilter;

use cli::{Cli, Command};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose > 0 {
        EnvFilter::new(if cli.verbose == 1 { "info" } else { "debug" })
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"))
    };
    tracing_subscriber::fmt().with_env_filter(filter).with_target(false).init();

    match cli.command {
        Command::Create { kind } => commands::create(&cli.root, cli.simulate, kind).await,
        Command::Destroy { id } => commands::destroy(&cli.root, cli.simulate, &id).await,
        Command::Run(args) => commands::run(&cli.root, cli.simulate, args).await,
        Command::State => commands::state(&cli.root).await,
        Command::PrintVars { kinds } => commands::print_vars(&kinds),
    }
}
