//! Weft peer host binary.

mod cli;
mod commands;
mod config;
mod logging;

use clap::Parser;
use tracing::debug;

use crate::cli::{Cli, Commands};

#[tokio::main]
async fn main() -> eyre::Result<()> {
    color_eyre::install()?;

    let cli = Cli::parse();
    logging::init_logging(&cli.logs)?;

    let config = config::load(cli.config.as_deref())?;
    debug!(?config, "loaded configuration");

    match cli.command {
        Commands::Echo(args) => commands::echo::run(args, config).await,
        Commands::Hello(args) => commands::hello::run(args, config).await,
        Commands::Id(args) => commands::id::run(args),
    }
}
