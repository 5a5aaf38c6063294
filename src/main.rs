use anyhow::Result;
use clap::Parser;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

mod cli;
mod commands;
mod config;
mod db;
mod error;

use cli::{Cli, Commands};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize tracing
    let directive = if cli.verbose {
        "maskdump=debug"
    } else {
        "maskdump=info"
    };
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(EnvFilter::from_default_env().add_directive(directive.parse()?))
        .init();

    let config_path = cli.config.as_deref();

    match cli.command {
        Commands::Dump(args) => commands::dump::run(args, config_path).await,
        Commands::Tables(args) => commands::tables::run(args, config_path).await,
        Commands::Config(args) => commands::config::run(args, config_path),
    }
}
