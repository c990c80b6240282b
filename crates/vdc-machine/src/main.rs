mod cli;
mod commands;
mod config;
mod error;
mod store;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use crate::cli::Cli;
use crate::commands::Context;
use crate::config::CliConfig;
use crate::error::Result;

#[tokio::main]
async fn main() {
    // Load .env if present
    let _ = dotenvy::dotenv();

    let cli = Cli::parse();

    // Init tracing
    let default_level = if cli.debug { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| default_level.into()),
        )
        .with_writer(std::io::stderr)
        .init();

    if let Err(e) = run(cli).await {
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<()> {
    let config = CliConfig::from_cli(&cli)?;
    tracing::debug!(storage_path = %config.storage_path.display(), "using machine store");

    let ctx = Context::new(&config);
    commands::run(&ctx, cli.command).await
}
