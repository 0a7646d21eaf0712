use anyhow::Context;
use clap::Parser;
use kubey::cli::{commands, Cli};
use std::process;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let default_level = if cli.verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init()
        .map_err(|e| anyhow::anyhow!("failed to set tracing subscriber: {}", e))?;

    info!("Starting kubey v{}", kubey::VERSION);

    match cli.command {
        Some(command) => commands::handle_command(command)
            .await
            .context("kubey failed"),
        None => {
            eprintln!("No command specified. Use --help for usage information.");
            process::exit(1);
        }
    }
}
