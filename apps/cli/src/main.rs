//! Cineload command-line uploader entry point.

mod commands;
mod config;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use commands::Cli;

fn main() -> anyhow::Result<()> {
    // Logs go to stderr so they do not tear the progress bar.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => config::Config::load_from(path)?,
        None => config::Config::load()?,
    };
    tracing::debug!(base_url = %config.base_url, "configuration loaded");

    let rt = tokio::runtime::Runtime::new()?;
    rt.block_on(cli.execute(config))
}
