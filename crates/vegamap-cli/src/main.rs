//! Vegamap CLI - vega maps for structured notes.
//!
//! # Usage
//!
//! ```bash
//! # Check term sheets and configuration
//! vegamap validate notes/ndx_note.json
//!
//! # Compute and export vega maps
//! vegamap --config vegamap.toml run notes/ndx_note.json --strikes strikes.csv
//!
//! # Nearest grid points across cached surfaces
//! vegamap summary --tenor 12 --strike 100 --date 2025-07-07
//! ```

use anyhow::{Context, Result};
use clap::Parser;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use vegamap_traits::config::EngineConfig;

mod cli;
mod commands;
mod error;
mod output;

use cli::{Cli, Commands};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let default_filter = if cli.quiet { "warn" } else { "info,vegamap=debug" };
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| default_filter.into()),
        ))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let config = EngineConfig::from_file_or_default(&cli.config)
        .with_context(|| format!("loading configuration from {}", cli.config.display()))?;
    let format = cli.format;

    match cli.command {
        Commands::Run(args) => commands::run::execute(args, config, format).await?,
        Commands::Summary(args) => commands::summary::execute(args, config, format)?,
        Commands::Validate(args) => commands::validate::execute(args, config, format)?,
    }

    Ok(())
}
