//! CLI argument definitions.

use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};

use crate::commands::{RunArgs, SummaryArgs, ValidateArgs};

/// Vegamap - finite-difference vega maps for structured notes
#[derive(Parser)]
#[command(name = "vegamap")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Engine configuration file (TOML); defaults apply when it does not exist
    #[arg(short, long, env = "VEGAMAP_CONFIG", default_value = "vegamap.toml", global = true)]
    pub config: PathBuf,

    /// Output format
    #[arg(short, long, value_enum, default_value = "table", global = true)]
    pub format: OutputFormat,

    /// Only log warnings and errors
    #[arg(short, long, global = true)]
    pub quiet: bool,

    #[command(subcommand)]
    pub command: Commands,
}

/// Available commands
#[derive(Subcommand)]
pub enum Commands {
    /// Compute vega maps for one or more instruments and export them
    Run(RunArgs),

    /// Query cached surfaces for the grid points nearest a tenor and strike
    Summary(SummaryArgs),

    /// Validate the configuration and instrument files without valuing anything
    Validate(ValidateArgs),
}

/// Output format options
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum OutputFormat {
    /// Human-readable table format
    #[default]
    Table,
    /// JSON format
    Json,
    /// CSV format
    Csv,
}
