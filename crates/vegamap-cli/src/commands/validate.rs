//! Validate command implementation.

use std::path::PathBuf;

use anyhow::{bail, Result};
use clap::Args;
use serde::Serialize;
use tabled::Tabled;

use vegamap_traits::config::EngineConfig;

use crate::cli::OutputFormat;
use crate::commands::load_instrument;
use crate::output::{print_error, print_output, print_success};

/// Arguments for the validate command.
#[derive(Args, Debug)]
pub struct ValidateArgs {
    /// Instrument files (JSON term sheets)
    pub instruments: Vec<PathBuf>,
}

#[derive(Debug, Serialize, Tabled)]
struct ValidationRow {
    #[tabled(rename = "File")]
    file: String,
    #[tabled(rename = "Instrument")]
    instrument: String,
    #[tabled(rename = "Underlyings")]
    underlyings: String,
    #[tabled(rename = "Status")]
    status: String,
}

/// Execute the validate command.
pub fn execute(args: ValidateArgs, config: EngineConfig, format: OutputFormat) -> Result<()> {
    if let Err(e) = config.validate() {
        print_error(&format!("Configuration: {e}"));
        bail!("invalid configuration");
    }
    print_success("Configuration is valid");

    let mut invalid = 0;
    let rows: Vec<ValidationRow> = args
        .instruments
        .iter()
        .map(|path| match load_instrument(path) {
            Ok(spec) => ValidationRow {
                file: path.display().to_string(),
                instrument: spec.id().to_string(),
                underlyings: spec
                    .bump_underlyings()
                    .iter()
                    .map(|u| u.as_str())
                    .collect::<Vec<_>>()
                    .join(" "),
                status: "ok".to_string(),
            },
            Err(e) => {
                invalid += 1;
                ValidationRow {
                    file: path.display().to_string(),
                    instrument: String::new(),
                    underlyings: String::new(),
                    status: e.to_string(),
                }
            }
        })
        .collect();

    if !rows.is_empty() {
        print_output(&rows, format)?;
    }
    if invalid > 0 {
        bail!("{invalid} of {} instrument files are invalid", rows.len());
    }
    Ok(())
}
