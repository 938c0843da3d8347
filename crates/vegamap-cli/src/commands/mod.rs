//! CLI command implementations.

pub mod run;
pub mod summary;
pub mod validate;

pub use run::RunArgs;
pub use summary::SummaryArgs;
pub use validate::ValidateArgs;

use std::path::{Path, PathBuf};

use chrono::NaiveDate;

use vegamap_traits::instrument::InstrumentSpec;

use crate::error::{CliError, CliResult};

/// Parses a date string in YYYY-MM-DD format.
pub fn parse_date(s: &str) -> CliResult<NaiveDate> {
    NaiveDate::parse_from_str(s, "%Y-%m-%d").map_err(|_| CliError::InvalidDate(s.to_string()))
}

/// Reads and validates one instrument file.
pub fn load_instrument(path: &Path) -> CliResult<InstrumentSpec> {
    let invalid = |reason: String| CliError::InvalidInstrument {
        path: path.to_path_buf(),
        reason,
    };
    let json = std::fs::read_to_string(path).map_err(|e| invalid(e.to_string()))?;
    InstrumentSpec::from_json(&json).map_err(|e| invalid(e.to_string()))
}

/// Reads every instrument file, failing on the first invalid one.
pub fn load_instruments(paths: &[PathBuf]) -> CliResult<Vec<InstrumentSpec>> {
    paths.iter().map(|p| load_instrument(p)).collect()
}
