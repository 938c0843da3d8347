//! CLI error types.

use std::path::PathBuf;

use thiserror::Error;

/// CLI error type.
#[derive(Debug, Error)]
pub enum CliError {
    /// Invalid date format.
    #[error("Invalid date format: {0}. Use YYYY-MM-DD.")]
    InvalidDate(String),

    /// Instrument file could not be read or validated.
    #[error("Invalid instrument file {path}: {reason}")]
    InvalidInstrument {
        /// File that was read.
        path: PathBuf,
        /// What was wrong.
        reason: String,
    },

    /// Invalid strike range.
    #[error("Invalid strike range: {0}")]
    InvalidStrikeRange(String),
}

/// CLI result type.
pub type CliResult<T> = Result<T, CliError>;
