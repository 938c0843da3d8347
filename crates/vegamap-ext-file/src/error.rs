//! Error types for file export and import.

use thiserror::Error;

use vegamap_engine::EngineError;
use vegamap_traits::TraitError;

/// Errors raised while writing or reading vega map files.
#[derive(Error, Debug)]
pub enum ExportError {
    /// Filesystem failure.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Delimited file could not be written or read.
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    /// Heatmap could not be encoded.
    #[error("Image error: {0}")]
    Image(#[from] image::ImageError),

    /// Archive could not be written.
    #[error("Archive error: {0}")]
    Archive(#[from] zip::result::ZipError),

    /// File content does not have the expected layout.
    #[error("Parse error in {file}: {reason}")]
    Parse {
        /// File or entry being read.
        file: String,
        /// What was wrong.
        reason: String,
    },

    /// Decoded values were rejected by the engine types.
    #[error("Engine error: {0}")]
    Engine(#[from] EngineError),

    /// Nothing to export.
    #[error("No runs to export")]
    Empty,
}

impl ExportError {
    pub(crate) fn parse(file: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Parse {
            file: file.into(),
            reason: reason.into(),
        }
    }
}

impl From<ExportError> for TraitError {
    fn from(err: ExportError) -> Self {
        match err {
            ExportError::Io(e) => TraitError::IoError(e.to_string()),
            ExportError::Parse { .. } | ExportError::Csv(_) => TraitError::ParseError(err.to_string()),
            other => TraitError::Internal(other.to_string()),
        }
    }
}

/// Result type for file operations.
pub type ExportResult<T> = Result<T, ExportError>;
