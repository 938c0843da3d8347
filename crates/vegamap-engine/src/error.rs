//! Engine error types.

use thiserror::Error;

use vegamap_traits::{InstrumentId, TraitError, ValidationError};

use crate::grid::GridError;

/// Engine error type.
///
/// Failures of individual bumped cells never surface here: they become
/// NaN cells and are counted on the finished run.
#[derive(Debug, Error)]
pub enum EngineError {
    /// Instrument, request or configuration failed validation
    #[error("validation error: {0}")]
    Validation(#[from] ValidationError),

    /// Grid axes could not be built
    #[error("grid error: {0}")]
    Grid(#[from] GridError),

    /// Bump size unusable as a finite-difference divisor
    #[error("invalid bump size: {0}")]
    InvalidBump(f64),

    /// Baseline valuation failed; fatal for this instrument only
    #[error("baseline valuation failed for {instrument_id}: {reason}")]
    BaselineFailure {
        /// Instrument whose grid was abandoned.
        instrument_id: InstrumentId,
        /// Underlying failure.
        reason: String,
    },

    /// Run was cancelled; partial results were discarded
    #[error("run cancelled")]
    Cancelled,

    /// Configuration error
    #[error("configuration error: {0}")]
    Config(String),

    /// Internal error
    #[error("internal error: {0}")]
    Internal(String),
}

impl From<TraitError> for EngineError {
    fn from(e: TraitError) -> Self {
        match e {
            TraitError::Cancelled => EngineError::Cancelled,
            other => EngineError::Internal(other.to_string()),
        }
    }
}

/// Result alias for engine operations.
pub type EngineResult<T> = Result<T, EngineError>;
