//! Error types for boundary operations.

use thiserror::Error;

/// Common error type for boundary operations.
///
/// A [`crate::ValuationClient`] reports every failed call with one of these.
#[derive(Debug, Error)]
pub enum TraitError {
    /// Connection to external service failed
    #[error("connection failed: {0}")]
    ConnectionFailed(String),

    /// Service answered with an error status or error payload
    #[error("service error: {0}")]
    ServiceError(String),

    /// Operation timed out
    #[error("timeout")]
    Timeout,

    /// Parse/deserialization error
    #[error("parse error: {0}")]
    ParseError(String),

    /// Serialization error
    #[error("serialization error: {0}")]
    SerializationError(String),

    /// Response did not carry a requested output
    #[error("missing output field: {0}")]
    MissingField(String),

    /// IO error
    #[error("IO error: {0}")]
    IoError(String),

    /// Invalid input
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// Operation abandoned because the run was cancelled
    #[error("cancelled")]
    Cancelled,

    /// Internal error
    #[error("internal error: {0}")]
    Internal(String),
}

impl From<std::io::Error> for TraitError {
    fn from(e: std::io::Error) -> Self {
        TraitError::IoError(e.to_string())
    }
}

impl From<serde_json::Error> for TraitError {
    fn from(e: serde_json::Error) -> Self {
        TraitError::ParseError(e.to_string())
    }
}

/// Validation failure raised before any valuation call is dispatched.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ValidationError {
    /// A required field is empty.
    #[error("field '{field}' must not be empty")]
    Empty {
        /// Field name.
        field: String,
    },

    /// Two fields that must line up have different lengths.
    #[error("field '{field}' has {actual} entries, expected {expected} (to match '{against}')")]
    LengthMismatch {
        /// Field name.
        field: String,
        /// Field it must match.
        against: String,
        /// Expected length.
        expected: usize,
        /// Actual length.
        actual: usize,
    },

    /// A date list goes backwards.
    #[error("field '{field}' is not in chronological order at index {index}")]
    Unordered {
        /// Field name.
        field: String,
        /// First offending index.
        index: usize,
    },

    /// A value could not be parsed.
    #[error("field '{field}': cannot parse '{value}'")]
    Unparseable {
        /// Field name.
        field: String,
        /// Raw text.
        value: String,
    },

    /// A value is outside its allowed range.
    #[error("field '{field}': {message}")]
    OutOfRange {
        /// Field name.
        field: String,
        /// What is wrong with it.
        message: String,
    },
}

impl ValidationError {
    /// Shorthand for [`ValidationError::OutOfRange`].
    pub fn out_of_range(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::OutOfRange {
            field: field.into(),
            message: message.into(),
        }
    }
}
