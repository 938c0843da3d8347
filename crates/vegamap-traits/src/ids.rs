//! Identifier types used across the engine.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Instrument identifier (term sheet name or ticker).
#[derive(Debug, Clone, Hash, Eq, PartialEq, Ord, PartialOrd, Serialize, Deserialize)]
pub struct InstrumentId(pub String);

impl InstrumentId {
    /// Create a new instrument ID.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Get the ID as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// File-system safe form of the ID.
    ///
    /// Spaces become `_` and path separators become `-`, so
    /// `"TTD US Equity"` maps to `"TTD_US_Equity"`.
    pub fn file_stem(&self) -> String {
        self.0.replace(' ', "_").replace(['/', '\\'], "-")
    }
}

impl fmt::Display for InstrumentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for InstrumentId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for InstrumentId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Underlying identifier (e.g. `NDX.IDX`).
#[derive(Debug, Clone, Hash, Eq, PartialEq, Serialize, Deserialize)]
pub struct UnderlyingId(pub String);

impl UnderlyingId {
    /// Create a new underlying ID.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Get the ID as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for UnderlyingId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for UnderlyingId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_file_stem() {
        assert_eq!(InstrumentId::new("TTD US Equity").file_stem(), "TTD_US_Equity");
        assert_eq!(InstrumentId::new("EUR/USD").file_stem(), "EUR-USD");
        assert_eq!(InstrumentId::new("PCG.US").file_stem(), "PCG.US");
    }

    #[test]
    fn test_display() {
        let id = InstrumentId::from("NDX.IDX");
        assert_eq!(id.to_string(), "NDX.IDX");
        assert_eq!(id.as_str(), "NDX.IDX");
    }
}
