//! Engine configuration.
//!
//! Configuration contains:
//! - Concurrency and timeout limits for valuation calls
//! - Bump size, method and finite-difference convention
//! - Grid construction policy (tenor range, strike bands)
//! - Simulation fidelity passed to the valuation service
//!
//! Configuration does NOT contain:
//! - Term sheets (that's instrument input)
//! - Market strike lists (that's market data)

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{TraitError, ValidationError};
use crate::valuation::{BumpMethod, NumericControls};

// =============================================================================
// FINITE-DIFFERENCE CONVENTION
// =============================================================================

/// Finite-difference convention applied to every cell of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DifferenceScheme {
    /// `(v(+h) - v0) / h`: one bumped call per cell.
    #[default]
    Forward,
    /// `(v(+h) - v(-h)) / 2h`: two bumped calls per cell.
    Central,
}

impl DifferenceScheme {
    /// Bumped valuation calls issued per cell.
    pub fn calls_per_cell(&self) -> usize {
        match self {
            DifferenceScheme::Forward => 1,
            DifferenceScheme::Central => 2,
        }
    }
}

/// Granularity of dispatched work items.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DispatchMode {
    /// One work item per cell, one baseline per instrument.
    #[default]
    PerCell,
    /// One work item per strike row, one baseline per row (strike-dependent valuation).
    PerRow,
}

// =============================================================================
// GRID POLICY
// =============================================================================

/// Tenor grid construction in months.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TenorGridConfig {
    /// First edge.
    #[serde(default)]
    pub start_months: u32,
    /// Last edge.
    #[serde(default = "default_end_months")]
    pub end_months: u32,
    /// Edge spacing outside the dense zone.
    #[serde(default = "default_step_months")]
    pub step_months: u32,
    /// Edges up to this tenor use `dense_step_months`.
    #[serde(default)]
    pub dense_until_months: Option<u32>,
    /// Edge spacing inside the dense zone.
    #[serde(default)]
    pub dense_step_months: Option<u32>,
}

fn default_end_months() -> u32 {
    60
}

fn default_step_months() -> u32 {
    6
}

impl Default for TenorGridConfig {
    fn default() -> Self {
        Self {
            start_months: 0,
            end_months: default_end_months(),
            step_months: default_step_months(),
            dense_until_months: None,
            dense_step_months: None,
        }
    }
}

/// Strike inclusion policy, all values as fractions of spot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StrikePolicyConfig {
    /// Lower bound of the outer band.
    #[serde(default = "default_outer_lower")]
    pub outer_lower: f64,
    /// Upper bound of the outer band.
    #[serde(default = "default_outer_upper")]
    pub outer_upper: f64,
    /// Lower bound of the inner (keep-all) band.
    #[serde(default = "default_inner_lower")]
    pub inner_lower: f64,
    /// Upper bound of the inner (keep-all) band.
    #[serde(default = "default_inner_upper")]
    pub inner_upper: f64,
    /// Outside the inner band only multiples of this step are kept.
    #[serde(default = "default_coarse_step")]
    pub coarse_step: f64,
    /// Tolerance for band edges and step multiples.
    #[serde(default = "default_tolerance")]
    pub tolerance: f64,
}

fn default_outer_lower() -> f64 {
    0.5
}

fn default_outer_upper() -> f64 {
    1.5
}

fn default_inner_lower() -> f64 {
    0.9
}

fn default_inner_upper() -> f64 {
    1.1
}

fn default_coarse_step() -> f64 {
    0.10
}

fn default_tolerance() -> f64 {
    1e-6
}

impl Default for StrikePolicyConfig {
    fn default() -> Self {
        Self {
            outer_lower: default_outer_lower(),
            outer_upper: default_outer_upper(),
            inner_lower: default_inner_lower(),
            inner_upper: default_inner_upper(),
            coarse_step: default_coarse_step(),
            tolerance: default_tolerance(),
        }
    }
}

// =============================================================================
// ENGINE CONFIG
// =============================================================================

/// Engine configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Global cap on simultaneous valuation calls across all instruments.
    #[serde(default = "default_max_concurrent_calls")]
    pub max_concurrent_calls: usize,

    /// Per-call timeout in milliseconds.
    #[serde(default = "default_call_timeout_ms")]
    pub call_timeout_ms: u64,

    /// Bump size `h`.
    #[serde(default = "default_bump_size")]
    pub bump_size: f64,

    /// Bump method.
    #[serde(default)]
    pub bump_method: BumpMethod,

    /// Finite-difference convention.
    #[serde(default)]
    pub difference_scheme: DifferenceScheme,

    /// Work item granularity.
    #[serde(default)]
    pub dispatch_mode: DispatchMode,

    /// Monte Carlo path count.
    #[serde(default = "default_max_paths")]
    pub max_paths: u32,

    /// Optional RNG seed.
    #[serde(default)]
    pub seed: Option<u64>,

    /// Tenor grid.
    #[serde(default)]
    pub tenor_grid: TenorGridConfig,

    /// Strike inclusion policy.
    #[serde(default)]
    pub strike_policy: StrikePolicyConfig,

    /// Valuation service endpoint
    #[serde(default = "default_valuation_url")]
    pub valuation_url: String,

    /// Export directory
    #[serde(default = "default_output_dir")]
    pub output_dir: String,
}

fn default_max_concurrent_calls() -> usize {
    8
}

fn default_call_timeout_ms() -> u64 {
    30_000
}

fn default_bump_size() -> f64 {
    0.0025
}

fn default_max_paths() -> u32 {
    100_000
}

fn default_valuation_url() -> String {
    "http://localhost:8000/price".to_string()
}

fn default_output_dir() -> String {
    "./Temp".to_string()
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_concurrent_calls: default_max_concurrent_calls(),
            call_timeout_ms: default_call_timeout_ms(),
            bump_size: default_bump_size(),
            bump_method: BumpMethod::default(),
            difference_scheme: DifferenceScheme::default(),
            dispatch_mode: DispatchMode::default(),
            max_paths: default_max_paths(),
            seed: None,
            tenor_grid: TenorGridConfig::default(),
            strike_policy: StrikePolicyConfig::default(),
            valuation_url: default_valuation_url(),
            output_dir: default_output_dir(),
        }
    }
}

impl EngineConfig {
    /// Load configuration from a TOML file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, TraitError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml(&content)
    }

    /// Load configuration from a TOML file, or the defaults if it does not exist.
    pub fn from_file_or_default(path: impl AsRef<Path>) -> Result<Self, TraitError> {
        let path = path.as_ref();
        if !path.exists() {
            return Ok(Self::default());
        }
        Self::from_file(path)
    }

    /// Parse configuration from TOML text.
    pub fn from_toml(content: &str) -> Result<Self, TraitError> {
        toml::from_str(content).map_err(|e| TraitError::ParseError(e.to_string()))
    }

    /// Per-call timeout.
    pub fn call_timeout(&self) -> Duration {
        Duration::from_millis(self.call_timeout_ms)
    }

    /// Numeric controls for valuation requests.
    pub fn numeric_controls(&self) -> NumericControls {
        NumericControls {
            max_paths: self.max_paths,
            seed: self.seed,
        }
    }

    /// Reject settings that would make a run meaningless.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.max_concurrent_calls == 0 {
            return Err(ValidationError::out_of_range(
                "max_concurrent_calls",
                "must be at least 1",
            ));
        }
        if self.call_timeout_ms == 0 {
            return Err(ValidationError::out_of_range("call_timeout_ms", "must be positive"));
        }
        if !self.bump_size.is_finite() || self.bump_size == 0.0 {
            return Err(ValidationError::out_of_range(
                "bump_size",
                format!("{} is not a usable bump size", self.bump_size),
            ));
        }
        if self.max_paths == 0 {
            return Err(ValidationError::out_of_range("max_paths", "must be at least 1"));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults() {
        let config = EngineConfig::default();
        assert_eq!(config.max_concurrent_calls, 8);
        assert_eq!(config.bump_size, 0.0025);
        assert_eq!(config.difference_scheme, DifferenceScheme::Forward);
        assert_eq!(config.tenor_grid.end_months, 60);
        assert_eq!(config.strike_policy.inner_upper, 1.1);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_toml_fills_defaults() {
        let config = EngineConfig::from_toml(
            r#"
            max_concurrent_calls = 16
            difference_scheme = "central"
            dispatch_mode = "per_row"

            [tenor_grid]
            end_months = 36
            dense_until_months = 12
            dense_step_months = 3
            "#,
        )
        .unwrap();

        assert_eq!(config.max_concurrent_calls, 16);
        assert_eq!(config.difference_scheme, DifferenceScheme::Central);
        assert_eq!(config.dispatch_mode, DispatchMode::PerRow);
        assert_eq!(config.tenor_grid.end_months, 36);
        assert_eq!(config.tenor_grid.step_months, 6);
        assert_eq!(config.tenor_grid.dense_step_months, Some(3));
        assert_eq!(config.bump_size, 0.0025);
    }

    #[test]
    fn test_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "bump_size = 0.01\ncall_timeout_ms = 500").unwrap();

        let config = EngineConfig::from_file(file.path()).unwrap();
        assert_eq!(config.bump_size, 0.01);
        assert_eq!(config.call_timeout(), Duration::from_millis(500));
    }

    #[test]
    fn test_missing_file_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = EngineConfig::from_file_or_default(dir.path().join("vegamap.toml")).unwrap();
        assert_eq!(config.max_concurrent_calls, 8);
        assert!(EngineConfig::from_file(dir.path().join("vegamap.toml")).is_err());
    }

    #[test]
    fn test_validation_rejects_zero_bump() {
        let config = EngineConfig {
            bump_size: 0.0,
            ..Default::default()
        };
        assert!(config.validate().is_err());

        let config = EngineConfig {
            max_concurrent_calls: 0,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_sample_config_matches_defaults() {
        let sample = EngineConfig::from_toml(include_str!("../../../config/vegamap.toml")).unwrap();
        assert_eq!(sample, EngineConfig::default());
    }

    #[test]
    fn test_bad_toml() {
        assert!(matches!(
            EngineConfig::from_toml("max_concurrent_calls = \"many\""),
            Err(TraitError::ParseError(_))
        ));
    }
}
