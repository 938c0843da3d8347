//! Valuation service boundary.
//!
//! These types define the contract with the external valuation service:
//! - [`ValuationRequest`]: term sheet, one bump description, numeric controls, requested outputs
//! - [`ValuationResponse`]: the requested outputs as numbers
//! - [`ValuationClient`]: sends a request and returns a response or a [`TraitError`]
//!
//! Client implementations are EXTENSIONS (e.g. `vegamap-ext-rest` -> reqwest).

use std::collections::BTreeMap;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::{TraitError, ValidationError};
use crate::ids::UnderlyingId;
use crate::instrument::TermSheet;

// =============================================================================
// REQUEST PARTS
// =============================================================================

/// How a bump size is applied to the bumped market input.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BumpMethod {
    /// Add the bump size to the input (vol + h).
    #[default]
    Absolute,
    /// Scale the input by the bump size (vol * (1 + h)).
    Relative,
}

/// Outputs the valuation service is asked to return.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum OutputField {
    /// Fair value of the instrument.
    FairValue,
    /// Vega reported by the service itself.
    Vega,
    /// Expected lifetime in years.
    AverageLife,
}

impl OutputField {
    /// Key of this output in a response payload.
    pub fn key(&self) -> &'static str {
        match self {
            OutputField::FairValue => "FairValue",
            OutputField::Vega => "Vega",
            OutputField::AverageLife => "AverageLife",
        }
    }

    /// Outputs requested for every scenario.
    pub fn standard() -> Vec<OutputField> {
        vec![OutputField::FairValue, OutputField::Vega, OutputField::AverageLife]
    }
}

/// Simulation fidelity controls passed through to the valuation service.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct NumericControls {
    /// Monte Carlo path count.
    pub max_paths: u32,
    /// Optional RNG seed; a fixed seed keeps bumped and baseline runs on common numbers.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub seed: Option<u64>,
}

impl NumericControls {
    /// Create controls with the given path count and no seed.
    pub fn new(max_paths: u32) -> Self {
        Self { max_paths, seed: None }
    }

    /// Set a fixed seed.
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }
}

impl Default for NumericControls {
    fn default() -> Self {
        Self::new(100_000)
    }
}

/// The single bump carried by a request.
///
/// The full tenor label grid is always sent, with a bump-size vector
/// aligned to it: zero everywhere except the targeted tenor(s).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BumpDescription {
    /// Underlyings whose volatility is bumped.
    pub instrument_ids: Vec<UnderlyingId>,
    /// Absolute strike of the targeted strike bucket.
    pub strike: f64,
    /// Strike bucket label (center as fraction of spot).
    pub strike_label: String,
    /// Tenor labels of the whole grid (e.g. `"6m"`).
    pub tenors: Vec<String>,
    /// Bump size per tenor, aligned with `tenors`.
    pub tenor_bump_sizes: Vec<f64>,
    /// Bump method.
    pub method: BumpMethod,
}

impl BumpDescription {
    /// True when no tenor carries a bump.
    pub fn is_zero(&self) -> bool {
        self.tenor_bump_sizes.iter().all(|h| *h == 0.0)
    }

    /// Indexes of bumped tenors.
    pub fn bumped_tenors(&self) -> Vec<usize> {
        self.tenor_bump_sizes
            .iter()
            .enumerate()
            .filter(|(_, h)| **h != 0.0)
            .map(|(i, _)| i)
            .collect()
    }
}

// =============================================================================
// REQUEST
// =============================================================================

/// A fully specified valuation request.
///
/// Constructed through [`ValuationRequest::new`], which rejects inconsistent
/// payloads; fields are read-only afterwards.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValuationRequest {
    term_sheet: TermSheet,
    bump: BumpDescription,
    controls: NumericControls,
    outputs: Vec<OutputField>,
}

impl ValuationRequest {
    /// Build a request, validating the bump and outputs.
    pub fn new(
        term_sheet: TermSheet,
        bump: BumpDescription,
        controls: NumericControls,
        outputs: Vec<OutputField>,
    ) -> Result<Self, ValidationError> {
        if bump.instrument_ids.is_empty() {
            return Err(ValidationError::Empty {
                field: "bump.instrument_ids".into(),
            });
        }
        if bump.tenors.is_empty() {
            return Err(ValidationError::Empty {
                field: "bump.tenors".into(),
            });
        }
        if bump.tenor_bump_sizes.len() != bump.tenors.len() {
            return Err(ValidationError::LengthMismatch {
                field: "bump.tenor_bump_sizes".into(),
                against: "bump.tenors".into(),
                expected: bump.tenors.len(),
                actual: bump.tenor_bump_sizes.len(),
            });
        }
        if bump.tenor_bump_sizes.iter().any(|h| !h.is_finite()) {
            return Err(ValidationError::out_of_range(
                "bump.tenor_bump_sizes",
                "bump sizes must be finite",
            ));
        }
        if !bump.strike.is_finite() || bump.strike <= 0.0 {
            return Err(ValidationError::out_of_range(
                "bump.strike",
                format!("strike {} must be positive", bump.strike),
            ));
        }
        if controls.max_paths == 0 {
            return Err(ValidationError::out_of_range("max_paths", "must be at least 1"));
        }
        if !outputs.contains(&OutputField::FairValue) {
            return Err(ValidationError::out_of_range(
                "outputs",
                "FairValue must be requested",
            ));
        }

        Ok(Self {
            term_sheet,
            bump,
            controls,
            outputs,
        })
    }

    /// Term sheet being valued.
    pub fn term_sheet(&self) -> &TermSheet {
        &self.term_sheet
    }

    /// Bump carried by this request.
    pub fn bump(&self) -> &BumpDescription {
        &self.bump
    }

    /// Numeric controls.
    pub fn controls(&self) -> &NumericControls {
        &self.controls
    }

    /// Requested outputs.
    pub fn outputs(&self) -> &[OutputField] {
        &self.outputs
    }

    /// True for a zero-bump (baseline) request.
    pub fn is_baseline(&self) -> bool {
        self.bump.is_zero()
    }
}

// =============================================================================
// RESPONSE
// =============================================================================

/// Successful valuation result.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ValuationResponse {
    /// Fair value.
    pub fair_value: f64,
    /// Greek reported by the service, when requested.
    pub greek: Option<f64>,
    /// Expected lifetime in years, when requested.
    pub average_life: Option<f64>,
}

impl ValuationResponse {
    /// Response carrying only a fair value.
    pub fn fair_value(fair_value: f64) -> Self {
        Self {
            fair_value,
            greek: None,
            average_life: None,
        }
    }

    /// Attach an average life.
    pub fn with_average_life(mut self, years: f64) -> Self {
        self.average_life = Some(years);
        self
    }

    /// Build a typed response from a raw field mapping.
    ///
    /// Every requested output must be present and finite; a missing or
    /// non-numeric field is an error, never a silent zero.
    pub fn from_fields(
        fields: &BTreeMap<String, serde_json::Value>,
        requested: &[OutputField],
    ) -> Result<Self, TraitError> {
        let read = |field: OutputField| -> Result<Option<f64>, TraitError> {
            if !requested.contains(&field) {
                return Ok(None);
            }
            let value = fields
                .get(field.key())
                .ok_or_else(|| TraitError::MissingField(field.key().to_string()))?;
            match value.as_f64() {
                Some(v) if v.is_finite() => Ok(Some(v)),
                _ => Err(TraitError::ParseError(format!(
                    "{} is not a finite number: {}",
                    field.key(),
                    value
                ))),
            }
        };

        let fair_value = read(OutputField::FairValue)?
            .ok_or_else(|| TraitError::MissingField(OutputField::FairValue.key().to_string()))?;

        Ok(Self {
            fair_value,
            greek: read(OutputField::Vega)?,
            average_life: read(OutputField::AverageLife)?,
        })
    }
}

// =============================================================================
// CLIENT TRAIT
// =============================================================================

/// Boundary to the external valuation service.
///
/// Implementations must be safe to call concurrently from many tasks. The
/// engine applies its own per-call timeout around [`ValuationClient::evaluate`].
#[async_trait]
pub trait ValuationClient: Send + Sync {
    /// Value one scenario.
    async fn evaluate(&self, request: &ValuationRequest) -> Result<ValuationResponse, TraitError>;

    /// Name used in logs.
    fn name(&self) -> &str {
        "valuation"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn bump(sizes: Vec<f64>) -> BumpDescription {
        BumpDescription {
            instrument_ids: vec![UnderlyingId::new("NDX.IDX")],
            strike: 22726.0,
            strike_label: "1".into(),
            tenors: (0..sizes.len()).map(|i| format!("{}m", i * 6)).collect(),
            tenor_bump_sizes: sizes,
            method: BumpMethod::Absolute,
        }
    }

    #[test]
    fn test_request_validation() {
        let ts = TermSheet::ndx_autocallable();
        let ok = ValuationRequest::new(
            ts.clone(),
            bump(vec![0.0, 0.0025, 0.0]),
            NumericControls::default(),
            OutputField::standard(),
        )
        .unwrap();
        assert!(!ok.is_baseline());
        assert_eq!(ok.bump().bumped_tenors(), vec![1]);

        let mut mismatched = bump(vec![0.0, 0.0]);
        mismatched.tenors.push("12m".into());
        assert!(matches!(
            ValuationRequest::new(ts.clone(), mismatched, NumericControls::default(), OutputField::standard()),
            Err(ValidationError::LengthMismatch { .. })
        ));

        assert!(ValuationRequest::new(
            ts.clone(),
            bump(vec![0.0]),
            NumericControls::new(0),
            OutputField::standard()
        )
        .is_err());

        assert!(ValuationRequest::new(ts, bump(vec![0.0]), NumericControls::default(), vec![OutputField::Vega]).is_err());
    }

    #[test]
    fn test_request_payload_keys() {
        let request = ValuationRequest::new(
            TermSheet::ndx_autocallable(),
            bump(vec![0.0025, 0.0]),
            NumericControls::new(100_000).with_seed(7),
            OutputField::standard(),
        )
        .unwrap();
        let value = serde_json::to_value(&request).unwrap();
        assert_eq!(value["bump"]["tenor_bump_sizes"], json!([0.0025, 0.0]));
        assert_eq!(value["controls"]["max_paths"], json!(100_000));
        assert_eq!(value["outputs"], json!(["FairValue", "Vega", "AverageLife"]));
        assert_eq!(value["term_sheet"]["Stock_IDs"], json!(["NDX.IDX"]));
    }

    #[test]
    fn test_response_from_fields() {
        let mut fields = BTreeMap::new();
        fields.insert("FairValue".to_string(), json!(100.25));
        fields.insert("Vega".to_string(), json!(0.42));
        fields.insert("AverageLife".to_string(), json!(0.83));

        let response = ValuationResponse::from_fields(&fields, &OutputField::standard()).unwrap();
        assert_eq!(response.fair_value, 100.25);
        assert_eq!(response.greek, Some(0.42));
        assert_eq!(response.average_life, Some(0.83));

        let only_value = ValuationResponse::from_fields(&fields, &[OutputField::FairValue]).unwrap();
        assert_eq!(only_value.average_life, None);
    }

    #[test]
    fn test_response_missing_field_is_error() {
        let mut fields = BTreeMap::new();
        fields.insert("FairValue".to_string(), json!(100.0));

        let err = ValuationResponse::from_fields(&fields, &OutputField::standard()).unwrap_err();
        assert!(matches!(err, TraitError::MissingField(f) if f == "Vega"));

        fields.insert("FairValue".to_string(), json!("n/a"));
        assert!(ValuationResponse::from_fields(&fields, &[OutputField::FairValue]).is_err());
    }
}
