//! Instrument term sheets.
//!
//! An [`InstrumentSpec`] is the immutable description of one autocallable
//! note handed to the engine. Field names on the wire match the term sheet
//! keys used by the valuation service (`Stock_IDs`, `Autocall_Barrier`, ...).
//!
//! The engine never mutates a spec; it only reads it to build requests.

use std::str::FromStr;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::error::ValidationError;
use crate::ids::{InstrumentId, UnderlyingId};

// =============================================================================
// BARRIER SHIFT PARAMETERS
// =============================================================================

/// Barrier shift parameters applied by the valuation service.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BarrierShiftParameters {
    /// Absolute shift per autocall observation.
    #[serde(rename = "Autocall_Absolute_Shift", default)]
    pub autocall_absolute_shift: Vec<f64>,
    /// Dates the autocall shifts apply from.
    #[serde(rename = "Autocall_Shift_Dates", default)]
    pub autocall_shift_dates: Vec<NaiveDate>,
    /// Absolute shift per coupon observation.
    #[serde(rename = "Coupon_Absolute_Shift", default)]
    pub coupon_absolute_shift: Vec<f64>,
    /// Absolute spread per coupon observation.
    #[serde(rename = "Coupon_Absolute_Spread", default)]
    pub coupon_absolute_spread: Vec<f64>,
    /// Dates the coupon shifts apply from.
    #[serde(rename = "Coupon_Shift_Dates", default)]
    pub coupon_shift_dates: Vec<NaiveDate>,
    /// Absolute shift of the maturity barrier.
    #[serde(rename = "Maturity_Barrier_Absolute_Shift", default)]
    pub maturity_barrier_absolute_shift: f64,
    /// Absolute spread of the maturity barrier.
    #[serde(rename = "Maturity_Barrier_Absolute_Spread", default)]
    pub maturity_barrier_absolute_spread: f64,
    /// Absolute shifts of the maturity knock-out levels.
    #[serde(rename = "Maturity_Barrier_Knock_Out_Levels_Absolute_Shift", default)]
    pub maturity_barrier_knock_out_levels_absolute_shift: Vec<f64>,
}

impl BarrierShiftParameters {
    /// Check that each shift list lines up with its date list.
    pub fn validate(&self) -> Result<(), ValidationError> {
        check_len(
            "Autocall_Absolute_Shift",
            self.autocall_absolute_shift.len(),
            "Autocall_Shift_Dates",
            self.autocall_shift_dates.len(),
        )?;
        check_len(
            "Coupon_Absolute_Shift",
            self.coupon_absolute_shift.len(),
            "Coupon_Shift_Dates",
            self.coupon_shift_dates.len(),
        )?;
        check_optional_len(
            "Coupon_Absolute_Spread",
            self.coupon_absolute_spread.len(),
            "Coupon_Shift_Dates",
            self.coupon_shift_dates.len(),
        )?;
        check_chronological("Autocall_Shift_Dates", &self.autocall_shift_dates)?;
        check_chronological("Coupon_Shift_Dates", &self.coupon_shift_dates)?;
        Ok(())
    }
}

// =============================================================================
// TERM SHEET
// =============================================================================

/// Product terms of an autocallable note.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TermSheet {
    /// Accrual rule (e.g. "Inside Range").
    #[serde(rename = "Accrues_When")]
    pub accrues_when: String,
    /// Day count basis (e.g. "ACT/365").
    #[serde(rename = "Daycount_Basis")]
    pub daycount_basis: String,
    /// Payment currency.
    #[serde(rename = "Pay_ID")]
    pub pay_id: String,
    /// Underlying identifiers.
    #[serde(rename = "Stock_IDs")]
    pub stock_ids: Vec<UnderlyingId>,
    /// Strike setting date(s).
    #[serde(rename = "Strike_Setting_Date")]
    pub strike_setting_date: Vec<NaiveDate>,
    /// Premium settlement date.
    #[serde(rename = "Premium_Settlement_Date")]
    pub premium_settlement_date: NaiveDate,
    /// Whether the product is a note (principal at risk is funded).
    #[serde(rename = "Is_Note")]
    pub is_note: bool,

    /// Basket aggregation rule.
    #[serde(rename = "Basket_Level_Type")]
    pub basket_level_type: String,
    /// Basket weights, one per underlying.
    #[serde(rename = "Basket_Weights")]
    pub basket_weights: Vec<f64>,

    /// Autocall barrier per observation (fraction of initial level).
    #[serde(rename = "Autocall_Barrier")]
    pub autocall_barrier: Vec<f64>,
    /// Autocall observation dates.
    #[serde(rename = "Autocall_Dates")]
    pub autocall_dates: Vec<NaiveDate>,
    /// Autocall ex-dates (optional, one per observation when present).
    #[serde(rename = "Autocall_Ex_Dates", default)]
    pub autocall_ex_dates: Vec<NaiveDate>,
    /// Autocall payment dates.
    #[serde(rename = "Autocall_Pay_Dates")]
    pub autocall_pay_dates: Vec<NaiveDate>,

    /// Coupon determination dates.
    #[serde(rename = "Coupon_Determination_Dates")]
    pub coupon_determination_dates: Vec<NaiveDate>,
    /// Coupon determination ex-dates.
    #[serde(rename = "Coupon_Determination_Ex_Dates", default)]
    pub coupon_determination_ex_dates: Vec<NaiveDate>,
    /// Coupon low barrier per observation.
    #[serde(rename = "Coupon_Low_Barrier")]
    pub coupon_low_barrier: Vec<f64>,
    /// Coupon memory cutoff dates.
    #[serde(rename = "Coupon_Memory_Cutoff_Dates", default)]
    pub coupon_memory_cutoff_dates: Vec<NaiveDate>,
    /// Coupon memory multiplier per observation.
    #[serde(rename = "Coupon_Memory_Multiplier")]
    pub coupon_memory_multiplier: Vec<f64>,
    /// Coupon observation barrier type.
    #[serde(rename = "Coupon_Multiple_Observation_Barrier_Type")]
    pub coupon_multiple_observation_barrier_type: String,
    /// Coupon payment dates.
    #[serde(rename = "Coupon_Pay_Dates")]
    pub coupon_pay_dates: Vec<NaiveDate>,

    /// Maturity barrier (fraction of initial level).
    #[serde(rename = "Maturity_Barrier")]
    pub maturity_barrier: f64,
    /// Maturity date.
    #[serde(rename = "Maturity_Date")]
    pub maturity_date: NaiveDate,
    /// Maturity option barrier type (e.g. "Knock-In").
    #[serde(rename = "Maturity_Option_Barrier_Type")]
    pub maturity_option_barrier_type: String,
    /// Maturity settlement date.
    #[serde(rename = "Maturity_Settlement_Date")]
    pub maturity_settlement_date: NaiveDate,

    /// Participation per coupon observation.
    #[serde(rename = "Participation", default)]
    pub participation: Vec<f64>,
    /// Participation with memory coupons.
    #[serde(rename = "Participation_With_Memory_Coupons", default)]
    pub participation_with_memory_coupons: Vec<f64>,
    /// Variable coupon strike.
    #[serde(rename = "Variable_Coupon_Strike", default)]
    pub variable_coupon_strike: Vec<f64>,
    /// Variable coupon strike with memory coupons.
    #[serde(rename = "Variable_Coupon_Strike_With_Memory_Coupons", default)]
    pub variable_coupon_strike_with_memory_coupons: Vec<f64>,
    /// Return notional when recalled.
    #[serde(rename = "Return_Notional_At_Recall")]
    pub return_notional_at_recall: bool,
    /// Downside participation.
    #[serde(rename = "Downside_Participation")]
    pub downside_participation: f64,
    /// Fixed return per coupon observation.
    #[serde(rename = "Fixed_Return", default)]
    pub fixed_return: Vec<f64>,
    /// Floating payment multiplier.
    #[serde(rename = "Floating_Payment_Multiplier")]
    pub floating_payment_multiplier: f64,
    /// Guaranteed minimum maturity return.
    #[serde(rename = "Guaranteed_Minimum_Maturity_Return")]
    pub guaranteed_minimum_maturity_return: f64,
    /// Initial reference level per underlying.
    #[serde(rename = "Initial_Levels")]
    pub initial_levels: Vec<f64>,

    /// Barrier shift parameters.
    #[serde(rename = "Barrier_Shift_Parameters", default)]
    pub barrier_shift_parameters: BarrierShiftParameters,
}

impl TermSheet {
    /// Single-underlying NDX autocallable with quarterly observations.
    ///
    /// These are the terms the parameter form is pre-populated with.
    pub fn ndx_autocallable() -> Self {
        let d = |y, m, day| NaiveDate::from_ymd_opt(y, m, day).unwrap_or_default();
        let observations = vec![d(2025, 11, 7), d(2026, 2, 9), d(2026, 5, 7), d(2026, 8, 7)];
        let pay_dates = vec![d(2025, 11, 12), d(2026, 2, 12), d(2026, 5, 12), d(2026, 8, 12)];

        Self {
            accrues_when: "Inside Range".into(),
            daycount_basis: "ACT/365".into(),
            pay_id: "USD".into(),
            stock_ids: vec![UnderlyingId::new("NDX.IDX")],
            strike_setting_date: vec![d(2025, 7, 7)],
            premium_settlement_date: d(2025, 7, 10),
            is_note: true,
            basket_level_type: "Weighted Sum of Asset Returns".into(),
            basket_weights: vec![1.0],
            autocall_barrier: vec![1.0; 4],
            autocall_dates: observations.clone(),
            autocall_ex_dates: Vec::new(),
            autocall_pay_dates: pay_dates.clone(),
            coupon_determination_dates: vec![
                d(2025, 11, 10),
                d(2026, 2, 9),
                d(2026, 5, 7),
                d(2026, 8, 7),
            ],
            coupon_determination_ex_dates: Vec::new(),
            coupon_low_barrier: vec![0.7; 4],
            coupon_memory_cutoff_dates: Vec::new(),
            coupon_memory_multiplier: vec![1.0; 4],
            coupon_multiple_observation_barrier_type: "Inside Range".into(),
            coupon_pay_dates: pay_dates,
            maturity_barrier: 0.7,
            maturity_date: d(2026, 8, 7),
            maturity_option_barrier_type: "Knock-In".into(),
            maturity_settlement_date: d(2026, 8, 12),
            participation: vec![0.0; 4],
            participation_with_memory_coupons: vec![0.0; 4],
            variable_coupon_strike: vec![1.0; 4],
            variable_coupon_strike_with_memory_coupons: vec![1.0; 4],
            return_notional_at_recall: true,
            downside_participation: 1.0,
            fixed_return: vec![0.0; 4],
            floating_payment_multiplier: 1.0,
            guaranteed_minimum_maturity_return: 0.0,
            initial_levels: vec![22726.0125611],
            barrier_shift_parameters: BarrierShiftParameters {
                autocall_absolute_shift: vec![-0.0087; 4],
                autocall_shift_dates: observations.clone(),
                coupon_absolute_shift: vec![-0.0087; 4],
                coupon_absolute_spread: vec![0.0174; 4],
                coupon_shift_dates: observations,
                maturity_barrier_absolute_shift: -0.0087,
                maturity_barrier_absolute_spread: 0.0174,
                maturity_barrier_knock_out_levels_absolute_shift: vec![-0.0087],
            },
        }
    }

    /// Validate list lengths, date ordering and levels.
    pub fn validate(&self) -> Result<(), ValidationError> {
        let n_assets = self.stock_ids.len();
        if n_assets == 0 {
            return Err(ValidationError::Empty {
                field: "Stock_IDs".into(),
            });
        }
        check_len("Initial_Levels", self.initial_levels.len(), "Stock_IDs", n_assets)?;
        check_len("Basket_Weights", self.basket_weights.len(), "Stock_IDs", n_assets)?;
        if let Some(bad) = self.initial_levels.iter().find(|l| !l.is_finite() || **l <= 0.0) {
            return Err(ValidationError::out_of_range(
                "Initial_Levels",
                format!("level {bad} must be positive"),
            ));
        }
        if self.strike_setting_date.is_empty() {
            return Err(ValidationError::Empty {
                field: "Strike_Setting_Date".into(),
            });
        }

        // Autocall schedule
        let n_autocall = self.autocall_dates.len();
        check_len("Autocall_Barrier", self.autocall_barrier.len(), "Autocall_Dates", n_autocall)?;
        check_len("Autocall_Pay_Dates", self.autocall_pay_dates.len(), "Autocall_Dates", n_autocall)?;
        check_optional_len("Autocall_Ex_Dates", self.autocall_ex_dates.len(), "Autocall_Dates", n_autocall)?;

        // Coupon schedule
        let n_coupon = self.coupon_determination_dates.len();
        let coupon = "Coupon_Determination_Dates";
        check_len("Coupon_Low_Barrier", self.coupon_low_barrier.len(), coupon, n_coupon)?;
        check_len("Coupon_Pay_Dates", self.coupon_pay_dates.len(), coupon, n_coupon)?;
        check_len("Coupon_Memory_Multiplier", self.coupon_memory_multiplier.len(), coupon, n_coupon)?;
        check_optional_len("Coupon_Determination_Ex_Dates", self.coupon_determination_ex_dates.len(), coupon, n_coupon)?;
        check_optional_len("Coupon_Memory_Cutoff_Dates", self.coupon_memory_cutoff_dates.len(), coupon, n_coupon)?;
        check_optional_len("Participation", self.participation.len(), coupon, n_coupon)?;
        check_optional_len(
            "Participation_With_Memory_Coupons",
            self.participation_with_memory_coupons.len(),
            coupon,
            n_coupon,
        )?;
        check_optional_len("Variable_Coupon_Strike", self.variable_coupon_strike.len(), coupon, n_coupon)?;
        check_optional_len(
            "Variable_Coupon_Strike_With_Memory_Coupons",
            self.variable_coupon_strike_with_memory_coupons.len(),
            coupon,
            n_coupon,
        )?;
        check_optional_len("Fixed_Return", self.fixed_return.len(), coupon, n_coupon)?;

        for (field, dates) in [
            ("Autocall_Dates", &self.autocall_dates),
            ("Autocall_Ex_Dates", &self.autocall_ex_dates),
            ("Autocall_Pay_Dates", &self.autocall_pay_dates),
            ("Coupon_Determination_Dates", &self.coupon_determination_dates),
            ("Coupon_Determination_Ex_Dates", &self.coupon_determination_ex_dates),
            ("Coupon_Memory_Cutoff_Dates", &self.coupon_memory_cutoff_dates),
            ("Coupon_Pay_Dates", &self.coupon_pay_dates),
        ] {
            check_chronological(field, dates)?;
        }

        if let Some(latest_strike) = self.strike_setting_date.iter().max() {
            if self.maturity_date < *latest_strike {
                return Err(ValidationError::out_of_range(
                    "Maturity_Date",
                    format!("{} is before strike setting {}", self.maturity_date, latest_strike),
                ));
            }
        }
        if self.maturity_settlement_date < self.maturity_date {
            return Err(ValidationError::out_of_range(
                "Maturity_Settlement_Date",
                format!(
                    "{} is before maturity {}",
                    self.maturity_settlement_date, self.maturity_date
                ),
            ));
        }
        if !self.maturity_barrier.is_finite() || self.maturity_barrier < 0.0 {
            return Err(ValidationError::out_of_range(
                "Maturity_Barrier",
                "must be a non-negative number",
            ));
        }

        self.barrier_shift_parameters.validate()
    }
}

// =============================================================================
// INSTRUMENT SPEC
// =============================================================================

/// One instrument handed to the engine: an id, its term sheet, and the
/// underlyings whose volatility is bumped.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InstrumentSpec {
    id: InstrumentId,
    term_sheet: TermSheet,
    #[serde(rename = "bump_stock_ids", default)]
    bump_underlyings: Vec<UnderlyingId>,
}

impl InstrumentSpec {
    /// Create a validated spec bumping every underlying of the term sheet.
    pub fn new(id: impl Into<InstrumentId>, term_sheet: TermSheet) -> Result<Self, ValidationError> {
        let bump_underlyings = term_sheet.stock_ids.clone();
        Self::with_bump_underlyings(id, term_sheet, bump_underlyings)
    }

    /// Create a validated spec bumping only the given underlyings.
    pub fn with_bump_underlyings(
        id: impl Into<InstrumentId>,
        term_sheet: TermSheet,
        bump_underlyings: Vec<UnderlyingId>,
    ) -> Result<Self, ValidationError> {
        let spec = Self {
            id: id.into(),
            term_sheet,
            bump_underlyings,
        };
        spec.validate()?;
        Ok(spec)
    }

    /// Parse and validate a spec from JSON.
    pub fn from_json(json: &str) -> Result<Self, ValidationError> {
        let mut spec: Self = serde_json::from_str(json).map_err(|e| ValidationError::Unparseable {
            field: "instrument".into(),
            value: e.to_string(),
        })?;
        if spec.bump_underlyings.is_empty() {
            spec.bump_underlyings = spec.term_sheet.stock_ids.clone();
        }
        spec.validate()?;
        Ok(spec)
    }

    /// Validate the term sheet and bump targets.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.id.as_str().trim().is_empty() {
            return Err(ValidationError::Empty { field: "id".into() });
        }
        self.term_sheet.validate()?;
        if self.bump_underlyings.is_empty() {
            return Err(ValidationError::Empty {
                field: "bump_stock_ids".into(),
            });
        }
        if let Some(unknown) = self
            .bump_underlyings
            .iter()
            .find(|u| !self.term_sheet.stock_ids.contains(u))
        {
            return Err(ValidationError::out_of_range(
                "bump_stock_ids",
                format!("{unknown} is not an underlying of the term sheet"),
            ));
        }
        Ok(())
    }

    /// Instrument id.
    pub fn id(&self) -> &InstrumentId {
        &self.id
    }

    /// Term sheet.
    pub fn term_sheet(&self) -> &TermSheet {
        &self.term_sheet
    }

    /// Underlyings whose volatility is bumped.
    pub fn bump_underlyings(&self) -> &[UnderlyingId] {
        &self.bump_underlyings
    }

    /// Initial level of the first underlying, used as spot for strike grids.
    pub fn reference_level(&self) -> f64 {
        self.term_sheet.initial_levels.first().copied().unwrap_or(f64::NAN)
    }

    /// Barrier level drawn on heatmaps (fraction of spot).
    pub fn barrier_level(&self) -> f64 {
        self.term_sheet.maturity_barrier
    }
}

// =============================================================================
// FLAT-TEXT PARSING
// =============================================================================

/// Parse a comma-separated list, ignoring blanks.
///
/// `"0.7, 0.7,,0.7"` parses to `[0.7, 0.7, 0.7]`; an empty string is an empty list.
pub fn parse_list<T: FromStr>(field: &str, text: &str) -> Result<Vec<T>, ValidationError> {
    text.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| {
            s.parse::<T>().map_err(|_| ValidationError::Unparseable {
                field: field.to_string(),
                value: s.to_string(),
            })
        })
        .collect()
}

/// Parse a comma-separated list of `YYYY-MM-DD` dates.
pub fn parse_date_list(field: &str, text: &str) -> Result<Vec<NaiveDate>, ValidationError> {
    text.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| {
            NaiveDate::parse_from_str(s, "%Y-%m-%d").map_err(|_| ValidationError::Unparseable {
                field: field.to_string(),
                value: s.to_string(),
            })
        })
        .collect()
}

fn check_len(field: &str, actual: usize, against: &str, expected: usize) -> Result<(), ValidationError> {
    if actual == expected {
        Ok(())
    } else {
        Err(ValidationError::LengthMismatch {
            field: field.to_string(),
            against: against.to_string(),
            expected,
            actual,
        })
    }
}

/// Like [`check_len`] but an empty list is allowed.
fn check_optional_len(field: &str, actual: usize, against: &str, expected: usize) -> Result<(), ValidationError> {
    if actual == 0 {
        return Ok(());
    }
    check_len(field, actual, against, expected)
}

fn check_chronological(field: &str, dates: &[NaiveDate]) -> Result<(), ValidationError> {
    match dates.windows(2).position(|w| w[1] < w[0]) {
        Some(i) => Err(ValidationError::Unordered {
            field: field.to_string(),
            index: i + 1,
        }),
        None => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reference_term_sheet_is_valid() {
        let ts = TermSheet::ndx_autocallable();
        assert!(ts.validate().is_ok());

        let spec = InstrumentSpec::new("NDX-AC-1", ts).unwrap();
        assert_eq!(spec.bump_underlyings(), &[UnderlyingId::new("NDX.IDX")]);
        assert!((spec.reference_level() - 22726.0125611).abs() < 1e-9);
        assert!((spec.barrier_level() - 0.7).abs() < 1e-12);
    }

    #[test]
    fn test_mismatched_barrier_length() {
        let mut ts = TermSheet::ndx_autocallable();
        ts.autocall_barrier.pop();

        let err = ts.validate().unwrap_err();
        assert_eq!(
            err,
            ValidationError::LengthMismatch {
                field: "Autocall_Barrier".into(),
                against: "Autocall_Dates".into(),
                expected: 4,
                actual: 3,
            }
        );
    }

    #[test]
    fn test_missing_underlyings() {
        let mut ts = TermSheet::ndx_autocallable();
        ts.stock_ids.clear();
        assert!(matches!(ts.validate(), Err(ValidationError::Empty { .. })));
    }

    #[test]
    fn test_unordered_dates() {
        let mut ts = TermSheet::ndx_autocallable();
        ts.coupon_pay_dates.swap(1, 2);
        assert!(matches!(
            ts.validate(),
            Err(ValidationError::Unordered { index: 2, .. })
        ));
    }

    #[test]
    fn test_maturity_before_strike() {
        let mut ts = TermSheet::ndx_autocallable();
        ts.maturity_date = NaiveDate::from_ymd_opt(2025, 1, 1).unwrap();
        assert!(matches!(
            ts.validate(),
            Err(ValidationError::OutOfRange { .. })
        ));
    }

    #[test]
    fn test_unknown_bump_underlying() {
        let ts = TermSheet::ndx_autocallable();
        let result =
            InstrumentSpec::with_bump_underlyings("X", ts, vec![UnderlyingId::new("SPX.IDX")]);
        assert!(result.is_err());
    }

    #[test]
    fn test_json_round_trip_uses_term_sheet_keys() {
        let spec = InstrumentSpec::new("NDX-AC-1", TermSheet::ndx_autocallable()).unwrap();
        let json = serde_json::to_string(&spec).unwrap();
        assert!(json.contains("\"Stock_IDs\":[\"NDX.IDX\"]"));
        assert!(json.contains("\"Maturity_Date\":\"2026-08-07\""));

        let parsed = InstrumentSpec::from_json(&json).unwrap();
        assert_eq!(parsed, spec);
    }

    #[test]
    fn test_from_json_defaults_bump_targets() {
        let spec = InstrumentSpec::new("NDX-AC-1", TermSheet::ndx_autocallable()).unwrap();
        let mut value = serde_json::to_value(&spec).unwrap();
        value.as_object_mut().unwrap().remove("bump_stock_ids");

        let parsed = InstrumentSpec::from_json(&value.to_string()).unwrap();
        assert_eq!(parsed.bump_underlyings().len(), 1);
    }

    #[test]
    fn test_parse_list() {
        let v: Vec<f64> = parse_list("Coupon_Low_Barrier", "0.7, 0.7,,0.7 ").unwrap();
        assert_eq!(v, vec![0.7, 0.7, 0.7]);

        let empty: Vec<f64> = parse_list("Autocall_Ex_Dates", "  ").unwrap();
        assert!(empty.is_empty());

        let bad: Result<Vec<f64>, _> = parse_list("Basket_Weights", "1,abc");
        assert!(matches!(bad, Err(ValidationError::Unparseable { value, .. }) if value == "abc"));
    }

    #[test]
    fn test_parse_date_list() {
        let dates = parse_date_list("Autocall_Dates", "2025-11-07,2026-02-09").unwrap();
        assert_eq!(dates.len(), 2);
        assert_eq!(dates[1], NaiveDate::from_ymd_opt(2026, 2, 9).unwrap());

        assert!(parse_date_list("Autocall_Dates", "2025-13-01").is_err());
    }
}
