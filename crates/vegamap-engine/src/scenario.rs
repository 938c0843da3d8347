//! Scenario request building.
//!
//! [`ScenarioBuilder::build`] is a pure mapping from an instrument, one
//! [`BumpSpec`] and the numeric controls to a [`ValuationRequest`]. It holds
//! only shared read-only state, so any number of workers may call it.

use std::sync::Arc;

use vegamap_traits::instrument::InstrumentSpec;
use vegamap_traits::valuation::{
    BumpDescription, BumpMethod, NumericControls, OutputField, ValuationRequest,
};
use vegamap_traits::UnderlyingId;

use crate::error::{EngineError, EngineResult};
use crate::grid::GridAxes;

/// One bump target: a strike bucket and the tenor buckets bumped in it.
#[derive(Debug, Clone, PartialEq)]
pub struct BumpSpec {
    /// Underlyings whose volatility is bumped.
    pub targets: Vec<UnderlyingId>,
    /// Strike bucket; `None` values the instrument at spot.
    pub strike_row: Option<usize>,
    /// Bumped tenor buckets; empty for a baseline.
    pub tenor_cols: Vec<usize>,
    /// Signed bump size.
    pub size: f64,
    /// Bump method.
    pub method: BumpMethod,
}

impl BumpSpec {
    /// Zero bump, optionally pinned to a strike bucket.
    pub fn baseline(targets: Vec<UnderlyingId>, strike_row: Option<usize>) -> Self {
        Self {
            targets,
            strike_row,
            tenor_cols: Vec::new(),
            size: 0.0,
            method: BumpMethod::Absolute,
        }
    }

    /// Bump of a single cell.
    pub fn cell(
        targets: Vec<UnderlyingId>,
        row: usize,
        col: usize,
        size: f64,
        method: BumpMethod,
    ) -> Self {
        Self {
            targets,
            strike_row: Some(row),
            tenor_cols: vec![col],
            size,
            method,
        }
    }

    /// True if nothing is bumped.
    pub fn is_baseline(&self) -> bool {
        self.tenor_cols.is_empty()
    }
}

/// Reject bump sizes that cannot divide a finite difference.
pub fn validate_bump_size(size: f64) -> EngineResult<()> {
    if !size.is_finite() || size == 0.0 {
        return Err(EngineError::InvalidBump(size));
    }
    Ok(())
}

/// Builds valuation requests for one instrument on one grid.
#[derive(Debug, Clone)]
pub struct ScenarioBuilder {
    instrument: Arc<InstrumentSpec>,
    axes: Arc<GridAxes>,
    tenor_labels: Arc<Vec<String>>,
    controls: NumericControls,
    outputs: Vec<OutputField>,
}

impl ScenarioBuilder {
    /// Create a builder requesting the standard outputs.
    pub fn new(
        instrument: Arc<InstrumentSpec>,
        axes: Arc<GridAxes>,
        controls: NumericControls,
    ) -> Self {
        let tenor_labels = Arc::new(axes.tenor().labels());
        Self {
            instrument,
            axes,
            tenor_labels,
            controls,
            outputs: OutputField::standard(),
        }
    }

    /// Override the requested outputs.
    pub fn with_outputs(mut self, outputs: Vec<OutputField>) -> Self {
        self.outputs = outputs;
        self
    }

    /// Instrument being valued.
    pub fn instrument(&self) -> &InstrumentSpec {
        &self.instrument
    }

    /// Grid the scenarios address.
    pub fn axes(&self) -> &GridAxes {
        &self.axes
    }

    /// Bump spec for a single cell of this instrument.
    pub fn cell_bump(&self, row: usize, col: usize, size: f64, method: BumpMethod) -> BumpSpec {
        BumpSpec::cell(self.instrument.bump_underlyings().to_vec(), row, col, size, method)
    }

    /// Baseline bump spec, per strike row when `row` is given.
    pub fn baseline_bump(&self, row: Option<usize>) -> BumpSpec {
        BumpSpec::baseline(self.instrument.bump_underlyings().to_vec(), row)
    }

    /// Build the request for `bump`.
    ///
    /// The full tenor label grid is always sent; the bump-size vector is
    /// zero except at the bumped tenors.
    pub fn build(&self, bump: &BumpSpec) -> EngineResult<ValuationRequest> {
        let cols = self.tenor_labels.len();
        if !bump.is_baseline() {
            validate_bump_size(bump.size)?;
        }
        if let Some(col) = bump.tenor_cols.iter().find(|c| **c >= cols) {
            return Err(EngineError::Internal(format!(
                "tenor bucket {col} outside a {cols}-bucket grid"
            )));
        }

        let (strike, strike_label) = match bump.strike_row {
            Some(row) => {
                let strike = self.axes.absolute_strike(row).ok_or_else(|| {
                    EngineError::Internal(format!(
                        "strike bucket {row} outside a {}-bucket grid",
                        self.axes.strike().len()
                    ))
                })?;
                let label = self.axes.strike().label(row).unwrap_or_default();
                (strike, label)
            }
            None => (self.axes.spot(), "spot".to_string()),
        };

        let mut tenor_bump_sizes = vec![0.0; cols];
        for col in &bump.tenor_cols {
            tenor_bump_sizes[*col] = bump.size;
        }

        let description = BumpDescription {
            instrument_ids: bump.targets.clone(),
            strike,
            strike_label,
            tenors: self.tenor_labels.as_ref().clone(),
            tenor_bump_sizes,
            method: bump.method,
        };

        Ok(ValuationRequest::new(
            self.instrument.term_sheet().clone(),
            description,
            self.controls,
            self.outputs.clone(),
        )?)
    }
}
