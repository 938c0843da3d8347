//! Completed computation runs and batch outcomes.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use vegamap_traits::InstrumentId;

use crate::grid::GridAxes;
use crate::matrix::SensitivityMatrix;

/// A fully resolved sensitivity surface for one instrument.
///
/// Only built once every cell holds a value or NaN; immutable afterwards.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComputationRun {
    run_id: Uuid,
    instrument_id: InstrumentId,
    matrix: SensitivityMatrix,
    axes: GridAxes,
    baseline_value: f64,
    average_life: Option<f64>,
    barrier_level: f64,
    created_at: DateTime<Utc>,
}

impl ComputationRun {
    /// Wrap a frozen matrix.
    pub fn new(
        instrument_id: InstrumentId,
        matrix: SensitivityMatrix,
        axes: GridAxes,
        baseline_value: f64,
        average_life: Option<f64>,
        barrier_level: f64,
    ) -> Self {
        Self {
            run_id: Uuid::new_v4(),
            instrument_id,
            matrix,
            axes,
            baseline_value,
            average_life,
            barrier_level,
            created_at: Utc::now(),
        }
    }

    /// Override the creation timestamp.
    pub fn with_created_at(mut self, created_at: DateTime<Utc>) -> Self {
        self.created_at = created_at;
        self
    }

    /// Unique run id.
    pub fn run_id(&self) -> Uuid {
        self.run_id
    }

    /// Instrument id.
    pub fn instrument_id(&self) -> &InstrumentId {
        &self.instrument_id
    }

    /// Sensitivity matrix.
    pub fn matrix(&self) -> &SensitivityMatrix {
        &self.matrix
    }

    /// Grid axes used.
    pub fn axes(&self) -> &GridAxes {
        &self.axes
    }

    /// Baseline fair value (the first strike row's in per-row mode).
    pub fn baseline_value(&self) -> f64 {
        self.baseline_value
    }

    /// Average life in years reported by the baseline valuation.
    pub fn average_life(&self) -> Option<f64> {
        self.average_life
    }

    /// Barrier level as a fraction of spot.
    pub fn barrier_level(&self) -> f64 {
        self.barrier_level
    }

    /// Creation time.
    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// Cells left NaN by failed or timed-out calls.
    pub fn failed_cells(&self) -> usize {
        self.matrix.nan_count()
    }

    /// Total cells.
    pub fn total_cells(&self) -> usize {
        self.matrix.rows() * self.matrix.cols()
    }

    /// True when no cell failed.
    pub fn is_fully_computed(&self) -> bool {
        self.failed_cells() == 0
    }

    /// `"5/6 cells computed"`.
    pub fn status_text(&self) -> String {
        format!(
            "{}/{} cells computed",
            self.total_cells() - self.failed_cells(),
            self.total_cells()
        )
    }
}

/// Result of one instrument in a batch.
#[derive(Debug, Clone)]
pub enum InstrumentOutcome {
    /// Grid resolved, possibly with NaN cells.
    Completed(ComputationRun),
    /// Skipped before or at the baseline; no cells were dispatched.
    Failed {
        /// Instrument id.
        instrument_id: InstrumentId,
        /// Why it was skipped.
        reason: String,
    },
}

impl InstrumentOutcome {
    /// Instrument id.
    pub fn instrument_id(&self) -> &InstrumentId {
        match self {
            InstrumentOutcome::Completed(run) => run.instrument_id(),
            InstrumentOutcome::Failed { instrument_id, .. } => instrument_id,
        }
    }

    /// The run, if completed.
    pub fn run(&self) -> Option<&ComputationRun> {
        match self {
            InstrumentOutcome::Completed(run) => Some(run),
            InstrumentOutcome::Failed { .. } => None,
        }
    }

    /// True for a skipped instrument.
    pub fn is_failed(&self) -> bool {
        matches!(self, InstrumentOutcome::Failed { .. })
    }

    /// One-line status.
    pub fn status_text(&self) -> String {
        match self {
            InstrumentOutcome::Completed(run) => run.status_text(),
            InstrumentOutcome::Failed { reason, .. } => format!("failed: {reason}"),
        }
    }
}

/// Outcomes of a batch, in input order.
#[derive(Debug, Clone, Default)]
pub struct BatchReport {
    outcomes: Vec<InstrumentOutcome>,
}

impl BatchReport {
    /// Wrap outcomes.
    pub fn new(outcomes: Vec<InstrumentOutcome>) -> Self {
        Self { outcomes }
    }

    /// Every outcome.
    pub fn outcomes(&self) -> &[InstrumentOutcome] {
        &self.outcomes
    }

    /// Completed runs.
    pub fn runs(&self) -> impl Iterator<Item = &ComputationRun> {
        self.outcomes.iter().filter_map(InstrumentOutcome::run)
    }

    /// Consume into completed runs.
    pub fn into_runs(self) -> Vec<ComputationRun> {
        self.outcomes
            .into_iter()
            .filter_map(|o| match o {
                InstrumentOutcome::Completed(run) => Some(run),
                InstrumentOutcome::Failed { .. } => None,
            })
            .collect()
    }

    /// Skipped instruments.
    pub fn failures(&self) -> impl Iterator<Item = &InstrumentOutcome> {
        self.outcomes.iter().filter(|o| o.is_failed())
    }

    /// Outcome of one instrument.
    pub fn get(&self, instrument_id: &InstrumentId) -> Option<&InstrumentOutcome> {
        self.outcomes
            .iter()
            .find(|o| o.instrument_id() == instrument_id)
    }

    /// `"<id>: <status>"` per instrument.
    pub fn status_lines(&self) -> Vec<String> {
        self.outcomes
            .iter()
            .map(|o| format!("{}: {}", o.instrument_id(), o.status_text()))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grid::{AxisKind, GridAxis};

    fn run(values: Vec<Vec<f64>>) -> ComputationRun {
        let axes = GridAxes::new(
            GridAxis::from_centers(AxisKind::Strike, vec![0.9, 1.0, 1.1]).unwrap(),
            GridAxis::from_centers(AxisKind::Tenor, vec![6.0, 12.0]).unwrap(),
            100.0,
        )
        .unwrap();
        ComputationRun::new(
            InstrumentId::new("X"),
            SensitivityMatrix::from_rows(values).unwrap(),
            axes,
            100.0,
            Some(0.8),
            0.7,
        )
    }

    #[test]
    fn test_status_text() {
        let partial = run(vec![
            vec![200.0, 400.0],
            vec![f64::NAN, 320.0],
            vec![-40.0, 120.0],
        ]);
        assert_eq!(partial.failed_cells(), 1);
        assert_eq!(partial.status_text(), "5/6 cells computed");
        assert!(!partial.is_fully_computed());
    }

    #[test]
    fn test_report_lines() {
        let report = BatchReport::new(vec![
            InstrumentOutcome::Failed {
                instrument_id: InstrumentId::new("X"),
                reason: "baseline valuation failed".into(),
            },
            InstrumentOutcome::Completed(run(vec![vec![1.0, 2.0], vec![3.0, 4.0], vec![5.0, 6.0]])),
        ]);
        assert_eq!(report.runs().count(), 1);
        assert_eq!(report.failures().count(), 1);
        assert_eq!(
            report.status_lines(),
            vec!["X: failed: baseline valuation failed", "X: 6/6 cells computed"]
        );
    }
}
