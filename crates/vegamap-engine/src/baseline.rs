//! Baseline valuation.
//!
//! One zero-bump call per instrument, or one per strike row when valuation
//! depends on the strike. A failed baseline abandons that instrument: no
//! bumped cell may be dispatched without it.

use tokio::task::JoinSet;
use tracing::{debug, warn};

use vegamap_traits::config::DispatchMode;
use vegamap_traits::TraitError;

use crate::channel::ValuationChannel;
use crate::error::{EngineError, EngineResult};
use crate::runtime::RunCancellation;
use crate::scenario::ScenarioBuilder;

/// Unbumped reference valuation.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Baseline {
    /// Fair value `v0`.
    pub value: f64,
    /// Average life in years, when reported.
    pub average_life: Option<f64>,
}

/// Baselines for one instrument's grid.
#[derive(Debug, Clone, PartialEq)]
pub enum Baselines {
    /// One baseline shared by every cell.
    Instrument(Baseline),
    /// One baseline per strike row.
    PerRow(Vec<Baseline>),
}

impl Baselines {
    /// `v0` for cells in `row`.
    pub fn value_for_row(&self, row: usize) -> Option<f64> {
        match self {
            Baselines::Instrument(b) => Some(b.value),
            Baselines::PerRow(rows) => rows.get(row).map(|b| b.value),
        }
    }

    /// The instrument-level baseline, or the first row's.
    pub fn primary(&self) -> Option<&Baseline> {
        match self {
            Baselines::Instrument(b) => Some(b),
            Baselines::PerRow(rows) => rows.first(),
        }
    }

    /// Baseline calls that were made.
    pub fn call_count(&self) -> usize {
        match self {
            Baselines::Instrument(_) => 1,
            Baselines::PerRow(rows) => rows.len(),
        }
    }
}

/// Computes baselines through the shared valuation channel.
#[derive(Debug, Clone)]
pub struct BaselineValuator {
    channel: ValuationChannel,
}

impl BaselineValuator {
    /// Create a valuator.
    pub fn new(channel: ValuationChannel) -> Self {
        Self { channel }
    }

    /// One baseline call, pinned to `row` when given.
    pub async fn value(
        &self,
        builder: &ScenarioBuilder,
        row: Option<usize>,
        cancel: &RunCancellation,
    ) -> EngineResult<Baseline> {
        let instrument_id = builder.instrument().id().clone();
        let request = builder.build(&builder.baseline_bump(row))?;

        match self.channel.evaluate(&request, cancel).await {
            Ok(response) => {
                debug!(
                    instrument_id = %instrument_id,
                    row = ?row,
                    value = response.fair_value,
                    "Baseline valued"
                );
                Ok(Baseline {
                    value: response.fair_value,
                    average_life: response.average_life,
                })
            }
            Err(TraitError::Cancelled) => Err(EngineError::Cancelled),
            Err(e) => {
                warn!(instrument_id = %instrument_id, row = ?row, error = %e, "Baseline valuation failed");
                Err(EngineError::BaselineFailure {
                    instrument_id,
                    reason: e.to_string(),
                })
            }
        }
    }

    /// Every baseline the dispatch mode needs.
    ///
    /// Per-row baselines are issued concurrently; the first failure
    /// abandons the rest.
    pub async fn value_all(
        &self,
        builder: &ScenarioBuilder,
        mode: DispatchMode,
        cancel: &RunCancellation,
    ) -> EngineResult<Baselines> {
        match mode {
            DispatchMode::PerCell => Ok(Baselines::Instrument(self.value(builder, None, cancel).await?)),
            DispatchMode::PerRow => {
                let rows = builder.axes().strike().len();
                let mut tasks = JoinSet::new();
                for row in 0..rows {
                    let valuator = self.clone();
                    let builder = builder.clone();
                    let cancel = cancel.clone();
                    tasks.spawn(async move {
                        let baseline = valuator.value(&builder, Some(row), &cancel).await;
                        (row, baseline)
                    });
                }

                let mut baselines: Vec<Option<Baseline>> = vec![None; rows];
                while let Some(joined) = tasks.join_next().await {
                    let (row, baseline) =
                        joined.map_err(|e| EngineError::Internal(format!("baseline task failed: {e}")))?;
                    baselines[row] = Some(baseline?);
                }

                let baselines = baselines
                    .into_iter()
                    .collect::<Option<Vec<_>>>()
                    .ok_or_else(|| EngineError::Internal("missing row baseline".into()))?;
                Ok(Baselines::PerRow(baselines))
            }
        }
    }
}
