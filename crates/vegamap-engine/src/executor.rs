//! Finite-difference grid execution.
//!
//! For an instrument with baseline `v0`, every `(strike, tenor)` cell is
//! valued with exactly that bucket bumped by `h`:
//!
//! - forward: `(v(+h) - v0) / h`, one bumped call per cell
//! - central: `(v(+h) - v(-h)) / 2h`, two bumped calls per cell
//!
//! A failed or timed-out bumped call makes its cell NaN; it never aborts
//! the grid.
//!
//! ## Scheduling
//!
//! ```text
//! work queue (cells or rows) ──> N workers ──> ValuationChannel (global gate)
//!                                   │
//!                                   └──> (row, col, value) ──> CellSlots ──> SensitivityMatrix
//! ```
//!
//! Work items are queued up front; workers pop until the queue is empty or
//! the run is cancelled. Results travel over a channel to a single
//! collector that writes them into index-addressed slots, so the frozen
//! matrix does not depend on completion order.

use std::sync::Arc;

use crossbeam::queue::ArrayQueue;
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

use vegamap_traits::config::{DifferenceScheme, DispatchMode, EngineConfig};
use vegamap_traits::valuation::BumpMethod;
use vegamap_traits::InstrumentId;

use crate::baseline::{BaselineValuator, Baselines};
use crate::channel::ValuationChannel;
use crate::error::{EngineError, EngineResult};
use crate::matrix::{CellSlots, SensitivityMatrix};
use crate::progress::ProgressTracker;
use crate::run::ComputationRun;
use crate::runtime::RunCancellation;
use crate::scenario::{validate_bump_size, ScenarioBuilder};

/// Numeric settings applied to every cell of a run.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GridSettings {
    /// Bump size `h`.
    pub bump_size: f64,
    /// Bump method.
    pub bump_method: BumpMethod,
    /// Finite-difference convention.
    pub scheme: DifferenceScheme,
    /// Work item granularity.
    pub dispatch: DispatchMode,
}

impl GridSettings {
    /// Settings from engine configuration.
    pub fn from_config(config: &EngineConfig) -> Self {
        Self {
            bump_size: config.bump_size,
            bump_method: config.bump_method,
            scheme: config.difference_scheme,
            dispatch: config.dispatch_mode,
        }
    }
}

impl Default for GridSettings {
    fn default() -> Self {
        Self::from_config(&EngineConfig::default())
    }
}

#[derive(Debug, Clone, Copy)]
enum WorkItem {
    Cell { row: usize, col: usize },
    Row { row: usize },
}

/// Fills sensitivity matrices through a bounded worker pool.
#[derive(Debug, Clone)]
pub struct GridExecutor {
    channel: ValuationChannel,
    settings: GridSettings,
}

impl GridExecutor {
    /// Create an executor; rejects an unusable bump size.
    pub fn new(channel: ValuationChannel, settings: GridSettings) -> EngineResult<Self> {
        validate_bump_size(settings.bump_size)?;
        Ok(Self { channel, settings })
    }

    /// Settings in use.
    pub fn settings(&self) -> &GridSettings {
        &self.settings
    }

    /// Baseline then grid for one instrument.
    pub async fn run(
        &self,
        builder: &ScenarioBuilder,
        progress: &ProgressTracker,
        cancel: &RunCancellation,
    ) -> EngineResult<ComputationRun> {
        let instrument = builder.instrument();
        let baselines = BaselineValuator::new(self.channel.clone())
            .value_all(builder, self.settings.dispatch, cancel)
            .await?;

        let matrix = self.fill(builder, &baselines, progress, cancel).await?;
        let primary = baselines
            .primary()
            .copied()
            .ok_or_else(|| EngineError::Internal("no baseline".into()))?;

        let run = ComputationRun::new(
            instrument.id().clone(),
            matrix,
            builder.axes().clone(),
            primary.value,
            primary.average_life,
            instrument.barrier_level(),
        );
        info!(
            instrument_id = %run.instrument_id(),
            failed_cells = run.failed_cells(),
            "{}",
            run.status_text()
        );
        Ok(run)
    }

    /// Resolve every cell against known baselines.
    pub async fn fill(
        &self,
        builder: &ScenarioBuilder,
        baselines: &Baselines,
        progress: &ProgressTracker,
        cancel: &RunCancellation,
    ) -> EngineResult<SensitivityMatrix> {
        let instrument_id = builder.instrument().id().clone();
        let (rows, cols) = builder.axes().shape();
        let total = rows * cols;

        let items: Vec<WorkItem> = match self.settings.dispatch {
            DispatchMode::PerCell => (0..rows)
                .flat_map(|row| (0..cols).map(move |col| WorkItem::Cell { row, col }))
                .collect(),
            DispatchMode::PerRow => (0..rows).map(|row| WorkItem::Row { row }).collect(),
        };
        let queue = Arc::new(ArrayQueue::new(items.len().max(1)));
        for item in &items {
            queue
                .push(*item)
                .map_err(|_| EngineError::Internal("work queue overflow".into()))?;
        }

        let worker_count = self.channel.gate().capacity().min(items.len()).max(1);
        debug!(
            instrument_id = %instrument_id,
            rows,
            cols,
            items = items.len(),
            workers = worker_count,
            "Dispatching grid"
        );

        let (tx, mut rx) = mpsc::channel::<(usize, usize, f64)>(total.max(1));
        let baselines = Arc::new(baselines.clone());
        let mut workers = JoinSet::new();
        for _ in 0..worker_count {
            let worker = Worker {
                instrument_id: instrument_id.clone(),
                queue: Arc::clone(&queue),
                channel: self.channel.clone(),
                builder: builder.clone(),
                baselines: Arc::clone(&baselines),
                settings: self.settings,
                cancel: cancel.clone(),
                tx: tx.clone(),
                cols,
            };
            workers.spawn(worker.run());
        }
        drop(tx);

        let mut slots = CellSlots::new(rows, cols);
        while let Some((row, col, value)) = rx.recv().await {
            slots.resolve(row, col, value)?;
            let event = progress.cell_resolved();
            debug!(
                instrument_id = %instrument_id,
                row,
                col,
                value,
                resolved = event.resolved,
                total = event.total,
                "Cell resolved"
            );
        }

        while let Some(joined) = workers.join_next().await {
            joined.map_err(|e| EngineError::Internal(format!("grid worker failed: {e}")))?;
        }

        if cancel.is_cancelled() {
            warn!(
                instrument_id = %instrument_id,
                resolved = slots.resolved(),
                total,
                "Grid cancelled, discarding partial matrix"
            );
            return Err(EngineError::Cancelled);
        }

        slots.freeze()
    }
}

struct Worker {
    instrument_id: InstrumentId,
    queue: Arc<ArrayQueue<WorkItem>>,
    channel: ValuationChannel,
    builder: ScenarioBuilder,
    baselines: Arc<Baselines>,
    settings: GridSettings,
    cancel: RunCancellation,
    tx: mpsc::Sender<(usize, usize, f64)>,
    cols: usize,
}

impl Worker {
    async fn run(self) {
        while !self.cancel.is_cancelled() {
            let Some(item) = self.queue.pop() else {
                break;
            };
            match item {
                WorkItem::Cell { row, col } => self.resolve(row, col).await,
                WorkItem::Row { row } => {
                    for col in 0..self.cols {
                        if self.cancel.is_cancelled() {
                            break;
                        }
                        self.resolve(row, col).await;
                    }
                }
            }
        }
    }

    async fn resolve(&self, row: usize, col: usize) {
        let value = self.cell_value(row, col).await;
        // Receiver only closes when the collector bailed out.
        let _ = self.tx.send((row, col, value)).await;
    }

    async fn cell_value(&self, row: usize, col: usize) -> f64 {
        let Some(v0) = self.baselines.value_for_row(row) else {
            return f64::NAN;
        };
        let h = self.settings.bump_size;

        match self.settings.scheme {
            DifferenceScheme::Forward => match self.bumped(row, col, h).await {
                Some(up) => (up - v0) / h,
                None => f64::NAN,
            },
            DifferenceScheme::Central => {
                let (up, down) = tokio::join!(self.bumped(row, col, h), self.bumped(row, col, -h));
                match (up, down) {
                    (Some(up), Some(down)) => (up - down) / (2.0 * h),
                    _ => f64::NAN,
                }
            }
        }
    }

    async fn bumped(&self, row: usize, col: usize, size: f64) -> Option<f64> {
        let bump = self
            .builder
            .cell_bump(row, col, size, self.settings.bump_method);
        let request = match self.builder.build(&bump) {
            Ok(request) => request,
            Err(e) => {
                warn!(instrument_id = %self.instrument_id, row, col, error = %e, "Cannot build cell request");
                return None;
            }
        };

        match self.channel.evaluate(&request, &self.cancel).await {
            Ok(response) => Some(response.fair_value),
            Err(e) => {
                debug!(instrument_id = %self.instrument_id, row, col, error = %e, "Cell left NaN");
                None
            }
        }
    }
}
