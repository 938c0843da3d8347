//! Multi-instrument orchestration.
//!
//! Runs baseline and grid for every instrument of a basket concurrently.
//! All instruments share one [`ValuationChannel`], so the configured
//! `max_concurrent_calls` caps outstanding calls across the whole batch.
//!
//! A baseline or grid-construction failure marks only that instrument as
//! failed; cancellation abandons the batch.

use std::sync::Arc;

use tokio::sync::broadcast;
use tokio::task::JoinSet;
use tracing::{info, warn};

use vegamap_traits::config::EngineConfig;
use vegamap_traits::instrument::InstrumentSpec;
use vegamap_traits::ValuationClient;

use crate::channel::ValuationChannel;
use crate::error::{EngineError, EngineResult};
use crate::executor::{GridExecutor, GridSettings};
use crate::grid::{GridAxes, GridPartitioner, StrikeSource};
use crate::progress::{ProgressBoard, ProgressEvent};
use crate::run::{BatchReport, ComputationRun, InstrumentOutcome};
use crate::runtime::{CallGate, CallMetricsSnapshot, RunCancellation};
use crate::scenario::ScenarioBuilder;

/// How an instrument's grid is obtained.
#[derive(Debug, Clone, PartialEq)]
pub enum GridSource {
    /// Partition from strikes around the instrument's reference level.
    Strikes(StrikeSource),
    /// Use prepared axes as-is.
    Axes(GridAxes),
}

/// One instrument of a basket.
#[derive(Debug, Clone)]
pub struct InstrumentJob {
    spec: Arc<InstrumentSpec>,
    grid: GridSource,
}

impl InstrumentJob {
    /// Job partitioned from `strikes`.
    pub fn new(spec: InstrumentSpec, strikes: StrikeSource) -> Self {
        Self {
            spec: Arc::new(spec),
            grid: GridSource::Strikes(strikes),
        }
    }

    /// Job on prepared axes.
    pub fn with_axes(spec: InstrumentSpec, axes: GridAxes) -> Self {
        Self {
            spec: Arc::new(spec),
            grid: GridSource::Axes(axes),
        }
    }

    /// Instrument spec.
    pub fn spec(&self) -> &InstrumentSpec {
        &self.spec
    }
}

/// Runs baskets of instruments through the grid executor.
pub struct BatchOrchestrator {
    config: EngineConfig,
    partitioner: GridPartitioner,
    executor: GridExecutor,
    channel: ValuationChannel,
    progress: ProgressBoard,
    cancel: RunCancellation,
}

impl BatchOrchestrator {
    /// Create an orchestrator with its own call gate.
    pub fn new(config: EngineConfig, client: Arc<dyn ValuationClient>) -> EngineResult<Self> {
        let gate = CallGate::new(config.max_concurrent_calls);
        Self::with_gate(config, client, gate)
    }

    /// Create an orchestrator sharing an existing call gate.
    pub fn with_gate(
        config: EngineConfig,
        client: Arc<dyn ValuationClient>,
        gate: CallGate,
    ) -> EngineResult<Self> {
        config.validate()?;
        let partitioner = GridPartitioner::from_config(&config)?;
        let channel = ValuationChannel::new(client, gate, config.call_timeout());
        let executor = GridExecutor::new(channel.clone(), GridSettings::from_config(&config))?;

        Ok(Self {
            config,
            partitioner,
            executor,
            channel,
            progress: ProgressBoard::default(),
            cancel: RunCancellation::new(),
        })
    }

    /// Use a caller-owned cancellation signal.
    pub fn with_cancellation(mut self, cancel: RunCancellation) -> Self {
        self.cancel = cancel;
        self
    }

    /// Configuration in use.
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Cancellation signal for running batches.
    pub fn cancellation(&self) -> RunCancellation {
        self.cancel.clone()
    }

    /// Global call gate.
    pub fn gate(&self) -> &CallGate {
        self.channel.gate()
    }

    /// Progress board.
    pub fn progress(&self) -> &ProgressBoard {
        &self.progress
    }

    /// Subscribe to per-cell progress events.
    pub fn subscribe_progress(&self) -> broadcast::Receiver<ProgressEvent> {
        self.progress.subscribe()
    }

    /// Valuation call statistics so far.
    pub fn call_metrics(&self) -> CallMetricsSnapshot {
        self.channel.metrics().snapshot()
    }

    /// Compute one instrument, surfacing any failure as an error.
    pub async fn run_one(&self, job: InstrumentJob) -> EngineResult<ComputationRun> {
        let worker = self.instrument_worker();
        worker.compute(job).await
    }

    /// Compute a basket; outcomes are returned in input order.
    pub async fn run(&self, jobs: Vec<InstrumentJob>) -> EngineResult<BatchReport> {
        let count = jobs.len();
        info!(instruments = count, max_concurrent_calls = self.gate().capacity(), "Starting batch");

        let mut tasks = JoinSet::new();
        for (index, job) in jobs.into_iter().enumerate() {
            let worker = self.instrument_worker();
            tasks.spawn(async move {
                let instrument_id = job.spec().id().clone();
                (index, instrument_id, worker.compute(job).await)
            });
        }

        let mut outcomes: Vec<Option<InstrumentOutcome>> = vec![None; count];
        while let Some(joined) = tasks.join_next().await {
            let (index, instrument_id, result) =
                joined.map_err(|e| EngineError::Internal(format!("instrument task failed: {e}")))?;
            let outcome = match result {
                Ok(run) => InstrumentOutcome::Completed(run),
                Err(EngineError::Cancelled) => {
                    warn!("Batch cancelled");
                    return Err(EngineError::Cancelled);
                }
                Err(e) => {
                    warn!(instrument_id = %instrument_id, error = %e, "Instrument skipped");
                    InstrumentOutcome::Failed {
                        instrument_id,
                        reason: e.to_string(),
                    }
                }
            };
            outcomes[index] = Some(outcome);
        }

        let report = BatchReport::new(outcomes.into_iter().flatten().collect());
        info!(
            completed = report.runs().count(),
            failed = report.failures().count(),
            "Batch finished"
        );
        Ok(report)
    }

    fn instrument_worker(&self) -> InstrumentWorker {
        InstrumentWorker {
            partitioner: self.partitioner.clone(),
            executor: self.executor.clone(),
            progress: self.progress.clone(),
            cancel: self.cancel.clone(),
            controls: self.config.numeric_controls(),
        }
    }
}

struct InstrumentWorker {
    partitioner: GridPartitioner,
    executor: GridExecutor,
    progress: ProgressBoard,
    cancel: RunCancellation,
    controls: vegamap_traits::valuation::NumericControls,
}

impl InstrumentWorker {
    async fn compute(self, job: InstrumentJob) -> EngineResult<ComputationRun> {
        job.spec.validate()?;
        let axes = match job.grid {
            GridSource::Axes(axes) => axes,
            GridSource::Strikes(source) => self
                .partitioner
                .partition(&source, job.spec.reference_level())?,
        };

        let tracker = self
            .progress
            .track(job.spec.id().clone(), axes.cell_count());
        let builder = ScenarioBuilder::new(Arc::clone(&job.spec), Arc::new(axes), self.controls);
        self.executor.run(&builder, &tracker, &self.cancel).await
    }
}
