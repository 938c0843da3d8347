//! # Vegamap Engine
//!
//! The concurrent finite-difference sensitivity engine.
//!
//! This crate provides:
//! - [`GridPartitioner`]: Strike and tenor bucket axes from market data
//! - [`ScenarioBuilder`]: Pure mapping from a bump target to a valuation request
//! - [`BaselineValuator`]: Unbumped reference values per instrument or strike row
//! - [`GridExecutor`]: Bounded-concurrency dispatch filling a [`SensitivityMatrix`]
//! - [`BatchOrchestrator`]: Baskets of instruments under one global call bound
//! - [`ResultStore`]: Completed runs and loaded surfaces
//! - [`SummaryIndex`]: Nearest-grid-point queries across cached surfaces
//!
//! ## Architecture
//!
//! ```text
//! GridPartitioner ─> GridAxes ─┐
//!                              ├─> GridExecutor ─┬─> BaselineValuator ─┐
//! ScenarioBuilder ─────────────┘                 │                     ├─> ValuationChannel ─> ValuationClient
//!                                                └─> workers ──────────┘
//!
//! BatchOrchestrator ─> [ComputationRun] ─> ResultStore ─> SummaryIndex
//! ```
//!
//! ## Usage
//!
//! ```ignore
//! let orchestrator = BatchOrchestrator::new(config, client)?;
//! let report = orchestrator
//!     .run(vec![InstrumentJob::new(spec, StrikeSource::Listed(strikes))])
//!     .await?;
//!
//! let store = ResultStore::new();
//! store.insert_all(report.into_runs());
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod baseline;
pub mod channel;
pub mod error;
pub mod executor;
pub mod grid;
pub mod matrix;
pub mod orchestrator;
pub mod progress;
pub mod run;
pub mod runtime;
pub mod scenario;
pub mod store;
pub mod summary;

// Re-exports
pub use baseline::{Baseline, BaselineValuator, Baselines};
pub use channel::ValuationChannel;
pub use error::{EngineError, EngineResult};
pub use executor::{GridExecutor, GridSettings};
pub use grid::{AxisKind, GridAxes, GridAxis, GridError, GridPartitioner, StrikePolicy, StrikeSource};
pub use matrix::{CellSlots, SensitivityMatrix};
pub use orchestrator::{BatchOrchestrator, GridSource, InstrumentJob};
pub use progress::{ProgressBoard, ProgressEvent, ProgressTracker};
pub use run::{BatchReport, ComputationRun, InstrumentOutcome};
pub use runtime::{CallGate, CallMetrics, CallMetricsSnapshot, RunCancellation};
pub use scenario::{BumpSpec, ScenarioBuilder};
pub use store::{CacheEntry, ResultStore, TenorAxis};
pub use summary::{MatchedTenor, SummaryIndex, SummaryOutcome, SummaryQuery, SummaryRow};
