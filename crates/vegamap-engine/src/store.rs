//! In-memory result store.
//!
//! Completed runs are kept by `(instrument, created_at)`. Surfaces loaded
//! from elsewhere (e.g. files indexed by calendar dates) are kept by ticker.
//! The summary index reads both through [`ResultStore::cache_entries`].

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{DateTime, NaiveDate, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};

use vegamap_traits::InstrumentId;

use crate::error::{EngineError, EngineResult};
use crate::run::ComputationRun;

/// Tenor axis of a cached surface.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TenorAxis {
    /// Offsets in months.
    Months(Vec<f64>),
    /// Absolute observation dates.
    Dates(Vec<NaiveDate>),
}

impl TenorAxis {
    /// Number of tenor rows.
    pub fn len(&self) -> usize {
        match self {
            TenorAxis::Months(m) => m.len(),
            TenorAxis::Dates(d) => d.len(),
        }
    }

    /// True if the axis is empty.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// A cached surface as seen by the summary index.
///
/// Rows follow the tenor axis and columns the strike axis, the transpose
/// of a [`crate::SensitivityMatrix`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheEntry {
    ticker: String,
    values: Vec<Vec<f64>>,
    strike_axis: Vec<f64>,
    tenor_axis: TenorAxis,
}

impl CacheEntry {
    /// Create an entry; `values` must be `tenor_axis.len() x strike_axis.len()`.
    pub fn new(
        ticker: impl Into<String>,
        values: Vec<Vec<f64>>,
        strike_axis: Vec<f64>,
        tenor_axis: TenorAxis,
    ) -> EngineResult<Self> {
        let ticker = ticker.into();
        if values.len() != tenor_axis.len() {
            return Err(EngineError::Internal(format!(
                "{ticker}: {} rows for {} tenors",
                values.len(),
                tenor_axis.len()
            )));
        }
        if let Some(row) = values.iter().position(|r| r.len() != strike_axis.len()) {
            return Err(EngineError::Internal(format!(
                "{ticker}: row {row} has {} values for {} strikes",
                values[row].len(),
                strike_axis.len()
            )));
        }
        Ok(Self {
            ticker,
            values,
            strike_axis,
            tenor_axis,
        })
    }

    /// Entry for a completed run, tenors in months.
    pub fn from_run(run: &ComputationRun) -> Self {
        Self {
            ticker: run.instrument_id().to_string(),
            values: run.matrix().transposed(),
            strike_axis: run.axes().strike().centers().to_vec(),
            tenor_axis: TenorAxis::Months(run.axes().tenor().centers().to_vec()),
        }
    }

    /// Ticker.
    pub fn ticker(&self) -> &str {
        &self.ticker
    }

    /// Rows of values, one per tenor.
    pub fn values(&self) -> &[Vec<f64>] {
        &self.values
    }

    /// Strike axis (fractions of spot).
    pub fn strike_axis(&self) -> &[f64] {
        &self.strike_axis
    }

    /// Tenor axis.
    pub fn tenor_axis(&self) -> &TenorAxis {
        &self.tenor_axis
    }

    /// Value at `(tenor_row, strike_col)`.
    pub fn value(&self, tenor_row: usize, strike_col: usize) -> Option<f64> {
        self.values.get(tenor_row).and_then(|r| r.get(strike_col)).copied()
    }
}

type RunKey = (InstrumentId, DateTime<Utc>);

/// Store of completed runs and loaded surfaces.
#[derive(Default)]
pub struct ResultStore {
    runs: DashMap<RunKey, Arc<ComputationRun>>,
    surfaces: DashMap<String, CacheEntry>,
}

impl ResultStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Store a completed run.
    pub fn insert(&self, run: ComputationRun) -> Arc<ComputationRun> {
        let run = Arc::new(run);
        self.runs.insert(
            (run.instrument_id().clone(), run.created_at()),
            Arc::clone(&run),
        );
        run
    }

    /// Store every run of a batch.
    pub fn insert_all(&self, runs: impl IntoIterator<Item = ComputationRun>) -> Vec<Arc<ComputationRun>> {
        runs.into_iter().map(|run| self.insert(run)).collect()
    }

    /// Run by instrument and timestamp.
    pub fn get(&self, instrument_id: &InstrumentId, created_at: DateTime<Utc>) -> Option<Arc<ComputationRun>> {
        self.runs
            .get(&(instrument_id.clone(), created_at))
            .map(|r| Arc::clone(r.value()))
    }

    /// Most recent run of an instrument.
    pub fn latest(&self, instrument_id: &InstrumentId) -> Option<Arc<ComputationRun>> {
        self.runs_for(instrument_id).pop()
    }

    /// Every run of an instrument, oldest first.
    pub fn runs_for(&self, instrument_id: &InstrumentId) -> Vec<Arc<ComputationRun>> {
        let mut runs: Vec<_> = self
            .runs
            .iter()
            .filter(|e| &e.key().0 == instrument_id)
            .map(|e| Arc::clone(e.value()))
            .collect();
        runs.sort_by_key(|r| r.created_at());
        runs
    }

    /// Instruments with at least one run, sorted.
    pub fn instruments(&self) -> Vec<InstrumentId> {
        let mut ids: Vec<_> = self.runs.iter().map(|e| e.key().0.clone()).collect();
        ids.sort();
        ids.dedup();
        ids
    }

    /// Latest run of every instrument, sorted by instrument id.
    pub fn latest_runs(&self) -> Vec<Arc<ComputationRun>> {
        self.instruments()
            .iter()
            .filter_map(|id| self.latest(id))
            .collect()
    }

    /// Number of stored runs.
    pub fn len(&self) -> usize {
        self.runs.len()
    }

    /// True if no run is stored.
    pub fn is_empty(&self) -> bool {
        self.runs.is_empty()
    }

    /// Store an externally produced surface.
    pub fn insert_surface(&self, entry: CacheEntry) {
        self.surfaces.insert(entry.ticker().to_string(), entry);
    }

    /// Loaded surface by ticker.
    pub fn surface(&self, ticker: &str) -> Option<CacheEntry> {
        self.surfaces.get(ticker).map(|e| e.value().clone())
    }

    /// Surfaces for the summary index, sorted by ticker.
    ///
    /// A computed run shadows a loaded surface with the same ticker.
    pub fn cache_entries(&self) -> Vec<CacheEntry> {
        let mut entries: BTreeMap<String, CacheEntry> = self
            .surfaces
            .iter()
            .map(|e| (e.key().clone(), e.value().clone()))
            .collect();
        for run in self.latest_runs() {
            let entry = CacheEntry::from_run(&run);
            entries.insert(entry.ticker().to_string(), entry);
        }
        entries.into_values().collect()
    }

    /// Drop every run of an instrument.
    pub fn remove_instrument(&self, instrument_id: &InstrumentId) {
        self.runs.retain(|k, _| &k.0 != instrument_id);
    }

    /// Clear runs and surfaces.
    pub fn clear(&self) {
        self.runs.clear();
        self.surfaces.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grid::{AxisKind, GridAxes, GridAxis};
    use crate::matrix::SensitivityMatrix;
    use chrono::Duration;

    fn run(id: &str, offset_secs: i64) -> ComputationRun {
        let axes = GridAxes::new(
            GridAxis::from_centers(AxisKind::Strike, vec![0.9, 1.0, 1.1]).unwrap(),
            GridAxis::from_centers(AxisKind::Tenor, vec![6.0, 12.0]).unwrap(),
            100.0,
        )
        .unwrap();
        let base = DateTime::parse_from_rfc3339("2025-01-02T10:00:00Z")
            .unwrap()
            .with_timezone(&Utc);
        ComputationRun::new(
            InstrumentId::new(id),
            SensitivityMatrix::from_rows(vec![
                vec![200.0, 400.0],
                vec![80.0, 320.0],
                vec![-40.0, 120.0],
            ])
            .unwrap(),
            axes,
            100.0,
            None,
            0.7,
        )
        .with_created_at(base + Duration::seconds(offset_secs))
    }

    #[test]
    fn test_latest_run() {
        let store = ResultStore::new();
        store.insert(run("X", 0));
        let newer = store.insert(run("X", 60));
        store.insert(run("Y", 30));

        assert_eq!(store.len(), 3);
        assert_eq!(store.latest(&InstrumentId::new("X")).unwrap().run_id(), newer.run_id());
        assert_eq!(store.instruments(), vec![InstrumentId::new("X"), InstrumentId::new("Y")]);
        assert!(store
            .get(&InstrumentId::new("Y"), newer.created_at())
            .is_none());

        store.remove_instrument(&InstrumentId::new("X"));
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_cache_entry_is_transposed() {
        let entry = CacheEntry::from_run(&run("X", 0));
        assert_eq!(entry.values().len(), 2);
        assert_eq!(entry.value(1, 0), Some(400.0));
        assert_eq!(entry.tenor_axis(), &TenorAxis::Months(vec![6.0, 12.0]));
        assert_eq!(entry.strike_axis(), &[0.9, 1.0, 1.1]);
    }

    #[test]
    fn test_runs_shadow_surfaces() {
        let store = ResultStore::new();
        store.insert_surface(
            CacheEntry::new("X", vec![vec![1.0]], vec![1.0], TenorAxis::Months(vec![6.0])).unwrap(),
        );
        store.insert_surface(
            CacheEntry::new("Z", vec![vec![2.0]], vec![1.0], TenorAxis::Months(vec![6.0])).unwrap(),
        );
        store.insert(run("X", 0));

        let entries = store.cache_entries();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].ticker(), "X");
        assert_eq!(entries[0].strike_axis().len(), 3);
        assert_eq!(entries[1].ticker(), "Z");
    }

    #[test]
    fn test_entry_shape_checked() {
        assert!(CacheEntry::new("A", vec![vec![1.0, 2.0]], vec![1.0], TenorAxis::Months(vec![6.0])).is_err());
        assert!(CacheEntry::new("A", vec![], vec![1.0], TenorAxis::Months(vec![6.0])).is_err());
    }
}
