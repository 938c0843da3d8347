//! Nearest-grid-point summary index.
//!
//! For each cached surface:
//!
//! 1. pick the strike column closest to the target relative strike
//! 2. rank tenor rows by distance to the target tenor (months, or days
//!    when the axis holds dates)
//! 3. keep the `N` closest rows, drop NaN cells
//!
//! Every tie resolves to the lowest index. Rows from all surfaces are then
//! sorted by descending absolute value. No matching row is a normal
//! [`SummaryOutcome::NoData`] result.

use std::cmp::Ordering;
use std::fmt;

use chrono::{Duration, Months, NaiveDate};
use serde::{Deserialize, Serialize};

use crate::error::{EngineError, EngineResult};
use crate::store::{CacheEntry, ResultStore, TenorAxis};

/// Average days in a month, for fractional month offsets.
const DAYS_PER_MONTH: f64 = 365.25 / 12.0;

/// A summary query.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SummaryQuery {
    /// Valuation date; date axes are offset from it.
    pub valuation_date: NaiveDate,
    /// Target tenor in months.
    pub target_tenor_months: f64,
    /// Target strike in percent of spot (100 = at the money).
    pub target_strike_pct: f64,
    /// Tenor rows kept per surface.
    pub neighbors: usize,
    /// Rows per page; `None` returns one page.
    #[serde(default)]
    pub page_size: Option<usize>,
    /// Drop rows whose absolute value is below this.
    #[serde(default)]
    pub min_abs_value: Option<f64>,
}

impl SummaryQuery {
    /// Create a query without paging or threshold.
    pub fn new(
        valuation_date: NaiveDate,
        target_tenor_months: f64,
        target_strike_pct: f64,
        neighbors: usize,
    ) -> Self {
        Self {
            valuation_date,
            target_tenor_months,
            target_strike_pct,
            neighbors,
            page_size: None,
            min_abs_value: None,
        }
    }

    /// Page the result.
    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = Some(page_size);
        self
    }

    /// Keep only rows with `|value| >= threshold`.
    pub fn with_min_abs_value(mut self, threshold: f64) -> Self {
        self.min_abs_value = Some(threshold);
        self
    }

    /// Target strike as a fraction of spot.
    pub fn target_strike(&self) -> f64 {
        self.target_strike_pct / 100.0
    }

    /// Valuation date moved forward by the target tenor.
    pub fn target_date(&self) -> EngineResult<NaiveDate> {
        let whole = self.target_tenor_months.trunc();
        let extra_days = ((self.target_tenor_months - whole) * DAYS_PER_MONTH).round() as i64;
        self.valuation_date
            .checked_add_months(Months::new(whole as u32))
            .and_then(|d| d.checked_add_signed(Duration::days(extra_days)))
            .ok_or_else(|| {
                EngineError::Config(format!(
                    "{} + {} months is out of range",
                    self.valuation_date, self.target_tenor_months
                ))
            })
    }

    fn validate(&self) -> EngineResult<()> {
        if !self.target_tenor_months.is_finite() || self.target_tenor_months < 0.0 {
            return Err(EngineError::Config(format!(
                "target tenor {} must be a non-negative number of months",
                self.target_tenor_months
            )));
        }
        if !self.target_strike_pct.is_finite() {
            return Err(EngineError::Config("target strike must be finite".into()));
        }
        if self.neighbors == 0 {
            return Err(EngineError::Config("neighbor count must be at least 1".into()));
        }
        if self.page_size == Some(0) {
            return Err(EngineError::Config("page size must be at least 1".into()));
        }
        Ok(())
    }
}

/// Tenor coordinate a summary row was read from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchedTenor {
    /// Offset in months.
    Months(f64),
    /// Observation date.
    Date(NaiveDate),
}

impl fmt::Display for MatchedTenor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MatchedTenor::Months(m) if m.fract() == 0.0 => write!(f, "{}m", *m as i64),
            MatchedTenor::Months(m) => write!(f, "{m}m"),
            MatchedTenor::Date(d) => write!(f, "{d}"),
        }
    }
}

/// One reported grid point.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SummaryRow {
    /// Surface ticker.
    pub ticker: String,
    /// Cell value.
    pub value: f64,
    /// Matched tenor.
    pub tenor: MatchedTenor,
    /// Matched strike (fraction of spot).
    pub strike: f64,
}

/// Result of a summary query.
#[derive(Debug, Clone, PartialEq)]
pub enum SummaryOutcome {
    /// No surface produced a row.
    NoData,
    /// Rows sorted by descending absolute value.
    Rows {
        /// All rows.
        rows: Vec<SummaryRow>,
        /// Rows per page.
        page_size: Option<usize>,
    },
}

impl SummaryOutcome {
    /// True for the explicit no-data result.
    pub fn is_no_data(&self) -> bool {
        matches!(self, SummaryOutcome::NoData)
    }

    /// All rows; empty for no data.
    pub fn rows(&self) -> &[SummaryRow] {
        match self {
            SummaryOutcome::NoData => &[],
            SummaryOutcome::Rows { rows, .. } => rows,
        }
    }

    /// Number of pages.
    pub fn page_count(&self) -> usize {
        match self {
            SummaryOutcome::NoData => 0,
            SummaryOutcome::Rows { rows, page_size } => match page_size {
                Some(size) => rows.len().div_ceil(*size),
                None => 1,
            },
        }
    }

    /// Page `index` (zero-based); empty past the end.
    pub fn page(&self, index: usize) -> &[SummaryRow] {
        match self {
            SummaryOutcome::NoData => &[],
            SummaryOutcome::Rows { rows, page_size } => {
                let size = page_size.unwrap_or(rows.len()).max(1);
                let start = index.saturating_mul(size).min(rows.len());
                let end = (start + size).min(rows.len());
                &rows[start..end]
            }
        }
    }
}

/// Read-only index over cached surfaces.
#[derive(Debug, Clone, Default)]
pub struct SummaryIndex {
    entries: Vec<CacheEntry>,
}

impl SummaryIndex {
    /// Index the given surfaces.
    pub fn new(entries: Vec<CacheEntry>) -> Self {
        Self { entries }
    }

    /// Index everything currently in a store.
    pub fn from_store(store: &ResultStore) -> Self {
        Self::new(store.cache_entries())
    }

    /// Indexed surfaces.
    pub fn entries(&self) -> &[CacheEntry] {
        &self.entries
    }

    /// Answer a query.
    pub fn query(&self, query: &SummaryQuery) -> EngineResult<SummaryOutcome> {
        query.validate()?;
        let target_strike = query.target_strike();
        let target_date = query.target_date()?;

        let mut rows: Vec<SummaryRow> = Vec::new();
        for entry in &self.entries {
            let Some(col) = nearest_index(entry.strike_axis(), target_strike) else {
                continue;
            };
            let strike = entry.strike_axis()[col];

            let distances: Vec<f64> = match entry.tenor_axis() {
                TenorAxis::Months(months) => months
                    .iter()
                    .map(|m| (m - query.target_tenor_months).abs())
                    .collect(),
                TenorAxis::Dates(dates) => dates
                    .iter()
                    .map(|d| (*d - target_date).num_days().abs() as f64)
                    .collect(),
            };

            for row in nearest_rows(&distances, query.neighbors) {
                let Some(value) = entry.value(row, col) else {
                    continue;
                };
                if value.is_nan() {
                    continue;
                }
                if let Some(threshold) = query.min_abs_value {
                    if value.abs() < threshold {
                        continue;
                    }
                }
                let tenor = match entry.tenor_axis() {
                    TenorAxis::Months(m) => MatchedTenor::Months(m[row]),
                    TenorAxis::Dates(d) => MatchedTenor::Date(d[row]),
                };
                rows.push(SummaryRow {
                    ticker: entry.ticker().to_string(),
                    value,
                    tenor,
                    strike,
                });
            }
        }

        if rows.is_empty() {
            return Ok(SummaryOutcome::NoData);
        }
        rows.sort_by(|a, b| {
            b.value
                .abs()
                .partial_cmp(&a.value.abs())
                .unwrap_or(Ordering::Equal)
        });
        Ok(SummaryOutcome::Rows {
            rows,
            page_size: query.page_size,
        })
    }
}

/// Index of the value closest to `target`; ties go to the lowest index.
pub fn nearest_index(axis: &[f64], target: f64) -> Option<usize> {
    let mut best: Option<(usize, f64)> = None;
    for (i, v) in axis.iter().enumerate() {
        let distance = (v - target).abs();
        if distance.is_nan() {
            continue;
        }
        match best {
            Some((_, d)) if distance >= d => {}
            _ => best = Some((i, distance)),
        }
    }
    best.map(|(i, _)| i)
}

/// Indexes of the `n` smallest distances, nearest first; ties keep index order.
pub fn nearest_rows(distances: &[f64], n: usize) -> Vec<usize> {
    let mut order: Vec<usize> = (0..distances.len())
        .filter(|i| !distances[*i].is_nan())
        .collect();
    order.sort_by(|a, b| {
        distances[*a]
            .partial_cmp(&distances[*b])
            .unwrap_or(Ordering::Equal)
    });
    order.truncate(n);
    order
}
