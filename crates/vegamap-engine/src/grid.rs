//! Grid partitioning.
//!
//! Builds the strike and tenor axes a sensitivity surface is computed on.
//! Each [`GridAxis`] holds `N + 1` strictly increasing bucket edges and the
//! `N` derived bucket centers:
//!
//! - strike centers are edge midpoints, expressed as fractions of spot
//! - tenor centers are truncated edge midpoints, in months
//!
//! Market strike lists are filtered through a [`StrikePolicy`]: an outer
//! band bounds the grid, strikes inside the inner band are all kept, and
//! outside it only multiples of a coarse step survive.

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use vegamap_traits::config::{EngineConfig, StrikePolicyConfig, TenorGridConfig};

/// Half-width of a bucket built around a lone center.
const LONE_CENTER_HALF_WIDTH: f64 = 0.5;

/// Rounding applied to generated strike ratios to strip stepping noise.
const RANGE_ROUNDING: f64 = 1e10;

// =============================================================================
// ERRORS
// =============================================================================

/// Grid construction error.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum GridError {
    /// No values supplied.
    #[error("{axis} axis is empty")]
    Empty {
        /// Axis being built.
        axis: AxisKind,
    },

    /// NaN or infinite value.
    #[error("{axis} axis value at index {index} is not finite")]
    NonFinite {
        /// Axis being built.
        axis: AxisKind,
        /// Offending index.
        index: usize,
    },

    /// Values not strictly increasing.
    #[error("{axis} axis is not strictly increasing at index {index}")]
    NotIncreasing {
        /// Axis being built.
        axis: AxisKind,
        /// First index that is not above its predecessor.
        index: usize,
    },

    /// Zero, negative or non-finite step.
    #[error("{axis} step must be positive, got {step}")]
    InvalidStep {
        /// Axis being built.
        axis: AxisKind,
        /// Offending step.
        step: f64,
    },

    /// Range or band bounds are inconsistent.
    #[error("invalid {axis} range: {message}")]
    InvalidRange {
        /// Axis being built.
        axis: AxisKind,
        /// What is wrong.
        message: String,
    },

    /// Spot must be positive.
    #[error("spot must be positive and finite, got {0}")]
    InvalidSpot(f64),

    /// The strike policy removed every strike.
    #[error("no strikes survive the strike policy")]
    NoStrikesSelected,

    /// Axis passed for the wrong dimension.
    #[error("expected a {expected} axis, got a {actual} axis")]
    WrongKind {
        /// Required kind.
        expected: AxisKind,
        /// Supplied kind.
        actual: AxisKind,
    },
}

// =============================================================================
// AXIS
// =============================================================================

/// Dimension of an axis.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AxisKind {
    /// Strike as a fraction of spot.
    Strike,
    /// Tenor in months.
    Tenor,
}

impl fmt::Display for AxisKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AxisKind::Strike => write!(f, "strike"),
            AxisKind::Tenor => write!(f, "tenor"),
        }
    }
}

/// Ordered bucket edges and their centers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GridAxis {
    kind: AxisKind,
    edges: Vec<f64>,
    centers: Vec<f64>,
}

impl GridAxis {
    /// Build an axis from bucket edges; needs at least two edges.
    pub fn from_edges(kind: AxisKind, edges: Vec<f64>) -> Result<Self, GridError> {
        check_strictly_increasing(kind, &edges)?;
        if edges.len() < 2 {
            return Err(GridError::InvalidRange {
                axis: kind,
                message: "at least two edges are required".into(),
            });
        }

        let centers: Vec<f64> = edges
            .windows(2)
            .map(|w| {
                let mid = (w[0] + w[1]) / 2.0;
                match kind {
                    AxisKind::Strike => mid,
                    AxisKind::Tenor => mid.trunc(),
                }
            })
            .collect();
        // Truncation can merge centers of sub-month buckets.
        check_strictly_increasing(kind, &centers)?;

        Ok(Self {
            kind,
            edges,
            centers,
        })
    }

    /// Build an axis around known bucket centers.
    ///
    /// Inner edges sit halfway between neighbouring centers; the outer edges
    /// mirror the first and last gaps. A lone center gets a unit-wide bucket.
    pub fn from_centers(kind: AxisKind, centers: Vec<f64>) -> Result<Self, GridError> {
        check_strictly_increasing(kind, &centers)?;

        let edges = if centers.len() == 1 {
            vec![
                centers[0] - LONE_CENTER_HALF_WIDTH,
                centers[0] + LONE_CENTER_HALF_WIDTH,
            ]
        } else {
            let n = centers.len();
            let mut edges = Vec::with_capacity(n + 1);
            edges.push(centers[0] - (centers[1] - centers[0]) / 2.0);
            edges.extend(centers.windows(2).map(|w| (w[0] + w[1]) / 2.0));
            edges.push(centers[n - 1] + (centers[n - 1] - centers[n - 2]) / 2.0);
            edges
        };

        Ok(Self {
            kind,
            edges,
            centers,
        })
    }

    /// Axis dimension.
    pub fn kind(&self) -> AxisKind {
        self.kind
    }

    /// Number of buckets.
    pub fn len(&self) -> usize {
        self.centers.len()
    }

    /// True if the axis has no buckets.
    pub fn is_empty(&self) -> bool {
        self.centers.is_empty()
    }

    /// Bucket edges (`len() + 1` values).
    pub fn edges(&self) -> &[f64] {
        &self.edges
    }

    /// Bucket centers.
    pub fn centers(&self) -> &[f64] {
        &self.centers
    }

    /// Label of bucket `index`: `"6m"` for tenors, the ratio itself for strikes.
    pub fn label(&self, index: usize) -> Option<String> {
        self.centers.get(index).map(|c| format_label(self.kind, *c))
    }

    /// Labels of every bucket.
    pub fn labels(&self) -> Vec<String> {
        self.centers
            .iter()
            .map(|c| format_label(self.kind, *c))
            .collect()
    }

    /// Bucket whose `[lower, upper)` interval contains `value`; the last bucket is closed.
    pub fn bucket_of(&self, value: f64) -> Option<usize> {
        let n = self.len();
        (0..n).find(|&i| {
            let lower = self.edges[i];
            let upper = self.edges[i + 1];
            value >= lower && (value < upper || (i == n - 1 && value <= upper))
        })
    }
}

fn format_label(kind: AxisKind, center: f64) -> String {
    match kind {
        AxisKind::Tenor if center.fract() == 0.0 => format!("{}m", center as i64),
        AxisKind::Tenor => format!("{center}m"),
        AxisKind::Strike => format!("{center}"),
    }
}

fn check_strictly_increasing(kind: AxisKind, values: &[f64]) -> Result<(), GridError> {
    if values.is_empty() {
        return Err(GridError::Empty { axis: kind });
    }
    if let Some(index) = values.iter().position(|v| !v.is_finite()) {
        return Err(GridError::NonFinite { axis: kind, index });
    }
    if let Some(index) = values.windows(2).position(|w| w[1] <= w[0]) {
        return Err(GridError::NotIncreasing {
            axis: kind,
            index: index + 1,
        });
    }
    Ok(())
}

/// Strike and tenor axes of one instrument, plus the spot they are relative to.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GridAxes {
    strike: GridAxis,
    tenor: GridAxis,
    spot: f64,
}

impl GridAxes {
    /// Pair a strike axis with a tenor axis.
    pub fn new(strike: GridAxis, tenor: GridAxis, spot: f64) -> Result<Self, GridError> {
        if strike.kind() != AxisKind::Strike {
            return Err(GridError::WrongKind {
                expected: AxisKind::Strike,
                actual: strike.kind(),
            });
        }
        if tenor.kind() != AxisKind::Tenor {
            return Err(GridError::WrongKind {
                expected: AxisKind::Tenor,
                actual: tenor.kind(),
            });
        }
        if !spot.is_finite() || spot <= 0.0 {
            return Err(GridError::InvalidSpot(spot));
        }
        Ok(Self {
            strike,
            tenor,
            spot,
        })
    }

    /// Strike axis (rows).
    pub fn strike(&self) -> &GridAxis {
        &self.strike
    }

    /// Tenor axis (columns).
    pub fn tenor(&self) -> &GridAxis {
        &self.tenor
    }

    /// Spot level strike ratios refer to.
    pub fn spot(&self) -> f64 {
        self.spot
    }

    /// `(rows, cols)` of the matrix computed on these axes.
    pub fn shape(&self) -> (usize, usize) {
        (self.strike.len(), self.tenor.len())
    }

    /// Total number of cells.
    pub fn cell_count(&self) -> usize {
        self.strike.len() * self.tenor.len()
    }

    /// Absolute strike of row `row`.
    pub fn absolute_strike(&self, row: usize) -> Option<f64> {
        self.strike.centers().get(row).map(|ratio| ratio * self.spot)
    }
}

// =============================================================================
// STRIKE POLICY
// =============================================================================

/// Inclusion rule for market strikes, in fractions of spot.
#[derive(Debug, Clone, PartialEq)]
pub struct StrikePolicy {
    outer: (f64, f64),
    inner: (f64, f64),
    coarse_step: f64,
    tolerance: f64,
}

impl StrikePolicy {
    /// Build a policy from configuration.
    pub fn new(config: &StrikePolicyConfig) -> Result<Self, GridError> {
        let axis = AxisKind::Strike;
        let finite = [
            config.outer_lower,
            config.outer_upper,
            config.inner_lower,
            config.inner_upper,
        ]
        .iter()
        .all(|v| v.is_finite());
        if !finite || config.outer_lower >= config.outer_upper {
            return Err(GridError::InvalidRange {
                axis,
                message: format!(
                    "outer band [{}, {}] is empty",
                    config.outer_lower, config.outer_upper
                ),
            });
        }
        if config.inner_lower > config.inner_upper
            || config.inner_lower < config.outer_lower
            || config.inner_upper > config.outer_upper
        {
            return Err(GridError::InvalidRange {
                axis,
                message: format!(
                    "inner band [{}, {}] must lie inside the outer band",
                    config.inner_lower, config.inner_upper
                ),
            });
        }
        if !config.coarse_step.is_finite() || config.coarse_step <= 0.0 {
            return Err(GridError::InvalidStep {
                axis,
                step: config.coarse_step,
            });
        }
        if !config.tolerance.is_finite() || config.tolerance < 0.0 {
            return Err(GridError::InvalidRange {
                axis,
                message: format!("tolerance {} must be non-negative", config.tolerance),
            });
        }

        Ok(Self {
            outer: (config.outer_lower, config.outer_upper),
            inner: (config.inner_lower, config.inner_upper),
            coarse_step: config.coarse_step,
            tolerance: config.tolerance,
        })
    }

    /// True if a strike at `ratio` of spot belongs on the grid.
    pub fn admits(&self, ratio: f64) -> bool {
        let tol = self.tolerance;
        if !ratio.is_finite() || ratio < self.outer.0 - tol || ratio > self.outer.1 + tol {
            return false;
        }
        if ratio >= self.inner.0 - tol && ratio <= self.inner.1 + tol {
            return true;
        }
        is_multiple_of(ratio, self.coarse_step, tol)
    }
}

impl Default for StrikePolicy {
    fn default() -> Self {
        let config = StrikePolicyConfig::default();
        Self {
            outer: (config.outer_lower, config.outer_upper),
            inner: (config.inner_lower, config.inner_upper),
            coarse_step: config.coarse_step,
            tolerance: config.tolerance,
        }
    }
}

fn is_multiple_of(value: f64, step: f64, tolerance: f64) -> bool {
    let k = (value / step).round();
    (value - k * step).abs() <= tolerance
}

// =============================================================================
// PARTITIONER
// =============================================================================

/// Where strike buckets come from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StrikeSource {
    /// Listed absolute strikes, strictly increasing; filtered by the strike policy.
    Listed(Vec<f64>),
    /// Evenly spaced strike ratios from `lower` to `upper` inclusive.
    Range {
        /// First ratio.
        lower: f64,
        /// Last ratio.
        upper: f64,
        /// Spacing.
        step: f64,
    },
}

/// Builds grid axes from configuration and market strikes.
#[derive(Debug, Clone)]
pub struct GridPartitioner {
    tenor: TenorGridConfig,
    policy: StrikePolicy,
}

impl GridPartitioner {
    /// Create a partitioner; the tenor configuration is checked on first use.
    pub fn new(tenor: TenorGridConfig, policy: StrikePolicy) -> Self {
        Self { tenor, policy }
    }

    /// Create a partitioner from engine configuration.
    pub fn from_config(config: &EngineConfig) -> Result<Self, GridError> {
        let policy = StrikePolicy::new(&config.strike_policy)?;
        let partitioner = Self::new(config.tenor_grid.clone(), policy);
        partitioner.tenor_axis()?;
        Ok(partitioner)
    }

    /// Tenor edges in months, dense zone first.
    pub fn tenor_edges(&self) -> Result<Vec<f64>, GridError> {
        let axis = AxisKind::Tenor;
        let cfg = &self.tenor;
        if cfg.step_months == 0 {
            return Err(GridError::InvalidStep { axis, step: 0.0 });
        }
        if cfg.end_months <= cfg.start_months {
            return Err(GridError::InvalidRange {
                axis,
                message: format!(
                    "end {}m must be after start {}m",
                    cfg.end_months, cfg.start_months
                ),
            });
        }

        let mut edges = Vec::new();
        let mut month = cfg.start_months;

        if let Some(dense_until) = cfg.dense_until_months {
            let dense_step = cfg.dense_step_months.unwrap_or(1);
            if dense_step == 0 {
                return Err(GridError::InvalidStep { axis, step: 0.0 });
            }
            if dense_until <= cfg.start_months || dense_until > cfg.end_months {
                return Err(GridError::InvalidRange {
                    axis,
                    message: format!(
                        "dense zone end {dense_until}m must lie in ({}m, {}m]",
                        cfg.start_months, cfg.end_months
                    ),
                });
            }
            while month < dense_until {
                edges.push(month as f64);
                month += dense_step;
            }
            month = dense_until;
        }

        while month < cfg.end_months {
            edges.push(month as f64);
            month += cfg.step_months;
        }
        edges.push(cfg.end_months as f64);

        Ok(edges)
    }

    /// Tenor axis.
    pub fn tenor_axis(&self) -> Result<GridAxis, GridError> {
        GridAxis::from_edges(AxisKind::Tenor, self.tenor_edges()?)
    }

    /// Strike axis for a given spot.
    pub fn strike_axis(&self, source: &StrikeSource, spot: f64) -> Result<GridAxis, GridError> {
        let axis = AxisKind::Strike;
        if !spot.is_finite() || spot <= 0.0 {
            return Err(GridError::InvalidSpot(spot));
        }

        let ratios = match source {
            StrikeSource::Listed(strikes) => {
                check_strictly_increasing(axis, strikes)?;
                let kept: Vec<f64> = strikes
                    .iter()
                    .map(|k| k / spot)
                    .filter(|ratio| self.policy.admits(*ratio))
                    .collect();
                if kept.is_empty() {
                    return Err(GridError::NoStrikesSelected);
                }
                kept
            }
            StrikeSource::Range { lower, upper, step } => {
                if !step.is_finite() || *step <= 0.0 {
                    return Err(GridError::InvalidStep { axis, step: *step });
                }
                if !lower.is_finite() || !upper.is_finite() || lower > upper || *lower <= 0.0 {
                    return Err(GridError::InvalidRange {
                        axis,
                        message: format!("[{lower}, {upper}] is not a positive range"),
                    });
                }
                let count = ((upper - lower) / step + self.policy.tolerance).floor() as usize + 1;
                (0..count)
                    .map(|k| ((lower + k as f64 * step) * RANGE_ROUNDING).round() / RANGE_ROUNDING)
                    .collect()
            }
        };

        GridAxis::from_centers(axis, ratios)
    }

    /// Both axes for one instrument.
    pub fn partition(&self, source: &StrikeSource, spot: f64) -> Result<GridAxes, GridError> {
        let strike = self.strike_axis(source, spot)?;
        let tenor = self.tenor_axis()?;
        GridAxes::new(strike, tenor, spot)
    }
}

impl Default for GridPartitioner {
    fn default() -> Self {
        Self::new(TenorGridConfig::default(), StrikePolicy::default())
    }
}
