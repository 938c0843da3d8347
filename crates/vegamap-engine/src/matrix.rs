//! Sensitivity matrix storage.
//!
//! [`CellSlots`] is the pre-sized container a grid run fills by `(row, col)`
//! index while results arrive in any order. Once every slot is resolved it
//! freezes into an immutable [`SensitivityMatrix`].

use serde::{Deserialize, Serialize};

use crate::error::{EngineError, EngineResult};

/// Frozen strike x tenor matrix of finite-difference values.
///
/// Rows follow the strike axis, columns the tenor axis. Failed cells are NaN.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SensitivityMatrix {
    rows: usize,
    cols: usize,
    values: Vec<f64>,
}

impl SensitivityMatrix {
    /// Build from row-major values.
    pub fn from_row_major(rows: usize, cols: usize, values: Vec<f64>) -> EngineResult<Self> {
        if values.len() != rows * cols {
            return Err(EngineError::Internal(format!(
                "{} values do not fill a {rows}x{cols} matrix",
                values.len()
            )));
        }
        Ok(Self { rows, cols, values })
    }

    /// Build from nested rows; every row must have the same length.
    pub fn from_rows(rows: Vec<Vec<f64>>) -> EngineResult<Self> {
        let cols = rows.first().map_or(0, Vec::len);
        if let Some(bad) = rows.iter().position(|r| r.len() != cols) {
            return Err(EngineError::Internal(format!(
                "row {bad} has {} columns, expected {cols}",
                rows[bad].len()
            )));
        }
        let n = rows.len();
        Ok(Self {
            rows: n,
            cols,
            values: rows.into_iter().flatten().collect(),
        })
    }

    /// Number of strike rows.
    pub fn rows(&self) -> usize {
        self.rows
    }

    /// Number of tenor columns.
    pub fn cols(&self) -> usize {
        self.cols
    }

    /// Value at `(row, col)`.
    pub fn get(&self, row: usize, col: usize) -> Option<f64> {
        if row < self.rows && col < self.cols {
            Some(self.values[row * self.cols + col])
        } else {
            None
        }
    }

    /// One strike row.
    pub fn row(&self, row: usize) -> Option<&[f64]> {
        if row < self.rows {
            Some(&self.values[row * self.cols..(row + 1) * self.cols])
        } else {
            None
        }
    }

    /// Row-major values.
    pub fn values(&self) -> &[f64] {
        &self.values
    }

    /// Nested rows.
    pub fn to_rows(&self) -> Vec<Vec<f64>> {
        if self.cols == 0 {
            return vec![Vec::new(); self.rows];
        }
        self.values.chunks(self.cols).map(<[f64]>::to_vec).collect()
    }

    /// Transposed copy: rows become tenors, columns strikes.
    pub fn transposed(&self) -> Vec<Vec<f64>> {
        (0..self.cols)
            .map(|c| (0..self.rows).map(|r| self.values[r * self.cols + c]).collect())
            .collect()
    }

    /// Number of NaN cells.
    pub fn nan_count(&self) -> usize {
        self.values.iter().filter(|v| v.is_nan()).count()
    }

    /// Largest absolute finite value, `None` if every cell is NaN.
    pub fn max_abs_finite(&self) -> Option<f64> {
        self.values
            .iter()
            .filter(|v| v.is_finite())
            .map(|v| v.abs())
            .fold(None, |acc, v| Some(acc.map_or(v, |m: f64| m.max(v))))
    }
}

/// Index-addressed slots being filled by a grid run.
#[derive(Debug)]
pub struct CellSlots {
    rows: usize,
    cols: usize,
    slots: Vec<Option<f64>>,
    resolved: usize,
}

impl CellSlots {
    /// All-unresolved slots for a `rows x cols` grid.
    pub fn new(rows: usize, cols: usize) -> Self {
        Self {
            rows,
            cols,
            slots: vec![None; rows * cols],
            resolved: 0,
        }
    }

    /// Resolve `(row, col)`; each slot is written exactly once.
    pub fn resolve(&mut self, row: usize, col: usize, value: f64) -> EngineResult<()> {
        if row >= self.rows || col >= self.cols {
            return Err(EngineError::Internal(format!(
                "cell ({row}, {col}) outside {}x{} grid",
                self.rows, self.cols
            )));
        }
        let slot = &mut self.slots[row * self.cols + col];
        if slot.is_some() {
            return Err(EngineError::Internal(format!(
                "cell ({row}, {col}) resolved twice"
            )));
        }
        *slot = Some(value);
        self.resolved += 1;
        Ok(())
    }

    /// Slots resolved so far.
    pub fn resolved(&self) -> usize {
        self.resolved
    }

    /// Total slots.
    pub fn total(&self) -> usize {
        self.slots.len()
    }

    /// True once every slot holds a value or NaN.
    pub fn is_complete(&self) -> bool {
        self.resolved == self.slots.len()
    }

    /// Freeze into a matrix; fails while any slot is unresolved.
    pub fn freeze(self) -> EngineResult<SensitivityMatrix> {
        if !self.is_complete() {
            return Err(EngineError::Internal(format!(
                "{} of {} cells unresolved",
                self.total() - self.resolved,
                self.total()
            )));
        }
        let values = self.slots.into_iter().map(|v| v.unwrap_or(f64::NAN)).collect();
        SensitivityMatrix::from_row_major(self.rows, self.cols, values)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_slots_fill_out_of_order() {
        let mut slots = CellSlots::new(2, 2);
        slots.resolve(1, 1, 4.0).unwrap();
        slots.resolve(0, 0, 1.0).unwrap();
        slots.resolve(1, 0, f64::NAN).unwrap();
        assert!(!slots.is_complete());
        slots.resolve(0, 1, 2.0).unwrap();

        let matrix = slots.freeze().unwrap();
        assert_eq!(matrix.row(0).unwrap(), &[1.0, 2.0]);
        assert!(matrix.get(1, 0).unwrap().is_nan());
        assert_eq!(matrix.nan_count(), 1);
    }

    #[test]
    fn test_slots_reject_double_write() {
        let mut slots = CellSlots::new(1, 2);
        slots.resolve(0, 1, 1.0).unwrap();
        assert!(slots.resolve(0, 1, 2.0).is_err());
        assert!(slots.resolve(1, 0, 2.0).is_err());
        assert!(slots.freeze().is_err());
    }

    #[test]
    fn test_max_abs_skips_nan() {
        let matrix = SensitivityMatrix::from_rows(vec![
            vec![200.0, f64::NAN],
            vec![-450.0, 120.0],
        ])
        .unwrap();
        assert_eq!(matrix.max_abs_finite(), Some(450.0));

        let empty = SensitivityMatrix::from_rows(vec![vec![f64::NAN]]).unwrap();
        assert_eq!(empty.max_abs_finite(), None);
    }

    #[test]
    fn test_transpose() {
        let matrix = SensitivityMatrix::from_rows(vec![vec![1.0, 2.0], vec![3.0, 4.0], vec![5.0, 6.0]]).unwrap();
        assert_eq!(matrix.transposed(), vec![vec![1.0, 3.0, 5.0], vec![2.0, 4.0, 6.0]]);
        assert!(SensitivityMatrix::from_rows(vec![vec![1.0], vec![1.0, 2.0]]).is_err());
    }
}
