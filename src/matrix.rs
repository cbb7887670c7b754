//! Feature matrix with missing entries.
//!
//! Rows are genomic bins, columns are features (a target region, a
//! chromosome, an embedding axis). A missing entry is stored as `NaN`;
//! every consumer in this crate skips those coordinates rather than
//! imputing them.

use crate::error::{Error, Result};
use ndarray::{Array2, ArrayView1};

/// Dense `rows x columns` matrix of `f32` values where `NaN` marks a missing entry.
#[derive(Debug, Clone, PartialEq)]
pub struct FeatureMatrix {
    data: Array2<f32>,
}

impl FeatureMatrix {
    /// Wrap an existing array.
    pub fn new(data: Array2<f32>) -> Result<Self> {
        if data.nrows() == 0 || data.ncols() == 0 {
            return Err(Error::EmptyInput);
        }
        Ok(Self { data })
    }

    /// Build from row vectors. All rows must have the same length.
    pub fn from_rows(rows: &[Vec<f32>]) -> Result<Self> {
        if rows.is_empty() {
            return Err(Error::EmptyInput);
        }
        let d = rows[0].len();
        let mut flat: Vec<f32> = Vec::with_capacity(rows.len() * d);
        for row in rows {
            if row.len() != d {
                return Err(Error::DimensionMismatch {
                    expected: d,
                    found: row.len(),
                });
            }
            flat.extend(row);
        }
        let data = Array2::from_shape_vec((rows.len(), d), flat).map_err(|_| {
            Error::DimensionMismatch {
                expected: rows.len() * d,
                found: rows.iter().map(Vec::len).sum(),
            }
        })?;
        Self::new(data)
    }

    /// Number of rows (bins).
    pub fn nrows(&self) -> usize {
        self.data.nrows()
    }

    /// Number of columns (features).
    pub fn ncols(&self) -> usize {
        self.data.ncols()
    }

    /// View of row `i`.
    pub fn row(&self, i: usize) -> ArrayView1<'_, f32> {
        self.data.row(i)
    }

    /// Entry at row `i`, column `j`.
    pub fn get(&self, i: usize, j: usize) -> f32 {
        self.data[[i, j]]
    }

    /// True when rows `i` and `j` have a value at some common column.
    pub fn shares_coordinates(&self, i: usize, j: usize) -> bool {
        self.data
            .row(i)
            .iter()
            .zip(self.data.row(j).iter())
            .any(|(a, b)| !a.is_nan() && !b.is_nan())
    }

    /// True when every entry of row `i` is missing.
    pub fn is_row_missing(&self, i: usize) -> bool {
        self.data.row(i).iter().all(|v| v.is_nan())
    }

    /// Indices of rows with at least one present entry.
    pub fn present_rows(&self) -> Vec<usize> {
        (0..self.nrows()).filter(|&i| !self.is_row_missing(i)).collect()
    }

    /// Fraction of entries that are missing.
    pub fn missing_fraction(&self) -> f64 {
        let missing = self.data.iter().filter(|v| v.is_nan()).count();
        missing as f64 / self.data.len() as f64
    }
}
