//! Missing-tolerant distance functions.
//!
//! Every metric looks only at coordinates present (non-`NaN`) in *both*
//! vectors. Accumulated error is divided by the number of such pairs
//! (at least 1), so a row with sparse coverage is not penalised merely for
//! comparing fewer coordinates.
//!
//! | Metric | Self-distance | No joint coordinates | Degenerate input |
//! |--------|---------------|----------------------|------------------|
//! | [`DistanceMetric::SquaredError`] | 0 | 0 | - |
//! | [`DistanceMetric::MeanAbsolute`] | 0 | 0 | - |
//! | [`DistanceMetric::Correlation`] | 0 (1 if constant) | 0 | zero variance -> 1 |
//! | [`DistanceMetric::Cosine`] | 0 (1 if all zero) | 0 | zero norm -> 1 |
//! | [`DistanceMetric::EarthMover`] | 0 | 0 | - |
//!
//! All metrics are pure and symmetric, so they can be shared freely across
//! worker threads.

use crate::matrix::FeatureMatrix;
use ndarray::ArrayView1;

#[cfg(feature = "parallel")]
use rayon::prelude::*;

/// Distance between two feature rows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum DistanceMetric {
    /// Mean squared difference (Euclidean-like).
    #[default]
    SquaredError,
    /// Mean absolute difference (Manhattan-like).
    MeanAbsolute,
    /// `1 - pearson(a, b)`, in `[0, 2]`.
    Correlation,
    /// `1 - cos(a, b)`, in `[0, 2]`.
    Cosine,
    /// One-dimensional earth mover's distance along the column axis,
    /// normalised by the number of joint coordinates.
    EarthMover,
}

impl DistanceMetric {
    /// Distance between `a` and `b`, ignoring coordinates missing in either.
    ///
    /// `a` and `b` must have equal length.
    pub fn distance(&self, a: ArrayView1<'_, f32>, b: ArrayView1<'_, f32>) -> f64 {
        debug_assert_eq!(a.len(), b.len());
        let pairs = a
            .iter()
            .zip(b.iter())
            .filter(|(x, y)| !x.is_nan() && !y.is_nan())
            .map(|(&x, &y)| (x as f64, y as f64));

        match self {
            DistanceMetric::SquaredError => mean_error(pairs, |x, y| (x - y) * (x - y)),
            DistanceMetric::MeanAbsolute => mean_error(pairs, |x, y| (x - y).abs()),
            DistanceMetric::Correlation => correlation_distance(pairs.collect()),
            DistanceMetric::Cosine => cosine_distance(pairs),
            DistanceMetric::EarthMover => earth_mover(pairs),
        }
    }

    /// Whether `distance(a, a) == 0` holds for every vector.
    pub fn zero_self_distance(&self) -> bool {
        !matches!(self, DistanceMetric::Correlation | DistanceMetric::Cosine)
    }

    /// Distances from `query` to the listed rows, in the order given.
    pub fn to_rows(
        &self,
        matrix: &FeatureMatrix,
        query: ArrayView1<'_, f32>,
        rows: &[usize],
    ) -> Vec<f64> {
        #[cfg(feature = "parallel")]
        let iter = rows.par_iter();
        #[cfg(not(feature = "parallel"))]
        let iter = rows.iter();

        iter.map(|&j| self.distance(query, matrix.row(j))).collect()
    }
}

fn mean_error(pairs: impl Iterator<Item = (f64, f64)>, err: impl Fn(f64, f64) -> f64) -> f64 {
    let mut total = 0.0;
    let mut count = 0usize;
    for (x, y) in pairs {
        total += err(x, y);
        count += 1;
    }
    total / count.max(1) as f64
}

fn correlation_distance(pairs: Vec<(f64, f64)>) -> f64 {
    if pairs.is_empty() {
        return 0.0;
    }
    let n = pairs.len() as f64;
    let mean_x = pairs.iter().map(|p| p.0).sum::<f64>() / n;
    let mean_y = pairs.iter().map(|p| p.1).sum::<f64>() / n;

    let mut cov = 0.0;
    let mut var_x = 0.0;
    let mut var_y = 0.0;
    for &(x, y) in &pairs {
        let dx = x - mean_x;
        let dy = y - mean_y;
        cov += dx * dy;
        var_x += dx * dx;
        var_y += dy * dy;
    }
    if var_x <= 0.0 || var_y <= 0.0 {
        return 1.0;
    }
    let r = cov / (var_x.sqrt() * var_y.sqrt());
    (1.0 - r).clamp(0.0, 2.0)
}

fn cosine_distance(pairs: impl Iterator<Item = (f64, f64)>) -> f64 {
    let mut dot = 0.0;
    let mut norm_x = 0.0;
    let mut norm_y = 0.0;
    let mut count = 0usize;
    for (x, y) in pairs {
        dot += x * y;
        norm_x += x * x;
        norm_y += y * y;
        count += 1;
    }
    if count == 0 {
        return 0.0;
    }
    if norm_x <= 0.0 || norm_y <= 0.0 {
        return 1.0;
    }
    (1.0 - dot / (norm_x.sqrt() * norm_y.sqrt())).clamp(0.0, 2.0)
}

fn earth_mover(pairs: impl Iterator<Item = (f64, f64)>) -> f64 {
    // Mass carried past each coordinate is the running difference.
    let mut carried = 0.0;
    let mut work = 0.0;
    let mut count = 0usize;
    for (x, y) in pairs {
        carried += x - y;
        work += carried.abs();
        count += 1;
    }
    work / count.max(1) as f64
}
