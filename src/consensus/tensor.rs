//! Co-occurrence tensor over `d` clustering runs.
//!
//! Cell `(l₀, l₁, …, l_{d-1})` counts the rows that run 0 labelled `l₀`,
//! run 1 labelled `l₁`, and so on. Rows unlabelled in any run are left out.
//! With `k` labels per run the tensor has `kᵈ` cells, so the number of runs
//! that can be reconciled at once is small.

use crate::cluster::ClusteringResult;
use crate::error::{Error, Result};
use ndarray::{ArrayD, Dimension, IxDyn};

/// Upper bound on tensor cells (64 MiB of `u32` counts).
const MAX_CELLS: usize = 1 << 24;

/// Dense `k × k × … × k` count tensor built from `d` runs.
#[derive(Debug, Clone, PartialEq)]
pub struct ConsensusTensor {
    k: usize,
    counts: ArrayD<u32>,
    tuples: Vec<Option<Vec<usize>>>,
}

impl ConsensusTensor {
    /// Count label tuples across `runs`. Every run must cover the same rows
    /// and use labels below `k`.
    pub fn build(runs: &[ClusteringResult], k: usize) -> Result<Self> {
        if runs.is_empty() {
            return Err(Error::EmptyInput);
        }
        if k == 0 {
            return Err(Error::InvalidParameter {
                name: "k",
                message: "must be > 0",
            });
        }
        let d = runs.len();
        let cells = u32::try_from(d)
            .ok()
            .and_then(|d| k.checked_pow(d))
            .filter(|&c| c <= MAX_CELLS)
            .ok_or(Error::TensorTooLarge { k, runs: d })?;

        let n = runs[0].labels().len();
        for run in runs {
            if run.labels().len() != n {
                return Err(Error::DimensionMismatch {
                    expected: n,
                    found: run.labels().len(),
                });
            }
            if run.labels().iter().flatten().any(|&l| l >= k) {
                return Err(Error::InvalidParameter {
                    name: "runs",
                    message: "label exceeds consensus k",
                });
            }
        }

        let mut counts = ArrayD::<u32>::zeros(IxDyn(&vec![k; d]));
        let tuples: Vec<Option<Vec<usize>>> = (0..n)
            .map(|i| runs.iter().map(|r| r.labels()[i]).collect())
            .collect();
        for tuple in tuples.iter().flatten() {
            counts[tuple.as_slice()] += 1;
        }

        log::debug!(
            "consensus tensor: {d} runs, {cells} cells, {} rows counted, {} non-empty cells",
            tuples.iter().flatten().count(),
            counts.iter().filter(|&&c| c > 0).count()
        );

        Ok(Self { k, counts, tuples })
    }

    /// Labels per run.
    pub fn k(&self) -> usize {
        self.k
    }

    /// Number of runs (tensor dimensions).
    pub fn runs(&self) -> usize {
        self.counts.ndim()
    }

    /// Number of rows the tensor was built over.
    pub fn rows(&self) -> usize {
        self.tuples.len()
    }

    /// Count at a label tuple.
    pub fn count(&self, tuple: &[usize]) -> u32 {
        self.counts[tuple]
    }

    /// Label tuple of row `i`, or `None` when some run left it unlabelled.
    pub fn tuple(&self, i: usize) -> Option<&[usize]> {
        self.tuples[i].as_deref()
    }

    /// Cells with a positive count.
    pub fn nonzero_cells(&self) -> usize {
        self.counts.iter().filter(|&&c| c > 0).count()
    }

    /// True when every counted row sits on a cell `(l, l, …, l)`.
    pub fn is_diagonal(&self) -> bool {
        self.counts.indexed_iter().all(|(idx, &c)| {
            let idx = idx.slice();
            c == 0 || idx.iter().all(|&l| l == idx[0])
        })
    }

    /// Largest cell and its count. Ties go to the first cell in row-major
    /// order. `None` when every cell is zero.
    pub fn max_cell(&self) -> Option<(Vec<usize>, u32)> {
        let mut best: Option<(Vec<usize>, u32)> = None;
        for (idx, &c) in self.counts.indexed_iter() {
            if c > 0 && best.as_ref().map_or(true, |(_, b)| c > *b) {
                best = Some((idx.slice().to_vec(), c));
            }
        }
        best
    }

    /// Zero every cell that shares a coordinate with `tuple` along any
    /// dimension.
    pub fn clear_coordinates(&mut self, tuple: &[usize]) {
        for (idx, c) in self.counts.indexed_iter_mut() {
            if idx.slice().iter().zip(tuple).any(|(a, b)| a == b) {
                *c = 0;
            }
        }
    }
}
