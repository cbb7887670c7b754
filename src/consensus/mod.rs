//! Reconciling independent clustering runs.
//!
//! Two runs of the same clusterer (different seeds) or of different
//! clusterers (K-means vs K-medians) agree on the broad structure but not
//! on label numbering, and disagree at the margins. The working assumption:
//! the "true" clusters are the `d`-way intersections of run labels with the
//! most rows.
//!
//! ## Greedy Tensor Matching
//!
//! 1. Count rows per label tuple in a [`ConsensusTensor`]
//! 2. Take the largest cell as hub `q`
//! 3. Zero every cell sharing a label with it in *any* run, so no run's
//!    label is matched twice
//! 4. Repeat until `k` hubs are found
//!
//! Rows whose tuple is one of the `k` extracted cells get that hub; every
//! other row (including rows unlabelled by any run) stays unresolved for
//! [`NeighborRefiner`](crate::refine::NeighborRefiner).
//!
//! This is a greedy matching, not an optimal one: a globally better
//! assignment of tuples to hubs may exist. Running out of non-empty cells
//! before `k` hubs is a [`Error::ConsensusFailed`].

mod tensor;

pub use tensor::ConsensusTensor;

use crate::cluster::ClusteringResult;
use crate::error::{Error, Result};

/// Final per-row cluster ids; `None` marks a row still awaiting refinement.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct HubAssignment {
    labels: Vec<Option<usize>>,
}

impl HubAssignment {
    /// Wrap per-row labels.
    pub fn new(labels: Vec<Option<usize>>) -> Self {
        Self { labels }
    }

    /// Number of rows.
    pub fn len(&self) -> usize {
        self.labels.len()
    }

    /// True when there are no rows.
    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    /// Label of row `i`.
    pub fn get(&self, i: usize) -> Option<usize> {
        self.labels[i]
    }

    /// All labels.
    pub fn labels(&self) -> &[Option<usize>] {
        &self.labels
    }

    /// Rows without a label, ascending.
    pub fn unresolved_rows(&self) -> Vec<usize> {
        (0..self.labels.len())
            .filter(|&i| self.labels[i].is_none())
            .collect()
    }

    /// Number of rows without a label.
    pub fn unresolved_count(&self) -> usize {
        self.labels.iter().filter(|l| l.is_none()).count()
    }

    /// True when every row has a label.
    pub fn is_complete(&self) -> bool {
        self.labels.iter().all(Option::is_some)
    }

    /// Number of distinct labels in use.
    pub fn n_hubs(&self) -> usize {
        let mut seen: Vec<usize> = self.labels.iter().flatten().copied().collect();
        seen.sort_unstable();
        seen.dedup();
        seen.len()
    }

    /// Labels as signed integers with `-1` for unresolved rows.
    pub fn to_signed(&self) -> Vec<i64> {
        self.labels
            .iter()
            .map(|l| l.map_or(-1, |v| v as i64))
            .collect()
    }

    pub(crate) fn set(&mut self, i: usize, label: usize) {
        self.labels[i] = Some(label);
    }
}

impl From<Vec<Option<usize>>> for HubAssignment {
    fn from(labels: Vec<Option<usize>>) -> Self {
        Self::new(labels)
    }
}

/// Outcome of consensus resolution.
#[derive(Debug, Clone, PartialEq)]
pub struct Consensus {
    /// Per-row hub ids.
    pub assignment: HubAssignment,
    /// Per hub, the label tuple (one label per run) it was extracted from.
    pub tuples: Vec<Vec<usize>>,
    /// Per hub, the number of rows sharing its tuple.
    pub sizes: Vec<u32>,
}

/// Combines `d` clustering runs of the same rows into `k` hubs.
#[derive(Debug, Clone)]
pub struct ConsensusResolver {
    k: usize,
}

impl ConsensusResolver {
    /// Resolver producing `k` hubs.
    pub fn new(k: usize) -> Self {
        Self { k }
    }

    /// Target hub count.
    pub fn k(&self) -> usize {
        self.k
    }

    /// Greedily match label tuples across `runs`.
    pub fn resolve(&self, runs: &[ClusteringResult]) -> Result<Consensus> {
        let mut tensor = ConsensusTensor::build(runs, self.k)?;

        let mut tuples: Vec<Vec<usize>> = Vec::with_capacity(self.k);
        let mut sizes = Vec::with_capacity(self.k);
        for q in 0..self.k {
            let Some((tuple, count)) = tensor.max_cell() else {
                log::warn!("consensus for k={}: tensor exhausted after {q} hubs", self.k);
                return Err(Error::ConsensusFailed {
                    k: self.k,
                    resolved: q,
                });
            };
            log::trace!("hub {q}: tuple {tuple:?} with {count} rows");
            tensor.clear_coordinates(&tuple);
            tuples.push(tuple);
            sizes.push(count);
        }

        let labels: Vec<Option<usize>> = (0..tensor.rows())
            .map(|i| {
                let tuple = tensor.tuple(i)?;
                tuples.iter().position(|t| t.as_slice() == tuple)
            })
            .collect();
        let assignment = HubAssignment::new(labels);

        log::info!(
            "consensus for k={} over {} runs: {} of {} rows resolved",
            self.k,
            tensor.runs(),
            assignment.len() - assignment.unresolved_count(),
            assignment.len()
        );

        Ok(Consensus {
            assignment,
            tuples,
            sizes,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cluster::Cluster;

    fn run(k: usize, labels: Vec<Option<usize>>) -> ClusteringResult {
        let clusters = (0..k)
            .map(|c| Cluster {
                center: vec![0.0],
                members: (0..labels.len())
                    .filter(|&i| labels[i] == Some(c))
                    .collect(),
                inertia: 0.0,
            })
            .collect();
        ClusteringResult::new(k, clusters, labels, 1, true, vec![], 0)
    }

    fn some(labels: &[usize]) -> Vec<Option<usize>> {
        labels.iter().map(|&l| Some(l)).collect()
    }

    #[test]
    fn test_agreeing_runs_resolve_fully() {
        let labels = some(&[0, 0, 0, 1, 1, 2, 2, 2, 2]);
        let runs = vec![run(3, labels.clone()), run(3, labels.clone())];
        let consensus = ConsensusResolver::new(3).resolve(&runs).unwrap();

        assert!(consensus.assignment.is_complete());
        for t in &consensus.tuples {
            assert_eq!(t[0], t[1]);
        }
        // Hubs are numbered by size; map them back through the tuples.
        for (i, l) in labels.iter().enumerate() {
            let hub = consensus.assignment.get(i).unwrap();
            assert_eq!(Some(consensus.tuples[hub][0]), *l);
        }
        assert_eq!(consensus.sizes, vec![4, 3, 2]);
    }

    #[test]
    fn test_permuted_labels_match() {
        let a = run(2, some(&[0, 0, 0, 1, 1, 1]));
        let b = run(2, some(&[1, 1, 1, 0, 0, 0]));
        let consensus = ConsensusResolver::new(2).resolve(&[a, b]).unwrap();
        assert_eq!(consensus.tuples, vec![vec![0, 1], vec![1, 0]]);
        assert_eq!(
            consensus.assignment.to_signed(),
            vec![0, 0, 0, 1, 1, 1]
        );
    }

    #[test]
    fn test_disagreeing_rows_stay_unresolved() {
        let a = run(2, vec![Some(0), Some(0), Some(0), Some(1), Some(1), Some(1), None]);
        let b = run(2, vec![Some(0), Some(0), Some(1), Some(1), Some(1), Some(1), Some(0)]);
        let consensus = ConsensusResolver::new(2).resolve(&[a, b]).unwrap();
        let signed = consensus.assignment.to_signed();
        assert_eq!(signed[2], -1);
        assert_eq!(signed[6], -1);
        assert_eq!(consensus.assignment.unresolved_rows(), vec![2, 6]);
        assert_eq!(consensus.assignment.n_hubs(), 2);
    }

    #[test]
    fn test_extracted_hubs_never_share_a_label() {
        let a = run(3, some(&[0, 0, 1, 1, 2, 2, 0, 1, 2, 0]));
        let b = run(3, some(&[2, 2, 0, 0, 1, 1, 1, 2, 0, 2]));
        let c = run(3, some(&[1, 1, 1, 2, 0, 0, 2, 0, 1, 1]));
        let consensus = ConsensusResolver::new(3).resolve(&[a, b, c]).unwrap();
        for dim in 0..3 {
            let mut used: Vec<usize> = consensus.tuples.iter().map(|t| t[dim]).collect();
            used.sort_unstable();
            used.dedup();
            assert_eq!(used.len(), consensus.tuples.len());
        }
    }

    #[test]
    fn test_consensus_fails_when_cells_run_out() {
        // Every row agrees on label 0 in run a, so only one hub can be extracted.
        let a = run(2, some(&[0, 0, 0, 0]));
        let b = run(2, some(&[0, 0, 1, 1]));
        let err = ConsensusResolver::new(2).resolve(&[a, b]).unwrap_err();
        assert_eq!(err, Error::ConsensusFailed { k: 2, resolved: 1 });
    }

    #[test]
    fn test_hub_assignment_helpers() {
        let hub = HubAssignment::from(vec![Some(1), None, Some(0), Some(1)]);
        assert_eq!(hub.len(), 4);
        assert_eq!(hub.unresolved_count(), 1);
        assert_eq!(hub.to_signed(), vec![1, -1, 0, 1]);
        assert_eq!(hub.n_hubs(), 2);
        assert!(!hub.is_complete());
    }
}
