//! Resolving rows that consensus left unlabelled.
//!
//! Each unresolved row adopts the majority label among its already-labelled
//! neighbors, the same vote label propagation uses, but in a fixed order
//! and without ever relabelling a row that consensus resolved.
//!
//! ## Ordering
//!
//! At the start of every pass, pending rows are sorted by the fraction of
//! their neighbors still unlabelled (fewest first, ties by row index). A
//! row labelled early in a pass immediately votes for rows later in the
//! same pass, so labels spread outward from well-resolved regions. A row
//! whose neighbors are all unlabelled is skipped and retried next pass.
//! Passes stop once everything is labelled, a pass makes no progress, or
//! [`RefineConfig::max_passes`] is reached.
//!
//! ## Modes
//!
//! | Mode | Commits when |
//! |------|--------------|
//! | [`RefineMode::Majority`] | any labelled neighbor exists |
//! | [`RefineMode::Threshold`] | the winning label's votes exceed `min_fraction × rows` |
//!
//! Rows that can never be reached from a labelled row (disconnected
//! neighbor graph) stay unlabelled; this is logged, not an error.

mod neighbors;

pub use neighbors::{percentile_neighbors, FeatureView, NeighborGraph};

use crate::consensus::HubAssignment;
use crate::distance::DistanceMetric;
use crate::error::{Error, Result};
use crate::matrix::FeatureMatrix;
use std::collections::BTreeMap;

/// When a neighbor vote is strong enough to commit.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum RefineMode {
    /// Plurality among labelled neighbors; ties go to the lowest label.
    #[default]
    Majority,
    /// Plurality, but only if its vote count exceeds `min_fraction` of all rows.
    Threshold {
        /// Fraction of the total row count the winning votes must exceed.
        min_fraction: f64,
    },
}

/// Settings for [`NeighborRefiner`].
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct RefineConfig {
    /// Fraction of closest rows treated as neighbors.
    pub percentile: f64,
    /// Vote rule.
    pub mode: RefineMode,
    /// Upper bound on passes.
    pub max_passes: usize,
    /// Metric on the primary feature matrix.
    pub metric: DistanceMetric,
    /// Metric on the secondary feature matrix, when one is supplied.
    pub secondary_metric: DistanceMetric,
}

impl Default for RefineConfig {
    fn default() -> Self {
        Self {
            percentile: 0.02,
            mode: RefineMode::Majority,
            max_passes: 50,
            metric: DistanceMetric::SquaredError,
            secondary_metric: DistanceMetric::Correlation,
        }
    }
}

impl RefineConfig {
    /// Set the neighbor percentile.
    pub fn with_percentile(mut self, percentile: f64) -> Self {
        self.percentile = percentile;
        self
    }

    /// Set the vote rule.
    pub fn with_mode(mut self, mode: RefineMode) -> Self {
        self.mode = mode;
        self
    }

    /// Set the pass limit.
    pub fn with_max_passes(mut self, max_passes: usize) -> Self {
        self.max_passes = max_passes;
        self
    }

    /// Set the primary metric.
    pub fn with_metric(mut self, metric: DistanceMetric) -> Self {
        self.metric = metric;
        self
    }

    /// Set the secondary metric.
    pub fn with_secondary_metric(mut self, metric: DistanceMetric) -> Self {
        self.secondary_metric = metric;
        self
    }
}

/// Result of refinement.
#[derive(Debug, Clone, PartialEq)]
pub struct RefineReport {
    /// Assignment after refinement; may still contain unresolved rows.
    pub assignment: HubAssignment,
    /// Passes run.
    pub passes: usize,
    /// Rows labelled by refinement.
    pub refined: usize,
    /// Rows still unlabelled, ascending.
    pub unresolved: Vec<usize>,
}

/// Fills unresolved rows by nearest-neighbor vote.
#[derive(Debug, Clone, Default)]
pub struct NeighborRefiner {
    config: RefineConfig,
}

impl NeighborRefiner {
    /// Refiner with `config`.
    pub fn new(config: RefineConfig) -> Self {
        Self { config }
    }

    /// Current configuration.
    pub fn config(&self) -> &RefineConfig {
        &self.config
    }

    /// Label the unresolved rows of `assignment`.
    ///
    /// `secondary`, when given, must have the same rows as `primary`;
    /// neighbor sets are then intersected across both matrices.
    pub fn refine(
        &self,
        primary: &FeatureMatrix,
        secondary: Option<&FeatureMatrix>,
        mut assignment: HubAssignment,
    ) -> Result<RefineReport> {
        let n = primary.nrows();
        if assignment.len() != n {
            return Err(Error::DimensionMismatch {
                expected: n,
                found: assignment.len(),
            });
        }
        if let RefineMode::Threshold { min_fraction } = self.config.mode {
            if !(0.0..1.0).contains(&min_fraction) {
                return Err(Error::InvalidParameter {
                    name: "min_fraction",
                    message: "must be in [0, 1)",
                });
            }
        }

        let mut pending = assignment.unresolved_rows();
        if pending.is_empty() {
            return Ok(RefineReport {
                assignment,
                passes: 0,
                refined: 0,
                unresolved: pending,
            });
        }

        let graph = NeighborGraph::build(
            FeatureView {
                matrix: primary,
                metric: self.config.metric,
            },
            secondary.map(|matrix| FeatureView {
                matrix,
                metric: self.config.secondary_metric,
            }),
            &pending,
            self.config.percentile,
        )?;
        log::debug!(
            "refining {} rows: {} neighbor links, {} components",
            pending.len(),
            graph.edge_count(),
            graph.components()
        );

        let stranded = graph.stranded(assignment.labels());
        if !stranded.is_empty() {
            log::warn!(
                "{} rows have no neighbor path to a labelled row and cannot be refined",
                stranded.len()
            );
        }

        let mut passes = 0;
        let mut refined = 0;
        while !pending.is_empty() && passes < self.config.max_passes {
            passes += 1;

            let mut order: Vec<(f64, usize)> = pending
                .iter()
                .map(|&i| (unresolved_fraction(&graph, assignment.labels(), i), i))
                .collect();
            order.sort_by(|a, b| a.0.total_cmp(&b.0).then(a.1.cmp(&b.1)));

            let mut waiting = Vec::new();
            for (_, i) in order {
                match self.vote(&graph, assignment.labels(), i, n) {
                    Some(label) => {
                        assignment.set(i, label);
                        refined += 1;
                    }
                    None => waiting.push(i),
                }
            }

            let progressed = waiting.len() < pending.len();
            log::trace!("pass {passes}: {} rows still pending", waiting.len());
            waiting.sort_unstable();
            pending = waiting;
            if !progressed {
                break;
            }
        }

        if pending.is_empty() {
            log::info!("refinement labelled {refined} rows in {passes} passes");
        } else {
            log::warn!(
                "refinement left {} rows unresolved after {passes} passes",
                pending.len()
            );
        }

        Ok(RefineReport {
            assignment,
            passes,
            refined,
            unresolved: pending,
        })
    }

    fn vote(
        &self,
        graph: &NeighborGraph,
        labels: &[Option<usize>],
        row: usize,
        n_rows: usize,
    ) -> Option<usize> {
        let mut votes: BTreeMap<usize, usize> = BTreeMap::new();
        for j in graph.neighbors(row) {
            if let Some(l) = labels[j] {
                *votes.entry(l).or_insert(0) += 1;
            }
        }

        let mut winner: Option<(usize, usize)> = None;
        for (&label, &count) in &votes {
            if winner.map_or(true, |(_, best)| count > best) {
                winner = Some((label, count));
            }
        }
        let (label, count) = winner?;

        match self.config.mode {
            RefineMode::Majority => Some(label),
            RefineMode::Threshold { min_fraction } => {
                (count as f64 > min_fraction * n_rows as f64).then_some(label)
            }
        }
    }
}

fn unresolved_fraction(graph: &NeighborGraph, labels: &[Option<usize>], row: usize) -> f64 {
    let degree = graph.degree(row);
    if degree == 0 {
        return 1.0;
    }
    let open = graph.neighbors(row).filter(|&j| labels[j].is_none()).count();
    open as f64 / degree as f64
}

#[cfg(test)]
mod tests {
    use super::*;

    fn line(n: usize) -> FeatureMatrix {
        FeatureMatrix::from_rows(&(0..n).map(|i| vec![i as f32]).collect::<Vec<_>>()).unwrap()
    }

    fn two_groups() -> (FeatureMatrix, Vec<usize>) {
        let mut rows = Vec::new();
        let mut truth = Vec::new();
        for i in 0..40 {
            let g = i / 20;
            let jitter = (i % 7) as f32 * 0.03;
            rows.push(vec![g as f32 * 10.0 + jitter, jitter, g as f32 * -5.0]);
            truth.push(g);
        }
        (FeatureMatrix::from_rows(&rows).unwrap(), truth)
    }

    #[test]
    fn test_labels_spread_along_a_chain_in_one_pass() {
        let data = line(10);
        let mut labels = vec![None; 10];
        labels[0] = Some(0);
        let refiner = NeighborRefiner::new(RefineConfig::default().with_percentile(0.2));
        let report = refiner.refine(&data, None, labels.into()).unwrap();

        assert!(report.assignment.is_complete());
        assert_eq!(report.passes, 1);
        assert_eq!(report.refined, 9);
        assert!(report.unresolved.is_empty());
    }

    #[test]
    fn test_connected_graph_resolves_everything() {
        let (data, truth) = two_groups();
        let labels: Vec<Option<usize>> = truth
            .iter()
            .enumerate()
            .map(|(i, &g)| if i % 3 == 0 { None } else { Some(g) })
            .collect();
        let refiner = NeighborRefiner::new(RefineConfig::default().with_percentile(0.1));
        let report = refiner.refine(&data, None, labels.into()).unwrap();

        assert_eq!(report.assignment.unresolved_count(), 0);
        for (i, &g) in truth.iter().enumerate() {
            assert_eq!(report.assignment.get(i), Some(g), "row {i}");
        }
    }

    #[test]
    fn test_threshold_mode_holds_back_weak_votes() {
        let data = line(10);
        let mut labels = vec![None; 10];
        labels[0] = Some(0);
        // Needs more than 1.5 votes; row 1 only ever sees one labelled neighbor.
        let refiner = NeighborRefiner::new(
            RefineConfig::default()
                .with_percentile(0.2)
                .with_mode(RefineMode::Threshold { min_fraction: 0.15 }),
        );
        let report = refiner.refine(&data, None, labels.into()).unwrap();
        assert_eq!(report.refined, 0);
        assert_eq!(report.unresolved, (1..10).collect::<Vec<_>>());
    }

    #[test]
    fn test_threshold_mode_commits_strong_votes() {
        let (data, truth) = two_groups();
        let mut labels: Vec<Option<usize>> = truth.iter().map(|&g| Some(g)).collect();
        labels[5] = None;
        let refiner = NeighborRefiner::new(
            RefineConfig::default()
                .with_percentile(0.2)
                .with_mode(RefineMode::Threshold { min_fraction: 0.05 }),
        );
        let report = refiner.refine(&data, None, labels.into()).unwrap();
        assert_eq!(report.assignment.get(5), Some(0));
    }

    #[test]
    fn test_ties_go_to_lowest_label() {
        let data = FeatureMatrix::from_rows(&[vec![-1.0], vec![0.0], vec![1.0]]).unwrap();
        let labels = vec![Some(3), None, Some(1)];
        let refiner = NeighborRefiner::new(RefineConfig::default().with_percentile(0.5));
        let report = refiner.refine(&data, None, labels.into()).unwrap();
        assert_eq!(report.assignment.get(1), Some(1));
    }

    #[test]
    fn test_disconnected_rows_stay_unresolved() {
        let data = FeatureMatrix::from_rows(&[
            vec![0.0],
            vec![0.1],
            vec![50.0],
            vec![50.1],
        ])
        .unwrap();
        let labels = vec![Some(0), None, None, None];
        let refiner = NeighborRefiner::new(RefineConfig::default().with_percentile(0.3));
        let report = refiner.refine(&data, None, labels.into()).unwrap();
        assert_eq!(report.assignment.get(1), Some(0));
        assert_eq!(report.unresolved, vec![2, 3]);
    }

    #[test]
    fn test_secondary_matrix_must_match() {
        let data = line(5);
        let other = line(4);
        let refiner = NeighborRefiner::default();
        let err = refiner
            .refine(&data, Some(&other), vec![Some(0), None, None, None, None].into())
            .unwrap_err();
        assert!(matches!(err, Error::DimensionMismatch { expected: 5, found: 4 }));
    }

    #[test]
    fn test_nothing_to_refine() {
        let data = line(3);
        let report = NeighborRefiner::default()
            .refine(&data, None, vec![Some(0), Some(0), Some(1)].into())
            .unwrap();
        assert_eq!(report.passes, 0);
        assert_eq!(report.refined, 0);
    }
}
