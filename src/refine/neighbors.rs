//! Percentile neighbor sets and the refinement neighbor graph.
//!
//! A row's neighbors are every other row whose distance falls within the
//! lowest `percentile` of its distances to all rows (ties at the cutoff are
//! included). With a second feature matrix, the neighbor set is the
//! intersection of the two; when the intersection is empty the primary set
//! is used alone.
//!
//! The sets are stored as a directed graph: an edge `i → j` means `j` votes
//! on the label of `i`.

use crate::distance::DistanceMetric;
use crate::error::{Error, Result};
use crate::matrix::FeatureMatrix;
use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::visit::{Bfs, Reversed, VisitMap};

#[cfg(feature = "parallel")]
use rayon::prelude::*;

/// A feature matrix paired with the metric used to compare its rows.
#[derive(Debug, Clone, Copy)]
pub struct FeatureView<'a> {
    /// Rows to compare.
    pub matrix: &'a FeatureMatrix,
    /// Distance between rows.
    pub metric: DistanceMetric,
}

/// Nearest rows of `row`: those within the `percentile` lowest distances.
///
/// Rows sharing no present coordinate with `row` are never neighbors.
pub fn percentile_neighbors(view: FeatureView<'_>, row: usize, percentile: f64) -> Vec<usize> {
    let matrix = view.matrix;
    let query = matrix.row(row);
    let candidates: Vec<usize> = (0..matrix.nrows())
        .filter(|&j| j != row && matrix.shares_coordinates(row, j))
        .collect();
    let mut scored: Vec<(f64, usize)> = view
        .metric
        .to_rows(matrix, query, &candidates)
        .into_iter()
        .zip(candidates)
        .collect();
    if scored.is_empty() {
        return Vec::new();
    }

    scored.sort_by(|a, b| a.0.total_cmp(&b.0).then(a.1.cmp(&b.1)));
    let take = ((percentile * scored.len() as f64).ceil() as usize).clamp(1, scored.len());
    let cutoff = scored[take - 1].0;

    let mut neighbors: Vec<usize> = scored
        .into_iter()
        .take_while(|(d, _)| *d <= cutoff)
        .map(|(_, j)| j)
        .collect();
    neighbors.sort_unstable();
    neighbors
}

/// Directed neighbor graph over all rows; only queried rows have out-edges.
#[derive(Debug, Clone)]
pub struct NeighborGraph {
    graph: DiGraph<(), ()>,
}

impl NeighborGraph {
    /// Neighbor sets for `rows`, computed in parallel.
    pub fn build(
        primary: FeatureView<'_>,
        secondary: Option<FeatureView<'_>>,
        rows: &[usize],
        percentile: f64,
    ) -> Result<Self> {
        if !(percentile > 0.0 && percentile <= 1.0) {
            return Err(Error::InvalidParameter {
                name: "percentile",
                message: "must be in (0, 1]",
            });
        }
        let n = primary.matrix.nrows();
        if let Some(s) = secondary {
            if s.matrix.nrows() != n {
                return Err(Error::DimensionMismatch {
                    expected: n,
                    found: s.matrix.nrows(),
                });
            }
        }

        #[cfg(feature = "parallel")]
        let iter = rows.par_iter();
        #[cfg(not(feature = "parallel"))]
        let iter = rows.iter();

        let sets: Vec<(usize, Vec<usize>)> = iter
            .map(|&i| (i, neighbor_set(primary, secondary, i, percentile)))
            .collect();

        let mut graph = DiGraph::with_capacity(n, sets.iter().map(|s| s.1.len()).sum());
        for _ in 0..n {
            graph.add_node(());
        }
        for (i, set) in sets {
            for j in set {
                graph.add_edge(NodeIndex::new(i), NodeIndex::new(j), ());
            }
        }
        Ok(Self { graph })
    }

    /// Neighbors of row `i`.
    pub fn neighbors(&self, i: usize) -> impl Iterator<Item = usize> + '_ {
        self.graph.neighbors(NodeIndex::new(i)).map(|n| n.index())
    }

    /// Number of neighbors of row `i`.
    pub fn degree(&self, i: usize) -> usize {
        self.graph.neighbors(NodeIndex::new(i)).count()
    }

    /// Total neighbor links.
    pub fn edge_count(&self) -> usize {
        self.graph.edge_count()
    }

    /// Unlabelled rows with no chain of neighbors leading to a labelled
    /// row. No number of passes can resolve these.
    pub fn stranded(&self, labels: &[Option<usize>]) -> Vec<usize> {
        let reversed = Reversed(&self.graph);
        let mut seeds = (0..labels.len()).filter(|&i| labels[i].is_some());
        let Some(first) = seeds.next() else {
            return (0..labels.len()).collect();
        };

        let mut bfs = Bfs::new(reversed, NodeIndex::new(first));
        for s in seeds {
            let node = NodeIndex::new(s);
            if bfs.discovered.visit(node) {
                bfs.stack.push_back(node);
            }
        }
        while bfs.next(reversed).is_some() {}

        (0..labels.len())
            .filter(|&i| {
                let node: NodeIndex = NodeIndex::new(i);
                labels[i].is_none() && !bfs.discovered.is_visited(&node)
            })
            .collect()
    }

    /// Weakly connected components.
    pub fn components(&self) -> usize {
        petgraph::algo::connected_components(&self.graph)
    }
}

fn neighbor_set(
    primary: FeatureView<'_>,
    secondary: Option<FeatureView<'_>>,
    row: usize,
    percentile: f64,
) -> Vec<usize> {
    let first = percentile_neighbors(primary, row, percentile);
    let Some(secondary) = secondary else {
        return first;
    };
    let second = percentile_neighbors(secondary, row, percentile);
    let both: Vec<usize> = first
        .iter()
        .copied()
        .filter(|j| second.binary_search(j).is_ok())
        .collect();
    if both.is_empty() {
        log::debug!("row {row}: neighbor sets disjoint across matrices, using primary only");
        first
    } else {
        both
    }
}
