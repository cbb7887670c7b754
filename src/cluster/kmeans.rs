//! Concurrent K-means / K-medians over a feature matrix with missing entries.
//!
//! # The Objective
//!
//! Minimise the within-cluster sum of distances
//!
//! ```text
//! WCSS = Σₖ Σᵢ∈Cₖ d(xᵢ, μₖ)
//! ```
//!
//! where `d` is a missing-tolerant [`DistanceMetric`] and `μₖ` is either the
//! coordinate-wise mean (K-means) or median (K-medians) of the members.
//!
//! # Lloyd's Algorithm, in Rounds
//!
//! 1. Seed `k` centers from distinct rows ([`SeedStrategy`])
//! 2. **Assign**: every row goes to its nearest center (ties: lowest index)
//! 3. **Collect**: each cluster gathers its own members
//! 4. **Update**: each center is recomputed from present member values only
//! 5. Stop when no cluster's membership changed, or at `max_iter`
//!
//! Each step is a round over disjoint partitions of the work. The
//! controlling thread does not start the next round until every partition
//! of the current one has finished, so no row ever sees a half-updated
//! center. Rows are split into `ceil(n / num_threads)` chunks; clusters are
//! owned by one task each, so membership lists are never appended to
//! concurrently.
//!
//! # Missing Data
//!
//! - Rows with no present value get no label and join no cluster.
//! - A center coordinate with no present member value keeps its previous
//!   value (which may itself be missing).
//!
//! # Degenerate Runs
//!
//! A cluster that loses every member is dropped, so a run can finish with
//! fewer than `k` clusters. That is not an error here; see
//! [`RestartOrchestrator`](super::RestartOrchestrator).

use super::result::{Cluster, ClusteringResult};
use super::seed::SeedStrategy;
use super::traits::Clustering;
use crate::distance::DistanceMetric;
use crate::error::{Error, Result};
use crate::matrix::FeatureMatrix;
use ndarray::ArrayView1;
use rand::prelude::*;

#[cfg(feature = "parallel")]
use rayon::prelude::*;
#[cfg(feature = "parallel")]
use std::sync::{Arc, OnceLock};

/// Dedicated worker pool, built on first use and shared by clones.
#[cfg(feature = "parallel")]
type SharedPool = Arc<OnceLock<std::result::Result<rayon::ThreadPool, String>>>;

/// How a center is recomputed from its members.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum CenterRule {
    /// Coordinate-wise mean (K-means).
    #[default]
    Mean,
    /// Coordinate-wise median (K-medians).
    Median,
}

impl CenterRule {
    /// Aggregate the present values of one coordinate. `None` when empty.
    pub fn aggregate(&self, values: &mut [f64]) -> Option<f64> {
        if values.is_empty() {
            return None;
        }
        match self {
            CenterRule::Mean => Some(values.iter().sum::<f64>() / values.len() as f64),
            CenterRule::Median => {
                values.sort_unstable_by(f64::total_cmp);
                let mid = values.len() / 2;
                if values.len() % 2 == 1 {
                    Some(values[mid])
                } else {
                    Some((values[mid - 1] + values[mid]) / 2.0)
                }
            }
        }
    }
}

/// Settings for [`ConcurrentClusterer`].
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ClustererConfig {
    /// Maximum assign/update rounds.
    pub max_iter: usize,
    /// Row-to-center distance.
    pub metric: DistanceMetric,
    /// Center update rule.
    pub center_rule: CenterRule,
    /// Initial center selection.
    pub seed_strategy: SeedStrategy,
    /// Worker count. `None` uses rayon's global pool; `Some(n)` with
    /// `n > 1` builds one dedicated pool per clusterer; `Some(1)` runs
    /// every round on the calling thread.
    pub num_threads: Option<usize>,
}

impl Default for ClustererConfig {
    fn default() -> Self {
        Self {
            max_iter: 100,
            metric: DistanceMetric::SquaredError,
            center_rule: CenterRule::Mean,
            seed_strategy: SeedStrategy::FarthestPoint,
            num_threads: None,
        }
    }
}

impl ClustererConfig {
    /// Set maximum iterations.
    pub fn with_max_iter(mut self, max_iter: usize) -> Self {
        self.max_iter = max_iter;
        self
    }

    /// Set the distance metric.
    pub fn with_metric(mut self, metric: DistanceMetric) -> Self {
        self.metric = metric;
        self
    }

    /// Set the center update rule.
    pub fn with_center_rule(mut self, center_rule: CenterRule) -> Self {
        self.center_rule = center_rule;
        self
    }

    /// Set the seeding strategy.
    pub fn with_seed_strategy(mut self, seed_strategy: SeedStrategy) -> Self {
        self.seed_strategy = seed_strategy;
        self
    }

    /// Set the worker count.
    pub fn with_num_threads(mut self, num_threads: usize) -> Self {
        self.num_threads = Some(num_threads);
        self
    }

    fn workers(&self) -> usize {
        self.num_threads
            .unwrap_or_else(|| std::thread::available_parallelism().map_or(1, |n| n.get()))
            .max(1)
    }
}

/// Parallel K-means / K-medians with round-synchronised workers.
#[derive(Debug, Clone)]
pub struct ConcurrentClusterer {
    k: usize,
    config: ClustererConfig,
    #[cfg(feature = "parallel")]
    pool: SharedPool,
}

impl ConcurrentClusterer {
    /// Create a clusterer targeting `k` clusters with default settings.
    pub fn new(k: usize) -> Self {
        Self {
            k,
            config: ClustererConfig::default(),
            #[cfg(feature = "parallel")]
            pool: SharedPool::default(),
        }
    }

    /// Replace the configuration.
    pub fn with_config(mut self, config: ClustererConfig) -> Self {
        self.config = config;
        #[cfg(feature = "parallel")]
        {
            self.pool = SharedPool::default();
        }
        self
    }

    /// Current configuration.
    pub fn config(&self) -> &ClustererConfig {
        &self.config
    }

    /// Pool for an explicit worker count above one. `None` means the
    /// global rayon pool.
    #[cfg(feature = "parallel")]
    fn pool(&self) -> Result<Option<&rayon::ThreadPool>> {
        let Some(workers) = self.config.num_threads.filter(|&n| n > 1) else {
            return Ok(None);
        };
        self.pool
            .get_or_init(|| {
                log::debug!("building worker pool with {workers} threads");
                rayon::ThreadPoolBuilder::new()
                    .num_threads(workers)
                    .build()
                    .map_err(|e| e.to_string())
            })
            .as_ref()
            .map(Some)
            .map_err(|e| Error::ThreadPool(e.clone()))
    }

    fn run(&self, data: &FeatureMatrix, seed: u64, parallel: bool) -> Result<ClusteringResult> {
        let n = data.nrows();
        let metric = self.config.metric;
        let rule = self.config.center_rule;
        let chunk = n.div_ceil(self.config.workers()).max(1);

        let present: Vec<bool> = (0..n).map(|i| !data.is_row_missing(i)).collect();
        let candidates: Vec<usize> = (0..n).filter(|&i| present[i]).collect();

        let mut rng = StdRng::seed_from_u64(seed);
        let seeds = self
            .config
            .seed_strategy
            .select(data, &candidates, self.k, metric, &mut rng)?;
        let mut centers: Vec<Vec<f32>> = seeds.iter().map(|&i| data.row(i).to_vec()).collect();

        let mut labels: Vec<Option<usize>> = vec![None; n];
        let mut previous: Option<Vec<Vec<usize>>> = None;
        let mut history = Vec::new();
        let mut converged = false;
        let mut iterations = 0;
        let mut members: Vec<Vec<usize>> = Vec::new();
        let mut inertia: Vec<f64> = Vec::new();

        while iterations < self.config.max_iter {
            iterations += 1;

            // Assign
            phase(&mut labels, chunk, parallel, |start, slice| {
                for (offset, label) in slice.iter_mut().enumerate() {
                    let i = start + offset;
                    *label = if present[i] {
                        Some(nearest(data.row(i), &centers, metric))
                    } else {
                        None
                    };
                }
            });

            // Collect
            members = vec![Vec::new(); centers.len()];
            phase(&mut members, 1, parallel, |c, owned| {
                owned[0] = labels
                    .iter()
                    .enumerate()
                    .filter(|(_, l)| **l == Some(c))
                    .map(|(i, _)| i)
                    .collect();
            });

            if members.iter().any(Vec::is_empty) {
                let before = centers.len();
                drop_empty(&mut centers, &mut members, &mut labels);
                log::debug!(
                    "dropped {} empty clusters at iteration {}",
                    before - centers.len(),
                    iterations
                );
            }

            converged = previous.as_ref() == Some(&members);

            // Update
            phase(&mut centers, 1, parallel, |c, owned| {
                recompute_center(data, &members[c], rule, &mut owned[0]);
            });

            inertia = vec![0.0; centers.len()];
            phase(&mut inertia, 1, parallel, |c, owned| {
                let center = ArrayView1::from(&centers[c][..]);
                owned[0] = members[c]
                    .iter()
                    .map(|&i| metric.distance(data.row(i), center))
                    .sum();
            });

            let total: f64 = inertia.iter().sum();
            log::trace!("iteration {iterations}: {} clusters, inertia {total}", centers.len());
            history.push(total);

            if converged {
                break;
            }
            previous = Some(members.clone());
        }

        let clusters: Vec<Cluster> = centers
            .into_iter()
            .zip(members)
            .zip(inertia)
            .map(|((center, members), inertia)| Cluster {
                center,
                members,
                inertia,
            })
            .collect();

        let result =
            ClusteringResult::new(self.k, clusters, labels, iterations, converged, history, seed);
        log::debug!(
            "seed {seed}: {}/{} clusters after {} iterations (converged: {}), wcss {:.4}",
            result.actual_clusters(),
            self.k,
            result.iterations(),
            result.converged(),
            result.wcss()
        );
        Ok(result)
    }
}

impl Clustering for ConcurrentClusterer {
    fn fit(&self, data: &FeatureMatrix, seed: u64) -> Result<ClusteringResult> {
        if self.k == 0 {
            return Err(Error::InvalidParameter {
                name: "k",
                message: "must be > 0",
            });
        }
        if self.config.max_iter == 0 {
            return Err(Error::InvalidParameter {
                name: "max_iter",
                message: "must be > 0",
            });
        }

        #[cfg(feature = "parallel")]
        {
            if self.config.workers() > 1 {
                return match self.pool()? {
                    Some(pool) => pool.install(|| self.run(data, seed, true)),
                    None => self.run(data, seed, true),
                };
            }
        }

        self.run(data, seed, false)
    }

    fn n_clusters(&self) -> usize {
        self.k
    }
}

/// One synchronised round: `work(start, chunk)` over disjoint chunks of
/// `items`. Returns only after every chunk is done.
fn phase<T, F>(items: &mut [T], chunk: usize, parallel: bool, work: F)
where
    T: Send,
    F: Fn(usize, &mut [T]) + Send + Sync,
{
    #[cfg(feature = "parallel")]
    {
        if parallel {
            items
                .par_chunks_mut(chunk)
                .enumerate()
                .for_each(|(c, slice)| work(c * chunk, slice));
            return;
        }
    }
    #[cfg(not(feature = "parallel"))]
    let _ = parallel;

    items
        .chunks_mut(chunk)
        .enumerate()
        .for_each(|(c, slice)| work(c * chunk, slice));
}

fn nearest(row: ArrayView1<'_, f32>, centers: &[Vec<f32>], metric: DistanceMetric) -> usize {
    let mut best = 0;
    let mut best_dist = f64::INFINITY;
    for (c, center) in centers.iter().enumerate() {
        let d = metric.distance(row, ArrayView1::from(&center[..]));
        if d < best_dist {
            best_dist = d;
            best = c;
        }
    }
    best
}

fn recompute_center(data: &FeatureMatrix, members: &[usize], rule: CenterRule, center: &mut [f32]) {
    let mut column = Vec::with_capacity(members.len());
    for (j, value) in center.iter_mut().enumerate() {
        column.clear();
        column.extend(
            members
                .iter()
                .map(|&i| data.get(i, j))
                .filter(|v| !v.is_nan())
                .map(f64::from),
        );
        if let Some(v) = rule.aggregate(&mut column) {
            *value = v as f32;
        }
    }
}

/// Remove clusters without members and renumber labels to match.
fn drop_empty(
    centers: &mut Vec<Vec<f32>>,
    members: &mut Vec<Vec<usize>>,
    labels: &mut [Option<usize>],
) {
    let mut remap = vec![None; members.len()];
    let mut next = 0;
    for (c, m) in members.iter().enumerate() {
        if !m.is_empty() {
            remap[c] = Some(next);
            next += 1;
        }
    }
    let mut c = 0;
    centers.retain(|_| {
        let keep = remap[c].is_some();
        c += 1;
        keep
    });
    members.retain(|m| !m.is_empty());
    for label in labels.iter_mut() {
        *label = label.and_then(|l| remap[l]);
    }
}
