//! Bounded restarts for a fixed cluster count.
//!
//! Lloyd-style clustering converges to a local optimum and, on real data,
//! sometimes converges to fewer than `k` clusters or to a clustering with a
//! trivially small cluster. [`RestartOrchestrator`] re-runs a [`Clustering`]
//! with fresh seeds and keeps the lowest-WCSS *valid* run.
//!
//! # Attempt Budget
//!
//! ```text
//! for outer in 0..max_outer_attempts:
//!     for inner in 0..max_inner_attempts:
//!         run with a fresh seed
//!         if valid: record, stop inner loop
//!     if valid runs >= min_valid_attempts: stop
//! ```
//!
//! Exhausting the budget without a single valid run is an error
//! ([`Error::ClusterCountUnreachable`]), never a silently degenerate result.

use super::result::ClusteringResult;
use super::traits::Clustering;
use crate::error::{Error, Result};
use crate::matrix::FeatureMatrix;
use rand::prelude::*;

/// Retry budget and validity threshold.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct RestartPolicy {
    /// Runs per outer attempt before giving up on that attempt.
    pub max_inner_attempts: usize,
    /// Upper bound on outer attempts.
    pub max_outer_attempts: usize,
    /// Stop early once this many valid runs were seen.
    pub min_valid_attempts: usize,
    /// Clusters smaller than this make a run invalid.
    pub min_cluster_size: usize,
}

impl Default for RestartPolicy {
    fn default() -> Self {
        Self {
            max_inner_attempts: 5,
            max_outer_attempts: 200,
            min_valid_attempts: 20,
            min_cluster_size: 5,
        }
    }
}

impl RestartPolicy {
    /// Set runs per outer attempt.
    pub fn with_max_inner_attempts(mut self, n: usize) -> Self {
        self.max_inner_attempts = n;
        self
    }

    /// Set the outer attempt bound.
    pub fn with_max_outer_attempts(mut self, n: usize) -> Self {
        self.max_outer_attempts = n;
        self
    }

    /// Set the early-stop valid run count.
    pub fn with_min_valid_attempts(mut self, n: usize) -> Self {
        self.min_valid_attempts = n;
        self
    }

    /// Set the minimum viable cluster size.
    pub fn with_min_cluster_size(mut self, n: usize) -> Self {
        self.min_cluster_size = n;
        self
    }

    fn validate(&self) -> Result<()> {
        if self.max_inner_attempts == 0 {
            return Err(Error::InvalidParameter {
                name: "max_inner_attempts",
                message: "must be > 0",
            });
        }
        if self.max_outer_attempts == 0 {
            return Err(Error::InvalidParameter {
                name: "max_outer_attempts",
                message: "must be > 0",
            });
        }
        if self.min_valid_attempts == 0 {
            return Err(Error::InvalidParameter {
                name: "min_valid_attempts",
                message: "must be > 0",
            });
        }
        Ok(())
    }
}

/// Best run for one `k`, with the attempt counts that produced it.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct RestartOutcome {
    /// Lowest-WCSS valid run.
    pub best: ClusteringResult,
    /// Total clusterer invocations.
    pub attempts: usize,
    /// Invocations that produced a valid run.
    pub valid_attempts: usize,
}

/// Runs a clusterer repeatedly and keeps the best valid result.
#[derive(Debug, Clone)]
pub struct RestartOrchestrator<C> {
    clusterer: C,
    policy: RestartPolicy,
    seed: u64,
}

impl<C: Clustering> RestartOrchestrator<C> {
    /// Create an orchestrator with the default policy and seed 0.
    pub fn new(clusterer: C) -> Self {
        Self {
            clusterer,
            policy: RestartPolicy::default(),
            seed: 0,
        }
    }

    /// Set the restart policy.
    pub fn with_policy(mut self, policy: RestartPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Set the seed from which per-run seeds are drawn.
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    /// Run until the policy is satisfied or exhausted.
    pub fn run(&self, data: &FeatureMatrix) -> Result<RestartOutcome> {
        self.policy.validate()?;
        let k = self.clusterer.n_clusters();
        let mut rng = StdRng::seed_from_u64(self.seed);

        let mut best: Option<ClusteringResult> = None;
        let mut attempts = 0;
        let mut valid_attempts = 0;

        for _outer in 0..self.policy.max_outer_attempts {
            for _inner in 0..self.policy.max_inner_attempts {
                let seed: u64 = rng.random();
                let result = self
                    .clusterer
                    .fit(data, seed)?
                    .rescored(self.policy.min_cluster_size);
                attempts += 1;

                if !result.is_valid() {
                    log::trace!(
                        "k={k} seed {seed}: degenerate run ({} clusters, wcss {})",
                        result.actual_clusters(),
                        result.wcss()
                    );
                    continue;
                }

                valid_attempts += 1;
                if best.as_ref().map_or(true, |b| result.wcss() < b.wcss()) {
                    best = Some(result);
                }
                break;
            }
            if valid_attempts >= self.policy.min_valid_attempts {
                break;
            }
        }

        match best {
            Some(best) => {
                log::info!(
                    "k={k}: best wcss {:.4} from {valid_attempts} valid runs of {attempts}",
                    best.wcss()
                );
                Ok(RestartOutcome {
                    best,
                    attempts,
                    valid_attempts,
                })
            }
            None => {
                log::warn!("k={k}: no valid run in {attempts} attempts");
                Err(Error::ClusterCountUnreachable {
                    k,
                    attempts,
                    valid_attempts,
                })
            }
        }
    }
}
