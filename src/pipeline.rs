//! End-to-end subcompartment calling.
//!
//! 1. Cluster the primary matrix `n_runs` times per center rule, each run
//!    under its own [`RestartOrchestrator`] seed
//! 2. Reconcile the runs with [`ConsensusResolver`]; if greedy matching
//!    runs out of cells, fall back to the lowest-WCSS run
//! 3. Fill unresolved rows with [`NeighborRefiner`]
//!
//! ```rust
//! use subcomp::pipeline::{PipelineConfig, SubcompartmentPipeline};
//! use subcomp::cluster::RestartPolicy;
//! use subcomp::FeatureMatrix;
//!
//! let rows: Vec<Vec<f32>> = (0..30)
//!     .map(|i| {
//!         let base = (i % 2) as f32 * 8.0;
//!         vec![base + (i % 5) as f32 * 0.05, base, -base]
//!     })
//!     .collect();
//! let data = FeatureMatrix::from_rows(&rows).unwrap();
//!
//! let config = PipelineConfig::default()
//!     .with_restart(RestartPolicy::default().with_min_valid_attempts(3));
//! let output = SubcompartmentPipeline::new(config).run(&data, None, 2).unwrap();
//! assert!(output.assignment().is_complete());
//! ```

use crate::cluster::{
    CenterRule, ClustererConfig, Clustering, ClusteringResult, ConcurrentClusterer,
    RestartOrchestrator, RestartOutcome, RestartPolicy,
};
use crate::consensus::{Consensus, ConsensusResolver, HubAssignment};
use crate::error::{Error, Result};
use crate::matrix::FeatureMatrix;
use crate::metrics::{ari, nmi};
use crate::refine::{NeighborRefiner, RefineConfig, RefineReport};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::collections::BTreeMap;

/// Settings for [`SubcompartmentPipeline`].
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct PipelineConfig {
    /// Per-run clusterer settings; `center_rule` is overridden by `rules`.
    pub clusterer: ClustererConfig,
    /// Restart policy for every run.
    pub restart: RestartPolicy,
    /// Refinement of unresolved rows.
    pub refine: RefineConfig,
    /// Independent runs per center rule.
    pub n_runs: usize,
    /// Center rules to combine.
    pub rules: Vec<CenterRule>,
    /// Base seed; run seeds are drawn from it.
    pub seed: u64,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            clusterer: ClustererConfig::default(),
            restart: RestartPolicy::default(),
            refine: RefineConfig::default(),
            n_runs: 2,
            rules: vec![CenterRule::Mean],
            seed: 0,
        }
    }
}

impl PipelineConfig {
    /// Set the clusterer settings.
    pub fn with_clusterer(mut self, clusterer: ClustererConfig) -> Self {
        self.clusterer = clusterer;
        self
    }

    /// Set the restart policy.
    pub fn with_restart(mut self, restart: RestartPolicy) -> Self {
        self.restart = restart;
        self
    }

    /// Set the refinement settings.
    pub fn with_refine(mut self, refine: RefineConfig) -> Self {
        self.refine = refine;
        self
    }

    /// Set runs per rule.
    pub fn with_n_runs(mut self, n_runs: usize) -> Self {
        self.n_runs = n_runs;
        self
    }

    /// Set the center rules.
    pub fn with_rules(mut self, rules: Vec<CenterRule>) -> Self {
        self.rules = rules;
        self
    }

    /// Set the base seed.
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    fn validate(&self) -> Result<()> {
        if self.n_runs == 0 {
            return Err(Error::InvalidParameter {
                name: "n_runs",
                message: "must be > 0",
            });
        }
        if self.rules.is_empty() {
            return Err(Error::InvalidParameter {
                name: "rules",
                message: "at least one center rule is required",
            });
        }
        Ok(())
    }
}

/// How well one run agrees with the final consensus.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RunAgreement {
    /// Adjusted Rand Index.
    pub ari: f64,
    /// Normalized Mutual Information.
    pub nmi: f64,
}

/// Everything one pipeline invocation produced.
#[derive(Debug, Clone)]
pub struct PipelineOutput {
    /// Best result of every orchestrated run, in rule-major order.
    pub runs: Vec<ClusteringResult>,
    /// Consensus, or `None` when the fallback run was used.
    pub consensus: Option<Consensus>,
    /// Index into `runs` of the fallback, when consensus failed.
    pub fallback: Option<usize>,
    /// Agreement of each run with the pre-refinement assignment.
    pub agreement: Vec<RunAgreement>,
    /// Refinement result, holding the final assignment.
    pub refinement: RefineReport,
}

impl PipelineOutput {
    /// Final per-row subcompartments.
    pub fn assignment(&self) -> &HubAssignment {
        &self.refinement.assignment
    }
}

/// Clustering, consensus and refinement for one feature set.
#[derive(Debug, Clone, Default)]
pub struct SubcompartmentPipeline {
    config: PipelineConfig,
}

impl SubcompartmentPipeline {
    /// Pipeline with `config`.
    pub fn new(config: PipelineConfig) -> Self {
        Self { config }
    }

    /// Current configuration.
    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Call `k` subcompartments on `primary`, with `secondary` (same rows)
    /// narrowing the neighbor sets used to refine unresolved rows.
    pub fn run(
        &self,
        primary: &FeatureMatrix,
        secondary: Option<&FeatureMatrix>,
        k: usize,
    ) -> Result<PipelineOutput> {
        self.config.validate()?;
        if let Some(s) = secondary {
            if s.nrows() != primary.nrows() {
                return Err(Error::DimensionMismatch {
                    expected: primary.nrows(),
                    found: s.nrows(),
                });
            }
        }

        let mut rng = StdRng::seed_from_u64(self.config.seed);
        let mut runs = Vec::with_capacity(self.config.rules.len() * self.config.n_runs);
        for &rule in &self.config.rules {
            let clusterer = ConcurrentClusterer::new(k)
                .with_config(self.config.clusterer.clone().with_center_rule(rule));
            for _ in 0..self.config.n_runs {
                let outcome = self.orchestrate(clusterer.clone(), rng.random(), primary)?;
                runs.push(outcome.best);
            }
        }

        let Reconciled {
            assignment,
            consensus,
            fallback,
        } = reconcile(&runs, k)?;

        let agreement: Vec<RunAgreement> = runs
            .iter()
            .map(|r| RunAgreement {
                ari: ari(r.labels(), assignment.labels()),
                nmi: nmi(r.labels(), assignment.labels()),
            })
            .collect();
        for (i, a) in agreement.iter().enumerate() {
            log::debug!("run {i}: ari {:.4}, nmi {:.4} against consensus", a.ari, a.nmi);
        }

        let refinement =
            NeighborRefiner::new(self.config.refine.clone()).refine(primary, secondary, assignment)?;

        Ok(PipelineOutput {
            runs,
            consensus,
            fallback,
            agreement,
            refinement,
        })
    }

    /// Best restart outcome for each `k`, using the first center rule.
    /// Unreachable values of `k` are logged and left out.
    pub fn sweep(
        &self,
        data: &FeatureMatrix,
        ks: impl IntoIterator<Item = usize>,
    ) -> Result<BTreeMap<usize, RestartOutcome>> {
        self.config.validate()?;
        let rule = self.config.rules[0];
        let mut rng = StdRng::seed_from_u64(self.config.seed);
        let mut out = BTreeMap::new();
        for k in ks {
            let clusterer = ConcurrentClusterer::new(k)
                .with_config(self.config.clusterer.clone().with_center_rule(rule));
            match self.orchestrate(clusterer, rng.random(), data) {
                Ok(outcome) => {
                    out.insert(k, outcome);
                }
                Err(e @ Error::ClusterCountUnreachable { .. }) => {
                    log::warn!("skipping {e}");
                }
                Err(e) => return Err(e),
            }
        }
        Ok(out)
    }

    fn orchestrate<C: Clustering>(
        &self,
        clusterer: C,
        seed: u64,
        data: &FeatureMatrix,
    ) -> Result<RestartOutcome> {
        RestartOrchestrator::new(clusterer)
            .with_policy(self.config.restart.clone())
            .with_seed(seed)
            .run(data)
    }
}

struct Reconciled {
    assignment: HubAssignment,
    consensus: Option<Consensus>,
    fallback: Option<usize>,
}

/// Consensus over `runs`, or the lowest-WCSS run when matching runs out
/// of cells. Any other consensus error is returned.
fn reconcile(runs: &[ClusteringResult], k: usize) -> Result<Reconciled> {
    match ConsensusResolver::new(k).resolve(runs) {
        Ok(consensus) => Ok(Reconciled {
            assignment: consensus.assignment.clone(),
            consensus: Some(consensus),
            fallback: None,
        }),
        Err(Error::ConsensusFailed { resolved, .. }) => {
            let best = lowest_wcss(runs);
            log::warn!(
                "consensus found {resolved} of {k} hubs; using run {best} (wcss {:.4}) instead",
                runs[best].wcss()
            );
            Ok(Reconciled {
                assignment: HubAssignment::new(runs[best].labels().to_vec()),
                consensus: None,
                fallback: Some(best),
            })
        }
        Err(e) => Err(e),
    }
}

fn lowest_wcss(runs: &[ClusteringResult]) -> usize {
    let mut best = 0;
    for (i, r) in runs.iter().enumerate() {
        if r.wcss() < runs[best].wcss() {
            best = i;
        }
    }
    best
}
