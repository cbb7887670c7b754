//! # subcomp
//!
//! Subcompartment calling for genomic bins: cluster a bins × features
//! matrix with missing values, reconcile independent runs into consensus
//! hubs, then label the rows consensus could not place from their nearest
//! neighbors.
//!
//! | Stage | Entry point |
//! |-------|-------------|
//! | Distances on partially missing rows | [`DistanceMetric`] |
//! | K-means / K-medians with barrier-synchronized rounds | [`ConcurrentClusterer`] |
//! | Seeded restarts until `k` clusters are reached | [`RestartOrchestrator`] |
//! | Greedy tensor matching across runs | [`ConsensusResolver`] |
//! | Neighbor vote for unresolved rows | [`NeighborRefiner`] |
//! | All of the above | [`SubcompartmentPipeline`] |
//!
//! Missing values are `NaN`; every computation restricts itself to
//! coordinates present on both sides. Rows with no present value, and rows
//! consensus leaves unresolved, carry `None` labels
//! ([`HubAssignment::to_signed`] exports them as `-1`).
//!
//! The `parallel` feature (default) runs assignment, update and neighbor
//! search on rayon; without it the same code runs sequentially with
//! identical results.

pub mod cluster;
pub mod consensus;
pub mod distance;
/// Error types used across `subcomp`.
pub mod error;
pub mod matrix;
pub mod metrics;
pub mod pipeline;
pub mod refine;

#[cfg(test)]
mod pipeline_tests;

pub use cluster::{
    CenterRule, ClustererConfig, Clustering, ClusteringResult, ConcurrentClusterer,
    RestartOrchestrator, RestartOutcome, RestartPolicy,
};
pub use consensus::{Consensus, ConsensusResolver, HubAssignment};
pub use distance::DistanceMetric;
pub use error::{Error, Result};
pub use matrix::FeatureMatrix;
pub use metrics::{ari, nmi};
pub use pipeline::{PipelineConfig, PipelineOutput, SubcompartmentPipeline};
pub use refine::{NeighborRefiner, RefineConfig, RefineMode, RefineReport};
