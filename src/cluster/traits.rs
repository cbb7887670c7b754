//! Clustering traits.

use super::result::ClusteringResult;
use crate::error::Result;
use crate::matrix::FeatureMatrix;

/// A seeded clustering algorithm with a fixed target cluster count.
pub trait Clustering {
    /// Cluster `data` using `seed` for initialisation.
    ///
    /// Runs that lose clusters are returned, not rejected; callers decide
    /// validity with [`ClusteringResult::is_valid`].
    fn fit(&self, data: &FeatureMatrix, seed: u64) -> Result<ClusteringResult>;

    /// Target number of clusters.
    fn n_clusters(&self) -> usize;
}
