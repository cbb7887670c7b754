//! Clustering outputs.

/// One cluster: a center vector and the rows assigned to it.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Cluster {
    /// Center, same width as the feature matrix. May contain `NaN` where no
    /// member ever had a value.
    pub center: Vec<f32>,
    /// Member row indices, ascending.
    pub members: Vec<usize>,
    /// Sum of member-to-center distances.
    pub inertia: f64,
}

impl Cluster {
    /// Number of members.
    pub fn len(&self) -> usize {
        self.members.len()
    }

    /// True when the cluster has no members.
    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }
}

/// Immutable outcome of one clustering run.
///
/// A result is usable only when it reached exactly `k` clusters with a
/// finite WCSS; see [`ClusteringResult::is_valid`].
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ClusteringResult {
    k: usize,
    clusters: Vec<Cluster>,
    labels: Vec<Option<usize>>,
    wcss: f64,
    iterations: usize,
    converged: bool,
    history: Vec<f64>,
    seed: u64,
}

impl ClusteringResult {
    pub(crate) fn new(
        k: usize,
        clusters: Vec<Cluster>,
        labels: Vec<Option<usize>>,
        iterations: usize,
        converged: bool,
        history: Vec<f64>,
        seed: u64,
    ) -> Self {
        let wcss = wcss(&clusters, 1);
        Self {
            k,
            clusters,
            labels,
            wcss,
            iterations,
            converged,
            history,
            seed,
        }
    }

    /// Re-score with a minimum viable cluster size: any cluster smaller
    /// than `min_cluster_size` makes the WCSS infinite.
    pub fn rescored(mut self, min_cluster_size: usize) -> Self {
        self.wcss = wcss(&self.clusters, min_cluster_size);
        self
    }

    /// Requested cluster count.
    pub fn k(&self) -> usize {
        self.k
    }

    /// Clusters that survived (non-empty).
    pub fn actual_clusters(&self) -> usize {
        self.clusters.len()
    }

    /// Final clusters.
    pub fn clusters(&self) -> &[Cluster] {
        &self.clusters
    }

    /// Per-row label; `None` for rows with no present coordinate.
    pub fn labels(&self) -> &[Option<usize>] {
        &self.labels
    }

    /// Size-normalised within-cluster sum of distances. Lower is better.
    pub fn wcss(&self) -> f64 {
        self.wcss
    }

    /// Iterations performed.
    pub fn iterations(&self) -> usize {
        self.iterations
    }

    /// Whether membership stabilised before the iteration limit.
    pub fn converged(&self) -> bool {
        self.converged
    }

    /// Total inertia after each iteration.
    pub fn history(&self) -> &[f64] {
        &self.history
    }

    /// Seed that produced this run.
    pub fn seed(&self) -> u64 {
        self.seed
    }

    /// `actual_clusters == k` and finite WCSS.
    pub fn is_valid(&self) -> bool {
        self.actual_clusters() == self.k && self.wcss.is_finite()
    }
}

/// Sum of cluster inertias divided by the cluster count; infinite when any
/// cluster has fewer than `min_cluster_size` members.
pub fn wcss(clusters: &[Cluster], min_cluster_size: usize) -> f64 {
    if clusters.is_empty() {
        return f64::INFINITY;
    }
    if clusters.iter().any(|c| c.len() < min_cluster_size) {
        return f64::INFINITY;
    }
    let total: f64 = clusters.iter().map(|c| c.inertia).sum();
    total / clusters.len() as f64
}
