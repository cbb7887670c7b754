use thiserror::Error;

/// Result alias for `subcomp`.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors returned by clustering, consensus and refinement.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum Error {
    /// Input was empty.
    #[error("empty input provided")]
    EmptyInput,

    /// Row or matrix dimension mismatch.
    #[error("dimension mismatch: expected {expected}, found {found}")]
    DimensionMismatch {
        /// Expected dimension.
        expected: usize,
        /// Found dimension.
        found: usize,
    },

    /// Invalid number of clusters requested.
    #[error("cannot create {requested} clusters from {n_items} usable rows")]
    InvalidClusterCount {
        /// Requested count.
        requested: usize,
        /// Number of rows that could seed a cluster.
        n_items: usize,
    },

    /// Invalid parameter value.
    #[error("invalid parameter '{name}': {message}")]
    InvalidParameter {
        /// Parameter name.
        name: &'static str,
        /// Error message.
        message: &'static str,
    },

    /// Every restart converged to fewer than `k` clusters or to an invalid score.
    #[error(
        "k={k} is unreachable for this data: {valid_attempts} valid runs out of {attempts} attempts"
    )]
    ClusterCountUnreachable {
        /// Requested cluster count.
        k: usize,
        /// Total clusterer invocations.
        attempts: usize,
        /// Runs that reached exactly `k` clusters with a finite score.
        valid_attempts: usize,
    },

    /// Greedy tensor matching ran out of non-overlapping cells.
    #[error("consensus failed for k={k}: only {resolved} non-overlapping label tuples found")]
    ConsensusFailed {
        /// Requested cluster count.
        k: usize,
        /// Slots filled before the tensor was exhausted.
        resolved: usize,
    },

    /// `k^runs` cells do not fit in memory.
    #[error("consensus tensor for k={k} over {runs} runs is too large")]
    TensorTooLarge {
        /// Cluster count per dimension.
        k: usize,
        /// Number of dimensions.
        runs: usize,
    },

    /// Worker pool could not be created.
    #[error("thread pool: {0}")]
    ThreadPool(String),
}
