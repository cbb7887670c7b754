//! Clustering genomic bins into subcompartments.
//!
//! ## K-means and K-medians
//!
//! Both assign each row to its nearest center and move each center to the
//! middle of its members. They differ only in what "middle" means:
//!
//! | Rule | Center | Pairs well with |
//! |------|--------|-----------------|
//! | [`CenterRule::Mean`] | coordinate-wise mean | [`DistanceMetric::SquaredError`](crate::DistanceMetric::SquaredError) |
//! | [`CenterRule::Median`] | coordinate-wise median | [`DistanceMetric::MeanAbsolute`](crate::DistanceMetric::MeanAbsolute) |
//!
//! Contact-derived features are noisy and partly missing, so every step
//! works on present coordinates only.
//!
//! ## Restarts
//!
//! A single Lloyd run is only a local optimum and can lose clusters. The
//! [`RestartOrchestrator`] runs many seeds and keeps the best valid run,
//! where valid means exactly `k` clusters, each at least
//! [`RestartPolicy::min_cluster_size`] rows.
//!
//! ## Usage
//!
//! ```rust
//! use subcomp::cluster::{Clustering, ConcurrentClusterer, RestartOrchestrator, RestartPolicy};
//! use subcomp::FeatureMatrix;
//!
//! let rows: Vec<Vec<f32>> = (0..20)
//!     .map(|i| if i < 10 { vec![0.0, i as f32 * 0.01] } else { vec![5.0, 5.0] })
//!     .collect();
//! let data = FeatureMatrix::from_rows(&rows).unwrap();
//!
//! let single = ConcurrentClusterer::new(2).fit(&data, 42).unwrap();
//! assert!(single.is_valid());
//!
//! let outcome = RestartOrchestrator::new(ConcurrentClusterer::new(2))
//!     .with_policy(RestartPolicy::default().with_min_valid_attempts(3))
//!     .run(&data)
//!     .unwrap();
//! assert_eq!(outcome.best.actual_clusters(), 2);
//! ```

mod kmeans;
mod restart;
mod result;
mod seed;
mod traits;

pub use kmeans::{CenterRule, ClustererConfig, ConcurrentClusterer};
pub use restart::{RestartOrchestrator, RestartOutcome, RestartPolicy};
pub use result::{wcss, Cluster, ClusteringResult};
pub use seed::SeedStrategy;
pub use traits::Clustering;
