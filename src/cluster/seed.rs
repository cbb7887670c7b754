//! Initial center selection.
//!
//! Farthest-point (max-min) seeding picks one row at random and then
//! repeatedly takes the row farthest from every center chosen so far. It
//! spreads seeds across the data far more reliably than uniform sampling,
//! which is what keeps clusters from emptying out in the first iteration.

use crate::distance::DistanceMetric;
use crate::error::{Error, Result};
use crate::matrix::FeatureMatrix;
use rand::prelude::*;

/// How the first `k` centers are chosen.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum SeedStrategy {
    /// `k` distinct rows sampled uniformly.
    Random,
    /// Random first row, then max-min distance.
    #[default]
    FarthestPoint,
}

impl SeedStrategy {
    /// Choose `k` distinct rows from `candidates`.
    pub fn select<R: Rng + ?Sized>(
        &self,
        data: &FeatureMatrix,
        candidates: &[usize],
        k: usize,
        metric: DistanceMetric,
        rng: &mut R,
    ) -> Result<Vec<usize>> {
        if k == 0 || k > candidates.len() {
            return Err(Error::InvalidClusterCount {
                requested: k,
                n_items: candidates.len(),
            });
        }
        match self {
            SeedStrategy::Random => Ok(rand::seq::index::sample(rng, candidates.len(), k)
                .into_iter()
                .map(|p| candidates[p])
                .collect()),
            SeedStrategy::FarthestPoint => Ok(farthest_point(data, candidates, k, metric, rng)),
        }
    }
}

fn farthest_point<R: Rng + ?Sized>(
    data: &FeatureMatrix,
    candidates: &[usize],
    k: usize,
    metric: DistanceMetric,
    rng: &mut R,
) -> Vec<usize> {
    let mut taken = vec![false; candidates.len()];
    let first = rng.random_range(0..candidates.len());
    taken[first] = true;
    let mut chosen = vec![candidates[first]];

    let mut min_dist = metric.to_rows(data, data.row(candidates[first]), candidates);

    while chosen.len() < k {
        let mut best: Option<(usize, f64)> = None;
        for (p, &d) in min_dist.iter().enumerate() {
            if taken[p] {
                continue;
            }
            if best.map_or(true, |(_, bd)| d > bd) {
                best = Some((p, d));
            }
        }

        let next = match best {
            Some((p, d)) if d > 0.0 => p,
            // Only duplicates of chosen rows remain.
            _ => {
                let free: Vec<usize> = (0..candidates.len()).filter(|&p| !taken[p]).collect();
                free[rng.random_range(0..free.len())]
            }
        };

        taken[next] = true;
        chosen.push(candidates[next]);

        let fresh = metric.to_rows(data, data.row(candidates[next]), candidates);
        for (m, f) in min_dist.iter_mut().zip(fresh) {
            *m = m.min(f);
        }
    }

    chosen
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    fn corners() -> FeatureMatrix {
        FeatureMatrix::from_rows(&[
            vec![0.0, 0.0],
            vec![0.1, 0.0],
            vec![10.0, 10.0],
            vec![10.1, 10.0],
            vec![-10.0, 10.0],
            vec![-10.0, 10.1],
        ])
        .unwrap()
    }

    #[test]
    fn test_farthest_point_spreads_seeds() {
        let data = corners();
        let candidates: Vec<usize> = (0..6).collect();
        for seed in 0..10 {
            let mut rng = StdRng::seed_from_u64(seed);
            let picked = SeedStrategy::FarthestPoint
                .select(&data, &candidates, 3, DistanceMetric::SquaredError, &mut rng)
                .unwrap();
            let groups: HashSet<usize> = picked.iter().map(|&i| i / 2).collect();
            assert_eq!(groups.len(), 3, "seed {seed} picked {picked:?}");
        }
    }

    #[test]
    fn test_random_distinct() {
        let data = corners();
        let candidates = vec![0, 2, 3, 5];
        let mut rng = StdRng::seed_from_u64(1);
        let picked = SeedStrategy::Random
            .select(&data, &candidates, 4, DistanceMetric::SquaredError, &mut rng)
            .unwrap();
        let unique: HashSet<usize> = picked.iter().copied().collect();
        assert_eq!(unique.len(), 4);
        assert!(picked.iter().all(|i| candidates.contains(i)));
    }

    #[test]
    fn test_duplicates_still_distinct_rows() {
        let data = FeatureMatrix::from_rows(&[vec![1.0], vec![1.0], vec![1.0]]).unwrap();
        let mut rng = StdRng::seed_from_u64(3);
        let picked = SeedStrategy::FarthestPoint
            .select(&data, &[0, 1, 2], 3, DistanceMetric::SquaredError, &mut rng)
            .unwrap();
        let unique: HashSet<usize> = picked.into_iter().collect();
        assert_eq!(unique.len(), 3);
    }

    #[test]
    fn test_too_many_seeds() {
        let data = corners();
        let mut rng = StdRng::seed_from_u64(0);
        let err = SeedStrategy::Random
            .select(&data, &[0, 1], 3, DistanceMetric::SquaredError, &mut rng)
            .unwrap_err();
        assert!(matches!(err, Error::InvalidClusterCount { requested: 3, n_items: 2 }));
    }
}
