//! Agreement between two labellings of the same rows.
//!
//! Used to report how well independent runs agree before consensus, and
//! to score a result against known labels in tests.
//!
//! | Metric | Range | Identical partitions |
//! |--------|-------|----------------------|
//! | [`ari`] | [-1, 1] | 1 |
//! | [`nmi`] | [0, 1] | 1 |
//!
//! Both are invariant to label permutation. Rows unlabelled (`None`) in
//! either input are ignored; [`jointly_labelled`] reports how many remain.
//!
//! ```rust
//! use subcomp::metrics::{ari, nmi};
//!
//! let a = [Some(0), Some(0), Some(1), Some(1), None];
//! let b = [Some(1), Some(1), Some(0), Some(0), Some(0)];
//! assert!((ari(&a, &b) - 1.0).abs() < 1e-12);
//! assert!((nmi(&a, &b) - 1.0).abs() < 1e-12);
//! ```
//!
//! # References
//!
//! - Hubert & Arabie (1985). "Comparing partitions" (ARI)
//! - Strehl & Ghosh (2002). "Cluster ensembles" (NMI)

use std::collections::HashMap;

/// Rows labelled in both inputs.
pub fn jointly_labelled(a: &[Option<usize>], b: &[Option<usize>]) -> usize {
    a.iter()
        .zip(b)
        .filter(|(x, y)| x.is_some() && y.is_some())
        .count()
}

/// Adjusted Rand Index over jointly labelled rows.
///
/// Returns 0 when the inputs differ in length or share no labelled row.
pub fn ari(a: &[Option<usize>], b: &[Option<usize>]) -> f64 {
    let Some(table) = Contingency::build(a, b) else {
        return 0.0;
    };

    let sum_comb_ij: f64 = table.joint.values().map(|&c| comb2(c) as f64).sum();
    let sum_comb_a: f64 = table.rows.values().map(|&c| comb2(c) as f64).sum();
    let sum_comb_b: f64 = table.cols.values().map(|&c| comb2(c) as f64).sum();
    let comb_n = comb2(table.n) as f64;
    if comb_n == 0.0 {
        return 1.0;
    }

    let expected = sum_comb_a * sum_comb_b / comb_n;
    let max_index = (sum_comb_a + sum_comb_b) / 2.0;
    let denom = max_index - expected;
    if denom.abs() < 1e-10 {
        // Both partitions trivial (all one cluster or all singletons).
        return 1.0;
    }
    (sum_comb_ij - expected) / denom
}

/// Normalized Mutual Information, `2·I(A;B) / (H(A) + H(B))`, over jointly
/// labelled rows.
///
/// Returns 0 when the inputs differ in length or share no labelled row.
pub fn nmi(a: &[Option<usize>], b: &[Option<usize>]) -> f64 {
    let Some(table) = Contingency::build(a, b) else {
        return 0.0;
    };
    let n = table.n as f64;

    let h_a = entropy(table.rows.values().copied(), n);
    let h_b = entropy(table.cols.values().copied(), n);

    let mut mi = 0.0;
    for (&(x, y), &count) in &table.joint {
        let p_xy = count as f64 / n;
        let p_x = table.rows[&x] as f64 / n;
        let p_y = table.cols[&y] as f64 / n;
        mi += p_xy * (p_xy / (p_x * p_y)).ln();
    }

    let denom = h_a + h_b;
    if denom > 0.0 {
        (2.0 * mi / denom).clamp(0.0, 1.0)
    } else {
        1.0
    }
}

struct Contingency {
    joint: HashMap<(usize, usize), usize>,
    rows: HashMap<usize, usize>,
    cols: HashMap<usize, usize>,
    n: usize,
}

impl Contingency {
    fn build(a: &[Option<usize>], b: &[Option<usize>]) -> Option<Self> {
        if a.len() != b.len() {
            return None;
        }
        let mut joint = HashMap::new();
        let mut rows = HashMap::new();
        let mut cols = HashMap::new();
        let mut n = 0;
        for (x, y) in a.iter().zip(b) {
            if let (Some(x), Some(y)) = (x, y) {
                *joint.entry((*x, *y)).or_insert(0usize) += 1;
                *rows.entry(*x).or_insert(0usize) += 1;
                *cols.entry(*y).or_insert(0usize) += 1;
                n += 1;
            }
        }
        (n > 0).then_some(Self {
            joint,
            rows,
            cols,
            n,
        })
    }
}

fn entropy(counts: impl Iterator<Item = usize>, n: f64) -> f64 {
    counts
        .map(|c| {
            let p = c as f64 / n;
            if p > 0.0 {
                -p * p.ln()
            } else {
                0.0
            }
        })
        .sum()
}

fn comb2(n: usize) -> usize {
    if n < 2 {
        0
    } else {
        n * (n - 1) / 2
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn some(labels: &[usize]) -> Vec<Option<usize>> {
        labels.iter().map(|&l| Some(l)).collect()
    }

    #[test]
    fn test_ari_perfect() {
        let a = some(&[0, 0, 1, 1, 2, 2]);
        assert!((ari(&a, &a) - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_permuted_labels_agree() {
        let a = some(&[1, 1, 0, 0, 2, 2]);
        let b = some(&[0, 0, 1, 1, 2, 2]);
        assert!((ari(&a, &b) - 1.0).abs() < 1e-12);
        assert!((nmi(&a, &b) - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_crossed_partitions_score_low() {
        let a = some(&[0, 1, 0, 1]);
        let b = some(&[0, 0, 1, 1]);
        assert!(ari(&a, &b) < 0.0);
        assert!(nmi(&a, &b) < 0.01);
    }

    #[test]
    fn test_unlabelled_rows_ignored() {
        let a = vec![Some(0), Some(0), Some(1), Some(1), None, Some(0)];
        let b = vec![Some(0), Some(0), Some(1), Some(1), Some(1), None];
        assert_eq!(jointly_labelled(&a, &b), 4);
        assert!((ari(&a, &b) - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_degenerate_inputs() {
        assert_eq!(ari(&[Some(0)], &[Some(0), Some(1)]), 0.0);
        assert_eq!(nmi(&[None, None], &[Some(0), Some(1)]), 0.0);
        assert_eq!(ari(&[Some(3)], &[Some(1)]), 1.0);
    }

    #[test]
    fn test_partial_agreement_between_bounds() {
        let a = some(&[0, 0, 0, 1, 1, 1]);
        let b = some(&[0, 0, 1, 1, 1, 1]);
        let score = ari(&a, &b);
        assert!(score > 0.0 && score < 1.0);
        let score = nmi(&a, &b);
        assert!(score > 0.0 && score < 1.0);
    }
}
