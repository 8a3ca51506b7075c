//! Clustering traits.

use std::collections::BTreeSet;

use crate::error::Result;

/// Trait for clustering algorithms.
pub trait Clustering {
    /// Fit the model to data and return cluster assignments.
    ///
    /// Returns a vector of cluster labels, one per input point.
    fn fit_predict(&self, data: &[Vec<f32>]) -> Result<Vec<usize>>;

    /// Get the number of clusters.
    fn n_clusters(&self) -> usize;
}

/// Trait for soft clustering algorithms that return probabilities.
pub trait SoftClustering: Clustering {
    /// Fit and return soft cluster assignments (probabilities).
    ///
    /// Returns a matrix where entry \[i\]\[k\] is the probability that
    /// point i belongs to cluster k.
    fn fit_predict_proba(&self, data: &[Vec<f32>]) -> Result<Vec<Vec<f64>>>;
}

/// Threshold a probability matrix into per-row membership sets (strict `>`).
pub fn memberships_above(probs: &[Vec<f64>], threshold: f64) -> Vec<BTreeSet<usize>> {
    probs
        .iter()
        .map(|row| {
            row.iter()
                .enumerate()
                .filter(|(_, &p)| p > threshold)
                .map(|(c, _)| c)
                .collect()
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_memberships_strict_inequality() {
        let probs = vec![vec![0.1, 0.9], vec![0.5, 0.5], vec![1.0, 0.0]];
        let sets = memberships_above(&probs, 0.1);
        assert_eq!(sets[0], BTreeSet::from([1]));
        assert_eq!(sets[1], BTreeSet::from([0, 1]));
        assert_eq!(sets[2], BTreeSet::from([0]));
    }

    #[test]
    fn test_zero_threshold_drops_exact_zero_probabilities() {
        let probs = vec![vec![0.0, 0.3, 0.7], vec![0.2, 0.2, 0.6]];
        let sets = memberships_above(&probs, 0.0);
        assert_eq!(sets[0], BTreeSet::from([1, 2]));
        assert_eq!(sets[1], BTreeSet::from([0, 1, 2]));
    }

    #[test]
    fn test_threshold_can_leave_point_unassigned() {
        let probs = vec![vec![0.34, 0.33, 0.33]];
        let sets = memberships_above(&probs, 0.5);
        assert!(sets[0].is_empty());
    }
}
