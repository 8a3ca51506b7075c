//! Threshold-based soft clustering.
//!
//! Fits a GMM with the BIC-selected component count, then keeps for every
//! point each component whose posterior probability is strictly above the
//! membership threshold.

use std::collections::BTreeSet;

use super::data::to_array;
use super::gmm::{CovarianceType, Gmm};
use super::select::ClusterCountSelector;
use super::traits::memberships_above;
use crate::error::Result;
use ndarray::Array2;

/// Membership sets produced by one soft clustering pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SoftAssignment {
    /// Component ids per point; possibly empty.
    pub memberships: Vec<BTreeSet<usize>>,
    /// Number of components in the fitted mixture.
    pub n_components: usize,
}

impl SoftAssignment {
    /// Indices of the points that belong to component `c`.
    pub fn members_of(&self, c: usize) -> Vec<usize> {
        self.memberships
            .iter()
            .enumerate()
            .filter(|(_, set)| set.contains(&c))
            .map(|(i, _)| i)
            .collect()
    }

    /// Indices of the points that landed in no component.
    pub fn unassigned(&self) -> Vec<usize> {
        self.memberships
            .iter()
            .enumerate()
            .filter(|(_, set)| set.is_empty())
            .map(|(i, _)| i)
            .collect()
    }
}

/// GMM soft clusterer with automatic component count.
#[derive(Debug, Clone)]
pub struct SoftClusterer {
    threshold: f64,
    seed: u64,
    covariance_type: CovarianceType,
    selector: ClusterCountSelector,
}

impl SoftClusterer {
    /// Clusterer with the given membership threshold, fit seed 0, and a
    /// default [`ClusterCountSelector`].
    pub fn new(threshold: f64) -> Self {
        Self {
            threshold,
            seed: 0,
            covariance_type: CovarianceType::Full,
            selector: ClusterCountSelector::new(),
        }
    }

    /// Set the seed of the final mixture fit.
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    /// Set the covariance parameterisation of the final fit.
    pub fn with_covariance_type(mut self, covariance_type: CovarianceType) -> Self {
        self.covariance_type = covariance_type;
        self
    }

    /// Replace the component count selector.
    pub fn with_selector(mut self, selector: ClusterCountSelector) -> Self {
        self.selector = selector;
        self
    }

    /// Membership threshold.
    pub fn threshold(&self) -> f64 {
        self.threshold
    }

    /// Apply this clusterer's threshold to a probability matrix.
    pub fn assign(&self, probs: &[Vec<f64>]) -> Vec<BTreeSet<usize>> {
        memberships_above(probs, self.threshold)
    }

    /// Select a component count, fit, and threshold the posteriors.
    pub fn cluster(&self, points: &[Vec<f32>]) -> Result<SoftAssignment> {
        let x = to_array(points)?;
        self.cluster_array(&x)
    }

    pub(crate) fn cluster_array(&self, x: &Array2<f64>) -> Result<SoftAssignment> {
        let n_components = self.selector.select_count_array(x)?;
        let model = Gmm::new()
            .with_n_components(n_components)
            .with_covariance_type(self.covariance_type)
            .with_seed(self.seed)
            .fit_array(x)?;
        let probs = model.predict_proba_array(x);

        Ok(SoftAssignment {
            memberships: self.assign(&probs),
            n_components,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn two_blobs() -> Vec<Vec<f32>> {
        let mut points = Vec::new();
        for i in 0..6 {
            let t = i as f32;
            let (dx, dy) = (0.4 * (1.7 * t).sin(), 0.4 * (2.3 * t).cos());
            points.push(vec![dx, dy]);
            points.push(vec![15.0 + dx, 15.0 + dy]);
        }
        points
    }

    fn clusterer() -> SoftClusterer {
        SoftClusterer::new(0.1).with_selector(ClusterCountSelector::new().with_max_clusters(3))
    }

    #[test]
    fn test_two_blobs_get_disjoint_components() {
        let result = clusterer().cluster(&two_blobs()).unwrap();
        assert_eq!(result.n_components, 2);
        assert!(result.unassigned().is_empty());

        let a = &result.memberships[0];
        let b = &result.memberships[1];
        assert_eq!(a.len(), 1);
        assert!(a.is_disjoint(b));
        for (i, set) in result.memberships.iter().enumerate() {
            let expected = if i % 2 == 0 { a } else { b };
            assert_eq!(set, expected);
        }
    }

    #[test]
    fn test_cluster_is_reproducible() {
        let clusterer = clusterer().with_seed(0);
        let points = two_blobs();
        assert_eq!(
            clusterer.cluster(&points).unwrap(),
            clusterer.cluster(&points).unwrap()
        );
    }

    #[test]
    fn test_members_of_inverts_memberships() {
        let assignment = SoftAssignment {
            memberships: vec![
                BTreeSet::from([0]),
                BTreeSet::from([0, 1]),
                BTreeSet::new(),
            ],
            n_components: 2,
        };
        assert_eq!(assignment.members_of(0), vec![0, 1]);
        assert_eq!(assignment.members_of(1), vec![1]);
        assert_eq!(assignment.unassigned(), vec![2]);
    }

    #[test]
    fn test_assign_uses_strict_threshold() {
        let clusterer = SoftClusterer::new(0.0);
        let sets = clusterer.assign(&[vec![0.0, 1.0], vec![0.4, 0.6]]);
        assert_eq!(sets[0], BTreeSet::from([1]));
        assert_eq!(sets[1], BTreeSet::from([0, 1]));
    }
}
