//! Choosing the number of mixture components.
//!
//! Every candidate count is fitted and scored with BIC; the lowest score
//! wins, and a linear scan keeps the smallest count on exact ties.
//!
//! Candidates are `1..min(max_clusters, n)`: the upper bound is exclusive,
//! so a model with one component per point is never considered. With fewer
//! than two candidates (two points or fewer, or `max_clusters <= 2`) the
//! answer is 1 and nothing is fitted.

use std::ops::Range;

use super::data::to_array;
use super::gmm::{CovarianceType, Gmm};
use crate::error::{Error, Result};
use crate::reduce::RANDOM_SEED;
use ndarray::Array2;

/// BIC-driven component count selection.
#[derive(Debug, Clone)]
pub struct ClusterCountSelector {
    max_clusters: usize,
    seed: u64,
    covariance_type: CovarianceType,
}

impl ClusterCountSelector {
    /// Selector with `max_clusters = 50` and the fixed pipeline seed.
    pub fn new() -> Self {
        Self {
            max_clusters: 50,
            seed: RANDOM_SEED,
            covariance_type: CovarianceType::Full,
        }
    }

    /// Set the (exclusive) cap on the candidate count.
    pub fn with_max_clusters(mut self, max_clusters: usize) -> Self {
        self.max_clusters = max_clusters;
        self
    }

    /// Set the seed used for every candidate fit.
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    /// Set the covariance parameterisation of candidate fits.
    pub fn with_covariance_type(mut self, covariance_type: CovarianceType) -> Self {
        self.covariance_type = covariance_type;
        self
    }

    /// Candidate component counts for `n_points` points.
    pub fn candidates(&self, n_points: usize) -> Range<usize> {
        1..self.max_clusters.min(n_points).max(1)
    }

    /// BIC of every candidate that could be fitted, in candidate order.
    pub fn bic_scores(&self, points: &[Vec<f32>]) -> Result<Vec<(usize, f64)>> {
        let x = to_array(points)?;
        self.bic_scores_array(&x)
    }

    fn bic_scores_array(&self, x: &Array2<f64>) -> Result<Vec<(usize, f64)>> {
        let mut scores = Vec::new();
        let mut last_err = None;

        for k in self.candidates(x.nrows()) {
            let fit = Gmm::new()
                .with_n_components(k)
                .with_covariance_type(self.covariance_type)
                .with_seed(self.seed)
                .fit_array(x);
            match fit {
                Ok(model) => {
                    let bic = model.bic_array(x);
                    tracing::trace!(components = k, bic, "candidate fit");
                    if bic.is_finite() {
                        scores.push((k, bic));
                    }
                }
                Err(err) => {
                    tracing::warn!(components = k, error = %err, "skipping degenerate candidate");
                    last_err = Some(err);
                }
            }
        }

        if scores.is_empty() {
            return Err(last_err.unwrap_or_else(|| {
                Error::DegenerateModel("no candidate component count could be fitted".into())
            }));
        }
        Ok(scores)
    }

    /// Number of components with the lowest BIC.
    pub fn select_count(&self, points: &[Vec<f32>]) -> Result<usize> {
        let x = to_array(points)?;
        self.select_count_array(&x)
    }

    pub(crate) fn select_count_array(&self, x: &Array2<f64>) -> Result<usize> {
        if self.candidates(x.nrows()).len() < 2 {
            return Ok(1);
        }

        let scores = self.bic_scores_array(x)?;
        let mut best = scores[0];
        for &(k, bic) in &scores[1..] {
            if bic < best.1 {
                best = (k, bic);
            }
        }

        tracing::debug!(components = best.0, bic = best.1, n_points = x.nrows(), "selected component count");
        Ok(best.0)
    }
}

impl Default for ClusterCountSelector {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn three_blobs() -> Vec<Vec<f32>> {
        let centers = [(0.0, 0.0), (20.0, 0.0), (0.0, 20.0)];
        let mut points = Vec::new();
        for (cx, cy) in centers {
            for i in 0..8 {
                let t = i as f32;
                points.push(vec![cx + 0.4 * (1.7 * t).sin(), cy + 0.4 * (2.3 * t).cos()]);
            }
        }
        points
    }

    #[test]
    fn test_candidate_range_excludes_point_count() {
        let selector = ClusterCountSelector::new();
        assert_eq!(selector.candidates(5), 1..5);
        assert_eq!(selector.candidates(80), 1..50);
        assert_eq!(selector.candidates(2), 1..2);
        assert_eq!(selector.candidates(1).len(), 0);
    }

    #[test]
    fn test_two_points_returns_one_without_fitting() {
        // Identical points would make any real fit degenerate.
        let points = vec![vec![1.0, 1.0], vec![1.0, 1.0]];
        assert_eq!(ClusterCountSelector::new().select_count(&points).unwrap(), 1);
        assert_eq!(ClusterCountSelector::new().select_count(&points[..1]).unwrap(), 1);
    }

    #[test]
    fn test_finds_three_blobs() {
        let k = ClusterCountSelector::new()
            .with_max_clusters(4)
            .select_count(&three_blobs())
            .unwrap();
        assert_eq!(k, 3);
    }

    #[test]
    fn test_bic_scores_follow_candidate_order() {
        let scores = ClusterCountSelector::new()
            .with_max_clusters(5)
            .bic_scores(&three_blobs())
            .unwrap();
        let ks: Vec<usize> = scores.iter().map(|(k, _)| *k).collect();
        assert_eq!(ks, vec![1, 2, 3, 4]);
    }

    #[test]
    fn test_empty_input_is_error() {
        assert_eq!(
            ClusterCountSelector::new().select_count(&[]).unwrap_err(),
            Error::EmptyInput
        );
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(16))]

        #[test]
        fn selected_count_is_in_candidate_range(
            points in proptest::collection::vec(
                proptest::collection::vec(-5.0f32..5.0, 2),
                3..14,
            ),
            max_clusters in 2usize..8,
        ) {
            let selector = ClusterCountSelector::new().with_max_clusters(max_clusters);
            let k = selector.select_count(&points).unwrap();
            let upper = max_clusters.min(points.len());
            prop_assert!(k >= 1);
            prop_assert!(k < upper.max(2));
            prop_assert_eq!(k, selector.select_count(&points).unwrap());
        }
    }
}
