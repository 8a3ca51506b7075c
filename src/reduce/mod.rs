//! Dimensionality reduction ahead of mixture fitting.
//!
//! Gaussian mixtures degrade quickly as dimension grows: covariance
//! estimates need far more points than a 768- or 1024-dimensional embedding
//! ever has per cluster. Embeddings are therefore projected to a handful of
//! dimensions (10 by default) before any GMM sees them.
//!
//! The projection is manifold-based ([`Umap`]) rather than linear, so that
//! cosine neighbourhoods in the embedding space survive the projection.
//!
//! ## Global vs Local
//!
//! The same projector is used at two scales, differing only in how many
//! neighbours define "local structure":
//!
//! | Call site | Points | Neighbours |
//! |-----------|--------|------------|
//! | [`global_reduce`] | the whole level | `floor(sqrt(n - 1))` unless given |
//! | [`local_reduce`] | one global cluster | fixed, 10 by default |

mod knn;
mod umap;

pub use knn::{nearest_neighbors, KnnGraph};
pub use umap::{Umap, UmapConfig};

use std::fmt;
use std::str::FromStr;

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};

/// Seed used by the reference pipeline for every projection and selection fit.
pub const RANDOM_SEED: u64 = 224;

/// Neighbour count used for projections inside one global cluster.
pub const DEFAULT_LOCAL_NEIGHBORS: usize = 10;

/// Distance used to build the neighbour graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Metric {
    /// `1 - cos(a, b)`.
    #[default]
    Cosine,
    /// Straight-line distance.
    Euclidean,
}

impl Metric {
    /// Distance between two vectors of equal length.
    pub fn distance(self, a: &[f64], b: &[f64]) -> f64 {
        match self {
            Metric::Euclidean => a
                .iter()
                .zip(b)
                .map(|(x, y)| (x - y).powi(2))
                .sum::<f64>()
                .sqrt(),
            Metric::Cosine => {
                let (mut dot, mut na, mut nb) = (0.0, 0.0, 0.0);
                for (x, y) in a.iter().zip(b) {
                    dot += x * y;
                    na += x * x;
                    nb += y * y;
                }
                match (na == 0.0, nb == 0.0) {
                    (true, true) => 0.0,
                    (true, false) | (false, true) => 1.0,
                    (false, false) => (1.0 - dot / (na.sqrt() * nb.sqrt())).max(0.0),
                }
            }
        }
    }
}

impl fmt::Display for Metric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Metric::Cosine => write!(f, "cosine"),
            Metric::Euclidean => write!(f, "euclidean"),
        }
    }
}

impl FromStr for Metric {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "cosine" => Ok(Metric::Cosine),
            "euclidean" | "l2" => Ok(Metric::Euclidean),
            _ => Err(Error::InvalidParameter {
                name: "metric",
                message: "expected 'cosine' or 'euclidean'",
            }),
        }
    }
}

/// Something that projects points into a lower-dimensional space.
pub trait Reducer {
    /// Project `points`; the output has one row per input row.
    fn reduce(&self, points: &[Vec<f32>]) -> Result<Vec<Vec<f32>>>;

    /// Dimension of the output rows.
    fn target_dim(&self) -> usize;
}

/// `floor(sqrt(n - 1))`, the global neighbour count for `n` points.
pub fn default_neighbors(n_points: usize) -> usize {
    (n_points.saturating_sub(1) as f64).sqrt().floor() as usize
}

/// Projector for a whole level of `n_points` points.
///
/// `n_neighbors` defaults to [`default_neighbors`] of the point count.
pub(crate) fn global_projector(
    n_points: usize,
    target_dim: usize,
    n_neighbors: Option<usize>,
    metric: Metric,
    seed: u64,
    config: &UmapConfig,
) -> Umap {
    let n_neighbors = n_neighbors.unwrap_or_else(|| default_neighbors(n_points));
    local_projector(target_dim, n_neighbors, metric, seed, config)
}

/// Projector for the members of one global cluster.
pub(crate) fn local_projector(
    target_dim: usize,
    n_neighbors: usize,
    metric: Metric,
    seed: u64,
    config: &UmapConfig,
) -> Umap {
    Umap::new(target_dim)
        .with_n_neighbors(n_neighbors)
        .with_metric(metric)
        .with_seed(seed)
        .with_config(config.clone())
}

/// Reduce the whole point set.
///
/// `n_neighbors` defaults to [`default_neighbors`] of the point count.
pub fn global_reduce(
    points: &[Vec<f32>],
    target_dim: usize,
    n_neighbors: Option<usize>,
    metric: Metric,
    seed: u64,
) -> Result<Vec<Vec<f32>>> {
    global_reduce_with(points, target_dim, n_neighbors, metric, seed, &UmapConfig::default())
}

/// [`global_reduce`] with explicit layout tunables.
pub fn global_reduce_with(
    points: &[Vec<f32>],
    target_dim: usize,
    n_neighbors: Option<usize>,
    metric: Metric,
    seed: u64,
    config: &UmapConfig,
) -> Result<Vec<Vec<f32>>> {
    global_projector(points.len(), target_dim, n_neighbors, metric, seed, config).reduce(points)
}

/// Reduce the members of one global cluster with a fixed neighbour count.
pub fn local_reduce(
    points: &[Vec<f32>],
    target_dim: usize,
    n_neighbors: usize,
    metric: Metric,
    seed: u64,
) -> Result<Vec<Vec<f32>>> {
    local_reduce_with(points, target_dim, n_neighbors, metric, seed, &UmapConfig::default())
}

/// [`local_reduce`] with explicit layout tunables.
pub fn local_reduce_with(
    points: &[Vec<f32>],
    target_dim: usize,
    n_neighbors: usize,
    metric: Metric,
    seed: u64,
    config: &UmapConfig,
) -> Result<Vec<Vec<f32>>> {
    local_projector(target_dim, n_neighbors, metric, seed, config).reduce(points)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_neighbors() {
        assert_eq!(default_neighbors(1), 0);
        assert_eq!(default_neighbors(12), 3);
        assert_eq!(default_neighbors(101), 10);
    }

    #[test]
    fn test_metric_parse_and_display() {
        assert_eq!("Cosine".parse::<Metric>().unwrap(), Metric::Cosine);
        assert_eq!("l2".parse::<Metric>().unwrap(), Metric::Euclidean);
        assert!("manhattan".parse::<Metric>().is_err());
        assert_eq!(Metric::Euclidean.to_string(), "euclidean");
    }

    #[test]
    fn test_cosine_distance() {
        let m = Metric::Cosine;
        assert!(m.distance(&[1.0, 0.0], &[2.0, 0.0]).abs() < 1e-12);
        assert!((m.distance(&[1.0, 0.0], &[0.0, 3.0]) - 1.0).abs() < 1e-12);
        assert!((m.distance(&[1.0, 0.0], &[-1.0, 0.0]) - 2.0).abs() < 1e-12);
        assert_eq!(m.distance(&[0.0, 0.0], &[0.0, 0.0]), 0.0);
        assert_eq!(m.distance(&[0.0, 0.0], &[1.0, 0.0]), 1.0);
    }

    #[test]
    fn test_global_and_local_reduce_shapes() {
        let points: Vec<Vec<f32>> = (0..15)
            .map(|i| vec![i as f32, (i % 3) as f32, 1.0, (i * i % 7) as f32])
            .collect();

        let global = global_reduce(&points, 2, None, Metric::Euclidean, RANDOM_SEED).unwrap();
        assert_eq!(global.len(), 15);
        assert!(global.iter().all(|row| row.len() == 2));

        let local = local_reduce(&points, 3, DEFAULT_LOCAL_NEIGHBORS, Metric::Cosine, 1).unwrap();
        assert_eq!(local.len(), 15);
        assert!(local.iter().all(|row| row.len() == 3 && row.iter().all(|v| v.is_finite())));
    }

    #[test]
    fn test_layout_tunables_reach_the_projection() {
        let points: Vec<Vec<f32>> = (0..15)
            .map(|i| vec![i as f32, (i % 3) as f32, 1.0, (i * i % 7) as f32])
            .collect();
        let short = UmapConfig {
            n_epochs: Some(5),
            ..UmapConfig::default()
        };

        let default = global_reduce(&points, 2, None, Metric::Euclidean, 7).unwrap();
        let explicit =
            global_reduce_with(&points, 2, None, Metric::Euclidean, 7, &UmapConfig::default())
                .unwrap();
        assert_eq!(default, explicit);

        let tuned = global_reduce_with(&points, 2, None, Metric::Euclidean, 7, &short).unwrap();
        assert_ne!(default, tuned);
    }
}
