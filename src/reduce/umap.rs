//! Uniform Manifold Approximation and Projection.
//!
//! # Algorithm
//!
//! 1. Find the `k` nearest neighbours of every point.
//! 2. Per point, pick `rho` (distance to the closest distinct neighbour) and
//!    binary-search `sigma` so that `Σⱼ exp(-(dᵢⱼ - ρᵢ)/σᵢ) = log₂ k`.
//! 3. Turn distances into directed memberships and symmetrise with the
//!    fuzzy union `A + Aᵀ - A ∘ Aᵀ`.
//! 4. Lay the points out in `n_components` dimensions by stochastic gradient
//!    descent on the fuzzy cross-entropy: edges attract, random pairs repel.
//!
//! The low-dimensional similarity is `1 / (1 + a·d^(2b))`; the defaults for
//! `a` and `b` are the curve fit for `min_dist = 0.1`, `spread = 1.0`.
//!
//! Every random draw comes from one seeded generator, so equal input and
//! seed give an equal layout.
//!
//! # References
//!
//! McInnes, Healy & Melville (2018). "UMAP: Uniform Manifold Approximation
//! and Projection for Dimension Reduction."

use std::collections::BTreeMap;

use super::knn::{nearest_neighbors, KnnGraph};
use super::{Metric, Reducer, RANDOM_SEED};
use crate::cluster::to_rows_f64;
use crate::error::{Error, Result};
use rand::prelude::*;
use rand_distr::Normal;
use serde::{Deserialize, Serialize};

const SMOOTH_K_TOLERANCE: f64 = 1e-5;
const MIN_K_DIST_SCALE: f64 = 1e-3;
const BINARY_SEARCH_STEPS: usize = 64;
const GRADIENT_CLIP: f64 = 4.0;

/// Tunables of the layout optimisation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct UmapConfig {
    /// Optimisation epochs; `None` picks 500 for up to 10 000 points, else 200.
    pub n_epochs: Option<usize>,
    /// Initial SGD step size, decayed linearly to zero.
    pub learning_rate: f64,
    /// Negative samples drawn per positive edge sample.
    pub negative_sample_rate: usize,
    /// Low-dimensional curve parameter `a`.
    pub a: f64,
    /// Low-dimensional curve parameter `b`.
    pub b: f64,
}

impl Default for UmapConfig {
    fn default() -> Self {
        Self {
            n_epochs: None,
            learning_rate: 1.0,
            negative_sample_rate: 5,
            a: 1.576_943_460_405_378,
            b: 0.895_060_878_122_785_9,
        }
    }
}

/// Manifold projector.
#[derive(Debug, Clone)]
pub struct Umap {
    n_components: usize,
    n_neighbors: usize,
    metric: Metric,
    seed: u64,
    config: UmapConfig,
}

/// Symmetric weighted edge list of the fuzzy graph.
#[derive(Debug, Clone)]
struct FuzzyGraph {
    edges: Vec<(usize, usize, f64)>,
}

impl Umap {
    /// Projector into `n_components` dimensions with 15 neighbours and cosine distance.
    pub fn new(n_components: usize) -> Self {
        Self {
            n_components,
            n_neighbors: 15,
            metric: Metric::Cosine,
            seed: RANDOM_SEED,
            config: UmapConfig::default(),
        }
    }

    /// Set the neighbour count (self included, as usual for UMAP).
    pub fn with_n_neighbors(mut self, n_neighbors: usize) -> Self {
        self.n_neighbors = n_neighbors;
        self
    }

    /// Set the input-space distance.
    pub fn with_metric(mut self, metric: Metric) -> Self {
        self.metric = metric;
        self
    }

    /// Set the random seed.
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    /// Replace the layout tunables.
    pub fn with_config(mut self, config: UmapConfig) -> Self {
        self.config = config;
        self
    }

    /// Per-point `(rho, sigma)` such that the smoothed memberships of the
    /// k neighbours sum to `log2(k)`.
    fn smooth_knn_dist(knn: &KnnGraph) -> Vec<(f64, f64)> {
        let k = knn.k();
        let target = (k as f64).log2();
        let mean_all = {
            let all: Vec<f64> = knn.distances.iter().flatten().copied().collect();
            all.iter().sum::<f64>() / all.len().max(1) as f64
        };

        knn.distances
            .iter()
            .map(|row| {
                let rho = row.iter().copied().find(|&d| d > 0.0).unwrap_or(0.0);

                let (mut lo, mut hi, mut mid) = (0.0, f64::INFINITY, 1.0);
                for _ in 0..BINARY_SEARCH_STEPS {
                    let psum: f64 = row
                        .iter()
                        .skip(1)
                        .map(|&d| {
                            let d = d - rho;
                            if d > 0.0 {
                                (-d / mid).exp()
                            } else {
                                1.0
                            }
                        })
                        .sum();

                    if (psum - target).abs() < SMOOTH_K_TOLERANCE {
                        break;
                    }
                    if psum > target {
                        hi = mid;
                        mid = (lo + hi) / 2.0;
                    } else {
                        lo = mid;
                        mid = if hi.is_infinite() { mid * 2.0 } else { (lo + hi) / 2.0 };
                    }
                }

                let mean_row = row.iter().sum::<f64>() / row.len().max(1) as f64;
                let floor = if rho > 0.0 { mean_row } else { mean_all };
                (rho, mid.max(MIN_K_DIST_SCALE * floor))
            })
            .collect()
    }

    fn fuzzy_simplicial_set(knn: &KnnGraph) -> FuzzyGraph {
        let params = Self::smooth_knn_dist(knn);

        let mut directed: BTreeMap<(usize, usize), f64> = BTreeMap::new();
        for (i, (neighbors, dists)) in knn.indices.iter().zip(&knn.distances).enumerate() {
            let (rho, sigma) = params[i];
            for (&j, &d) in neighbors.iter().zip(dists) {
                if j == i {
                    continue;
                }
                let w = if d - rho <= 0.0 || sigma == 0.0 {
                    1.0
                } else {
                    (-(d - rho) / sigma).exp()
                };
                let _ = directed.insert((i, j), w);
            }
        }

        let mut union: BTreeMap<(usize, usize), f64> = BTreeMap::new();
        for (&(i, j), &w) in &directed {
            let wt = directed.get(&(j, i)).copied().unwrap_or(0.0);
            let p = w + wt - w * wt;
            let _ = union.insert((i, j), p);
            let _ = union.insert((j, i), p);
        }

        FuzzyGraph {
            edges: union
                .into_iter()
                .filter(|(_, w)| *w > 0.0)
                .map(|((i, j), w)| (i, j, w))
                .collect(),
        }
    }

    fn initial_layout(&self, n: usize, rng: &mut StdRng) -> Result<Vec<f64>> {
        let normal = Normal::new(0.0, 1.0).map_err(|e| Error::Other(e.to_string()))?;
        let mut layout: Vec<f64> = (0..n * self.n_components)
            .map(|_| normal.sample(rng))
            .collect();

        let max_abs = layout.iter().fold(0.0f64, |m, v| m.max(v.abs()));
        if max_abs > 0.0 {
            let scale = 10.0 / max_abs;
            layout.iter_mut().for_each(|v| *v *= scale);
        }
        Ok(layout)
    }

    fn optimize_layout(&self, graph: &FuzzyGraph, layout: &mut [f64], n: usize, rng: &mut StdRng) {
        let dim = self.n_components;
        let n_epochs = self
            .config
            .n_epochs
            .unwrap_or(if n <= 10_000 { 500 } else { 200 });
        let (a, b) = (self.config.a, self.config.b);

        let max_w = graph.edges.iter().fold(0.0f64, |m, e| m.max(e.2));
        if max_w <= 0.0 || n_epochs == 0 {
            return;
        }
        // Edges too weak to be sampled even once are dropped.
        let edges: Vec<&(usize, usize, f64)> = graph
            .edges
            .iter()
            .filter(|e| e.2 >= max_w / n_epochs as f64)
            .collect();

        let epochs_per_sample: Vec<f64> = edges.iter().map(|e| max_w / e.2).collect();
        let neg_rate = self.config.negative_sample_rate.max(1) as f64;
        let epochs_per_negative: Vec<f64> =
            epochs_per_sample.iter().map(|e| e / neg_rate).collect();
        let mut next_sample = epochs_per_sample.clone();
        let mut next_negative = epochs_per_negative.clone();

        let mut grad = vec![0.0; dim];
        for epoch in 0..n_epochs {
            let alpha = self.config.learning_rate * (1.0 - epoch as f64 / n_epochs as f64);
            let epoch_f = epoch as f64;

            for (e, &&(head, tail, _)) in edges.iter().enumerate() {
                if next_sample[e] > epoch_f {
                    continue;
                }

                let dist_sq = squared_distance(layout, head, tail, dim);
                let coeff = if dist_sq > 0.0 {
                    -2.0 * a * b * dist_sq.powf(b - 1.0) / (a * dist_sq.powf(b) + 1.0)
                } else {
                    0.0
                };
                for d in 0..dim {
                    let diff = layout[head * dim + d] - layout[tail * dim + d];
                    grad[d] = (coeff * diff).clamp(-GRADIENT_CLIP, GRADIENT_CLIP) * alpha;
                }
                for d in 0..dim {
                    layout[head * dim + d] += grad[d];
                    layout[tail * dim + d] -= grad[d];
                }
                next_sample[e] += epochs_per_sample[e];

                let n_neg =
                    ((epoch_f - next_negative[e]) / epochs_per_negative[e]).max(0.0) as usize;
                for _ in 0..n_neg {
                    let other = rng.random_range(0..n);
                    if other == head {
                        continue;
                    }
                    let dist_sq = squared_distance(layout, head, other, dim);
                    let coeff = if dist_sq > 0.0 {
                        2.0 * b / ((0.001 + dist_sq) * (a * dist_sq.powf(b) + 1.0))
                    } else {
                        0.0
                    };
                    for d in 0..dim {
                        let step = if coeff > 0.0 {
                            let diff = layout[head * dim + d] - layout[other * dim + d];
                            (coeff * diff).clamp(-GRADIENT_CLIP, GRADIENT_CLIP)
                        } else {
                            GRADIENT_CLIP
                        };
                        layout[head * dim + d] += step * alpha;
                    }
                }
                next_negative[e] += n_neg as f64 * epochs_per_negative[e];
            }
        }
    }

    /// Project rows already widened to `f64`.
    pub(crate) fn reduce_rows(&self, rows: &[Vec<f64>]) -> Result<Vec<Vec<f32>>> {
        if rows.is_empty() {
            return Err(Error::EmptyInput);
        }
        if self.n_components == 0 {
            return Err(Error::InvalidParameter {
                name: "n_components",
                message: "must be > 0",
            });
        }

        let n = rows.len();
        if n == 1 {
            return Ok(vec![vec![0.0; self.n_components]]);
        }

        let k = self.n_neighbors.clamp(2, n);
        let knn = nearest_neighbors(rows, k, self.metric);
        let graph = Self::fuzzy_simplicial_set(&knn);

        let mut rng = StdRng::seed_from_u64(self.seed);
        let mut layout = self.initial_layout(n, &mut rng)?;
        self.optimize_layout(&graph, &mut layout, n, &mut rng);

        if layout.iter().any(|v| !v.is_finite()) {
            return Err(Error::DegenerateModel("projection diverged".into()));
        }

        Ok(layout
            .chunks(self.n_components)
            .map(|row| row.iter().map(|&v| v as f32).collect())
            .collect())
    }
}

fn squared_distance(layout: &[f64], i: usize, j: usize, dim: usize) -> f64 {
    (0..dim)
        .map(|d| (layout[i * dim + d] - layout[j * dim + d]).powi(2))
        .sum()
}

impl Reducer for Umap {
    fn reduce(&self, points: &[Vec<f32>]) -> Result<Vec<Vec<f32>>> {
        let rows = to_rows_f64(points)?;
        self.reduce_rows(&rows)
    }

    fn target_dim(&self) -> usize {
        self.n_components
    }
}
