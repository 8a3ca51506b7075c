//! Two-stage soft clustering of one tree level.
//!
//! ```text
//! embeddings ─► global projection ─► soft GMM ─► global clusters
//!                                                    │ (per cluster)
//!                                local projection ◄──┘
//!                                       │
//!                                   soft GMM ─► local ids + offset
//! ```
//!
//! Every global cluster is re-projected and re-clustered on its own. The
//! local ids of cluster `g` are shifted by the total number of local
//! clusters found in clusters `0..g`, so ids are unique across the level.
//! Local passes are independent and run in parallel with the `parallel`
//! feature; offsets are assigned afterwards in global cluster order, which
//! keeps the output identical to a sequential run.
//!
//! Points are tracked by index throughout. Two chunks with the same
//! embedding keep their own memberships.

use std::collections::BTreeSet;

use super::data::to_rows_f64;
use super::gmm::CovarianceType;
use super::select::ClusterCountSelector;
use super::soft::{SoftAssignment, SoftClusterer};
use crate::error::{Error, Result};
use crate::reduce::{
    global_projector, local_projector, Metric, UmapConfig, DEFAULT_LOCAL_NEIGHBORS, RANDOM_SEED,
};
use serde::{Deserialize, Serialize};

#[cfg(feature = "parallel")]
use rayon::prelude::*;

/// Parameters of one two-stage clustering pass.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClusteringConfig {
    /// Dimension of both projections.
    pub target_dim: usize,
    /// Posterior probability a point must exceed to join a component.
    pub threshold: f64,
    /// Exclusive cap on the component count tried by BIC selection.
    pub max_clusters: usize,
    /// Neighbours for the global projection; `floor(sqrt(n - 1))` when unset.
    pub global_neighbors: Option<usize>,
    /// Neighbours for each local projection.
    pub local_neighbors: usize,
    /// Distance of the neighbour graphs.
    pub metric: Metric,
    /// Seed of both projections.
    pub reduction_seed: u64,
    /// Seed of the candidate fits during count selection.
    pub selection_seed: u64,
    /// Seed of the final mixture fits.
    pub fit_seed: u64,
    /// Covariance parameterisation of every mixture.
    pub covariance_type: CovarianceType,
    /// Layout optimisation tunables.
    pub umap: UmapConfig,
}

impl Default for ClusteringConfig {
    fn default() -> Self {
        Self {
            target_dim: 10,
            threshold: 0.1,
            max_clusters: 50,
            global_neighbors: None,
            local_neighbors: DEFAULT_LOCAL_NEIGHBORS,
            metric: Metric::Cosine,
            reduction_seed: RANDOM_SEED,
            selection_seed: RANDOM_SEED,
            fit_seed: 0,
            covariance_type: CovarianceType::Full,
            umap: UmapConfig::default(),
        }
    }
}

impl ClusteringConfig {
    /// Check the parameters before any fitting.
    pub fn validate(&self) -> Result<()> {
        if self.target_dim == 0 {
            return Err(Error::InvalidParameter {
                name: "target_dim",
                message: "must be > 0",
            });
        }
        // Posteriors never exceed 1, so such a threshold admits no point.
        // Negative thresholds admit every point to every component.
        if self.threshold.is_nan() || self.threshold >= 1.0 {
            return Err(Error::InvalidParameter {
                name: "threshold",
                message: "must be a number below 1",
            });
        }
        if self.max_clusters == 0 {
            return Err(Error::InvalidParameter {
                name: "max_clusters",
                message: "must be > 0",
            });
        }
        if self.local_neighbors == 0 || self.global_neighbors == Some(0) {
            return Err(Error::InvalidParameter {
                name: "neighbors",
                message: "must be > 0",
            });
        }
        Ok(())
    }

    /// Set the projection dimension.
    pub fn with_target_dim(mut self, target_dim: usize) -> Self {
        self.target_dim = target_dim;
        self
    }

    /// Set the membership threshold.
    pub fn with_threshold(mut self, threshold: f64) -> Self {
        self.threshold = threshold;
        self
    }

    /// Set the exclusive cap on candidate component counts.
    pub fn with_max_clusters(mut self, max_clusters: usize) -> Self {
        self.max_clusters = max_clusters;
        self
    }

    /// Set the neighbour graph metric.
    pub fn with_metric(mut self, metric: Metric) -> Self {
        self.metric = metric;
        self
    }

    /// Set the covariance parameterisation.
    pub fn with_covariance_type(mut self, covariance_type: CovarianceType) -> Self {
        self.covariance_type = covariance_type;
        self
    }
}

/// Global-then-local soft clustering.
#[derive(Debug, Clone, Default)]
pub struct TwoStageClustering {
    config: ClusteringConfig,
}

struct LocalPass {
    members: Vec<usize>,
    memberships: Vec<BTreeSet<usize>>,
    n_clusters: usize,
}

impl TwoStageClustering {
    /// Engine with the given configuration.
    pub fn new(config: ClusteringConfig) -> Self {
        Self { config }
    }

    /// Active configuration.
    pub fn config(&self) -> &ClusteringConfig {
        &self.config
    }

    fn global_projection(&self, rows: &[Vec<f64>]) -> Result<Vec<Vec<f32>>> {
        global_projector(
            rows.len(),
            self.config.target_dim,
            self.config.global_neighbors,
            self.config.metric,
            self.config.reduction_seed,
            &self.config.umap,
        )
        .reduce_rows(rows)
    }

    fn local_projection(&self, rows: &[Vec<f64>]) -> Result<Vec<Vec<f32>>> {
        local_projector(
            self.config.target_dim,
            self.config.local_neighbors,
            self.config.metric,
            self.config.reduction_seed,
            &self.config.umap,
        )
        .reduce_rows(rows)
    }

    fn clusterer(&self) -> SoftClusterer {
        let selector = ClusterCountSelector::new()
            .with_max_clusters(self.config.max_clusters)
            .with_seed(self.config.selection_seed)
            .with_covariance_type(self.config.covariance_type);
        SoftClusterer::new(self.config.threshold)
            .with_seed(self.config.fit_seed)
            .with_covariance_type(self.config.covariance_type)
            .with_selector(selector)
    }

    fn is_small(&self, n: usize) -> bool {
        n <= self.config.target_dim + 1
    }

    fn local_pass(&self, rows: &[Vec<f64>], members: Vec<usize>) -> Result<LocalPass> {
        if self.is_small(members.len()) {
            let memberships = vec![BTreeSet::from([0]); members.len()];
            return Ok(LocalPass {
                members,
                memberships,
                n_clusters: 1,
            });
        }

        let subset: Vec<Vec<f64>> = members.iter().map(|&i| rows[i].clone()).collect();
        let reduced = self.local_projection(&subset)?;
        let local = self.clusterer().cluster(&reduced)?;

        Ok(LocalPass {
            members,
            memberships: local.memberships,
            n_clusters: local.n_components,
        })
    }

    /// Cluster ids for every embedding; a point may get zero or several ids.
    ///
    /// With `n <= target_dim + 1` points every point gets `{0}` and nothing
    /// is fitted.
    pub fn perform_clustering(&self, embeddings: &[Vec<f32>]) -> Result<Vec<BTreeSet<usize>>> {
        self.config.validate()?;
        let n = embeddings.len();
        if n == 0 {
            return Ok(Vec::new());
        }
        let rows = to_rows_f64(embeddings)?;
        if self.is_small(n) {
            return Ok(vec![BTreeSet::from([0]); n]);
        }

        let reduced = self.global_projection(&rows)?;
        let global = self.clusterer().cluster(&reduced)?;
        tracing::debug!(
            n_points = n,
            global_clusters = global.n_components,
            unassigned = global.unassigned().len(),
            "global clustering"
        );

        let groups = global_groups(&global);

        #[cfg(feature = "parallel")]
        let passes: Vec<Result<LocalPass>> = groups
            .into_par_iter()
            .map(|members| self.local_pass(&rows, members))
            .collect();

        #[cfg(not(feature = "parallel"))]
        let passes: Vec<Result<LocalPass>> = groups
            .into_iter()
            .map(|members| self.local_pass(&rows, members))
            .collect();

        let passes = passes.into_iter().collect::<Result<Vec<_>>>()?;
        let (result, total) = merge_local_passes(n, passes);

        tracing::debug!(total_clusters = total, "local clustering");
        Ok(result)
    }
}

/// Member lists of the global clusters that received at least one point,
/// in component order.
fn global_groups(global: &SoftAssignment) -> Vec<Vec<usize>> {
    (0..global.n_components)
        .map(|g| global.members_of(g))
        .filter(|members| !members.is_empty())
        .collect()
}

/// Shift each pass's local ids by the cluster count of the passes before it
/// and gather them per point. Returns the memberships and the total count.
fn merge_local_passes(n_points: usize, passes: Vec<LocalPass>) -> (Vec<BTreeSet<usize>>, usize) {
    let mut result = vec![BTreeSet::new(); n_points];
    let mut offset = 0;
    for pass in passes {
        for (&point, local) in pass.members.iter().zip(&pass.memberships) {
            result[point].extend(local.iter().map(|&c| c + offset));
        }
        offset += pass.n_clusters;
    }
    (result, offset)
}

/// Two-stage clustering with default settings except for the projection
/// dimension and membership threshold.
pub fn perform_clustering(
    embeddings: &[Vec<f32>],
    target_dim: usize,
    threshold: f64,
) -> Result<Vec<BTreeSet<usize>>> {
    let config = ClusteringConfig::default()
        .with_target_dim(target_dim)
        .with_threshold(threshold);
    TwoStageClustering::new(config).perform_clustering(embeddings)
}
