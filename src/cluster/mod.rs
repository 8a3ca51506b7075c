//! Clustering of embeddings ahead of summarization.
//!
//! ## Soft Clustering
//!
//! A text chunk is rarely about one thing. A paragraph on GPU kernels for
//! attention belongs to both "hardware" and "transformers"; forcing a single
//! label loses one of the two summaries it should contribute to. Each point
//! therefore receives a *set* of cluster ids, possibly empty:
//!
//! ```text
//! P(k | x) > threshold   ⇒   k ∈ clusters(x)
//! ```
//!
//! with posteriors from a Gaussian mixture fitted by EM ([`Gmm`]).
//!
//! ## Choosing k
//!
//! [`ClusterCountSelector`] fits every candidate count and keeps the one
//! with the lowest Bayesian Information Criterion:
//!
//! ```text
//! BIC = -2 · log L + p · ln n
//! ```
//!
//! where `p` counts the free parameters of the mixture. The penalty grows
//! with `k`, so extra components must pay for themselves in likelihood.
//!
//! ## Two Stages
//!
//! [`TwoStageClustering`] clusters a level coarsely on a global projection,
//! then re-projects and re-clusters each coarse cluster on its own. Small
//! levels (`n <= target_dim + 1`) skip fitting entirely and form one
//! cluster.
//!
//! ## Usage
//!
//! ```rust
//! use raptor_tree::cluster::{perform_clustering, Gmm, SoftClustering};
//!
//! let points = vec![
//!     vec![0.0, 0.1], vec![0.1, 0.0], vec![0.05, 0.05],
//!     vec![9.0, 9.1], vec![9.1, 9.0], vec![9.05, 9.05],
//! ];
//!
//! let probs = Gmm::new().with_n_components(2).fit_predict_proba(&points).unwrap();
//! assert_eq!(probs.len(), 6);
//!
//! // Few points: everything lands in cluster 0.
//! let ids = perform_clustering(&points, 10, 0.1).unwrap();
//! assert!(ids.iter().all(|set| set.contains(&0)));
//! ```

mod data;
mod engine;
mod gmm;
mod kmeans;
mod select;
mod soft;
mod traits;

pub(crate) use data::to_rows_f64;
pub use engine::{perform_clustering, ClusteringConfig, TwoStageClustering};
pub use gmm::{CovarianceType, FittedGmm, Gmm};
pub use kmeans::{Kmeans, KmeansFit};
pub use select::ClusterCountSelector;
pub use soft::{SoftAssignment, SoftClusterer};
pub use traits::{memberships_above, Clustering, SoftClustering};
