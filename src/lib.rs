//! # raptor-tree
//!
//! Recursive cluster-and-summarize trees (RAPTOR) for retrieval-augmented
//! generation.
//!
//! Chunks are embedded, soft-clustered, and each cluster's text is
//! summarized; the summaries become the next level's input until the tree
//! collapses to a single cluster or reaches its depth limit.
//!
//! ```text
//! texts ─► embed ─► reduce (global) ─► GMM ─► reduce (local) ─► GMM
//!   ▲                                                          │
//!   └───────────── summaries ◄── summarize ◄── group by id ◄───┘
//! ```
//!
//! Embedding and summarization are supplied by the caller through the
//! [`Embedder`] and [`Summarizer`] traits; this crate has no network or
//! model dependencies.
//!
//! ```rust
//! use raptor_tree::{HashingEmbedder, RaptorBuilder, TreeConfig, TruncateSummarizer};
//!
//! let texts: Vec<String> = ["a first chunk", "a second chunk"]
//!     .iter()
//!     .map(|s| s.to_string())
//!     .collect();
//!
//! let tree = RaptorBuilder::new(
//!     HashingEmbedder::new(64).unwrap(),
//!     TruncateSummarizer::new().with_max_chars(200),
//!     TreeConfig::default(),
//! )
//! .build(&texts)
//! .unwrap();
//!
//! assert_eq!(tree.depth(), 1);
//! assert_eq!(tree.collapsed_texts().len(), 3);
//! ```
//!
//! With the `parallel` feature, local clustering passes and per-cluster
//! summarization run on rayon; results are identical to a sequential run.

pub mod cluster;
pub mod embed;
/// Error types used across `raptor-tree`.
pub mod error;
pub mod hierarchy;
pub mod ingest;
pub mod reduce;
pub mod retry;
pub mod summarize;

pub use error::{Error, Result};

pub use cluster::{perform_clustering, ClusteringConfig, Gmm, SoftClusterer, TwoStageClustering};
pub use embed::{Embedder, HashingEmbedder};
pub use hierarchy::{
    recursive_embed_cluster_summarize, HealthCheck, LevelResult, RaptorBuilder, RaptorTree,
    TreeConfig,
};
pub use ingest::{ingest_in_batches, IngestReport, MemorySink, VectorSink};
pub use reduce::{Metric, Umap};
pub use retry::{RetryPolicy, RetryingEmbedder, RetryingSummarizer};
pub use summarize::{PromptSummarizer, Summarizer, TruncateSummarizer};
