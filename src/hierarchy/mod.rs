//! Recursive cluster-summarize trees.
//!
//! # The Core Insight
//!
//! Information exists at multiple scales. A single question might need:
//!
//! ```text
//! Question                        │ Scale Needed
//! ────────────────────────────────┼──────────────────────
//! "What year was X founded?"      │ Single chunk
//! "Summarize the main themes"     │ Top-level summary
//! "How does A relate to B?"       │ Cross-section synthesis
//! ```
//!
//! A RAPTOR tree indexes every scale at once: the original chunks plus the
//! summaries of progressively broader clusters.
//!
//! ```text
//! Level 3:        [Root Summary]
//!                 /             \
//! Level 2:  [Summary A]      [Summary B]
//!           /    |    \      /    |    \
//! Level 1: [s1] [s2] [s3]  [s4] [s5] [s6]
//!          /|\   |     |\   |     |   /|\
//!          ... original chunks (level 1 inputs) ...
//! ```
//!
//! Soft clustering means a chunk can feed several summaries, so the
//! structure is a layered DAG rather than a strict tree. It is stored as an
//! ordered list of [`LevelResult`]s; level `k + 1`'s inputs are level `k`'s
//! summaries.
//!
//! # Module Overview
//!
//! - [`RaptorBuilder`] / [`recursive_embed_cluster_summarize`]: the build
//! - [`LevelResult`]: assignment and summary tables of one level
//! - [`HealthCheck`]: invariant checks on a finished tree
//!
//! # References
//!
//! - Sarthi et al. (2024). "RAPTOR: Recursive Abstractive Processing for
//!   Tree-Organized Retrieval." ICLR.

mod level;
mod raptor;
mod validate;

pub use level::{group_by_cluster, ClusterMembership, ClusterRow, LevelResult, SummaryRow};
pub use raptor::{recursive_embed_cluster_summarize, RaptorBuilder, RaptorTree, TreeConfig};
pub use validate::{
    validate_level, HealthCheck, HealthReport, IssueKind, Severity, ValidationIssue,
    ValidationReport,
};
