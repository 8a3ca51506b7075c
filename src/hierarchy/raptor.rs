//! RAPTOR-style hierarchical tree for recursive summarization.
//!
//! RAPTOR (Recursive Abstractive Processing for Tree-Organized Retrieval)
//! builds a tree by:
//! 1. Embedding the texts of the current level
//! 2. Soft-clustering the embeddings (global, then local)
//! 3. Summarizing the joined texts of each cluster
//! 4. Recursing on the summaries
//!
//! Recursion stops after `max_levels`, or as soon as a level produces at
//! most one distinct cluster. A build is all-or-nothing: any embedder,
//! clustering or summarizer error aborts it and no partial tree is
//! returned.
//!
//! ## References
//!
//! Sarthi et al. (2024). "RAPTOR: Recursive Abstractive Processing for
//! Tree-Organized Retrieval." ICLR 2024.

use super::level::{group_by_cluster, ClusterRow, LevelResult, SummaryRow};
use crate::cluster::{ClusteringConfig, TwoStageClustering};
use crate::embed::{embed_checked, Embedder};
use crate::error::{Error, Result};
use crate::summarize::{join_cluster_texts, Summarizer, DEFAULT_DELIMITER};
use serde::{Deserialize, Serialize};

#[cfg(feature = "parallel")]
use rayon::prelude::*;

/// Configuration for building a RAPTOR tree.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TreeConfig {
    /// Highest level number that may be built.
    pub max_levels: usize,
    /// Number of the first level.
    pub start_level: usize,
    /// Separator between texts of one cluster.
    pub delimiter: String,
    /// Clustering parameters used at every level.
    pub clustering: ClusteringConfig,
}

impl Default for TreeConfig {
    fn default() -> Self {
        Self {
            max_levels: 3,
            start_level: 1,
            delimiter: DEFAULT_DELIMITER.to_string(),
            clustering: ClusteringConfig::default(),
        }
    }
}

impl TreeConfig {
    /// Create a new tree configuration.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the highest level number.
    pub fn with_max_levels(mut self, max_levels: usize) -> Self {
        self.max_levels = max_levels;
        self
    }

    /// Set the first level number.
    pub fn with_start_level(mut self, start_level: usize) -> Self {
        self.start_level = start_level;
        self
    }

    /// Set the cluster text delimiter.
    pub fn with_delimiter(mut self, delimiter: impl Into<String>) -> Self {
        self.delimiter = delimiter.into();
        self
    }

    /// Replace the clustering parameters.
    pub fn with_clustering(mut self, clustering: ClusteringConfig) -> Self {
        self.clustering = clustering;
        self
    }

    /// Set the projection dimension.
    pub fn with_target_dim(mut self, target_dim: usize) -> Self {
        self.clustering.target_dim = target_dim;
        self
    }

    /// Set the membership threshold.
    pub fn with_threshold(mut self, threshold: f64) -> Self {
        self.clustering.threshold = threshold;
        self
    }

    /// Check the parameters before any external call.
    pub fn validate(&self) -> Result<()> {
        if self.start_level == 0 {
            return Err(Error::InvalidParameter {
                name: "start_level",
                message: "levels are numbered from 1",
            });
        }
        if self.max_levels == 0 {
            return Err(Error::InvalidParameter {
                name: "max_levels",
                message: "must be > 0",
            });
        }
        self.clustering.validate()
    }
}

/// A built RAPTOR tree: one [`LevelResult`] per level, bottom-up.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RaptorTree {
    levels: Vec<LevelResult>,
    config: TreeConfig,
}

impl RaptorTree {
    /// Assemble a tree from existing levels, e.g. after deserialising.
    ///
    /// No invariants are checked; use [`HealthCheck`](super::HealthCheck).
    pub fn from_levels(levels: Vec<LevelResult>, config: TreeConfig) -> Self {
        Self { levels, config }
    }

    /// Configuration the tree was built with.
    pub fn config(&self) -> &TreeConfig {
        &self.config
    }

    /// All levels, lowest first.
    pub fn levels(&self) -> &[LevelResult] {
        &self.levels
    }

    /// Level with number `level`.
    pub fn level(&self, level: usize) -> Option<&LevelResult> {
        self.levels.iter().find(|l| l.level == level)
    }

    /// Get the number of levels in the tree.
    pub fn depth(&self) -> usize {
        self.levels.len()
    }

    /// Check if tree is empty.
    pub fn is_empty(&self) -> bool {
        self.levels.is_empty()
    }

    /// The highest level.
    pub fn root(&self) -> Option<&LevelResult> {
        self.levels.last()
    }

    /// Assignment table of the first level: the original chunks.
    pub fn leaves(&self) -> &[ClusterRow] {
        self.levels
            .first()
            .map(|l| l.clusters.as_slice())
            .unwrap_or_default()
    }

    /// Summaries of every level, lowest level first.
    pub fn summaries(&self) -> impl Iterator<Item = &SummaryRow> {
        self.levels.iter().flat_map(|l| l.summaries.iter())
    }

    /// Iterate over levels.
    pub fn iter(&self) -> impl Iterator<Item = &LevelResult> {
        self.levels.iter()
    }

    /// Texts for "collapsed tree" retrieval.
    ///
    /// Leaf texts followed by every level's summaries in level order; this
    /// is the list handed to a vector store.
    pub fn collapsed_texts(&self) -> Vec<String> {
        self.leaves()
            .iter()
            .map(|row| row.text.clone())
            .chain(self.summaries().map(|row| row.summary.clone()))
            .collect()
    }

    /// Consume the tree, returning its levels.
    pub fn into_levels(self) -> Vec<LevelResult> {
        self.levels
    }
}

/// Builds [`RaptorTree`]s with injected embedding and summarization.
#[derive(Debug, Clone)]
pub struct RaptorBuilder<E, S> {
    embedder: E,
    summarizer: S,
    config: TreeConfig,
}

impl<E: Embedder, S: Summarizer> RaptorBuilder<E, S> {
    /// Create a builder.
    pub fn new(embedder: E, summarizer: S, config: TreeConfig) -> Self {
        Self {
            embedder,
            summarizer,
            config,
        }
    }

    /// Active configuration.
    pub fn config(&self) -> &TreeConfig {
        &self.config
    }

    /// Build a tree from already chunked texts.
    pub fn build(&self, texts: &[String]) -> Result<RaptorTree> {
        self.config.validate()?;
        if texts.is_empty() {
            return Err(Error::EmptyInput);
        }

        let engine = TwoStageClustering::new(self.config.clustering.clone());
        let mut levels = Vec::new();
        let mut level = self.config.start_level;
        let mut current = texts.to_vec();

        loop {
            let result = self.build_level(&engine, current, level)?;
            let unique = result.unique_cluster_count();
            tracing::info!("generated {unique} clusters at level {level}");

            let next = (level < self.config.max_levels && unique > 1).then(|| result.summary_texts());
            levels.push(result);
            match next {
                Some(summaries) => {
                    current = summaries;
                    level += 1;
                }
                None => break,
            }
        }

        Ok(RaptorTree {
            levels,
            config: self.config.clone(),
        })
    }

    fn build_level(
        &self,
        engine: &TwoStageClustering,
        texts: Vec<String>,
        level: usize,
    ) -> Result<LevelResult> {
        let embeddings = embed_checked(&self.embedder, &texts)?;
        let memberships = engine.perform_clustering(&embeddings)?;

        let clusters: Vec<ClusterRow> = texts
            .into_iter()
            .zip(embeddings)
            .zip(memberships)
            .map(|((text, embedding), clusters)| ClusterRow {
                text,
                embedding,
                clusters,
            })
            .collect();

        let groups = group_by_cluster(&clusters);
        let summarize = |(cluster, members): &(usize, Vec<&str>)| -> Result<SummaryRow> {
            let block = join_cluster_texts(members.iter().copied(), &self.config.delimiter);
            tracing::debug!(level, cluster, members = members.len(), chars = block.len(), "summarizing cluster");
            let summary = self.summarizer.summarize(&block)?;
            tracing::debug!(level, cluster, chars = summary.len(), "summarized cluster");
            Ok(SummaryRow {
                summary,
                level,
                cluster: *cluster,
            })
        };

        #[cfg(feature = "parallel")]
        let summaries = groups.par_iter().map(summarize).collect::<Result<Vec<_>>>()?;

        #[cfg(not(feature = "parallel"))]
        let summaries = groups.iter().map(summarize).collect::<Result<Vec<_>>>()?;

        Ok(LevelResult {
            level,
            clusters,
            summaries,
        })
    }
}

/// Build a tree starting at `level` with default clustering parameters.
pub fn recursive_embed_cluster_summarize<E, S>(
    texts: &[String],
    level: usize,
    max_levels: usize,
    embedder: &E,
    summarizer: &S,
) -> Result<RaptorTree>
where
    E: Embedder + ?Sized,
    S: Summarizer + ?Sized,
{
    let config = TreeConfig::default()
        .with_start_level(level)
        .with_max_levels(max_levels);
    RaptorBuilder::new(embedder, summarizer, config).build(texts)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embed::{self, HashingEmbedder};
    use crate::summarize::{self, TruncateSummarizer};
    use std::collections::BTreeSet;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn texts(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    fn topical_texts() -> Vec<String> {
        let topics = [
            ["apple", "banana", "cherry", "grape", "melon", "peach"],
            ["engine", "piston", "gear", "clutch", "brake", "axle"],
            ["violin", "cello", "flute", "oboe", "harp", "drum"],
        ];
        let mut out = Vec::new();
        for words in &topics {
            for i in 0..words.len() {
                let a = words[i % words.len()];
                let b = words[(i + 1) % words.len()];
                let c = words[(i + 3) % words.len()];
                out.push(format!("{a} {b} {c} {a}"));
            }
        }
        out
    }

    #[test]
    fn test_tree_config_default() {
        let config = TreeConfig::default();
        assert_eq!(config.max_levels, 3);
        assert_eq!(config.start_level, 1);
        assert_eq!(config.delimiter, "\n\n---\n\n");
        assert_eq!(config.clustering.target_dim, 10);
        assert_eq!(config.clustering.threshold, 0.1);
    }

    #[test]
    fn test_tree_config_from_json() {
        let config: TreeConfig =
            serde_json::from_str(r#"{"max_levels": 5, "clustering": {"threshold": 0.2}}"#).unwrap();
        assert_eq!(config.max_levels, 5);
        assert_eq!(config.start_level, 1);
        assert_eq!(config.clustering.threshold, 0.2);
        assert_eq!(config.clustering.target_dim, 10);
    }

    #[test]
    fn test_invalid_config_rejected_before_embedding() {
        let calls = AtomicUsize::new(0);
        let embedder = embed::from_fn(|t: &[String]| {
            calls.fetch_add(1, Ordering::SeqCst);
            Ok(vec![vec![1.0]; t.len()])
        });
        let builder = RaptorBuilder::new(
            &embedder,
            TruncateSummarizer::new(),
            TreeConfig::default().with_start_level(0),
        );
        assert!(builder.build(&texts(&["a"])).is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_empty_input_is_error() {
        let builder = RaptorBuilder::new(
            HashingEmbedder::new(8).unwrap(),
            TruncateSummarizer::new(),
            TreeConfig::default(),
        );
        assert_eq!(builder.build(&[]).unwrap_err(), Error::EmptyInput);
    }

    #[test]
    fn test_two_texts_form_one_cluster_and_stop() {
        let calls = AtomicUsize::new(0);
        let summarizer = summarize::from_fn(|text: &str| {
            calls.fetch_add(1, Ordering::SeqCst);
            Ok(format!("summary of {} chars", text.len()))
        });
        let embedder = HashingEmbedder::new(16).unwrap();

        let tree = recursive_embed_cluster_summarize(
            &texts(&["first chunk", "second chunk"]),
            1,
            3,
            &embedder,
            &summarizer,
        )
        .unwrap();

        assert_eq!(tree.depth(), 1);
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        let level = tree.root().unwrap();
        assert_eq!(level.level, 1);
        assert_eq!(level.unique_cluster_count(), 1);
        assert!(level.clusters.iter().all(|r| r.clusters == BTreeSet::from([0])));
        assert_eq!(level.summaries[0].cluster, 0);
        assert_eq!(level.summaries[0].level, 1);
    }

    #[test]
    fn test_cluster_texts_joined_in_input_order() {
        let tree = RaptorBuilder::new(
            HashingEmbedder::new(8).unwrap(),
            TruncateSummarizer::new(),
            TreeConfig::default(),
        )
        .build(&texts(&["one", "two", "three"]))
        .unwrap();

        assert_eq!(
            tree.root().unwrap().summaries[0].summary,
            "one\n\n---\n\ntwo\n\n---\n\nthree"
        );
    }

    #[test]
    fn test_near_identical_texts_collapse_to_one_cluster() {
        // Three points with target_dim 1 go through real clustering.
        let embedder = embed::from_fn(|t: &[String]| {
            Ok(t.iter()
                .map(|s| {
                    let bs = s.matches('B').count() as f32;
                    vec![1.0, 0.01 * bs, 0.02]
                })
                .collect())
        });
        let clustering = ClusteringConfig::default()
            .with_target_dim(1)
            .with_max_clusters(2);
        let config = TreeConfig::default().with_clustering(clustering);

        let tree = RaptorBuilder::new(embedder, TruncateSummarizer::new(), config)
            .build(&texts(&["A A A", "A A B", "B A A"]))
            .unwrap();

        assert_eq!(tree.depth(), 1);
        assert_eq!(tree.root().unwrap().unique_cluster_count(), 1);
    }

    #[test]
    fn test_summaries_are_valid_inputs_for_next_level() {
        let embedder = HashingEmbedder::new(16).unwrap();
        let identity = TruncateSummarizer::new();

        let first = recursive_embed_cluster_summarize(
            &texts(&["alpha beta", "gamma delta"]),
            1,
            1,
            &embedder,
            &identity,
        )
        .unwrap();
        let summaries = first.root().unwrap().summary_texts();

        let second = recursive_embed_cluster_summarize(&summaries, 2, 3, &embedder, &identity).unwrap();
        let level = second.level(2).unwrap();
        assert_eq!(level.clusters.len(), 1);
        assert_eq!(level.clusters[0].text, summaries[0]);
        assert_eq!(level.summaries[0].summary, summaries[0]);
        assert_eq!(level.summaries[0].level, 2);
    }

    #[test]
    fn test_max_levels_bounds_depth() {
        let tree = RaptorBuilder::new(
            HashingEmbedder::new(32).unwrap(),
            TruncateSummarizer::new().with_max_chars(60),
            TreeConfig::default().with_target_dim(2).with_max_levels(1),
        )
        .build(&topical_texts())
        .unwrap();
        assert_eq!(tree.depth(), 1);
    }

    #[test]
    fn test_recursion_follows_cluster_counts() {
        let config = TreeConfig::default().with_target_dim(2).with_max_levels(3);
        let tree = RaptorBuilder::new(
            HashingEmbedder::new(32).unwrap(),
            TruncateSummarizer::new().with_max_chars(80),
            config,
        )
        .build(&topical_texts())
        .unwrap();

        assert!(tree.depth() >= 1 && tree.depth() <= 3);
        let levels = tree.levels();
        for pair in levels.windows(2) {
            assert!(pair[0].unique_cluster_count() > 1);
            assert_eq!(pair[1].level, pair[0].level + 1);
            let inputs: Vec<String> = pair[1].clusters.iter().map(|r| r.text.clone()).collect();
            assert_eq!(inputs, pair[0].summary_texts());
        }
        let root = tree.root().unwrap();
        assert!(root.level == 3 || root.unique_cluster_count() <= 1);
    }

    #[test]
    fn test_builds_are_deterministic() {
        let build = || {
            RaptorBuilder::new(
                HashingEmbedder::new(32).unwrap(),
                TruncateSummarizer::new().with_max_chars(80),
                TreeConfig::default().with_target_dim(2),
            )
            .build(&topical_texts())
            .unwrap()
        };
        assert_eq!(build(), build());
    }

    #[test]
    fn test_summarizer_failure_aborts_build() {
        let summarizer = summarize::from_fn(|_: &str| Err(Error::Summarization("timeout".into())));
        let err = RaptorBuilder::new(HashingEmbedder::new(8).unwrap(), summarizer, TreeConfig::default())
            .build(&texts(&["a", "b"]))
            .unwrap_err();
        assert_eq!(err, Error::Summarization("timeout".into()));
    }

    #[test]
    fn test_embedder_breaking_length_aborts_build() {
        let embedder = embed::from_fn(|_: &[String]| Ok(vec![vec![1.0, 0.0]]));
        let err = RaptorBuilder::new(embedder, TruncateSummarizer::new(), TreeConfig::default())
            .build(&texts(&["a", "b"]))
            .unwrap_err();
        assert_eq!(err, Error::LengthMismatch { expected: 2, found: 1 });
    }

    #[test]
    fn test_collapsed_texts_lists_leaves_then_summaries() {
        let tree = RaptorBuilder::new(
            HashingEmbedder::new(8).unwrap(),
            summarize::from_fn(|_: &str| Ok("S".to_string())),
            TreeConfig::default(),
        )
        .build(&texts(&["x", "y"]))
        .unwrap();
        assert_eq!(tree.collapsed_texts(), texts(&["x", "y", "S"]));
    }
}
