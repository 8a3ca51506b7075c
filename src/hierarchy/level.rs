//! Per-level tables of a tree build.
//!
//! A level pairs an assignment table (one [`ClusterRow`] per input text)
//! with a summary table (one [`SummaryRow`] per cluster id that received at
//! least one text).

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

/// One input text with its embedding and cluster memberships.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClusterRow {
    /// The text unit: a chunk at the first level, a summary above it.
    pub text: String,
    /// Embedding computed for this text at this level.
    pub embedding: Vec<f32>,
    /// Cluster ids; empty when the text joined no cluster.
    pub clusters: BTreeSet<usize>,
}

/// One (text, cluster) pair of the expanded assignment relation.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ClusterMembership<'a> {
    /// Index of the text within the level.
    pub index: usize,
    /// The text.
    pub text: &'a str,
    /// Its embedding.
    pub embedding: &'a [f32],
    /// One of its cluster ids.
    pub cluster: usize,
}

/// Summary of one cluster.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SummaryRow {
    /// Summarizer output.
    pub summary: String,
    /// Level the cluster was formed at.
    pub level: usize,
    /// Cluster id, unique within the level.
    pub cluster: usize,
}

/// Result of one embed-cluster-summarize pass.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LevelResult {
    /// Level number, starting at the configured start level.
    pub level: usize,
    /// Assignment table in input order.
    pub clusters: Vec<ClusterRow>,
    /// Summary table in first-appearance order of cluster ids.
    pub summaries: Vec<SummaryRow>,
}

impl LevelResult {
    /// Flatten the assignment table into one entry per membership.
    pub fn expanded(&self) -> Vec<ClusterMembership<'_>> {
        expand(&self.clusters)
    }

    /// Number of distinct cluster ids in the summary table.
    pub fn unique_cluster_count(&self) -> usize {
        self.summaries
            .iter()
            .map(|row| row.cluster)
            .collect::<BTreeSet<_>>()
            .len()
    }

    /// Summary texts in table order; the input of the next level.
    pub fn summary_texts(&self) -> Vec<String> {
        self.summaries.iter().map(|row| row.summary.clone()).collect()
    }

    /// Summary of cluster `cluster`, if it exists.
    pub fn summary_of(&self, cluster: usize) -> Option<&SummaryRow> {
        self.summaries.iter().find(|row| row.cluster == cluster)
    }

    /// Texts assigned to `cluster`, in input order.
    pub fn members_of(&self, cluster: usize) -> Vec<&str> {
        self.clusters
            .iter()
            .filter(|row| row.clusters.contains(&cluster))
            .map(|row| row.text.as_str())
            .collect()
    }

    /// Indices of texts that joined no cluster.
    pub fn unassigned(&self) -> Vec<usize> {
        self.clusters
            .iter()
            .enumerate()
            .filter(|(_, row)| row.clusters.is_empty())
            .map(|(i, _)| i)
            .collect()
    }
}

pub(crate) fn expand(rows: &[ClusterRow]) -> Vec<ClusterMembership<'_>> {
    rows.iter()
        .enumerate()
        .flat_map(|(index, row)| {
            row.clusters.iter().map(move |&cluster| ClusterMembership {
                index,
                text: &row.text,
                embedding: &row.embedding,
                cluster,
            })
        })
        .collect()
}

/// Group the expanded relation by cluster id.
///
/// Groups appear in order of each id's first appearance in the relation;
/// texts within a group keep relation order.
pub fn group_by_cluster(rows: &[ClusterRow]) -> Vec<(usize, Vec<&str>)> {
    let mut groups: Vec<(usize, Vec<&str>)> = Vec::new();
    for membership in expand(rows) {
        match groups.iter_mut().find(|(id, _)| *id == membership.cluster) {
            Some((_, texts)) => texts.push(membership.text),
            None => groups.push((membership.cluster, vec![membership.text])),
        }
    }
    groups
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(text: &str, clusters: &[usize]) -> ClusterRow {
        ClusterRow {
            text: text.to_string(),
            embedding: vec![0.0, 1.0],
            clusters: clusters.iter().copied().collect(),
        }
    }

    #[test]
    fn test_expanded_repeats_multi_membership_rows() {
        let level = LevelResult {
            level: 1,
            clusters: vec![row("a", &[2]), row("b", &[0, 2]), row("c", &[])],
            summaries: Vec::new(),
        };
        let expanded = level.expanded();
        let pairs: Vec<(usize, usize)> = expanded.iter().map(|m| (m.index, m.cluster)).collect();
        assert_eq!(pairs, vec![(0, 2), (1, 0), (1, 2)]);
        assert_eq!(level.unassigned(), vec![2]);
        assert_eq!(level.members_of(2), vec!["a", "b"]);
    }

    #[test]
    fn test_group_by_first_appearance() {
        let rows = vec![row("a", &[3]), row("b", &[1, 3]), row("c", &[1])];
        let groups = group_by_cluster(&rows);
        assert_eq!(groups, vec![(3, vec!["a", "b"]), (1, vec!["b", "c"])]);
    }

    #[test]
    fn test_unique_cluster_count() {
        let level = LevelResult {
            level: 2,
            clusters: Vec::new(),
            summaries: vec![
                SummaryRow { summary: "x".into(), level: 2, cluster: 0 },
                SummaryRow { summary: "y".into(), level: 2, cluster: 4 },
            ],
        };
        assert_eq!(level.unique_cluster_count(), 2);
        assert_eq!(level.summary_texts(), vec!["x", "y"]);
        assert_eq!(level.summary_of(4).map(|s| s.summary.as_str()), Some("y"));
        assert!(level.summary_of(1).is_none());
    }
}
