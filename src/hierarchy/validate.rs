//! Tree validation and health checking.
//!
//! Verifies the invariants a completed build must satisfy:
//! - Level numbers are contiguous from the start level
//! - Each level's summary table has one row per observed cluster id
//! - Each level's input is exactly the previous level's summaries
//! - Recursion stopped for the right reason
//!
//! # Example
//!
//! ```rust,ignore
//! use raptor_tree::hierarchy::HealthCheck;
//!
//! let report = tree.health_check();
//! if !report.is_healthy() {
//!     for issue in report.validation.issues {
//!         eprintln!("{}", issue);
//!     }
//! }
//! ```

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use super::{LevelResult, RaptorTree};

/// How serious an issue is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Severity {
    /// Expected in normal output.
    Info,
    /// Legal but suspicious.
    Warning,
    /// An invariant of a finished build does not hold.
    Error,
    /// The level sequence itself is broken.
    Critical,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Severity::Info => write!(f, "INFO"),
            Severity::Warning => write!(f, "WARN"),
            Severity::Error => write!(f, "ERROR"),
            Severity::Critical => write!(f, "CRITICAL"),
        }
    }
}

/// The invariant a [`ValidationIssue`] reports on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IssueKind {
    /// The tree holds no levels.
    NoLevels,
    /// A level number is not `start_level + position`.
    NonContiguousLevels,
    /// Rows of one level disagree on embedding length.
    InconsistentEmbeddingDim,
    /// Two summary rows name the same cluster.
    DuplicateSummary,
    /// A summary row's level differs from its table's level.
    WrongSummaryLevel,
    /// A summary exists for a cluster nobody belongs to.
    SummaryWithoutMembers,
    /// A cluster has members but no summary.
    MissingSummary,
    /// Some texts joined no cluster.
    UnassignedTexts,
    /// A level with at most one cluster was summarized again.
    RecursedPastSingleCluster,
    /// A level's input is not the previous level's summaries.
    BrokenChaining,
    /// The last level is beyond `max_levels`.
    ExceedsMaxLevels,
    /// The last level still has several clusters and is below `max_levels`.
    StoppedEarly,
}

impl IssueKind {
    /// Severity attached to this kind of issue.
    pub fn severity(self) -> Severity {
        match self {
            IssueKind::UnassignedTexts => Severity::Info,
            IssueKind::NoLevels | IssueKind::StoppedEarly => Severity::Warning,
            IssueKind::NonContiguousLevels => Severity::Critical,
            _ => Severity::Error,
        }
    }

    fn message(self) -> &'static str {
        match self {
            IssueKind::NoLevels => "tree has no levels",
            IssueKind::NonContiguousLevels => "level numbers are not contiguous",
            IssueKind::InconsistentEmbeddingDim => "inconsistent embedding dimension",
            IssueKind::DuplicateSummary => "duplicate summary for cluster",
            IssueKind::WrongSummaryLevel => "summary carries wrong level number",
            IssueKind::SummaryWithoutMembers => "summary for cluster with no members",
            IssueKind::MissingSummary => "cluster has members but no summary",
            IssueKind::UnassignedTexts => "texts joined no cluster",
            IssueKind::RecursedPastSingleCluster => "recursed past a single-cluster level",
            IssueKind::BrokenChaining => "level input differs from previous summaries",
            IssueKind::ExceedsMaxLevels => "tree exceeds max_levels",
            IssueKind::StoppedEarly => "stopped early with several clusters",
        }
    }
}

/// One finding of a health check.
#[derive(Debug, Clone)]
pub struct ValidationIssue {
    /// Which invariant is affected.
    pub kind: IssueKind,
    /// Level number involved, if any.
    pub level: Option<usize>,
    /// Cluster id involved, if any.
    pub cluster: Option<usize>,
    /// Free-form detail.
    pub context: Option<String>,
}

impl ValidationIssue {
    pub fn new(kind: IssueKind) -> Self {
        Self {
            kind,
            level: None,
            cluster: None,
            context: None,
        }
    }

    pub fn with_level(mut self, level: usize) -> Self {
        self.level = Some(level);
        self
    }

    pub fn with_cluster(mut self, cluster: usize) -> Self {
        self.cluster = Some(cluster);
        self
    }

    pub fn with_context(mut self, ctx: impl Into<String>) -> Self {
        self.context = Some(ctx.into());
        self
    }

    pub fn severity(&self) -> Severity {
        self.kind.severity()
    }
}

impl fmt::Display for ValidationIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.severity(), self.kind.message())?;
        match (self.level, self.cluster) {
            (Some(l), Some(c)) => write!(f, " (level {l}, cluster {c})")?,
            (Some(l), None) => write!(f, " (level {l})")?,
            (None, Some(c)) => write!(f, " (cluster {c})")?,
            (None, None) => {}
        }
        if let Some(ctx) = &self.context {
            write!(f, ": {ctx}")?;
        }
        Ok(())
    }
}

/// Issues collected over one or more levels.
#[derive(Debug, Clone, Default)]
pub struct ValidationReport {
    pub issues: Vec<ValidationIssue>,
}

impl ValidationReport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, issue: ValidationIssue) {
        self.issues.push(issue);
    }

    /// Append every issue of `other`.
    pub fn merge(&mut self, other: ValidationReport) {
        self.issues.extend(other.issues);
    }

    /// No issue at [`Severity::Error`] or above.
    pub fn is_healthy(&self) -> bool {
        !self.issues.iter().any(|i| i.severity() >= Severity::Error)
    }

    pub fn is_clean(&self) -> bool {
        self.issues.is_empty()
    }

    /// Issues of the given kind.
    pub fn of_kind(&self, kind: IssueKind) -> impl Iterator<Item = &ValidationIssue> {
        self.issues.iter().filter(move |i| i.kind == kind)
    }

    /// Issue count per severity.
    pub fn counts(&self) -> BTreeMap<Severity, usize> {
        let mut counts = BTreeMap::new();
        for issue in &self.issues {
            *counts.entry(issue.severity()).or_default() += 1;
        }
        counts
    }
}

impl fmt::Display for ValidationReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_clean() {
            return write!(f, "Validation passed: no issues found");
        }

        let parts: Vec<String> = self
            .counts()
            .iter()
            .rev()
            .map(|(severity, count)| format!("{count} {severity}"))
            .collect();
        writeln!(f, "Validation report: {}", parts.join(", "))?;
        for issue in &self.issues {
            writeln!(f, "  {issue}")?;
        }
        Ok(())
    }
}

/// Health report with additional statistics.
#[derive(Debug, Clone)]
pub struct HealthReport {
    /// Validation issues.
    pub validation: ValidationReport,
    /// Number of levels.
    pub level_count: usize,
    /// Number of texts at the first level.
    pub leaf_count: usize,
    /// Summaries across all levels.
    pub summary_count: usize,
    /// Distinct cluster ids per level, lowest level first.
    pub clusters_per_level: Vec<usize>,
}

impl HealthReport {
    /// Check if the tree is healthy (no errors or critical issues).
    pub fn is_healthy(&self) -> bool {
        self.validation.is_healthy()
    }
}

impl fmt::Display for HealthReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Tree Health Report")?;
        writeln!(f, "==================")?;
        writeln!(f, "Levels: {}", self.level_count)?;
        writeln!(f, "Leaves: {} ({} summaries)", self.leaf_count, self.summary_count)?;
        writeln!(f, "Clusters per level: {:?}", self.clusters_per_level)?;
        writeln!(f)?;
        write!(f, "{}", self.validation)
    }
}

/// Trait for types that can be health-checked.
pub trait HealthCheck {
    /// Perform a health check and return a report.
    fn health_check(&self) -> HealthReport;

    /// Quick check: returns true if healthy.
    fn is_healthy(&self) -> bool {
        self.health_check().is_healthy()
    }
}

/// Check the invariants of a single level.
pub fn validate_level(level: &LevelResult) -> ValidationReport {
    let mut report = ValidationReport::new();
    let lvl = level.level;

    if let Some(first) = level.clusters.first() {
        let dim = first.embedding.len();
        if let Some(bad) = level.clusters.iter().position(|r| r.embedding.len() != dim) {
            report.add(
                ValidationIssue::new(IssueKind::InconsistentEmbeddingDim)
                    .with_level(lvl)
                    .with_context(format!("row {} has {}, expected {}", bad, level.clusters[bad].embedding.len(), dim)),
            );
        }
    }

    let mut summarized = BTreeSet::new();
    for row in &level.summaries {
        if !summarized.insert(row.cluster) {
            report.add(
                ValidationIssue::new(IssueKind::DuplicateSummary)
                    .with_level(lvl)
                    .with_cluster(row.cluster),
            );
        }
        if row.level != lvl {
            report.add(
                ValidationIssue::new(IssueKind::WrongSummaryLevel)
                    .with_level(lvl)
                    .with_cluster(row.cluster)
                    .with_context(format!("summary says level {}", row.level)),
            );
        }
    }

    let observed: BTreeSet<usize> = level.expanded().iter().map(|m| m.cluster).collect();
    for &cluster in summarized.difference(&observed) {
        report.add(
            ValidationIssue::new(IssueKind::SummaryWithoutMembers)
                .with_level(lvl)
                .with_cluster(cluster),
        );
    }
    for &cluster in observed.difference(&summarized) {
        report.add(
            ValidationIssue::new(IssueKind::MissingSummary)
                .with_level(lvl)
                .with_cluster(cluster),
        );
    }

    let unassigned = level.unassigned().len();
    if unassigned > 0 {
        report.add(
            ValidationIssue::new(IssueKind::UnassignedTexts)
                .with_level(lvl)
                .with_context(format!("{unassigned} of {}", level.clusters.len())),
        );
    }

    report
}

impl HealthCheck for RaptorTree {
    fn health_check(&self) -> HealthReport {
        let config = self.config();
        let levels = self.levels();
        let mut validation = ValidationReport::new();

        if levels.is_empty() {
            validation.add(ValidationIssue::new(IssueKind::NoLevels));
        }

        for (offset, level) in levels.iter().enumerate() {
            let expected = config.start_level + offset;
            if level.level != expected {
                validation.add(
                    ValidationIssue::new(IssueKind::NonContiguousLevels)
                        .with_level(level.level)
                        .with_context(format!("expected level {expected}")),
                );
            }
            validation.merge(validate_level(level));
        }

        for pair in levels.windows(2) {
            let (lower, upper) = (&pair[0], &pair[1]);
            if lower.unique_cluster_count() <= 1 {
                validation.add(
                    ValidationIssue::new(IssueKind::RecursedPastSingleCluster)
                        .with_level(lower.level),
                );
            }
            let inputs: Vec<&str> = upper.clusters.iter().map(|r| r.text.as_str()).collect();
            let summaries: Vec<&str> = lower.summaries.iter().map(|r| r.summary.as_str()).collect();
            if inputs != summaries {
                validation.add(
                    ValidationIssue::new(IssueKind::BrokenChaining)
                        .with_level(upper.level)
                        .with_context(format!("{} inputs, {} summaries", inputs.len(), summaries.len())),
                );
            }
        }

        if let Some(root) = levels.last() {
            if root.level > config.max_levels.max(config.start_level) {
                validation.add(
                    ValidationIssue::new(IssueKind::ExceedsMaxLevels)
                        .with_level(root.level)
                        .with_context(format!("max_levels {}", config.max_levels)),
                );
            } else if root.level < config.max_levels && root.unique_cluster_count() > 1 {
                validation.add(
                    ValidationIssue::new(IssueKind::StoppedEarly)
                        .with_level(root.level),
                );
            }
        }

        HealthReport {
            validation,
            level_count: levels.len(),
            leaf_count: self.leaves().len(),
            summary_count: self.summaries().count(),
            clusters_per_level: levels.iter().map(|l| l.unique_cluster_count()).collect(),
        }
    }
}
