//! Batched ingestion into a vector store.
//!
//! Texts are embedded and handed to a [`VectorSink`] in fixed-size
//! batches. A failing batch is retried under a [`RetryPolicy`]; once the
//! budget is spent the batch is skipped, recorded in the [`IngestReport`],
//! and the run moves on. Only invalid arguments fail the whole call.

use std::ops::Range;

use crate::embed::{embed_checked, Embedder};
use crate::error::{Error, Result};
use crate::hierarchy::RaptorTree;
use crate::retry::{retry_with_backoff, RetryPolicy};

/// Destination for embedded texts, typically a nearest-neighbour index.
pub trait VectorSink {
    /// Store one batch; `texts` and `embeddings` have equal length.
    fn add(&mut self, texts: &[String], embeddings: &[Vec<f32>]) -> Result<()>;
}

impl<V: VectorSink + ?Sized> VectorSink for &mut V {
    fn add(&mut self, texts: &[String], embeddings: &[Vec<f32>]) -> Result<()> {
        (**self).add(texts, embeddings)
    }
}

/// A sink that keeps everything in memory.
#[derive(Debug, Clone, Default)]
pub struct MemorySink {
    /// Stored texts.
    pub texts: Vec<String>,
    /// Stored embeddings, parallel to `texts`.
    pub embeddings: Vec<Vec<f32>>,
}

impl MemorySink {
    /// Create an empty sink.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored entries.
    pub fn len(&self) -> usize {
        self.texts.len()
    }

    /// True when nothing is stored.
    pub fn is_empty(&self) -> bool {
        self.texts.is_empty()
    }
}

impl VectorSink for MemorySink {
    fn add(&mut self, texts: &[String], embeddings: &[Vec<f32>]) -> Result<()> {
        if texts.len() != embeddings.len() {
            return Err(Error::LengthMismatch {
                expected: texts.len(),
                found: embeddings.len(),
            });
        }
        self.texts.extend_from_slice(texts);
        self.embeddings.extend_from_slice(embeddings);
        Ok(())
    }
}

/// A batch that was given up on.
#[derive(Debug, Clone, PartialEq)]
pub struct SkippedBatch {
    /// Position of the batch.
    pub index: usize,
    /// Text indices covered by the batch.
    pub range: Range<usize>,
    /// The final error.
    pub error: Error,
}

/// Outcome of [`ingest_in_batches`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct IngestReport {
    /// Batches attempted.
    pub batches: usize,
    /// Texts stored successfully.
    pub ingested: usize,
    /// Batches skipped after exhausting retries.
    pub skipped: Vec<SkippedBatch>,
}

impl IngestReport {
    /// True when no batch was skipped.
    pub fn is_complete(&self) -> bool {
        self.skipped.is_empty()
    }

    /// Number of texts lost to skipped batches.
    pub fn skipped_texts(&self) -> usize {
        self.skipped.iter().map(|s| s.range.len()).sum()
    }
}

/// Embed and store `texts` in batches of `batch_size`.
pub fn ingest_in_batches<E, V>(
    texts: &[String],
    batch_size: usize,
    embedder: &E,
    sink: &mut V,
    policy: &RetryPolicy,
) -> Result<IngestReport>
where
    E: Embedder + ?Sized,
    V: VectorSink + ?Sized,
{
    if batch_size == 0 {
        return Err(Error::InvalidParameter {
            name: "batch_size",
            message: "must be > 0",
        });
    }
    policy.validate()?;

    let mut report = IngestReport::default();
    for (index, batch) in texts.chunks(batch_size).enumerate() {
        let start = index * batch_size;
        let range = start..start + batch.len();
        report.batches += 1;

        let outcome = retry_with_backoff(policy, "ingest batch", |_| {
            let embeddings = embed_checked(embedder, batch)?;
            sink.add(batch, &embeddings)
        });

        match outcome {
            Ok(()) => {
                report.ingested += batch.len();
                tracing::debug!(batch = index, size = batch.len(), "ingested batch");
            }
            Err(error) => {
                tracing::warn!(batch = index, range = ?range, error = %error, "skipping batch");
                report.skipped.push(SkippedBatch {
                    index,
                    range,
                    error,
                });
            }
        }
    }

    tracing::info!(
        batches = report.batches,
        ingested = report.ingested,
        skipped = report.skipped.len(),
        "ingestion finished"
    );
    Ok(report)
}

/// Ingest the collapsed texts of `tree`: leaves, then every summary.
pub fn ingest_tree<E, V>(
    tree: &RaptorTree,
    batch_size: usize,
    embedder: &E,
    sink: &mut V,
    policy: &RetryPolicy,
) -> Result<IngestReport>
where
    E: Embedder + ?Sized,
    V: VectorSink + ?Sized,
{
    ingest_in_batches(&tree.collapsed_texts(), batch_size, embedder, sink, policy)
}
