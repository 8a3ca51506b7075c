//! Text embedding.
//!
//! Embedding models live outside this crate. The tree builder only needs a
//! batched, length-preserving function from texts to equal-length vectors;
//! HTTP clients, local models and test doubles all plug in through
//! [`Embedder`].
//!
//! [`HashingEmbedder`] is a dependency-free baseline: a bag of hashed word
//! features, L2-normalised so cosine distance behaves.

use crate::error::{Error, Result};

/// Maps texts to fixed-dimension vectors, one per text, in input order.
pub trait Embedder: Send + Sync {
    /// Embed a batch of texts.
    fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>>;
}

impl<E: Embedder + ?Sized> Embedder for &E {
    fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        (**self).embed(texts)
    }
}

impl<E: Embedder + ?Sized> Embedder for Box<E> {
    fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        (**self).embed(texts)
    }
}

/// A closure-based embedder.
#[derive(Clone)]
pub struct FnEmbedder<F> {
    f: F,
}

impl<F> FnEmbedder<F> {
    /// Create an embedder from a function.
    pub fn new(f: F) -> Self {
        Self { f }
    }
}

impl<F> Embedder for FnEmbedder<F>
where
    F: Fn(&[String]) -> Result<Vec<Vec<f32>>> + Send + Sync,
{
    fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        (self.f)(texts)
    }
}

/// Create an embedder from a closure.
pub fn from_fn<F>(f: F) -> FnEmbedder<F>
where
    F: Fn(&[String]) -> Result<Vec<Vec<f32>>> + Send + Sync,
{
    FnEmbedder::new(f)
}

/// Embed `texts` and check the output shape.
///
/// Fails with [`Error::LengthMismatch`] when the embedder returned a
/// different number of vectors than texts, and with
/// [`Error::DimensionMismatch`] when the vectors disagree in length.
pub fn embed_checked<E: Embedder + ?Sized>(embedder: &E, texts: &[String]) -> Result<Vec<Vec<f32>>> {
    if texts.is_empty() {
        return Ok(Vec::new());
    }
    let vectors = embedder.embed(texts)?;
    if vectors.len() != texts.len() {
        return Err(Error::LengthMismatch {
            expected: texts.len(),
            found: vectors.len(),
        });
    }

    let dim = vectors[0].len();
    if dim == 0 {
        return Err(Error::Embedding("embedder returned zero-length vectors".into()));
    }
    if let Some(bad) = vectors.iter().find(|v| v.len() != dim) {
        return Err(Error::DimensionMismatch {
            expected: dim,
            found: bad.len(),
        });
    }
    Ok(vectors)
}

const FNV_OFFSET: u64 = 0xcbf2_9ce4_8422_2325;
const FNV_PRIME: u64 = 0x0000_0100_0000_01b3;

fn fnv1a(bytes: &[u8]) -> u64 {
    bytes.iter().fold(FNV_OFFSET, |h, &b| (h ^ u64::from(b)).wrapping_mul(FNV_PRIME))
}

/// Feature-hashing bag-of-words embedder.
///
/// Lowercased alphanumeric tokens are hashed (FNV-1a) into `dim` buckets
/// with a hash-derived sign. Texts without tokens map to the zero vector.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HashingEmbedder {
    dim: usize,
}

impl HashingEmbedder {
    /// Embedder producing `dim`-dimensional vectors.
    pub fn new(dim: usize) -> Result<Self> {
        if dim == 0 {
            return Err(Error::InvalidParameter {
                name: "dim",
                message: "must be > 0",
            });
        }
        Ok(Self { dim })
    }

    /// Output dimension.
    pub fn dim(&self) -> usize {
        self.dim
    }

    /// Embed a single text.
    pub fn embed_one(&self, text: &str) -> Vec<f32> {
        let mut v = vec![0.0f32; self.dim];
        for token in text
            .split(|c: char| !c.is_alphanumeric())
            .filter(|t| !t.is_empty())
        {
            let h = fnv1a(token.to_lowercase().as_bytes());
            let bucket = (h % self.dim as u64) as usize;
            let sign = if h >> 63 == 0 { 1.0 } else { -1.0 };
            v[bucket] += sign;
        }

        let norm = v.iter().map(|x| x * x).sum::<f32>().sqrt();
        if norm > 0.0 {
            v.iter_mut().for_each(|x| *x /= norm);
        }
        v
    }
}

impl Embedder for HashingEmbedder {
    fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        Ok(texts.iter().map(|t| self.embed_one(t)).collect())
    }
}
