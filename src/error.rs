//! Error types used across `raptor-tree`.

/// Result alias for `raptor-tree`.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors returned by reduction, clustering, and tree construction.
///
/// Too few points for a mixture fit is not an error: the clustering engine
/// assigns such inputs to a single cluster instead.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum Error {
    /// Input was empty.
    #[error("empty input provided")]
    EmptyInput,

    /// Vectors of differing dimension were mixed.
    #[error("dimension mismatch: expected {expected}, found {found}")]
    DimensionMismatch {
        /// Expected dimension.
        expected: usize,
        /// Found dimension.
        found: usize,
    },

    /// An embedder returned a different number of vectors than texts given.
    #[error("embedder returned {found} vectors for {expected} texts")]
    LengthMismatch {
        /// Number of texts submitted.
        expected: usize,
        /// Number of vectors returned.
        found: usize,
    },

    /// Invalid number of clusters requested.
    #[error("cannot create {requested} clusters from {n_items} items")]
    InvalidClusterCount {
        /// Requested count.
        requested: usize,
        /// Number of items.
        n_items: usize,
    },

    /// Invalid parameter value.
    #[error("invalid parameter '{name}': {message}")]
    InvalidParameter {
        /// Parameter name.
        name: &'static str,
        /// Error message.
        message: &'static str,
    },

    /// A mixture fit broke down numerically (singular covariance, NaN likelihood).
    #[error("degenerate model: {0}")]
    DegenerateModel(String),

    /// The embedding collaborator failed.
    #[error("embedding failed: {0}")]
    Embedding(String),

    /// The summarization collaborator failed.
    #[error("summarization failed: {0}")]
    Summarization(String),

    /// A vector sink rejected a batch.
    #[error("vector sink error: {0}")]
    Sink(String),

    /// An operation kept failing until the retry budget ran out.
    #[error("gave up after {attempts} attempts: {last}")]
    RetriesExhausted {
        /// Total attempts made, including the first.
        attempts: usize,
        /// The last error observed.
        last: Box<Error>,
    },

    /// Generic error with message.
    #[error("{0}")]
    Other(String),
}

impl Error {
    /// True for failures of an external collaborator (embedder, summarizer, sink).
    pub fn is_external(&self) -> bool {
        match self {
            Error::Embedding(_) | Error::Summarization(_) | Error::Sink(_) => true,
            Error::RetriesExhausted { last, .. } => last.is_external(),
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_messages() {
        let err = Error::InvalidClusterCount {
            requested: 5,
            n_items: 2,
        };
        assert_eq!(err.to_string(), "cannot create 5 clusters from 2 items");

        let err = Error::LengthMismatch {
            expected: 3,
            found: 2,
        };
        assert_eq!(err.to_string(), "embedder returned 2 vectors for 3 texts");
    }

    #[test]
    fn test_is_external_sees_through_retries() {
        let err = Error::RetriesExhausted {
            attempts: 4,
            last: Box::new(Error::Summarization("timeout".into())),
        };
        assert!(err.is_external());
        assert!(err.to_string().contains("timeout"));
        assert!(!Error::EmptyInput.is_external());
    }
}
