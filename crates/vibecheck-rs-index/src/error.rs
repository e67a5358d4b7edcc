//! Error types for vector index operations.

use vibecheck_rs_protocol::EmbeddingSource;

/// Errors returned by vector index implementations.
#[derive(Debug, thiserror::Error)]
pub enum IndexError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),
    /// Vectors from a different embedding path than the one the index holds.
    #[error("embedding source mismatch: index holds {expected}, got {actual}")]
    SourceMismatch {
        expected: EmbeddingSource,
        actual: EmbeddingSource,
    },
    #[error("dimension mismatch: index holds {expected}-d vectors, got {actual}-d")]
    DimensionMismatch { expected: usize, actual: usize },
    /// An entry that cannot be stored as given.
    #[error("invalid entry: {0}")]
    InvalidEntry(String),
}
