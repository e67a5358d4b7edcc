//! Error types for the VibeCheck engine.

use crate::store::StoreError;
use thiserror::Error;
use vibecheck_rs_config::ConfigError;
use vibecheck_rs_embed::EmbedError;
use vibecheck_rs_index::IndexError;
use vibecheck_rs_protocol::{ConversationId, EmbeddingSource};

/// Errors returned by engine operations.
#[derive(Debug, Error)]
pub enum VibeCheckError {
    /// Caller-supplied data that cannot be processed.
    #[error("invalid input: {0}")]
    InvalidInput(String),
    /// The embedding service failed and no fallback applied.
    #[error("embedding service error: {0}")]
    EmbeddingService(String),
    /// Vectors from a different embedding path than the index holds.
    #[error("embedding source mismatch: expected {expected}, got {actual}")]
    EmbeddingSourceMismatch {
        expected: EmbeddingSource,
        actual: EmbeddingSource,
    },
    /// Turn generation failed after retries or returned nothing.
    #[error("generation error: {0}")]
    Generation(String),
    /// The vector index could not be written.
    #[error("index unavailable: {0}")]
    IndexUnavailable(String),
    #[error("unknown persona: {0}")]
    UnknownPersona(String),
    #[error("unknown conversation: {0}")]
    UnknownConversation(ConversationId),
    #[error("conversation already exists: {0}")]
    ConversationExists(ConversationId),
    /// Persona or conversation store failure.
    #[error("store error: {0}")]
    Store(String),
    #[error("config error: {0}")]
    Config(#[from] ConfigError),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<EmbedError> for VibeCheckError {
    fn from(err: EmbedError) -> Self {
        match err {
            EmbedError::SourceMismatch { expected, actual } => {
                Self::EmbeddingSourceMismatch { expected, actual }
            }
            other => Self::EmbeddingService(other.to_string()),
        }
    }
}

impl From<IndexError> for VibeCheckError {
    fn from(err: IndexError) -> Self {
        match err {
            IndexError::SourceMismatch { expected, actual } => {
                Self::EmbeddingSourceMismatch { expected, actual }
            }
            IndexError::DimensionMismatch { .. } | IndexError::InvalidEntry(_) => {
                Self::InvalidInput(err.to_string())
            }
            IndexError::Io(_) | IndexError::Serde(_) => Self::IndexUnavailable(err.to_string()),
        }
    }
}

impl From<StoreError> for VibeCheckError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::ConversationExists(id) => Self::ConversationExists(id),
            other => Self::Store(other.to_string()),
        }
    }
}
