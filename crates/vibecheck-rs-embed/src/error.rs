//! Error types for embedding requests.

use crate::retry::Transient;
use std::time::Duration;
use thiserror::Error;
use vibecheck_rs_protocol::EmbeddingSource;

/// Errors returned by embedding transports and the embedder.
#[derive(Debug, Error)]
pub enum EmbedError {
    /// The request never produced an HTTP response.
    #[error("embedding request failed: {0}")]
    Transport(String),
    #[error("embedding request timed out after {0:?}")]
    Timeout(Duration),
    /// The service answered with a non-success status.
    #[error("embedding service returned status {status}: {body}")]
    Status { status: u16, body: String },
    /// The response could not be decoded or did not match the request.
    #[error("invalid embedding response: {0}")]
    InvalidResponse(String),
    #[error("embedding credentials missing: {0}")]
    MissingCredentials(String),
    #[error("embedding source mismatch: expected {expected}, got {actual}")]
    SourceMismatch {
        expected: EmbeddingSource,
        actual: EmbeddingSource,
    },
    #[error("embedding retries exhausted after {attempts} attempts: {last}")]
    RetriesExhausted { attempts: u32, last: Box<EmbedError> },
}

impl EmbedError {
    /// Rejected API key or missing permission.
    pub fn is_credential_failure(&self) -> bool {
        matches!(self, Self::Status { status: 401 | 403, .. })
    }

    /// Whether `auto` mode may recompute the batch on the hash path.
    pub fn degrades_to_fallback(&self) -> bool {
        matches!(self, Self::RetriesExhausted { .. }) || self.is_credential_failure()
    }
}

impl Transient for EmbedError {
    fn is_transient(&self) -> bool {
        match self {
            Self::Transport(_) | Self::Timeout(_) => true,
            Self::Status { status, .. } => matches!(*status, 408 | 429 | 500..=599),
            _ => false,
        }
    }
}
