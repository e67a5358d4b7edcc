use serde::{Deserialize, Serialize};
use std::fmt;

/// Path that produced an embedding vector.
///
/// Vectors from different sources live in different spaces and must never be
/// compared with each other.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind")]
pub enum EmbeddingSource {
    /// Remote embedding service.
    Service { model: String },
    /// Local deterministic hash embedding.
    Fallback { dimensions: usize },
}

impl EmbeddingSource {
    /// Return true for the local hash path.
    pub fn is_fallback(&self) -> bool {
        matches!(self, Self::Fallback { .. })
    }
}

impl fmt::Display for EmbeddingSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Service { model } => write!(f, "service:{model}"),
            Self::Fallback { dimensions } => write!(f, "hash-fnv1a:{dimensions}"),
        }
    }
}
