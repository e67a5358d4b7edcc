//! Entry and result models for vector indexes.

use serde::{Deserialize, Serialize};
use vibecheck_rs_protocol::{EmbeddingSource, Window};

/// A window and its embedding, as stored in a namespace.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct IndexEntry {
    pub window: Window,
    pub vector: Vec<f32>,
}

/// Embedding source and vector width shared by every entry in an index.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct IndexTag {
    pub source: EmbeddingSource,
    pub dimensions: usize,
}

/// A query hit.
#[derive(Debug, Clone, PartialEq)]
pub struct ScoredWindow {
    pub window: Window,
    /// Cosine similarity in `[-1, 1]`.
    pub similarity: f32,
}
