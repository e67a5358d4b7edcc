//! Per-persona vector storage and exact nearest-neighbour search.

pub mod error;
mod file;
mod memory;
pub mod model;
mod namespace;
mod similarity;

/// Index error type.
pub use error::IndexError;
/// Durable JSONL-backed index.
pub use file::FileVectorIndex;
/// Volatile index.
pub use memory::InMemoryVectorIndex;
/// Index entry and result models.
pub use model::{IndexEntry, IndexTag, ScoredWindow};
pub use similarity::cosine_similarity;

use async_trait::async_trait;
use vibecheck_rs_protocol::EmbeddingSource;

/// Vector index abstraction shared by the indexer and the retriever.
///
/// Every vector in one index comes from the same embedding source and has the
/// same width; the first write fixes that tag.
#[async_trait]
pub trait VectorIndex: Send + Sync {
    /// Insert or replace one entry in its persona's namespace.
    async fn upsert(&self, source: &EmbeddingSource, entry: IndexEntry) -> Result<(), IndexError> {
        let persona_id = entry.window.persona_id.clone();
        self.upsert_batch(&persona_id, source, vec![entry]).await
    }

    /// Insert or replace entries in one persona namespace.
    ///
    /// An entry whose window id already exists replaces it in place and keeps
    /// its original insertion rank.
    async fn upsert_batch(
        &self,
        persona_id: &str,
        source: &EmbeddingSource,
        entries: Vec<IndexEntry>,
    ) -> Result<(), IndexError>;

    /// Top `k` windows of one persona by cosine similarity, best first.
    ///
    /// Ties keep insertion order. Unknown or empty namespaces yield no results.
    async fn query(
        &self,
        persona_id: &str,
        source: &EmbeddingSource,
        vector: &[f32],
        k: usize,
    ) -> Result<Vec<ScoredWindow>, IndexError>;

    /// Swap one persona's namespace for `entries` in a single step.
    ///
    /// Readers see either the old or the new namespace, and a failed write
    /// leaves the old one in place. When no other persona holds entries the
    /// index may be retagged to `source`. Empty `entries` clears the namespace.
    async fn replace_namespace(
        &self,
        persona_id: &str,
        source: &EmbeddingSource,
        entries: Vec<IndexEntry>,
    ) -> Result<(), IndexError>;

    /// Drop every entry of one persona.
    async fn clear_namespace(&self, persona_id: &str) -> Result<(), IndexError>;

    /// Source and width fixed by the first write, if any.
    fn tag(&self) -> Option<IndexTag>;

    /// Persona namespaces currently holding entries, sorted.
    async fn namespaces(&self) -> Vec<String>;

    async fn namespace_len(&self, persona_id: &str) -> usize;
}
