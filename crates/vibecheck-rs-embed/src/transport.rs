use crate::EmbedError;
use async_trait::async_trait;

/// One vector from a service response, tagged with its request position.
#[derive(Debug, Clone, PartialEq)]
pub struct IndexedVector {
    pub index: usize,
    pub vector: Vec<f32>,
}

/// Sends one chunk of texts to an embedding service.
///
/// Implementations return items in whatever order the service produced them;
/// the embedder re-associates them by `index`.
#[async_trait]
pub trait EmbeddingTransport: Send + Sync {
    /// Model identifier recorded on every vector this transport produces.
    fn model(&self) -> &str;

    async fn embed_chunk(&self, texts: &[String]) -> Result<Vec<IndexedVector>, EmbedError>;
}
