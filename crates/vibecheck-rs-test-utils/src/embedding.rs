//! Embedding transports for exercising the service path without a network.

use async_trait::async_trait;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use vibecheck_rs_embed::{EmbedError, EmbeddingTransport, IndexedVector, hash_embedding};

/// Service-shaped transport that answers with hash embeddings, in reverse order.
#[derive(Debug, Clone)]
pub struct HashingTransport {
    model: String,
    dimensions: usize,
    calls: Arc<AtomicUsize>,
}

impl HashingTransport {
    pub fn new(model: impl Into<String>, dimensions: usize) -> Self {
        Self {
            model: model.into(),
            dimensions,
            calls: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl EmbeddingTransport for HashingTransport {
    fn model(&self) -> &str {
        &self.model
    }

    async fn embed_chunk(&self, texts: &[String]) -> Result<Vec<IndexedVector>, EmbedError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(texts
            .iter()
            .enumerate()
            .rev()
            .map(|(index, text)| IndexedVector {
                index,
                vector: hash_embedding(text, self.dimensions),
            })
            .collect())
    }
}

/// Transport that fails every chunk with one HTTP status.
#[derive(Debug, Clone)]
pub struct FailingTransport {
    model: String,
    status: u16,
    calls: Arc<AtomicUsize>,
}

impl FailingTransport {
    pub fn new(model: impl Into<String>, status: u16) -> Self {
        Self {
            model: model.into(),
            status,
            calls: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl EmbeddingTransport for FailingTransport {
    fn model(&self) -> &str {
        &self.model
    }

    async fn embed_chunk(&self, _texts: &[String]) -> Result<Vec<IndexedVector>, EmbedError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Err(EmbedError::Status {
            status: self.status,
            body: "stubbed failure".to_string(),
        })
    }
}
