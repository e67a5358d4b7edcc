//! Text embedding for VibeCheck windows and queries.
//!
//! The [`Embedder`] calls an OpenAI-compatible `/embeddings` endpoint through an
//! [`EmbeddingTransport`] and falls back to deterministic FNV-1a token hashing
//! when the service is disabled or unavailable. Every batch it returns is tagged
//! with the [`EmbeddingSource`](vibecheck_rs_protocol::EmbeddingSource) that
//! produced it.

mod embedder;
mod error;
pub mod fallback;
mod openai;
pub mod retry;
mod transport;

pub use embedder::{Embedder, EmbedderOptions, Embedding, EmbeddingBatch};
pub use error::EmbedError;
pub use fallback::{fnv1a_hash, hash_embedding};
pub use openai::OpenAiEmbeddingTransport;
pub use retry::{RetryError, RetryPolicy, Transient};
pub use transport::{EmbeddingTransport, IndexedVector};
