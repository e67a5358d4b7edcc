use crate::fallback::hash_embedding;
use crate::retry::{RetryError, RetryPolicy};
use crate::{EmbedError, EmbeddingTransport, IndexedVector, OpenAiEmbeddingTransport};
use futures_util::{StreamExt, stream};
use log::{debug, info, warn};
use std::sync::Arc;
use std::time::Duration;
use vibecheck_rs_config::{EmbeddingConfig, EmbeddingMode};
use vibecheck_rs_protocol::EmbeddingSource;

/// A single embedded text.
#[derive(Debug, Clone, PartialEq)]
pub struct Embedding {
    pub vector: Vec<f32>,
    pub source: EmbeddingSource,
}

/// Vectors for a batch of texts, in input order, all from one source.
#[derive(Debug, Clone, PartialEq)]
pub struct EmbeddingBatch {
    pub vectors: Vec<Vec<f32>>,
    pub source: EmbeddingSource,
}

impl EmbeddingBatch {
    pub fn len(&self) -> usize {
        self.vectors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.vectors.is_empty()
    }

    /// Width of the vectors, or `None` for an empty batch.
    pub fn dimensions(&self) -> Option<usize> {
        self.vectors.first().map(Vec::len)
    }
}

/// Tuning for [`Embedder`].
#[derive(Debug, Clone)]
pub struct EmbedderOptions {
    pub mode: EmbeddingMode,
    pub batch_size: usize,
    pub max_in_flight: usize,
    pub timeout: Duration,
    pub retry: RetryPolicy,
    pub fallback_dimensions: usize,
}

impl Default for EmbedderOptions {
    fn default() -> Self {
        Self::from(&EmbeddingConfig::default())
    }
}

impl From<&EmbeddingConfig> for EmbedderOptions {
    fn from(config: &EmbeddingConfig) -> Self {
        Self {
            mode: config.mode,
            batch_size: config.batch_size.max(1),
            max_in_flight: config.max_in_flight.max(1),
            timeout: Duration::from_millis(config.timeout_ms.max(1)),
            retry: RetryPolicy::from(&config.retry),
            fallback_dimensions: config.fallback_dimensions.max(1),
        }
    }
}

/// Embeds texts on the service path, the hash path, or both, depending on mode.
#[derive(Clone)]
pub struct Embedder {
    transport: Option<Arc<dyn EmbeddingTransport>>,
    options: EmbedderOptions,
}

impl Embedder {
    pub fn new(transport: Option<Arc<dyn EmbeddingTransport>>, options: EmbedderOptions) -> Self {
        Self { transport, options }
    }

    /// Hash-only embedder.
    pub fn fallback(dimensions: usize) -> Self {
        Self::new(
            None,
            EmbedderOptions {
                mode: EmbeddingMode::Fallback,
                fallback_dimensions: dimensions.max(1),
                ..EmbedderOptions::default()
            },
        )
    }

    /// Build an embedder from config, reading the API key from the environment.
    ///
    /// `service` mode without a key is an error; `auto` mode without a key uses
    /// the hash path only.
    pub fn from_config(config: &EmbeddingConfig) -> Result<Self, EmbedError> {
        let options = EmbedderOptions::from(config);
        let transport: Option<Arc<dyn EmbeddingTransport>> = match (config.mode, config.api_key()) {
            (EmbeddingMode::Fallback, _) => None,
            (_, Some(api_key)) => Some(Arc::new(OpenAiEmbeddingTransport::new(
                config.api_base.clone(),
                api_key,
                config.model.clone(),
            ))),
            (EmbeddingMode::Service, None) => {
                return Err(EmbedError::MissingCredentials(format!(
                    "environment variable {} is not set",
                    config.api_key_env
                )));
            }
            (EmbeddingMode::Auto, None) => {
                info!(
                    "no embedding credentials found; using hash embeddings (env={})",
                    config.api_key_env
                );
                None
            }
        };
        Ok(Self::new(transport, options))
    }

    pub fn options(&self) -> &EmbedderOptions {
        &self.options
    }

    pub fn fallback_source(&self) -> EmbeddingSource {
        EmbeddingSource::Fallback {
            dimensions: self.options.fallback_dimensions,
        }
    }

    /// Source that a successful `embed_batch` call produces.
    pub fn preferred_source(&self) -> EmbeddingSource {
        match self.active_transport() {
            Some(transport) => EmbeddingSource::Service {
                model: transport.model().to_string(),
            },
            None => self.fallback_source(),
        }
    }

    pub async fn embed(&self, text: &str) -> Result<Embedding, EmbedError> {
        let mut batch = self.embed_batch(&[text.to_string()]).await?;
        let vector = batch.vectors.pop().ok_or_else(|| {
            EmbedError::InvalidResponse("embedding batch returned no vectors".to_string())
        })?;
        Ok(Embedding {
            vector,
            source: batch.source,
        })
    }

    /// Embed texts in order, one vector per text, on a single source.
    pub async fn embed_batch(&self, texts: &[String]) -> Result<EmbeddingBatch, EmbedError> {
        let transport = match (self.options.mode, self.transport.as_ref()) {
            (EmbeddingMode::Fallback, _) | (EmbeddingMode::Auto, None) => {
                return Ok(self.fallback_batch(texts, self.options.fallback_dimensions));
            }
            (EmbeddingMode::Service, None) => {
                return Err(EmbedError::MissingCredentials(
                    "no embedding transport configured".to_string(),
                ));
            }
            (_, Some(transport)) => transport,
        };
        if texts.is_empty() {
            return Ok(EmbeddingBatch {
                vectors: Vec::new(),
                source: self.preferred_source(),
            });
        }

        match self.service_batch(transport, texts).await {
            Ok(batch) => Ok(batch),
            Err(err) if self.options.mode == EmbeddingMode::Auto && err.degrades_to_fallback() => {
                warn!(
                    "embedding service degraded; using hash embeddings (texts={}, err={})",
                    texts.len(),
                    err
                );
                Ok(self.fallback_batch(texts, self.options.fallback_dimensions))
            }
            Err(err) => Err(err),
        }
    }

    /// Embed texts on exactly the path that produced `source`.
    ///
    /// Used to embed queries against an index tagged with `source`; never degrades.
    pub async fn embed_with_source(
        &self,
        source: &EmbeddingSource,
        texts: &[String],
    ) -> Result<EmbeddingBatch, EmbedError> {
        match source {
            EmbeddingSource::Fallback { dimensions } => Ok(self.fallback_batch(texts, *dimensions)),
            EmbeddingSource::Service { model } => {
                let Some(transport) = self.active_transport() else {
                    return Err(EmbedError::SourceMismatch {
                        expected: source.clone(),
                        actual: self.preferred_source(),
                    });
                };
                if transport.model() != model {
                    return Err(EmbedError::SourceMismatch {
                        expected: source.clone(),
                        actual: EmbeddingSource::Service {
                            model: transport.model().to_string(),
                        },
                    });
                }
                if texts.is_empty() {
                    return Ok(EmbeddingBatch {
                        vectors: Vec::new(),
                        source: source.clone(),
                    });
                }
                self.service_batch(transport, texts).await
            }
        }
    }

    fn active_transport(&self) -> Option<&Arc<dyn EmbeddingTransport>> {
        match self.options.mode {
            EmbeddingMode::Fallback => None,
            EmbeddingMode::Service | EmbeddingMode::Auto => self.transport.as_ref(),
        }
    }

    fn fallback_batch(&self, texts: &[String], dimensions: usize) -> EmbeddingBatch {
        debug!(
            "hash-embedding batch (texts={}, dimensions={})",
            texts.len(),
            dimensions
        );
        EmbeddingBatch {
            vectors: texts
                .iter()
                .map(|text| hash_embedding(text, dimensions))
                .collect(),
            source: EmbeddingSource::Fallback { dimensions },
        }
    }

    async fn service_batch(
        &self,
        transport: &Arc<dyn EmbeddingTransport>,
        texts: &[String],
    ) -> Result<EmbeddingBatch, EmbedError> {
        let batch_size = self.options.batch_size;
        let results: Vec<Result<(usize, Vec<Vec<f32>>), EmbedError>> = stream::iter(
            texts
                .chunks(batch_size)
                .enumerate()
                .map(|(chunk_index, chunk)| (chunk_index * batch_size, chunk)),
        )
        .map(|(offset, chunk)| async move {
            self.embed_chunk(transport, chunk)
                .await
                .map(|vectors| (offset, vectors))
        })
        .buffer_unordered(self.options.max_in_flight)
        .collect()
        .await;

        let mut slots: Vec<Option<Vec<f32>>> = vec![None; texts.len()];
        for result in results {
            let (offset, vectors) = result?;
            for (position, vector) in vectors.into_iter().enumerate() {
                slots[offset + position] = Some(vector);
            }
        }
        let vectors = slots
            .into_iter()
            .collect::<Option<Vec<_>>>()
            .ok_or_else(|| EmbedError::InvalidResponse("missing chunk vectors".to_string()))?;
        ensure_uniform_width(&vectors)?;
        Ok(EmbeddingBatch {
            vectors,
            source: EmbeddingSource::Service {
                model: transport.model().to_string(),
            },
        })
    }

    async fn embed_chunk(
        &self,
        transport: &Arc<dyn EmbeddingTransport>,
        chunk: &[String],
    ) -> Result<Vec<Vec<f32>>, EmbedError> {
        let timeout = self.options.timeout;
        let items = self
            .options
            .retry
            .run("embedding request", |_| async move {
                match tokio::time::timeout(timeout, transport.embed_chunk(chunk)).await {
                    Ok(result) => result,
                    Err(_) => Err(EmbedError::Timeout(timeout)),
                }
            })
            .await
            .map_err(|err| match err {
                RetryError::Permanent(err) => err,
                RetryError::Exhausted { attempts, last } => EmbedError::RetriesExhausted {
                    attempts,
                    last: Box::new(last),
                },
            })?;
        order_by_index(items, chunk.len())
    }
}

/// Place response items at their request positions, rejecting gaps and duplicates.
fn order_by_index(items: Vec<IndexedVector>, expected: usize) -> Result<Vec<Vec<f32>>, EmbedError> {
    if items.len() != expected {
        return Err(EmbedError::InvalidResponse(format!(
            "expected {expected} vectors, got {}",
            items.len()
        )));
    }
    let mut ordered: Vec<Option<Vec<f32>>> = vec![None; expected];
    for item in items {
        let slot = ordered.get_mut(item.index).ok_or_else(|| {
            EmbedError::InvalidResponse(format!("index {} out of range", item.index))
        })?;
        if slot.replace(item.vector).is_some() {
            return Err(EmbedError::InvalidResponse(format!(
                "duplicate index {}",
                item.index
            )));
        }
    }
    ordered
        .into_iter()
        .collect::<Option<Vec<_>>>()
        .ok_or_else(|| EmbedError::InvalidResponse("missing vector index".to_string()))
}

fn ensure_uniform_width(vectors: &[Vec<f32>]) -> Result<(), EmbedError> {
    let Some(width) = vectors.first().map(Vec::len) else {
        return Ok(());
    };
    if width == 0 || vectors.iter().any(|vector| vector.len() != width) {
        return Err(EmbedError::InvalidResponse(
            "vectors have inconsistent or zero width".to_string(),
        ));
    }
    Ok(())
}
