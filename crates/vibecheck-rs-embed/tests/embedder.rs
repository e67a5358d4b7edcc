//! Embedder behaviour against scripted transports.

use async_trait::async_trait;
use parking_lot::Mutex;
use pretty_assertions::assert_eq;
use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use vibecheck_rs_config::EmbeddingMode;
use vibecheck_rs_embed::{
    EmbedError, Embedder, EmbedderOptions, EmbeddingTransport, IndexedVector, RetryPolicy,
    hash_embedding,
};
use vibecheck_rs_protocol::EmbeddingSource;

const MODEL: &str = "stub-embedding";

/// Returns hash vectors for each text, items reversed, and later chunks finish first.
struct ReorderingTransport {
    calls: AtomicUsize,
}

#[async_trait]
impl EmbeddingTransport for ReorderingTransport {
    fn model(&self) -> &str {
        MODEL
    }

    async fn embed_chunk(&self, texts: &[String]) -> Result<Vec<IndexedVector>, EmbedError> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst);
        tokio::time::sleep(Duration::from_millis(20u64.saturating_sub(call as u64 * 5))).await;
        Ok(texts
            .iter()
            .enumerate()
            .rev()
            .map(|(index, text)| IndexedVector {
                index,
                vector: hash_embedding(text, 16),
            })
            .collect())
    }
}

/// Fails with scripted errors, then succeeds.
struct ScriptedTransport {
    failures: Mutex<VecDeque<EmbedError>>,
    calls: AtomicUsize,
    delay: Duration,
}

impl ScriptedTransport {
    fn new(failures: Vec<EmbedError>) -> Self {
        Self {
            failures: Mutex::new(failures.into()),
            calls: AtomicUsize::new(0),
            delay: Duration::ZERO,
        }
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl EmbeddingTransport for ScriptedTransport {
    fn model(&self) -> &str {
        MODEL
    }

    async fn embed_chunk(&self, texts: &[String]) -> Result<Vec<IndexedVector>, EmbedError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        if let Some(err) = self.failures.lock().pop_front() {
            return Err(err);
        }
        Ok(texts
            .iter()
            .enumerate()
            .map(|(index, _)| IndexedVector {
                index,
                vector: vec![1.0, 0.0],
            })
            .collect())
    }
}

fn status(code: u16) -> EmbedError {
    EmbedError::Status {
        status: code,
        body: "stub".to_string(),
    }
}

fn options(mode: EmbeddingMode) -> EmbedderOptions {
    EmbedderOptions {
        mode,
        batch_size: 2,
        max_in_flight: 3,
        timeout: Duration::from_millis(200),
        retry: RetryPolicy::new(3, Duration::from_millis(1), Duration::from_millis(2)),
        fallback_dimensions: 8,
    }
}

fn texts(count: usize) -> Vec<String> {
    (0..count).map(|idx| format!("message number {idx}")).collect()
}

#[tokio::test]
async fn batch_preserves_input_order_under_reordering() {
    let transport = Arc::new(ReorderingTransport {
        calls: AtomicUsize::new(0),
    });
    let embedder = Embedder::new(Some(transport.clone()), options(EmbeddingMode::Service));
    let inputs = texts(7);

    let batch = embedder.embed_batch(&inputs).await.expect("batch");

    assert_eq!(transport.calls.load(Ordering::SeqCst), 4);
    assert_eq!(
        batch.source,
        EmbeddingSource::Service {
            model: MODEL.to_string()
        }
    );
    let expected: Vec<_> = inputs.iter().map(|text| hash_embedding(text, 16)).collect();
    assert_eq!(batch.vectors, expected);
}

#[tokio::test]
async fn fallback_mode_never_calls_transport() {
    let transport = Arc::new(ScriptedTransport::new(Vec::new()));
    let embedder = Embedder::new(Some(transport.clone()), options(EmbeddingMode::Fallback));

    let first = embedder.embed_batch(&texts(3)).await.expect("batch");
    let second = embedder.embed_batch(&texts(3)).await.expect("batch");

    assert_eq!(transport.calls(), 0);
    assert_eq!(first, second);
    assert_eq!(first.source, EmbeddingSource::Fallback { dimensions: 8 });
    assert_eq!(first.dimensions(), Some(8));
}

#[tokio::test]
async fn transient_failures_are_retried() {
    let transport = Arc::new(ScriptedTransport::new(vec![status(503), status(429)]));
    let embedder = Embedder::new(Some(transport.clone()), options(EmbeddingMode::Service));

    let batch = embedder.embed_batch(&texts(1)).await.expect("batch");

    assert_eq!(transport.calls(), 3);
    assert!(!batch.source.is_fallback());
}

#[tokio::test]
async fn service_mode_surfaces_exhausted_retries() {
    let transport = Arc::new(ScriptedTransport::new(vec![
        status(500),
        status(500),
        status(500),
    ]));
    let embedder = Embedder::new(Some(transport.clone()), options(EmbeddingMode::Service));

    let err = embedder.embed_batch(&texts(1)).await.unwrap_err();

    assert!(matches!(err, EmbedError::RetriesExhausted { attempts: 3, .. }));
    assert_eq!(transport.calls(), 3);
}

#[tokio::test]
async fn auto_mode_degrades_whole_batch_after_exhaustion() {
    let transport = Arc::new(ScriptedTransport::new(vec![
        status(502),
        status(502),
        status(502),
    ]));
    let mut opts = options(EmbeddingMode::Auto);
    opts.max_in_flight = 1;
    let embedder = Embedder::new(Some(transport.clone()), opts);
    let inputs = texts(4);

    let batch = embedder.embed_batch(&inputs).await.expect("degraded batch");

    assert_eq!(batch.source, EmbeddingSource::Fallback { dimensions: 8 });
    let expected: Vec<_> = inputs.iter().map(|text| hash_embedding(text, 8)).collect();
    assert_eq!(batch.vectors, expected);
}

#[tokio::test]
async fn auto_mode_degrades_on_bad_credentials_without_retry() {
    let transport = Arc::new(ScriptedTransport::new(vec![status(401)]));
    let embedder = Embedder::new(Some(transport.clone()), options(EmbeddingMode::Auto));

    let batch = embedder.embed_batch(&texts(1)).await.expect("batch");

    assert!(batch.source.is_fallback());
    assert_eq!(transport.calls(), 1);
}

#[tokio::test]
async fn auto_mode_surfaces_malformed_requests() {
    let transport = Arc::new(ScriptedTransport::new(vec![status(422)]));
    let embedder = Embedder::new(Some(transport.clone()), options(EmbeddingMode::Auto));

    let err = embedder.embed_batch(&texts(1)).await.unwrap_err();

    assert!(matches!(err, EmbedError::Status { status: 422, .. }));
    assert_eq!(transport.calls(), 1);
}

#[tokio::test]
async fn slow_transport_times_out_and_counts_as_transient() {
    let mut transport = ScriptedTransport::new(Vec::new());
    transport.delay = Duration::from_millis(100);
    let transport = Arc::new(transport);
    let mut opts = options(EmbeddingMode::Service);
    opts.timeout = Duration::from_millis(10);
    let embedder = Embedder::new(Some(transport.clone()), opts);

    let err = embedder.embed("hello").await.unwrap_err();

    match err {
        EmbedError::RetriesExhausted { attempts, last } => {
            assert_eq!(attempts, 3);
            assert!(matches!(*last, EmbedError::Timeout(_)));
        }
        other => panic!("unexpected error: {other:?}"),
    }
}

#[tokio::test]
async fn embed_with_source_follows_the_index_tag() {
    let transport = Arc::new(ScriptedTransport::new(Vec::new()));
    let embedder = Embedder::new(Some(transport.clone()), options(EmbeddingMode::Auto));

    let hashed = embedder
        .embed_with_source(&EmbeddingSource::Fallback { dimensions: 32 }, &texts(2))
        .await
        .expect("fallback");
    assert_eq!(hashed.dimensions(), Some(32));
    assert_eq!(transport.calls(), 0);

    let err = embedder
        .embed_with_source(
            &EmbeddingSource::Service {
                model: "other-model".to_string(),
            },
            &texts(1),
        )
        .await
        .unwrap_err();
    assert!(matches!(err, EmbedError::SourceMismatch { .. }));
}

#[tokio::test]
async fn service_mode_without_transport_is_an_error() {
    let embedder = Embedder::new(None, options(EmbeddingMode::Service));
    let err = embedder.embed_batch(&texts(1)).await.unwrap_err();
    assert!(matches!(err, EmbedError::MissingCredentials(_)));
}

#[tokio::test]
async fn service_index_cannot_be_queried_without_the_service() {
    let embedder = Embedder::fallback(8);
    let err = embedder
        .embed_with_source(
            &EmbeddingSource::Service {
                model: MODEL.to_string(),
            },
            &texts(1),
        )
        .await
        .unwrap_err();
    match err {
        EmbedError::SourceMismatch { expected, actual } => {
            assert_eq!(
                expected,
                EmbeddingSource::Service {
                    model: MODEL.to_string()
                }
            );
            assert_eq!(actual, EmbeddingSource::Fallback { dimensions: 8 });
        }
        other => panic!("unexpected error: {other:?}"),
    }
}

#[tokio::test]
async fn degraded_embeddings_are_deterministic() {
    let transport = Arc::new(ScriptedTransport::new(
        (0..6).map(|_| status(503)).collect(),
    ));
    let embedder = Embedder::new(Some(transport.clone()), options(EmbeddingMode::Auto));

    let first = embedder.embed("hello").await.expect("first");
    let second = embedder.embed("hello").await.expect("second");

    assert_eq!(first.source, EmbeddingSource::Fallback { dimensions: 8 });
    assert_eq!(first.source, second.source);
    assert_eq!(first.vector, second.vector);
    assert_eq!(first.vector, hash_embedding("hello", 8));
    assert_eq!(transport.calls(), 6);
}
