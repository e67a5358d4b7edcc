//! Embedding persona windows into the vector index.

use crate::error::VibeCheckError;
use log::{debug, info};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::OwnedMutexGuard;
use vibecheck_rs_embed::{Embedder, EmbeddingBatch};
use vibecheck_rs_index::{IndexEntry, VectorIndex};
use vibecheck_rs_protocol::{EmbeddingSource, Window};

/// Exclusive right to rewrite one persona's namespace.
///
/// Held across embedding and the namespace swap, and by the engine until the
/// persona record is saved, so concurrent re-indexes of one persona run one
/// after the other.
pub struct PersonaLock {
    persona_id: String,
    _guard: OwnedMutexGuard<()>,
}

impl PersonaLock {
    pub fn persona_id(&self) -> &str {
        &self.persona_id
    }
}

/// Writes a persona's windows into its index namespace.
#[derive(Clone)]
pub struct PersonaIndexer {
    embedder: Arc<Embedder>,
    index: Arc<dyn VectorIndex>,
    locks: Arc<Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>>,
}

impl PersonaIndexer {
    pub fn new(embedder: Arc<Embedder>, index: Arc<dyn VectorIndex>) -> Self {
        Self {
            embedder,
            index,
            locks: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Wait for exclusive write access to one persona.
    pub async fn lock_persona(&self, persona_id: &str) -> PersonaLock {
        let mutex = self
            .locks
            .lock()
            .entry(persona_id.to_string())
            .or_default()
            .clone();
        PersonaLock {
            persona_id: persona_id.to_string(),
            _guard: mutex.lock_owned().await,
        }
    }

    /// Replace the persona's namespace with freshly embedded windows.
    ///
    /// When other personas already share the index, windows are embedded on the
    /// index's source so every namespace stays comparable. On failure the
    /// previous namespace is left untouched.
    pub async fn index_windows(
        &self,
        lock: &PersonaLock,
        windows: &[Window],
    ) -> Result<EmbeddingSource, VibeCheckError> {
        let persona_id = lock.persona_id();
        let texts: Vec<String> = windows.iter().map(|window| window.text.clone()).collect();
        let batch = match self.shared_source(persona_id).await {
            Some(source) => {
                debug!(
                    "embedding on the existing index source (persona_id={}, source={})",
                    persona_id, source
                );
                self.embedder.embed_with_source(&source, &texts).await?
            }
            None => self.embedder.embed_batch(&texts).await?,
        };
        let EmbeddingBatch { vectors, source } = batch;
        if vectors.len() != windows.len() {
            return Err(VibeCheckError::EmbeddingService(format!(
                "expected {} vectors, got {}",
                windows.len(),
                vectors.len()
            )));
        }
        let entries = windows
            .iter()
            .cloned()
            .zip(vectors)
            .map(|(window, vector)| IndexEntry { window, vector })
            .collect();

        self.index
            .replace_namespace(persona_id, &source, entries)
            .await?;
        info!(
            "indexed persona (persona_id={}, windows={}, source={})",
            persona_id,
            windows.len(),
            source
        );
        Ok(source)
    }

    /// Index source, unless this persona is the only namespace using it.
    async fn shared_source(&self, persona_id: &str) -> Option<EmbeddingSource> {
        let tag = self.index.tag()?;
        let namespaces = self.index.namespaces().await;
        if namespaces.iter().all(|name| name == persona_id) {
            return None;
        }
        Some(tag.source)
    }
}

#[cfg(test)]
mod tests {
    use super::PersonaIndexer;
    use crate::windower::build_windows;
    use pretty_assertions::assert_eq;
    use std::sync::Arc;
    use std::time::Duration;
    use vibecheck_rs_embed::Embedder;
    use vibecheck_rs_index::{InMemoryVectorIndex, VectorIndex};
    use vibecheck_rs_protocol::{EmbeddingSource, Message};

    fn messages(texts: &[&str]) -> Vec<Message> {
        texts
            .iter()
            .enumerate()
            .map(|(index, text)| Message {
                id: format!("m{index}"),
                sender_id: "alice".to_string(),
                text: text.to_string(),
                timestamp_seq: index as u64 + 1,
            })
            .collect()
    }

    #[tokio::test]
    async fn reindexing_replaces_the_namespace() {
        let index = Arc::new(InMemoryVectorIndex::new());
        let indexer = PersonaIndexer::new(Arc::new(Embedder::fallback(32)), index.clone());

        let first = build_windows("alice", &messages(&["a", "b", "c"]), 1).expect("windows");
        let lock = indexer.lock_persona("alice").await;
        let source = indexer.index_windows(&lock, &first).await.expect("index");
        assert_eq!(source, EmbeddingSource::Fallback { dimensions: 32 });
        assert_eq!(index.namespace_len("alice").await, 3);

        let second = build_windows("alice", &messages(&["a", "b"]), 1).expect("windows");
        indexer.index_windows(&lock, &second).await.expect("reindex");
        assert_eq!(index.namespace_len("alice").await, 2);
    }

    #[tokio::test]
    async fn later_personas_follow_the_index_source() {
        let index = Arc::new(InMemoryVectorIndex::new());
        let first = PersonaIndexer::new(Arc::new(Embedder::fallback(16)), index.clone());
        let lock = first.lock_persona("alice").await;
        first
            .index_windows(
                &lock,
                &build_windows("alice", &messages(&["hi"]), 0).expect("windows"),
            )
            .await
            .expect("alice");

        let second = PersonaIndexer::new(Arc::new(Embedder::fallback(64)), index.clone());
        let lock = second.lock_persona("bob").await;
        let source = second
            .index_windows(
                &lock,
                &build_windows("bob", &messages(&["yo"]), 0).expect("windows"),
            )
            .await
            .expect("bob");
        assert_eq!(source, EmbeddingSource::Fallback { dimensions: 16 });
        assert_eq!(index.namespaces().await, vec!["alice".to_string(), "bob".to_string()]);
    }

    #[tokio::test]
    async fn persona_writes_wait_for_the_current_holder() {
        let index = Arc::new(InMemoryVectorIndex::new());
        let indexer = PersonaIndexer::new(Arc::new(Embedder::fallback(8)), index);

        let held = indexer.lock_persona("alice").await;
        let blocked = tokio::time::timeout(
            Duration::from_millis(20),
            indexer.lock_persona("alice"),
        )
        .await;
        assert!(blocked.is_err());
        let other = tokio::time::timeout(Duration::from_millis(20), indexer.lock_persona("bob"))
            .await
            .expect("other persona is free");
        assert_eq!(other.persona_id(), "bob");

        drop(held);
        let next = tokio::time::timeout(Duration::from_millis(20), indexer.lock_persona("alice"))
            .await
            .expect("released");
        assert_eq!(next.persona_id(), "alice");
    }
}
