use crate::namespace::{Namespace, Registry, batch_dimensions};
use crate::{IndexEntry, IndexError, IndexTag, ScoredWindow, VectorIndex};
use async_trait::async_trait;
use log::debug;
use vibecheck_rs_protocol::EmbeddingSource;

/// Volatile vector index held entirely in memory.
#[derive(Debug, Default)]
pub struct InMemoryVectorIndex {
    registry: Registry,
}

impl InMemoryVectorIndex {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl VectorIndex for InMemoryVectorIndex {
    async fn upsert_batch(
        &self,
        persona_id: &str,
        source: &EmbeddingSource,
        entries: Vec<IndexEntry>,
    ) -> Result<(), IndexError> {
        let Some(dimensions) = batch_dimensions(persona_id, &entries)? else {
            return Ok(());
        };
        self.registry.claim_tag(source, dimensions)?;
        let namespace = self.registry.get_or_insert(persona_id);
        let count = entries.len();
        let mut guard = namespace.write();
        guard.upsert_all(entries);
        debug!(
            "upserted windows (persona_id={}, count={}, total={})",
            persona_id,
            count,
            guard.len()
        );
        Ok(())
    }

    async fn query(
        &self,
        persona_id: &str,
        source: &EmbeddingSource,
        vector: &[f32],
        k: usize,
    ) -> Result<Vec<ScoredWindow>, IndexError> {
        self.registry.check_query(source, vector.len())?;
        Ok(self
            .registry
            .get(persona_id)
            .map(|namespace| namespace.read().query(vector, k))
            .unwrap_or_default())
    }

    async fn replace_namespace(
        &self,
        persona_id: &str,
        source: &EmbeddingSource,
        entries: Vec<IndexEntry>,
    ) -> Result<(), IndexError> {
        let Some(dimensions) = batch_dimensions(persona_id, &entries)? else {
            return self.clear_namespace(persona_id).await;
        };
        self.registry
            .retag_for_replace(persona_id, source, dimensions, false)?;
        let count = entries.len();
        self.registry
            .replace(persona_id, Namespace::from_entries(entries));
        debug!(
            "replaced namespace (persona_id={}, count={})",
            persona_id, count
        );
        Ok(())
    }

    async fn clear_namespace(&self, persona_id: &str) -> Result<(), IndexError> {
        if self.registry.remove(persona_id) {
            debug!("cleared namespace (persona_id={})", persona_id);
        }
        Ok(())
    }

    fn tag(&self) -> Option<IndexTag> {
        self.registry.tag()
    }

    async fn namespaces(&self) -> Vec<String> {
        self.registry.names()
    }

    async fn namespace_len(&self, persona_id: &str) -> usize {
        self.registry
            .get(persona_id)
            .map(|namespace| namespace.read().len())
            .unwrap_or(0)
    }
}
