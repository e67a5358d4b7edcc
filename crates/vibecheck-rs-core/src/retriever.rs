//! Persona-scoped similarity retrieval.

use crate::error::VibeCheckError;
use log::debug;
use std::sync::Arc;
use vibecheck_rs_embed::Embedder;
use vibecheck_rs_index::{ScoredWindow, VectorIndex};

/// Windows retrieved for one query, best first, plus their prompt rendering.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RetrievedContext {
    pub windows: Vec<ScoredWindow>,
    pub block: String,
}

impl RetrievedContext {
    pub fn new(windows: Vec<ScoredWindow>) -> Self {
        let block = format_context(&windows);
        Self { windows, block }
    }

    pub fn is_empty(&self) -> bool {
        self.windows.is_empty()
    }
}

/// Numbered `[n] (similarity 0.87)` entries separated by blank lines.
pub fn format_context(windows: &[ScoredWindow]) -> String {
    windows
        .iter()
        .enumerate()
        .map(|(rank, hit)| {
            format!(
                "[{}] (similarity {:.2})\n{}",
                rank + 1,
                hit.similarity,
                hit.window.text
            )
        })
        .collect::<Vec<_>>()
        .join("\n\n")
}

#[derive(Clone)]
pub struct Retriever {
    embedder: Arc<Embedder>,
    index: Arc<dyn VectorIndex>,
}

impl Retriever {
    pub fn new(embedder: Arc<Embedder>, index: Arc<dyn VectorIndex>) -> Self {
        Self { embedder, index }
    }

    /// Top `k` windows of `persona_id` for `query`.
    ///
    /// The query is embedded on the same path as the indexed vectors. An index
    /// with nothing in it yields an empty context.
    pub async fn retrieve(
        &self,
        persona_id: &str,
        query: &str,
        k: usize,
    ) -> Result<RetrievedContext, VibeCheckError> {
        let Some(tag) = self.index.tag() else {
            debug!("index is empty; nothing to retrieve (persona_id={})", persona_id);
            return Ok(RetrievedContext::default());
        };
        if k == 0 {
            return Ok(RetrievedContext::default());
        }
        let mut batch = self
            .embedder
            .embed_with_source(&tag.source, &[query.to_string()])
            .await?;
        let vector = batch.vectors.pop().ok_or_else(|| {
            VibeCheckError::EmbeddingService("query embedding returned no vector".to_string())
        })?;
        let windows = self
            .index
            .query(persona_id, &batch.source, &vector, k)
            .await?;
        debug!(
            "retrieved windows (persona_id={}, hits={}, top_similarity={:.3})",
            persona_id,
            windows.len(),
            windows.first().map_or(0.0, |hit| hit.similarity)
        );
        Ok(RetrievedContext::new(windows))
    }
}
