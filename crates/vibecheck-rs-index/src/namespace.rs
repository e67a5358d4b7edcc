//! In-memory namespace storage and tag bookkeeping shared by index backends.

use crate::similarity::cosine_similarity;
use crate::{IndexEntry, IndexError, IndexTag, ScoredWindow};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;
use vibecheck_rs_protocol::EmbeddingSource;

/// Entries of one persona, in insertion order.
#[derive(Debug, Clone, Default)]
pub(crate) struct Namespace {
    entries: Vec<IndexEntry>,
    positions: HashMap<String, usize>,
}

impl Namespace {
    pub(crate) fn from_entries(entries: Vec<IndexEntry>) -> Self {
        let mut namespace = Self::default();
        namespace.upsert_all(entries);
        namespace
    }

    pub(crate) fn entries(&self) -> &[IndexEntry] {
        &self.entries
    }

    pub(crate) fn len(&self) -> usize {
        self.entries.len()
    }

    /// Insert new entries at the end and replace existing ones in place.
    pub(crate) fn upsert_all(&mut self, entries: Vec<IndexEntry>) {
        for entry in entries {
            match self.positions.get(&entry.window.id) {
                Some(position) => self.entries[*position] = entry,
                None => {
                    self.positions
                        .insert(entry.window.id.clone(), self.entries.len());
                    self.entries.push(entry);
                }
            }
        }
    }

    pub(crate) fn query(&self, vector: &[f32], k: usize) -> Vec<ScoredWindow> {
        if k == 0 {
            return Vec::new();
        }
        let mut scored: Vec<(usize, f32)> = self
            .entries
            .iter()
            .enumerate()
            .map(|(rank, entry)| (rank, cosine_similarity(vector, &entry.vector)))
            .collect();
        // Stable sort keeps ascending rank among equal scores.
        scored.sort_by(|left, right| right.1.total_cmp(&left.1));
        scored.truncate(k);
        scored
            .into_iter()
            .map(|(rank, similarity)| ScoredWindow {
                window: self.entries[rank].window.clone(),
                similarity,
            })
            .collect()
    }
}

pub(crate) type SharedNamespace = Arc<RwLock<Namespace>>;

/// Namespace registry plus the index-wide tag.
#[derive(Debug, Default)]
pub(crate) struct Registry {
    tag: RwLock<Option<IndexTag>>,
    namespaces: RwLock<HashMap<String, SharedNamespace>>,
}

impl Registry {
    pub(crate) fn with_tag(tag: Option<IndexTag>) -> Self {
        Self {
            tag: RwLock::new(tag),
            namespaces: RwLock::new(HashMap::new()),
        }
    }

    pub(crate) fn tag(&self) -> Option<IndexTag> {
        self.tag.read().clone()
    }

    /// Validate a write and fix the tag on the first one.
    ///
    /// Returns the tag that was newly set, if any.
    pub(crate) fn claim_tag(
        &self,
        source: &EmbeddingSource,
        dimensions: usize,
    ) -> Result<Option<IndexTag>, IndexError> {
        let mut tag = self.tag.write();
        match tag.as_ref() {
            Some(current) => {
                check_against(current, source, dimensions)?;
                Ok(None)
            }
            None => {
                let claimed = IndexTag {
                    source: source.clone(),
                    dimensions,
                };
                *tag = Some(claimed.clone());
                Ok(Some(claimed))
            }
        }
    }

    /// Undo a tag set by [`Registry::claim_tag`] when the write that set it failed.
    pub(crate) fn release_tag(&self, claimed: &IndexTag) {
        let mut tag = self.tag.write();
        let unused = self
            .namespaces
            .read()
            .values()
            .all(|namespace| namespace.read().len() == 0);
        if tag.as_ref() == Some(claimed) && unused {
            *tag = None;
        }
    }

    /// Validate a namespace replacement and retag the index when nothing else pins it.
    ///
    /// `pinned_elsewhere` reports namespaces the caller holds outside this
    /// registry. Returns the tag as it was before the call.
    pub(crate) fn retag_for_replace(
        &self,
        persona_id: &str,
        source: &EmbeddingSource,
        dimensions: usize,
        pinned_elsewhere: bool,
    ) -> Result<Option<IndexTag>, IndexError> {
        let mut tag = self.tag.write();
        let previous = tag.clone();
        let pinned = pinned_elsewhere
            || self
                .namespaces
                .read()
                .iter()
                .any(|(name, namespace)| name != persona_id && namespace.read().len() > 0);
        match tag.as_ref() {
            Some(current) if pinned => check_against(current, source, dimensions)?,
            _ => {
                *tag = Some(IndexTag {
                    source: source.clone(),
                    dimensions,
                })
            }
        }
        Ok(previous)
    }

    pub(crate) fn set_tag(&self, tag: Option<IndexTag>) {
        *self.tag.write() = tag;
    }

    /// Validate a query against the tag; an untagged index accepts anything.
    pub(crate) fn check_query(
        &self,
        source: &EmbeddingSource,
        dimensions: usize,
    ) -> Result<(), IndexError> {
        match self.tag.read().as_ref() {
            Some(current) => check_against(current, source, dimensions),
            None => Ok(()),
        }
    }

    pub(crate) fn get(&self, persona_id: &str) -> Option<SharedNamespace> {
        self.namespaces.read().get(persona_id).cloned()
    }

    pub(crate) fn get_or_insert(&self, persona_id: &str) -> SharedNamespace {
        if let Some(namespace) = self.get(persona_id) {
            return namespace;
        }
        self.namespaces
            .write()
            .entry(persona_id.to_string())
            .or_default()
            .clone()
    }

    pub(crate) fn insert(&self, persona_id: &str, namespace: Namespace) -> SharedNamespace {
        self.namespaces
            .write()
            .entry(persona_id.to_string())
            .or_insert_with(|| Arc::new(RwLock::new(namespace)))
            .clone()
    }

    /// Swap the contents of one namespace, creating it if missing.
    pub(crate) fn replace(&self, persona_id: &str, namespace: Namespace) {
        let mut namespaces = self.namespaces.write();
        match namespaces.get(persona_id) {
            Some(shared) => *shared.write() = namespace,
            None => {
                namespaces.insert(persona_id.to_string(), Arc::new(RwLock::new(namespace)));
            }
        }
    }

    /// Remove a namespace; clears the tag once no namespace is left.
    pub(crate) fn remove(&self, persona_id: &str) -> bool {
        let mut tag = self.tag.write();
        let mut namespaces = self.namespaces.write();
        let removed = namespaces.remove(persona_id).is_some();
        if namespaces.is_empty() {
            *tag = None;
        }
        removed
    }

    pub(crate) fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .namespaces
            .read()
            .iter()
            .filter(|(_, namespace)| namespace.read().len() > 0)
            .map(|(name, _)| name.clone())
            .collect();
        names.sort();
        names
    }
}

fn check_against(
    tag: &IndexTag,
    source: &EmbeddingSource,
    dimensions: usize,
) -> Result<(), IndexError> {
    if &tag.source != source {
        return Err(IndexError::SourceMismatch {
            expected: tag.source.clone(),
            actual: source.clone(),
        });
    }
    if tag.dimensions != dimensions {
        return Err(IndexError::DimensionMismatch {
            expected: tag.dimensions,
            actual: dimensions,
        });
    }
    Ok(())
}

/// Width shared by every entry, rejecting empty or mixed-width vectors.
pub(crate) fn batch_dimensions(
    persona_id: &str,
    entries: &[IndexEntry],
) -> Result<Option<usize>, IndexError> {
    let mut dimensions = None;
    for entry in entries {
        if entry.window.persona_id != persona_id {
            return Err(IndexError::InvalidEntry(format!(
                "window {} belongs to {}, not {}",
                entry.window.id, entry.window.persona_id, persona_id
            )));
        }
        let width = entry.vector.len();
        if width == 0 {
            return Err(IndexError::InvalidEntry(format!(
                "window {} has an empty vector",
                entry.window.id
            )));
        }
        match dimensions {
            None => dimensions = Some(width),
            Some(expected) if expected != width => {
                return Err(IndexError::DimensionMismatch {
                    expected,
                    actual: width,
                });
            }
            Some(_) => {}
        }
    }
    Ok(dimensions)
}
