//! Durable vector index: a manifest plus one JSONL file per persona namespace.

use crate::namespace::{Namespace, Registry, SharedNamespace, batch_dimensions};
use crate::{IndexEntry, IndexError, IndexTag, ScoredWindow, VectorIndex};
use async_trait::async_trait;
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fs::{self, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use vibecheck_rs_protocol::EmbeddingSource;

const MANIFEST_FILE: &str = "manifest.json";
const NAMESPACE_DIR: &str = "namespaces";
const MANIFEST_VERSION: u32 = 1;

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
struct Manifest {
    version: u32,
    #[serde(default)]
    tag: Option<IndexTag>,
    #[serde(default)]
    namespaces: BTreeSet<String>,
}

/// File-backed vector index.
///
/// Namespaces load lazily on first use and every write rewrites the affected
/// namespace file atomically through a temp file and rename. Read failures are
/// logged and treated as empty; write failures are returned.
#[derive(Debug)]
pub struct FileVectorIndex {
    root: PathBuf,
    registry: Registry,
    manifest: parking_lot::Mutex<Manifest>,
}

impl FileVectorIndex {
    /// Open or create an index rooted at `root`.
    pub fn open(root: impl AsRef<Path>) -> Result<Self, IndexError> {
        let root = root.as_ref().to_path_buf();
        fs::create_dir_all(root.join(NAMESPACE_DIR))?;
        let manifest_path = root.join(MANIFEST_FILE);
        let manifest = if manifest_path.exists() {
            serde_json::from_str::<Manifest>(&fs::read_to_string(&manifest_path)?)?
        } else {
            Manifest {
                version: MANIFEST_VERSION,
                ..Manifest::default()
            }
        };
        info!(
            "opened file vector index (root={}, namespaces={}, tag={})",
            root.display(),
            manifest.namespaces.len(),
            manifest
                .tag
                .as_ref()
                .map(|tag| tag.source.to_string())
                .unwrap_or_else(|| "none".to_string())
        );
        Ok(Self {
            root,
            registry: Registry::with_tag(manifest.tag.clone()),
            manifest: parking_lot::Mutex::new(manifest),
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn namespace_path(&self, persona_id: &str) -> PathBuf {
        self.root
            .join(NAMESPACE_DIR)
            .join(format!("{}.jsonl", encode_file_stem(persona_id)))
    }

    /// Namespace for `persona_id`, loading it from disk on first use.
    fn load_namespace(&self, persona_id: &str) -> Result<Option<SharedNamespace>, IndexError> {
        if let Some(namespace) = self.registry.get(persona_id) {
            return Ok(Some(namespace));
        }
        let path = self.namespace_path(persona_id);
        if !path.exists() {
            return Ok(None);
        }
        let entries = read_entries(&path)?;
        debug!(
            "loaded namespace from disk (persona_id={}, entries={})",
            persona_id,
            entries.len()
        );
        Ok(Some(
            self.registry
                .insert(persona_id, Namespace::from_entries(entries)),
        ))
    }

    /// Loaded namespace, or empty on read failure.
    fn read_namespace(&self, persona_id: &str) -> Option<SharedNamespace> {
        match self.load_namespace(persona_id) {
            Ok(namespace) => namespace,
            Err(err) => {
                warn!(
                    "vector index unavailable for read; returning no results (persona_id={}, err={})",
                    persona_id, err
                );
                None
            }
        }
    }

    fn write_manifest(&self, manifest: &Manifest) -> Result<(), IndexError> {
        let contents = serde_json::to_vec_pretty(manifest)?;
        write_atomic(&self.root.join(MANIFEST_FILE), |file| {
            file.write_all(&contents)
        })
    }

    fn persist_membership(&self, persona_id: &str, present: bool) -> Result<(), IndexError> {
        let mut manifest = self.manifest.lock();
        let mut next = manifest.clone();
        let changed = if present {
            next.namespaces.insert(persona_id.to_string())
        } else {
            next.namespaces.remove(persona_id)
        };
        let tag = self.registry.tag();
        if !changed && next.tag == tag {
            return Ok(());
        }
        next.tag = tag;
        self.write_manifest(&next)?;
        *manifest = next;
        Ok(())
    }
}

#[async_trait]
impl VectorIndex for FileVectorIndex {
    async fn upsert_batch(
        &self,
        persona_id: &str,
        source: &EmbeddingSource,
        entries: Vec<IndexEntry>,
    ) -> Result<(), IndexError> {
        let Some(dimensions) = batch_dimensions(persona_id, &entries)? else {
            return Ok(());
        };
        let claimed = self.registry.claim_tag(source, dimensions)?;
        let result = self.write_entries(persona_id, entries);
        if result.is_err() {
            if let Some(claimed) = &claimed {
                self.registry.release_tag(claimed);
            }
        }
        result
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
            .read_namespace(persona_id)
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
        let previous = self.registry.retag_for_replace(
            persona_id,
            source,
            dimensions,
            self.others_on_disk(persona_id),
        )?;
        let next = Namespace::from_entries(entries);
        if let Err(err) = self.write_namespace_file(persona_id, &next) {
            self.registry.set_tag(previous);
            warn!(
                "namespace replacement failed; keeping previous entries (persona_id={}, err={})",
                persona_id, err
            );
            return Err(err);
        }
        let count = next.len();
        self.registry.replace(persona_id, next);
        self.persist_membership(persona_id, true)?;
        debug!(
            "replaced namespace (persona_id={}, count={})",
            persona_id, count
        );
        Ok(())
    }

    async fn clear_namespace(&self, persona_id: &str) -> Result<(), IndexError> {
        let path = self.namespace_path(persona_id);
        if path.exists() {
            fs::remove_file(&path)?;
        }
        let tag = self.registry.tag();
        self.registry.remove(persona_id);
        if self.others_on_disk(persona_id) {
            // Namespaces that were never loaded still hold vectors under the old tag.
            self.registry.set_tag(tag);
        }
        self.persist_membership(persona_id, false)?;
        info!("cleared namespace (persona_id={})", persona_id);
        Ok(())
    }

    fn tag(&self) -> Option<IndexTag> {
        self.registry.tag()
    }

    async fn namespaces(&self) -> Vec<String> {
        let manifest = self.manifest.lock().namespaces.clone();
        manifest
            .into_iter()
            .filter(|persona_id| {
                self.read_namespace(persona_id)
                    .is_some_and(|namespace| namespace.read().len() > 0)
            })
            .collect()
    }

    async fn namespace_len(&self, persona_id: &str) -> usize {
        self.read_namespace(persona_id)
            .map(|namespace| namespace.read().len())
            .unwrap_or(0)
    }
}

impl FileVectorIndex {
    fn write_entries(&self, persona_id: &str, entries: Vec<IndexEntry>) -> Result<(), IndexError> {
        let namespace = match self.load_namespace(persona_id)? {
            Some(namespace) => namespace,
            None => self.registry.get_or_insert(persona_id),
        };
        let count = entries.len();
        let mut guard = namespace.write();
        let mut next = guard.clone();
        next.upsert_all(entries);
        self.write_namespace_file(persona_id, &next)?;
        *guard = next;
        let total = guard.len();
        drop(guard);
        self.persist_membership(persona_id, true)?;
        debug!(
            "persisted windows (persona_id={}, count={}, total={})",
            persona_id, count, total
        );
        Ok(())
    }

    fn write_namespace_file(&self, persona_id: &str, namespace: &Namespace) -> Result<(), IndexError> {
        write_atomic(&self.namespace_path(persona_id), |file| {
            for entry in namespace.entries() {
                let line = serde_json::to_string(entry).map_err(std::io::Error::other)?;
                writeln!(file, "{line}")?;
            }
            Ok(())
        })
    }

    /// Whether the manifest lists namespaces besides `persona_id`, loaded or not.
    fn others_on_disk(&self, persona_id: &str) -> bool {
        self.manifest
            .lock()
            .namespaces
            .iter()
            .any(|name| name != persona_id)
    }
}

fn read_entries(path: &Path) -> Result<Vec<IndexEntry>, IndexError> {
    let reader = BufReader::new(OpenOptions::new().read(true).open(path)?);
    let mut entries = Vec::new();
    for line in reader.lines() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        entries.push(serde_json::from_str(&line)?);
    }
    Ok(entries)
}

/// Write through a sibling temp file and rename it over `path`.
fn write_atomic(
    path: &Path,
    write: impl FnOnce(&mut fs::File) -> std::io::Result<()>,
) -> Result<(), IndexError> {
    let mut temp_name = path.as_os_str().to_owned();
    temp_name.push(".tmp");
    let temp_path = PathBuf::from(temp_name);
    {
        let mut file = OpenOptions::new()
            .create(true)
            .truncate(true)
            .write(true)
            .open(&temp_path)?;
        write(&mut file)?;
        file.sync_all()?;
    }
    fs::rename(&temp_path, path)?;
    Ok(())
}

/// File stem safe on every platform; other bytes are hex-escaped.
fn encode_file_stem(persona_id: &str) -> String {
    let mut stem = String::with_capacity(persona_id.len());
    for byte in persona_id.bytes() {
        if byte.is_ascii_alphanumeric() || byte == b'-' || byte == b'_' {
            stem.push(byte as char);
        } else {
            stem.push_str(&format!("%{byte:02X}"));
        }
    }
    stem
}

#[cfg(test)]
mod tests {
    use super::{FileVectorIndex, encode_file_stem};
    use crate::{IndexEntry, IndexError, VectorIndex};
    use pretty_assertions::assert_eq;
    use std::fs;
    use tempfile::tempdir;
    use vibecheck_rs_protocol::{EmbeddingSource, Window};

    fn source() -> EmbeddingSource {
        EmbeddingSource::Service {
            model: "text-embedding-3-small".to_string(),
        }
    }

    fn entry(persona: &str, center: usize, vector: Vec<f32>) -> IndexEntry {
        IndexEntry {
            window: Window {
                id: format!("{persona}:{center:06}"),
                persona_id: persona.to_string(),
                center_index: center,
                text: format!("Me: line {center}"),
                source_message_ids: vec![format!("{persona}-m{center}")],
            },
            vector,
        }
    }

    #[test]
    fn file_stems_escape_separators() {
        assert_eq!(encode_file_stem("alice_01"), "alice_01");
        assert_eq!(encode_file_stem("../etc"), "%2E%2E%2Fetc");
    }

    #[tokio::test]
    async fn entries_and_tag_survive_reopen() {
        let temp = tempdir().expect("tempdir");
        {
            let index = FileVectorIndex::open(temp.path()).expect("open");
            index
                .upsert_batch(
                    "alice",
                    &source(),
                    vec![entry("alice", 0, vec![1.0, 0.0]), entry("alice", 1, vec![0.0, 1.0])],
                )
                .await
                .expect("upsert");
        }

        let reopened = FileVectorIndex::open(temp.path()).expect("reopen");
        let tag = reopened.tag().expect("tag");
        assert_eq!(tag.source, source());
        assert_eq!(tag.dimensions, 2);
        assert_eq!(reopened.namespaces().await, vec!["alice".to_string()]);
        let hits = reopened
            .query("alice", &source(), &[0.0, 1.0], 1)
            .await
            .expect("query");
        assert_eq!(hits[0].window.id, "alice:000001");

        let err = reopened
            .upsert(&EmbeddingSource::Fallback { dimensions: 2 }, entry("bob", 0, vec![1.0, 0.0]))
            .await
            .unwrap_err();
        assert!(matches!(err, IndexError::SourceMismatch { .. }));
    }

    #[tokio::test]
    async fn clear_removes_namespace_file() {
        let temp = tempdir().expect("tempdir");
        let index = FileVectorIndex::open(temp.path()).expect("open");
        index
            .upsert(&source(), entry("alice", 0, vec![1.0, 0.0]))
            .await
            .expect("alice");
        index
            .upsert(&source(), entry("bob", 0, vec![1.0, 0.0]))
            .await
            .expect("bob");

        index.clear_namespace("alice").await.expect("clear");

        assert!(!temp.path().join("namespaces").join("alice.jsonl").exists());
        assert_eq!(index.namespaces().await, vec!["bob".to_string()]);
        let reopened = FileVectorIndex::open(temp.path()).expect("reopen");
        assert_eq!(reopened.namespace_len("alice").await, 0);
        assert_eq!(reopened.namespace_len("bob").await, 1);
    }

    #[tokio::test]
    async fn corrupt_namespace_reads_as_empty() {
        let temp = tempdir().expect("tempdir");
        let index = FileVectorIndex::open(temp.path()).expect("open");
        index
            .upsert(&source(), entry("alice", 0, vec![1.0, 0.0]))
            .await
            .expect("upsert");
        fs::write(temp.path().join("namespaces").join("alice.jsonl"), "{not json\n")
            .expect("corrupt");

        let reopened = FileVectorIndex::open(temp.path()).expect("reopen");
        let hits = reopened
            .query("alice", &source(), &[1.0, 0.0], 3)
            .await
            .expect("query");
        assert!(hits.is_empty());
        assert_eq!(reopened.namespace_len("alice").await, 0);
    }

    #[tokio::test]
    async fn failed_replacement_keeps_previous_namespace() {
        let temp = tempdir().expect("tempdir");
        let index = FileVectorIndex::open(temp.path()).expect("open");
        index
            .upsert_batch(
                "alice",
                &source(),
                vec![entry("alice", 0, vec![1.0, 0.0]), entry("alice", 1, vec![0.0, 1.0])],
            )
            .await
            .expect("upsert");
        // A directory in the temp file's place makes the rewrite fail.
        let blocker = temp.path().join("namespaces").join("alice.jsonl.tmp");
        fs::create_dir(&blocker).expect("blocker");

        let rehashed = EmbeddingSource::Fallback { dimensions: 3 };
        let err = index
            .replace_namespace("alice", &rehashed, vec![entry("alice", 0, vec![1.0, 0.0, 0.0])])
            .await
            .unwrap_err();
        assert!(matches!(err, IndexError::Io(_)));
        assert_eq!(index.namespace_len("alice").await, 2);
        assert_eq!(index.tag().map(|tag| tag.source), Some(source()));
        let hits = index
            .query("alice", &source(), &[0.0, 1.0], 1)
            .await
            .expect("query");
        assert_eq!(hits[0].window.id, "alice:000001");
        let reopened = FileVectorIndex::open(temp.path()).expect("reopen");
        assert_eq!(reopened.namespace_len("alice").await, 2);

        fs::remove_dir(&blocker).expect("unblock");
        index
            .replace_namespace("alice", &rehashed, vec![entry("alice", 0, vec![1.0, 0.0, 0.0])])
            .await
            .expect("replace");
        assert_eq!(index.namespace_len("alice").await, 1);
        let reopened = FileVectorIndex::open(temp.path()).expect("reopen");
        assert_eq!(reopened.tag().map(|tag| tag.source), Some(rehashed));
        assert_eq!(reopened.namespace_len("alice").await, 1);
    }
}
