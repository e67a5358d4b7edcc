//! Generated conversations, stored as JSONL rollouts.

use super::StoreError;
use chrono::{DateTime, Utc};
use log::{debug, info, warn};
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs::{self, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use uuid::Uuid;
use vibecheck_rs_protocol::{Conversation, ConversationId, ConversationSummary, Message};

const SCHEMA_VERSION: u32 = 1;

/// Store of finished conversations. Saved conversations are never rewritten.
pub trait ConversationStore: Send + Sync {
    /// Persist a new conversation; fails if the id is already taken.
    fn save(&self, conversation: &Conversation) -> Result<(), StoreError>;
    fn load(&self, id: ConversationId) -> Result<Option<Conversation>, StoreError>;
    /// Summaries, newest first.
    fn list(&self) -> Result<Vec<ConversationSummary>, StoreError>;
    /// Remove a conversation; returns whether it existed.
    fn delete(&self, id: ConversationId) -> Result<bool, StoreError>;
}

fn newest_first(summaries: &mut [ConversationSummary]) {
    summaries.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(a.id.cmp(&b.id)));
}

#[derive(Debug, Default)]
pub struct InMemoryConversationStore {
    conversations: RwLock<HashMap<ConversationId, Conversation>>,
}

impl InMemoryConversationStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl ConversationStore for InMemoryConversationStore {
    fn save(&self, conversation: &Conversation) -> Result<(), StoreError> {
        let mut conversations = self.conversations.write();
        if conversations.contains_key(&conversation.id) {
            return Err(StoreError::ConversationExists(conversation.id));
        }
        conversations.insert(conversation.id, conversation.clone());
        Ok(())
    }

    fn load(&self, id: ConversationId) -> Result<Option<Conversation>, StoreError> {
        Ok(self.conversations.read().get(&id).cloned())
    }

    fn list(&self) -> Result<Vec<ConversationSummary>, StoreError> {
        let mut summaries: Vec<ConversationSummary> = self
            .conversations
            .read()
            .values()
            .map(ConversationSummary::from)
            .collect();
        newest_first(&mut summaries);
        Ok(summaries)
    }

    fn delete(&self, id: ConversationId) -> Result<bool, StoreError> {
        Ok(self.conversations.write().remove(&id).is_some())
    }
}

/// One line per event.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum RolloutEvent {
    SchemaVersion {
        version: u32,
    },
    ConversationCreated {
        conversation_id: ConversationId,
        persona_a: String,
        persona_b: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        starter: Option<String>,
        created_at: DateTime<Utc>,
    },
    Message {
        conversation_id: ConversationId,
        message: Message,
    },
}

#[derive(Default)]
struct RolloutState {
    version: Option<u32>,
    header: Option<(String, String, Option<String>, DateTime<Utc>)>,
    messages: Vec<Message>,
}

impl RolloutState {
    fn apply(&mut self, event: RolloutEvent) -> Result<(), StoreError> {
        match event {
            RolloutEvent::SchemaVersion { version } => {
                if version > SCHEMA_VERSION {
                    return Err(StoreError::UnsupportedSchema(version));
                }
                self.version = Some(version);
            }
            RolloutEvent::ConversationCreated {
                persona_a,
                persona_b,
                starter,
                created_at,
                ..
            } => {
                self.header = Some((persona_a, persona_b, starter, created_at));
            }
            RolloutEvent::Message { message, .. } => self.messages.push(message),
        }
        Ok(())
    }

    fn finish(self, id: ConversationId) -> Result<Conversation, StoreError> {
        self.version.ok_or(StoreError::MissingMetadata)?;
        let (persona_a, persona_b, starter, created_at) =
            self.header.ok_or(StoreError::MissingMetadata)?;
        Ok(Conversation {
            id,
            persona_a,
            persona_b,
            starter,
            messages: self.messages,
            created_at,
        })
    }
}

/// JSONL-backed conversation store: a schema line, a creation line, then one
/// line per message.
pub struct JsonlConversationStore {
    root: PathBuf,
    write_lock: Mutex<()>,
}

impl JsonlConversationStore {
    pub fn new(root: impl AsRef<Path>) -> Result<Self, StoreError> {
        let root = root.as_ref().to_path_buf();
        fs::create_dir_all(&root)?;
        info!("initialized conversation store (root={})", root.display());
        Ok(Self {
            root,
            write_lock: Mutex::new(()),
        })
    }

    fn rollout_path(&self, id: ConversationId) -> PathBuf {
        self.root.join(format!("{id}.jsonl"))
    }

    fn read_rollout(&self, id: ConversationId) -> Result<Option<Conversation>, StoreError> {
        let path = self.rollout_path(id);
        if !path.exists() {
            return Ok(None);
        }
        let reader = BufReader::new(OpenOptions::new().read(true).open(&path)?);
        let mut rollout = RolloutState::default();
        for line in reader.lines() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            rollout.apply(serde_json::from_str(&line)?)?;
        }
        Ok(Some(rollout.finish(id)?))
    }
}

impl ConversationStore for JsonlConversationStore {
    fn save(&self, conversation: &Conversation) -> Result<(), StoreError> {
        let _guard = self.write_lock.lock();
        let path = self.rollout_path(conversation.id);
        if path.exists() {
            return Err(StoreError::ConversationExists(conversation.id));
        }
        let mut events = Vec::with_capacity(conversation.messages.len() + 2);
        events.push(RolloutEvent::SchemaVersion {
            version: SCHEMA_VERSION,
        });
        events.push(RolloutEvent::ConversationCreated {
            conversation_id: conversation.id,
            persona_a: conversation.persona_a.clone(),
            persona_b: conversation.persona_b.clone(),
            starter: conversation.starter.clone(),
            created_at: conversation.created_at,
        });
        events.extend(conversation.messages.iter().map(|message| RolloutEvent::Message {
            conversation_id: conversation.id,
            message: message.clone(),
        }));
        let mut buffer = String::new();
        for event in &events {
            buffer.push_str(&serde_json::to_string(event)?);
            buffer.push('\n');
        }

        let mut file = OpenOptions::new()
            .create_new(true)
            .write(true)
            .open(&path)?;
        file.write_all(buffer.as_bytes())?;
        file.sync_all()?;
        info!(
            "saved conversation (conversation_id={}, messages={})",
            conversation.id,
            conversation.messages.len()
        );
        Ok(())
    }

    fn load(&self, id: ConversationId) -> Result<Option<Conversation>, StoreError> {
        self.read_rollout(id)
    }

    fn list(&self) -> Result<Vec<ConversationSummary>, StoreError> {
        let mut summaries = Vec::new();
        for entry in fs::read_dir(&self.root)? {
            let path = entry?.path();
            if path.extension().and_then(|ext| ext.to_str()) != Some("jsonl") {
                continue;
            }
            let Some(id) = path
                .file_stem()
                .and_then(|stem| stem.to_str())
                .and_then(|stem| Uuid::parse_str(stem).ok())
            else {
                continue;
            };
            match self.read_rollout(id) {
                Ok(Some(conversation)) => summaries.push(ConversationSummary::from(&conversation)),
                Ok(None) => {}
                Err(err) => warn!(
                    "skipping unreadable rollout (path={}, err={})",
                    path.display(),
                    err
                ),
            }
        }
        newest_first(&mut summaries);
        debug!("listed conversations (count={})", summaries.len());
        Ok(summaries)
    }

    fn delete(&self, id: ConversationId) -> Result<bool, StoreError> {
        let path = self.rollout_path(id);
        if path.exists() {
            info!("deleting conversation rollout (conversation_id={})", id);
            fs::remove_file(path)?;
            Ok(true)
        } else {
            warn!("conversation rollout not found (conversation_id={})", id);
            Ok(false)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{ConversationStore, InMemoryConversationStore, JsonlConversationStore};
    use crate::store::StoreError;
    use chrono::{Duration, Utc};
    use pretty_assertions::assert_eq;
    use std::fs;
    use tempfile::tempdir;
    use uuid::Uuid;
    use vibecheck_rs_protocol::{Conversation, ConversationSummary, Message};

    fn conversation(minutes_ago: i64) -> Conversation {
        Conversation {
            id: Uuid::new_v4(),
            persona_a: "alice".to_string(),
            persona_b: "bob".to_string(),
            starter: Some("hey you".to_string()),
            messages: vec![
                Message {
                    id: "c-1".to_string(),
                    sender_id: "bob".to_string(),
                    text: "oh hi".to_string(),
                    timestamp_seq: 1,
                },
                Message {
                    id: "c-2".to_string(),
                    sender_id: "alice".to_string(),
                    text: "what's new".to_string(),
                    timestamp_seq: 2,
                },
            ],
            created_at: Utc::now() - Duration::minutes(minutes_ago),
        }
    }

    #[test]
    fn jsonl_store_round_trip() {
        let temp = tempdir().expect("tempdir");
        let store = JsonlConversationStore::new(temp.path()).expect("store");
        let older = conversation(10);
        let newer = conversation(1);
        store.save(&older).expect("save older");
        store.save(&newer).expect("save newer");

        let loaded = store.load(older.id).expect("load").expect("conversation");
        assert_eq!(loaded, older);

        let contents = fs::read_to_string(temp.path().join(format!("{}.jsonl", older.id)))
            .expect("rollout");
        let first_line = contents.lines().next().expect("header");
        assert_eq!(first_line, r#"{"type":"schema_version","version":1}"#);
        assert_eq!(contents.lines().count(), 4);

        let summaries = store.list().expect("list");
        assert_eq!(
            summaries,
            vec![ConversationSummary::from(&newer), ConversationSummary::from(&older)]
        );

        assert_eq!(store.delete(older.id).expect("delete"), true);
        assert_eq!(store.load(older.id).expect("load after delete"), None);
        assert_eq!(store.delete(older.id).expect("delete again"), false);
    }

    #[test]
    fn saved_conversations_are_not_overwritten() {
        let temp = tempdir().expect("tempdir");
        let store = JsonlConversationStore::new(temp.path()).expect("store");
        let original = conversation(0);
        store.save(&original).expect("save");

        let mut changed = original.clone();
        changed.messages.clear();
        let err = store.save(&changed).unwrap_err();
        assert!(matches!(err, StoreError::ConversationExists(id) if id == original.id));
        assert_eq!(store.load(original.id).expect("load"), Some(original));

        let memory = InMemoryConversationStore::new();
        memory.save(&changed).expect("memory save");
        assert!(matches!(
            memory.save(&changed).unwrap_err(),
            StoreError::ConversationExists(_)
        ));
    }

    #[test]
    fn newer_schema_is_rejected() {
        let temp = tempdir().expect("tempdir");
        let store = JsonlConversationStore::new(temp.path()).expect("store");
        let id = Uuid::new_v4();
        fs::write(
            temp.path().join(format!("{id}.jsonl")),
            "{\"type\":\"schema_version\",\"version\":9}\n",
        )
        .expect("write");
        assert!(matches!(
            store.load(id).unwrap_err(),
            StoreError::UnsupportedSchema(9)
        ));
        assert!(store.list().expect("list").is_empty());
    }
}
