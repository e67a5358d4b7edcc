//! Persistence for indexed personas and generated conversations.

mod conversation;
mod persona;

pub use conversation::{ConversationStore, InMemoryConversationStore, JsonlConversationStore};
pub use persona::{InMemoryPersonaStore, JsonPersonaStore, PersonaStore, color_tag_for};

use thiserror::Error;
use vibecheck_rs_protocol::ConversationId;

/// Errors returned by persona and conversation stores.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),
    #[error("unsupported schema version: {0}")]
    UnsupportedSchema(u32),
    #[error("missing conversation metadata")]
    MissingMetadata,
    #[error("conversation already exists: {0}")]
    ConversationExists(ConversationId),
}
