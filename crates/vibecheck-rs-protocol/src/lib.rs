//! Shared data types for VibeCheck personas, windows, conversations, and insights.

mod embedding;
mod export;
mod persona;

pub use embedding::EmbeddingSource;
pub use export::{ExportDocument, ExportRecord};
pub use persona::{Capitalization, Persona, PunctuationStyle, StyleProfile};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Unique identifier for a persona namespace.
pub type PersonaId = String;
/// Unique identifier for a message window.
pub type WindowId = String;
/// Unique identifier for a message.
pub type MessageId = String;
/// Unique identifier for a generated conversation.
pub type ConversationId = Uuid;

/// A single chat message.
///
/// `timestamp_seq` is a strictly increasing ordinal inside its sequence, not a
/// wall-clock time.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Message {
    /// Message identifier.
    pub id: MessageId,
    /// Persona (or counterpart label) that sent the message.
    pub sender_id: String,
    /// Message body.
    pub text: String,
    /// Ordering key.
    pub timestamp_seq: u64,
}

/// A message plus its surrounding context, the unit of retrieval.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Window {
    /// Window identifier, unique inside the owning persona.
    pub id: WindowId,
    /// Owning persona.
    pub persona_id: PersonaId,
    /// Position of the center message in the persona history.
    pub center_index: usize,
    /// Rendered context, one `sender: text` line per message.
    pub text: String,
    /// Messages that contributed to the window, in order.
    pub source_message_ids: Vec<MessageId>,
}

/// A generated two-persona conversation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Conversation {
    /// Conversation identifier.
    pub id: ConversationId,
    /// Persona that owns the first turn.
    pub persona_a: PersonaId,
    /// Counterpart persona.
    pub persona_b: PersonaId,
    /// Optional opening line attributed to persona A.
    #[serde(default)]
    pub starter: Option<String>,
    /// Generated messages, in order.
    pub messages: Vec<Message>,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
}

impl Conversation {
    /// Return true when `sender_id` is one of the two participants.
    pub fn is_participant(&self, sender_id: &str) -> bool {
        self.persona_a == sender_id || self.persona_b == sender_id
    }

    /// Messages authored by the given persona.
    pub fn messages_from<'a>(&'a self, persona_id: &'a str) -> impl Iterator<Item = &'a Message> {
        self.messages
            .iter()
            .filter(move |message| message.sender_id == persona_id)
    }
}

/// Summary row used when listing stored conversations.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ConversationSummary {
    /// Conversation identifier.
    pub id: ConversationId,
    /// First persona.
    pub persona_a: PersonaId,
    /// Second persona.
    pub persona_b: PersonaId,
    /// Total number of messages.
    pub message_count: usize,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
}

impl From<&Conversation> for ConversationSummary {
    fn from(conversation: &Conversation) -> Self {
        Self {
            id: conversation.id,
            persona_a: conversation.persona_a.clone(),
            persona_b: conversation.persona_b.clone(),
            message_count: conversation.messages.len(),
            created_at: conversation.created_at,
        }
    }
}

/// One scored compatibility factor.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Insight {
    /// Stable factor identifier (`i1`..`i5`).
    pub id: String,
    /// Display title.
    pub title: String,
    /// Integer score in `0..=100`.
    pub score: u8,
    /// Short description.
    pub description: String,
    /// Longer explanation.
    pub details: String,
}
