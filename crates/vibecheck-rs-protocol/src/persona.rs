use crate::{PersonaId, Window};
use serde::{Deserialize, Serialize};

/// Dominant capitalization habit of a persona.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum Capitalization {
    Lowercase,
    SentenceCase,
    #[default]
    Mixed,
}

/// Dominant punctuation habit of a persona.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum PunctuationStyle {
    Exclamatory,
    Formal,
    #[default]
    Minimal,
}

/// Texting habits derived from a persona's own messages.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct StyleProfile {
    /// Mean message length in characters.
    pub avg_length: f64,
    /// True when emoji appear more often than once every ten messages.
    pub uses_emojis: bool,
    /// Emoji per message.
    pub emoji_frequency: f64,
    pub capitalization: Capitalization,
    pub punctuation: PunctuationStyle,
    /// Most repeated word pairs.
    #[serde(default)]
    pub common_phrases: Vec<String>,
    /// Unique words over total words.
    pub vocabulary_richness: f64,
}

/// An indexed persona.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Persona {
    pub id: PersonaId,
    pub name: String,
    /// Display colour derived from the id.
    pub color_tag: String,
    #[serde(default)]
    pub bio: Option<String>,
    #[serde(default)]
    pub style: StyleProfile,
    /// Windows in source message order.
    #[serde(default)]
    pub windows: Vec<Window>,
}
