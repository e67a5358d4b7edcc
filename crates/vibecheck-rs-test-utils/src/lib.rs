//! Test helpers shared across VibeCheck crates.

pub mod embedding;
pub mod llm;

pub use embedding::{FailingTransport, HashingTransport};
pub use llm::{FailingLLM, FixedChatResponse, FixedLLM, FlakyLLM, ScriptedLLM};
