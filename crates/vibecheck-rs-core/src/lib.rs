//! Retrieval-augmented persona pipeline for VibeCheck.
//!
//! Message exports are normalized into per-persona histories, cut into context
//! windows, embedded, and stored in a per-persona vector index. Two indexed
//! personas can then be simulated talking to each other, each turn grounded in
//! the acting persona's most similar windows, and the resulting transcript is
//! scored at any replay position.

pub mod engine;
pub mod error;
pub mod generation;
pub mod indexer;
pub mod ingest;
pub mod retriever;
pub mod scorer;
pub mod simulator;
pub mod store;
pub mod style;
pub mod windower;

pub use engine::{PersonaInput, VibeCheck, VibeCheckBuilder};
pub use error::VibeCheckError;
pub use generation::{
    GenerationRequest, LlmResponseGenerator, ResponseGenerator, RetrievalEchoGenerator,
};
pub use indexer::{PersonaIndexer, PersonaLock};
pub use ingest::{normalize_export, parse_export};
pub use retriever::{RetrievedContext, Retriever};
pub use scorer::{
    CompatibilityScorer, Factor, JitterSource, LiveJitter, NoJitter, ScoreSnapshot, ScoreTimeline,
    SeededJitter,
};
pub use simulator::{ConversationSimulator, SimulationSettings, Turn};
pub use store::{
    ConversationStore, InMemoryConversationStore, InMemoryPersonaStore, JsonPersonaStore,
    JsonlConversationStore, PersonaStore, StoreError,
};
pub use style::analyze_style;
pub use windower::build_windows;
