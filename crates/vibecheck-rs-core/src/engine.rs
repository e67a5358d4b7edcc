//! `VibeCheck` facade wiring config, embedder, index, generator, and stores.

use crate::error::VibeCheckError;
use crate::generation::{ResponseGenerator, RetrievalEchoGenerator};
use crate::indexer::PersonaIndexer;
use crate::ingest::{normalize_export, validate_persona_id};
use crate::retriever::{RetrievedContext, Retriever};
use crate::scorer::{CompatibilityScorer, JitterSource, ScoreSnapshot};
use crate::simulator::{ConversationSimulator, SimulationSettings};
use crate::store::{
    ConversationStore, InMemoryConversationStore, InMemoryPersonaStore, JsonPersonaStore,
    JsonlConversationStore, PersonaStore, color_tag_for,
};
use crate::style::analyze_style;
use crate::windower::build_windows;
use futures_util::future::join_all;
use log::{info, warn};
use std::path::PathBuf;
use std::sync::Arc;
use vibecheck_rs_config::{IndexBackend, VibeCheckConfig};
use vibecheck_rs_embed::Embedder;
use vibecheck_rs_index::{FileVectorIndex, InMemoryVectorIndex, VectorIndex};
use vibecheck_rs_protocol::{
    Conversation, ConversationId, ConversationSummary, ExportRecord, Persona,
};

const PERSONA_DIR: &str = "personas";
const CONVERSATION_DIR: &str = "conversations";
const INDEX_DIR: &str = "index";

/// Raw input for indexing one persona.
#[derive(Debug, Clone, PartialEq)]
pub struct PersonaInput {
    pub id: String,
    pub name: String,
    pub bio: Option<String>,
    pub records: Vec<ExportRecord>,
}

impl PersonaInput {
    pub fn new(id: impl Into<String>, name: impl Into<String>, records: Vec<ExportRecord>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            bio: None,
            records,
        }
    }

    pub fn with_bio(mut self, bio: impl Into<String>) -> Self {
        self.bio = Some(bio.into());
        self
    }
}

/// Builder for [`VibeCheck`]; unset parts are derived from the config.
pub struct VibeCheckBuilder {
    config: VibeCheckConfig,
    embedder: Option<Embedder>,
    index: Option<Arc<dyn VectorIndex>>,
    generator: Option<Arc<dyn ResponseGenerator>>,
    personas: Option<Arc<dyn PersonaStore>>,
    conversations: Option<Arc<dyn ConversationStore>>,
    jitter: Option<Arc<dyn JitterSource>>,
}

impl VibeCheckBuilder {
    pub fn new(config: VibeCheckConfig) -> Self {
        Self {
            config,
            embedder: None,
            index: None,
            generator: None,
            personas: None,
            conversations: None,
            jitter: None,
        }
    }

    pub fn embedder(mut self, embedder: Embedder) -> Self {
        self.embedder = Some(embedder);
        self
    }

    pub fn index(mut self, index: Arc<dyn VectorIndex>) -> Self {
        self.index = Some(index);
        self
    }

    pub fn generator(mut self, generator: Arc<dyn ResponseGenerator>) -> Self {
        self.generator = Some(generator);
        self
    }

    pub fn persona_store(mut self, store: Arc<dyn PersonaStore>) -> Self {
        self.personas = Some(store);
        self
    }

    pub fn conversation_store(mut self, store: Arc<dyn ConversationStore>) -> Self {
        self.conversations = Some(store);
        self
    }

    pub fn jitter(mut self, jitter: Arc<dyn JitterSource>) -> Self {
        self.jitter = Some(jitter);
        self
    }

    /// Keep everything in memory: index and both stores.
    pub fn in_memory(mut self) -> Self {
        self.index = Some(Arc::new(InMemoryVectorIndex::new()));
        self.personas = Some(Arc::new(InMemoryPersonaStore::new()));
        self.conversations = Some(Arc::new(InMemoryConversationStore::new()));
        self
    }

    pub fn build(self) -> Result<VibeCheck, VibeCheckError> {
        self.config.validate()?;
        let config = self.config;
        let storage_root = PathBuf::from(&config.storage.root);

        let embedder = match self.embedder {
            Some(embedder) => embedder,
            None => Embedder::from_config(&config.embedding)?,
        };
        let embedder = Arc::new(embedder);
        let index = match self.index {
            Some(index) => index,
            None => build_default_index(&config, &storage_root)?,
        };
        let personas: Arc<dyn PersonaStore> = match self.personas {
            Some(store) => store,
            None => Arc::new(JsonPersonaStore::new(storage_root.join(PERSONA_DIR))?),
        };
        let conversations: Arc<dyn ConversationStore> = match self.conversations {
            Some(store) => store,
            None => Arc::new(JsonlConversationStore::new(
                storage_root.join(CONVERSATION_DIR),
            )?),
        };
        let scorer = match self.jitter {
            Some(jitter) => CompatibilityScorer::new(
                config.scoring.weights,
                config.scoring.jitter_amplitude,
                jitter,
            ),
            None => CompatibilityScorer::from_config(&config.scoring),
        };
        let retriever = Retriever::new(embedder.clone(), index.clone());
        let generator = match self.generator {
            Some(generator) => generator,
            None => {
                info!("no response generator configured; replies echo retrieved lines");
                Arc::new(RetrievalEchoGenerator::new())
            }
        };
        let simulator = ConversationSimulator::new(
            retriever.clone(),
            generator,
            SimulationSettings::from_config(&config.simulation, &config.retrieval),
        );

        info!(
            "vibecheck engine ready (embedding={}, index_tag={})",
            embedder.preferred_source(),
            index
                .tag()
                .map(|tag| tag.source.to_string())
                .unwrap_or_else(|| "none".to_string())
        );
        Ok(VibeCheck {
            indexer: PersonaIndexer::new(embedder.clone(), index.clone()),
            config,
            embedder,
            index,
            retriever,
            simulator,
            scorer,
            personas,
            conversations,
        })
    }
}

fn build_default_index(
    config: &VibeCheckConfig,
    storage_root: &std::path::Path,
) -> Result<Arc<dyn VectorIndex>, VibeCheckError> {
    match config.index.backend {
        IndexBackend::Memory => Ok(Arc::new(InMemoryVectorIndex::new())),
        IndexBackend::File => {
            let path = config
                .index
                .path
                .as_ref()
                .map(PathBuf::from)
                .unwrap_or_else(|| storage_root.join(INDEX_DIR));
            let index = FileVectorIndex::open(&path)
                .map_err(|err| VibeCheckError::IndexUnavailable(err.to_string()))?;
            Ok(Arc::new(index))
        }
    }
}

/// Persona indexing, conversation simulation, and replay scoring.
pub struct VibeCheck {
    config: VibeCheckConfig,
    embedder: Arc<Embedder>,
    index: Arc<dyn VectorIndex>,
    indexer: PersonaIndexer,
    retriever: Retriever,
    simulator: ConversationSimulator,
    scorer: CompatibilityScorer,
    personas: Arc<dyn PersonaStore>,
    conversations: Arc<dyn ConversationStore>,
}

impl VibeCheck {
    pub fn builder(config: VibeCheckConfig) -> VibeCheckBuilder {
        VibeCheckBuilder::new(config)
    }

    pub fn config(&self) -> &VibeCheckConfig {
        &self.config
    }

    pub fn embedder(&self) -> &Embedder {
        &self.embedder
    }

    pub fn index(&self) -> &Arc<dyn VectorIndex> {
        &self.index
    }

    /// Normalize, window, embed, and store one persona.
    pub async fn index_persona(&self, input: PersonaInput) -> Result<Persona, VibeCheckError> {
        validate_persona_id(&input.id)?;
        let messages = normalize_export(&input.id, &input.records)?;
        let windows = build_windows(&input.id, &messages, self.config.retrieval.window_radius)?;
        let own_texts: Vec<&str> = messages
            .iter()
            .filter(|message| message.sender_id == input.id)
            .map(|message| message.text.as_str())
            .collect();
        let style = analyze_style(&own_texts);
        let lock = self.indexer.lock_persona(&input.id).await;
        self.indexer.index_windows(&lock, &windows).await?;

        let persona = Persona {
            color_tag: color_tag_for(&input.id),
            id: input.id,
            name: input.name,
            bio: input.bio,
            style,
            windows,
        };
        self.personas.save(&persona)?;
        info!(
            "persona ready (persona_id={}, messages={}, windows={})",
            persona.id,
            messages.len(),
            persona.windows.len()
        );
        Ok(persona)
    }

    /// Index several personas concurrently; each result is independent.
    pub async fn index_personas(
        &self,
        inputs: Vec<PersonaInput>,
    ) -> Vec<(String, Result<Persona, VibeCheckError>)> {
        let jobs = inputs.into_iter().map(|input| async move {
            let persona_id = input.id.clone();
            let result = self.index_persona(input).await;
            if let Err(err) = &result {
                warn!("persona indexing failed (persona_id={}, err={})", persona_id, err);
            }
            (persona_id, result)
        });
        join_all(jobs).await
    }

    pub fn persona(&self, persona_id: &str) -> Result<Persona, VibeCheckError> {
        self.personas
            .get(persona_id)?
            .ok_or_else(|| VibeCheckError::UnknownPersona(persona_id.to_string()))
    }

    pub fn personas(&self) -> Result<Vec<Persona>, VibeCheckError> {
        Ok(self.personas.list()?)
    }

    /// Top windows of one persona for an ad-hoc query.
    pub async fn retrieve(
        &self,
        persona_id: &str,
        query: &str,
        k: Option<usize>,
    ) -> Result<RetrievedContext, VibeCheckError> {
        self.persona(persona_id)?;
        self.retriever
            .retrieve(persona_id, query, k.unwrap_or(self.config.retrieval.top_k))
            .await
    }

    /// Generate and store a conversation between two indexed personas.
    pub async fn run_simulation(
        &self,
        persona_a: &str,
        persona_b: &str,
        starter: Option<&str>,
    ) -> Result<Conversation, VibeCheckError> {
        let persona_a = self.persona(persona_a)?;
        let persona_b = self.persona(persona_b)?;
        let conversation = self.simulator.simulate(&persona_a, &persona_b, starter).await?;
        self.conversations.save(&conversation)?;
        Ok(conversation)
    }

    /// Score the prefix of `conversation` visible at `fraction` of the replay.
    pub fn score_at(
        &self,
        conversation: &Conversation,
        fraction: f64,
    ) -> Result<ScoreSnapshot, VibeCheckError> {
        self.scorer.score(conversation, fraction)
    }

    pub fn conversation(&self, id: ConversationId) -> Result<Conversation, VibeCheckError> {
        self.conversations
            .load(id)?
            .ok_or(VibeCheckError::UnknownConversation(id))
    }

    pub fn conversations(&self) -> Result<Vec<ConversationSummary>, VibeCheckError> {
        Ok(self.conversations.list()?)
    }

    pub fn delete_conversation(&self, id: ConversationId) -> Result<bool, VibeCheckError> {
        Ok(self.conversations.delete(id)?)
    }
}
