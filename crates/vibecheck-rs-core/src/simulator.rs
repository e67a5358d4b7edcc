//! Turn-by-turn conversation between two indexed personas.

use crate::error::VibeCheckError;
use crate::generation::{GenerationRequest, ResponseGenerator};
use crate::retriever::Retriever;
use crate::windower::render_lines;
use chrono::Utc;
use log::{debug, info};
use std::sync::Arc;
use uuid::Uuid;
use vibecheck_rs_config::{RetrievalConfig, SimulationConfig};
use vibecheck_rs_protocol::{Conversation, Message, Persona};

/// Whose turn it is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Turn {
    PersonaA,
    PersonaB,
}

impl Turn {
    /// First speaker: B answers a starter line, otherwise A opens.
    pub fn initial(has_starter: bool) -> Self {
        if has_starter {
            Self::PersonaB
        } else {
            Self::PersonaA
        }
    }

    pub fn flip(self) -> Self {
        match self {
            Self::PersonaA => Self::PersonaB,
            Self::PersonaB => Self::PersonaA,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SimulationSettings {
    pub max_turns: usize,
    pub window_radius: usize,
    pub top_k: usize,
    pub opening_query: String,
}

impl SimulationSettings {
    pub fn from_config(simulation: &SimulationConfig, retrieval: &RetrievalConfig) -> Self {
        Self {
            max_turns: simulation.max_turns,
            window_radius: retrieval.window_radius,
            top_k: retrieval.top_k,
            opening_query: simulation.opening_query.clone(),
        }
    }
}

impl Default for SimulationSettings {
    fn default() -> Self {
        Self::from_config(&SimulationConfig::default(), &RetrievalConfig::default())
    }
}

pub struct ConversationSimulator {
    retriever: Retriever,
    generator: Arc<dyn ResponseGenerator>,
    settings: SimulationSettings,
}

impl ConversationSimulator {
    pub fn new(
        retriever: Retriever,
        generator: Arc<dyn ResponseGenerator>,
        settings: SimulationSettings,
    ) -> Self {
        Self {
            retriever,
            generator,
            settings,
        }
    }

    pub fn settings(&self) -> &SimulationSettings {
        &self.settings
    }

    /// Generate a full conversation of `max_turns` messages.
    ///
    /// Any retrieval or generation failure aborts the run and nothing partial
    /// is returned.
    pub async fn simulate(
        &self,
        persona_a: &Persona,
        persona_b: &Persona,
        starter: Option<&str>,
    ) -> Result<Conversation, VibeCheckError> {
        if persona_a.id == persona_b.id {
            return Err(VibeCheckError::InvalidInput(format!(
                "a persona cannot talk to itself: {}",
                persona_a.id
            )));
        }
        let starter = starter
            .map(str::trim)
            .filter(|text| !text.is_empty())
            .map(str::to_string);
        let id = Uuid::new_v4();
        info!(
            "starting simulation (conversation_id={}, persona_a={}, persona_b={}, max_turns={})",
            id, persona_a.id, persona_b.id, self.settings.max_turns
        );

        // The opening line is shown to the generator but never stored as a message.
        let mut transcript: Vec<Message> = starter
            .iter()
            .map(|text| Message {
                id: format!("{id}-starter"),
                sender_id: persona_a.id.clone(),
                text: text.clone(),
                timestamp_seq: 0,
            })
            .collect();
        let opening = transcript.len();
        let mut turn = Turn::initial(starter.is_some());

        for step in 1..=self.settings.max_turns {
            let speaker = match turn {
                Turn::PersonaA => persona_a,
                Turn::PersonaB => persona_b,
            };
            let query = self.query_for(&transcript);
            let context = self
                .retriever
                .retrieve(&speaker.id, &query, self.settings.top_k)
                .await?;
            let text = self
                .generator
                .generate(GenerationRequest {
                    persona: speaker,
                    context: &context,
                    conversation: &transcript,
                })
                .await?;
            debug!(
                "turn complete (conversation_id={}, step={}, speaker={}, hits={})",
                id,
                step,
                speaker.id,
                context.windows.len()
            );
            transcript.push(Message {
                id: format!("{id}-{step}"),
                sender_id: speaker.id.clone(),
                text,
                timestamp_seq: step as u64,
            });
            turn = turn.flip();
        }

        let messages = transcript.split_off(opening);
        info!(
            "simulation finished (conversation_id={}, messages={})",
            id,
            messages.len()
        );
        Ok(Conversation {
            id,
            persona_a: persona_a.id.clone(),
            persona_b: persona_b.id.clone(),
            starter,
            messages,
            created_at: Utc::now(),
        })
    }

    /// Trailing `2 * radius + 1` lines, or the opening query for an empty transcript.
    fn query_for(&self, transcript: &[Message]) -> String {
        if transcript.is_empty() {
            return self.settings.opening_query.clone();
        }
        let span = self
            .settings
            .window_radius
            .saturating_mul(2)
            .saturating_add(1);
        render_lines(&transcript[transcript.len().saturating_sub(span)..])
    }
}
