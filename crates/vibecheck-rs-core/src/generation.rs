//! Turn generation: persona prompt plus retrieved context to the next message.

use crate::error::VibeCheckError;
use crate::retriever::RetrievedContext;
use crate::style::describe_style;
use async_trait::async_trait;
use autoagents_llm::LLMProvider;
use autoagents_llm::chat::{ChatMessage, ChatProvider, ChatRole, MessageType};
use log::debug;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use vibecheck_rs_config::GenerationConfig;
use vibecheck_rs_embed::{RetryError, RetryPolicy, Transient};
use vibecheck_rs_protocol::{Capitalization, Message, Persona};

/// Everything a generator sees for one turn.
#[derive(Debug, Clone, Copy)]
pub struct GenerationRequest<'a> {
    /// Persona speaking this turn.
    pub persona: &'a Persona,
    pub context: &'a RetrievedContext,
    /// Conversation so far, opening line included.
    pub conversation: &'a [Message],
}

/// Produces the acting persona's next message.
#[async_trait]
pub trait ResponseGenerator: Send + Sync {
    async fn generate(&self, request: GenerationRequest<'_>) -> Result<String, VibeCheckError>;
}

pub fn system_prompt(persona: &Persona) -> String {
    format!(
        "You are simulating how a specific person texts. You must respond EXACTLY as they would, \
         matching their texting style perfectly.\n\n\
         CRITICAL STYLE RULES:\n{}\n\n\
         IMPORTANT:\n\
         - Match their exact tone, energy, and vocabulary\n\
         - Keep responses natural and conversational\n\
         - Don't be overly formal or verbose if their style is casual\n\
         - Don't be too brief if their style is more detailed\n\
         - Respond with ONLY the message text, no quotes and no labels",
        describe_style(&persona.style)
    )
}

/// Retrieved examples, then the conversation labelled from the persona's side.
pub fn user_prompt(request: &GenerationRequest<'_>) -> String {
    let mut prompt = String::from("EXAMPLES OF HOW THIS PERSON RESPONDS:\n\n");
    if request.context.is_empty() {
        prompt.push_str("(no examples found)\n");
    } else {
        prompt.push_str(&request.context.block);
        prompt.push('\n');
    }
    prompt.push_str("\nCURRENT CONVERSATION:\n");
    for message in request.conversation {
        let label = if message.sender_id == request.persona.id {
            "You"
        } else {
            "Them"
        };
        prompt.push_str(&format!("{label}: {}\n", message.text));
    }
    prompt.push_str("\nNow respond as this person would. Remember to match their style exactly.");
    prompt
}

/// Trim whitespace and one layer of wrapping quotes.
fn clean_reply(reply: &str) -> String {
    let trimmed = reply.trim();
    let unquoted = trimmed
        .strip_prefix('"')
        .and_then(|rest| rest.strip_suffix('"'))
        .unwrap_or(trimmed);
    unquoted.trim().to_string()
}

#[derive(Debug)]
enum AttemptError {
    Provider(String),
    Timeout(Duration),
}

impl fmt::Display for AttemptError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Provider(message) => write!(f, "{message}"),
            Self::Timeout(timeout) => write!(f, "timed out after {}ms", timeout.as_millis()),
        }
    }
}

impl Transient for AttemptError {
    fn is_transient(&self) -> bool {
        true
    }
}

/// Generator backed by an `autoagents-llm` chat provider.
#[derive(Clone)]
pub struct LlmResponseGenerator {
    llm: Arc<dyn LLMProvider>,
    timeout: Duration,
    retry: RetryPolicy,
}

impl LlmResponseGenerator {
    pub fn new(llm: Arc<dyn LLMProvider>, timeout: Duration, retry: RetryPolicy) -> Self {
        Self {
            llm,
            timeout: timeout.max(Duration::from_millis(1)),
            retry,
        }
    }

    pub fn from_config(llm: Arc<dyn LLMProvider>, config: &GenerationConfig) -> Self {
        Self::new(
            llm,
            Duration::from_millis(config.timeout_ms),
            RetryPolicy::from(&config.retry),
        )
    }
}

#[async_trait]
impl ResponseGenerator for LlmResponseGenerator {
    async fn generate(&self, request: GenerationRequest<'_>) -> Result<String, VibeCheckError> {
        let messages = vec![
            ChatMessage {
                role: ChatRole::System,
                message_type: MessageType::Text,
                content: system_prompt(request.persona),
            },
            ChatMessage {
                role: ChatRole::User,
                message_type: MessageType::Text,
                content: user_prompt(&request),
            },
        ];
        let outcome = self
            .retry
            .run("generation", |_attempt| {
                let messages = &messages;
                async move {
                    match tokio::time::timeout(
                        self.timeout,
                        self.llm.chat_with_tools(messages, None, None),
                    )
                    .await
                    {
                        Ok(Ok(response)) => Ok(response.text().unwrap_or_default()),
                        Ok(Err(err)) => Err(AttemptError::Provider(err.to_string())),
                        Err(_) => Err(AttemptError::Timeout(self.timeout)),
                    }
                }
            })
            .await;
        let reply = match outcome {
            Ok(reply) => clean_reply(&reply),
            Err(RetryError::Permanent(err)) => return Err(VibeCheckError::Generation(err.to_string())),
            Err(RetryError::Exhausted { attempts, last }) => {
                return Err(VibeCheckError::Generation(format!(
                    "gave up after {attempts} attempts: {last}"
                )));
            }
        };
        if reply.is_empty() {
            return Err(VibeCheckError::Generation(format!(
                "empty reply for persona {}",
                request.persona.id
            )));
        }
        debug!(
            "generated turn (persona_id={}, reply_len={})",
            request.persona.id,
            reply.len()
        );
        Ok(reply)
    }
}

/// Offline generator that replays the persona's own lines from its best
/// retrieved windows.
///
/// Candidates are the top three hits; the conversation length picks which
/// one is tried first so consecutive turns do not repeat. Falls back to a
/// greeting in the persona's capitalization when nothing matches.
#[derive(Debug, Clone, Copy, Default)]
pub struct RetrievalEchoGenerator;

const ECHO_CANDIDATES: usize = 3;

impl RetrievalEchoGenerator {
    pub fn new() -> Self {
        Self
    }
}

/// The persona's line nearest the middle of a rendered window.
fn own_line<'a>(persona_id: &str, window_text: &'a str) -> Option<&'a str> {
    let prefix = format!("{persona_id}: ");
    let lines: Vec<&str> = window_text.lines().collect();
    let middle = lines.len() / 2;
    lines
        .iter()
        .enumerate()
        .filter_map(|(position, line)| {
            let text = line.strip_prefix(prefix.as_str())?.trim();
            (!text.is_empty()).then_some((position.abs_diff(middle), text))
        })
        .min_by_key(|(distance, _)| *distance)
        .map(|(_, text)| text)
}

fn greeting(persona: &Persona) -> &'static str {
    match persona.style.capitalization {
        Capitalization::Lowercase => "hey",
        _ => "Hey!",
    }
}

#[async_trait]
impl ResponseGenerator for RetrievalEchoGenerator {
    async fn generate(&self, request: GenerationRequest<'_>) -> Result<String, VibeCheckError> {
        let candidates = request.context.windows.len().min(ECHO_CANDIDATES);
        let start = if candidates == 0 {
            0
        } else {
            request.conversation.len() % candidates
        };
        let reply = (0..candidates)
            .map(|offset| &request.context.windows[(start + offset) % candidates])
            .find_map(|hit| own_line(&request.persona.id, &hit.window.text))
            .unwrap_or_else(|| greeting(request.persona));
        debug!(
            "echoed turn (persona_id={}, candidates={})",
            request.persona.id, candidates
        );
        Ok(reply.to_string())
    }
}
