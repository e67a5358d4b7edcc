//! Progressive compatibility scoring over a transcript prefix.
//!
//! Factor scores are computed once from the whole conversation
//! ([`ScoreTimeline`]) and then scaled by how much of it is visible, so any
//! replay position can be scored without re-reading earlier prefixes.

use crate::error::VibeCheckError;
use crate::style::count_emojis;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::Arc;
use vibecheck_rs_config::{FactorWeights, ScoringConfig};
use vibecheck_rs_protocol::{Conversation, Insight};

const TOPIC_WORD_MIN_LEN: usize = 4;

/// The fixed, ordered set of reported factors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Factor {
    Overall,
    CommunicationStyle,
    ConversationFlow,
    TopicAlignment,
    EmotionalTone,
}

impl Factor {
    pub const ALL: [Factor; 5] = [
        Factor::Overall,
        Factor::CommunicationStyle,
        Factor::ConversationFlow,
        Factor::TopicAlignment,
        Factor::EmotionalTone,
    ];

    pub fn index(self) -> usize {
        match self {
            Factor::Overall => 0,
            Factor::CommunicationStyle => 1,
            Factor::ConversationFlow => 2,
            Factor::TopicAlignment => 3,
            Factor::EmotionalTone => 4,
        }
    }

    /// Insight id, `i1`..`i5`.
    pub fn insight_id(self) -> String {
        format!("i{}", self.index() + 1)
    }

    pub fn key(self) -> &'static str {
        match self {
            Factor::Overall => "overall",
            Factor::CommunicationStyle => "communication_style",
            Factor::ConversationFlow => "conversation_flow",
            Factor::TopicAlignment => "topic_alignment",
            Factor::EmotionalTone => "emotional_tone",
        }
    }

    pub fn title(self) -> &'static str {
        match self {
            Factor::Overall => "Overall Compatibility",
            Factor::CommunicationStyle => "Communication Style",
            Factor::ConversationFlow => "Conversation Flow",
            Factor::TopicAlignment => "Topic Alignment",
            Factor::EmotionalTone => "Emotional Tone",
        }
    }

    pub fn description(self) -> &'static str {
        match self {
            Factor::Overall => "Connection strength based on conversation analysis",
            Factor::CommunicationStyle => "Similarity in texting patterns",
            Factor::ConversationFlow => "Back-and-forth rhythm analysis",
            Factor::TopicAlignment => "Shared interests and topics",
            Factor::EmotionalTone => "Sentiment and energy match",
        }
    }

    pub fn details(self) -> &'static str {
        match self {
            Factor::Overall => {
                "Analyzing communication patterns, engagement levels, and conversational flow."
            }
            Factor::CommunicationStyle => {
                "Message lengths, tone, and emoji usage are being compared."
            }
            Factor::ConversationFlow => "Measuring response balance and natural progression.",
            Factor::TopicAlignment => "Analyzing topic transitions and mutual engagement.",
            Factor::EmotionalTone => "Comparing emotional expressions and enthusiasm levels.",
        }
    }
}

/// Score breakdown at one replay position.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScoreSnapshot {
    pub visible_message_count: usize,
    pub total_messages: usize,
    /// One insight per [`Factor`], in [`Factor::ALL`] order.
    pub insights: Vec<Insight>,
}

/// Bounded noise added to progressive scores.
pub trait JitterSource: Send + Sync {
    /// Offset in `[-amplitude, amplitude]` for one factor at one position.
    fn offset(&self, factor: Factor, visible: usize, amplitude: u8) -> i32;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct NoJitter;

impl JitterSource for NoJitter {
    fn offset(&self, _factor: Factor, _visible: usize, _amplitude: u8) -> i32 {
        0
    }
}

/// Reproducible jitter: the same seed, factor, and position give the same offset.
#[derive(Debug, Clone, Copy)]
pub struct SeededJitter {
    seed: u64,
}

impl SeededJitter {
    pub fn new(seed: u64) -> Self {
        Self { seed }
    }
}

impl JitterSource for SeededJitter {
    fn offset(&self, factor: Factor, visible: usize, amplitude: u8) -> i32 {
        if amplitude == 0 {
            return 0;
        }
        let stream = ((visible as u64) << 8) | factor.index() as u64;
        let mut rng = StdRng::seed_from_u64(self.seed ^ stream.wrapping_mul(0x9E37_79B9_7F4A_7C15));
        let amplitude = i32::from(amplitude);
        rng.random_range(-amplitude..=amplitude)
    }
}

/// Fresh noise from the thread RNG on every call.
#[derive(Debug, Clone, Copy, Default)]
pub struct LiveJitter;

impl JitterSource for LiveJitter {
    fn offset(&self, _factor: Factor, _visible: usize, amplitude: u8) -> i32 {
        if amplitude == 0 {
            return 0;
        }
        let amplitude = i32::from(amplitude);
        rand::rng().random_range(-amplitude..=amplitude)
    }
}

/// Mature factor scores of a complete conversation.
#[derive(Debug, Clone, PartialEq)]
pub struct ScoreTimeline {
    total_messages: usize,
    mature: [f64; 5],
}

impl ScoreTimeline {
    pub fn new(conversation: &Conversation, weights: &FactorWeights) -> Result<Self, VibeCheckError> {
        if conversation.messages.is_empty() {
            return Err(VibeCheckError::InvalidInput(format!(
                "conversation {} has no messages to score",
                conversation.id
            )));
        }
        let side_a: Vec<&str> = conversation
            .messages_from(&conversation.persona_a)
            .map(|message| message.text.as_str())
            .collect();
        let side_b: Vec<&str> = conversation
            .messages_from(&conversation.persona_b)
            .map(|message| message.text.as_str())
            .collect();

        let style = communication_style(&side_a, &side_b);
        let flow = conversation_flow(conversation, side_a.len(), side_b.len());
        let topic = topic_alignment(&side_a, &side_b);
        let tone = emotional_tone(&side_a, &side_b);

        let total_weight = weights.total();
        let overall = if total_weight > 0.0 {
            (style * weights.communication_style
                + flow * weights.conversation_flow
                + topic * weights.topic_alignment
                + tone * weights.emotional_tone)
                / total_weight
        } else {
            (style + flow + topic + tone) / 4.0
        };

        Ok(Self {
            total_messages: conversation.messages.len(),
            mature: [overall, style, flow, topic, tone].map(|score| score.clamp(0.0, 100.0)),
        })
    }

    pub fn total_messages(&self) -> usize {
        self.total_messages
    }

    /// Unrounded full-transcript score of one factor.
    pub fn mature_score(&self, factor: Factor) -> f64 {
        self.mature[factor.index()]
    }

    /// Messages visible at `fraction` of the replay: at least one.
    pub fn visible_at(&self, fraction: f64) -> Result<usize, VibeCheckError> {
        if !(0.0..=1.0).contains(&fraction) {
            return Err(VibeCheckError::InvalidInput(format!(
                "replay fraction must be within [0, 1], got {fraction}"
            )));
        }
        let visible = (self.total_messages as f64 * fraction).floor() as usize;
        Ok(visible.clamp(1, self.total_messages))
    }

    pub fn snapshot(
        &self,
        fraction: f64,
        jitter: &dyn JitterSource,
        amplitude: u8,
    ) -> Result<ScoreSnapshot, VibeCheckError> {
        let visible = self.visible_at(fraction)?;
        let progress = visible as f64 / self.total_messages as f64;
        let insights = Factor::ALL
            .iter()
            .map(|&factor| {
                let noise = f64::from(jitter.offset(factor, visible, amplitude));
                let score = (self.mature_score(factor) * progress + noise)
                    .clamp(0.0, 100.0)
                    .round() as u8;
                Insight {
                    id: factor.insight_id(),
                    title: factor.title().to_string(),
                    score,
                    description: factor.description().to_string(),
                    details: factor.details().to_string(),
                }
            })
            .collect();
        Ok(ScoreSnapshot {
            visible_message_count: visible,
            total_messages: self.total_messages,
            insights,
        })
    }
}

/// Scores conversations with configured weights and jitter.
#[derive(Clone)]
pub struct CompatibilityScorer {
    weights: FactorWeights,
    amplitude: u8,
    jitter: Arc<dyn JitterSource>,
}

impl CompatibilityScorer {
    pub fn new(weights: FactorWeights, amplitude: u8, jitter: Arc<dyn JitterSource>) -> Self {
        Self {
            weights,
            amplitude,
            jitter,
        }
    }

    /// Seeded jitter when a seed is configured, none at amplitude 0, live otherwise.
    pub fn from_config(config: &ScoringConfig) -> Self {
        let jitter: Arc<dyn JitterSource> = match (config.jitter_amplitude, config.jitter_seed) {
            (0, _) => Arc::new(NoJitter),
            (_, Some(seed)) => Arc::new(SeededJitter::new(seed)),
            (_, None) => Arc::new(LiveJitter),
        };
        Self::new(config.weights, config.jitter_amplitude, jitter)
    }

    pub fn timeline(&self, conversation: &Conversation) -> Result<ScoreTimeline, VibeCheckError> {
        ScoreTimeline::new(conversation, &self.weights)
    }

    pub fn score(
        &self,
        conversation: &Conversation,
        fraction: f64,
    ) -> Result<ScoreSnapshot, VibeCheckError> {
        self.timeline(conversation)?
            .snapshot(fraction, self.jitter.as_ref(), self.amplitude)
    }
}

fn mean<F>(texts: &[&str], measure: F) -> f64
where
    F: Fn(&str) -> f64,
{
    if texts.is_empty() {
        return 0.0;
    }
    texts.iter().map(|&text| measure(text)).sum::<f64>() / texts.len() as f64
}

/// 1 for equal values, falling toward 0 as they diverge.
fn closeness(left: f64, right: f64) -> f64 {
    1.0 - (left - right).abs() / left.max(right).max(1.0)
}

fn communication_style(side_a: &[&str], side_b: &[&str]) -> f64 {
    let length_a = mean(side_a, |text| text.chars().count() as f64);
    let length_b = mean(side_b, |text| text.chars().count() as f64);
    let length_ratio = length_a.min(length_b) / length_a.max(length_b).max(1.0);
    let emoji_a = mean(side_a, |text| count_emojis(text) as f64);
    let emoji_b = mean(side_b, |text| count_emojis(text) as f64);
    50.0 + 35.0 * length_ratio + 15.0 * closeness(emoji_a, emoji_b)
}

fn conversation_flow(conversation: &Conversation, count_a: usize, count_b: usize) -> f64 {
    let balance = count_a.min(count_b) as f64 / count_a.max(count_b).max(1) as f64;
    let switches = conversation
        .messages
        .windows(2)
        .filter(|pair| pair[0].sender_id != pair[1].sender_id)
        .count();
    let alternation = switches as f64 / conversation.messages.len().saturating_sub(1).max(1) as f64;
    40.0 + 30.0 * balance + 30.0 * alternation
}

fn topic_words(texts: &[&str]) -> HashSet<String> {
    texts
        .iter()
        .flat_map(|text| text.split(|ch: char| !ch.is_alphanumeric()))
        .filter(|word| word.chars().count() >= TOPIC_WORD_MIN_LEN)
        .map(str::to_lowercase)
        .collect()
}

fn topic_alignment(side_a: &[&str], side_b: &[&str]) -> f64 {
    let words_a = topic_words(side_a);
    let words_b = topic_words(side_b);
    let shared = words_a.intersection(&words_b).count();
    let overlap = shared as f64 / words_a.len().min(words_b.len()).max(1) as f64;
    let questions = side_a
        .iter()
        .chain(side_b)
        .map(|text| text.matches('?').count())
        .sum::<usize>()
        .min(10);
    45.0 + 45.0 * overlap + questions as f64
}

fn emotional_tone(side_a: &[&str], side_b: &[&str]) -> f64 {
    let energy = |text: &str| (text.matches('!').count() + count_emojis(text)) as f64;
    let energy_a = mean(side_a, energy);
    let energy_b = mean(side_b, energy);
    let emojis = side_a
        .iter()
        .chain(side_b)
        .map(|text| count_emojis(text))
        .sum::<usize>() as f64;
    50.0 + 40.0 * closeness(energy_a, energy_b) + (emojis / 2.0).min(10.0)
}
