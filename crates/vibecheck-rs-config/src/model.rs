//! Configuration schema for VibeCheck.

use crate::ConfigError;
use serde::{Deserialize, Serialize};

/// Root config for the VibeCheck engine.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct VibeCheckConfig {
    #[serde(default, rename = "$schema")]
    pub schema: Option<String>,
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    #[serde(default)]
    pub index: IndexConfig,
    #[serde(default)]
    pub retrieval: RetrievalConfig,
    #[serde(default)]
    pub simulation: SimulationConfig,
    #[serde(default)]
    pub generation: GenerationConfig,
    #[serde(default)]
    pub scoring: ScoringConfig,
    #[serde(default)]
    pub storage: StorageConfig,
}

impl VibeCheckConfig {
    /// Start building a config programmatically with defaults applied.
    pub fn builder() -> VibeCheckConfigBuilder {
        VibeCheckConfigBuilder::new()
    }
}

/// Builder for assembling a `VibeCheckConfig` in code.
#[derive(Debug, Default, Clone)]
pub struct VibeCheckConfigBuilder {
    config: VibeCheckConfig,
}

impl VibeCheckConfigBuilder {
    pub fn new() -> Self {
        Self {
            config: VibeCheckConfig::default(),
        }
    }

    pub fn embedding(mut self, embedding: EmbeddingConfig) -> Self {
        self.config.embedding = embedding;
        self
    }

    pub fn index(mut self, index: IndexConfig) -> Self {
        self.config.index = index;
        self
    }

    pub fn retrieval(mut self, retrieval: RetrievalConfig) -> Self {
        self.config.retrieval = retrieval;
        self
    }

    pub fn simulation(mut self, simulation: SimulationConfig) -> Self {
        self.config.simulation = simulation;
        self
    }

    pub fn generation(mut self, generation: GenerationConfig) -> Self {
        self.config.generation = generation;
        self
    }

    pub fn scoring(mut self, scoring: ScoringConfig) -> Self {
        self.config.scoring = scoring;
        self
    }

    pub fn storage(mut self, storage: StorageConfig) -> Self {
        self.config.storage = storage;
        self
    }

    /// Finalize and return the built `VibeCheckConfig`.
    pub fn build(self) -> VibeCheckConfig {
        self.config
    }
}

/// Which embedding path the embedder may use.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum EmbeddingMode {
    /// Always call the service; failures surface.
    Service,
    /// Never call out; hash embeddings only.
    Fallback,
    /// Use the service when credentials exist, degrade to the fallback otherwise.
    #[default]
    Auto,
}

/// Bounded exponential backoff settings shared by embedding and generation calls.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RetryConfig {
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,
    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            base_delay_ms: default_base_delay_ms(),
            max_delay_ms: default_max_delay_ms(),
        }
    }
}

fn default_max_attempts() -> u32 {
    3
}

fn default_base_delay_ms() -> u64 {
    200
}

fn default_max_delay_ms() -> u64 {
    5_000
}

/// Embedding service and fallback settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EmbeddingConfig {
    #[serde(default)]
    pub mode: EmbeddingMode,
    #[serde(default = "default_embedding_model")]
    pub model: String,
    #[serde(default = "default_api_base")]
    pub api_base: String,
    /// Name of the environment variable holding the API key.
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,
    #[serde(default = "default_fallback_dimensions")]
    pub fallback_dimensions: usize,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default = "default_max_in_flight")]
    pub max_in_flight: usize,
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
    #[serde(default)]
    pub retry: RetryConfig,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            mode: EmbeddingMode::default(),
            model: default_embedding_model(),
            api_base: default_api_base(),
            api_key_env: default_api_key_env(),
            fallback_dimensions: default_fallback_dimensions(),
            batch_size: default_batch_size(),
            max_in_flight: default_max_in_flight(),
            timeout_ms: default_timeout_ms(),
            retry: RetryConfig::default(),
        }
    }
}

impl EmbeddingConfig {
    /// Read the API key from the configured environment variable, if set.
    pub fn api_key(&self) -> Option<String> {
        read_env_key(&self.api_key_env)
    }

    /// Read the API key or fail with `MissingCredential`.
    pub fn require_api_key(&self) -> Result<String, ConfigError> {
        self.api_key()
            .ok_or_else(|| ConfigError::MissingCredential(self.api_key_env.clone()))
    }
}

fn default_embedding_model() -> String {
    "text-embedding-3-small".to_string()
}

fn default_api_base() -> String {
    "https://api.openai.com/v1".to_string()
}

fn default_api_key_env() -> String {
    "OPENAI_API_KEY".to_string()
}

fn default_fallback_dimensions() -> usize {
    256
}

fn default_batch_size() -> usize {
    100
}

fn default_max_in_flight() -> usize {
    4
}

fn default_timeout_ms() -> u64 {
    30_000
}

/// Vector index backend.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum IndexBackend {
    Memory,
    #[default]
    File,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct IndexConfig {
    #[serde(default)]
    pub backend: IndexBackend,
    /// Directory for the file backend; defaults to `<storage.root>/index`.
    #[serde(default)]
    pub path: Option<String>,
}

/// Windowing and retrieval settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RetrievalConfig {
    /// Messages on each side of the window center.
    #[serde(default = "default_window_radius")]
    pub window_radius: usize,
    #[serde(default = "default_top_k")]
    pub top_k: usize,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            window_radius: default_window_radius(),
            top_k: default_top_k(),
        }
    }
}

fn default_window_radius() -> usize {
    2
}

fn default_top_k() -> usize {
    5
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SimulationConfig {
    #[serde(default = "default_max_turns")]
    pub max_turns: usize,
    /// Query used for the very first turn when no starter is supplied.
    #[serde(default = "default_opening_query")]
    pub opening_query: String,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            max_turns: default_max_turns(),
            opening_query: default_opening_query(),
        }
    }
}

fn default_max_turns() -> usize {
    16
}

fn default_opening_query() -> String {
    "hey what's up?".to_string()
}

/// Chat model settings for turn generation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct GenerationConfig {
    #[serde(default = "default_generation_provider")]
    pub provider: String,
    #[serde(default = "default_generation_model")]
    pub model: String,
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
    #[serde(default)]
    pub retry: RetryConfig,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            provider: default_generation_provider(),
            model: default_generation_model(),
            api_key_env: default_api_key_env(),
            temperature: default_temperature(),
            max_tokens: default_max_tokens(),
            timeout_ms: default_timeout_ms(),
            retry: RetryConfig::default(),
        }
    }
}

impl GenerationConfig {
    /// Read the API key from the configured environment variable, if set.
    pub fn api_key(&self) -> Option<String> {
        read_env_key(&self.api_key_env)
    }
}

fn default_generation_provider() -> String {
    "openai".to_string()
}

fn default_generation_model() -> String {
    "gpt-4o-mini".to_string()
}

fn default_temperature() -> f32 {
    0.9
}

fn default_max_tokens() -> u32 {
    100
}

/// Relative weights for the overall compatibility score.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct FactorWeights {
    #[serde(default = "default_style_weight")]
    pub communication_style: f64,
    #[serde(default = "default_flow_weight")]
    pub conversation_flow: f64,
    #[serde(default = "default_topic_weight")]
    pub topic_alignment: f64,
    #[serde(default = "default_tone_weight")]
    pub emotional_tone: f64,
}

impl Default for FactorWeights {
    fn default() -> Self {
        Self {
            communication_style: default_style_weight(),
            conversation_flow: default_flow_weight(),
            topic_alignment: default_topic_weight(),
            emotional_tone: default_tone_weight(),
        }
    }
}

impl FactorWeights {
    pub fn total(&self) -> f64 {
        self.communication_style + self.conversation_flow + self.topic_alignment + self.emotional_tone
    }
}

fn default_style_weight() -> f64 {
    0.30
}

fn default_flow_weight() -> f64 {
    0.25
}

fn default_topic_weight() -> f64 {
    0.25
}

fn default_tone_weight() -> f64 {
    0.20
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ScoringConfig {
    #[serde(default)]
    pub weights: FactorWeights,
    /// Maximum absolute jitter in score points; 0 disables it.
    #[serde(default = "default_jitter_amplitude")]
    pub jitter_amplitude: u8,
    /// Seed for reproducible jitter; unset uses the thread RNG.
    #[serde(default)]
    pub jitter_seed: Option<u64>,
}

impl Default for ScoringConfig {
    fn default() -> Self {
        Self {
            weights: FactorWeights::default(),
            jitter_amplitude: default_jitter_amplitude(),
            jitter_seed: None,
        }
    }
}

fn default_jitter_amplitude() -> u8 {
    5
}

/// Where personas and conversations are persisted.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct StorageConfig {
    #[serde(default = "default_storage_root")]
    pub root: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            root: default_storage_root(),
        }
    }
}

fn default_storage_root() -> String {
    ".vibecheck".to_string()
}

fn read_env_key(name: &str) -> Option<String> {
    std::env::var(name)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}
