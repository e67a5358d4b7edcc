//! Command-line client for indexing personas, simulating conversations, and
//! replaying compatibility scores.

use anyhow::{Context, bail};
use autoagents_llm::LLMProvider;
use autoagents_llm::backends::openai::OpenAI;
use autoagents_llm::builder::LLMBuilder;
use clap::{Parser, Subcommand};
use log::{debug, info, warn};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use uuid::Uuid;
use vibecheck_rs::config::VibeCheckConfig;
use vibecheck_rs::core::{LlmResponseGenerator, PersonaInput, VibeCheck, parse_export};
use vibecheck_rs::index::VectorIndex;

/// Command-line options for the VibeCheck client.
#[derive(Parser)]
#[command(name = "vibecheck", version)]
struct Cli {
    /// Optional path to a vibecheck.json5 config file
    #[arg(long)]
    config: Option<PathBuf>,
    /// Chat model override for simulations
    #[arg(long)]
    model: Option<String>,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Index one or more message exports, each given as ID=PATH
    Index {
        #[arg(required = true)]
        personas: Vec<String>,
        /// Display name, only valid when indexing a single persona
        #[arg(long)]
        name: Option<String>,
        /// Short bio, only valid when indexing a single persona
        #[arg(long)]
        bio: Option<String>,
    },
    /// Simulate a conversation between two indexed personas
    Simulate {
        persona_a: String,
        persona_b: String,
        /// Opening line attributed to the first persona
        #[arg(long)]
        starter: Option<String>,
        /// Override the number of generated turns
        #[arg(long)]
        turns: Option<usize>,
    },
    /// Score a stored conversation at a point of its replay
    Score {
        conversation: Uuid,
        /// Fraction of the conversation revealed, in [0, 1]
        #[arg(long, default_value_t = 1.0)]
        at: f64,
    },
    /// List stored conversations, or print or delete one
    Conversations {
        #[arg(long, conflicts_with = "delete")]
        show: Option<Uuid>,
        #[arg(long)]
        delete: Option<Uuid>,
    },
    /// List indexed personas
    Personas,
}

/// Entry point for the VibeCheck CLI.
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = env_logger::builder()
        .format_timestamp_millis()
        .parse_default_env()
        .try_init();

    let cli = Cli::parse();
    let mut config = load_config(cli.config.as_deref())?;

    match cli.command {
        Command::Index {
            personas,
            name,
            bio,
        } => {
            if personas.len() > 1 && (name.is_some() || bio.is_some()) {
                bail!("--name and --bio apply to a single persona");
            }
            let mut inputs = Vec::with_capacity(personas.len());
            for arg in &personas {
                let (id, path) = parse_persona_arg(arg)?;
                let raw = std::fs::read_to_string(path)
                    .with_context(|| format!("failed to read export {}", path.display()))?;
                let records = parse_export(&raw)
                    .with_context(|| format!("failed to parse export {}", path.display()))?;
                let display_name = name.clone().unwrap_or_else(|| id.to_string());
                let mut input = PersonaInput::new(id, display_name, records);
                if let Some(bio) = bio.as_ref() {
                    input = input.with_bio(bio.clone());
                }
                inputs.push(input);
            }
            let engine = VibeCheck::builder(config)
                .build()
                .context("failed to build engine")?;
            let mut failed = 0usize;
            for (id, result) in engine.index_personas(inputs).await {
                match result {
                    Ok(persona) => println!("{}\t{} windows", persona.id, persona.windows.len()),
                    Err(err) => {
                        failed += 1;
                        eprintln!("{id}\tfailed: {err}");
                    }
                }
            }
            if failed > 0 {
                bail!("{failed} persona(s) failed to index");
            }
        }
        Command::Simulate {
            persona_a,
            persona_b,
            starter,
            turns,
        } => {
            if let Some(turns) = turns {
                config.simulation.max_turns = turns;
            }
            if let Some(model) = cli.model {
                config.generation.model = model;
            }
            let mut builder = VibeCheck::builder(config.clone());
            match build_llm(&config)? {
                Some(llm) => {
                    let generator = LlmResponseGenerator::from_config(llm, &config.generation);
                    builder = builder.generator(Arc::new(generator));
                }
                None => warn!(
                    "{} not set; replies are echoed from retrieved windows",
                    config.generation.api_key_env
                ),
            }
            let engine = builder.build().context("failed to build engine")?;
            let conversation = engine
                .run_simulation(&persona_a, &persona_b, starter.as_deref())
                .await
                .context("simulation failed")?;
            if let Some(starter) = conversation.starter.as_ref() {
                println!("{}: {starter}", conversation.persona_a);
            }
            for message in &conversation.messages {
                println!("{}: {}", message.sender_id, message.text);
            }
            println!("conversation {}", conversation.id);
        }
        Command::Score { conversation, at } => {
            let engine = VibeCheck::builder(config)
                .build()
                .context("failed to build engine")?;
            let conversation = engine.conversation(conversation)?;
            let snapshot = engine.score_at(&conversation, at)?;
            println!("{}", serde_json::to_string_pretty(&snapshot)?);
        }
        Command::Conversations { show, delete } => {
            let engine = VibeCheck::builder(config)
                .build()
                .context("failed to build engine")?;
            if let Some(id) = delete {
                if !engine.delete_conversation(id)? {
                    bail!("unknown conversation: {id}");
                }
                println!("deleted {id}");
            } else if let Some(id) = show {
                let conversation = engine.conversation(id)?;
                println!("{}", serde_json::to_string_pretty(&conversation)?);
            } else {
                for summary in engine.conversations()? {
                    println!(
                        "{}\t{} x {}\t{} messages\t{}",
                        summary.id,
                        summary.persona_a,
                        summary.persona_b,
                        summary.message_count,
                        summary.created_at.to_rfc3339()
                    );
                }
            }
        }
        Command::Personas => {
            let engine = VibeCheck::builder(config)
                .build()
                .context("failed to build engine")?;
            for persona in engine.personas()? {
                let indexed = engine.index().namespace_len(&persona.id).await;
                if indexed != persona.windows.len() {
                    warn!(
                        "persona index out of sync (persona_id={}, windows={}, indexed={})",
                        persona.id,
                        persona.windows.len(),
                        indexed
                    );
                }
                println!(
                    "{}\t{}\t{}\t{} windows",
                    persona.id,
                    persona.name,
                    persona.color_tag,
                    persona.windows.len()
                );
            }
        }
    }
    Ok(())
}

fn load_config(path: Option<&Path>) -> anyhow::Result<VibeCheckConfig> {
    if let Some(path) = path {
        info!("loading config from path: {}", path.display());
        return VibeCheckConfig::load_from_path(path).context("failed to load config");
    }
    let cwd = std::env::current_dir().context("cwd")?;
    info!("loading layered config from cwd: {}", cwd.display());
    let layered = VibeCheckConfig::load_layered(&cwd).context("failed to load layered config")?;
    debug!("layered config loaded (layers={})", layered.layers.len());
    Ok(layered.config)
}

/// Chat provider for simulations, or `None` when no API key is configured.
fn build_llm(config: &VibeCheckConfig) -> anyhow::Result<Option<Arc<dyn LLMProvider>>> {
    let generation = &config.generation;
    if generation.provider != "openai" {
        bail!("unsupported generation provider: {}", generation.provider);
    }
    let Some(api_key) = generation.api_key() else {
        return Ok(None);
    };
    info!("building generation LLM provider (model={})", generation.model);
    let llm: Arc<dyn LLMProvider> = LLMBuilder::<OpenAI>::new()
        .api_key(api_key)
        .model(generation.model.clone())
        .temperature(generation.temperature)
        .max_tokens(generation.max_tokens)
        .build()
        .context("failed to build OpenAI LLM provider")?;
    Ok(Some(llm))
}

/// Split an `ID=PATH` argument.
fn parse_persona_arg(arg: &str) -> anyhow::Result<(&str, &Path)> {
    match arg.split_once('=') {
        Some((id, path)) if !id.trim().is_empty() && !path.trim().is_empty() => {
            Ok((id.trim(), Path::new(path.trim())))
        }
        _ => bail!("expected ID=PATH, got `{arg}`"),
    }
}
