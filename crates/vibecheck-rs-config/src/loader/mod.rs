//! Layered configuration loader with requirement constraints.
//!
//! Discovers configuration layers (system/user/project/etc), validates schema,
//! merges them with optional constraints, and produces a final `VibeCheckConfig`.

mod merge;
mod schema;

#[cfg(test)]
mod tests;

use crate::{ConfigError, VibeCheckConfig};
use directories::UserDirs;
use log::{debug, info};
use serde_json::Value;
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};

/// Default config filename in local layers.
const DEFAULT_CONFIG_FILE: &str = "vibecheck.json5";
/// Default config directory under user or repo roots.
const DEFAULT_CONFIG_DIR: &str = ".vibecheck";
/// Marker files/dirs that identify a project root.
const DEFAULT_PROJECT_ROOT_MARKERS: &[&str] = &[".git"];
/// Requirements filename in the system config directory.
const REQUIREMENTS_FILE: &str = "requirements.json5";

/// Effective config plus metadata about which layers were loaded.
#[derive(Debug, Clone)]
pub struct LayeredConfig {
    /// The merged, validated config.
    pub config: VibeCheckConfig,
    /// Metadata for each layer considered during load.
    pub layers: Vec<ConfigLayer>,
}

/// Origin for a single config layer in the stack.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigLayerSource {
    /// Immutable requirements constraints.
    Requirements,
    /// System-wide configuration.
    System,
    /// User-specific configuration.
    User,
    /// Project root configuration.
    Project,
    /// Current working directory configuration.
    Cwd,
    /// Repo-local configuration.
    Repo,
    /// Runtime overrides (highest precedence).
    Runtime,
}

impl ConfigLayerSource {
    fn label(self) -> &'static str {
        match self {
            Self::Requirements => "requirements",
            Self::System => "system",
            Self::User => "user",
            Self::Project => "project",
            Self::Cwd => "cwd",
            Self::Repo => "repo",
            Self::Runtime => "runtime",
        }
    }
}

/// Metadata about a loaded config layer.
#[derive(Debug, Clone)]
pub struct ConfigLayer {
    pub source: ConfigLayerSource,
    /// Location on disk if present.
    pub path: Option<PathBuf>,
}

/// Schema validation mode for layered configs.
#[derive(Debug, Clone, Copy)]
enum SchemaMode {
    /// Partial validation for non-final layers.
    Partial,
    /// Full validation for the effective config.
    Full,
}

/// Options controlling layered config discovery and overrides.
#[derive(Debug, Clone)]
pub struct LayeredConfigOptions {
    /// Working directory used to resolve relative paths and local layers.
    pub cwd: PathBuf,
    /// Optional system config path (defaults to `/etc/vibecheck/vibecheck.json5` on Unix).
    pub system_config_path: Option<PathBuf>,
    /// Optional user config path (defaults to `~/.vibecheck/vibecheck.json5`).
    pub user_config_path: Option<PathBuf>,
    /// Optional requirements/constraints path for locked settings.
    pub requirements_path: Option<PathBuf>,
    /// Runtime override config paths applied last.
    pub runtime_paths: Vec<PathBuf>,
    /// Marker files/dirs used to detect the project root.
    pub project_root_markers: Vec<String>,
}

impl LayeredConfigOptions {
    /// Create options with default layer locations for the provided cwd.
    pub fn new(cwd: impl AsRef<Path>) -> Self {
        let cwd = cwd.as_ref().to_path_buf();
        Self {
            cwd,
            system_config_path: system_config_dir().map(|dir| dir.join(DEFAULT_CONFIG_FILE)),
            user_config_path: UserDirs::new().map(|dirs| {
                dirs.home_dir()
                    .join(DEFAULT_CONFIG_DIR)
                    .join(DEFAULT_CONFIG_FILE)
            }),
            requirements_path: system_config_dir().map(|dir| dir.join(REQUIREMENTS_FILE)),
            runtime_paths: Vec::new(),
            project_root_markers: DEFAULT_PROJECT_ROOT_MARKERS
                .iter()
                .map(|marker| marker.to_string())
                .collect(),
        }
    }

    /// Add a runtime override config path that is applied last.
    pub fn with_runtime_path(mut self, path: impl AsRef<Path>) -> Self {
        self.runtime_paths.push(path.as_ref().to_path_buf());
        self
    }
}

impl VibeCheckConfig {
    /// Load a single config from a path (no layering).
    pub fn load_from_path(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        info!("loading config from path: {}", path.as_ref().display());
        let contents = fs::read_to_string(path)?;
        let value: Value = json5::from_str(&contents)?;
        config_from_value(value, "config")
    }

    /// Load a single config from JSON5 contents (no layering).
    pub fn load_from_str(contents: &str) -> Result<Self, ConfigError> {
        debug!("loading config from raw contents (len={})", contents.len());
        let value: Value = json5::from_str(contents)?;
        config_from_value(value, "config")
    }

    /// Load a layered config stack using the default layer locations.
    pub fn load_layered(cwd: impl AsRef<Path>) -> Result<LayeredConfig, ConfigError> {
        info!(
            "loading layered config with defaults (cwd={})",
            cwd.as_ref().display()
        );
        let options = LayeredConfigOptions::new(cwd);
        Self::load_layered_with_options(options)
    }

    /// Load a layered config stack using explicit layer locations and overrides.
    ///
    /// Layer precedence (low -> high): requirements (constraints), system, user,
    /// project, cwd, repo, runtime overrides.
    pub fn load_layered_with_options(
        options: LayeredConfigOptions,
    ) -> Result<LayeredConfig, ConfigError> {
        let cwd = match options.cwd.canonicalize() {
            Ok(path) => path,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => options.cwd.clone(),
            Err(err) => return Err(ConfigError::ReadFailed(err)),
        };
        debug!("normalized cwd for config load: {}", cwd.display());

        let requirements = match options.requirements_path.as_deref() {
            Some(path) if path.exists() => Some(read_layer(ConfigLayerSource::Requirements, path)?),
            _ => None,
        };
        let mut layers: Vec<ConfigLayer> = requirements
            .iter()
            .map(|layer| layer.meta.clone())
            .collect();
        let constraints = requirements.map(|layer| layer.value);

        let mut candidates = vec![
            (ConfigLayerSource::System, options.system_config_path.clone()),
            (ConfigLayerSource::User, options.user_config_path.clone()),
        ];
        let project_root = cwd.ancestors().find(|ancestor| {
            options
                .project_root_markers
                .iter()
                .any(|marker| ancestor.join(marker).exists())
        });
        match project_root {
            Some(root) => {
                debug!("resolved project root: {}", root.display());
                candidates.push((ConfigLayerSource::Project, Some(root.join(DEFAULT_CONFIG_FILE))));
                candidates.push((ConfigLayerSource::Cwd, Some(cwd.join(DEFAULT_CONFIG_FILE))));
                candidates.push((
                    ConfigLayerSource::Repo,
                    Some(root.join(DEFAULT_CONFIG_DIR).join(DEFAULT_CONFIG_FILE)),
                ));
            }
            None => {
                debug!("project root not found; skipping project/repo layers");
                candidates.push((ConfigLayerSource::Cwd, Some(cwd.join(DEFAULT_CONFIG_FILE))));
            }
        }

        let mut seen_paths = HashSet::new();
        let mut merge_layers = Vec::new();
        for (source, path) in candidates {
            let Some(path) = path else { continue };
            if !path.exists() {
                debug!("optional layer missing (source={:?}, path={})", source, path.display());
                continue;
            }
            let key = path.canonicalize().unwrap_or_else(|_| path.clone());
            if !seen_paths.insert(key) {
                debug!(
                    "skipping duplicate layer (source={:?}, path={})",
                    source,
                    path.display()
                );
                continue;
            }
            let layer = read_layer(source, &path)?;
            layers.push(layer.meta.clone());
            merge_layers.push(layer);
        }

        for runtime_path in &options.runtime_paths {
            let loaded = read_layer(ConfigLayerSource::Runtime, runtime_path)?;
            layers.push(loaded.meta.clone());
            merge_layers.push(loaded);
        }

        let mut merged = constraints
            .clone()
            .unwrap_or_else(|| Value::Object(serde_json::Map::new()));
        for layer in &merge_layers {
            merge::merge_layer(&mut merged, &layer.value, constraints.as_ref());
        }

        let config = config_from_value(merged, "effective")?;
        info!("layered config loaded (layers={})", layers.len());
        Ok(LayeredConfig { config, layers })
    }

    /// Validate configuration invariants that cannot be expressed in serde.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let embedding = &self.embedding;
        ensure_positive(embedding.batch_size, "embedding.batch_size")?;
        ensure_positive(embedding.max_in_flight, "embedding.max_in_flight")?;
        ensure_positive(embedding.fallback_dimensions, "embedding.fallback_dimensions")?;
        if embedding.retry.max_attempts == 0 || self.generation.retry.max_attempts == 0 {
            return Err(ConfigError::Invalid(
                "retry.max_attempts must be at least 1".to_string(),
            ));
        }
        ensure_positive(self.retrieval.top_k, "retrieval.top_k")?;
        ensure_positive(self.simulation.max_turns, "simulation.max_turns")?;
        if self.simulation.opening_query.trim().is_empty() {
            return Err(ConfigError::Invalid(
                "simulation.opening_query must not be empty".to_string(),
            ));
        }
        if !(0.0..=2.0).contains(&self.generation.temperature) {
            return Err(ConfigError::Invalid(
                "generation.temperature must be within [0, 2]".to_string(),
            ));
        }

        let weights = &self.scoring.weights;
        let all = [
            weights.communication_style,
            weights.conversation_flow,
            weights.topic_alignment,
            weights.emotional_tone,
        ];
        if all.iter().any(|weight| !weight.is_finite() || *weight < 0.0) || weights.total() <= 0.0
        {
            return Err(ConfigError::Invalid(
                "scoring.weights must be non-negative with a positive sum".to_string(),
            ));
        }
        if self.scoring.jitter_amplitude > MAX_JITTER_AMPLITUDE {
            return Err(ConfigError::Invalid(format!(
                "scoring.jitter_amplitude must be at most {MAX_JITTER_AMPLITUDE}"
            )));
        }

        Ok(())
    }
}

/// Upper bound for score jitter, in points.
const MAX_JITTER_AMPLITUDE: u8 = 5;

fn ensure_positive(value: usize, path: &str) -> Result<(), ConfigError> {
    if value == 0 {
        return Err(ConfigError::Invalid(format!("{path} must be positive")));
    }
    Ok(())
}

/// Internal representation of a loaded config layer.
#[derive(Debug, Clone)]
struct LoadedLayer {
    meta: ConfigLayer,
    value: Value,
}

/// Read one layer and check it against the partial schema.
fn read_layer(source: ConfigLayerSource, path: &Path) -> Result<LoadedLayer, ConfigError> {
    let contents = fs::read_to_string(path)?;
    let value: Value = json5::from_str(&contents)?;
    let label = format!("{}({})", source.label(), path.display());
    schema::validate_layer_schema(&value, SchemaMode::Partial, &label)?;
    debug!("loaded {:?} layer (path={})", source, path.display());
    Ok(LoadedLayer {
        meta: ConfigLayer {
            source,
            path: Some(path.to_path_buf()),
        },
        value,
    })
}

#[cfg(unix)]
fn system_config_dir() -> Option<PathBuf> {
    Some(PathBuf::from("/etc/vibecheck"))
}

#[cfg(windows)]
fn system_config_dir() -> Option<PathBuf> {
    Some(PathBuf::from("C:\\ProgramData\\vibecheck"))
}

#[cfg(not(any(unix, windows)))]
fn system_config_dir() -> Option<PathBuf> {
    None
}

fn config_from_value(value: Value, label: &str) -> Result<VibeCheckConfig, ConfigError> {
    schema::validate_layer_schema(&value, SchemaMode::Full, label)?;
    let config: VibeCheckConfig = serde_json::from_value(value)?;
    config.validate()?;
    Ok(config)
}
