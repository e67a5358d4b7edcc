//! Tests for layered configuration loading.

use super::*;
use crate::{EmbeddingMode, IndexBackend};
use pretty_assertions::assert_eq;
use std::fs;
use std::path::Path;
use tempfile::TempDir;

/// Write JSON5 contents to a path, creating parent directories if needed.
fn write_json5(path: &Path, contents: &str) {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).expect("dir");
    }
    fs::write(path, contents).expect("write");
}

fn project_with_cwd(root: &Path) -> (PathBuf, PathBuf) {
    let project_root = root.join("project");
    fs::create_dir_all(project_root.join(".git")).expect("git");
    let cwd = project_root.join("subdir");
    fs::create_dir_all(&cwd).expect("cwd");
    (project_root, cwd)
}

#[test]
fn parse_minimal_config() {
    let config = VibeCheckConfig::load_from_str("{}").expect("config");
    assert_eq!(config.retrieval.window_radius, 2);
    assert_eq!(config.retrieval.top_k, 5);
    assert_eq!(config.simulation.max_turns, 16);
    assert_eq!(config.embedding.mode, EmbeddingMode::Auto);
    assert_eq!(config.embedding.model, "text-embedding-3-small");
    assert_eq!(config.embedding.fallback_dimensions, 256);
    assert_eq!(config.embedding.retry.max_attempts, 3);
    assert_eq!(config.embedding.retry.base_delay_ms, 200);
    assert_eq!(config.index.backend, IndexBackend::File);
    assert_eq!(config.scoring.jitter_amplitude, 5);
    assert!((config.scoring.weights.total() - 1.0).abs() < 1e-9);
}

#[test]
fn parses_json5_sections() {
    let json5 = r#"{
        // comments are allowed
        embedding: { mode: "fallback", fallback_dimensions: 64, retry: { max_attempts: 5 } },
        retrieval: { window_radius: 1, top_k: 3 },
        scoring: { weights: { communication_style: 1, conversation_flow: 1 }, jitter_seed: 7 },
    }"#;
    let config = VibeCheckConfig::load_from_str(json5).expect("config");
    assert_eq!(config.embedding.mode, EmbeddingMode::Fallback);
    assert_eq!(config.embedding.fallback_dimensions, 64);
    assert_eq!(config.embedding.retry.max_attempts, 5);
    assert_eq!(config.embedding.retry.base_delay_ms, 200);
    assert_eq!(config.retrieval.window_radius, 1);
    assert_eq!(config.scoring.weights.communication_style, 1.0);
    assert_eq!(config.scoring.weights.emotional_tone, 0.20);
    assert_eq!(config.scoring.jitter_seed, Some(7));
}

#[test]
fn rejects_unknown_top_level_key() {
    let err = VibeCheckConfig::load_from_str(r#"{ unexpected: true }"#).unwrap_err();
    assert!(format!("{err}").contains("unknown key"));
}

#[test]
fn rejects_negative_window_radius() {
    let err = VibeCheckConfig::load_from_str(r#"{ retrieval: { window_radius: -1 } }"#)
        .unwrap_err();
    let msg = format!("{err}");
    assert!(msg.contains("retrieval.window_radius"));
    assert!(msg.contains("non-negative"));
}

#[test]
fn rejects_invalid_embedding_mode() {
    let err = VibeCheckConfig::load_from_str(r#"{ embedding: { mode: "remote" } }"#).unwrap_err();
    assert!(format!("{err}").contains("embedding.mode"));
}

#[test]
fn rejects_zero_turns_and_oversized_jitter() {
    let err = VibeCheckConfig::load_from_str(r#"{ simulation: { max_turns: 0 } }"#).unwrap_err();
    assert!(format!("{err}").contains("simulation.max_turns"));

    let err = VibeCheckConfig::load_from_str(r#"{ scoring: { jitter_amplitude: 9 } }"#).unwrap_err();
    assert!(format!("{err}").contains("jitter_amplitude"));
}

#[test]
fn rejects_weights_without_positive_sum() {
    let json5 = r#"{ scoring: { weights: {
        communication_style: 0, conversation_flow: 0, topic_alignment: 0, emotional_tone: 0
    } } }"#;
    let err = VibeCheckConfig::load_from_str(json5).unwrap_err();
    assert!(format!("{err}").contains("scoring.weights"));
}

#[test]
fn missing_credential_names_the_variable() {
    let config = VibeCheckConfig::load_from_str(
        r#"{ embedding: { api_key_env: "VIBECHECK_TEST_KEY_THAT_IS_NEVER_SET" } }"#,
    )
    .expect("config");
    assert_eq!(config.embedding.api_key(), None);
    let err = config.embedding.require_api_key().unwrap_err();
    assert!(format!("{err}").contains("VIBECHECK_TEST_KEY_THAT_IS_NEVER_SET"));
}

#[test]
fn layered_config_prefers_repo_over_cwd() {
    let temp = TempDir::new().expect("tmp");
    let root = temp.path();
    let (project_root, cwd) = project_with_cwd(root);

    let system_config = root.join("system.json5");
    write_json5(&system_config, "{ retrieval: { top_k: 1 } }");
    let user_config = root.join("user.json5");
    write_json5(&user_config, "{ retrieval: { top_k: 2 } }");
    write_json5(
        &project_root.join(DEFAULT_CONFIG_FILE),
        "{ retrieval: { top_k: 3 } }",
    );
    write_json5(&cwd.join(DEFAULT_CONFIG_FILE), "{ retrieval: { top_k: 4 } }");
    write_json5(
        &project_root
            .join(DEFAULT_CONFIG_DIR)
            .join(DEFAULT_CONFIG_FILE),
        "{ retrieval: { top_k: 6 } }",
    );

    let mut options = LayeredConfigOptions::new(&cwd);
    options.system_config_path = Some(system_config);
    options.user_config_path = Some(user_config);
    options.requirements_path = None;

    let layered = VibeCheckConfig::load_layered_with_options(options).expect("layered");
    assert_eq!(layered.config.retrieval.top_k, 6);
    assert_eq!(layered.layers.len(), 5);
    assert_eq!(
        layered.layers.last().map(|layer| layer.source),
        Some(ConfigLayerSource::Repo)
    );
}

#[test]
fn requirements_lock_overrides() {
    let temp = TempDir::new().expect("tmp");
    let root = temp.path();
    let (_, cwd) = project_with_cwd(root);

    let system_config = root.join("system.json5");
    write_json5(&system_config, "{ simulation: { max_turns: 8 } }");
    let requirements = root.join("requirements.json5");
    write_json5(&requirements, "{ simulation: { max_turns: 12 } }");
    let runtime_config = root.join("runtime.json5");
    write_json5(
        &runtime_config,
        "{ simulation: { max_turns: 20, opening_query: \"yo\" } }",
    );

    let mut options = LayeredConfigOptions::new(&cwd);
    options.system_config_path = Some(system_config);
    options.user_config_path = None;
    options.requirements_path = Some(requirements);
    options.runtime_paths = vec![runtime_config];

    let layered = VibeCheckConfig::load_layered_with_options(options).expect("layered");
    assert_eq!(layered.config.simulation.max_turns, 12);
    assert_eq!(layered.config.simulation.opening_query, "yo");
}

#[test]
fn runtime_override_wins_without_constraints() {
    let temp = TempDir::new().expect("tmp");
    let root = temp.path();
    let (_, cwd) = project_with_cwd(root);

    let system_config = root.join("system.json5");
    write_json5(&system_config, "{ storage: { root: \"system\" } }");
    let runtime_config = root.join("runtime.json5");
    write_json5(&runtime_config, "{ storage: { root: \"runtime\" } }");

    let options = LayeredConfigOptions {
        system_config_path: Some(system_config),
        user_config_path: None,
        requirements_path: None,
        ..LayeredConfigOptions::new(&cwd)
    }
    .with_runtime_path(&runtime_config);

    let layered = VibeCheckConfig::load_layered_with_options(options).expect("layered");
    assert_eq!(layered.config.storage.root, "runtime".to_string());
}

#[test]
fn invalid_layer_reports_its_origin() {
    let temp = TempDir::new().expect("tmp");
    let root = temp.path();
    let (_, cwd) = project_with_cwd(root);
    write_json5(&cwd.join(DEFAULT_CONFIG_FILE), "{ index: { backend: \"s3\" } }");

    let mut options = LayeredConfigOptions::new(&cwd);
    options.system_config_path = None;
    options.user_config_path = None;
    options.requirements_path = None;

    let err = VibeCheckConfig::load_layered_with_options(options).unwrap_err();
    let msg = format!("{err}");
    assert!(msg.contains("cwd("));
    assert!(msg.contains("index.backend"));
}

#[test]
fn project_file_seen_from_its_root_loads_once() {
    let temp = TempDir::new().expect("tmp");
    let (project_root, _) = project_with_cwd(temp.path());
    write_json5(
        &project_root.join(DEFAULT_CONFIG_FILE),
        "{ retrieval: { top_k: 7 } }",
    );

    let mut options = LayeredConfigOptions::new(&project_root);
    options.system_config_path = None;
    options.user_config_path = None;
    options.requirements_path = None;

    let layered = VibeCheckConfig::load_layered_with_options(options).expect("layered");
    let sources: Vec<_> = layered.layers.iter().map(|layer| layer.source).collect();
    assert_eq!(sources, vec![ConfigLayerSource::Project]);
    assert_eq!(layered.config.retrieval.top_k, 7);
}

#[test]
fn missing_runtime_layer_is_an_error() {
    let temp = TempDir::new().expect("tmp");
    let mut options = LayeredConfigOptions::new(temp.path())
        .with_runtime_path(temp.path().join("absent.json5"));
    options.system_config_path = None;
    options.user_config_path = None;
    options.requirements_path = None;

    let err = VibeCheckConfig::load_layered_with_options(options).unwrap_err();
    assert!(matches!(err, ConfigError::ReadFailed(_)));
}

#[test]
fn default_options_point_at_vibecheck_files() {
    let options = LayeredConfigOptions::new("/tmp");
    if let Some(path) = options.user_config_path {
        assert!(path.ends_with(Path::new(DEFAULT_CONFIG_DIR).join(DEFAULT_CONFIG_FILE)));
    }
    #[cfg(unix)]
    {
        assert_eq!(
            options.system_config_path,
            Some(PathBuf::from("/etc/vibecheck/vibecheck.json5"))
        );
        assert_eq!(
            options.requirements_path,
            Some(PathBuf::from("/etc/vibecheck/requirements.json5"))
        );
    }
}
