//! Error types for config loading, validation, and credential lookup.

use thiserror::Error;

/// Errors returned while loading or validating config.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config: {0}")]
    ReadFailed(#[from] std::io::Error),
    #[error("failed to parse config: {0}")]
    ParseFailed(#[from] json5::Error),
    #[error("failed to decode config: {0}")]
    DecodeFailed(#[from] serde_json::Error),
    /// A specific field failed validation.
    #[error("invalid config at {path}: {message}")]
    InvalidField { path: String, message: String },
    /// A credential environment variable is unset or empty.
    #[error("missing credential: environment variable {0} is not set")]
    MissingCredential(String),
    #[error("invalid config: {0}")]
    Invalid(String),
}
