//! Error types for script bundle and configuration loading.

use thiserror::Error;

/// Errors that can occur while loading script bundles or configuration.
#[derive(Debug, Error)]
pub enum ScriptError {
    /// File I/O failure.
    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),

    /// JSON bundle parsing failure.
    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),

    /// YAML configuration parsing or serialization failure.
    #[error("YAML error: {0}")]
    YamlError(#[from] serde_yaml::Error),

    /// Configuration file is structurally valid but unusable.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// All configured bundle sources failed.
    #[error("no script sources available")]
    NoSourcesAvailable,
}

/// Convenience alias for results with [`ScriptError`].
pub type Result<T> = std::result::Result<T, ScriptError>;
