//! Configuration errors raised while assembling a lifecycle engine.
//!
//! Every variant is detected synchronously, before any connection is opened,
//! and is never retried.

use thiserror::Error;

/// Errors detected while validating scripts and connection settings.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    /// The connection string is missing, empty, or whitespace-only.
    #[error("connection string cannot be empty")]
    MissingConnectionString,

    /// The connection string does not name a target catalog.
    #[error("connection string must specify a database (Initial Catalog or Database)")]
    MissingCatalog,

    /// The catalog name cannot be used as a database name.
    #[error("invalid database name '{0}'")]
    InvalidDatabaseName(String),

    /// The connection string could not be parsed.
    #[error("invalid connection string: {0}")]
    InvalidConnectionString(String),

    /// The create script is missing or contains no statements.
    #[error("create script cannot be empty")]
    MissingCreateScript,

    /// A named script resource could not be resolved.
    #[error("script resource '{name}' not found; available resources: [{}]", available.join(", "))]
    ScriptNotFound {
        /// Fully qualified resource name that was requested.
        name: String,
        /// Every resource name the provider actually exposes.
        available: Vec<String>,
    },
}

/// Convenience alias for results with [`ConfigError`].
pub type Result<T> = std::result::Result<T, ConfigError>;
