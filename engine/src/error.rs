//! Error types for lifecycle operations.
//!
//! Configuration problems surface as [`LifecycleError::Config`] before any
//! connection is opened. Failures of a specific SQL statement carry the
//! statement text so the caller can see which batch broke.

use dbforge_core::ConfigError;
use thiserror::Error;

use crate::driver::DriverError;

/// Errors that can occur during lifecycle operations.
#[derive(Debug, Error)]
pub enum LifecycleError {
    /// Invalid engine configuration.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// A statement failed on the server.
    #[error("statement failed: {source}\n{statement}")]
    Statement {
        statement: String,
        #[source]
        source: DriverError,
    },

    /// Connection, transaction, or other driver failure.
    #[error("driver error: {0}")]
    Driver(#[from] DriverError),

    /// A query returned a shape the engine cannot interpret.
    #[error("unexpected result from '{query}': {detail}")]
    UnexpectedResult { query: String, detail: String },
}

impl LifecycleError {
    /// The failing statement, for [`LifecycleError::Statement`].
    pub fn statement(&self) -> Option<&str> {
        match self {
            LifecycleError::Statement { statement, .. } => Some(statement),
            _ => None,
        }
    }
}

/// Convenience alias for results with [`LifecycleError`].
pub type Result<T> = std::result::Result<T, LifecycleError>;
