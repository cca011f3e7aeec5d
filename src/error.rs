//! Crate-wide error type.

use std::io;
use std::path::PathBuf;

use thiserror::Error;

use crate::config::ConfigError;

/// Errors produced by the simulation engine and its collaborators.
#[derive(Debug, Error)]
pub enum SimError {
    /// The telemetry store rejected a query or write.
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// Filesystem access failed (lock marker, export file).
    #[error("i/o error: {0}")]
    Io(#[from] io::Error),

    /// The lock marker could not be created or removed.
    #[error("lock marker {}: {message}", path.display())]
    Lock { path: PathBuf, message: String },

    /// `start()` was called outside a Tokio runtime.
    #[error("no Tokio runtime available to host the simulation loop")]
    NoRuntime,

    /// One or more configuration values are invalid.
    #[error("invalid configuration: {}", format_config_errors(.0))]
    Config(Vec<ConfigError>),
}

fn format_config_errors(errors: &[ConfigError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

/// Result alias used throughout the crate.
pub type Result<T> = std::result::Result<T, SimError>;
