//! Core error types for breathwork-core.
//!
//! Session-facing failures collapse into a small set of kinds that carry
//! their context (command name, offending field, technique id) rather than
//! a deep hierarchy of types.

use std::path::PathBuf;
use thiserror::Error;

/// Core error type for breathwork-core.
#[derive(Error, Debug)]
pub enum CoreError {
    /// A command failed validation, was rejected by the single-flight guard,
    /// had nothing to undo/redo, or failed while executing.
    #[error("Command '{command}' failed: {message}")]
    CommandExecutionFailed {
        command: String,
        message: String,
        /// Identifier the command was acting on (technique id, theme).
        subject: Option<String>,
    },

    /// A collaborator required by a command is missing from its context.
    #[error("Command '{command}' is missing required dependency '{dependency}'")]
    DependencyInjectionFailed {
        command: String,
        dependency: &'static str,
    },

    /// A session state invariant check failed.
    #[error("Invalid session state for '{field}': {message}")]
    StateUpdateFailed { field: String, message: String },

    /// A technique definition is malformed.
    #[error("Invalid technique '{id}': {message}")]
    InvalidTechnique { id: String, message: String },

    /// No technique is registered under this id.
    #[error("Unknown technique: {0}")]
    UnknownTechnique(String),

    /// Configuration-related errors
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Key-value store failures
    #[error("Storage error for '{key}': {message}")]
    Storage { key: String, message: String },

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization/deserialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl CoreError {
    pub(crate) fn command_failed(
        command: impl Into<String>,
        message: impl Into<String>,
        subject: Option<String>,
    ) -> Self {
        CoreError::CommandExecutionFailed {
            command: command.into(),
            message: message.into(),
            subject,
        }
    }

    pub(crate) fn state(field: impl Into<String>, message: impl Into<String>) -> Self {
        CoreError::StateUpdateFailed {
            field: field.into(),
            message: message.into(),
        }
    }

    /// Wrap an arbitrary failure from inside a command into
    /// `CommandExecutionFailed`. Dependency failures and already-wrapped
    /// errors pass through untouched.
    pub(crate) fn wrap_command(self, command: &str, subject: Option<String>) -> Self {
        match self {
            err @ CoreError::CommandExecutionFailed { .. } => err,
            err @ CoreError::DependencyInjectionFailed { .. } => err,
            other => CoreError::CommandExecutionFailed {
                command: command.to_string(),
                message: other.to_string(),
                subject,
            },
        }
    }
}

/// Configuration-specific errors.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Failed to load configuration
    #[error("Failed to load configuration from {path}: {message}")]
    LoadFailed { path: PathBuf, message: String },

    /// Failed to save configuration
    #[error("Failed to save configuration to {path}: {message}")]
    SaveFailed { path: PathBuf, message: String },

    /// Invalid configuration value
    #[error("Invalid configuration value for '{key}': {message}")]
    InvalidValue { key: String, message: String },

    /// Unknown configuration key
    #[error("Unknown configuration key: {0}")]
    UnknownKey(String),

    /// Data directory could not be resolved or created
    #[error("Data directory unavailable: {0}")]
    DataDir(String),
}

/// Result type alias for CoreError
pub type Result<T, E = CoreError> = std::result::Result<T, E>;
