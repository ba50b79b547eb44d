//! Error Types - Role Failures
//!
//! Errors raised by the classroom roles and their collaborators. Role nodes
//! hand them to the engine as node errors, so a failing role leaves the
//! thread's checkpoint untouched and the node is retried by the next invoke.
//!
//! # Error Categories
//!
//! - **Collaborator Errors** - the text model or the retriever failed
//! - **Input Errors** - a field the role needs is missing or malformed
//! - **Output Errors** - the model answered in an unusable shape
//! - **Configuration Errors** - config files could not be read or parsed,
//!   or the configured checkpoint store could not be opened

use colloquy_checkpoint::CheckpointError;
use colloquy_core::ReportError;
use std::path::PathBuf;
use thiserror::Error;

/// Result type for role operations
pub type Result<T> = std::result::Result<T, RoleError>;

/// Errors that can occur in role nodes and their collaborators
#[derive(Error, Debug)]
pub enum RoleError {
    /// The text model failed to produce a response
    #[error("Text model failed: {0}")]
    Model(String),

    /// The retriever failed to produce context
    #[error("Retrieval failed: {0}")]
    Retrieval(String),

    /// A state field the role reads has not been provided
    #[error("Missing state field '{0}'")]
    MissingField(String),

    /// A human selection does not point at an existing point or case
    #[error("Invalid {field}: {reason}")]
    InvalidSelection { field: String, reason: String },

    /// The critic's answer is not a usable list of discussion points
    #[error("Malformed critique: {0}")]
    MalformedCritique(String),

    #[error(transparent)]
    Report(#[from] ReportError),

    #[error("Checkpoint store error: {0}")]
    Checkpoint(#[from] CheckpointError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Failed to read config {}: {source}", path.display())]
    ConfigRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config {}: {source}", path.display())]
    ConfigParse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("Invalid configuration: {0}")]
    Config(String),
}

impl RoleError {
    pub fn invalid_selection(field: impl Into<String>, reason: impl Into<String>) -> Self {
        RoleError::InvalidSelection {
            field: field.into(),
            reason: reason.into(),
        }
    }
}
