//! Error types for the CRM tool surface.
//!
//! Tools never surface these as protocol errors: the MCP layer renders
//! them as `Error: ...` text. The display strings are what callers see.

use thiserror::Error;

/// Everything that can go wrong while serving a tool call.
#[derive(Debug, Error)]
pub enum CrmError {
    #[error("properties must be a valid JSON string.")]
    InvalidProperties(#[source] serde_json::Error),

    #[error("Person with name '{0}' already exists.")]
    DuplicatePerson(String),

    #[error("Person '{0}' not found.")]
    PersonNotFound(String),

    /// Carries the raw label that sanitized to nothing.
    #[error("Invalid relationship type name.")]
    InvalidRelationType(String),

    #[error("Missing required parameter: {0}")]
    MissingArgument(&'static str),

    #[error("{0}")]
    InvalidArgument(String),

    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// The engine accepted the request but reported a failure.
    #[error("query failed: {0}")]
    Query(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Convenience alias used across the crate.
pub type Result<T> = std::result::Result<T, CrmError>;
