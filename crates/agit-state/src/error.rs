//! Error types for agit-state

use thiserror::Error;

/// Errors that can occur in the persistence layer
#[derive(Error, Debug)]
pub enum StateError {
    /// Database connection error
    #[error("database connection failed: {0}")]
    Connection(String),

    /// Database query error
    #[error("database query failed: {0}")]
    Query(String),

    /// Serialization error
    #[error("serialization failed: {0}")]
    Serialization(String),

    /// Invalid object id (not 64 hex chars)
    #[error("invalid object id: {0}")]
    InvalidObjectId(String),

    /// Stored payload could not be decoded
    #[error("stored payload for {id} is not valid: {detail}")]
    InvalidPayload { id: String, detail: String },

    /// Schema setup error
    #[error("schema setup failed: {0}")]
    SchemaSetup(String),

    /// Filesystem error while preparing the repository root
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<surrealdb::Error> for StateError {
    fn from(err: surrealdb::Error) -> Self {
        StateError::Query(err.to_string())
    }
}

impl From<serde_json::Error> for StateError {
    fn from(err: serde_json::Error) -> Self {
        StateError::Serialization(err.to_string())
    }
}
