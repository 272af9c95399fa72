//! Domain-level error taxonomy for agit.

use std::time::Duration;

/// Errors surfaced by every public repository, engine and swarm operation.
#[derive(Debug, thiserror::Error)]
pub enum AgitError {
    /// Ref or object id unknown.
    #[error("not found: {0}")]
    NotFound(String),

    /// Attempt to create a branch that already exists.
    #[error("ref already exists: {0}")]
    AlreadyExists(String),

    /// Name fails the branch grammar.
    #[error("invalid ref name: {0}")]
    InvalidRef(String),

    /// Short hash prefixes more than one commit.
    #[error("ambiguous ref: {0}")]
    AmbiguousRef(String),

    /// Commit attempted while HEAD points directly at a commit.
    #[error("HEAD is detached at {0}; checkout a branch before committing")]
    DetachedHead(String),

    /// The sub-task graph contains a dependency cycle.
    #[error("dependency cycle detected involving sub-tasks: {tasks:?}")]
    CycleDetected { tasks: Vec<String> },

    /// No ready sub-task exists but work remains.
    #[error("DAG deadlocked: {remaining} sub-tasks have unsatisfiable dependencies")]
    DeadlockedDag { remaining: usize },

    /// The swarm was started without any workers.
    #[error("no workers available")]
    NoWorkers,

    /// The advisory lock was not acquired within the caller's budget.
    #[error("advisory lock unavailable within {0:?}")]
    LockTimeout(Duration),

    /// Underlying I/O or record-store failure.
    #[error("storage error: {0}")]
    Storage(String),

    /// Stored object does not hash to its id, or fails authenticated
    /// decryption.
    #[error("corrupted object {id}: {detail}")]
    Corrupted { id: String, detail: String },

    /// All retry attempts failed.
    #[error("action '{message}' failed after {attempts} attempts; last error: {last_error}")]
    RetryExhausted {
        message: String,
        attempts: u32,
        last_error: String,
    },

    /// Enum or size constraint violated.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// An agent action raised; its failure is recorded and re-surfaced.
    #[error("action failed: {0}")]
    ActionFailed(String),
}

impl From<agit_state::StateError> for AgitError {
    fn from(err: agit_state::StateError) -> Self {
        AgitError::Storage(err.to_string())
    }
}

/// Result type for agit operations.
pub type Result<T> = std::result::Result<T, AgitError>;
