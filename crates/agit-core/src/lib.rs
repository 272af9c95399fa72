//! Agit Core Library
//!
//! Version-control engine for AI-agent state: content-addressed commits,
//! branching, structured diff, three-way merge, rollback, retry isolation
//! and swarm orchestration, with a durable audit trail.
//!
//! Layering, leaves first:
//! - [`agit_state`]: canonical hashing, object store, refs, audit log
//! - [`Repository`]: commit/branch semantics, diff, merge, revert, GC,
//!   optional field-level encryption
//! - [`ExecutionEngine`]: before/after snapshots around agent actions
//! - [`RetryEngine`]: branch-per-attempt retries with backoff
//! - [`SwarmOrchestrator`]: DAG decomposition and topological execution
//!   over a pool of workers

pub mod commit;
pub mod config;
pub mod crypto;
pub mod diff;
pub mod error;
pub mod executor;
pub mod lock;
pub mod masker;
pub mod merge;
pub mod repository;
pub mod retry;
pub mod state;
pub mod swarm;
pub mod telemetry;
pub mod validator;

pub use agit_state::{
    canonical, now_utc_iso, AuditAction, AuditRecord, ObjectId, ObjectStore, SurrealStore,
    MEMORY_PATH,
};

pub use commit::{validate_message, Commit, CommitRecord, MAX_MESSAGE_BYTES, MERGE_CONFLICTS_KEY};
pub use config::EngineConfig;
pub use crypto::{StateCipher, ENC_PREFIX};
pub use diff::{ChangeType, DiffEntry, StateDiff};
pub use error::{AgitError, Result};
pub use executor::{ActionOutput, AgentAction, ExecutionEngine, FnAction};
pub use lock::{AdvisoryLock, LockGuard};
pub use masker::{MaskedField, PiiMasker};
pub use merge::{three_way_merge, MergeOutcome, MergeStrategy};
pub use repository::{GcReport, Head, Repository, DEFAULT_BRANCH, HEAD_REF};
pub use retry::{CancelToken, RetryAttempt, RetryEngine, RetryHistory};
pub use state::{ActionType, AgentState};
pub use swarm::{EchoRunner, SubTask, SubTaskRunner, SwarmOrchestrator, SwarmOutcome, TaskStatus};
pub use telemetry::init_tracing;
pub use validator::{ValidationReport, ValidationResult, ValidationStage, ValidatorRegistry};

/// agit version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
