//! Storage contract for the version-control engine.
//!
//! The store keeps three things:
//! - a content-addressed object map (`put`/`get`/`contains`)
//! - a ref table mapping names to values (`set_ref`/`get_ref`/...)
//! - an append-only audit log (`append_audit`/`read_audit`)
//!
//! Guarantees required of every implementation:
//! - `put` is idempotent; concurrent puts of the same id are safe because
//!   the bytes are identical by construction.
//! - a successful `set_ref` or `append_audit` is durable before it returns
//!   and visible to all subsequent reads.
//! - store-then-publish: callers write objects before pointing refs at
//!   them, so any observer of a ref can `get` the object it names.

use std::collections::{HashMap, HashSet};
use std::path::Path;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::object_id::ObjectId;
use crate::Result;

/// UTC timestamp with second precision, ISO-8601 (`2026-08-01T12:00:00Z`).
pub fn now_utc_iso() -> String {
    chrono::Utc::now().format("%Y-%m-%dT%H:%M:%SZ").to_string()
}

/// Operation category recorded in the audit log.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditAction {
    Commit,
    Branch,
    Checkout,
    Merge,
    Revert,
    DeleteBranch,
    Gc,
}

impl AuditAction {
    /// Wire name of the action.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Commit => "commit",
            Self::Branch => "branch",
            Self::Checkout => "checkout",
            Self::Merge => "merge",
            Self::Revert => "revert",
            Self::DeleteBranch => "delete_branch",
            Self::Gc => "gc",
        }
    }
}

impl std::fmt::Display for AuditAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One append-only audit entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditRecord {
    /// Unique event id.
    pub event_id: Uuid,
    /// UTC timestamp, ISO-8601 second precision.
    pub timestamp: String,
    /// Identity that performed the operation.
    pub agent_id: String,
    /// Which operation was performed.
    pub action: AuditAction,
    /// Human-readable detail.
    pub message: String,
    /// Commit the operation produced or targeted, when applicable.
    pub commit_id: Option<ObjectId>,
}

impl AuditRecord {
    /// Create a record stamped with the current time and a fresh event id.
    pub fn new(
        agent_id: &str,
        action: AuditAction,
        message: &str,
        commit_id: Option<ObjectId>,
    ) -> Self {
        AuditRecord {
            event_id: Uuid::new_v4(),
            timestamp: now_utc_iso(),
            agent_id: agent_id.to_string(),
            action,
            message: message.to_string(),
            commit_id,
        }
    }
}

/// Persistent key->bytes map plus ref table and audit log.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Store `bytes` under `id`. Idempotent.
    async fn put(&self, id: &ObjectId, bytes: &[u8]) -> Result<()>;

    /// Retrieve the bytes for `id`, or `None` if absent.
    async fn get(&self, id: &ObjectId) -> Result<Option<Vec<u8>>>;

    /// Check whether `id` exists without reading the payload.
    async fn contains(&self, id: &ObjectId) -> Result<bool>;

    /// Atomically set `name` to `value`, durable before return.
    async fn set_ref(&self, name: &str, value: &str) -> Result<()>;

    /// Read a ref, or `None` if absent.
    async fn get_ref(&self, name: &str) -> Result<Option<String>>;

    /// All refs as a name->value map.
    async fn list_refs(&self) -> Result<HashMap<String, String>>;

    /// Remove a ref. No-op if absent.
    async fn delete_ref(&self, name: &str) -> Result<()>;

    /// Durable append to the audit log.
    async fn append_audit(&self, record: &AuditRecord) -> Result<()>;

    /// The most recent `limit` audit records, newest first.
    async fn read_audit(&self, limit: usize) -> Result<Vec<AuditRecord>>;

    /// Every stored object id. Used by GC for the sweep phase.
    async fn object_ids(&self) -> Result<Vec<ObjectId>>;

    /// Delete a set of objects. Only valid under exclusive access (GC).
    /// Returns the number of objects actually removed.
    async fn delete_objects(&self, ids: &HashSet<ObjectId>) -> Result<usize>;

    /// Filesystem root of the repository, `None` for the in-memory variant.
    fn root_path(&self) -> Option<&Path>;
}
