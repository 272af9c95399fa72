//! Commit objects and their canonical wire form.

use agit_state::{canonical, ObjectId};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::{AgitError, Result};
use crate::state::ActionType;

/// Upper bound on commit message size, in bytes.
pub const MAX_MESSAGE_BYTES: usize = 4096;

/// Commit metadata key under which three-way merge tie-breaks are recorded.
pub const MERGE_CONFLICTS_KEY: &str = "merge_conflicts";

/// Wire form of a commit, exactly as hashed and stored.
///
/// `commit_id = H(canonical_bytes(record))`, so two commits with identical
/// fields always share an id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommitRecord {
    /// Blob id of the state snapshot.
    pub tree_hash: ObjectId,
    /// Parent commit ids: empty for root, one for normal, two for merge.
    pub parent_hashes: Vec<ObjectId>,
    /// Human-readable description, at most [`MAX_MESSAGE_BYTES`] bytes.
    pub message: String,
    /// Agent identity that produced the commit.
    pub author: String,
    /// UTC, ISO-8601 with second precision.
    pub timestamp: String,
    /// What produced this commit.
    pub action_type: ActionType,
    /// Free-form annotations (e.g. merge tie-break records).
    #[serde(default)]
    pub metadata: Map<String, Value>,
}

impl CommitRecord {
    /// Canonical bytes of this record, as stored in the object store.
    pub fn to_canonical_bytes(&self) -> Result<Vec<u8>> {
        let value = serde_json::to_value(self)
            .map_err(|e| AgitError::Storage(format!("commit encode: {e}")))?;
        canonical::to_canonical_bytes(&value).map_err(AgitError::from)
    }

    /// Content id of this record.
    pub fn id(&self) -> Result<ObjectId> {
        Ok(ObjectId::for_bytes(&self.to_canonical_bytes()?))
    }

    /// Decode a record from stored bytes. The caller is responsible for
    /// verifying that the bytes hash to the expected id.
    pub fn from_bytes(id: &ObjectId, bytes: &[u8]) -> Result<Self> {
        serde_json::from_slice(bytes).map_err(|e| AgitError::Corrupted {
            id: id.to_hex(),
            detail: format!("not a commit record: {e}"),
        })
    }
}

/// A commit together with its id, as returned by history queries.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Commit {
    pub id: ObjectId,
    #[serde(flatten)]
    pub record: CommitRecord,
}

impl Commit {
    /// First eight hex chars of the id.
    pub fn short_id(&self) -> String {
        self.id.short()
    }

    /// Merge tie-break records, if this is a merge commit that broke ties.
    pub fn merge_conflicts(&self) -> Option<&Value> {
        self.record.metadata.get(MERGE_CONFLICTS_KEY)
    }
}

/// Validate a commit message against the size constraint.
pub fn validate_message(message: &str) -> Result<()> {
    if message.len() > MAX_MESSAGE_BYTES {
        return Err(AgitError::InvalidInput(format!(
            "commit message is {} bytes, max {MAX_MESSAGE_BYTES}",
            message.len()
        )));
    }
    Ok(())
}
