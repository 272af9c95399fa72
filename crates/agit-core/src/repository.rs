//! Repository semantics over the object store.
//!
//! Imposes the commit/branch model on the raw key->bytes map: commit and
//! blob object shapes, ref manipulation, history traversal, structured
//! diff, three-way merge, revert, garbage collection and the optional
//! encryption layer. All mutating operations serialize through an internal
//! write lock; cross-process mutation additionally serializes through the
//! advisory lock under the repository root.

use std::collections::{BTreeMap, HashSet, VecDeque};
use std::sync::Arc;

use agit_state::{
    canonical, now_utc_iso, AuditAction, AuditRecord, ObjectId, ObjectStore, SurrealStore,
};
use serde::Serialize;
use serde_json::{Map, Value};
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info, instrument, warn};

use crate::commit::{validate_message, Commit, CommitRecord, MERGE_CONFLICTS_KEY};
use crate::config::EngineConfig;
use crate::crypto::{is_encrypted_field, StateCipher, ENC_PREFIX};
use crate::diff::{diff_states, StateDiff};
use crate::error::{AgitError, Result};
use crate::lock::AdvisoryLock;
use crate::merge::{three_way_merge, MergeStrategy};
use crate::state::{ActionType, AgentState};

/// Name of the symbolic head ref.
pub const HEAD_REF: &str = "HEAD";

/// Branch used before any other is created.
pub const DEFAULT_BRANCH: &str = "main";

const BRANCH_NAME_PATTERN: &str = r"^[A-Za-z0-9][A-Za-z0-9._/-]{0,254}$";
const COMMIT_HASH_PATTERN: &str = r"^[a-fA-F0-9]{4,64}$";

fn branch_name_ok(name: &str) -> bool {
    name != HEAD_REF
        && regex::Regex::new(BRANCH_NAME_PATTERN)
            .map(|re| re.is_match(name))
            .unwrap_or(false)
}

fn hash_like(input: &str) -> bool {
    regex::Regex::new(COMMIT_HASH_PATTERN)
        .map(|re| re.is_match(input))
        .unwrap_or(false)
}

/// Where HEAD currently points.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Head {
    /// A branch with at least one commit.
    Branch(String),
    /// A branch that has no commits yet.
    Unborn(String),
    /// Directly at a commit.
    Detached(ObjectId),
}

/// Outcome of a mark-and-sweep pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct GcReport {
    pub objects_before: usize,
    pub objects_removed: usize,
    pub objects_after: usize,
}

struct Shared {
    write_lock: Mutex<()>,
    cipher: RwLock<Option<StateCipher>>,
    advisory: AdvisoryLock,
}

/// A handle on one agent-state repository.
///
/// Handles are cheap to clone; [`Repository::with_agent`] derives a handle
/// over the same shared store under a different author identity.
#[derive(Clone)]
pub struct Repository {
    store: Arc<dyn ObjectStore>,
    agent_id: String,
    config: EngineConfig,
    shared: Arc<Shared>,
}

impl Repository {
    /// Open the repository at `path` (`":memory:"` for the ephemeral
    /// variant) with default configuration.
    pub async fn open(path: &str, agent_id: &str) -> Result<Self> {
        Self::open_with_config(path, agent_id, EngineConfig::default()).await
    }

    /// Open with explicit configuration.
    pub async fn open_with_config(
        path: &str,
        agent_id: &str,
        config: EngineConfig,
    ) -> Result<Self> {
        let store = SurrealStore::open(path).await?;
        Self::from_store(Arc::new(store), agent_id, config).await
    }

    /// Wrap an already-open store.
    pub async fn from_store(
        store: Arc<dyn ObjectStore>,
        agent_id: &str,
        config: EngineConfig,
    ) -> Result<Self> {
        if store.get_ref(HEAD_REF).await?.is_none() {
            store.set_ref(HEAD_REF, DEFAULT_BRANCH).await?;
        }
        let advisory = AdvisoryLock::for_root(store.root_path());
        Ok(Repository {
            store,
            agent_id: agent_id.to_string(),
            config,
            shared: Arc::new(Shared {
                write_lock: Mutex::new(()),
                cipher: RwLock::new(None),
                advisory,
            }),
        })
    }

    /// A handle over the same store under a different author identity.
    pub fn with_agent(&self, agent_id: &str) -> Self {
        let mut clone = self.clone();
        clone.agent_id = agent_id.to_string();
        clone
    }

    /// Identity used as commit author and audit agent.
    pub fn agent_id(&self) -> &str {
        &self.agent_id
    }

    /// The advisory lock guarding cross-process mutation of this
    /// repository.
    pub fn advisory_lock(&self) -> AdvisoryLock {
        self.shared.advisory.clone()
    }

    // ------------------------------------------------------------------
    // Encryption
    // ------------------------------------------------------------------

    /// Enable field-level encryption for every subsequent blob write and
    /// read through this handle (and its [`with_agent`] derivatives).
    ///
    /// Installing a second key on the same handle is rejected.
    ///
    /// [`with_agent`]: Repository::with_agent
    pub async fn set_encryption_key(&self, key: &str) -> Result<()> {
        let mut guard = self.shared.cipher.write().await;
        if guard.is_some() {
            return Err(AgitError::InvalidInput(
                "encryption key already installed for this repository handle".to_string(),
            ));
        }
        *guard = Some(StateCipher::new(key)?);
        info!("field-level encryption enabled");
        Ok(())
    }

    async fn cipher(&self) -> Option<StateCipher> {
        self.shared.cipher.read().await.clone()
    }

    // ------------------------------------------------------------------
    // HEAD and ref resolution
    // ------------------------------------------------------------------

    /// Current HEAD position.
    pub async fn head(&self) -> Result<Head> {
        let value = self
            .store
            .get_ref(HEAD_REF)
            .await?
            .unwrap_or_else(|| DEFAULT_BRANCH.to_string());

        if self.store.get_ref(&value).await?.is_some() {
            return Ok(Head::Branch(value));
        }
        if let Ok(id) = value.parse::<ObjectId>() {
            if self.store.contains(&id).await? {
                return Ok(Head::Detached(id));
            }
        }
        Ok(Head::Unborn(value))
    }

    /// Commit HEAD resolves to, `None` before the first commit.
    pub async fn head_commit(&self) -> Result<Option<ObjectId>> {
        match self.head().await? {
            Head::Branch(name) => Ok(Some(self.branch_head(&name).await?)),
            Head::Detached(id) => Ok(Some(id)),
            Head::Unborn(_) => Ok(None),
        }
    }

    async fn branch_head(&self, name: &str) -> Result<ObjectId> {
        let hex = self
            .store
            .get_ref(name)
            .await?
            .ok_or_else(|| AgitError::NotFound(name.to_string()))?;
        hex.parse().map_err(|_| {
            AgitError::Storage(format!("branch '{name}' holds an invalid commit id"))
        })
    }

    /// Resolve a branch name, `"HEAD"`, a full commit hash or an
    /// unambiguous short hash to a commit id.
    pub async fn resolve_ref(&self, input: &str) -> Result<ObjectId> {
        if input == HEAD_REF {
            return self
                .head_commit()
                .await?
                .ok_or_else(|| AgitError::NotFound("HEAD (no commits yet)".to_string()));
        }
        if self.store.get_ref(input).await?.is_some() {
            return self.branch_head(input).await;
        }
        if !hash_like(input) {
            return Err(if branch_name_ok(input) {
                AgitError::NotFound(input.to_string())
            } else {
                AgitError::InvalidRef(input.to_string())
            });
        }

        let needle = input.to_ascii_lowercase();
        if needle.len() == 64 {
            let id: ObjectId = needle
                .parse()
                .map_err(|_| AgitError::InvalidRef(input.to_string()))?;
            return if self.store.contains(&id).await? {
                Ok(id)
            } else {
                Err(AgitError::NotFound(input.to_string()))
            };
        }

        // Short hash: must prefix exactly one commit object.
        let mut matches = Vec::new();
        for id in self.store.object_ids().await? {
            if id.to_hex().starts_with(&needle) && self.try_load_commit(&id).await?.is_some() {
                matches.push(id);
            }
        }
        match matches.len() {
            0 => Err(AgitError::NotFound(input.to_string())),
            1 => Ok(matches[0]),
            _ => Err(AgitError::AmbiguousRef(input.to_string())),
        }
    }

    // ------------------------------------------------------------------
    // Object access
    // ------------------------------------------------------------------

    fn verify_integrity(id: &ObjectId, bytes: &[u8]) -> Result<()> {
        if ObjectId::for_bytes(bytes) != *id {
            return Err(AgitError::Corrupted {
                id: id.to_hex(),
                detail: "object bytes do not hash to their id".to_string(),
            });
        }
        Ok(())
    }

    /// Load and verify a commit object.
    pub async fn load_commit(&self, id: &ObjectId) -> Result<Commit> {
        let bytes = self
            .store
            .get(id)
            .await?
            .ok_or_else(|| AgitError::NotFound(id.to_hex()))?;
        Self::verify_integrity(id, &bytes)?;
        let record = CommitRecord::from_bytes(id, &bytes)?;
        Ok(Commit { id: *id, record })
    }

    /// Like [`load_commit`], but yields `None` for absent ids and for
    /// objects that are not commits (blobs). Integrity violations still
    /// fail.
    ///
    /// [`load_commit`]: Repository::load_commit
    async fn try_load_commit(&self, id: &ObjectId) -> Result<Option<CommitRecord>> {
        let Some(bytes) = self.store.get(id).await? else {
            return Ok(None);
        };
        Self::verify_integrity(id, &bytes)?;
        Ok(CommitRecord::from_bytes(id, &bytes).ok())
    }

    /// Load, verify and decode the state a commit snapshots. Decrypts
    /// transparently when encryption is enabled.
    pub async fn get_state(&self, commit_id: &ObjectId) -> Result<AgentState> {
        let commit = self.load_commit(commit_id).await?;
        let blob_id = commit.record.tree_hash;
        let bytes = self
            .store
            .get(&blob_id)
            .await?
            .ok_or_else(|| AgitError::NotFound(blob_id.to_hex()))?;
        Self::verify_integrity(&blob_id, &bytes)?;
        self.decode_state(&blob_id, &bytes).await
    }

    async fn encode_state(&self, state: &AgentState) -> Result<Vec<u8>> {
        let value = match self.cipher().await {
            Some(cipher) => {
                let mut obj = Map::new();
                obj.insert(
                    "memory".to_string(),
                    Value::String(cipher.encrypt_field(&Value::Object(state.memory.clone()))?),
                );
                obj.insert(
                    "world_state".to_string(),
                    Value::String(
                        cipher.encrypt_field(&Value::Object(state.world_state.clone()))?,
                    ),
                );
                Value::Object(obj)
            }
            None => state.to_value(),
        };

        let bytes = canonical::to_canonical_bytes(&value)?;
        if bytes.len() > self.config.max_state_bytes {
            return Err(AgitError::InvalidInput(format!(
                "state blob is {} bytes, max {}",
                bytes.len(),
                self.config.max_state_bytes
            )));
        }
        Ok(bytes)
    }

    async fn decode_state(&self, blob_id: &ObjectId, bytes: &[u8]) -> Result<AgentState> {
        let value: Value = serde_json::from_slice(bytes).map_err(|e| AgitError::Corrupted {
            id: blob_id.to_hex(),
            detail: format!("blob is not valid JSON: {e}"),
        })?;

        let Some(obj) = value.as_object() else {
            return AgentState::from_value(&value);
        };
        if !obj.values().any(is_encrypted_field) {
            return AgentState::from_value(&value);
        }

        let cipher = self.cipher().await.ok_or_else(|| {
            AgitError::InvalidInput(
                "state is encrypted but no encryption key is installed".to_string(),
            )
        })?;
        let mut plain = Map::new();
        for (key, field) in obj {
            let decoded = match field {
                Value::String(s) if s.starts_with(ENC_PREFIX) => {
                    cipher.decrypt_field(s, &blob_id.to_hex())?
                }
                other => other.clone(),
            };
            plain.insert(key.clone(), decoded);
        }
        AgentState::from_value(&Value::Object(plain))
    }

    async fn write_state_blob(&self, state: &AgentState) -> Result<ObjectId> {
        let bytes = self.encode_state(state).await?;
        let id = ObjectId::for_bytes(&bytes);
        self.store.put(&id, &bytes).await?;
        Ok(id)
    }

    async fn write_commit(&self, record: &CommitRecord) -> Result<ObjectId> {
        let bytes = record.to_canonical_bytes()?;
        let id = ObjectId::for_bytes(&bytes);
        self.store.put(&id, &bytes).await?;
        Ok(id)
    }

    async fn append_audit(
        &self,
        action: AuditAction,
        message: &str,
        commit_id: Option<ObjectId>,
    ) -> Result<()> {
        let record = AuditRecord::new(&self.agent_id, action, message, commit_id);
        self.store.append_audit(&record).await.map_err(Into::into)
    }

    // ------------------------------------------------------------------
    // Commits and history
    // ------------------------------------------------------------------

    /// Snapshot `state` as a new commit on the branch HEAD points to.
    #[instrument(skip(self, state), fields(agent = %self.agent_id, action = %action_type))]
    pub async fn commit(
        &self,
        state: &AgentState,
        message: &str,
        action_type: ActionType,
    ) -> Result<ObjectId> {
        validate_message(message)?;
        let _guard = self.shared.write_lock.lock().await;
        self.commit_locked(state, message, action_type, Map::new(), AuditAction::Commit)
            .await
    }

    async fn commit_locked(
        &self,
        state: &AgentState,
        message: &str,
        action_type: ActionType,
        metadata: Map<String, Value>,
        audit_action: AuditAction,
    ) -> Result<ObjectId> {
        let branch = match self.head().await? {
            Head::Branch(name) | Head::Unborn(name) => name,
            Head::Detached(id) => return Err(AgitError::DetachedHead(id.short())),
        };

        let parents = match self.store.get_ref(&branch).await? {
            Some(hex) => vec![hex.parse().map_err(|_| {
                AgitError::Storage(format!("branch '{branch}' holds an invalid commit id"))
            })?],
            None => Vec::new(),
        };

        let tree_hash = self.write_state_blob(state).await?;
        let record = CommitRecord {
            tree_hash,
            parent_hashes: parents,
            message: message.to_string(),
            author: self.agent_id.clone(),
            timestamp: now_utc_iso(),
            action_type,
            metadata,
        };
        let commit_id = self.write_commit(&record).await?;

        self.store.set_ref(&branch, &commit_id.to_hex()).await?;
        self.store.set_ref(HEAD_REF, &branch).await?;
        self.append_audit(audit_action, message, Some(commit_id))
            .await?;

        debug!(commit = %commit_id.short(), branch = %branch, "state committed");
        Ok(commit_id)
    }

    /// History reachable from `start` (default HEAD), newest first,
    /// truncated to `limit`.
    pub async fn log(&self, start: Option<&str>, limit: usize) -> Result<Vec<Commit>> {
        let start_id = match start {
            Some(r) => Some(self.resolve_ref(r).await?),
            None => self.head_commit().await?,
        };
        let Some(start_id) = start_id else {
            return Ok(Vec::new());
        };

        let mut commits = Vec::new();
        let mut visited = HashSet::new();
        let mut queue = VecDeque::from([start_id]);
        while let Some(id) = queue.pop_front() {
            if commits.len() >= limit {
                break;
            }
            if !visited.insert(id) {
                continue;
            }
            let Some(record) = self.try_load_commit(&id).await? else {
                continue;
            };
            queue.extend(record.parent_hashes.iter().copied());
            commits.push(Commit { id, record });
        }

        commits.sort_by(|a, b| b.record.timestamp.cmp(&a.record.timestamp));
        commits.truncate(limit);
        Ok(commits)
    }

    // ------------------------------------------------------------------
    // Branches
    // ------------------------------------------------------------------

    /// Create branch `name` at `from_ref` (default HEAD).
    #[instrument(skip(self))]
    pub async fn branch(
        &self,
        name: &str,
        from_ref: Option<&str>,
        force: bool,
    ) -> Result<ObjectId> {
        if !branch_name_ok(name) {
            return Err(AgitError::InvalidRef(name.to_string()));
        }
        let target = match from_ref {
            Some(r) => self.resolve_ref(r).await?,
            None => self
                .head_commit()
                .await?
                .ok_or_else(|| AgitError::NotFound("HEAD (no commits yet)".to_string()))?,
        };

        let _guard = self.shared.write_lock.lock().await;
        if !force && self.store.get_ref(name).await?.is_some() {
            return Err(AgitError::AlreadyExists(name.to_string()));
        }
        self.store.set_ref(name, &target.to_hex()).await?;
        self.append_audit(
            AuditAction::Branch,
            &format!("branch '{name}' at {}", target.short()),
            Some(target),
        )
        .await?;

        debug!(branch = name, at = %target.short(), "branch created");
        Ok(target)
    }

    /// Move HEAD to a branch (symbolic) or a commit (detached) and return
    /// the state there.
    #[instrument(skip(self))]
    pub async fn checkout(&self, target: &str) -> Result<AgentState> {
        let _guard = self.shared.write_lock.lock().await;

        if target != HEAD_REF && self.store.get_ref(target).await?.is_some() {
            let id = self.branch_head(target).await?;
            let state = self.get_state(&id).await?;
            self.store.set_ref(HEAD_REF, target).await?;
            self.append_audit(
                AuditAction::Checkout,
                &format!("checkout branch '{target}'"),
                Some(id),
            )
            .await?;
            return Ok(state);
        }

        let id = self.resolve_ref(target).await?;
        let state = self.get_state(&id).await?;
        self.store.set_ref(HEAD_REF, &id.to_hex()).await?;
        self.append_audit(
            AuditAction::Checkout,
            &format!("checkout commit {}", id.short()),
            Some(id),
        )
        .await?;
        warn!(commit = %id.short(), "HEAD is now detached");
        Ok(state)
    }

    /// All branches and their heads.
    pub async fn list_branches(&self) -> Result<BTreeMap<String, ObjectId>> {
        let refs = self.store.list_refs().await?;
        let mut branches = BTreeMap::new();
        for (name, value) in refs {
            if name == HEAD_REF {
                continue;
            }
            let id = value.parse().map_err(|_| {
                AgitError::Storage(format!("branch '{name}' holds an invalid commit id"))
            })?;
            branches.insert(name, id);
        }
        Ok(branches)
    }

    /// Name of the branch HEAD points to, `None` when detached or unborn.
    pub async fn current_branch(&self) -> Result<Option<String>> {
        match self.head().await? {
            Head::Branch(name) => Ok(Some(name)),
            _ => Ok(None),
        }
    }

    /// Remove a branch ref. The commits it pointed at survive until GC.
    #[instrument(skip(self))]
    pub async fn delete_branch(&self, name: &str) -> Result<()> {
        let _guard = self.shared.write_lock.lock().await;
        if name == HEAD_REF || self.store.get_ref(name).await?.is_none() {
            return Err(AgitError::NotFound(name.to_string()));
        }
        self.store.delete_ref(name).await?;
        self.append_audit(
            AuditAction::DeleteBranch,
            &format!("deleted branch '{name}'"),
            None,
        )
        .await?;
        Ok(())
    }

    // ------------------------------------------------------------------
    // Merge, diff, revert
    // ------------------------------------------------------------------

    /// Merge `other` into the current branch.
    #[instrument(skip(self), fields(strategy = %strategy))]
    pub async fn merge(&self, other: &str, strategy: MergeStrategy) -> Result<ObjectId> {
        let _guard = self.shared.write_lock.lock().await;

        let current = match self.head().await? {
            Head::Branch(name) => name,
            Head::Unborn(name) => {
                return Err(AgitError::NotFound(format!(
                    "branch '{name}' has no commits to merge into"
                )))
            }
            Head::Detached(id) => return Err(AgitError::DetachedHead(id.short())),
        };
        let ours_id = self.branch_head(&current).await?;
        let theirs_id = self.branch_head(other).await?;

        let ours_state = self.get_state(&ours_id).await?;
        let theirs_state = self.get_state(&theirs_id).await?;

        let (merged, conflicts) = match strategy {
            MergeStrategy::Ours => (ours_state, Map::new()),
            MergeStrategy::Theirs => (theirs_state, Map::new()),
            MergeStrategy::ThreeWay => {
                let base_state = match self.find_lca(&ours_id, &theirs_id).await? {
                    Some(lca) => self.get_state(&lca).await?,
                    None => AgentState::new(),
                };
                let outcome = three_way_merge(&base_state, &ours_state, &theirs_state)?;
                (outcome.state, outcome.conflicts)
            }
        };

        let mut metadata = Map::new();
        if !conflicts.is_empty() {
            warn!(tie_breaks = conflicts.len(), "merge kept ours on conflicting paths");
            metadata.insert(MERGE_CONFLICTS_KEY.to_string(), Value::Object(conflicts));
        }

        let tree_hash = self.write_state_blob(&merged).await?;
        let record = CommitRecord {
            tree_hash,
            parent_hashes: vec![ours_id, theirs_id],
            message: format!("merge branch '{other}' into '{current}'"),
            author: self.agent_id.clone(),
            timestamp: now_utc_iso(),
            action_type: ActionType::Merge,
            metadata,
        };
        let commit_id = self.write_commit(&record).await?;
        self.store.set_ref(&current, &commit_id.to_hex()).await?;
        self.append_audit(
            AuditAction::Merge,
            &format!("merged '{other}' into '{current}' ({strategy})"),
            Some(commit_id),
        )
        .await?;

        info!(commit = %commit_id.short(), "merge committed");
        Ok(commit_id)
    }

    /// Lowest common ancestor of two commits, walking parents
    /// breadth-first from both sides.
    async fn find_lca(&self, a: &ObjectId, b: &ObjectId) -> Result<Option<ObjectId>> {
        let mut ancestors = HashSet::new();
        let mut queue = VecDeque::from([*a]);
        while let Some(id) = queue.pop_front() {
            if !ancestors.insert(id) {
                continue;
            }
            if let Some(record) = self.try_load_commit(&id).await? {
                queue.extend(record.parent_hashes);
            }
        }

        let mut visited = HashSet::new();
        let mut queue = VecDeque::from([*b]);
        while let Some(id) = queue.pop_front() {
            if !visited.insert(id) {
                continue;
            }
            if ancestors.contains(&id) {
                return Ok(Some(id));
            }
            if let Some(record) = self.try_load_commit(&id).await? {
                queue.extend(record.parent_hashes);
            }
        }
        Ok(None)
    }

    /// Structured diff between two refs or commit hashes.
    pub async fn diff(&self, base: &str, target: &str) -> Result<StateDiff> {
        let base_id = self.resolve_ref(base).await?;
        let target_id = self.resolve_ref(target).await?;
        let base_state = self.get_state(&base_id).await?;
        let target_state = self.get_state(&target_id).await?;
        Ok(StateDiff {
            base_hash: base_id,
            target_hash: target_id,
            entries: diff_states(&base_state, &target_state),
        })
    }

    /// Commit the state at `target` again on the current branch and return
    /// it.
    #[instrument(skip(self))]
    pub async fn revert(&self, target: &str) -> Result<AgentState> {
        let target_id = self.resolve_ref(target).await?;
        let state = self.get_state(&target_id).await?;
        let message = format!("revert to {}", target_id.short());

        let _guard = self.shared.write_lock.lock().await;
        self.commit_locked(
            &state,
            &message,
            ActionType::Rollback,
            Map::new(),
            AuditAction::Revert,
        )
        .await?;
        Ok(state)
    }

    // ------------------------------------------------------------------
    // Audit and GC
    // ------------------------------------------------------------------

    /// The most recent `limit` audit entries, newest first.
    pub async fn audit_log(&self, limit: usize) -> Result<Vec<AuditRecord>> {
        self.store.read_audit(limit).await.map_err(Into::into)
    }

    /// Mark-and-sweep over the object store.
    ///
    /// Roots are every branch head plus HEAD when detached. `keep_last_n`
    /// is advisory: reachability already retains every ancestor chain.
    #[instrument(skip(self))]
    pub async fn gc(&self, keep_last_n: usize) -> Result<GcReport> {
        debug!(keep_last_n, "gc requested");
        let _advisory = self
            .shared
            .advisory
            .acquire(self.config.lock_timeout)
            .await?;
        let _guard = self.shared.write_lock.lock().await;

        let mut roots = Vec::new();
        for (name, value) in self.store.list_refs().await? {
            if name == HEAD_REF {
                continue;
            }
            roots.push(value.parse::<ObjectId>().map_err(|_| {
                AgitError::Storage(format!("branch '{name}' holds an invalid commit id"))
            })?);
        }
        if let Head::Detached(id) = self.head().await? {
            roots.push(id);
        }

        let mut reachable = HashSet::new();
        let mut queue: VecDeque<ObjectId> = roots.into();
        while let Some(id) = queue.pop_front() {
            if !reachable.insert(id) {
                continue;
            }
            if let Some(record) = self.try_load_commit(&id).await? {
                reachable.insert(record.tree_hash);
                queue.extend(record.parent_hashes);
            }
        }

        let all = self.store.object_ids().await?;
        let objects_before = all.len();
        let doomed: HashSet<ObjectId> = all
            .into_iter()
            .filter(|id| !reachable.contains(id))
            .collect();
        let objects_removed = self.store.delete_objects(&doomed).await?;

        let report = GcReport {
            objects_before,
            objects_removed,
            objects_after: objects_before - objects_removed,
        };
        self.append_audit(
            AuditAction::Gc,
            &format!(
                "gc removed {} of {} objects",
                report.objects_removed, report.objects_before
            ),
            None,
        )
        .await?;
        info!(?report, "gc complete");
        Ok(report)
    }
}
