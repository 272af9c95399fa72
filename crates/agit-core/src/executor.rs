//! Execution engine: before/after snapshots around arbitrary agent actions.
//!
//! `execute` commits the input state as a checkpoint, runs the action, and
//! commits the outcome - including an error-path commit when the action
//! fails, so the audit trail records what the agent saw at the moment of
//! failure.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

use agit_state::{AuditRecord, ObjectId};
use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::Mutex;
use tracing::{debug, instrument, warn};

use crate::commit::Commit;
use crate::config::EngineConfig;
use crate::diff::StateDiff;
use crate::error::{AgitError, Result};
use crate::masker::PiiMasker;
use crate::merge::MergeStrategy;
use crate::repository::{GcReport, Repository};
use crate::state::{ActionType, AgentState};
use crate::validator::ValidatorRegistry;

/// What an action produced.
#[derive(Debug, Clone, PartialEq)]
pub enum ActionOutput {
    /// A full replacement state.
    State(AgentState),
    /// A raw value; the engine folds it into `memory.last_result`.
    Raw(Value),
}

impl ActionOutput {
    /// The raw value, when this output is one.
    pub fn as_raw(&self) -> Option<&Value> {
        match self {
            Self::Raw(v) => Some(v),
            Self::State(_) => None,
        }
    }

    /// The replacement state, when this output is one.
    pub fn as_state(&self) -> Option<&AgentState> {
        match self {
            Self::State(s) => Some(s),
            Self::Raw(_) => None,
        }
    }
}

/// An agent action the engine can wrap with snapshots.
///
/// Implementations receive the input state and either return a replacement
/// state or a raw value. Failures are surfaced with `anyhow` so arbitrary
/// agent errors keep their context.
#[async_trait]
pub trait AgentAction: Send + Sync {
    async fn run(&self, state: AgentState) -> anyhow::Result<ActionOutput>;
}

/// Adapter for plain (synchronous) closures.
pub struct FnAction<F>(pub F);

#[async_trait]
impl<F> AgentAction for FnAction<F>
where
    F: Fn(AgentState) -> anyhow::Result<ActionOutput> + Send + Sync,
{
    async fn run(&self, state: AgentState) -> anyhow::Result<ActionOutput> {
        (self.0)(state)
    }
}

/// High-level engine that wraps every agent action with before/after
/// commits.
pub struct ExecutionEngine {
    repo: Repository,
    config: EngineConfig,
    validators: ValidatorRegistry,
    masker: Option<PiiMasker>,
    /// Last state committed through this engine. Strictly derived; any
    /// discrepancy with the store is resolved by reading the store.
    current_state: Mutex<Option<AgentState>>,
    commit_count: AtomicU64,
}

impl ExecutionEngine {
    /// Open the repository at `path` (or `":memory:"`) with defaults.
    pub async fn open(path: &str, agent_id: &str) -> Result<Self> {
        Self::open_with_config(path, agent_id, EngineConfig::default()).await
    }

    /// Open with explicit configuration.
    pub async fn open_with_config(
        path: &str,
        agent_id: &str,
        config: EngineConfig,
    ) -> Result<Self> {
        let repo = Repository::open_with_config(path, agent_id, config.clone()).await?;
        Ok(Self::for_repository(repo, config))
    }

    /// Wrap an existing repository handle.
    pub fn for_repository(repo: Repository, config: EngineConfig) -> Self {
        let masker = config.mask_pii.then(PiiMasker::new);
        let validators =
            ValidatorRegistry::with_builtins(config.max_state_bytes, config.max_cumulative_cost);
        ExecutionEngine {
            repo,
            config,
            validators,
            masker,
            current_state: Mutex::new(None),
            commit_count: AtomicU64::new(0),
        }
    }

    /// Replace the validator registry (builtins included by default).
    pub fn set_validators(&mut self, validators: ValidatorRegistry) {
        self.validators = validators;
    }

    /// The underlying repository handle.
    pub fn repository(&self) -> &Repository {
        &self.repo
    }

    // ------------------------------------------------------------------
    // Core API
    // ------------------------------------------------------------------

    /// Execute `action` with auto-commit before and after.
    ///
    /// On failure the input state is re-committed as a rollback checkpoint
    /// whose message carries the error, and the failure is surfaced as
    /// [`AgitError::ActionFailed`].
    #[instrument(skip(self, action, state), fields(action_type = %action_type))]
    pub async fn execute(
        &self,
        action: &dyn AgentAction,
        state: AgentState,
        message: &str,
        action_type: ActionType,
    ) -> Result<(ActionOutput, ObjectId)> {
        let report = self.validators.validate_pre(&state);
        if !report.passed() {
            return Err(AgitError::InvalidInput(format!(
                "pre-conditions failed: {}",
                report.failure_summary()
            )));
        }

        self.commit_masked(&state, &format!("pre: {message}"), ActionType::Checkpoint)
            .await?;

        let started = Instant::now();
        let output = match action.run(state.clone()).await {
            Ok(output) => output,
            Err(err) => {
                warn!(error = %err, "action failed; recording error-path commit");
                self.commit_masked(
                    &state,
                    &format!("error: {message} – {err}"),
                    ActionType::Rollback,
                )
                .await?;
                return Err(AgitError::ActionFailed(err.to_string()));
            }
        };
        let elapsed = started.elapsed().as_secs_f64();

        let new_state = match &output {
            ActionOutput::State(s) => s.clone(),
            ActionOutput::Raw(v) => {
                let mut s = state.clone();
                s.memory.insert("last_result".to_string(), v.clone());
                s
            }
        };

        let post_report = self.validators.validate_post(&state, &new_state);
        if !post_report.passed() {
            return Err(AgitError::InvalidInput(format!(
                "post-conditions failed: {}",
                post_report.failure_summary()
            )));
        }

        let post_id = self
            .commit_masked(
                &new_state,
                &format!("{message} (elapsed={elapsed:.3}s)"),
                action_type,
            )
            .await?;
        *self.current_state.lock().await = Some(new_state);

        debug!(commit = %post_id.short(), "action committed");
        Ok((output, post_id))
    }

    /// Directly commit `state` without running an action.
    pub async fn commit_state(
        &self,
        state: &AgentState,
        message: &str,
        action_type: ActionType,
    ) -> Result<ObjectId> {
        let id = self.commit_masked(state, message, action_type).await?;
        *self.current_state.lock().await = Some(state.clone());
        Ok(id)
    }

    /// The `limit` most recent commits reachable from HEAD.
    pub async fn get_history(&self, limit: usize) -> Result<Vec<Commit>> {
        self.repo.log(None, limit).await
    }

    /// The last committed state, or `None` on an empty repository.
    pub async fn get_current_state(&self) -> Result<Option<AgentState>> {
        if let Some(state) = self.current_state.lock().await.clone() {
            return Ok(Some(state));
        }
        match self.repo.head_commit().await? {
            Some(id) => Ok(Some(self.repo.get_state(&id).await?)),
            None => Ok(None),
        }
    }

    async fn commit_masked(
        &self,
        state: &AgentState,
        message: &str,
        action_type: ActionType,
    ) -> Result<ObjectId> {
        let prepared = match &self.masker {
            Some(masker) => masker.mask_state(state).0,
            None => state.clone(),
        };
        let id = self.repo.commit(&prepared, message, action_type).await?;
        self.auto_gc_tick().await?;
        Ok(id)
    }

    async fn auto_gc_tick(&self) -> Result<()> {
        if self.config.auto_gc_interval == 0 {
            return Ok(());
        }
        let n = self.commit_count.fetch_add(1, Ordering::SeqCst) + 1;
        if n % self.config.auto_gc_interval == 0 {
            debug!(commits = n, "auto-gc triggered");
            self.repo.gc(0).await?;
        }
        Ok(())
    }

    // ------------------------------------------------------------------
    // Branch helpers (thin pass-through)
    // ------------------------------------------------------------------

    /// Create a branch at `from_ref` (default HEAD).
    pub async fn branch(&self, name: &str, from_ref: Option<&str>) -> Result<ObjectId> {
        self.repo.branch(name, from_ref, false).await
    }

    /// Checkout a branch or commit; returns and caches the recovered state.
    pub async fn checkout(&self, target: &str) -> Result<AgentState> {
        let state = self.repo.checkout(target).await?;
        *self.current_state.lock().await = Some(state.clone());
        Ok(state)
    }

    /// Merge `branch` into HEAD.
    pub async fn merge(&self, branch: &str, strategy: MergeStrategy) -> Result<ObjectId> {
        self.repo.merge(branch, strategy).await
    }

    /// Revert to the state at `target`; returns and caches it.
    pub async fn revert(&self, target: &str) -> Result<AgentState> {
        let state = self.repo.revert(target).await?;
        *self.current_state.lock().await = Some(state.clone());
        Ok(state)
    }

    /// Diff two refs or commit hashes.
    pub async fn diff(&self, base: &str, target: &str) -> Result<StateDiff> {
        self.repo.diff(base, target).await
    }

    /// All branches and their heads.
    pub async fn list_branches(
        &self,
    ) -> Result<std::collections::BTreeMap<String, ObjectId>> {
        self.repo.list_branches().await
    }

    /// Branch HEAD points to, if any.
    pub async fn current_branch(&self) -> Result<Option<String>> {
        self.repo.current_branch().await
    }

    /// Most recent audit entries, newest first.
    pub async fn audit_log(&self, limit: usize) -> Result<Vec<AuditRecord>> {
        self.repo.audit_log(limit).await
    }

    /// Run garbage collection now.
    pub async fn gc(&self, keep_last_n: usize) -> Result<GcReport> {
        self.repo.gc(keep_last_n).await
    }
}
