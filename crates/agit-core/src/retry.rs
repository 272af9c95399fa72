//! Retry engine: branch-per-attempt isolation with exponential backoff.
//!
//! Every retry runs on its own branch forked from the pre-action baseline,
//! so a failing attempt never moves the base branch. Successful retries
//! fold back with a `theirs` merge; failed retry branches are kept for
//! forensic inspection and are never deleted implicitly.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use agit_state::{now_utc_iso, ObjectId};
use tracing::{info, instrument, warn};
use uuid::Uuid;

use crate::error::{AgitError, Result};
use crate::executor::{ActionOutput, AgentAction, ExecutionEngine};
use crate::merge::MergeStrategy;
use crate::repository::DEFAULT_BRANCH;
use crate::state::{ActionType, AgentState};

/// Cooperative cancellation flag. Honored between attempts and before the
/// backoff sleep, never mid-action.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    cancelled: Arc<AtomicBool>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }
}

/// Record of a single attempt.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryAttempt {
    /// 0 for the initial attempt, 1.. for retries.
    pub attempt_number: u32,
    /// Branch the attempt ran on (the base branch for attempt 0).
    pub branch_name: String,
    pub success: bool,
    /// Post-action commit, when the attempt succeeded.
    pub commit_id: Option<ObjectId>,
    /// Error text, when the attempt failed.
    pub error: Option<String>,
    /// Wall-clock seconds spent in the attempt.
    pub elapsed: f64,
    /// When the attempt started, ISO-8601 UTC.
    pub timestamp: String,
}

/// Aggregated history of all attempts for one logical action.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RetryHistory {
    pub action_message: String,
    pub attempts: Vec<RetryAttempt>,
}

impl RetryHistory {
    pub fn succeeded(&self) -> bool {
        self.attempts.iter().any(|a| a.success)
    }

    pub fn total_attempts(&self) -> u32 {
        self.attempts.len() as u32
    }
}

/// Execute agent actions with automatic retry and branch-per-attempt
/// isolation.
pub struct RetryEngine {
    executor: Arc<ExecutionEngine>,
    max_retries: u32,
    base_delay: Duration,
    histories: tokio::sync::Mutex<Vec<RetryHistory>>,
}

impl RetryEngine {
    /// Wrap `executor`; `max_retries` counts retries beyond the initial
    /// attempt, `base_delay` seeds the exponential backoff.
    pub fn new(executor: Arc<ExecutionEngine>, max_retries: u32, base_delay: Duration) -> Self {
        RetryEngine {
            executor,
            max_retries,
            base_delay,
            histories: tokio::sync::Mutex::new(Vec::new()),
        }
    }

    /// Execute `action` with retry-on-failure.
    pub async fn execute_with_retry(
        &self,
        action: &dyn AgentAction,
        state: AgentState,
        message: &str,
        action_type: ActionType,
    ) -> Result<(ActionOutput, RetryHistory)> {
        self.execute_with_retry_cancellable(action, state, message, action_type, &CancelToken::new())
            .await
    }

    /// Like [`execute_with_retry`], honoring `cancel` between attempts and
    /// before each backoff sleep.
    ///
    /// [`execute_with_retry`]: RetryEngine::execute_with_retry
    #[instrument(skip(self, action, state, cancel), fields(action_type = %action_type))]
    pub async fn execute_with_retry_cancellable(
        &self,
        action: &dyn AgentAction,
        state: AgentState,
        message: &str,
        action_type: ActionType,
        cancel: &CancelToken,
    ) -> Result<(ActionOutput, RetryHistory)> {
        let run_id = short_run_id();
        let mut history = RetryHistory {
            action_message: message.to_string(),
            ..RetryHistory::default()
        };

        // Shared baseline every retry branch forks from.
        let base_branch = self
            .executor
            .current_branch()
            .await?
            .unwrap_or_else(|| DEFAULT_BRANCH.to_string());
        let pre_state_id = self
            .executor
            .commit_state(&state, &format!("pre-retry-base: {message}"), ActionType::Checkpoint)
            .await?;

        let mut last_error = String::new();
        for attempt in 0..=self.max_retries {
            if cancel.is_cancelled() {
                self.record(history.clone()).await;
                return Err(AgitError::ActionFailed(format!(
                    "'{message}' cancelled before attempt {attempt}"
                )));
            }

            let branch_name = if attempt > 0 {
                format!("retry/{run_id}/attempt-{attempt}")
            } else {
                base_branch.clone()
            };
            let timestamp = now_utc_iso();

            if attempt > 0 {
                // Isolate the attempt on a branch at the baseline commit.
                match self
                    .executor
                    .branch(&branch_name, Some(&pre_state_id.to_hex()))
                    .await
                {
                    Ok(_) => {
                        self.executor.checkout(&branch_name).await?;
                    }
                    Err(e) => {
                        warn!(branch = %branch_name, error = %e, "failed to create retry branch");
                        self.restore_base(&base_branch).await;
                    }
                }

                let delay = self.base_delay * 2u32.pow(attempt - 1);
                if !delay.is_zero() {
                    info!(attempt, max = self.max_retries, ?delay, "backing off before retry");
                    tokio::time::sleep(delay).await;
                }
            }

            let started = Instant::now();
            match self
                .executor
                .execute(action, state.clone(), message, action_type)
                .await
            {
                Ok((output, commit_id)) => {
                    history.attempts.push(RetryAttempt {
                        attempt_number: attempt,
                        branch_name: branch_name.clone(),
                        success: true,
                        commit_id: Some(commit_id),
                        error: None,
                        elapsed: started.elapsed().as_secs_f64(),
                        timestamp,
                    });

                    // Fold a successful retry back onto the base branch. A
                    // failed fold leaves the result on the retry branch and
                    // is reported, not fatal.
                    if attempt > 0 {
                        match self.executor.checkout(&base_branch).await {
                            Ok(_) => {
                                if let Err(e) = self
                                    .executor
                                    .merge(&branch_name, MergeStrategy::Theirs)
                                    .await
                                {
                                    warn!(branch = %branch_name, error = %e, "failed to merge retry branch back");
                                }
                            }
                            Err(e) => {
                                warn!(base = %base_branch, error = %e, "failed to restore base branch before merge");
                            }
                        }
                        info!(attempt, branch = %branch_name, base = %base_branch, "retry succeeded");
                    }

                    self.record(history.clone()).await;
                    return Ok((output, history));
                }
                Err(err) => {
                    warn!(attempt, error = %err, "attempt failed");
                    last_error = err.to_string();
                    history.attempts.push(RetryAttempt {
                        attempt_number: attempt,
                        branch_name: branch_name.clone(),
                        success: false,
                        commit_id: None,
                        error: Some(last_error.clone()),
                        elapsed: started.elapsed().as_secs_f64(),
                        timestamp,
                    });
                    if attempt > 0 {
                        self.restore_base(&base_branch).await;
                    }
                }
            }
        }

        self.record(history).await;
        Err(AgitError::RetryExhausted {
            message: message.to_string(),
            attempts: self.max_retries + 1,
            last_error,
        })
    }

    /// Histories of every `execute_with_retry` call on this engine.
    pub async fn retry_histories(&self) -> Vec<RetryHistory> {
        self.histories.lock().await.clone()
    }

    /// Drop the in-memory retry histories.
    pub async fn clear_history(&self) {
        self.histories.lock().await.clear();
    }

    async fn record(&self, history: RetryHistory) {
        self.histories.lock().await.push(history);
    }

    async fn restore_base(&self, base_branch: &str) {
        if let Err(e) = self.executor.checkout(base_branch).await {
            warn!(base = %base_branch, error = %e, "failed to restore base branch");
        }
    }
}

fn short_run_id() -> String {
    Uuid::new_v4().simple().to_string().chars().take(8).collect()
}
