//! Swarm orchestrator: topological execution with lock-serialized commits.
//!
//! Ready sub-tasks run concurrently as Tokio tasks; the batch settles
//! before the next ready set is computed. Each executor sub-task commits
//! its result under the worker's identity while holding the repository
//! advisory lock, so the shared commit history stays sequentially
//! consistent even across concurrent workers and processes.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::{Duration, Instant};

use agit_state::now_utc_iso;
use async_trait::async_trait;
use serde_json::{json, Map, Value};
use tokio::task::JoinHandle;
use tracing::{debug, info, instrument, warn};

use crate::error::{AgitError, Result};
use crate::executor::ExecutionEngine;
use crate::retry::CancelToken;
use crate::state::{ActionType, AgentState};
use crate::swarm::task::{assign, decompose, topological_order, SubTask, TaskStatus};

/// Executes one sub-task on behalf of a worker.
///
/// Inject a real implementation that invokes live agents, or rely on
/// [`EchoRunner`] to exercise the orchestration and audit trail without
/// them.
#[async_trait]
pub trait SubTaskRunner: Send + Sync {
    async fn run(&self, subtask: &SubTask, worker_id: &str) -> anyhow::Result<Map<String, Value>>;
}

/// Default runner: records the sub-task as completed without doing work.
pub struct EchoRunner;

#[async_trait]
impl SubTaskRunner for EchoRunner {
    async fn run(&self, subtask: &SubTask, worker_id: &str) -> anyhow::Result<Map<String, Value>> {
        let mut result = Map::new();
        result.insert(
            "output".to_string(),
            json!(format!("Completed: {}", subtask.description)),
        );
        result.insert("worker_id".to_string(), json!(worker_id));
        result.insert("subtask_id".to_string(), json!(subtask.id));
        result.insert("timestamp".to_string(), json!(now_utc_iso()));
        Ok(result)
    }
}

/// Summary of one orchestrated run.
#[derive(Debug, Clone)]
pub struct SwarmOutcome {
    pub task: String,
    /// All sub-tasks with final status and result.
    pub subtasks: Vec<SubTask>,
    /// Result of the synthesis sub-task.
    pub synthesis: Map<String, Value>,
    /// Wall-clock seconds for the whole run.
    pub duration: f64,
    pub workers: Vec<String>,
}

/// Orchestrates a swarm of workers over one shared repository.
pub struct SwarmOrchestrator {
    engine: Arc<ExecutionEngine>,
    runner: Arc<dyn SubTaskRunner>,
    lock_timeout: Duration,
}

impl SwarmOrchestrator {
    /// Orchestrator over `engine` with the default echo runner.
    pub fn new(engine: Arc<ExecutionEngine>) -> Self {
        SwarmOrchestrator {
            engine,
            runner: Arc::new(EchoRunner),
            lock_timeout: Duration::from_secs(30),
        }
    }

    /// Use a custom sub-task runner.
    pub fn with_runner(mut self, runner: Arc<dyn SubTaskRunner>) -> Self {
        self.runner = runner;
        self
    }

    /// Budget for the per-commit advisory-lock wait.
    pub fn with_lock_timeout(mut self, timeout: Duration) -> Self {
        self.lock_timeout = timeout;
        self
    }

    /// Orchestrate the full decompose -> assign -> execute workflow.
    pub async fn execute(&self, task: &str, workers: &[String]) -> Result<SwarmOutcome> {
        self.execute_cancellable(task, workers, &CancelToken::new())
            .await
    }

    /// Like [`execute`], honoring `cancel` between ready-set batches.
    ///
    /// [`execute`]: SwarmOrchestrator::execute
    pub async fn execute_cancellable(
        &self,
        task: &str,
        workers: &[String],
        cancel: &CancelToken,
    ) -> Result<SwarmOutcome> {
        if workers.is_empty() {
            return Err(AgitError::NoWorkers);
        }
        let subtasks = decompose(task, workers.len());
        self.execute_plan_cancellable(task, subtasks, workers, cancel)
            .await
    }

    /// Execute a caller-supplied DAG of sub-tasks.
    ///
    /// The first sub-task is treated as the plan node and the last as the
    /// synthesis node: their outcomes land in the surrounding plan and
    /// synthesis `checkpoint` commits. Every other sub-task commits its
    /// result as a `tool_call` under its worker's identity.
    pub async fn execute_plan(
        &self,
        task: &str,
        subtasks: Vec<SubTask>,
        workers: &[String],
    ) -> Result<SwarmOutcome> {
        self.execute_plan_cancellable(task, subtasks, workers, &CancelToken::new())
            .await
    }

    /// Like [`execute_plan`], honoring `cancel` between ready-set batches.
    ///
    /// [`execute_plan`]: SwarmOrchestrator::execute_plan
    #[instrument(skip(self, subtasks, workers, cancel), fields(workers = workers.len(), subtasks = subtasks.len()))]
    pub async fn execute_plan_cancellable(
        &self,
        task: &str,
        mut subtasks: Vec<SubTask>,
        workers: &[String],
        cancel: &CancelToken,
    ) -> Result<SwarmOutcome> {
        if workers.is_empty() {
            return Err(AgitError::NoWorkers);
        }
        assign(&mut subtasks, workers)?;
        // Reject cyclic graphs before any sub-task runs.
        topological_order(&subtasks)?;

        let started = Instant::now();
        self.engine
            .commit_state(
                &plan_state(task, &subtasks),
                &format!("swarm plan: {}", truncate(task, 60)),
                ActionType::Checkpoint,
            )
            .await?;
        info!(subtasks = subtasks.len(), "swarm plan committed");

        let total = subtasks.len();
        let mut completed: HashSet<String> = HashSet::new();
        let mut pending: Vec<usize> = (0..total).collect();

        while !pending.is_empty() {
            if cancel.is_cancelled() {
                return Err(AgitError::ActionFailed(format!(
                    "swarm '{}' cancelled with {} sub-tasks pending",
                    truncate(task, 60),
                    pending.len()
                )));
            }

            let ready: Vec<usize> = pending
                .iter()
                .copied()
                .filter(|&i| {
                    subtasks[i]
                        .dependencies
                        .iter()
                        .all(|dep| completed.contains(dep))
                })
                .collect();
            if ready.is_empty() {
                return Err(AgitError::DeadlockedDag {
                    remaining: pending.len(),
                });
            }

            type SubTaskResult = std::result::Result<Map<String, Value>, String>;
            let mut handles: Vec<(usize, JoinHandle<SubTaskResult>)> = Vec::new();
            for &i in &ready {
                subtasks[i].status = TaskStatus::InProgress;
                let subtask = subtasks[i].clone();
                let engine = Arc::clone(&self.engine);
                let runner = Arc::clone(&self.runner);
                let lock_timeout = self.lock_timeout;
                // Plan and synthesis outcomes are recorded by the two
                // surrounding checkpoint commits, not as tool calls.
                let commit_result = i != 0 && i != total - 1;
                handles.push((
                    i,
                    tokio::spawn(async move {
                        run_subtask(engine, runner, subtask, lock_timeout, commit_result).await
                    }),
                ));
            }

            // Batch barrier: wait for every ready sub-task to settle before
            // computing the next ready set.
            for (i, handle) in handles {
                let outcome = match handle.await {
                    Ok(outcome) => outcome,
                    Err(join_err) => Err(format!("sub-task panicked: {join_err}")),
                };
                match outcome {
                    Ok(result) => {
                        subtasks[i].status = TaskStatus::Completed;
                        subtasks[i].result = result;
                        completed.insert(subtasks[i].id.clone());
                    }
                    Err(error) => {
                        warn!(subtask = %subtasks[i].id, %error, "sub-task failed");
                        subtasks[i].status = TaskStatus::Failed;
                        let mut result = Map::new();
                        result.insert("error".to_string(), json!(error));
                        subtasks[i].result = result;
                    }
                }
                pending.retain(|&p| p != i);
            }
        }

        let duration = started.elapsed().as_secs_f64();
        let synthesis = subtasks
            .last()
            .map(|t| t.result.clone())
            .unwrap_or_default();

        let mut memory = Map::new();
        memory.insert("task".to_string(), json!(task));
        memory.insert("completed_subtasks".to_string(), json!(completed.len()));
        memory.insert("total_subtasks".to_string(), json!(total));
        memory.insert("synthesis".to_string(), Value::Object(synthesis.clone()));
        memory.insert("duration".to_string(), json!(duration));
        self.engine
            .commit_state(
                &AgentState::with_parts(memory, Map::new()),
                &format!("swarm complete: {}", truncate(task, 60)),
                ActionType::Checkpoint,
            )
            .await?;
        info!(duration, "swarm complete");

        Ok(SwarmOutcome {
            task: task.to_string(),
            subtasks,
            synthesis,
            duration,
            workers: workers.to_vec(),
        })
    }
}

/// Run one sub-task and, for executor nodes, commit its result under the
/// worker's identity.
///
/// The commit is serialized through the advisory lock; a lock timeout fails
/// the sub-task, while a commit error is logged and swallowed so a storage
/// hiccup cannot wedge the whole orchestration.
async fn run_subtask(
    engine: Arc<ExecutionEngine>,
    runner: Arc<dyn SubTaskRunner>,
    subtask: SubTask,
    lock_timeout: Duration,
    commit_result: bool,
) -> std::result::Result<Map<String, Value>, String> {
    let worker = subtask.assigned_worker.clone();
    debug!(subtask = %subtask.id, worker = %worker, "sub-task started");

    let result = runner
        .run(&subtask, &worker)
        .await
        .map_err(|e| e.to_string())?;

    if commit_result {
        let repo = engine.repository().with_agent(&worker);
        let _guard = repo
            .advisory_lock()
            .acquire(lock_timeout)
            .await
            .map_err(|e| e.to_string())?;

        let mut memory = Map::new();
        memory.insert("subtask_id".to_string(), json!(subtask.id));
        memory.insert("description".to_string(), json!(subtask.description));
        memory.insert("result".to_string(), Value::Object(result.clone()));
        memory.insert("worker_id".to_string(), json!(worker));
        let state = AgentState::with_parts(memory, Map::new());

        let short_id: String = subtask.id.chars().take(6).collect();
        let message = format!(
            "swarm subtask {short_id}: {}",
            truncate(&subtask.description, 50)
        );
        if let Err(e) = repo.commit(&state, &message, ActionType::ToolCall).await {
            warn!(subtask = %subtask.id, error = %e, "sub-task commit failed; continuing");
        }
    }

    Ok(result)
}

fn plan_state(task: &str, subtasks: &[SubTask]) -> AgentState {
    let descriptors: Vec<Value> = subtasks.iter().map(SubTask::descriptor).collect();
    let mut memory = Map::new();
    memory.insert("task".to_string(), json!(task));
    memory.insert("subtasks".to_string(), Value::Array(descriptors));
    AgentState::with_parts(memory, Map::new())
}

fn truncate(text: &str, max_chars: usize) -> String {
    text.chars().take(max_chars).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use agit_state::MEMORY_PATH;

    async fn engine() -> Arc<ExecutionEngine> {
        Arc::new(
            ExecutionEngine::open(MEMORY_PATH, "orchestrator")
                .await
                .unwrap(),
        )
    }

    #[tokio::test]
    async fn empty_worker_list_is_rejected() {
        let orchestrator = SwarmOrchestrator::new(engine().await);
        let err = orchestrator.execute("t", &[]).await.unwrap_err();
        assert!(matches!(err, AgitError::NoWorkers));
    }

    #[tokio::test]
    async fn all_subtasks_complete_with_echo_runner() {
        let orchestrator = SwarmOrchestrator::new(engine().await);
        let workers = vec!["w1".to_string(), "w2".to_string()];

        let outcome = orchestrator.execute("collect facts", &workers).await.unwrap();
        assert_eq!(outcome.subtasks.len(), 4); // plan + 2 exec + synth
        assert!(outcome
            .subtasks
            .iter()
            .all(|t| t.status == TaskStatus::Completed));
        assert!(outcome.synthesis["output"]
            .as_str()
            .unwrap()
            .starts_with("Completed:"));
    }

    #[tokio::test]
    async fn failing_executor_deadlocks_the_synthesis() {
        struct FailingRunner;

        #[async_trait]
        impl SubTaskRunner for FailingRunner {
            async fn run(
                &self,
                subtask: &SubTask,
                _worker_id: &str,
            ) -> anyhow::Result<Map<String, Value>> {
                if subtask.description.starts_with("[EXECUTE") {
                    anyhow::bail!("executor crashed");
                }
                Ok(Map::new())
            }
        }

        let orchestrator =
            SwarmOrchestrator::new(engine().await).with_runner(Arc::new(FailingRunner));
        let workers = vec!["w1".to_string(), "w2".to_string()];

        let err = orchestrator.execute("doomed", &workers).await.unwrap_err();
        assert!(matches!(err, AgitError::DeadlockedDag { remaining: 1 }));
    }

    #[tokio::test]
    async fn cancellation_stops_between_batches() {
        struct CancellingRunner {
            token: CancelToken,
        }

        #[async_trait]
        impl SubTaskRunner for CancellingRunner {
            async fn run(
                &self,
                _subtask: &SubTask,
                _worker_id: &str,
            ) -> anyhow::Result<Map<String, Value>> {
                // Cancel during the first batch; the orchestrator checks
                // before dispatching the next one.
                self.token.cancel();
                Ok(Map::new())
            }
        }

        let token = CancelToken::new();
        let orchestrator = SwarmOrchestrator::new(engine().await).with_runner(Arc::new(
            CancellingRunner {
                token: token.clone(),
            },
        ));
        let workers = vec!["w1".to_string()];

        let err = orchestrator
            .execute_cancellable("t", &workers, &token)
            .await
            .unwrap_err();
        assert!(matches!(err, AgitError::ActionFailed(_)));
    }
}
