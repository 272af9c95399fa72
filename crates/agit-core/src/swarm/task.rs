//! Sub-task model, decomposition and DAG validation.

use std::collections::{HashMap, HashSet, VecDeque};

use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use uuid::Uuid;

use crate::error::{AgitError, Result};

/// Lifecycle of one sub-task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Pending,
    InProgress,
    Completed,
    Failed,
}

/// A single unit of work within a decomposed swarm task.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubTask {
    /// Unique identifier.
    pub id: String,
    /// Human-readable description.
    pub description: String,
    /// Ids of sub-tasks that must complete before this one starts.
    pub dependencies: Vec<String>,
    /// Worker assigned to execute this sub-task, empty until assigned.
    pub assigned_worker: String,
    pub status: TaskStatus,
    /// Output produced on completion (or an `error` entry on failure).
    pub result: Map<String, Value>,
}

impl SubTask {
    /// New pending sub-task with a fresh short id.
    pub fn new(description: &str, dependencies: Vec<String>) -> Self {
        SubTask {
            id: Uuid::new_v4().simple().to_string().chars().take(8).collect(),
            description: description.to_string(),
            dependencies,
            assigned_worker: String::new(),
            status: TaskStatus::Pending,
            result: Map::new(),
        }
    }

    /// Compact descriptor used in the plan commit.
    pub fn descriptor(&self) -> Value {
        json!({
            "id": self.id,
            "description": self.description,
            "dependencies": self.dependencies,
            "assigned_worker": self.assigned_worker,
        })
    }
}

/// Decompose `task` into the standard plan -> executors -> synthesis DAG.
///
/// One planning sub-task, one execution sub-task per worker (each
/// depending on the plan), and one synthesis sub-task that depends on all
/// executions. The returned order is topological.
pub fn decompose(task: &str, num_workers: usize) -> Vec<SubTask> {
    let mut subtasks = Vec::new();

    let plan = SubTask::new(&format!("[PLAN] Analyse and plan: {task}"), Vec::new());
    let plan_id = plan.id.clone();
    subtasks.push(plan);

    let num_exec = num_workers.max(1);
    let mut exec_ids = Vec::new();
    for i in 0..num_exec {
        let exec = SubTask::new(
            &format!(
                "[EXECUTE-{}] Execute sub-task {} of {num_exec}: {task}",
                i + 1,
                i + 1
            ),
            vec![plan_id.clone()],
        );
        exec_ids.push(exec.id.clone());
        subtasks.push(exec);
    }

    subtasks.push(SubTask::new(
        &format!("[SYNTHESISE] Merge results and produce final output: {task}"),
        exec_ids,
    ));
    subtasks
}

/// Assign sub-tasks to workers round-robin.
pub fn assign(subtasks: &mut [SubTask], workers: &[String]) -> Result<()> {
    if workers.is_empty() {
        return Err(AgitError::NoWorkers);
    }
    for (i, subtask) in subtasks.iter_mut().enumerate() {
        subtask.assigned_worker = workers[i % workers.len()].clone();
    }
    Ok(())
}

/// Topological order of the sub-task ids via Kahn's algorithm.
///
/// Fails with `CycleDetected` when the graph has a cycle and with
/// `InvalidInput` when a dependency references an unknown id. Run before
/// execution starts so a bad graph never runs partially.
pub fn topological_order(subtasks: &[SubTask]) -> Result<Vec<String>> {
    let ids: HashSet<&str> = subtasks.iter().map(|t| t.id.as_str()).collect();

    let mut indegree: HashMap<&str, usize> = HashMap::new();
    let mut dependents: HashMap<&str, Vec<&str>> = HashMap::new();
    for subtask in subtasks {
        indegree.entry(subtask.id.as_str()).or_insert(0);
        for dep in &subtask.dependencies {
            if !ids.contains(dep.as_str()) {
                return Err(AgitError::InvalidInput(format!(
                    "sub-task {} depends on unknown id {dep}",
                    subtask.id
                )));
            }
            *indegree.entry(subtask.id.as_str()).or_insert(0) += 1;
            dependents
                .entry(dep.as_str())
                .or_default()
                .push(subtask.id.as_str());
        }
    }

    let mut queue: VecDeque<&str> = subtasks
        .iter()
        .map(|t| t.id.as_str())
        .filter(|id| indegree[id] == 0)
        .collect();
    let mut order = Vec::new();
    while let Some(id) = queue.pop_front() {
        order.push(id.to_string());
        if let Some(deps) = dependents.get(id) {
            for &dependent in deps {
                if let Some(count) = indegree.get_mut(dependent) {
                    *count -= 1;
                    if *count == 0 {
                        queue.push_back(dependent);
                    }
                }
            }
        }
    }

    if order.len() != subtasks.len() {
        let stuck: Vec<String> = subtasks
            .iter()
            .map(|t| t.id.clone())
            .filter(|id| !order.contains(id))
            .collect();
        return Err(AgitError::CycleDetected { tasks: stuck });
    }
    Ok(order)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decompose_builds_plan_exec_synth() {
        let subtasks = decompose("summarise papers", 3);
        assert_eq!(subtasks.len(), 5); // plan + 3 exec + synth

        let plan = &subtasks[0];
        assert!(plan.description.starts_with("[PLAN]"));
        assert!(plan.dependencies.is_empty());

        for exec in &subtasks[1..4] {
            assert_eq!(exec.dependencies, vec![plan.id.clone()]);
        }

        let synth = &subtasks[4];
        assert!(synth.description.starts_with("[SYNTHESISE]"));
        assert_eq!(synth.dependencies.len(), 3);
    }

    #[test]
    fn decompose_single_worker_still_has_one_executor() {
        let subtasks = decompose("small task", 1);
        assert_eq!(subtasks.len(), 3);
    }

    #[test]
    fn assign_round_robin() {
        let mut subtasks = decompose("t", 2);
        let workers = vec!["w1".to_string(), "w2".to_string(), "w3".to_string()];
        assign(&mut subtasks, &workers).unwrap();

        assert_eq!(subtasks[0].assigned_worker, "w1");
        assert_eq!(subtasks[1].assigned_worker, "w2");
        assert_eq!(subtasks[2].assigned_worker, "w3");
        assert_eq!(subtasks[3].assigned_worker, "w1");
    }

    #[test]
    fn assign_without_workers_fails() {
        let mut subtasks = decompose("t", 2);
        let err = assign(&mut subtasks, &[]).unwrap_err();
        assert!(matches!(err, AgitError::NoWorkers));
    }

    #[test]
    fn topological_order_respects_dependencies() {
        let subtasks = decompose("t", 3);
        let order = topological_order(&subtasks).unwrap();
        assert_eq!(order[0], subtasks[0].id);
        assert_eq!(order[order.len() - 1], subtasks[4].id);
    }

    #[test]
    fn cycle_is_detected() {
        let mut a = SubTask::new("a", Vec::new());
        let b = SubTask::new("b", vec![a.id.clone()]);
        a.dependencies = vec![b.id.clone()];

        let err = topological_order(&[a, b]).unwrap_err();
        assert!(matches!(err, AgitError::CycleDetected { tasks } if tasks.len() == 2));
    }

    #[test]
    fn unknown_dependency_is_invalid() {
        let a = SubTask::new("a", vec!["missing".to_string()]);
        let err = topological_order(&[a]).unwrap_err();
        assert!(matches!(err, AgitError::InvalidInput(_)));
    }
}
