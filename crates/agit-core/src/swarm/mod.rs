//! Swarm orchestration core: DAG decomposition, topological scheduling and
//! lock-serialized result commits.

mod orchestrator;
mod task;

pub use orchestrator::{EchoRunner, SubTaskRunner, SwarmOrchestrator, SwarmOutcome};
pub use task::{assign, decompose, topological_order, SubTask, TaskStatus};
