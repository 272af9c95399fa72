//! Agent state model and action categories.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::{AgitError, Result};

/// One snapshot of an agent: private scratch plus externally observable
/// facts.
///
/// The memory/world-state distinction is advisory; no engine operation
/// treats them differently except by path prefix in diffs.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AgentState {
    /// Agent-private scratch space.
    #[serde(default)]
    pub memory: Map<String, Value>,
    /// Externally observable facts.
    #[serde(default)]
    pub world_state: Map<String, Value>,
}

impl AgentState {
    /// Empty state.
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a state from its two halves.
    pub fn with_parts(memory: Map<String, Value>, world_state: Map<String, Value>) -> Self {
        AgentState {
            memory,
            world_state,
        }
    }

    /// Decode a state from a JSON value.
    ///
    /// Missing halves default to empty maps; a non-object top level or a
    /// non-object half is rejected.
    pub fn from_value(value: &Value) -> Result<Self> {
        let obj = value
            .as_object()
            .ok_or_else(|| AgitError::InvalidInput("agent state must be a mapping".to_string()))?;

        let half = |key: &str| -> Result<Map<String, Value>> {
            match obj.get(key) {
                None | Some(Value::Null) => Ok(Map::new()),
                Some(Value::Object(m)) => Ok(m.clone()),
                Some(other) => Err(AgitError::InvalidInput(format!(
                    "agent state field '{key}' must be a mapping, got {other}"
                ))),
            }
        };

        Ok(AgentState {
            memory: half("memory")?,
            world_state: half("world_state")?,
        })
    }

    /// Encode as the blob wire form `{"memory": ..., "world_state": ...}`.
    pub fn to_value(&self) -> Value {
        let mut obj = Map::new();
        obj.insert("memory".to_string(), Value::Object(self.memory.clone()));
        obj.insert(
            "world_state".to_string(),
            Value::Object(self.world_state.clone()),
        );
        Value::Object(obj)
    }
}

/// Category of the event that produced a commit. Fixed set; unknown values
/// on input are rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionType {
    ToolCall,
    LlmResponse,
    Checkpoint,
    Rollback,
    Retry,
    Merge,
    SystemEvent,
    UserInput,
}

impl ActionType {
    /// Wire name of the category.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ToolCall => "tool_call",
            Self::LlmResponse => "llm_response",
            Self::Checkpoint => "checkpoint",
            Self::Rollback => "rollback",
            Self::Retry => "retry",
            Self::Merge => "merge",
            Self::SystemEvent => "system_event",
            Self::UserInput => "user_input",
        }
    }
}

impl std::fmt::Display for ActionType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for ActionType {
    type Err = AgitError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "tool_call" => Ok(Self::ToolCall),
            "llm_response" => Ok(Self::LlmResponse),
            "checkpoint" => Ok(Self::Checkpoint),
            "rollback" => Ok(Self::Rollback),
            "retry" => Ok(Self::Retry),
            "merge" => Ok(Self::Merge),
            "system_event" => Ok(Self::SystemEvent),
            "user_input" => Ok(Self::UserInput),
            other => Err(AgitError::InvalidInput(format!(
                "unknown action type: {other}"
            ))),
        }
    }
}
