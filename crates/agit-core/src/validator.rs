//! Pre/post-condition checks for agent actions.
//!
//! A [`ValidatorRegistry`] holds named checks that the execution engine
//! runs around every action: pre-checks see the input state, post-checks
//! see the input and output states. A failing check stops the engine with
//! `InvalidInput` before anything is committed on that side.

use crate::state::AgentState;

/// When a check runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValidationStage {
    Pre,
    Post,
}

impl std::fmt::Display for ValidationStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Self::Pre => "pre",
            Self::Post => "post",
        })
    }
}

/// Result of running a single validator.
#[derive(Debug, Clone, PartialEq)]
pub struct ValidationResult {
    pub name: String,
    pub stage: ValidationStage,
    pub passed: bool,
    pub message: String,
}

/// Aggregated results from all validators of one stage.
#[derive(Debug, Clone, Default)]
pub struct ValidationReport {
    pub results: Vec<ValidationResult>,
}

impl ValidationReport {
    pub fn passed(&self) -> bool {
        self.results.iter().all(|r| r.passed)
    }

    pub fn failures(&self) -> Vec<&ValidationResult> {
        self.results.iter().filter(|r| !r.passed).collect()
    }

    /// One-line summary of every failure, for error messages.
    pub fn failure_summary(&self) -> String {
        self.failures()
            .iter()
            .map(|r| format!("[{}] {}", r.name, r.message))
            .collect::<Vec<_>>()
            .join("; ")
    }
}

type PreCheck = Box<dyn Fn(&AgentState) -> std::result::Result<(), String> + Send + Sync>;
type PostCheck =
    Box<dyn Fn(&AgentState, &AgentState) -> std::result::Result<(), String> + Send + Sync>;

/// Registry of named pre- and post-condition validators.
#[derive(Default)]
pub struct ValidatorRegistry {
    pre: Vec<(String, PreCheck)>,
    post: Vec<(String, PostCheck)>,
}

impl ValidatorRegistry {
    /// Empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with the builtin checks installed: a cumulative-cost cap
    /// and a serialized-size cap before the action, and a memory-shrinkage
    /// guard after it.
    pub fn with_builtins(max_state_bytes: usize, max_cumulative_cost: f64) -> Self {
        let mut registry = Self::new();
        registry.register_pre("cost_limit", move |state| {
            let cost = match state.memory.get("cumulative_cost") {
                None => 0.0,
                Some(value) => value
                    .as_f64()
                    .ok_or_else(|| format!("cumulative_cost is not numeric: {value}"))?,
            };
            if cost > max_cumulative_cost {
                Err(format!(
                    "cumulative_cost {cost:.4} exceeds limit {max_cumulative_cost}"
                ))
            } else {
                Ok(())
            }
        });
        registry.register_pre("state_size_limit", move |state| {
            let bytes = agit_state::canonical::to_canonical_bytes(&state.to_value())
                .map_err(|e| e.to_string())?;
            if bytes.len() > max_state_bytes {
                Err(format!(
                    "state serializes to {} bytes, max {max_state_bytes}",
                    bytes.len()
                ))
            } else {
                Ok(())
            }
        });
        registry.register_post("state_not_regressed", |before, after| {
            let old_keys = before.memory.len();
            let new_keys = after.memory.len();
            if old_keys > 0 && new_keys < old_keys / 2 {
                Err(format!(
                    "state memory shrank from {old_keys} keys to {new_keys} keys"
                ))
            } else {
                Ok(())
            }
        });
        registry
    }

    /// Register a pre-condition over the input state.
    pub fn register_pre<F>(&mut self, name: &str, check: F)
    where
        F: Fn(&AgentState) -> std::result::Result<(), String> + Send + Sync + 'static,
    {
        self.pre.push((name.to_string(), Box::new(check)));
    }

    /// Register a post-condition over (input, output) states.
    pub fn register_post<F>(&mut self, name: &str, check: F)
    where
        F: Fn(&AgentState, &AgentState) -> std::result::Result<(), String> + Send + Sync + 'static,
    {
        self.post.push((name.to_string(), Box::new(check)));
    }

    /// Run all pre-checks.
    pub fn validate_pre(&self, state: &AgentState) -> ValidationReport {
        let results = self
            .pre
            .iter()
            .map(|(name, check)| to_result(name, ValidationStage::Pre, check(state)))
            .collect();
        ValidationReport { results }
    }

    /// Run all post-checks.
    pub fn validate_post(&self, before: &AgentState, after: &AgentState) -> ValidationReport {
        let results = self
            .post
            .iter()
            .map(|(name, check)| to_result(name, ValidationStage::Post, check(before, after)))
            .collect();
        ValidationReport { results }
    }
}

fn to_result(
    name: &str,
    stage: ValidationStage,
    outcome: std::result::Result<(), String>,
) -> ValidationResult {
    match outcome {
        Ok(()) => ValidationResult {
            name: name.to_string(),
            stage,
            passed: true,
            message: String::new(),
        },
        Err(message) => ValidationResult {
            name: name.to_string(),
            stage,
            passed: false,
            message,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn state(v: serde_json::Value) -> AgentState {
        AgentState::from_value(&v).unwrap()
    }

    #[test]
    fn empty_registry_passes() {
        let registry = ValidatorRegistry::new();
        assert!(registry.validate_pre(&AgentState::new()).passed());
    }

    #[test]
    fn failing_pre_check_is_reported() {
        let mut registry = ValidatorRegistry::new();
        registry.register_pre("memory_not_empty", |s| {
            if s.memory.is_empty() {
                Err("memory is empty".to_string())
            } else {
                Ok(())
            }
        });

        let report = registry.validate_pre(&AgentState::new());
        assert!(!report.passed());
        assert_eq!(report.failures().len(), 1);
        assert!(report.failure_summary().contains("memory_not_empty"));

        let ok = registry.validate_pre(&state(json!({"memory": {"k": 1}})));
        assert!(ok.passed());
    }

    #[test]
    fn post_check_sees_both_states() {
        let mut registry = ValidatorRegistry::new();
        registry.register_post("step_monotonic", |before, after| {
            let get = |s: &AgentState| s.memory.get("step").and_then(|v| v.as_i64()).unwrap_or(0);
            if get(after) >= get(before) {
                Ok(())
            } else {
                Err("step went backwards".to_string())
            }
        });

        let a = state(json!({"memory": {"step": 2}}));
        let b = state(json!({"memory": {"step": 1}}));
        assert!(!registry.validate_post(&a, &b).passed());
        assert!(registry.validate_post(&b, &a).passed());
    }

    #[test]
    fn builtin_size_guard() {
        let registry = ValidatorRegistry::with_builtins(64, 100.0);
        let small = state(json!({"memory": {"k": 1}}));
        assert!(registry.validate_pre(&small).passed());

        let big = state(json!({"memory": {"blob": "x".repeat(256)}}));
        let report = registry.validate_pre(&big);
        assert!(!report.passed());
        assert!(report.failure_summary().contains("state_size_limit"));
    }

    #[test]
    fn builtin_cost_limit() {
        let registry = ValidatorRegistry::with_builtins(1024 * 1024, 100.0);

        let under = state(json!({"memory": {"cumulative_cost": 99.5}}));
        assert!(registry.validate_pre(&under).passed());

        let over = state(json!({"memory": {"cumulative_cost": 150.25}}));
        let report = registry.validate_pre(&over);
        assert!(!report.passed());
        assert!(report.failure_summary().contains("cost_limit"));
        assert!(report.failure_summary().contains("150.25"));

        let garbage = state(json!({"memory": {"cumulative_cost": "lots"}}));
        assert!(!registry.validate_pre(&garbage).passed());

        // Absent cost counts as zero spend.
        assert!(registry.validate_pre(&AgentState::new()).passed());
    }

    #[test]
    fn builtin_regression_guard() {
        let registry = ValidatorRegistry::with_builtins(1024 * 1024, 100.0);

        let before = state(json!({"memory": {"a": 1, "b": 2, "c": 3, "d": 4}}));
        let shrunk = state(json!({"memory": {"a": 1}}));
        let report = registry.validate_post(&before, &shrunk);
        assert!(!report.passed());
        assert!(report.failure_summary().contains("state_not_regressed"));

        // Halving exactly is tolerated; only a sharper drop trips the guard.
        let halved = state(json!({"memory": {"a": 1, "b": 2}}));
        assert!(registry.validate_post(&before, &halved).passed());

        // Growth from empty is always fine.
        assert!(registry.validate_post(&AgentState::new(), &before).passed());
    }
}
