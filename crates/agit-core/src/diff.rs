//! Structured state diff at dot-path granularity.
//!
//! Mappings are recursed key by key; sequences are compared elementwise by
//! index with `[i]` appended to the parent path; everything else is a leaf.
//! Entries are emitted in lexicographic dot-path order.

use agit_state::ObjectId;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::state::AgentState;

/// Kind of change at one path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeType {
    Added,
    Removed,
    Changed,
}

/// One divergence between two states.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiffEntry {
    /// Dot-path of the field, e.g. `memory.plan.steps[2]`.
    pub path: String,
    pub change_type: ChangeType,
    /// Value on the base side (`None` for additions).
    pub old_value: Option<Value>,
    /// Value on the target side (`None` for removals).
    pub new_value: Option<Value>,
}

impl DiffEntry {
    fn added(path: String, new_value: &Value) -> Self {
        DiffEntry {
            path,
            change_type: ChangeType::Added,
            old_value: None,
            new_value: Some(new_value.clone()),
        }
    }

    fn removed(path: String, old_value: &Value) -> Self {
        DiffEntry {
            path,
            change_type: ChangeType::Removed,
            old_value: Some(old_value.clone()),
            new_value: None,
        }
    }

    fn changed(path: String, old_value: &Value, new_value: &Value) -> Self {
        DiffEntry {
            path,
            change_type: ChangeType::Changed,
            old_value: Some(old_value.clone()),
            new_value: Some(new_value.clone()),
        }
    }
}

/// Diff between two committed states.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StateDiff {
    /// Commit id of the base side.
    pub base_hash: ObjectId,
    /// Commit id of the target side.
    pub target_hash: ObjectId,
    /// Divergences in lexicographic path order.
    pub entries: Vec<DiffEntry>,
}

impl StateDiff {
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Join a key onto a dot-path.
pub(crate) fn child_path(parent: &str, key: &str) -> String {
    if parent.is_empty() {
        key.to_string()
    } else {
        format!("{parent}.{key}")
    }
}

/// Compute all divergences between `base` and `target`.
pub fn diff_states(base: &AgentState, target: &AgentState) -> Vec<DiffEntry> {
    let mut entries = Vec::new();
    diff_value(&base.to_value(), &target.to_value(), "", &mut entries);
    entries.sort_by(|a, b| a.path.cmp(&b.path));
    entries
}

fn diff_value(base: &Value, target: &Value, path: &str, out: &mut Vec<DiffEntry>) {
    if base == target {
        return;
    }
    match (base, target) {
        (Value::Object(a), Value::Object(b)) => {
            let mut keys: Vec<&String> = a.keys().chain(b.keys()).collect();
            keys.sort();
            keys.dedup();
            for key in keys {
                let p = child_path(path, key);
                match (a.get(key.as_str()), b.get(key.as_str())) {
                    (None, Some(added)) => out.push(DiffEntry::added(p, added)),
                    (Some(removed), None) => out.push(DiffEntry::removed(p, removed)),
                    (Some(old), Some(new)) => diff_value(old, new, &p, out),
                    (None, None) => {}
                }
            }
        }
        (Value::Array(a), Value::Array(b)) => {
            for i in 0..a.len().max(b.len()) {
                let p = format!("{path}[{i}]");
                match (a.get(i), b.get(i)) {
                    (None, Some(added)) => out.push(DiffEntry::added(p, added)),
                    (Some(removed), None) => out.push(DiffEntry::removed(p, removed)),
                    (Some(old), Some(new)) => diff_value(old, new, &p, out),
                    (None, None) => {}
                }
            }
        }
        (old, new) => out.push(DiffEntry::changed(path.to_string(), old, new)),
    }
}
