//! Merge strategies and the field-level three-way merge.

use serde_json::{Map, Value};

use crate::diff::child_path;
use crate::error::{AgitError, Result};
use crate::state::AgentState;

/// How two branch heads are combined.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MergeStrategy {
    /// Keep the current branch's state.
    Ours,
    /// Take the other branch's state.
    Theirs,
    /// Field-level merge against the lowest common ancestor.
    ThreeWay,
}

impl MergeStrategy {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Ours => "ours",
            Self::Theirs => "theirs",
            Self::ThreeWay => "three_way",
        }
    }
}

impl std::fmt::Display for MergeStrategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for MergeStrategy {
    type Err = AgitError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "ours" => Ok(Self::Ours),
            "theirs" => Ok(Self::Theirs),
            "three_way" => Ok(Self::ThreeWay),
            other => Err(AgitError::InvalidInput(format!(
                "unknown merge strategy: {other}"
            ))),
        }
    }
}

/// Result of a three-way merge: the combined state plus the tie-breaks that
/// were taken. A conflict never aborts the merge; the discarded `theirs`
/// value is recorded per path.
#[derive(Debug, Clone, PartialEq)]
pub struct MergeOutcome {
    pub state: AgentState,
    /// `path -> theirs_value` for every both-sides-changed disagreement.
    pub conflicts: Map<String, Value>,
}

impl MergeOutcome {
    pub fn had_conflicts(&self) -> bool {
        !self.conflicts.is_empty()
    }
}

/// Field-level three-way merge of two states against their common ancestor.
///
/// Per path: unchanged in both keeps base; changed on one side takes that
/// side; changed identically on both takes the shared value; changed
/// differently on both prefers `ours` and records `theirs` as a conflict.
pub fn three_way_merge(
    base: &AgentState,
    ours: &AgentState,
    theirs: &AgentState,
) -> Result<MergeOutcome> {
    let mut conflicts = Map::new();
    let merged = merge_field(
        Some(&base.to_value()),
        Some(&ours.to_value()),
        Some(&theirs.to_value()),
        "",
        &mut conflicts,
    );

    let state = match merged {
        Some(value) => AgentState::from_value(&value)?,
        None => AgentState::new(),
    };
    Ok(MergeOutcome { state, conflicts })
}

fn merge_field(
    base: Option<&Value>,
    ours: Option<&Value>,
    theirs: Option<&Value>,
    path: &str,
    conflicts: &mut Map<String, Value>,
) -> Option<Value> {
    if ours == theirs {
        return ours.cloned();
    }
    if ours == base {
        return theirs.cloned();
    }
    if theirs == base {
        return ours.cloned();
    }

    // Both sides changed, to different values. Descend when both sides are
    // still mappings so sibling fields merge independently; otherwise break
    // the tie in favour of ours and record what theirs wanted.
    if let (Some(Value::Object(ours_map)), Some(Value::Object(theirs_map))) = (ours, theirs) {
        let empty = Map::new();
        let base_map = base.and_then(Value::as_object).unwrap_or(&empty);

        let mut keys: Vec<&String> = ours_map
            .keys()
            .chain(theirs_map.keys())
            .chain(base_map.keys())
            .collect();
        keys.sort();
        keys.dedup();

        let mut merged = Map::new();
        for key in keys {
            let p = child_path(path, key);
            if let Some(value) = merge_field(
                base_map.get(key.as_str()),
                ours_map.get(key.as_str()),
                theirs_map.get(key.as_str()),
                &p,
                conflicts,
            ) {
                merged.insert(key.clone(), value);
            }
        }
        return Some(Value::Object(merged));
    }

    conflicts.insert(
        path.to_string(),
        theirs.cloned().unwrap_or(Value::Null),
    );
    ours.cloned()
}
