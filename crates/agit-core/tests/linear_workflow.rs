//! Linear commit workflow with structured diff.

use agit_core::{ActionType, AgentState, ChangeType, Repository, MEMORY_PATH};
use serde_json::json;

fn state(v: serde_json::Value) -> AgentState {
    AgentState::from_value(&v).unwrap()
}

#[tokio::test]
async fn linear_workflow_with_diff() {
    let repo = Repository::open(MEMORY_PATH, "agent-1").await.unwrap();

    let v0 = state(json!({"memory": {"step": 0}, "world_state": {}}));
    let v1 = state(json!({"memory": {"step": 1, "cost": 0.05}, "world_state": {}}));

    let c0 = repo.commit(&v0, "v0", ActionType::Checkpoint).await.unwrap();
    let c1 = repo.commit(&v1, "v1", ActionType::ToolCall).await.unwrap();

    let log = repo.log(None, 10).await.unwrap();
    assert_eq!(log.len(), 2);
    assert_eq!(
        repo.current_branch().await.unwrap(),
        Some("main".to_string())
    );

    let diff = repo.diff(&c0.to_hex(), &c1.to_hex()).await.unwrap();
    assert_eq!(diff.base_hash, c0);
    assert_eq!(diff.target_hash, c1);
    assert_eq!(diff.entries.len(), 2);

    // Lexicographic path order: memory.cost before memory.step.
    assert_eq!(diff.entries[0].path, "memory.cost");
    assert_eq!(diff.entries[0].change_type, ChangeType::Added);
    assert_eq!(diff.entries[0].new_value, Some(json!(0.05)));

    assert_eq!(diff.entries[1].path, "memory.step");
    assert_eq!(diff.entries[1].change_type, ChangeType::Changed);
    assert_eq!(diff.entries[1].old_value, Some(json!(0)));
    assert_eq!(diff.entries[1].new_value, Some(json!(1)));
}

#[tokio::test]
async fn committed_state_round_trips() {
    let repo = Repository::open(MEMORY_PATH, "agent-1").await.unwrap();
    let s = state(json!({
        "memory": {"plan": ["a", "b"], "scores": {"p": 0.9}, "note": null},
        "world_state": {"open_files": 3}
    }));

    let id = repo.commit(&s, "snapshot", ActionType::Checkpoint).await.unwrap();
    assert_eq!(repo.get_state(&id).await.unwrap(), s);
}

#[tokio::test]
async fn equal_states_hash_to_the_same_blob() {
    let repo = Repository::open(MEMORY_PATH, "agent-1").await.unwrap();
    // Key order must not matter for the content address.
    let a = state(json!({"memory": {"x": 1, "y": 2}, "world_state": {}}));
    let b = state(json!({"world_state": {}, "memory": {"y": 2, "x": 1}}));

    let ca = repo.commit(&a, "first", ActionType::Checkpoint).await.unwrap();
    let cb = repo.commit(&b, "second", ActionType::Checkpoint).await.unwrap();

    let ta = repo.load_commit(&ca).await.unwrap().record.tree_hash;
    let tb = repo.load_commit(&cb).await.unwrap().record.tree_hash;
    assert_eq!(ta, tb);
}

#[tokio::test]
async fn diff_with_self_is_empty_and_reverses() {
    let repo = Repository::open(MEMORY_PATH, "agent-1").await.unwrap();

    let v0 = state(json!({"memory": {"a": 1, "b": 2}, "world_state": {}}));
    let v1 = state(json!({"memory": {"b": 3, "c": 4}, "world_state": {}}));
    let c0 = repo.commit(&v0, "v0", ActionType::Checkpoint).await.unwrap();
    let c1 = repo.commit(&v1, "v1", ActionType::Checkpoint).await.unwrap();

    let same = repo.diff(&c0.to_hex(), &c0.to_hex()).await.unwrap();
    assert!(same.is_empty());

    let forward = repo.diff(&c0.to_hex(), &c1.to_hex()).await.unwrap();
    let backward = repo.diff(&c1.to_hex(), &c0.to_hex()).await.unwrap();
    assert_eq!(forward.entries.len(), backward.entries.len());
    for fwd in &forward.entries {
        let back = backward
            .entries
            .iter()
            .find(|e| e.path == fwd.path)
            .unwrap();
        match fwd.change_type {
            ChangeType::Added => assert_eq!(back.change_type, ChangeType::Removed),
            ChangeType::Removed => assert_eq!(back.change_type, ChangeType::Added),
            ChangeType::Changed => {
                assert_eq!(back.old_value, fwd.new_value);
                assert_eq!(back.new_value, fwd.old_value);
            }
        }
    }
}
