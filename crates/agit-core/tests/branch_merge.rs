//! Branching, divergent commits and three-way merge.

use agit_core::{ActionType, AgentState, MergeStrategy, Repository, MEMORY_PATH};
use serde_json::json;

fn state(v: serde_json::Value) -> AgentState {
    AgentState::from_value(&v).unwrap()
}

#[tokio::test]
async fn divergent_branches_merge_three_way() {
    let repo = Repository::open(MEMORY_PATH, "agent-1").await.unwrap();

    let r0 = repo
        .commit(&state(json!({"memory": {}, "world_state": {}})), "root", ActionType::Checkpoint)
        .await
        .unwrap();

    let a = repo
        .commit(
            &state(json!({"memory": {"x": "A"}, "world_state": {}})),
            "set x",
            ActionType::ToolCall,
        )
        .await
        .unwrap();

    repo.branch("feature", Some(&r0.to_hex()), false).await.unwrap();
    repo.checkout("feature").await.unwrap();
    let b = repo
        .commit(
            &state(json!({"memory": {"y": "B"}, "world_state": {}})),
            "set y",
            ActionType::ToolCall,
        )
        .await
        .unwrap();

    repo.checkout("main").await.unwrap();
    let m = repo.merge("feature", MergeStrategy::ThreeWay).await.unwrap();

    let merged = repo.get_state(&m).await.unwrap();
    assert_eq!(merged.memory["x"], json!("A"));
    assert_eq!(merged.memory["y"], json!("B"));

    let commit = repo.load_commit(&m).await.unwrap();
    assert_eq!(commit.record.parent_hashes, vec![a, b]);
    assert_eq!(commit.record.action_type, ActionType::Merge);
    assert!(commit.merge_conflicts().is_none());

    assert_eq!(
        repo.current_branch().await.unwrap(),
        Some("main".to_string())
    );
}

#[tokio::test]
async fn merge_with_self_changes_nothing() {
    let repo = Repository::open(MEMORY_PATH, "agent-1").await.unwrap();
    let s = state(json!({"memory": {"k": 1}, "world_state": {}}));
    let head = repo.commit(&s, "head", ActionType::Checkpoint).await.unwrap();

    repo.branch("same", None, false).await.unwrap();
    let m = repo.merge("same", MergeStrategy::ThreeWay).await.unwrap();

    assert_eq!(repo.get_state(&m).await.unwrap(), s);
    let commit = repo.load_commit(&m).await.unwrap();
    assert_eq!(commit.record.parent_hashes, vec![head, head]);
    assert!(commit.merge_conflicts().is_none());
}

#[tokio::test]
async fn conflicting_merge_prefers_ours_and_records_theirs() {
    let repo = Repository::open(MEMORY_PATH, "agent-1").await.unwrap();

    let r0 = repo
        .commit(
            &state(json!({"memory": {"k": "base"}, "world_state": {}})),
            "root",
            ActionType::Checkpoint,
        )
        .await
        .unwrap();
    repo.commit(
        &state(json!({"memory": {"k": "ours"}, "world_state": {}})),
        "ours change",
        ActionType::ToolCall,
    )
    .await
    .unwrap();

    repo.branch("theirs-branch", Some(&r0.to_hex()), false)
        .await
        .unwrap();
    repo.checkout("theirs-branch").await.unwrap();
    repo.commit(
        &state(json!({"memory": {"k": "theirs"}, "world_state": {}})),
        "theirs change",
        ActionType::ToolCall,
    )
    .await
    .unwrap();

    repo.checkout("main").await.unwrap();
    let m = repo
        .merge("theirs-branch", MergeStrategy::ThreeWay)
        .await
        .unwrap();

    // Tie-break never aborts: ours wins, theirs is recorded in metadata.
    let merged = repo.get_state(&m).await.unwrap();
    assert_eq!(merged.memory["k"], json!("ours"));

    let commit = repo.load_commit(&m).await.unwrap();
    let conflicts = commit.merge_conflicts().unwrap();
    assert_eq!(conflicts["memory.k"], json!("theirs"));
}

#[tokio::test]
async fn ours_and_theirs_strategies() {
    let repo = Repository::open(MEMORY_PATH, "agent-1").await.unwrap();

    let r0 = repo
        .commit(
            &state(json!({"memory": {"v": 0}, "world_state": {}})),
            "root",
            ActionType::Checkpoint,
        )
        .await
        .unwrap();
    repo.commit(
        &state(json!({"memory": {"v": 1}, "world_state": {}})),
        "main v1",
        ActionType::ToolCall,
    )
    .await
    .unwrap();

    repo.branch("other", Some(&r0.to_hex()), false).await.unwrap();
    repo.checkout("other").await.unwrap();
    repo.commit(
        &state(json!({"memory": {"v": 2}, "world_state": {}})),
        "other v2",
        ActionType::ToolCall,
    )
    .await
    .unwrap();
    repo.checkout("main").await.unwrap();

    let kept = repo.merge("other", MergeStrategy::Ours).await.unwrap();
    assert_eq!(repo.get_state(&kept).await.unwrap().memory["v"], json!(1));

    let taken = repo.merge("other", MergeStrategy::Theirs).await.unwrap();
    assert_eq!(repo.get_state(&taken).await.unwrap().memory["v"], json!(2));
}
