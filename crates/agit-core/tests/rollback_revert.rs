//! Error-path commits and revert semantics.

use agit_core::{
    ActionOutput, ActionType, AgentState, AgitError, ExecutionEngine, FnAction, MEMORY_PATH,
};
use serde_json::json;

fn state(v: serde_json::Value) -> AgentState {
    AgentState::from_value(&v).unwrap()
}

#[tokio::test]
async fn failed_action_leaves_recoverable_history() {
    let engine = ExecutionEngine::open(MEMORY_PATH, "agent-1").await.unwrap();
    let safe = state(json!({"memory": {"safe": true}, "world_state": {}}));
    let safe_id = engine
        .commit_state(&safe, "safe state", ActionType::Checkpoint)
        .await
        .unwrap();

    let bad = FnAction(|_s: AgentState| -> anyhow::Result<ActionOutput> {
        anyhow::bail!("tool exploded")
    });
    let err = engine
        .execute(&bad, safe.clone(), "risky call", ActionType::ToolCall)
        .await
        .unwrap_err();
    assert!(matches!(err, AgitError::ActionFailed(_)));

    // The error-path commit is on the branch, rollback-typed, message-tagged.
    let history = engine.get_history(10).await.unwrap();
    assert_eq!(history.len(), 3); // safe, pre, error
    let error_commit = &history[0];
    assert_eq!(error_commit.record.action_type, ActionType::Rollback);
    assert!(error_commit.record.message.starts_with("error: risky call"));
    assert!(error_commit.record.message.contains("tool exploded"));

    // The next commit links to the error-path commit as its parent.
    let next_id = engine
        .commit_state(&safe, "recovering", ActionType::Checkpoint)
        .await
        .unwrap();
    let next = engine.repository().load_commit(&next_id).await.unwrap();
    assert_eq!(next.record.parent_hashes, vec![error_commit.id]);

    // Revert restores the safe state and advances HEAD with a rollback
    // commit whose parent is the pre-revert head.
    let restored = engine.revert(&safe_id.to_hex()).await.unwrap();
    assert_eq!(restored, safe);

    let head = engine.repository().head_commit().await.unwrap().unwrap();
    let revert_commit = engine.repository().load_commit(&head).await.unwrap();
    assert_eq!(revert_commit.record.action_type, ActionType::Rollback);
    assert_eq!(
        revert_commit.record.message,
        format!("revert to {}", safe_id.short())
    );
    assert_eq!(revert_commit.record.parent_hashes, vec![next_id]);
    assert_eq!(
        engine.repository().get_state(&head).await.unwrap(),
        engine.repository().get_state(&safe_id).await.unwrap()
    );
}

#[tokio::test]
async fn revert_resolves_short_hashes() {
    let engine = ExecutionEngine::open(MEMORY_PATH, "agent-1").await.unwrap();
    let v0 = state(json!({"memory": {"gen": 0}, "world_state": {}}));
    let v1 = state(json!({"memory": {"gen": 1}, "world_state": {}}));

    let c0 = engine
        .commit_state(&v0, "gen 0", ActionType::Checkpoint)
        .await
        .unwrap();
    engine
        .commit_state(&v1, "gen 1", ActionType::Checkpoint)
        .await
        .unwrap();

    let restored = engine.revert(&c0.to_hex()[..8]).await.unwrap();
    assert_eq!(restored, v0);
    assert_eq!(engine.get_current_state().await.unwrap(), Some(v0));
}
