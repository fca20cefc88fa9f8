use super::*;
use agentflow_protocols::ExecutionStatus;
use chrono::Duration;

fn entry(workflow_id: &str) -> WorkflowHistoryEntry {
    WorkflowHistoryEntry::new(workflow_id, "Test Workflow", serde_json::json!({"n": 1}))
}

#[tokio::test]
async fn test_create_and_get_execution() {
    let store = MemoryHistoryStore::new();
    let e = entry("wf-1");
    store.create_execution(&e).await.unwrap();

    let loaded = store.get_execution(&e.id).await.unwrap().unwrap();
    assert_eq!(loaded.workflow_id, "wf-1");
    assert_eq!(loaded.status, ExecutionStatus::Running);
    assert_eq!(store.len().await, 1);

    assert!(store.get_execution("missing").await.unwrap().is_none());
}

#[tokio::test]
async fn test_update_keeps_steps() {
    let store = MemoryHistoryStore::new();
    let mut e = entry("wf-1");
    store.create_execution(&e).await.unwrap();

    let step =
        WorkflowStepHistoryEntry::started(&e.id, 0, "s1", "Step 1", "func", serde_json::json!({}));
    store.record_step_start(&step).await.unwrap();

    e.complete(ExecutionStatus::Completed, Some(serde_json::json!({"done": true})), None);
    store.update_execution(&e).await.unwrap();

    let loaded = store.get_execution(&e.id).await.unwrap().unwrap();
    assert_eq!(loaded.status, ExecutionStatus::Completed);
    assert_eq!(loaded.steps.len(), 1);
}

#[tokio::test]
async fn test_update_missing_execution_fails() {
    let store = MemoryHistoryStore::new();
    let result = store.update_execution(&entry("wf-1")).await;
    assert!(matches!(result, Err(HistoryError::NotFound(_))));
}

#[tokio::test]
async fn test_step_end_updates_latest_run_of_index() {
    let store = MemoryHistoryStore::new();
    let e = entry("wf-1");
    store.create_execution(&e).await.unwrap();

    for _ in 0..2 {
        let step = WorkflowStepHistoryEntry::started(
            &e.id,
            0,
            "s1",
            "Step 1",
            "func",
            serde_json::json!({}),
        );
        store.record_step_start(&step).await.unwrap();
    }
    store
        .record_step_end(&e.id, 0, StepStatus::Error, None, Some("failed".to_string()))
        .await
        .unwrap();

    let loaded = store.get_execution(&e.id).await.unwrap().unwrap();
    assert_eq!(loaded.steps[0].status, StepStatus::Running);
    assert_eq!(loaded.steps[1].status, StepStatus::Error);
    assert_eq!(loaded.steps[1].error.as_deref(), Some("failed"));
}

#[tokio::test]
async fn test_step_end_unknown_index_fails() {
    let store = MemoryHistoryStore::new();
    let e = entry("wf-1");
    store.create_execution(&e).await.unwrap();

    let result = store
        .record_step_end(&e.id, 5, StepStatus::Completed, None, None)
        .await;
    assert!(result.is_err());
}

#[tokio::test]
async fn test_timeline_events_appended_in_order() {
    let store = MemoryHistoryStore::new();
    let e = entry("wf-1");
    store.create_execution(&e).await.unwrap();

    for name in ["workflow-start", "step-start", "step-complete", "workflow-complete"] {
        let event = WorkflowTimelineEvent::new(&e.id, name, "workflow", "running");
        store.record_timeline_event(&event).await.unwrap();
    }

    let loaded = store.get_execution(&e.id).await.unwrap().unwrap();
    let names: Vec<_> = loaded.events.iter().map(|ev| ev.name.as_str()).collect();
    assert_eq!(names, vec!["workflow-start", "step-start", "step-complete", "workflow-complete"]);
}

#[tokio::test]
async fn test_executions_by_workflow_sorted_oldest_first() {
    let store = MemoryHistoryStore::new();
    let mut newer = entry("wf-1");
    let mut older = entry("wf-1");
    older.start_time = newer.start_time - Duration::seconds(10);
    newer.start_time += Duration::seconds(1);
    store.create_execution(&newer).await.unwrap();
    store.create_execution(&older).await.unwrap();
    store.create_execution(&entry("wf-2")).await.unwrap();

    let executions = store.get_executions_by_workflow("wf-1").await.unwrap();
    assert_eq!(executions.len(), 2);
    assert_eq!(executions[0].id, older.id);
    assert_eq!(executions[1].id, newer.id);
}

#[tokio::test]
async fn test_workflow_ids_deduplicated() {
    let store = MemoryHistoryStore::new();
    store.create_execution(&entry("wf-b")).await.unwrap();
    store.create_execution(&entry("wf-a")).await.unwrap();
    store.create_execution(&entry("wf-b")).await.unwrap();

    let ids = store.get_all_workflow_ids().await.unwrap();
    assert_eq!(ids, vec!["wf-a".to_string(), "wf-b".to_string()]);
}

#[tokio::test]
async fn test_delete_execution() {
    let store = MemoryHistoryStore::new();
    let e = entry("wf-1");
    store.create_execution(&e).await.unwrap();

    assert!(store.delete_execution(&e.id).await.unwrap());
    assert!(!store.delete_execution(&e.id).await.unwrap());
    assert!(store.is_empty().await);
}
