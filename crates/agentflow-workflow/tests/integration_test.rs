//! End-to-end tests for workflow composition, execution and history.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use futures::StreamExt;
use serde_json::{Value, json};

use agentflow_history::MemoryHistoryStore;
use agentflow_protocols::{ExecutionStatus, HistoryNotification};
use agentflow_workflow::{
    Condition, MockStructuredAgent, RunOptions, Step, StepContext, WorkflowConfig, WorkflowError,
    WorkflowEvent, WorkflowRegistry, WorkflowStatus, create_workflow,
};

// ============================================================================
// Test Helpers
// ============================================================================

fn join(id: &str, suffix: &'static str) -> Step {
    Step::map(id, move |data| {
        let name = data["name"].as_str().unwrap_or_default();
        Ok(json!({"name": format!("{}{}", name, suffix)}))
    })
}

/// Step that sleeps for `delay_ms` and then returns `output`.
fn delayed(id: &str, delay_ms: u64, output: Value) -> Step {
    Step::func(id, move |_data, _ctx: StepContext| {
        let output = output.clone();
        async move {
            tokio::time::sleep(Duration::from_millis(delay_ms)).await;
            Ok(output)
        }
    })
}

/// Step that counts its invocations and increments `counter`.
fn counting_increment(id: &str, calls: Arc<AtomicUsize>) -> Step {
    Step::map(id, move |data| {
        calls.fetch_add(1, Ordering::SeqCst);
        let counter = data["counter"].as_i64().unwrap_or_default();
        Ok(json!({"counter": counter + 1}))
    })
}

fn registry() -> Arc<WorkflowRegistry> {
    WorkflowRegistry::with_store(Arc::new(MemoryHistoryStore::new()))
}

// ============================================================================
// Composition
// ============================================================================

#[tokio::test]
async fn test_sequencing_matches_manual_chaining() {
    let workflow = create_workflow(WorkflowConfig::new("greet", "Greeting"))
        .and_then(join("john", " john"))
        .and_then(join("doe", " doe"))
        .build()
        .unwrap();

    let result = workflow.run(json!({"name": "Who is"})).await.unwrap();
    assert_eq!(result.result, json!({"name": "Who is john doe"}));
}

#[tokio::test]
async fn test_and_when_passes_input_through_when_false() {
    let workflow = create_workflow(WorkflowConfig::new("when", "When"))
        .and_when(
            Condition::from_fn(|data| data["vip"] == json!(true)),
            Step::map("upgrade", |_| Ok(json!({"tier": "gold"}))),
        )
        .build()
        .unwrap();

    let skipped = workflow.run(json!({"vip": false, "name": "ann"})).await.unwrap();
    assert_eq!(skipped.result, json!({"vip": false, "name": "ann"}));

    let taken = workflow.run(json!({"vip": true})).await.unwrap();
    assert_eq!(taken.result, json!({"tier": "gold"}));
}

#[tokio::test]
async fn test_and_with_matches_structurally() {
    let workflow = create_workflow(WorkflowConfig::new("with", "With"))
        .and_with(
            json!({"order": {"status": "paid"}}),
            Step::map("ship", |_| Ok(json!({"shipped": true}))),
        )
        .build()
        .unwrap();

    let matched = workflow
        .run(json!({"order": {"status": "paid", "total": 12}, "note": "x"}))
        .await
        .unwrap();
    assert_eq!(matched.result, json!({"shipped": true}));

    let unmatched = workflow
        .run(json!({"order": {"status": "pending"}}))
        .await
        .unwrap();
    assert_eq!(unmatched.result, json!({"order": {"status": "pending"}}));
}

#[tokio::test]
async fn test_loop_polarity_runs_body_once() {
    let calls = Arc::new(AtomicUsize::new(0));
    let do_while = create_workflow(WorkflowConfig::new("while", "While"))
        .and_do_while(
            counting_increment("inc", calls.clone()),
            Condition::from_fn(|_| false),
        )
        .build()
        .unwrap();
    do_while.run(json!({"counter": 0})).await.unwrap();
    assert_eq!(calls.load(Ordering::SeqCst), 1);

    let calls = Arc::new(AtomicUsize::new(0));
    let do_until = create_workflow(WorkflowConfig::new("until", "Until"))
        .and_do_until(
            counting_increment("inc", calls.clone()),
            Condition::from_fn(|_| true),
        )
        .build()
        .unwrap();
    do_until.run(json!({"counter": 0})).await.unwrap();
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_do_until_counts_to_limit() {
    let calls = Arc::new(AtomicUsize::new(0));
    let workflow = create_workflow(WorkflowConfig::new("until", "Until"))
        .and_do_until(
            counting_increment("inc", calls.clone()),
            Condition::from_fn(|data| data["counter"] == json!(5)),
        )
        .build()
        .unwrap();

    let result = workflow.run(json!({"counter": 0})).await.unwrap();
    assert_eq!(result.result, json!({"counter": 5}));
    assert_eq!(calls.load(Ordering::SeqCst), 5);
}

#[tokio::test]
async fn test_do_while_end_to_end() {
    let calls = Arc::new(AtomicUsize::new(0));
    let registry = registry();
    let workflow = registry.register_workflow(
        create_workflow(WorkflowConfig::new("counter", "Counter"))
            .and_do_while(
                vec![counting_increment("inc", calls.clone())],
                Condition::from_fn(|data| data["counter"].as_i64().unwrap_or_default() < 3),
            )
            .build()
            .unwrap(),
    );

    let result = workflow.run(json!({"counter": 0})).await.unwrap();
    assert_eq!(result.result, json!({"counter": 3}));
    assert_eq!(calls.load(Ordering::SeqCst), 3);
}

#[tokio::test(start_paused = true)]
async fn test_all_preserves_step_order() {
    let workflow = create_workflow(WorkflowConfig::new("all", "All"))
        .and_all(vec![
            delayed("slow", 30, json!({"n": 1})),
            delayed("fast", 5, json!({"n": 2})),
            delayed("medium", 15, json!({"n": 3})),
        ])
        .build()
        .unwrap();

    let result = workflow.run(json!({})).await.unwrap();
    assert_eq!(result.result, json!([{"n": 1}, {"n": 2}, {"n": 3}]));
}

#[tokio::test(start_paused = true)]
async fn test_all_rejects_when_any_step_fails() {
    let workflow = create_workflow(WorkflowConfig::new("all", "All"))
        .and_all(vec![
            delayed("ok", 5, json!({"n": 1})),
            Step::map("broken", |_| Err(WorkflowError::custom("branch failed"))),
        ])
        .and_then(Step::map("after", |_| Ok(json!("unreachable"))))
        .build()
        .unwrap();

    let err = workflow.run(json!({})).await.unwrap_err();
    assert_eq!(err.to_string(), "branch failed");
}

#[tokio::test(start_paused = true)]
async fn test_race_returns_first_settled() {
    let workflow = create_workflow(WorkflowConfig::new("race", "Race"))
        .and_race(vec![
            delayed("ten", 10, json!({"value": 1})),
            delayed("five", 5, json!({"value": 2})),
        ])
        .build()
        .unwrap();

    let result = workflow.run(json!({})).await.unwrap();
    assert_eq!(result.result, json!({"value": 2}));
}

#[tokio::test(start_paused = true)]
async fn test_race_settles_on_first_failure() {
    let workflow = create_workflow(WorkflowConfig::new("race", "Race"))
        .and_race(vec![
            delayed("slow", 10, json!({"value": 1})),
            Step::func("fail-fast", |_data, _ctx: StepContext| async move {
                tokio::time::sleep(Duration::from_millis(2)).await;
                Err::<Value, _>(WorkflowError::custom("lost the race badly"))
            }),
        ])
        .build()
        .unwrap();

    let err = workflow.run(json!({})).await.unwrap_err();
    assert_eq!(err.to_string(), "lost the race badly");
}

#[tokio::test]
async fn test_agent_step_uses_structured_output() {
    let agent = Arc::new(MockStructuredAgent::new("writer"));
    agent
        .set_response("john doe", json!({"answer": "a placeholder name"}))
        .await;

    let workflow = create_workflow(WorkflowConfig::new("ask", "Ask"))
        .and_then(join("john", " john"))
        .and_then(join("doe", " doe"))
        .and_then(Step::agent(
            "answer",
            agent.clone(),
            |data: &Value, _ctx: &StepContext| {
                format!("{}?", data["name"].as_str().unwrap_or_default())
            },
            json!({
                "type": "object",
                "required": ["answer"],
                "properties": {"answer": {"type": "string"}}
            }),
        ))
        .build()
        .unwrap();

    let result = workflow.run(json!({"name": "Who is"})).await.unwrap();
    assert_eq!(result.result, json!({"answer": "a placeholder name"}));
    assert_eq!(agent.prompts(), vec!["Who is john doe?".to_string()]);
}

#[tokio::test]
async fn test_agent_failure_fails_run() {
    let agent = Arc::new(MockStructuredAgent::failing("writer", "provider unavailable"));
    let workflow = create_workflow(WorkflowConfig::new("ask", "Ask"))
        .and_then(Step::agent(
            "answer",
            agent,
            |_data: &Value, _ctx: &StepContext| "anything".to_string(),
            Value::Null,
        ))
        .build()
        .unwrap();

    let err = workflow.run(json!({})).await.unwrap_err();
    assert!(matches!(err, WorkflowError::Agent(_)));
    assert!(err.to_string().contains("provider unavailable"));
}

// ============================================================================
// Registry bookkeeping
// ============================================================================

#[tokio::test]
async fn test_registration_overwrites_and_counts_runs() {
    let registry = registry();
    let build = || {
        create_workflow(WorkflowConfig::new("greet", "Greeting"))
            .and_then(join("john", " john"))
            .build()
            .unwrap()
    };

    registry.register_workflow(build());
    let workflow = registry.register_workflow(build());
    assert_eq!(registry.len(), 1);

    workflow.run(json!({"name": "a"})).await.unwrap();
    workflow.run(json!({"name": "b"})).await.unwrap();
    workflow.run(json!({"name": 1})).await.unwrap();

    let registered = registry.get_registered("greet").unwrap();
    assert_eq!(registered.execution_count, 3);
}

#[tokio::test]
async fn test_history_notifications_track_run() {
    let registry = registry();
    let mut notifications = registry.subscribe();
    let workflow = registry.register_workflow(
        create_workflow(WorkflowConfig::new("greet", "Greeting"))
            .and_then(join("john", " john"))
            .build()
            .unwrap(),
    );

    let result = workflow.run(json!({"name": "Who is"})).await.unwrap();
    registry.flush().await;

    let mut statuses = Vec::new();
    while let Ok(notification) = notifications.try_recv() {
        assert_eq!(notification.entry().id, result.execution_id);
        if let HistoryNotification::HistoryCreated(entry) = &notification {
            assert_eq!(entry.status, ExecutionStatus::Running);
        }
        statuses.push(notification.entry().status);
    }
    assert_eq!(statuses.first(), Some(&ExecutionStatus::Running));
    assert_eq!(statuses.last(), Some(&ExecutionStatus::Completed));

    registry.shutdown().await;
}

// ============================================================================
// Streaming
// ============================================================================

#[tokio::test]
async fn test_stream_yields_lifecycle_events() {
    let workflow = create_workflow(WorkflowConfig::new("greet", "Greeting"))
        .and_then(join("john", " john"))
        .and_then(join("doe", " doe"))
        .build()
        .unwrap();

    let (events, result) = workflow.stream(json!({"name": "Who is"})).into_parts();
    let events: Vec<WorkflowEvent> = events.collect().await;
    let names: Vec<&str> = events.iter().map(|e| e.name()).collect();
    assert_eq!(
        names,
        vec![
            "workflow-start",
            "step-start",
            "step-complete",
            "step-start",
            "step-complete",
            "workflow-complete",
        ]
    );
    assert!(events.last().unwrap().is_terminal());

    let result = result.await.unwrap();
    assert_eq!(result.result, json!({"name": "Who is john doe"}));
    assert!(events.iter().all(|e| e.execution_id() == result.execution_id));
}

#[tokio::test]
async fn test_stream_failure_surfaces_through_result() {
    let workflow = create_workflow(WorkflowConfig::new("fail", "Failing"))
        .and_then(join("john", " john"))
        .and_then(Step::map("explode", |_| Err(WorkflowError::custom("step exploded"))))
        .build()
        .unwrap();

    let (events, result) = workflow.stream(json!({"name": "Who is"})).into_parts();
    let events: Vec<WorkflowEvent> = events.collect().await;
    let names: Vec<&str> = events.iter().map(|e| e.name()).collect();
    assert_eq!(
        names,
        vec![
            "workflow-start",
            "step-start",
            "step-complete",
            "step-start",
            "step-error",
            "workflow-error",
        ]
    );

    let err = result.await.unwrap_err();
    assert_eq!(err.to_string(), "step exploded");
}

#[tokio::test]
async fn test_stream_runs_without_consumer() {
    let registry = registry();
    let workflow = registry.register_workflow(
        create_workflow(WorkflowConfig::new("greet", "Greeting"))
            .and_then(join("john", " john"))
            .build()
            .unwrap(),
    );

    let result = workflow
        .stream_with(
            json!({"name": "Who is"}),
            RunOptions::new().with_execution_id("streamed-1"),
        )
        .result()
        .await
        .unwrap();
    assert_eq!(result.status, WorkflowStatus::Completed);

    registry.flush().await;
    let entry = registry.get_execution("streamed-1").await.unwrap().unwrap();
    assert_eq!(entry.status, ExecutionStatus::Completed);
}

#[tokio::test]
async fn test_stream_reports_suspension() {
    let workflow = create_workflow(WorkflowConfig::new("approval", "Approval"))
        .and_then(Step::func("approve", |_data, ctx: StepContext| async move {
            Err::<Value, _>(ctx.suspend("waiting"))
        }))
        .build()
        .unwrap();

    let mut stream = workflow.stream(json!({"draft": 1}));
    let mut last = None;
    while let Some(event) = stream.next().await {
        last = Some(event);
    }
    match last {
        Some(WorkflowEvent::WorkflowSuspended { checkpoint, .. }) => {
            assert_eq!(checkpoint.step_index, 0);
            assert_eq!(checkpoint.data, json!({"draft": 1}));
        }
        other => panic!("expected a suspension event, got {:?}", other),
    }

    let result = stream.result().await.unwrap();
    assert!(result.is_suspended());
}
