//! Built-in demo workflows.
//!
//! Agent steps use [`MockStructuredAgent`], so every demo runs offline.

use std::sync::Arc;

use serde_json::{Value, json};

use agentflow_workflow::{
    Condition, MockStructuredAgent, Step, StepContext, Workflow, WorkflowConfig, WorkflowError,
    create_workflow,
};

/// A demo workflow and the input it runs on by default.
pub(crate) struct Demo {
    pub workflow: Workflow,
    pub sample_input: Value,
}

fn join(id: &str, suffix: &'static str) -> Step {
    Step::map(id, move |data| {
        let name = data["name"].as_str().unwrap_or_default();
        Ok(json!({ "name": format!("{}{}", name, suffix) }))
    })
}

fn greeting() -> Result<Demo, WorkflowError> {
    let workflow = create_workflow(
        WorkflowConfig::new("greeting", "Greeting").with_purpose("Append two names in sequence"),
    )
    .and_then(join("join-john", " john"))
    .and_then(join("join-doe", " doe"))
    .build()?;

    Ok(Demo {
        workflow,
        sample_input: json!({ "name": "Who is" }),
    })
}

fn counter() -> Result<Demo, WorkflowError> {
    let workflow = create_workflow(
        WorkflowConfig::new("counter", "Counter")
            .with_purpose("Increment a counter until it reaches 3")
            .with_input_schema(json!({
                "type": "object",
                "required": ["counter"],
                "properties": { "counter": { "type": "integer" } }
            })),
    )
    .and_do_while(
        Step::map("increment", |data| {
            let counter = data["counter"].as_i64().unwrap_or_default();
            Ok(json!({ "counter": counter + 1 }))
        }),
        Condition::from_fn(|data| data["counter"].as_i64().unwrap_or_default() < 3),
    )
    .build()?;

    Ok(Demo {
        workflow,
        sample_input: json!({ "counter": 0 }),
    })
}

fn topic_prompt(
    verb: &'static str,
) -> impl Fn(&Value, &StepContext) -> String + Send + Sync + 'static {
    move |data, _ctx| format!("{} {}", verb, data["topic"].as_str().unwrap_or("nothing"))
}

async fn research() -> Result<Demo, WorkflowError> {
    let agent = Arc::new(MockStructuredAgent::new("researcher"));
    agent
        .set_response("Summarize", json!({ "summary": "Workflows compose steps." }))
        .await;
    agent
        .set_response("keywords", json!({ "keywords": ["workflow", "step", "agent"] }))
        .await;

    let workflow = create_workflow(
        WorkflowConfig::new("research", "Research")
            .with_purpose("Ask two agents in parallel and merge their answers"),
    )
    .and_all(vec![
        Step::agent(
            "summarize",
            agent.clone(),
            topic_prompt("Summarize"),
            json!({
                "type": "object",
                "required": ["summary"],
                "properties": { "summary": { "type": "string" } }
            }),
        ),
        Step::agent(
            "keywords",
            agent,
            topic_prompt("List keywords for"),
            json!({
                "type": "object",
                "required": ["keywords"],
                "properties": { "keywords": { "type": "array" } }
            }),
        ),
    ])
    .and_then(Step::map("merge", |data| {
        let mut merged = serde_json::Map::new();
        for part in data.as_array().into_iter().flatten() {
            if let Some(object) = part.as_object() {
                merged.extend(object.clone());
            }
        }
        Ok(Value::Object(merged))
    }))
    .build()?;

    Ok(Demo {
        workflow,
        sample_input: json!({ "topic": "agent workflows" }),
    })
}

fn triage() -> Result<Demo, WorkflowError> {
    let workflow = create_workflow(
        WorkflowConfig::new("triage", "Ticket triage")
            .with_purpose("Route tickets by pattern and escalate urgent ones"),
    )
    .and_with(
        json!({ "kind": "bug" }),
        Step::map("label-bug", |mut data| {
            data["queue"] = json!("engineering");
            Ok(data)
        }),
    )
    .and_when(
        Condition::from_fn(|data| data["priority"].as_u64().unwrap_or_default() >= 2),
        Step::map("escalate", |mut data| {
            data["escalated"] = json!(true);
            Ok(data)
        }),
    )
    .build()?;

    Ok(Demo {
        workflow,
        sample_input: json!({ "kind": "bug", "priority": 3, "title": "crash on save" }),
    })
}

/// Every demo, sorted by id.
pub(crate) async fn all() -> Result<Vec<Demo>, WorkflowError> {
    let mut demos = vec![counter()?, greeting()?, research().await?, triage()?];
    demos.sort_by(|a, b| a.workflow.id().cmp(b.workflow.id()));
    Ok(demos)
}
