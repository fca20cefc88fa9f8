//! Workflow subcommand handlers for agentflow.

use std::sync::Arc;

use anyhow::{Context, bail};
use futures::StreamExt;
use serde_json::Value;
use tracing::info;

use agentflow_config::Config;
use agentflow_workflow::{WorkflowEvent, WorkflowRegistry, WorkflowRunResult};

use crate::demos::{self, Demo};

/// Create a registry over the configured store and register every demo.
pub(crate) async fn open_registry(
    config: &Config,
) -> anyhow::Result<(Arc<WorkflowRegistry>, Vec<Demo>)> {
    let store = agentflow_history::open_store(&config.history)
        .await
        .context("Failed to open history store")?;
    let registry = WorkflowRegistry::new(config.registry.clone(), store);

    let demos = demos::all().await?;
    let demos = demos
        .into_iter()
        .map(|demo| Demo {
            workflow: registry.register_workflow(demo.workflow),
            sample_input: demo.sample_input,
        })
        .collect();
    Ok((registry, demos))
}

/// List the demo workflows.
pub(crate) async fn list_demos(config: &Config, format: &str) -> anyhow::Result<()> {
    let (registry, demos) = open_registry(config).await?;

    match format {
        "json" => {
            println!("{}", serde_json::to_string_pretty(&registry.list_workflows())?);
        }
        _ => {
            println!("{:<12} {:<16} {:<6} {}", "ID", "NAME", "STEPS", "PURPOSE");
            println!("{}", "-".repeat(80));
            for demo in &demos {
                let workflow = &demo.workflow;
                println!(
                    "{:<12} {:<16} {:<6} {}",
                    workflow.id(),
                    workflow.name(),
                    workflow.steps().len(),
                    workflow.purpose().unwrap_or("-")
                );
            }
        }
    }

    registry.shutdown().await;
    Ok(())
}

/// Run one demo, optionally printing its events.
pub(crate) async fn run_demo(
    config: &Config,
    demo_id: &str,
    input: Option<&str>,
    stream: bool,
) -> anyhow::Result<()> {
    let (registry, demos) = open_registry(config).await?;
    let Some(demo) = demos.iter().find(|demo| demo.workflow.id() == demo_id) else {
        let known: Vec<&str> = demos.iter().map(|demo| demo.workflow.id()).collect();
        bail!("Unknown demo '{}'. Available: {}", demo_id, known.join(", "));
    };

    let input: Value = match input {
        Some(raw) => serde_json::from_str(raw).context("Input is not valid JSON")?,
        None => demo.sample_input.clone(),
    };

    info!("Running demo workflow {}", demo_id);
    let outcome = if stream {
        let (mut events, result) = demo.workflow.stream(input).into_parts();
        while let Some(event) = events.next().await {
            print_event(&event)?;
        }
        result.await
    } else {
        demo.workflow.run(input).await
    };

    // Persist whatever the run recorded before reporting.
    registry.shutdown().await;

    let result = outcome.with_context(|| format!("Workflow {} failed", demo_id))?;
    print_result(&result)
}

fn print_event(event: &WorkflowEvent) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string(event)?);
    Ok(())
}

fn print_result(result: &WorkflowRunResult) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(result)?);
    Ok(())
}
