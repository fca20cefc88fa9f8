//! History subcommand handler for agentflow.

use anyhow::Context;

use agentflow_config::{Config, HistoryBackend};
use agentflow_protocols::WorkflowHistoryEntry;

use crate::cmd_workflow::open_registry;

/// Print stored executions, newest last.
pub(crate) async fn show_history(config: &Config, workflow: Option<&str>) -> anyhow::Result<()> {
    if config.history.backend == HistoryBackend::Memory {
        println!("History backend is 'memory'; nothing survives between invocations.");
        println!("Set history.backend = \"file\" to keep execution history.");
        return Ok(());
    }

    let (registry, _demos) = open_registry(config).await?;
    let workflow_ids = match workflow {
        Some(id) => vec![id.to_string()],
        None => registry
            .get_all_workflow_ids()
            .await
            .context("Failed to list workflows")?,
    };

    let mut entries: Vec<WorkflowHistoryEntry> = Vec::new();
    for workflow_id in &workflow_ids {
        entries.extend(
            registry
                .get_workflow_executions(workflow_id)
                .await
                .with_context(|| format!("Failed to load executions of {}", workflow_id))?,
        );
    }
    entries.sort_by_key(|entry| entry.start_time);

    if entries.is_empty() {
        println!("No executions found.");
    } else {
        println!(
            "{:<38} {:<12} {:<10} {:<6} {}",
            "EXECUTION", "WORKFLOW", "STATUS", "STEPS", "STARTED"
        );
        println!("{}", "-".repeat(100));
        for entry in &entries {
            println!(
                "{:<38} {:<12} {:<10} {:<6} {}",
                entry.id,
                entry.workflow_id,
                entry.status.as_str(),
                entry.steps.len(),
                entry.start_time.format("%Y-%m-%d %H:%M:%S")
            );
            if let Some(error) = &entry.error {
                println!("  error: {}", error);
            }
        }
    }

    registry.shutdown().await;
    Ok(())
}
