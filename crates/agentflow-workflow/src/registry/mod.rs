//! Workflow registry.
//!
//! The catalogue of workflow definitions and their execution history. One
//! registry is created explicitly and shared by whatever needs it; there is
//! no global instance.
//!
//! The start of a run is written directly and awaited. Every later history
//! write is queued and applied by a background task; a slow or failing store
//! never blocks or fails a workflow.

#[cfg(test)]
#[path = "registry_tests.rs"]
mod tests;

mod manager;
mod queue;

use std::collections::HashMap;
use std::sync::{Arc, Weak};

use agentflow_config::RegistryConfig;
use agentflow_protocols::{
    ExecutionStatus, HistoryNotification, HistoryStore, StepStatus, WorkflowCheckpoint,
    WorkflowHistoryEntry, WorkflowStepHistoryEntry, WorkflowTimelineEvent,
};
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::Serialize;
use serde_json::Value;
use tokio::sync::broadcast;
use tracing::{debug, info};

use crate::error::WorkflowError;
use crate::workflow::{RunOptions, Workflow, WorkflowRunResult};

use manager::HistoryManager;
use queue::HistoryCommand;

/// A workflow definition held by the registry.
#[derive(Debug, Clone)]
pub struct RegisteredWorkflow {
    pub workflow: Workflow,
    pub registered_at: DateTime<Utc>,
    /// Finished runs since registration, whatever their outcome.
    pub execution_count: u64,
    pub last_executed_at: Option<DateTime<Utc>>,
}

/// Listing view of a registered workflow.
#[derive(Debug, Clone, Serialize)]
pub struct WorkflowSummary {
    pub id: String,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub purpose: Option<String>,
    pub step_count: usize,
    pub has_input_schema: bool,
    pub registered_at: DateTime<Utc>,
    pub execution_count: u64,
    pub last_executed_at: Option<DateTime<Utc>>,
}

impl From<&RegisteredWorkflow> for WorkflowSummary {
    fn from(registered: &RegisteredWorkflow) -> Self {
        let workflow = &registered.workflow;
        Self {
            id: workflow.id().to_string(),
            name: workflow.name().to_string(),
            purpose: workflow.purpose().map(str::to_string),
            step_count: workflow.steps().len(),
            has_input_schema: workflow.input_schema().is_some(),
            registered_at: registered.registered_at,
            execution_count: registered.execution_count,
            last_executed_at: registered.last_executed_at,
        }
    }
}

/// Catalogue of workflow definitions and their run history.
pub struct WorkflowRegistry {
    workflows: DashMap<String, RegisteredWorkflow>,
    history: HistoryManager,
    self_ref: Weak<WorkflowRegistry>,
}

impl WorkflowRegistry {
    /// Create a registry persisting history into `store`.
    ///
    /// Must be called inside a Tokio runtime: the history consumer task is
    /// spawned here.
    pub fn new(config: RegistryConfig, store: Arc<dyn HistoryStore>) -> Arc<Self> {
        let history = HistoryManager::spawn(store, &config);
        Arc::new_cyclic(|self_ref| Self {
            workflows: DashMap::new(),
            history,
            self_ref: self_ref.clone(),
        })
    }

    /// Create a registry with the default configuration.
    pub fn with_store(store: Arc<dyn HistoryStore>) -> Arc<Self> {
        Self::new(RegistryConfig::default(), store)
    }

    // ---------------------------------------------------------------------
    // Workflow definitions
    // ---------------------------------------------------------------------

    /// Register `workflow`, replacing any workflow with the same id.
    ///
    /// Returns a handle whose runs are recorded in this registry.
    pub fn register_workflow(&self, workflow: Workflow) -> Workflow {
        let bound = workflow.bind(self.self_ref.clone());
        let id = bound.id().to_string();
        let registered = RegisteredWorkflow {
            workflow: bound.clone(),
            registered_at: Utc::now(),
            execution_count: 0,
            last_executed_at: None,
        };

        if self.workflows.insert(id.clone(), registered).is_some() {
            info!("Replaced registered workflow: {}", id);
        } else {
            info!("Registered workflow: {}", id);
        }
        bound
    }

    /// Remove a workflow definition. Its history is kept.
    pub fn unregister_workflow(&self, workflow_id: &str) -> bool {
        let removed = self.workflows.remove(workflow_id).is_some();
        if removed {
            info!("Unregistered workflow: {}", workflow_id);
        }
        removed
    }

    pub fn get_workflow(&self, workflow_id: &str) -> Option<Workflow> {
        self.workflows
            .get(workflow_id)
            .map(|registered| registered.workflow.clone())
    }

    /// Registration record including run bookkeeping.
    pub fn get_registered(&self, workflow_id: &str) -> Option<RegisteredWorkflow> {
        self.workflows
            .get(workflow_id)
            .map(|registered| registered.clone())
    }

    /// Summaries of every registered workflow, sorted by id.
    pub fn list_workflows(&self) -> Vec<WorkflowSummary> {
        let mut summaries: Vec<WorkflowSummary> = self
            .workflows
            .iter()
            .map(|registered| WorkflowSummary::from(registered.value()))
            .collect();
        summaries.sort_by(|a, b| a.id.cmp(&b.id));
        summaries
    }

    pub fn contains(&self, workflow_id: &str) -> bool {
        self.workflows.contains_key(workflow_id)
    }

    pub fn len(&self) -> usize {
        self.workflows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.workflows.is_empty()
    }

    /// Run a registered workflow by id.
    pub async fn run_workflow(
        &self,
        workflow_id: &str,
        input: Value,
    ) -> Result<WorkflowRunResult, WorkflowError> {
        let workflow = self
            .get_workflow(workflow_id)
            .ok_or_else(|| WorkflowError::NotRegistered(workflow_id.to_string()))?;
        workflow.run(input).await
    }

    /// Forget every workflow definition. Stored history is untouched.
    pub fn clear_all(&self) {
        self.workflows.clear();
        debug!("Cleared all registered workflows");
    }

    /// Forget every workflow definition and delete all stored executions.
    pub async fn clear_all_async(&self) -> Result<(), WorkflowError> {
        self.history.flush().await;

        let store = self.history.store();
        for workflow_id in store.get_all_workflow_ids().await? {
            for entry in store.get_executions_by_workflow(&workflow_id).await? {
                store.delete_execution(&entry.id).await?;
            }
        }

        self.clear_all();
        info!("Cleared all workflows and execution history");
        Ok(())
    }

    // ---------------------------------------------------------------------
    // Execution history
    // ---------------------------------------------------------------------

    /// Persist the start of a run.
    ///
    /// Fails if the workflow is not registered. The returned entry's id is the
    /// execution id for the rest of the run. When `execution_id` names an
    /// existing execution of the same workflow, that record is reopened.
    pub async fn record_workflow_execution_start(
        &self,
        workflow_id: &str,
        workflow_name: &str,
        input: Value,
        execution_id: Option<String>,
        user_context: HashMap<String, Value>,
    ) -> Result<WorkflowHistoryEntry, WorkflowError> {
        if !self.contains(workflow_id) {
            return Err(WorkflowError::NotRegistered(workflow_id.to_string()));
        }

        let reuse = execution_id.is_some();
        let entry = match execution_id {
            Some(id) => WorkflowHistoryEntry::with_id(id, workflow_id, workflow_name, input),
            None => WorkflowHistoryEntry::new(workflow_id, workflow_name, input),
        }
        .with_user_context(user_context);

        let entry = self.history.start_execution(entry, reuse).await?;
        debug!("Recorded start of execution {} for {}", entry.id, workflow_id);
        Ok(entry)
    }

    /// Queue the terminal status of a run.
    pub fn record_workflow_execution_end(
        &self,
        execution_id: &str,
        status: ExecutionStatus,
        output: Option<Value>,
        error: Option<String>,
    ) {
        self.history.enqueue(HistoryCommand::End {
            execution_id: execution_id.to_string(),
            status,
            output,
            error,
        });
    }

    /// Queue the suspension of a run together with its checkpoint.
    pub fn record_workflow_suspension(&self, execution_id: &str, checkpoint: WorkflowCheckpoint) {
        self.history.enqueue(HistoryCommand::Suspend {
            execution_id: execution_id.to_string(),
            checkpoint,
        });
    }

    pub fn record_workflow_step_start(&self, step: WorkflowStepHistoryEntry) {
        self.history.enqueue(HistoryCommand::StepStart(step));
    }

    pub fn record_workflow_step_end(
        &self,
        execution_id: &str,
        step_index: usize,
        status: StepStatus,
        output: Option<Value>,
        error: Option<String>,
    ) {
        self.history.enqueue(HistoryCommand::StepEnd {
            execution_id: execution_id.to_string(),
            step_index,
            status,
            output,
            error,
        });
    }

    pub fn record_timeline_event(&self, event: WorkflowTimelineEvent) {
        self.history.enqueue(HistoryCommand::Timeline(event));
    }

    /// Bump the run bookkeeping of a workflow.
    pub(crate) fn note_execution_finished(&self, workflow_id: &str) {
        if let Some(mut registered) = self.workflows.get_mut(workflow_id) {
            registered.execution_count += 1;
            registered.last_executed_at = Some(Utc::now());
        }
    }

    /// Receive a notification whenever a stored execution changes.
    pub fn subscribe(&self) -> broadcast::Receiver<HistoryNotification> {
        self.history.subscribe()
    }

    /// Wait until every history write queued so far has been applied.
    pub async fn flush(&self) {
        self.history.flush().await;
    }

    /// Flush pending history and stop the history consumer.
    pub async fn shutdown(&self) {
        self.history.shutdown().await;
        info!("Workflow registry shut down");
    }

    /// History writes waiting to be applied.
    pub fn pending_history(&self) -> usize {
        self.history.pending()
    }

    /// History writes discarded because the queue was full.
    pub fn dropped_history(&self) -> u64 {
        self.history.dropped()
    }

    // ---------------------------------------------------------------------
    // History queries
    // ---------------------------------------------------------------------

    pub async fn get_execution(
        &self,
        execution_id: &str,
    ) -> Result<Option<WorkflowHistoryEntry>, WorkflowError> {
        Ok(self.history.store().get_execution(execution_id).await?)
    }

    pub async fn get_workflow_executions(
        &self,
        workflow_id: &str,
    ) -> Result<Vec<WorkflowHistoryEntry>, WorkflowError> {
        Ok(self
            .history
            .store()
            .get_executions_by_workflow(workflow_id)
            .await?)
    }

    pub async fn get_all_workflow_ids(&self) -> Result<Vec<String>, WorkflowError> {
        Ok(self.history.store().get_all_workflow_ids().await?)
    }

    pub async fn delete_execution(&self, execution_id: &str) -> Result<bool, WorkflowError> {
        Ok(self.history.store().delete_execution(execution_id).await?)
    }

    /// Checkpoint of a suspended execution.
    pub async fn get_checkpoint(
        &self,
        execution_id: &str,
    ) -> Result<Option<WorkflowCheckpoint>, WorkflowError> {
        Ok(self
            .get_execution(execution_id)
            .await?
            .and_then(|entry| entry.checkpoint))
    }

    /// Resume a suspended execution from its stored checkpoint.
    pub async fn resume_execution(
        &self,
        execution_id: &str,
    ) -> Result<WorkflowRunResult, WorkflowError> {
        self.flush().await;
        let checkpoint = self.get_checkpoint(execution_id).await?.ok_or_else(|| {
            WorkflowError::InvalidWorkflow(format!(
                "execution {} has no checkpoint to resume from",
                execution_id
            ))
        })?;
        let workflow = self
            .get_workflow(&checkpoint.workflow_id)
            .ok_or_else(|| WorkflowError::NotRegistered(checkpoint.workflow_id.clone()))?;
        workflow
            .resume(checkpoint, RunOptions::default())
            .await
    }
}
