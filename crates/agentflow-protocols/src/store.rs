//! History storage contract.

use async_trait::async_trait;

use crate::error::HistoryError;
use crate::history::{
    StepStatus, WorkflowHistoryEntry, WorkflowStepHistoryEntry, WorkflowTimelineEvent,
};

/// Persistence backend for workflow execution history.
///
/// Every call may fail independently. The registry treats failures as
/// warnings; workflow control flow never depends on a store call succeeding.
#[async_trait]
pub trait HistoryStore: Send + Sync {
    /// Persist a new execution record.
    async fn create_execution(&self, entry: &WorkflowHistoryEntry) -> Result<(), HistoryError>;

    /// Replace the header fields of an existing execution.
    ///
    /// Recorded steps and events are kept.
    async fn update_execution(&self, entry: &WorkflowHistoryEntry) -> Result<(), HistoryError>;

    /// Get an execution, with its steps and events populated.
    async fn get_execution(&self, id: &str) -> Result<Option<WorkflowHistoryEntry>, HistoryError>;

    /// All executions of a workflow, oldest first.
    async fn get_executions_by_workflow(
        &self,
        workflow_id: &str,
    ) -> Result<Vec<WorkflowHistoryEntry>, HistoryError>;

    /// Record a step that started running.
    async fn record_step_start(&self, step: &WorkflowStepHistoryEntry) -> Result<(), HistoryError>;

    /// Record the outcome of the most recent run of `step_index`.
    async fn record_step_end(
        &self,
        execution_id: &str,
        step_index: usize,
        status: StepStatus,
        output: Option<serde_json::Value>,
        error: Option<String>,
    ) -> Result<(), HistoryError>;

    /// Append a lifecycle event.
    async fn record_timeline_event(
        &self,
        event: &WorkflowTimelineEvent,
    ) -> Result<(), HistoryError>;

    /// Delete an execution together with its steps and events.
    ///
    /// Returns whether anything was deleted.
    async fn delete_execution(&self, id: &str) -> Result<bool, HistoryError>;

    /// IDs of every workflow with at least one stored execution.
    async fn get_all_workflow_ids(&self) -> Result<Vec<String>, HistoryError>;
}
