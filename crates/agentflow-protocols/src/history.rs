//! Persisted records of workflow executions.

#[cfg(test)]
#[path = "history_tests.rs"]
mod tests;

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Status of one workflow execution.
///
/// An execution starts `Running` and moves to exactly one terminal status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionStatus {
    Running,
    Completed,
    Error,
    Cancelled,
    Suspended,
}

impl ExecutionStatus {
    /// Whether no further transition is expected.
    ///
    /// `Suspended` counts as terminal for the current run; a resume starts
    /// a new run under the same execution id.
    pub fn is_terminal(&self) -> bool {
        !matches!(self, ExecutionStatus::Running)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ExecutionStatus::Running => "running",
            ExecutionStatus::Completed => "completed",
            ExecutionStatus::Error => "error",
            ExecutionStatus::Cancelled => "cancelled",
            ExecutionStatus::Suspended => "suspended",
        }
    }
}

impl std::fmt::Display for ExecutionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Status of one step inside an execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepStatus {
    Running,
    Completed,
    Error,
    /// The step asked for the execution to be suspended.
    Suspended,
}

/// Serialized snapshot of a suspended execution.
///
/// Stored verbatim and handed back unchanged on resume.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowCheckpoint {
    /// Execution being suspended.
    pub execution_id: String,
    /// Workflow the execution belongs to.
    pub workflow_id: String,
    /// Index of the step to run on resume.
    pub step_index: usize,
    /// Data accumulated before that step.
    pub data: serde_json::Value,
    /// Why the execution was suspended.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    /// When the suspension happened.
    pub suspended_at: DateTime<Utc>,
}

/// Persisted record of one step run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowStepHistoryEntry {
    pub id: String,
    pub execution_id: String,
    pub step_index: usize,
    pub step_id: String,
    pub step_name: String,
    pub step_type: String,
    pub status: StepStatus,
    pub input: serde_json::Value,
    #[serde(default)]
    pub output: Option<serde_json::Value>,
    #[serde(default)]
    pub error: Option<String>,
    pub start_time: DateTime<Utc>,
    #[serde(default)]
    pub end_time: Option<DateTime<Utc>>,
}

impl WorkflowStepHistoryEntry {
    /// Create a running step record.
    pub fn started(
        execution_id: impl Into<String>,
        step_index: usize,
        step_id: impl Into<String>,
        step_name: impl Into<String>,
        step_type: impl Into<String>,
        input: serde_json::Value,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            execution_id: execution_id.into(),
            step_index,
            step_id: step_id.into(),
            step_name: step_name.into(),
            step_type: step_type.into(),
            status: StepStatus::Running,
            input,
            output: None,
            error: None,
            start_time: Utc::now(),
            end_time: None,
        }
    }

    /// Mark the step finished.
    pub fn finish(
        &mut self,
        status: StepStatus,
        output: Option<serde_json::Value>,
        error: Option<String>,
    ) {
        self.status = status;
        self.output = output;
        self.error = error;
        self.end_time = Some(Utc::now());
    }
}

/// Persisted lifecycle event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowTimelineEvent {
    pub id: String,
    pub execution_id: String,
    /// Event name, e.g. `workflow-start`.
    pub name: String,
    /// Coarse category: `workflow` or `step`.
    pub event_type: String,
    pub status: String,
    #[serde(default)]
    pub input: Option<serde_json::Value>,
    #[serde(default)]
    pub output: Option<serde_json::Value>,
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default)]
    pub step_index: Option<usize>,
    pub occurred_at: DateTime<Utc>,
    #[serde(default)]
    pub metadata: serde_json::Value,
}

impl WorkflowTimelineEvent {
    pub fn new(
        execution_id: impl Into<String>,
        name: impl Into<String>,
        event_type: impl Into<String>,
        status: impl Into<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            execution_id: execution_id.into(),
            name: name.into(),
            event_type: event_type.into(),
            status: status.into(),
            input: None,
            output: None,
            error: None,
            step_index: None,
            occurred_at: Utc::now(),
            metadata: serde_json::Value::Null,
        }
    }

    pub fn with_input(mut self, input: serde_json::Value) -> Self {
        self.input = Some(input);
        self
    }

    pub fn with_output(mut self, output: serde_json::Value) -> Self {
        self.output = Some(output);
        self
    }

    pub fn with_error(mut self, error: impl Into<String>) -> Self {
        self.error = Some(error.into());
        self
    }

    pub fn with_step_index(mut self, index: usize) -> Self {
        self.step_index = Some(index);
        self
    }

    pub fn with_metadata(mut self, metadata: serde_json::Value) -> Self {
        self.metadata = metadata;
        self
    }
}

/// Persisted record of one workflow execution.
///
/// `steps` and `events` are populated by the store on read; writers only
/// touch the header fields through `create_execution`/`update_execution`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowHistoryEntry {
    pub id: String,
    pub workflow_id: String,
    pub workflow_name: String,
    pub status: ExecutionStatus,
    pub input: serde_json::Value,
    #[serde(default)]
    pub output: Option<serde_json::Value>,
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default)]
    pub user_context: HashMap<String, serde_json::Value>,
    pub start_time: DateTime<Utc>,
    #[serde(default)]
    pub end_time: Option<DateTime<Utc>>,
    #[serde(default)]
    pub checkpoint: Option<WorkflowCheckpoint>,
    #[serde(default)]
    pub steps: Vec<WorkflowStepHistoryEntry>,
    #[serde(default)]
    pub events: Vec<WorkflowTimelineEvent>,
    #[serde(default)]
    pub metadata: serde_json::Value,
}

impl WorkflowHistoryEntry {
    /// Create a running execution record with a fresh id.
    pub fn new(
        workflow_id: impl Into<String>,
        workflow_name: impl Into<String>,
        input: serde_json::Value,
    ) -> Self {
        Self::with_id(Uuid::new_v4().to_string(), workflow_id, workflow_name, input)
    }

    /// Create a running execution record with a caller-chosen id.
    pub fn with_id(
        id: impl Into<String>,
        workflow_id: impl Into<String>,
        workflow_name: impl Into<String>,
        input: serde_json::Value,
    ) -> Self {
        Self {
            id: id.into(),
            workflow_id: workflow_id.into(),
            workflow_name: workflow_name.into(),
            status: ExecutionStatus::Running,
            input,
            output: None,
            error: None,
            user_context: HashMap::new(),
            start_time: Utc::now(),
            end_time: None,
            checkpoint: None,
            steps: Vec::new(),
            events: Vec::new(),
            metadata: serde_json::Value::Null,
        }
    }

    pub fn with_user_context(mut self, user_context: HashMap<String, serde_json::Value>) -> Self {
        self.user_context = user_context;
        self
    }

    /// Move to a terminal status.
    pub fn complete(
        &mut self,
        status: ExecutionStatus,
        output: Option<serde_json::Value>,
        error: Option<String>,
    ) {
        self.status = status;
        self.output = output;
        self.error = error;
        self.end_time = Some(Utc::now());
    }

    /// Mark suspended, keeping the checkpoint for a later resume.
    pub fn suspend(&mut self, checkpoint: WorkflowCheckpoint) {
        self.status = ExecutionStatus::Suspended;
        self.end_time = Some(checkpoint.suspended_at);
        self.checkpoint = Some(checkpoint);
    }

    /// Copy header fields from `other`, keeping this entry's steps and events.
    pub fn merge_header(&mut self, other: &WorkflowHistoryEntry) {
        self.workflow_id = other.workflow_id.clone();
        self.workflow_name = other.workflow_name.clone();
        self.status = other.status;
        self.input = other.input.clone();
        self.output = other.output.clone();
        self.error = other.error.clone();
        self.user_context = other.user_context.clone();
        self.start_time = other.start_time;
        self.end_time = other.end_time;
        self.checkpoint = other.checkpoint.clone();
        self.metadata = other.metadata.clone();
    }
}

/// Notification pushed to history subscribers.
#[derive(Debug, Clone)]
pub enum HistoryNotification {
    /// A new execution record was persisted.
    HistoryCreated(WorkflowHistoryEntry),
    /// An execution record, or one of its steps or events, changed.
    HistoryUpdated(WorkflowHistoryEntry),
}

impl HistoryNotification {
    pub fn entry(&self) -> &WorkflowHistoryEntry {
        match self {
            HistoryNotification::HistoryCreated(entry)
            | HistoryNotification::HistoryUpdated(entry) => entry,
        }
    }
}
