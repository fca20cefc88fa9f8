//! Lifecycle state of a single workflow run.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::warn;

use crate::error::WorkflowError;

/// Status of a run as seen by the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkflowStatus {
    Pending,
    Running,
    Completed,
    Failed,
    Suspended,
}

impl WorkflowStatus {
    pub fn is_finished(&self) -> bool {
        matches!(
            self,
            WorkflowStatus::Completed | WorkflowStatus::Failed | WorkflowStatus::Suspended
        )
    }
}

/// Snapshot of a run.
#[derive(Debug, Clone, Serialize)]
pub struct WorkflowState {
    pub execution_id: String,
    pub active: bool,
    pub status: WorkflowStatus,
    pub start_at: DateTime<Utc>,
    pub end_at: Option<DateTime<Utc>>,
    /// Data flowing into the next step.
    pub data: Value,
    /// Output of the last finished step.
    pub result: Option<Value>,
    pub error: Option<String>,
}

/// Owns the [`WorkflowState`] of one run and applies its transitions.
///
/// `Pending -> Running -> {Completed | Failed | Suspended}`.
#[derive(Debug)]
pub struct WorkflowStateManager {
    state: WorkflowState,
}

impl WorkflowStateManager {
    pub fn new(execution_id: impl Into<String>) -> Self {
        Self {
            state: WorkflowState {
                execution_id: execution_id.into(),
                active: false,
                status: WorkflowStatus::Pending,
                start_at: Utc::now(),
                end_at: None,
                data: Value::Null,
                result: None,
                error: None,
            },
        }
    }

    pub fn state(&self) -> &WorkflowState {
        &self.state
    }

    pub fn into_state(self) -> WorkflowState {
        self.state
    }

    /// Move to `Running` with `input` as the current data.
    pub fn start(&mut self, input: Value) -> &WorkflowState {
        if self.state.status != WorkflowStatus::Pending {
            warn!(
                "Restarting execution {} from status {:?}",
                self.state.execution_id, self.state.status
            );
        }
        self.state.status = WorkflowStatus::Running;
        self.state.active = true;
        self.state.start_at = Utc::now();
        self.state.end_at = None;
        self.state.data = input;
        self.state.result = None;
        self.state.error = None;
        &self.state
    }

    /// Record the output of a finished step.
    pub fn update(&mut self, output: Value) -> &WorkflowState {
        self.state.data = output.clone();
        self.state.result = Some(output);
        &self.state
    }

    pub fn finish(&mut self) -> &WorkflowState {
        self.close(WorkflowStatus::Completed);
        &self.state
    }

    pub fn fail(&mut self, error: &WorkflowError) -> &WorkflowState {
        self.state.error = Some(error.to_string());
        self.close(WorkflowStatus::Failed);
        &self.state
    }

    pub fn suspend(&mut self) -> &WorkflowState {
        self.close(WorkflowStatus::Suspended);
        &self.state
    }

    fn close(&mut self, status: WorkflowStatus) {
        self.state.status = status;
        self.state.active = false;
        self.state.end_at = Some(Utc::now());
    }
}
