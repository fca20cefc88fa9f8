//! Lifecycle events emitted by a workflow run.

use agentflow_protocols::{WorkflowCheckpoint, WorkflowTimelineEvent};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::step::StepInfo;

/// Event yielded by `Workflow::stream` and persisted as a timeline event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum WorkflowEvent {
    WorkflowStart {
        execution_id: String,
        workflow_id: String,
        workflow_name: String,
        input: Value,
        /// Index of the first step to run; non-zero when resuming.
        start_index: usize,
        timestamp: DateTime<Utc>,
    },
    StepStart {
        execution_id: String,
        step: StepInfo,
        input: Value,
        timestamp: DateTime<Utc>,
    },
    StepComplete {
        execution_id: String,
        step: StepInfo,
        output: Value,
        duration_ms: u64,
        timestamp: DateTime<Utc>,
    },
    StepError {
        execution_id: String,
        step: StepInfo,
        error: String,
        duration_ms: u64,
        timestamp: DateTime<Utc>,
    },
    WorkflowComplete {
        execution_id: String,
        result: Value,
        duration_ms: u64,
        timestamp: DateTime<Utc>,
    },
    WorkflowError {
        execution_id: String,
        error: String,
        cancelled: bool,
        duration_ms: u64,
        timestamp: DateTime<Utc>,
    },
    WorkflowSuspended {
        execution_id: String,
        checkpoint: WorkflowCheckpoint,
        timestamp: DateTime<Utc>,
    },
}

impl WorkflowEvent {
    /// Wire name of the event, e.g. `step-complete`.
    pub fn name(&self) -> &'static str {
        match self {
            WorkflowEvent::WorkflowStart { .. } => "workflow-start",
            WorkflowEvent::StepStart { .. } => "step-start",
            WorkflowEvent::StepComplete { .. } => "step-complete",
            WorkflowEvent::StepError { .. } => "step-error",
            WorkflowEvent::WorkflowComplete { .. } => "workflow-complete",
            WorkflowEvent::WorkflowError { .. } => "workflow-error",
            WorkflowEvent::WorkflowSuspended { .. } => "workflow-suspended",
        }
    }

    pub fn execution_id(&self) -> &str {
        match self {
            WorkflowEvent::WorkflowStart { execution_id, .. }
            | WorkflowEvent::StepStart { execution_id, .. }
            | WorkflowEvent::StepComplete { execution_id, .. }
            | WorkflowEvent::StepError { execution_id, .. }
            | WorkflowEvent::WorkflowComplete { execution_id, .. }
            | WorkflowEvent::WorkflowError { execution_id, .. }
            | WorkflowEvent::WorkflowSuspended { execution_id, .. } => execution_id,
        }
    }

    /// Whether this is the last event of a run.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            WorkflowEvent::WorkflowComplete { .. }
                | WorkflowEvent::WorkflowError { .. }
                | WorkflowEvent::WorkflowSuspended { .. }
        )
    }

    /// Persisted form of the event.
    pub fn to_timeline_event(&self) -> WorkflowTimelineEvent {
        let name = self.name();
        match self {
            WorkflowEvent::WorkflowStart {
                execution_id,
                input,
                start_index,
                ..
            } => WorkflowTimelineEvent::new(execution_id, name, "workflow", "running")
                .with_input(input.clone())
                .with_step_index(*start_index),
            WorkflowEvent::StepStart {
                execution_id,
                step,
                input,
                ..
            } => WorkflowTimelineEvent::new(execution_id, name, "step", "running")
                .with_input(input.clone())
                .with_step_index(step.index)
                .with_metadata(step_metadata(step)),
            WorkflowEvent::StepComplete {
                execution_id,
                step,
                output,
                duration_ms,
                ..
            } => WorkflowTimelineEvent::new(execution_id, name, "step", "completed")
                .with_output(output.clone())
                .with_step_index(step.index)
                .with_metadata(with_duration(step_metadata(step), *duration_ms)),
            WorkflowEvent::StepError {
                execution_id,
                step,
                error,
                duration_ms,
                ..
            } => WorkflowTimelineEvent::new(execution_id, name, "step", "error")
                .with_error(error.clone())
                .with_step_index(step.index)
                .with_metadata(with_duration(step_metadata(step), *duration_ms)),
            WorkflowEvent::WorkflowComplete {
                execution_id,
                result,
                duration_ms,
                ..
            } => WorkflowTimelineEvent::new(execution_id, name, "workflow", "completed")
                .with_output(result.clone())
                .with_metadata(serde_json::json!({ "duration_ms": duration_ms })),
            WorkflowEvent::WorkflowError {
                execution_id,
                error,
                cancelled,
                duration_ms,
                ..
            } => {
                let status = if *cancelled { "cancelled" } else { "error" };
                WorkflowTimelineEvent::new(execution_id, name, "workflow", status)
                    .with_error(error.clone())
                    .with_metadata(serde_json::json!({ "duration_ms": duration_ms }))
            }
            WorkflowEvent::WorkflowSuspended {
                execution_id,
                checkpoint,
                ..
            } => WorkflowTimelineEvent::new(execution_id, name, "workflow", "suspended")
                .with_output(checkpoint.data.clone())
                .with_step_index(checkpoint.step_index)
                .with_metadata(serde_json::json!({ "reason": checkpoint.reason })),
        }
    }
}

fn step_metadata(step: &StepInfo) -> Value {
    serde_json::json!({
        "step_id": step.id,
        "step_name": step.name,
        "step_type": step.step_type,
    })
}

fn with_duration(mut metadata: Value, duration_ms: u64) -> Value {
    metadata["duration_ms"] = Value::from(duration_ms);
    metadata
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn info() -> StepInfo {
        StepInfo {
            index: 1,
            id: "fetch".to_string(),
            name: "Fetch".to_string(),
            step_type: "func".to_string(),
            purpose: None,
        }
    }

    #[test]
    fn test_event_tag_is_kebab_case() {
        let event = WorkflowEvent::StepComplete {
            execution_id: "exec-1".to_string(),
            step: info(),
            output: json!({"ok": true}),
            duration_ms: 12,
            timestamp: Utc::now(),
        };

        let value = serde_json::to_value(&event).unwrap();
        assert_eq!(value["type"], "step-complete");
        assert_eq!(value["step"]["id"], "fetch");
        assert_eq!(event.name(), "step-complete");
        assert_eq!(event.execution_id(), "exec-1");

        let restored: WorkflowEvent = serde_json::from_value(value).unwrap();
        assert_eq!(restored, event);
    }

    #[test]
    fn test_terminal_events() {
        let error = WorkflowEvent::WorkflowError {
            execution_id: "exec-1".to_string(),
            error: "boom".to_string(),
            cancelled: false,
            duration_ms: 0,
            timestamp: Utc::now(),
        };
        assert!(error.is_terminal());

        let start = WorkflowEvent::StepStart {
            execution_id: "exec-1".to_string(),
            step: info(),
            input: json!({}),
            timestamp: Utc::now(),
        };
        assert!(!start.is_terminal());
    }

    #[test]
    fn test_step_error_timeline_event() {
        let event = WorkflowEvent::StepError {
            execution_id: "exec-1".to_string(),
            step: info(),
            error: "timeout".to_string(),
            duration_ms: 40,
            timestamp: Utc::now(),
        };

        let timeline = event.to_timeline_event();
        assert_eq!(timeline.name, "step-error");
        assert_eq!(timeline.event_type, "step");
        assert_eq!(timeline.status, "error");
        assert_eq!(timeline.error.as_deref(), Some("timeout"));
        assert_eq!(timeline.step_index, Some(1));
        assert_eq!(timeline.metadata["duration_ms"], 40);
    }

    #[test]
    fn test_cancelled_workflow_timeline_status() {
        let event = WorkflowEvent::WorkflowError {
            execution_id: "exec-1".to_string(),
            error: "Workflow execution cancelled".to_string(),
            cancelled: true,
            duration_ms: 3,
            timestamp: Utc::now(),
        };
        assert_eq!(event.to_timeline_event().status, "cancelled");
    }
}
