//! Execution context threaded through a workflow run.
//!
//! [`WorkflowExecutionContext`] is owned by the engine for the length of a
//! run. Each step receives a [`StepContext`] derived from it. Progress is
//! tracked with immutable [`ExecutionProgress`] snapshots: every transition
//! produces a new value rather than mutating shared state.

#[cfg(test)]
#[path = "context_tests.rs"]
mod tests;

use std::collections::HashMap;
use std::sync::Arc;

use agentflow_protocols::{StepStatus, WorkflowHistoryEntry};
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::Serialize;
use serde_json::Value;
use tokio_util::sync::CancellationToken;

use crate::error::WorkflowError;

/// Caller-supplied key/value map shared by every step of a run.
///
/// Clones share the same map.
#[derive(Debug, Clone, Default)]
pub struct UserContext {
    values: Arc<RwLock<HashMap<String, Value>>>,
}

impl UserContext {
    pub fn new(values: HashMap<String, Value>) -> Self {
        Self {
            values: Arc::new(RwLock::new(values)),
        }
    }

    pub fn get(&self, key: &str) -> Option<Value> {
        self.values.read().get(key).cloned()
    }

    pub fn set(&self, key: impl Into<String>, value: Value) {
        self.values.write().insert(key.into(), value);
    }

    pub fn remove(&self, key: &str) -> Option<Value> {
        self.values.write().remove(key)
    }

    /// Copy of the current contents.
    pub fn snapshot(&self) -> HashMap<String, Value> {
        self.values.read().clone()
    }
}

/// Context handed to every step invocation.
#[derive(Debug, Clone)]
pub struct StepContext {
    pub execution_id: String,
    pub workflow_id: String,
    pub workflow_name: String,
    /// Index of the top-level step being executed.
    pub step_index: usize,
    pub user_context: UserContext,
    /// Cancellation signal of the run.
    pub signal: CancellationToken,
    /// Span of the enclosing workflow run. `None` inside loop bodies.
    pub workflow_span: Option<tracing::Span>,
}

impl StepContext {
    /// Context for running a step outside of a workflow.
    pub fn new(
        execution_id: impl Into<String>,
        workflow_id: impl Into<String>,
        workflow_name: impl Into<String>,
    ) -> Self {
        Self {
            execution_id: execution_id.into(),
            workflow_id: workflow_id.into(),
            workflow_name: workflow_name.into(),
            step_index: 0,
            user_context: UserContext::default(),
            signal: CancellationToken::new(),
            workflow_span: None,
        }
    }

    pub fn with_signal(mut self, signal: CancellationToken) -> Self {
        self.signal = signal;
        self
    }

    pub fn with_user_context(mut self, user_context: UserContext) -> Self {
        self.user_context = user_context;
        self
    }

    pub fn is_cancelled(&self) -> bool {
        self.signal.is_cancelled()
    }

    /// Return `Cancelled` if the run's signal has fired.
    pub fn check_cancelled(&self) -> Result<(), WorkflowError> {
        if self.signal.is_cancelled() {
            Err(WorkflowError::Cancelled)
        } else {
            Ok(())
        }
    }

    /// Build the error a step returns to suspend the run.
    ///
    /// ```ignore
    /// return Err(ctx.suspend("waiting for approval"));
    /// ```
    pub fn suspend(&self, reason: impl Into<String>) -> WorkflowError {
        WorkflowError::suspended(reason)
    }

    /// Context for a step nested in a loop body.
    pub(crate) fn detached_from_span(&self) -> Self {
        Self {
            workflow_span: None,
            ..self.clone()
        }
    }
}

/// Outcome of one finished top-level step.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StepRecord {
    pub index: usize,
    pub step_id: String,
    pub step_name: String,
    pub status: StepStatus,
    pub duration_ms: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Immutable snapshot of how far a run has progressed.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ExecutionProgress {
    /// Index of the step currently running, or about to run.
    pub current_step_index: usize,
    /// Finished steps, in execution order.
    pub steps: Vec<StepRecord>,
}

impl ExecutionProgress {
    /// Snapshot for a run that starts at `index`.
    pub fn starting_at(index: usize) -> Self {
        Self {
            current_step_index: index,
            steps: Vec::new(),
        }
    }

    /// Snapshot with `index` as the running step.
    pub fn begin(&self, index: usize) -> Self {
        Self {
            current_step_index: index,
            steps: self.steps.clone(),
        }
    }

    /// Snapshot with `record` appended.
    pub fn advance(&self, record: StepRecord) -> Self {
        let mut steps = self.steps.clone();
        steps.push(record);
        Self {
            current_step_index: self.current_step_index,
            steps,
        }
    }

    pub fn completed_steps(&self) -> usize {
        self.steps
            .iter()
            .filter(|record| record.status == StepStatus::Completed)
            .count()
    }

    pub fn last(&self) -> Option<&StepRecord> {
        self.steps.last()
    }
}

/// Per-run context owned by the engine.
#[derive(Debug, Clone)]
pub struct WorkflowExecutionContext {
    pub workflow_id: String,
    pub workflow_name: String,
    pub execution_id: String,
    pub user_context: UserContext,
    pub signal: CancellationToken,
    pub start_time: DateTime<Utc>,
    pub is_active: bool,
    /// Execution record created in the registry, when there is one.
    pub history_entry: Option<WorkflowHistoryEntry>,
    pub progress: ExecutionProgress,
}

impl WorkflowExecutionContext {
    pub fn new(
        workflow_id: impl Into<String>,
        workflow_name: impl Into<String>,
        execution_id: impl Into<String>,
        user_context: UserContext,
        signal: CancellationToken,
    ) -> Self {
        Self {
            workflow_id: workflow_id.into(),
            workflow_name: workflow_name.into(),
            execution_id: execution_id.into(),
            user_context,
            signal,
            start_time: Utc::now(),
            is_active: true,
            history_entry: None,
            progress: ExecutionProgress::default(),
        }
    }

    pub fn with_history_entry(mut self, entry: Option<WorkflowHistoryEntry>) -> Self {
        self.history_entry = entry;
        self
    }

    pub fn with_progress(mut self, progress: ExecutionProgress) -> Self {
        self.progress = progress;
        self
    }

    /// Context for the top-level step at `index`.
    pub fn step_context(&self, index: usize, span: Option<tracing::Span>) -> StepContext {
        StepContext {
            execution_id: self.execution_id.clone(),
            workflow_id: self.workflow_id.clone(),
            workflow_name: self.workflow_name.clone(),
            step_index: index,
            user_context: self.user_context.clone(),
            signal: self.signal.clone(),
            workflow_span: span,
        }
    }

    pub fn deactivate(&mut self) {
        self.is_active = false;
    }
}
