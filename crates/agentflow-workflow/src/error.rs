//! Workflow error types.

use agentflow_protocols::{AgentError, HistoryError};
use thiserror::Error;

/// Errors raised while building or running a workflow.
///
/// A step's own error is propagated unchanged; the engine never wraps it.
#[derive(Debug, Error)]
pub enum WorkflowError {
    /// The workflow id is not present in the registry.
    #[error("Workflow not registered: {0}")]
    NotRegistered(String),

    /// The workflow or one of its steps was built with invalid arguments.
    #[error("Invalid workflow definition: {0}")]
    InvalidWorkflow(String),

    /// Input failed the workflow's input schema.
    #[error("Invalid workflow input: {0}")]
    InvalidInput(String),

    /// The run was cancelled through its signal.
    #[error("Workflow execution cancelled")]
    Cancelled,

    /// A step asked for the run to be suspended.
    #[error("Workflow suspended: {}", .reason.as_deref().unwrap_or("no reason given"))]
    Suspended { reason: Option<String> },

    /// An agent step failed.
    #[error("Agent step failed: {0}")]
    Agent(#[from] AgentError),

    /// A history call failed.
    #[error("History error: {0}")]
    History(#[from] HistoryError),

    /// Step author error.
    #[error("{0}")]
    Custom(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl WorkflowError {
    /// Create a step error from a message.
    pub fn custom(message: impl Into<String>) -> Self {
        WorkflowError::Custom(message.into())
    }

    /// Create a suspension request.
    pub fn suspended(reason: impl Into<String>) -> Self {
        WorkflowError::Suspended {
            reason: Some(reason.into()),
        }
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, WorkflowError::Cancelled)
    }

    pub fn is_suspended(&self) -> bool {
        matches!(self, WorkflowError::Suspended { .. })
    }

    /// Whether the error was raised before any step ran.
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            WorkflowError::InvalidWorkflow(_) | WorkflowError::InvalidInput(_)
        )
    }
}
