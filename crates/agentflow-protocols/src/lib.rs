//! # agentflow protocols
//!
//! Data model and collaborator contracts shared by the agentflow crates.
//!
//! The workflow engine never talks to a database or a model provider directly.
//! It depends on the traits defined here:
//!
//! - [`HistoryStore`]: persistence of executions, steps and timeline events
//! - [`StructuredAgent`]: the capability consumed by agent steps

pub mod agent;
pub mod error;
pub mod history;
pub mod store;

pub use agent::StructuredAgent;
pub use error::{AgentError, HistoryError};
pub use history::{
    ExecutionStatus, HistoryNotification, StepStatus, WorkflowCheckpoint, WorkflowHistoryEntry,
    WorkflowStepHistoryEntry, WorkflowTimelineEvent,
};
pub use store::HistoryStore;
