//! # agentflow workflow
//!
//! Composable multi-step workflows over JSON data.
//!
//! - **Steps**: agent calls, async functions, conditionals, pattern guards,
//!   parallel fan-out (all / race) and do-while / do-until loops
//! - **Engine**: sequential `run`, event-yielding `stream`, checkpoint `resume`
//! - **Registry**: catalogue of workflow definitions plus queued, non-blocking
//!   execution history
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                      WorkflowRegistry                        │
//! │   definitions (DashMap)      history queue ──► consumer task │
//! └───────────────▲──────────────────────────────────────┬───────┘
//!                 │ start / steps / events / end          │
//! ┌───────────────┴──────────────┐                        ▼
//! │  Workflow::run / stream      │              dyn HistoryStore
//! │   step 0 ─► step 1 ─► ...    │
//! └──────────────────────────────┘
//! ```
//!
//! ## Example
//!
//! ```ignore
//! let registry = WorkflowRegistry::with_store(Arc::new(MemoryHistoryStore::new()));
//! let workflow = registry.register_workflow(
//!     create_workflow(WorkflowConfig::new("greet", "Greeting"))
//!         .and_then(join(" john"))
//!         .and_then(join(" doe"))
//!         .build()?,
//! );
//! let result = workflow.run(json!({"name": "Who is"})).await?;
//! ```

pub mod combinators;
pub mod context;
mod engine;
pub mod error;
pub mod event;
pub mod hooks;
pub mod mock_agent;
pub mod pattern;
pub mod registry;
pub mod state;
pub mod step;
pub mod stream;
pub mod workflow;

mod step_composite;

// Re-export core types
pub use combinators::{and_all, and_do_until, and_do_while, and_race, and_then, and_when, and_with};
pub use context::{
    ExecutionProgress, StepContext, StepRecord, UserContext, WorkflowExecutionContext,
};
pub use error::WorkflowError;
pub use event::WorkflowEvent;
pub use hooks::WorkflowHooks;
pub use mock_agent::MockStructuredAgent;
pub use registry::{RegisteredWorkflow, WorkflowRegistry, WorkflowSummary};
pub use state::{WorkflowState, WorkflowStateManager, WorkflowStatus};
pub use step::{
    Condition, IntoStep, IntoSteps, LoopMode, PromptFn, Step, StepFn, StepInfo, StepKind,
};
pub use stream::{WorkflowEventStream, WorkflowResultHandle, WorkflowStream};
pub use workflow::{
    RunOptions, Workflow, WorkflowBuilder, WorkflowConfig, WorkflowRunResult, create_workflow,
};
