//! Lifecycle hooks.

use async_trait::async_trait;

use crate::state::WorkflowState;
use crate::step::StepInfo;

/// Callbacks invoked around a workflow run.
///
/// Every method defaults to a no-op. `on_step_end` only fires for steps that
/// succeed; `on_end` fires once per run whatever the outcome.
#[async_trait]
pub trait WorkflowHooks: Send + Sync {
    async fn on_start(&self, _state: &WorkflowState) {}

    async fn on_step_start(&self, _step: &StepInfo, _state: &WorkflowState) {}

    async fn on_step_end(&self, _step: &StepInfo, _state: &WorkflowState) {}

    async fn on_end(&self, _state: &WorkflowState) {}
}
