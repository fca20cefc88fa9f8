//! Step model and execution dispatch.

#[cfg(test)]
#[path = "step_tests.rs"]
mod tests;

use std::fmt;
use std::future::Future;
use std::sync::Arc;

use agentflow_protocols::StructuredAgent;
use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info};
use uuid::Uuid;

use crate::context::StepContext;
use crate::error::WorkflowError;

/// Boxed step body.
pub type StepFn = Arc<
    dyn Fn(Value, StepContext) -> BoxFuture<'static, Result<Value, WorkflowError>> + Send + Sync,
>;

/// Builds the prompt of an agent step from the incoming data.
pub type PromptFn = Arc<dyn Fn(&Value, &StepContext) -> String + Send + Sync>;

/// Predicate over step data used by `and_when` and loops.
#[derive(Clone)]
pub struct Condition(Arc<dyn Fn(&Value) -> Result<bool, WorkflowError> + Send + Sync>);

impl Condition {
    /// Wrap a fallible predicate. An error aborts the step that evaluates it.
    pub fn new<F>(predicate: F) -> Self
    where
        F: Fn(&Value) -> Result<bool, WorkflowError> + Send + Sync + 'static,
    {
        Self(Arc::new(predicate))
    }

    /// Wrap an infallible predicate.
    pub fn from_fn<F>(predicate: F) -> Self
    where
        F: Fn(&Value) -> bool + Send + Sync + 'static,
    {
        Self(Arc::new(move |data| Ok(predicate(data))))
    }

    pub fn evaluate(&self, data: &Value) -> Result<bool, WorkflowError> {
        (self.0)(data)
    }
}

impl fmt::Debug for Condition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Condition")
    }
}

/// How a loop decides to run another iteration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum LoopMode {
    /// Repeat while the condition holds.
    DoWhile,
    /// Repeat until the condition holds.
    DoUntil,
}

impl LoopMode {
    pub fn should_continue(self, condition: bool) -> bool {
        match self {
            LoopMode::DoWhile => condition,
            LoopMode::DoUntil => !condition,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            LoopMode::DoWhile => "do-while",
            LoopMode::DoUntil => "do-until",
        }
    }
}

/// What a step does when executed.
#[derive(Clone)]
pub enum StepKind {
    /// Ask an agent for a structured object.
    Agent {
        agent: Arc<dyn StructuredAgent>,
        prompt: PromptFn,
        output_schema: Value,
    },
    /// Run a user function.
    Func { func: StepFn },
    /// Run `step` when `condition` holds, otherwise pass the input through.
    When { condition: Condition, step: Box<Step> },
    /// Run `step` when the input matches `pattern`, otherwise pass it through.
    With { pattern: Value, step: Box<Step> },
    /// Run every step concurrently on the same input.
    All { steps: Vec<Step> },
    /// Run every step concurrently; the first to settle wins.
    Race { steps: Vec<Step> },
    /// Run `steps` in order at least once, then repeat according to `mode`.
    Loop {
        steps: Vec<Step>,
        condition: Condition,
        mode: LoopMode,
    },
}

impl StepKind {
    pub fn type_name(&self) -> &'static str {
        match self {
            StepKind::Agent { .. } => "agent",
            StepKind::Func { .. } => "func",
            StepKind::When { .. } => "conditional-when",
            StepKind::With { .. } => "conditional-with",
            StepKind::All { .. } => "parallel-all",
            StepKind::Race { .. } => "parallel-race",
            StepKind::Loop {
                mode: LoopMode::DoWhile,
                ..
            } => "loop-do-while",
            StepKind::Loop {
                mode: LoopMode::DoUntil,
                ..
            } => "loop-do-until",
        }
    }
}

/// Unit of work in a workflow.
#[derive(Clone)]
pub struct Step {
    pub id: String,
    pub name: String,
    pub purpose: Option<String>,
    pub kind: StepKind,
}

impl fmt::Debug for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Step")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("type", &self.kind.type_name())
            .finish()
    }
}

/// Identity of a step as reported to hooks and events.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepInfo {
    pub index: usize,
    pub id: String,
    pub name: String,
    pub step_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub purpose: Option<String>,
}

impl Step {
    pub fn new(id: impl Into<String>, kind: StepKind) -> Self {
        let id = id.into();
        Self {
            name: id.clone(),
            id,
            purpose: None,
            kind,
        }
    }

    /// Step running an async function.
    pub fn func<F, Fut>(id: impl Into<String>, func: F) -> Self
    where
        F: Fn(Value, StepContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Value, WorkflowError>> + Send + 'static,
    {
        let func: StepFn = Arc::new(move |data, ctx| Box::pin(func(data, ctx)));
        Self::new(id, StepKind::Func { func })
    }

    /// Step running a synchronous transformation.
    pub fn map<F>(id: impl Into<String>, func: F) -> Self
    where
        F: Fn(Value) -> Result<Value, WorkflowError> + Send + Sync + 'static,
    {
        let func = Arc::new(func);
        Self::func(id, move |data, _ctx| {
            let func = Arc::clone(&func);
            async move { func(data) }
        })
    }

    /// Step asking `agent` for an object matching `output_schema`.
    pub fn agent<P>(
        id: impl Into<String>,
        agent: Arc<dyn StructuredAgent>,
        prompt: P,
        output_schema: Value,
    ) -> Self
    where
        P: Fn(&Value, &StepContext) -> String + Send + Sync + 'static,
    {
        Self::new(
            id,
            StepKind::Agent {
                agent,
                prompt: Arc::new(prompt),
                output_schema,
            },
        )
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn with_purpose(mut self, purpose: impl Into<String>) -> Self {
        self.purpose = Some(purpose.into());
        self
    }

    pub fn type_name(&self) -> &'static str {
        self.kind.type_name()
    }

    pub fn info(&self, index: usize) -> StepInfo {
        StepInfo {
            index,
            id: self.id.clone(),
            name: self.name.clone(),
            step_type: self.type_name().to_string(),
            purpose: self.purpose.clone(),
        }
    }

    /// Execute the step on `data`.
    ///
    /// Errors from user code are returned unchanged.
    pub fn execute<'a>(
        &'a self,
        data: Value,
        ctx: StepContext,
    ) -> BoxFuture<'a, Result<Value, WorkflowError>> {
        Box::pin(async move {
            match &self.kind {
                StepKind::Agent {
                    agent,
                    prompt,
                    output_schema,
                } => self.execute_agent(agent.as_ref(), prompt, output_schema, data, ctx).await,
                StepKind::Func { func } => func(data, ctx).await,
                StepKind::When { condition, step } => {
                    self.execute_when(condition, step, data, ctx).await
                }
                StepKind::With { pattern, step } => {
                    self.execute_with(pattern, step, data, ctx).await
                }
                StepKind::All { steps } => self.execute_all(steps, data, ctx).await,
                StepKind::Race { steps } => self.execute_race(steps, data, ctx).await,
                StepKind::Loop {
                    steps,
                    condition,
                    mode,
                } => self.execute_loop(steps, condition, *mode, data, ctx).await,
            }
        })
    }

    async fn execute_agent(
        &self,
        agent: &dyn StructuredAgent,
        prompt: &PromptFn,
        output_schema: &Value,
        data: Value,
        ctx: StepContext,
    ) -> Result<Value, WorkflowError> {
        let prompt = prompt(&data, &ctx);
        info!("Executing agent step: {} with agent '{}'", self.id, agent.id());

        let output = agent.generate_structured_output(&prompt, output_schema).await?;
        debug!("Agent step {} completed", self.id);
        Ok(output)
    }
}

/// Conversion into a [`Step`].
///
/// Implemented for steps and for async functions taking the step data and
/// context.
pub trait IntoStep {
    fn into_step(self) -> Step;
}

impl IntoStep for Step {
    fn into_step(self) -> Step {
        self
    }
}

impl<F, Fut> IntoStep for F
where
    F: Fn(Value, StepContext) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Value, WorkflowError>> + Send + 'static,
{
    fn into_step(self) -> Step {
        Step::func(Uuid::new_v4().to_string(), self).with_name("func")
    }
}

/// Conversion into an ordered list of steps.
pub trait IntoSteps {
    fn into_steps(self) -> Vec<Step>;
}

impl IntoSteps for Step {
    fn into_steps(self) -> Vec<Step> {
        vec![self]
    }
}

impl IntoSteps for Vec<Step> {
    fn into_steps(self) -> Vec<Step> {
        self
    }
}

impl<const N: usize> IntoSteps for [Step; N] {
    fn into_steps(self) -> Vec<Step> {
        self.into()
    }
}
