//! Workflow definition and builder.

#[cfg(test)]
#[path = "workflow_tests.rs"]
mod tests;

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Weak};

use agentflow_protocols::WorkflowCheckpoint;
use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;
use tokio_util::sync::CancellationToken;

use crate::combinators;
use crate::error::WorkflowError;
use crate::hooks::WorkflowHooks;
use crate::registry::WorkflowRegistry;
use crate::state::WorkflowStatus;
use crate::step::{Condition, IntoStep, IntoSteps, Step};

/// Static description of a workflow.
#[derive(Clone)]
pub struct WorkflowConfig {
    pub id: String,
    pub name: String,
    pub purpose: Option<String>,
    /// JSON Schema the input must satisfy.
    pub input_schema: Option<Value>,
    pub hooks: Option<Arc<dyn WorkflowHooks>>,
}

impl WorkflowConfig {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            purpose: None,
            input_schema: None,
            hooks: None,
        }
    }

    pub fn with_purpose(mut self, purpose: impl Into<String>) -> Self {
        self.purpose = Some(purpose.into());
        self
    }

    pub fn with_input_schema(mut self, schema: Value) -> Self {
        self.input_schema = Some(schema);
        self
    }

    pub fn with_hooks(mut self, hooks: Arc<dyn WorkflowHooks>) -> Self {
        self.hooks = Some(hooks);
        self
    }
}

impl fmt::Debug for WorkflowConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WorkflowConfig")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("purpose", &self.purpose)
            .field("has_input_schema", &self.input_schema.is_some())
            .field("has_hooks", &self.hooks.is_some())
            .finish()
    }
}

/// Start building a workflow.
///
/// ```ignore
/// let workflow = create_workflow(WorkflowConfig::new("greet", "Greeting"))
///     .and_then(Step::map("join-john", |data| Ok(join(data, " john"))))
///     .and_then(Step::map("join-doe", |data| Ok(join(data, " doe"))))
///     .build()?;
/// ```
pub fn create_workflow(config: WorkflowConfig) -> WorkflowBuilder {
    WorkflowBuilder::new(config)
}

/// Accumulates the ordered steps of a workflow.
///
/// Construction errors are kept and reported by [`WorkflowBuilder::build`].
pub struct WorkflowBuilder {
    config: WorkflowConfig,
    steps: Vec<Step>,
    error: Option<WorkflowError>,
}

impl WorkflowBuilder {
    pub fn new(config: WorkflowConfig) -> Self {
        Self {
            config,
            steps: Vec::new(),
            error: None,
        }
    }

    /// Append a step.
    pub fn step(mut self, step: Step) -> Self {
        self.steps.push(step);
        self
    }

    pub fn and_then(self, step: impl IntoStep) -> Self {
        self.step(combinators::and_then(step))
    }

    pub fn and_when(self, condition: Condition, step: impl IntoStep) -> Self {
        self.step(combinators::and_when(condition, step))
    }

    pub fn and_with(self, pattern: Value, step: impl IntoStep) -> Self {
        self.step(combinators::and_with(pattern, step))
    }

    pub fn and_all(self, steps: impl IntoSteps) -> Self {
        self.step(combinators::and_all(steps))
    }

    pub fn and_race(self, steps: impl IntoSteps) -> Self {
        self.try_step(combinators::and_race(steps))
    }

    pub fn and_do_while(self, steps: impl IntoSteps, condition: Condition) -> Self {
        self.try_step(combinators::and_do_while(steps, condition))
    }

    pub fn and_do_until(self, steps: impl IntoSteps, condition: Condition) -> Self {
        self.try_step(combinators::and_do_until(steps, condition))
    }

    fn try_step(mut self, step: Result<Step, WorkflowError>) -> Self {
        match step {
            Ok(step) => self.step(step),
            Err(e) => {
                self.error.get_or_insert(e);
                self
            }
        }
    }

    /// Finish the workflow.
    ///
    /// Fails with the first construction error, or if the input schema does
    /// not compile.
    pub fn build(self) -> Result<Workflow, WorkflowError> {
        if let Some(error) = self.error {
            return Err(error);
        }
        if self.config.id.trim().is_empty() {
            return Err(WorkflowError::InvalidWorkflow(
                "workflow id must not be empty".to_string(),
            ));
        }

        let validator = match &self.config.input_schema {
            Some(schema) => Some(jsonschema::validator_for(schema).map_err(|e| {
                WorkflowError::InvalidWorkflow(format!(
                    "input schema of workflow {} is invalid: {}",
                    self.config.id, e
                ))
            })?),
            None => None,
        };

        Ok(Workflow {
            inner: Arc::new(WorkflowInner {
                config: self.config,
                validator,
                steps: self.steps,
            }),
            registry: None,
        })
    }
}

pub(crate) struct WorkflowInner {
    pub(crate) config: WorkflowConfig,
    validator: Option<jsonschema::Validator>,
    pub(crate) steps: Vec<Step>,
}

/// A built workflow.
///
/// Cheap to clone. A workflow returned by
/// [`WorkflowRegistry::register_workflow`] records its runs in that registry.
#[derive(Clone)]
pub struct Workflow {
    pub(crate) inner: Arc<WorkflowInner>,
    pub(crate) registry: Option<Weak<WorkflowRegistry>>,
}

impl fmt::Debug for Workflow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Workflow")
            .field("id", &self.id())
            .field("name", &self.name())
            .field("steps", &self.inner.steps)
            .field("registered", &self.is_registered())
            .finish()
    }
}

impl Workflow {
    pub fn id(&self) -> &str {
        &self.inner.config.id
    }

    pub fn name(&self) -> &str {
        &self.inner.config.name
    }

    pub fn purpose(&self) -> Option<&str> {
        self.inner.config.purpose.as_deref()
    }

    pub fn input_schema(&self) -> Option<&Value> {
        self.inner.config.input_schema.as_ref()
    }

    pub fn steps(&self) -> &[Step] {
        &self.inner.steps
    }

    /// Whether the registry this workflow was registered with is still alive.
    pub fn is_registered(&self) -> bool {
        self.registry().is_some()
    }

    pub(crate) fn registry(&self) -> Option<Arc<WorkflowRegistry>> {
        self.registry.as_ref().and_then(Weak::upgrade)
    }

    pub(crate) fn hooks(&self) -> Option<&Arc<dyn WorkflowHooks>> {
        self.inner.config.hooks.as_ref()
    }

    /// Same definition, recording into `registry`.
    pub(crate) fn bind(&self, registry: Weak<WorkflowRegistry>) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
            registry: Some(registry),
        }
    }

    /// Check `input` against the input schema.
    pub fn validate_input(&self, input: &Value) -> Result<(), WorkflowError> {
        let Some(validator) = &self.inner.validator else {
            return Ok(());
        };
        let errors: Vec<String> = validator
            .iter_errors(input)
            .map(|e| {
                let path = e.instance_path.to_string();
                if path.is_empty() {
                    e.to_string()
                } else {
                    format!("{}: {}", path, e)
                }
            })
            .collect();
        if errors.is_empty() {
            Ok(())
        } else {
            Err(WorkflowError::InvalidInput(errors.join("; ")))
        }
    }
}

/// Per-run options.
#[derive(Debug, Clone, Default)]
pub struct RunOptions {
    /// Execution id to use instead of a generated one.
    pub execution_id: Option<String>,
    pub user_context: HashMap<String, Value>,
    /// Cancellation signal; a fresh token is used when absent.
    pub signal: Option<CancellationToken>,
}

impl RunOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_execution_id(mut self, execution_id: impl Into<String>) -> Self {
        self.execution_id = Some(execution_id.into());
        self
    }

    pub fn with_user_context(mut self, key: impl Into<String>, value: Value) -> Self {
        self.user_context.insert(key.into(), value);
        self
    }

    pub fn with_signal(mut self, signal: CancellationToken) -> Self {
        self.signal = Some(signal);
        self
    }
}

/// Outcome of a run that did not fail.
#[derive(Debug, Clone, Serialize)]
pub struct WorkflowRunResult {
    pub execution_id: String,
    pub workflow_id: String,
    pub start_at: DateTime<Utc>,
    pub end_at: DateTime<Utc>,
    /// `Completed`, or `Suspended` when a step suspended the run.
    pub status: WorkflowStatus,
    /// Output of the last step, or the data handed to the suspending step.
    pub result: Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub checkpoint: Option<WorkflowCheckpoint>,
}

impl WorkflowRunResult {
    pub fn is_suspended(&self) -> bool {
        self.status == WorkflowStatus::Suspended
    }
}
