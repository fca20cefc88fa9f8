//! Step combinators.
//!
//! Each combinator returns an ordinary [`Step`], so combinators nest freely:
//!
//! ```ignore
//! let step = and_when(
//!     Condition::from_fn(|data| data["needs_review"] == true),
//!     and_all(vec![summarize, classify]),
//! );
//! ```

#[cfg(test)]
#[path = "combinators_tests.rs"]
mod tests;

use serde_json::Value;
use uuid::Uuid;

use crate::error::WorkflowError;
use crate::step::{Condition, IntoStep, IntoSteps, LoopMode, Step, StepKind};

fn generated_id(prefix: &str) -> String {
    format!("{}-{}", prefix, Uuid::new_v4())
}

/// Use `step` as the next step unchanged.
pub fn and_then(step: impl IntoStep) -> Step {
    step.into_step()
}

/// Run `step` only when `condition` holds; otherwise pass the data through.
pub fn and_when(condition: Condition, step: impl IntoStep) -> Step {
    let inner = step.into_step();
    let name = format!("when({})", inner.name);
    Step::new(
        generated_id("when"),
        StepKind::When {
            condition,
            step: Box::new(inner),
        },
    )
    .with_name(name)
}

/// Run `step` only when the data matches `pattern`; otherwise pass it through.
pub fn and_with(pattern: Value, step: impl IntoStep) -> Step {
    let inner = step.into_step();
    let name = format!("with({})", inner.name);
    Step::new(
        generated_id("with"),
        StepKind::With {
            pattern,
            step: Box::new(inner),
        },
    )
    .with_name(name)
}

/// Run every step concurrently on the same data.
///
/// Produces an array of outputs in step order. An empty list yields `[]`.
pub fn and_all(steps: impl IntoSteps) -> Step {
    let steps = steps.into_steps();
    Step::new(generated_id("all"), StepKind::All { steps }).with_name("all")
}

/// Run every step concurrently; the first to succeed or fail decides.
pub fn and_race(steps: impl IntoSteps) -> Result<Step, WorkflowError> {
    let steps = steps.into_steps();
    if steps.is_empty() {
        return Err(WorkflowError::InvalidWorkflow(
            "race requires at least one step".to_string(),
        ));
    }
    Ok(Step::new(generated_id("race"), StepKind::Race { steps }).with_name("race"))
}

/// Run `steps` at least once, repeating while `condition` holds.
pub fn and_do_while(steps: impl IntoSteps, condition: Condition) -> Result<Step, WorkflowError> {
    loop_step(steps.into_steps(), condition, LoopMode::DoWhile)
}

/// Run `steps` at least once, repeating until `condition` holds.
pub fn and_do_until(steps: impl IntoSteps, condition: Condition) -> Result<Step, WorkflowError> {
    loop_step(steps.into_steps(), condition, LoopMode::DoUntil)
}

fn loop_step(
    steps: Vec<Step>,
    condition: Condition,
    mode: LoopMode,
) -> Result<Step, WorkflowError> {
    if steps.is_empty() {
        return Err(WorkflowError::InvalidWorkflow(
            "loop requires at least one step".to_string(),
        ));
    }
    Ok(Step::new(
        generated_id(mode.as_str()),
        StepKind::Loop {
            steps,
            condition,
            mode,
        },
    )
    .with_name(mode.as_str()))
}
