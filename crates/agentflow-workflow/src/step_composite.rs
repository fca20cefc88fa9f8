//! Composite step execution (conditional, parallel, loop).

use futures::future::{select_all, try_join_all};
use serde_json::Value;
use tracing::{debug, info};

use crate::context::StepContext;
use crate::error::WorkflowError;
use crate::pattern;
use crate::step::{Condition, LoopMode, Step};

impl Step {
    /// Run `inner` when `condition` holds; otherwise return the input.
    pub(crate) async fn execute_when(
        &self,
        condition: &Condition,
        inner: &Step,
        data: Value,
        ctx: StepContext,
    ) -> Result<Value, WorkflowError> {
        if condition.evaluate(&data)? {
            debug!("Condition of step {} passed, running {}", self.id, inner.id);
            inner.execute(data, ctx).await
        } else {
            debug!("Condition of step {} failed, passing data through", self.id);
            Ok(data)
        }
    }

    /// Run `inner` when the input matches `pattern`; otherwise return the input.
    pub(crate) async fn execute_with(
        &self,
        pattern: &Value,
        inner: &Step,
        data: Value,
        ctx: StepContext,
    ) -> Result<Value, WorkflowError> {
        if pattern::matches(pattern, &data) {
            debug!("Step {} matched its pattern, running {}", self.id, inner.id);
            inner.execute(data, ctx).await
        } else {
            debug!("Step {} did not match its pattern, passing data through", self.id);
            Ok(data)
        }
    }

    /// Run every branch on the same input and collect outputs in branch order.
    pub(crate) async fn execute_all(
        &self,
        steps: &[Step],
        data: Value,
        ctx: StepContext,
    ) -> Result<Value, WorkflowError> {
        info!("Executing {} parallel steps in {}", steps.len(), self.id);

        let outputs = try_join_all(
            steps
                .iter()
                .map(|step| step.execute(data.clone(), ctx.clone())),
        )
        .await?;

        Ok(Value::Array(outputs))
    }

    /// Run every branch on the same input; the first to settle decides.
    ///
    /// Losing branches are dropped, which stops them at their next await point.
    pub(crate) async fn execute_race(
        &self,
        steps: &[Step],
        data: Value,
        ctx: StepContext,
    ) -> Result<Value, WorkflowError> {
        if steps.is_empty() {
            return Err(WorkflowError::InvalidWorkflow(format!(
                "race step {} has no branches",
                self.id
            )));
        }

        info!("Racing {} steps in {}", steps.len(), self.id);

        let (result, winner, _losers) = select_all(
            steps
                .iter()
                .map(|step| step.execute(data.clone(), ctx.clone())),
        )
        .await;

        debug!("Race {} settled by branch {} ({})", self.id, winner, steps[winner].id);
        result
    }

    /// Run `steps` in order, then evaluate `condition` to decide whether to repeat.
    ///
    /// The body always runs at least once. Cancellation is checked before
    /// every sub-step and before every condition evaluation.
    pub(crate) async fn execute_loop(
        &self,
        steps: &[Step],
        condition: &Condition,
        mode: LoopMode,
        data: Value,
        ctx: StepContext,
    ) -> Result<Value, WorkflowError> {
        if steps.is_empty() {
            return Err(WorkflowError::InvalidWorkflow(format!(
                "loop step {} has no steps",
                self.id
            )));
        }

        let sub_ctx = ctx.detached_from_span();
        let mut data = data;
        let mut iterations: u64 = 0;

        loop {
            iterations += 1;
            for step in steps {
                sub_ctx.check_cancelled()?;
                data = step.execute(data, sub_ctx.clone()).await?;
            }

            sub_ctx.check_cancelled()?;
            if !mode.should_continue(condition.evaluate(&data)?) {
                break;
            }
        }

        debug!(
            "Loop {} ({}) finished after {} iterations",
            self.id,
            mode.as_str(),
            iterations
        );
        Ok(data)
    }
}
