//! Workflow run loop.
//!
//! Steps run strictly in order. Each step's output becomes the next step's
//! input. Lifecycle bookkeeping (events, history, hooks) never changes the
//! outcome of a run: history is queued in the registry and events go to an
//! unbounded channel.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use agentflow_protocols::{
    ExecutionStatus, StepStatus, WorkflowCheckpoint, WorkflowHistoryEntry,
    WorkflowStepHistoryEntry,
};
use chrono::Utc;
use serde_json::Value;
use tokio::sync::mpsc;
use tracing::{Instrument, debug, error, info, info_span, warn};
use uuid::Uuid;

use crate::context::{
    ExecutionProgress, StepRecord, UserContext, WorkflowExecutionContext,
};
use crate::error::WorkflowError;
use crate::event::WorkflowEvent;
use crate::registry::WorkflowRegistry;
use crate::state::{WorkflowStateManager, WorkflowStatus};
use crate::step::StepInfo;
use crate::workflow::{RunOptions, Workflow, WorkflowRunResult};

pub(crate) type EventSender = mpsc::UnboundedSender<WorkflowEvent>;

fn elapsed_ms(since: Instant) -> u64 {
    since.elapsed().as_millis() as u64
}

/// Where the side effects of one run go.
struct RunRecorder {
    /// Present only when the registry accepted the start of the run.
    registry: Option<Arc<WorkflowRegistry>>,
    events: Option<EventSender>,
}

impl RunRecorder {
    fn emit(&self, event: WorkflowEvent) {
        if let Some(registry) = &self.registry {
            registry.record_timeline_event(event.to_timeline_event());
        }
        if let Some(events) = &self.events {
            if events.send(event).is_err() {
                debug!("Workflow event receiver dropped");
            }
        }
    }

    fn step_started(&self, execution_id: &str, step: &StepInfo, input: &Value) {
        if let Some(registry) = &self.registry {
            registry.record_workflow_step_start(WorkflowStepHistoryEntry::started(
                execution_id,
                step.index,
                &step.id,
                &step.name,
                &step.step_type,
                input.clone(),
            ));
        }
        self.emit(WorkflowEvent::StepStart {
            execution_id: execution_id.to_string(),
            step: step.clone(),
            input: input.clone(),
            timestamp: Utc::now(),
        });
    }

    fn step_completed(
        &self,
        execution_id: &str,
        step: &StepInfo,
        output: &Value,
        duration_ms: u64,
    ) {
        if let Some(registry) = &self.registry {
            registry.record_workflow_step_end(
                execution_id,
                step.index,
                StepStatus::Completed,
                Some(output.clone()),
                None,
            );
        }
        self.emit(WorkflowEvent::StepComplete {
            execution_id: execution_id.to_string(),
            step: step.clone(),
            output: output.clone(),
            duration_ms,
            timestamp: Utc::now(),
        });
    }

    fn step_failed(
        &self,
        execution_id: &str,
        step: &StepInfo,
        status: StepStatus,
        error: &WorkflowError,
        duration_ms: u64,
    ) {
        if let Some(registry) = &self.registry {
            registry.record_workflow_step_end(
                execution_id,
                step.index,
                status,
                None,
                Some(error.to_string()),
            );
        }
        if status == StepStatus::Error {
            self.emit(WorkflowEvent::StepError {
                execution_id: execution_id.to_string(),
                step: step.clone(),
                error: error.to_string(),
                duration_ms,
                timestamp: Utc::now(),
            });
        }
    }

    fn finished(
        &self,
        execution_id: &str,
        status: ExecutionStatus,
        output: Option<Value>,
        error: Option<String>,
    ) {
        if let Some(registry) = &self.registry {
            registry.record_workflow_execution_end(execution_id, status, output, error);
        }
    }

    fn suspended(&self, checkpoint: &WorkflowCheckpoint) {
        if let Some(registry) = &self.registry {
            registry.record_workflow_suspension(&checkpoint.execution_id, checkpoint.clone());
        }
    }
}

impl Workflow {
    /// Run the workflow on `input`.
    ///
    /// Returns the original error of the first failing step.
    pub async fn run(&self, input: Value) -> Result<WorkflowRunResult, WorkflowError> {
        self.run_with(input, RunOptions::default()).await
    }

    pub async fn run_with(
        &self,
        input: Value,
        options: RunOptions,
    ) -> Result<WorkflowRunResult, WorkflowError> {
        self.validate_input(&input)?;
        self.execute(input, options, 0, None).await
    }

    /// Continue a suspended execution from its checkpoint.
    ///
    /// The suspending step runs again with the data it received, under the
    /// original execution id.
    pub async fn resume(
        &self,
        checkpoint: WorkflowCheckpoint,
        options: RunOptions,
    ) -> Result<WorkflowRunResult, WorkflowError> {
        self.check_checkpoint(&checkpoint)?;
        let options = RunOptions {
            execution_id: Some(checkpoint.execution_id),
            ..options
        };
        self.execute(checkpoint.data, options, checkpoint.step_index, None)
            .await
    }

    pub(crate) fn check_checkpoint(
        &self,
        checkpoint: &WorkflowCheckpoint,
    ) -> Result<(), WorkflowError> {
        if checkpoint.workflow_id != self.id() {
            return Err(WorkflowError::InvalidWorkflow(format!(
                "checkpoint belongs to workflow {}, not {}",
                checkpoint.workflow_id,
                self.id()
            )));
        }
        if checkpoint.step_index >= self.steps().len() {
            return Err(WorkflowError::InvalidWorkflow(format!(
                "checkpoint step index {} is out of range for {} steps",
                checkpoint.step_index,
                self.steps().len()
            )));
        }
        Ok(())
    }

    pub(crate) async fn execute(
        &self,
        input: Value,
        options: RunOptions,
        start_index: usize,
        events: Option<EventSender>,
    ) -> Result<WorkflowRunResult, WorkflowError> {
        let RunOptions {
            execution_id,
            user_context,
            signal,
        } = options;

        let registry = self.registry();
        let (execution_id, history_entry) = self
            .open_execution(registry.as_deref(), &input, execution_id, &user_context)
            .await;

        let recorder = RunRecorder {
            registry: history_entry.as_ref().and(registry.clone()),
            events,
        };

        let mut context = WorkflowExecutionContext::new(
            self.id(),
            self.name(),
            &execution_id,
            UserContext::new(user_context),
            signal.unwrap_or_default(),
        )
        .with_history_entry(history_entry)
        .with_progress(ExecutionProgress::starting_at(start_index));

        let span = info_span!(
            "workflow_run",
            workflow_id = %self.id(),
            execution_id = %execution_id
        );
        let outcome = self
            .drive(&mut context, input, start_index, &recorder, span.clone())
            .instrument(span)
            .await;

        context.deactivate();
        if let Some(registry) = &registry {
            registry.note_execution_finished(self.id());
        }
        outcome
    }

    /// Obtain the execution id, from the registry when possible.
    async fn open_execution(
        &self,
        registry: Option<&WorkflowRegistry>,
        input: &Value,
        requested_id: Option<String>,
        user_context: &HashMap<String, Value>,
    ) -> (String, Option<WorkflowHistoryEntry>) {
        let Some(registry) = registry else {
            let execution_id = requested_id.unwrap_or_else(|| Uuid::new_v4().to_string());
            debug!(
                "Workflow {} is not registered, using local execution id {}",
                self.id(),
                execution_id
            );
            return (execution_id, None);
        };

        match registry
            .record_workflow_execution_start(
                self.id(),
                self.name(),
                input.clone(),
                requested_id.clone(),
                user_context.clone(),
            )
            .await
        {
            Ok(entry) => (entry.id.clone(), Some(entry)),
            Err(e) => {
                let execution_id = requested_id.unwrap_or_else(|| Uuid::new_v4().to_string());
                warn!(
                    "Failed to record start of workflow {}: {}. Continuing with execution id {}",
                    self.id(),
                    e,
                    execution_id
                );
                (execution_id, None)
            }
        }
    }

    async fn drive(
        &self,
        context: &mut WorkflowExecutionContext,
        input: Value,
        start_index: usize,
        recorder: &RunRecorder,
        span: tracing::Span,
    ) -> Result<WorkflowRunResult, WorkflowError> {
        let execution_id = context.execution_id.clone();
        let hooks = self.hooks();
        let started = Instant::now();

        let mut state = WorkflowStateManager::new(&execution_id);
        state.start(input.clone());

        info!(
            "Starting workflow {} ({} steps, from step {})",
            self.id(),
            self.steps().len(),
            start_index
        );
        recorder.emit(WorkflowEvent::WorkflowStart {
            execution_id: execution_id.clone(),
            workflow_id: self.id().to_string(),
            workflow_name: self.name().to_string(),
            input: input.clone(),
            start_index,
            timestamp: Utc::now(),
        });
        if let Some(hooks) = hooks {
            hooks.on_start(state.state()).await;
        }

        let mut data = input;
        let mut progress = context.progress.clone();

        for (index, step) in self.steps().iter().enumerate().skip(start_index) {
            progress = progress.begin(index);
            let info = step.info(index);

            if let Some(hooks) = hooks {
                hooks.on_step_start(&info, state.state()).await;
            }
            recorder.step_started(&execution_id, &info, &data);
            debug!("Executing step {} ({}) of workflow {}", index, step.id, self.id());

            let step_started = Instant::now();
            let outcome = step
                .execute(data.clone(), context.step_context(index, Some(span.clone())))
                .await;
            let duration_ms = elapsed_ms(step_started);

            match outcome {
                Ok(output) => {
                    state.update(output.clone());
                    progress = progress.advance(StepRecord {
                        index,
                        step_id: step.id.clone(),
                        step_name: step.name.clone(),
                        status: StepStatus::Completed,
                        duration_ms,
                        error: None,
                    });
                    recorder.step_completed(&execution_id, &info, &output, duration_ms);
                    if let Some(hooks) = hooks {
                        hooks.on_step_end(&info, state.state()).await;
                    }
                    data = output;
                }
                Err(err) => {
                    let status = if err.is_suspended() {
                        StepStatus::Suspended
                    } else {
                        StepStatus::Error
                    };
                    context.progress = progress.advance(StepRecord {
                        index,
                        step_id: step.id.clone(),
                        step_name: step.name.clone(),
                        status,
                        duration_ms,
                        error: Some(err.to_string()),
                    });
                    recorder.step_failed(&execution_id, &info, status, &err, duration_ms);

                    if let WorkflowError::Suspended { reason } = &err {
                        let checkpoint = WorkflowCheckpoint {
                            execution_id: execution_id.clone(),
                            workflow_id: self.id().to_string(),
                            step_index: index,
                            data,
                            reason: reason.clone(),
                            suspended_at: Utc::now(),
                        };
                        return self.suspend_run(state, checkpoint, recorder).await;
                    }

                    return Err(self.fail_run(state, err, recorder, started).await);
                }
            }
        }

        context.progress = progress;
        state.finish();

        info!(
            "Workflow {} completed in {}ms",
            self.id(),
            elapsed_ms(started)
        );
        recorder.emit(WorkflowEvent::WorkflowComplete {
            execution_id: execution_id.clone(),
            result: data.clone(),
            duration_ms: elapsed_ms(started),
            timestamp: Utc::now(),
        });
        recorder.finished(
            &execution_id,
            ExecutionStatus::Completed,
            Some(data.clone()),
            None,
        );
        if let Some(hooks) = hooks {
            hooks.on_end(state.state()).await;
        }

        let state = state.into_state();
        Ok(WorkflowRunResult {
            execution_id,
            workflow_id: self.id().to_string(),
            start_at: state.start_at,
            end_at: state.end_at.unwrap_or_else(Utc::now),
            status: WorkflowStatus::Completed,
            result: data,
            checkpoint: None,
        })
    }

    async fn suspend_run(
        &self,
        mut state: WorkflowStateManager,
        checkpoint: WorkflowCheckpoint,
        recorder: &RunRecorder,
    ) -> Result<WorkflowRunResult, WorkflowError> {
        state.suspend();
        info!(
            "Workflow {} suspended at step {}: {}",
            self.id(),
            checkpoint.step_index,
            checkpoint.reason.as_deref().unwrap_or("no reason given")
        );

        recorder.emit(WorkflowEvent::WorkflowSuspended {
            execution_id: checkpoint.execution_id.clone(),
            checkpoint: checkpoint.clone(),
            timestamp: Utc::now(),
        });
        recorder.suspended(&checkpoint);
        if let Some(hooks) = self.hooks() {
            hooks.on_end(state.state()).await;
        }

        let state = state.into_state();
        Ok(WorkflowRunResult {
            execution_id: checkpoint.execution_id.clone(),
            workflow_id: self.id().to_string(),
            start_at: state.start_at,
            end_at: state.end_at.unwrap_or_else(Utc::now),
            status: WorkflowStatus::Suspended,
            result: checkpoint.data.clone(),
            checkpoint: Some(checkpoint),
        })
    }

    /// Record the failure and hand the original error back.
    async fn fail_run(
        &self,
        mut state: WorkflowStateManager,
        err: WorkflowError,
        recorder: &RunRecorder,
        started: Instant,
    ) -> WorkflowError {
        state.fail(&err);
        let execution_id = state.state().execution_id.clone();
        let cancelled = err.is_cancelled();

        if cancelled {
            warn!("Workflow {} cancelled", self.id());
        } else {
            error!("Workflow {} failed: {}", self.id(), err);
        }

        recorder.emit(WorkflowEvent::WorkflowError {
            execution_id: execution_id.clone(),
            error: err.to_string(),
            cancelled,
            duration_ms: elapsed_ms(started),
            timestamp: Utc::now(),
        });
        let status = if cancelled {
            ExecutionStatus::Cancelled
        } else {
            ExecutionStatus::Error
        };
        recorder.finished(&execution_id, status, None, Some(err.to_string()));
        if let Some(hooks) = self.hooks() {
            hooks.on_end(state.state()).await;
        }

        err
    }
}
