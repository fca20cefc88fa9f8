//! Streaming workflow runs.

use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};

use futures::Stream;
use serde_json::Value;
use tokio::sync::{mpsc, oneshot};
use tokio_stream::wrappers::UnboundedReceiverStream;
use tracing::debug;

use crate::error::WorkflowError;
use crate::event::WorkflowEvent;
use crate::workflow::{RunOptions, Workflow, WorkflowRunResult};

/// Lifecycle events of one run, in the order they occurred.
///
/// Ends after the terminal event. Single pass; not restartable.
pub struct WorkflowEventStream {
    inner: UnboundedReceiverStream<WorkflowEvent>,
}

impl Stream for WorkflowEventStream {
    type Item = WorkflowEvent;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        Pin::new(&mut self.inner).poll_next(cx)
    }
}

/// Deferred outcome of a streamed run.
///
/// Resolves exactly as `Workflow::run` would have.
pub struct WorkflowResultHandle {
    rx: oneshot::Receiver<Result<WorkflowRunResult, WorkflowError>>,
}

impl Future for WorkflowResultHandle {
    type Output = Result<WorkflowRunResult, WorkflowError>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        match Pin::new(&mut self.rx).poll(cx) {
            Poll::Ready(Ok(result)) => Poll::Ready(result),
            Poll::Ready(Err(_)) => Poll::Ready(Err(WorkflowError::custom(
                "workflow task stopped before producing a result",
            ))),
            Poll::Pending => Poll::Pending,
        }
    }
}

/// A run in progress: its events and its eventual result.
///
/// The run proceeds whether or not the events are consumed.
pub struct WorkflowStream {
    events: WorkflowEventStream,
    result: WorkflowResultHandle,
}

impl WorkflowStream {
    pub fn into_parts(self) -> (WorkflowEventStream, WorkflowResultHandle) {
        (self.events, self.result)
    }

    /// Wait for the outcome, discarding events not yet consumed.
    pub async fn result(self) -> Result<WorkflowRunResult, WorkflowError> {
        self.result.await
    }
}

impl Stream for WorkflowStream {
    type Item = WorkflowEvent;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        Pin::new(&mut self.events).poll_next(cx)
    }
}

impl Workflow {
    /// Run the workflow in a background task, yielding lifecycle events.
    ///
    /// Must be called inside a Tokio runtime.
    pub fn stream(&self, input: Value) -> WorkflowStream {
        self.stream_with(input, RunOptions::default())
    }

    pub fn stream_with(&self, input: Value, options: RunOptions) -> WorkflowStream {
        let (event_tx, event_rx) = mpsc::unbounded_channel();
        let (result_tx, result_rx) = oneshot::channel();
        let workflow = self.clone();

        tokio::spawn(async move {
            let result = match workflow.validate_input(&input) {
                Ok(()) => workflow.execute(input, options, 0, Some(event_tx)).await,
                Err(e) => Err(e),
            };
            if result_tx.send(result).is_err() {
                debug!("Result of workflow {} was not awaited", workflow.id());
            }
        });

        WorkflowStream {
            events: WorkflowEventStream {
                inner: UnboundedReceiverStream::new(event_rx),
            },
            result: WorkflowResultHandle { rx: result_rx },
        }
    }
}
