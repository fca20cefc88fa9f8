//! Bounded queue of pending history writes.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use agentflow_protocols::{
    ExecutionStatus, HistoryError, StepStatus, WorkflowCheckpoint, WorkflowHistoryEntry,
    WorkflowStepHistoryEntry, WorkflowTimelineEvent,
};
use parking_lot::Mutex;
use serde_json::Value;
use tokio::sync::{Notify, oneshot};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// A unit of work for the history consumer.
pub(crate) enum HistoryCommand {
    /// Create the execution record, or reopen it when `reuse` is set and it
    /// already exists.
    Start {
        entry: WorkflowHistoryEntry,
        reuse: bool,
        reply: oneshot::Sender<Result<WorkflowHistoryEntry, HistoryError>>,
    },
    End {
        execution_id: String,
        status: ExecutionStatus,
        output: Option<Value>,
        error: Option<String>,
    },
    Suspend {
        execution_id: String,
        checkpoint: WorkflowCheckpoint,
    },
    StepStart(WorkflowStepHistoryEntry),
    StepEnd {
        execution_id: String,
        step_index: usize,
        status: StepStatus,
        output: Option<Value>,
        error: Option<String>,
    },
    Timeline(WorkflowTimelineEvent),
    /// Resolved once every earlier command has been applied.
    Flush(oneshot::Sender<()>),
}

impl HistoryCommand {
    pub(crate) fn kind(&self) -> &'static str {
        match self {
            HistoryCommand::Start { .. } => "start",
            HistoryCommand::End { .. } => "end",
            HistoryCommand::Suspend { .. } => "suspend",
            HistoryCommand::StepStart(_) => "step-start",
            HistoryCommand::StepEnd { .. } => "step-end",
            HistoryCommand::Timeline(_) => "timeline",
            HistoryCommand::Flush(_) => "flush",
        }
    }

    /// Commands with a waiting caller are never dropped.
    fn is_droppable(&self) -> bool {
        !matches!(
            self,
            HistoryCommand::Start { .. } | HistoryCommand::Flush(_)
        )
    }
}

/// FIFO of history commands with a soft capacity.
///
/// When full, the oldest droppable command is discarded to make room.
/// Once closed, pushes are refused and any waiting caller sees its reply
/// channel close.
pub(crate) struct HistoryQueue {
    commands: Mutex<VecDeque<HistoryCommand>>,
    notify: Notify,
    capacity: usize,
    dropped: AtomicU64,
    closed: AtomicBool,
}

impl HistoryQueue {
    pub(crate) fn new(capacity: usize) -> Self {
        Self {
            commands: Mutex::new(VecDeque::new()),
            notify: Notify::new(),
            capacity: capacity.max(1),
            dropped: AtomicU64::new(0),
            closed: AtomicBool::new(false),
        }
    }

    pub(crate) fn push(&self, command: HistoryCommand) {
        {
            let mut commands = self.commands.lock();
            if self.closed.load(Ordering::Acquire) {
                debug!("History queue closed, discarding {} command", command.kind());
                return;
            }
            if commands.len() >= self.capacity {
                match commands.iter().position(HistoryCommand::is_droppable) {
                    Some(position) => {
                        if let Some(dropped) = commands.remove(position) {
                            self.dropped.fetch_add(1, Ordering::Relaxed);
                            warn!(
                                "History queue full ({} commands), dropping oldest {} command",
                                self.capacity,
                                dropped.kind()
                            );
                        }
                    }
                    None => warn!(
                        "History queue full of pending replies, exceeding capacity {}",
                        self.capacity
                    ),
                }
            }
            commands.push_back(command);
        }
        self.notify.notify_one();
    }

    /// Next command, waiting for one if the queue is empty.
    ///
    /// After `shutdown` fires, returns what is left and then `None`.
    pub(crate) async fn pop(&self, shutdown: &CancellationToken) -> Option<HistoryCommand> {
        loop {
            let next = self.commands.lock().pop_front();
            if next.is_some() {
                return next;
            }

            tokio::select! {
                _ = self.notify.notified() => {}
                _ = shutdown.cancelled() => {
                    return self.commands.lock().pop_front();
                }
            }
        }
    }

    /// Refuse further commands and discard whatever is still queued.
    ///
    /// Dropping a command drops its reply sender, so nobody waits forever.
    pub(crate) fn close(&self) {
        let leftover = {
            let mut commands = self.commands.lock();
            self.closed.store(true, Ordering::Release);
            std::mem::take(&mut *commands)
        };
        if !leftover.is_empty() {
            debug!("Discarded {} history commands on close", leftover.len());
        }
    }

    pub(crate) fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    pub(crate) fn len(&self) -> usize {
        self.commands.lock().len()
    }

    /// Commands discarded because the queue was full.
    pub(crate) fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn timeline(name: &str) -> HistoryCommand {
        HistoryCommand::Timeline(WorkflowTimelineEvent::new(
            "exec-1", name, "workflow", "running",
        ))
    }

    fn name_of(command: &HistoryCommand) -> String {
        match command {
            HistoryCommand::Timeline(event) => event.name.clone(),
            other => other.kind().to_string(),
        }
    }

    #[tokio::test]
    async fn test_fifo_order() {
        let queue = HistoryQueue::new(8);
        queue.push(timeline("a"));
        queue.push(timeline("b"));

        let shutdown = CancellationToken::new();
        assert_eq!(name_of(&queue.pop(&shutdown).await.unwrap()), "a");
        assert_eq!(name_of(&queue.pop(&shutdown).await.unwrap()), "b");
        assert_eq!(queue.len(), 0);
    }

    #[test]
    fn test_overflow_drops_oldest() {
        let queue = HistoryQueue::new(2);
        queue.push(timeline("a"));
        queue.push(timeline("b"));
        queue.push(timeline("c"));

        assert_eq!(queue.len(), 2);
        assert_eq!(queue.dropped(), 1);
        let names: Vec<String> = queue.commands.lock().iter().map(name_of).collect();
        assert_eq!(names, vec!["b".to_string(), "c".to_string()]);
    }

    #[test]
    fn test_overflow_keeps_commands_with_replies() {
        let queue = HistoryQueue::new(2);
        let (flush_tx, _flush_rx) = oneshot::channel();
        queue.push(HistoryCommand::Flush(flush_tx));
        queue.push(timeline("a"));
        queue.push(HistoryCommand::Suspend {
            execution_id: "exec-1".to_string(),
            checkpoint: WorkflowCheckpoint {
                execution_id: "exec-1".to_string(),
                workflow_id: "wf-1".to_string(),
                step_index: 0,
                data: serde_json::json!({}),
                reason: None,
                suspended_at: Utc::now(),
            },
        });

        let kinds: Vec<&str> = queue.commands.lock().iter().map(|c| c.kind()).collect();
        assert_eq!(kinds, vec!["flush", "suspend"]);
    }

    #[tokio::test]
    async fn test_pop_waits_for_push() {
        let queue = std::sync::Arc::new(HistoryQueue::new(4));
        let shutdown = CancellationToken::new();

        let consumer = {
            let queue = queue.clone();
            let shutdown = shutdown.clone();
            tokio::spawn(async move { queue.pop(&shutdown).await.map(|c| name_of(&c)) })
        };

        tokio::task::yield_now().await;
        queue.push(timeline("late"));
        assert_eq!(consumer.await.unwrap().as_deref(), Some("late"));
    }

    #[tokio::test]
    async fn test_pop_drains_after_shutdown() {
        let queue = HistoryQueue::new(4);
        let shutdown = CancellationToken::new();
        queue.push(timeline("pending"));
        shutdown.cancel();

        assert!(queue.pop(&shutdown).await.is_some());
        assert!(queue.pop(&shutdown).await.is_none());
    }

    #[tokio::test]
    async fn test_closed_queue_releases_waiting_callers() {
        let queue = HistoryQueue::new(4);
        let (pending_tx, pending_rx) = oneshot::channel();
        queue.push(HistoryCommand::Flush(pending_tx));

        queue.close();
        assert!(queue.is_closed());
        assert_eq!(queue.len(), 0);
        assert!(pending_rx.await.is_err());

        let (late_tx, late_rx) = oneshot::channel();
        queue.push(HistoryCommand::Flush(late_tx));
        assert_eq!(queue.len(), 0);
        assert!(late_rx.await.is_err());
    }
}
