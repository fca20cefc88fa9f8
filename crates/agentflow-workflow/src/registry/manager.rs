//! History manager: the single owner of history persistence.
//!
//! Callers enqueue [`HistoryCommand`]s; one consumer task applies them to the
//! store in order, publishes notifications and logs failures.

use std::sync::Arc;

use agentflow_config::RegistryConfig;
use agentflow_protocols::{
    ExecutionStatus, HistoryError, HistoryNotification, HistoryStore, WorkflowHistoryEntry,
};
use tokio::sync::{broadcast, oneshot};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use super::queue::{HistoryCommand, HistoryQueue};

pub(crate) struct HistoryManager {
    store: Arc<dyn HistoryStore>,
    queue: Arc<HistoryQueue>,
    notifications: broadcast::Sender<HistoryNotification>,
    shutdown: CancellationToken,
}

impl HistoryManager {
    /// Create the manager and spawn its consumer task.
    pub(crate) fn spawn(store: Arc<dyn HistoryStore>, config: &RegistryConfig) -> Self {
        let queue = Arc::new(HistoryQueue::new(config.event_queue_capacity));
        let (notifications, _) = broadcast::channel(config.notification_capacity.max(1));
        let shutdown = CancellationToken::new();

        let consumer = HistoryConsumer {
            store: Arc::clone(&store),
            queue: Arc::clone(&queue),
            notifications: notifications.clone(),
        };
        tokio::spawn(consumer.run(shutdown.clone()));

        Self {
            store,
            queue,
            notifications,
            shutdown,
        }
    }

    pub(crate) fn store(&self) -> &Arc<dyn HistoryStore> {
        &self.store
    }

    pub(crate) fn enqueue(&self, command: HistoryCommand) {
        self.queue.push(command);
    }

    /// Persist the start of an execution and wait for the stored record.
    pub(crate) async fn start_execution(
        &self,
        entry: WorkflowHistoryEntry,
        reuse: bool,
    ) -> Result<WorkflowHistoryEntry, HistoryError> {
        let (reply, rx) = oneshot::channel();
        self.queue.push(HistoryCommand::Start {
            entry,
            reuse,
            reply,
        });
        rx.await
            .map_err(|_| HistoryError::Storage("history manager stopped".to_string()))?
    }

    /// Wait until every command enqueued so far has been applied.
    pub(crate) async fn flush(&self) {
        let (reply, rx) = oneshot::channel();
        self.queue.push(HistoryCommand::Flush(reply));
        if rx.await.is_err() {
            debug!("History manager stopped before flush completed");
        }
    }

    /// Flush, then stop the consumer task.
    pub(crate) async fn shutdown(&self) {
        if !self.shutdown.is_cancelled() {
            self.flush().await;
            self.shutdown.cancel();
        }
    }

    pub(crate) fn subscribe(&self) -> broadcast::Receiver<HistoryNotification> {
        self.notifications.subscribe()
    }

    pub(crate) fn pending(&self) -> usize {
        self.queue.len()
    }

    pub(crate) fn dropped(&self) -> u64 {
        self.queue.dropped()
    }
}

impl Drop for HistoryManager {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}

struct HistoryConsumer {
    store: Arc<dyn HistoryStore>,
    queue: Arc<HistoryQueue>,
    notifications: broadcast::Sender<HistoryNotification>,
}

impl HistoryConsumer {
    async fn run(self, shutdown: CancellationToken) {
        debug!("History consumer started");
        while let Some(command) = self.queue.pop(&shutdown).await {
            self.apply(command).await;
        }
        self.queue.close();
        debug!("History consumer stopped");
    }

    async fn apply(&self, command: HistoryCommand) {
        match command {
            HistoryCommand::Start {
                entry,
                reuse,
                reply,
            } => {
                let execution_id = entry.id.clone();
                let result = self.start(entry, reuse).await;
                if let Err(e) = &result {
                    warn!("Failed to record start of execution {}: {}", execution_id, e);
                }
                let _ = reply.send(result);
            }
            HistoryCommand::End {
                execution_id,
                status,
                output,
                error,
            } => {
                let result = self
                    .update(&execution_id, move |entry| entry.complete(status, output, error))
                    .await;
                self.header_written("record execution end", &execution_id, result);
            }
            HistoryCommand::Suspend {
                execution_id,
                checkpoint,
            } => {
                let result = self
                    .update(&execution_id, move |entry| entry.suspend(checkpoint))
                    .await;
                self.header_written("record suspension", &execution_id, result);
            }
            HistoryCommand::StepStart(step) => {
                let result = self.store.record_step_start(&step).await;
                self.record_written("record step start", &step.execution_id, result)
                    .await;
            }
            HistoryCommand::StepEnd {
                execution_id,
                step_index,
                status,
                output,
                error,
            } => {
                let result = self
                    .store
                    .record_step_end(&execution_id, step_index, status, output, error)
                    .await;
                self.record_written("record step end", &execution_id, result).await;
            }
            HistoryCommand::Timeline(event) => {
                let result = self.store.record_timeline_event(&event).await;
                self.record_written("record timeline event", &event.execution_id, result)
                    .await;
            }
            HistoryCommand::Flush(reply) => {
                let _ = reply.send(());
            }
        }
    }

    async fn start(
        &self,
        entry: WorkflowHistoryEntry,
        reuse: bool,
    ) -> Result<WorkflowHistoryEntry, HistoryError> {
        if reuse {
            if let Some(mut existing) = self.store.get_execution(&entry.id).await? {
                if existing.workflow_id != entry.workflow_id {
                    return Err(HistoryError::Storage(format!(
                        "execution {} belongs to workflow {}",
                        existing.id, existing.workflow_id
                    )));
                }
                existing.status = ExecutionStatus::Running;
                existing.output = None;
                existing.error = None;
                existing.end_time = None;
                existing.checkpoint = None;
                if !entry.user_context.is_empty() {
                    existing.user_context = entry.user_context;
                }
                self.store.update_execution(&existing).await?;
                debug!("Reopened execution {}", existing.id);
                self.publish(HistoryNotification::HistoryUpdated(existing.clone()));
                return Ok(existing);
            }
        }

        self.store.create_execution(&entry).await?;
        self.publish(HistoryNotification::HistoryCreated(entry.clone()));
        Ok(entry)
    }

    /// Read-modify-write of an execution header.
    async fn update<F>(
        &self,
        execution_id: &str,
        apply: F,
    ) -> Result<WorkflowHistoryEntry, HistoryError>
    where
        F: FnOnce(&mut WorkflowHistoryEntry) + Send,
    {
        let mut entry = self
            .store
            .get_execution(execution_id)
            .await?
            .ok_or_else(|| HistoryError::NotFound(execution_id.to_string()))?;
        apply(&mut entry);
        self.store.update_execution(&entry).await?;
        Ok(entry)
    }

    fn header_written(
        &self,
        action: &str,
        execution_id: &str,
        result: Result<WorkflowHistoryEntry, HistoryError>,
    ) {
        match result {
            Ok(entry) => self.publish(HistoryNotification::HistoryUpdated(entry)),
            Err(e) => warn!("Failed to {} for execution {}: {}", action, execution_id, e),
        }
    }

    async fn record_written(
        &self,
        action: &str,
        execution_id: &str,
        result: Result<(), HistoryError>,
    ) {
        if let Err(e) = result {
            warn!("Failed to {} for execution {}: {}", action, execution_id, e);
            return;
        }
        if self.notifications.receiver_count() == 0 {
            return;
        }
        match self.store.get_execution(execution_id).await {
            Ok(Some(entry)) => self.publish(HistoryNotification::HistoryUpdated(entry)),
            Ok(None) => {}
            Err(e) => warn!("Failed to load execution {} for notification: {}", execution_id, e),
        }
    }

    fn publish(&self, notification: HistoryNotification) {
        // No subscribers is fine.
        let _ = self.notifications.send(notification);
    }
}
