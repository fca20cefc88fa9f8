//! In-memory history store.

#[cfg(test)]
#[path = "memory_tests.rs"]
mod tests;

use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;

use agentflow_protocols::{
    HistoryError, HistoryStore, StepStatus, WorkflowHistoryEntry, WorkflowStepHistoryEntry,
    WorkflowTimelineEvent,
};

/// Process-local history store.
///
/// Suitable for tests and short-lived processes; everything is lost on exit.
pub struct MemoryHistoryStore {
    executions: RwLock<HashMap<String, WorkflowHistoryEntry>>,
}

impl MemoryHistoryStore {
    /// Create a new memory store.
    pub fn new() -> Self {
        Self {
            executions: RwLock::new(HashMap::new()),
        }
    }

    /// Number of stored executions.
    pub async fn len(&self) -> usize {
        self.executions.read().await.len()
    }

    /// Whether the store holds no executions.
    pub async fn is_empty(&self) -> bool {
        self.executions.read().await.is_empty()
    }
}

impl Default for MemoryHistoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl HistoryStore for MemoryHistoryStore {
    async fn create_execution(&self, entry: &WorkflowHistoryEntry) -> Result<(), HistoryError> {
        let mut store = self.executions.write().await;
        store.insert(entry.id.clone(), entry.clone());
        Ok(())
    }

    async fn update_execution(&self, entry: &WorkflowHistoryEntry) -> Result<(), HistoryError> {
        let mut store = self.executions.write().await;
        let stored = store
            .get_mut(&entry.id)
            .ok_or_else(|| HistoryError::NotFound(entry.id.clone()))?;
        stored.merge_header(entry);
        Ok(())
    }

    async fn get_execution(&self, id: &str) -> Result<Option<WorkflowHistoryEntry>, HistoryError> {
        let store = self.executions.read().await;
        Ok(store.get(id).cloned())
    }

    async fn get_executions_by_workflow(
        &self,
        workflow_id: &str,
    ) -> Result<Vec<WorkflowHistoryEntry>, HistoryError> {
        let store = self.executions.read().await;
        let mut executions: Vec<_> = store
            .values()
            .filter(|entry| entry.workflow_id == workflow_id)
            .cloned()
            .collect();
        executions.sort_by_key(|entry| entry.start_time);
        Ok(executions)
    }

    async fn record_step_start(&self, step: &WorkflowStepHistoryEntry) -> Result<(), HistoryError> {
        let mut store = self.executions.write().await;
        let entry = store
            .get_mut(&step.execution_id)
            .ok_or_else(|| HistoryError::NotFound(step.execution_id.clone()))?;
        entry.steps.push(step.clone());
        Ok(())
    }

    async fn record_step_end(
        &self,
        execution_id: &str,
        step_index: usize,
        status: StepStatus,
        output: Option<serde_json::Value>,
        error: Option<String>,
    ) -> Result<(), HistoryError> {
        let mut store = self.executions.write().await;
        let entry = store
            .get_mut(execution_id)
            .ok_or_else(|| HistoryError::NotFound(execution_id.to_string()))?;
        let step = entry
            .steps
            .iter_mut()
            .rev()
            .find(|step| step.step_index == step_index)
            .ok_or_else(|| HistoryError::NotFound(format!("{}#{}", execution_id, step_index)))?;
        step.finish(status, output, error);
        Ok(())
    }

    async fn record_timeline_event(
        &self,
        event: &WorkflowTimelineEvent,
    ) -> Result<(), HistoryError> {
        let mut store = self.executions.write().await;
        let entry = store
            .get_mut(&event.execution_id)
            .ok_or_else(|| HistoryError::NotFound(event.execution_id.clone()))?;
        entry.events.push(event.clone());
        Ok(())
    }

    async fn delete_execution(&self, id: &str) -> Result<bool, HistoryError> {
        let mut store = self.executions.write().await;
        Ok(store.remove(id).is_some())
    }

    async fn get_all_workflow_ids(&self) -> Result<Vec<String>, HistoryError> {
        let store = self.executions.read().await;
        let mut ids: Vec<String> = store.values().map(|entry| entry.workflow_id.clone()).collect();
        ids.sort();
        ids.dedup();
        Ok(ids)
    }
}
