//! File system history store.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::fs;
use tokio::sync::Mutex;
use tracing::{debug, warn};

use agentflow_protocols::{
    HistoryError, HistoryStore, StepStatus, WorkflowHistoryEntry, WorkflowStepHistoryEntry,
    WorkflowTimelineEvent,
};

/// History store keeping one JSON document per execution.
///
/// ```text
/// {storage_path}/
/// └── executions/
///     └── {workflow_id}/
///         ├── {execution_id}.json
///         └── ...
/// ```
///
/// Writes are read-modify-write of a whole document and are serialized by an
/// internal lock, so one store instance must own the directory.
pub struct FileHistoryStore {
    storage_path: PathBuf,
    write_lock: Mutex<()>,
}

impl FileHistoryStore {
    /// Create a store rooted at `storage_path`, creating directories as needed.
    pub async fn new(storage_path: impl AsRef<Path>) -> Result<Self, HistoryError> {
        let storage_path = storage_path.as_ref().to_path_buf();
        fs::create_dir_all(storage_path.join("executions")).await?;

        debug!("FileHistoryStore initialized at {:?}", storage_path);

        Ok(Self {
            storage_path,
            write_lock: Mutex::new(()),
        })
    }

    fn executions_dir(&self) -> PathBuf {
        self.storage_path.join("executions")
    }

    fn workflow_dir(&self, workflow_id: &str) -> PathBuf {
        self.executions_dir().join(Self::sanitize(workflow_id))
    }

    fn execution_path(&self, workflow_id: &str, execution_id: &str) -> PathBuf {
        self.workflow_dir(workflow_id)
            .join(format!("{}.json", Self::sanitize(execution_id)))
    }

    /// Sanitize an id for use as a path component.
    fn sanitize(id: &str) -> String {
        id.chars()
            .map(|c| if c.is_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
            .collect()
    }

    async fn read_entry(path: &Path) -> Result<WorkflowHistoryEntry, HistoryError> {
        let content = fs::read_to_string(path).await?;
        Ok(serde_json::from_str(&content)?)
    }

    async fn write_entry(&self, entry: &WorkflowHistoryEntry) -> Result<(), HistoryError> {
        fs::create_dir_all(self.workflow_dir(&entry.workflow_id)).await?;
        let path = self.execution_path(&entry.workflow_id, &entry.id);
        let content = serde_json::to_string_pretty(entry)?;
        // Readers take no lock, so replace the document in one rename.
        let tmp_path = path.with_extension("json.tmp");
        fs::write(&tmp_path, content).await?;
        fs::rename(&tmp_path, &path).await?;
        Ok(())
    }

    /// Locate the document of an execution by scanning workflow directories.
    async fn find_execution_file(
        &self,
        execution_id: &str,
    ) -> Result<Option<PathBuf>, HistoryError> {
        let file_name = format!("{}.json", Self::sanitize(execution_id));
        let mut workflows = fs::read_dir(self.executions_dir()).await?;

        while let Some(workflow_entry) = workflows.next_entry().await? {
            let candidate = workflow_entry.path().join(&file_name);
            if fs::try_exists(&candidate).await.unwrap_or(false) {
                return Ok(Some(candidate));
            }
        }

        Ok(None)
    }

    /// Read every valid document under a directory, skipping corrupt files.
    async fn read_dir_entries(dir: &Path) -> Result<Vec<WorkflowHistoryEntry>, HistoryError> {
        let mut entries = Vec::new();
        let mut files = fs::read_dir(dir).await?;

        while let Some(file) = files.next_entry().await? {
            let path = file.path();
            if path.extension().is_none_or(|ext| ext != "json") {
                continue;
            }
            match Self::read_entry(&path).await {
                Ok(entry) => entries.push(entry),
                Err(e) => warn!("Skipping unreadable history file {:?}: {}", path, e),
            }
        }

        Ok(entries)
    }

    /// Load, modify and write back one execution document.
    async fn modify<F>(&self, execution_id: &str, f: F) -> Result<(), HistoryError>
    where
        F: FnOnce(&mut WorkflowHistoryEntry) -> Result<(), HistoryError> + Send,
    {
        let _guard = self.write_lock.lock().await;
        let path = self
            .find_execution_file(execution_id)
            .await?
            .ok_or_else(|| HistoryError::NotFound(execution_id.to_string()))?;
        let mut entry = Self::read_entry(&path).await?;
        f(&mut entry)?;
        self.write_entry(&entry).await
    }
}

#[async_trait]
impl HistoryStore for FileHistoryStore {
    async fn create_execution(&self, entry: &WorkflowHistoryEntry) -> Result<(), HistoryError> {
        let _guard = self.write_lock.lock().await;
        self.write_entry(entry).await?;
        debug!(
            "Created execution '{}' for workflow '{}'",
            entry.id, entry.workflow_id
        );
        Ok(())
    }

    async fn update_execution(&self, entry: &WorkflowHistoryEntry) -> Result<(), HistoryError> {
        self.modify(&entry.id, |stored| {
            stored.merge_header(entry);
            Ok(())
        })
        .await
    }

    async fn get_execution(&self, id: &str) -> Result<Option<WorkflowHistoryEntry>, HistoryError> {
        match self.find_execution_file(id).await? {
            Some(path) => Ok(Some(Self::read_entry(&path).await?)),
            None => Ok(None),
        }
    }

    async fn get_executions_by_workflow(
        &self,
        workflow_id: &str,
    ) -> Result<Vec<WorkflowHistoryEntry>, HistoryError> {
        let dir = self.workflow_dir(workflow_id);
        if !fs::try_exists(&dir).await? {
            return Ok(Vec::new());
        }

        let mut executions: Vec<_> = Self::read_dir_entries(&dir)
            .await?
            .into_iter()
            .filter(|entry| entry.workflow_id == workflow_id)
            .collect();
        executions.sort_by_key(|entry| entry.start_time);
        Ok(executions)
    }

    async fn record_step_start(&self, step: &WorkflowStepHistoryEntry) -> Result<(), HistoryError> {
        let step = step.clone();
        self.modify(&step.execution_id.clone(), move |entry| {
            entry.steps.push(step);
            Ok(())
        })
        .await
    }

    async fn record_step_end(
        &self,
        execution_id: &str,
        step_index: usize,
        status: StepStatus,
        output: Option<serde_json::Value>,
        error: Option<String>,
    ) -> Result<(), HistoryError> {
        self.modify(execution_id, move |entry| {
            let key = format!("{}#{}", entry.id, step_index);
            let step = entry
                .steps
                .iter_mut()
                .rev()
                .find(|step| step.step_index == step_index)
                .ok_or(HistoryError::NotFound(key))?;
            step.finish(status, output, error);
            Ok(())
        })
        .await
    }

    async fn record_timeline_event(
        &self,
        event: &WorkflowTimelineEvent,
    ) -> Result<(), HistoryError> {
        let event = event.clone();
        self.modify(&event.execution_id.clone(), move |entry| {
            entry.events.push(event);
            Ok(())
        })
        .await
    }

    async fn delete_execution(&self, id: &str) -> Result<bool, HistoryError> {
        let _guard = self.write_lock.lock().await;
        match self.find_execution_file(id).await? {
            Some(path) => {
                fs::remove_file(&path).await?;
                debug!("Deleted execution '{}'", id);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn get_all_workflow_ids(&self) -> Result<Vec<String>, HistoryError> {
        let mut ids = Vec::new();
        let mut workflows = fs::read_dir(self.executions_dir()).await?;

        while let Some(workflow_entry) = workflows.next_entry().await? {
            let path = workflow_entry.path();
            if !path.is_dir() {
                continue;
            }
            // Directory names are sanitized; the documents carry the real id.
            let entries = Self::read_dir_entries(&path).await?;
            ids.extend(entries.into_iter().map(|entry| entry.workflow_id));
        }

        ids.sort();
        ids.dedup();
        Ok(ids)
    }
}
