//! # agentflow history
//!
//! Storage backends for workflow execution history.
//!
//! Nothing here is created implicitly: callers pick a backend through
//! [`open_store`] or construct one directly and hand it to the registry.

mod file;
mod memory;

use std::sync::Arc;

use agentflow_config::{HistoryBackend, HistoryConfig};
use agentflow_protocols::{HistoryError, HistoryStore};

pub use file::FileHistoryStore;
pub use memory::MemoryHistoryStore;

/// Open the store selected by `config`.
pub async fn open_store(config: &HistoryConfig) -> Result<Arc<dyn HistoryStore>, HistoryError> {
    match config.backend {
        HistoryBackend::Memory => Ok(Arc::new(MemoryHistoryStore::new())),
        HistoryBackend::File => Ok(Arc::new(FileHistoryStore::new(&config.path).await?)),
    }
}
