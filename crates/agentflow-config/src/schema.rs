//! Configuration schema definitions.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Root configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub registry: RegistryConfig,

    #[serde(default)]
    pub history: HistoryConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Workflow registry configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegistryConfig {
    /// Maximum pending history commands before the oldest are dropped.
    #[serde(default = "default_event_queue_capacity")]
    pub event_queue_capacity: usize,

    /// Buffer size of the history notification channel.
    #[serde(default = "default_notification_capacity")]
    pub notification_capacity: usize,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            event_queue_capacity: default_event_queue_capacity(),
            notification_capacity: default_notification_capacity(),
        }
    }
}

fn default_event_queue_capacity() -> usize {
    1024
}

fn default_notification_capacity() -> usize {
    256
}

/// History storage backend.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HistoryBackend {
    /// Process-local, lost on exit.
    #[default]
    Memory,
    /// JSON documents under `history.path`. Must be selected explicitly.
    File,
}

/// History storage configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistoryConfig {
    #[serde(default)]
    pub backend: HistoryBackend,

    /// Root directory for the file backend.
    #[serde(default = "default_history_path")]
    pub path: PathBuf,
}

impl Default for HistoryConfig {
    fn default() -> Self {
        Self {
            backend: HistoryBackend::default(),
            path: default_history_path(),
        }
    }
}

fn default_history_path() -> PathBuf {
    dirs::home_dir()
        .map(|h| h.join(".agentflow").join("history"))
        .unwrap_or_else(|| PathBuf::from(".agentflow/history"))
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Default filter when `RUST_LOG` is not set.
    #[serde(default = "default_level")]
    pub level: String,

    /// Emit JSON lines instead of human-readable text.
    #[serde(default)]
    pub json: bool,

    /// Directory for daily rolling log files. Console only when unset.
    #[serde(default)]
    pub directory: Option<PathBuf>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_level(),
            json: false,
            directory: None,
        }
    }
}

fn default_level() -> String {
    "info".to_string()
}

#[cfg(test)]
#[path = "schema_tests.rs"]
mod tests;
