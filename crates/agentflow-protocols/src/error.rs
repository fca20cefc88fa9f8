//! Error types for collaborator contracts.

use thiserror::Error;

/// History storage errors.
#[derive(Debug, Error)]
pub enum HistoryError {
    /// Execution not found.
    #[error("Execution not found: {0}")]
    NotFound(String),

    /// Serialization error.
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Backend-specific failure.
    #[error("Storage error: {0}")]
    Storage(String),
}

impl From<serde_json::Error> for HistoryError {
    fn from(e: serde_json::Error) -> Self {
        HistoryError::Serialization(e.to_string())
    }
}

/// Errors raised by an agent capability.
#[derive(Debug, Error)]
pub enum AgentError {
    /// The model provider call failed.
    #[error("Provider error: {0}")]
    Provider(String),

    /// The generated output did not satisfy the requested schema.
    #[error("Output validation failed: {0}")]
    Validation(String),

    /// The call was aborted.
    #[error("Agent call aborted")]
    Aborted,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_history_error_display() {
        let err = HistoryError::NotFound("exec-1".to_string());
        assert!(err.to_string().contains("exec-1"));

        let err = HistoryError::Storage("disk full".to_string());
        assert!(err.to_string().contains("disk full"));
    }

    #[test]
    fn test_history_error_from_json() {
        let json_err = serde_json::from_str::<serde_json::Value>("{broken").unwrap_err();
        let err = HistoryError::from(json_err);
        assert!(matches!(err, HistoryError::Serialization(_)));
    }

    #[test]
    fn test_history_error_from_io() {
        let io_err = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied");
        let err = HistoryError::from(io_err);
        assert!(err.to_string().contains("denied"));
    }

    #[test]
    fn test_agent_error_display() {
        assert_eq!(AgentError::Aborted.to_string(), "Agent call aborted");
        let err = AgentError::Validation("missing field `title`".to_string());
        assert!(err.to_string().contains("title"));
    }
}
