//! Configuration validation.

use crate::schema::{Config, HistoryBackend};

/// Validation result.
#[derive(Debug, Default)]
pub struct ValidationResult {
    pub errors: Vec<ValidationError>,
    pub warnings: Vec<ValidationWarning>,
}

impl ValidationResult {
    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn add_error(&mut self, error: ValidationError) {
        self.errors.push(error);
    }

    pub fn add_warning(&mut self, warning: ValidationWarning) {
        self.warnings.push(warning);
    }
}

/// A validation error.
#[derive(Debug)]
pub struct ValidationError {
    pub path: String,
    pub message: String,
}

impl ValidationError {
    pub fn new(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            message: message.into(),
        }
    }
}

/// A validation warning.
#[derive(Debug)]
pub struct ValidationWarning {
    pub path: String,
    pub message: String,
}

impl ValidationWarning {
    pub fn new(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            message: message.into(),
        }
    }
}

/// Queues smaller than this drop history under ordinary load.
const SMALL_QUEUE_THRESHOLD: usize = 16;

const LOG_LEVELS: [&str; 5] = ["trace", "debug", "info", "warn", "error"];

/// Configuration validator.
pub struct ConfigValidator;

impl ConfigValidator {
    /// Validate the configuration.
    pub fn validate(config: &Config) -> ValidationResult {
        let mut result = ValidationResult::default();

        Self::validate_registry(config, &mut result);
        Self::validate_history(config, &mut result);
        Self::validate_logging(config, &mut result);

        result
    }

    fn validate_registry(config: &Config, result: &mut ValidationResult) {
        if config.registry.event_queue_capacity == 0 {
            result.add_error(ValidationError::new(
                "registry.event_queue_capacity",
                "event_queue_capacity must be greater than 0",
            ));
        } else if config.registry.event_queue_capacity < SMALL_QUEUE_THRESHOLD {
            result.add_warning(ValidationWarning::new(
                "registry.event_queue_capacity",
                format!(
                    "event_queue_capacity is very small (<{}), history records may be dropped",
                    SMALL_QUEUE_THRESHOLD
                ),
            ));
        }

        // tokio's broadcast channel panics on a zero capacity
        if config.registry.notification_capacity == 0 {
            result.add_error(ValidationError::new(
                "registry.notification_capacity",
                "notification_capacity must be greater than 0",
            ));
        }
    }

    fn validate_history(config: &Config, result: &mut ValidationResult) {
        if config.history.backend == HistoryBackend::File
            && config.history.path.as_os_str().is_empty()
        {
            result.add_error(ValidationError::new(
                "history.path",
                "File history backend requires a path",
            ));
        }
    }

    fn validate_logging(config: &Config, result: &mut ValidationResult) {
        let level = config.logging.level.trim();
        if level.is_empty() {
            result.add_error(ValidationError::new(
                "logging.level",
                "Log level cannot be empty",
            ));
        } else if !level.contains('=') && !LOG_LEVELS.contains(&level) {
            result.add_warning(ValidationWarning::new(
                "logging.level",
                format!("Unknown log level '{}', valid values: {:?}", level, LOG_LEVELS),
            ));
        }
    }
}

#[cfg(test)]
#[path = "validator_tests.rs"]
mod tests;
