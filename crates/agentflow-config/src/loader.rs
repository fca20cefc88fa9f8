//! Configuration loader.

use std::fs;
use std::path::Path;
use std::sync::LazyLock;

use regex::Regex;

use crate::error::ConfigError;
use crate::schema::Config;

static ENV_VAR_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\$\{([^}]+)\}").expect("env var pattern is a valid regex"));

/// Configuration loader with environment variable substitution.
pub struct ConfigLoader;

impl ConfigLoader {
    /// Load configuration from a TOML file.
    pub fn load(path: &Path) -> Result<Config, ConfigError> {
        if !path.exists() {
            return Err(ConfigError::NotFound(path.display().to_string()));
        }
        let content = fs::read_to_string(path)?;
        Self::load_str(&content)
    }

    /// Load configuration from a file if it exists, otherwise use defaults.
    pub fn load_or_default(path: &Path) -> Result<Config, ConfigError> {
        match Self::load(path) {
            Err(ConfigError::NotFound(_)) => Ok(Config::default()),
            other => other,
        }
    }

    /// Load configuration from a string.
    pub fn load_str(content: &str) -> Result<Config, ConfigError> {
        let expanded = Self::expand_env_vars(content)?;
        let mut config: Config = toml::from_str(&expanded)?;
        config.history.path = Self::expand_path(&config.history.path.to_string_lossy()).into();
        if let Some(dir) = config.logging.directory.take() {
            config.logging.directory = Some(Self::expand_path(&dir.to_string_lossy()).into());
        }
        Ok(config)
    }

    /// Expand environment variables in the format `${VAR}`.
    fn expand_env_vars(content: &str) -> Result<String, ConfigError> {
        let mut result = content.to_string();

        for cap in ENV_VAR_PATTERN.captures_iter(content) {
            let var_name = &cap[1];
            let var_value = std::env::var(var_name)
                .map_err(|_| ConfigError::EnvVarNotSet(var_name.to_string()))?;
            result = result.replace(&cap[0], &var_value);
        }

        Ok(result)
    }

    /// Expand shell-style paths (e.g., `~/.agentflow`).
    pub fn expand_path(path: &str) -> String {
        shellexpand::tilde(path).to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::HistoryBackend;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_load_empty_config() {
        let config = ConfigLoader::load_str("").unwrap();
        assert_eq!(config.registry.event_queue_capacity, 1024);
        assert_eq!(config.history.backend, HistoryBackend::Memory);
    }

    #[test]
    fn test_load_full_config() {
        let content = r#"
            [registry]
            event_queue_capacity = 64
            notification_capacity = 16

            [history]
            backend = "file"
            path = "/var/lib/agentflow"

            [logging]
            level = "debug"
            json = true
        "#;
        let config = ConfigLoader::load_str(content).unwrap();
        assert_eq!(config.registry.event_queue_capacity, 64);
        assert_eq!(config.registry.notification_capacity, 16);
        assert_eq!(config.history.backend, HistoryBackend::File);
        assert_eq!(config.history.path.to_string_lossy(), "/var/lib/agentflow");
        assert_eq!(config.logging.level, "debug");
        assert!(config.logging.json);
    }

    #[test]
    fn test_load_from_file() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "[registry]").unwrap();
        writeln!(file, "event_queue_capacity = 8").unwrap();

        let config = ConfigLoader::load(file.path()).unwrap();
        assert_eq!(config.registry.event_queue_capacity, 8);
    }

    #[test]
    fn test_load_nonexistent_file() {
        let result = ConfigLoader::load(Path::new("/nonexistent/path/agentflow.toml"));
        assert!(matches!(result, Err(ConfigError::NotFound(_))));
    }

    #[test]
    fn test_load_or_default_missing_file() {
        let config =
            ConfigLoader::load_or_default(Path::new("/nonexistent/path/agentflow.toml")).unwrap();
        assert_eq!(config.logging.level, "info");
    }

    #[test]
    fn test_load_invalid_toml() {
        let result = ConfigLoader::load_str("invalid = [unclosed");
        assert!(matches!(result, Err(ConfigError::TomlParse(_))));
    }

    #[test]
    fn test_unknown_backend_rejected() {
        let content = r#"
            [history]
            backend = "postgres"
        "#;
        assert!(ConfigLoader::load_str(content).is_err());
    }

    #[test]
    fn test_expand_env_vars() {
        // SAFETY: This test runs in isolation and sets a unique test-only env var
        unsafe {
            std::env::set_var("AGENTFLOW_TEST_HISTORY_DIR", "/tmp/agentflow-history");
        }
        let content = r#"
            [history]
            path = "${AGENTFLOW_TEST_HISTORY_DIR}"
        "#;
        let config = ConfigLoader::load_str(content).unwrap();
        assert_eq!(config.history.path.to_string_lossy(), "/tmp/agentflow-history");
        unsafe {
            std::env::remove_var("AGENTFLOW_TEST_HISTORY_DIR");
        }
    }

    #[test]
    fn test_expand_env_vars_not_set() {
        let content = "value = \"${NONEXISTENT_AGENTFLOW_VAR_12345}\"";
        let result = ConfigLoader::expand_env_vars(content);
        assert!(matches!(result, Err(ConfigError::EnvVarNotSet(_))));
    }

    #[test]
    fn test_expand_path_with_tilde() {
        let expanded = ConfigLoader::expand_path("~/history");
        assert!(!expanded.starts_with('~'));
        assert!(expanded.ends_with("/history"));
    }

    #[test]
    fn test_tilde_expanded_in_history_path() {
        let content = r#"
            [history]
            path = "~/agentflow-history"
        "#;
        let config = ConfigLoader::load_str(content).unwrap();
        assert!(!config.history.path.to_string_lossy().starts_with('~'));
    }
}
