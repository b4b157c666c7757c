//! Configuration loading and validation.
//!
//! All settings live in one TOML file with per-component sections;
//! every field has a default so a missing file or empty section still
//! yields a runnable configuration. Credentials are referenced by
//! environment variable name, never stored in the file.

use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;
use tracing::{debug, info};

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    FileRead(#[from] std::io::Error),

    #[error("failed to parse config file: {0}")]
    TomlParse(#[from] toml::de::Error),

    #[error("invalid configuration: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct AppConfig {
    #[serde(default)]
    pub processing: ProcessingSection,
    #[serde(default)]
    pub broker: BrokerSection,
    #[serde(default)]
    pub coordinator: CoordinatorSection,
    #[serde(default)]
    pub worker: WorkerSection,
}

/// Defaults applied when flags and config are both silent.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ProcessingSection {
    #[serde(default = "default_delimiter")]
    pub delimiter: String,
    /// Field spec in cut syntax, e.g. `"1,3-5,7"`.
    #[serde(default)]
    pub fields: String,
    #[serde(default)]
    pub suppress: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BrokerSection {
    #[serde(default = "default_broker_url")]
    pub broker_url: String,
    /// Name of the environment variable holding the username.
    #[serde(default)]
    pub username_env: Option<String>,
    /// Name of the environment variable holding the password.
    #[serde(default)]
    pub password_env: Option<String>,
    /// Maximum in-flight unacknowledged messages per consumer.
    #[serde(default = "default_prefetch")]
    pub prefetch: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CoordinatorSection {
    #[serde(default = "default_chunk_size")]
    pub chunk_size_bytes: usize,
    #[serde(default = "default_quorum_size")]
    pub quorum_size: usize,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct WorkerSection {
    /// Stable worker identity; generated per process when unset.
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default = "default_threads")]
    pub threads: usize,
}

fn default_delimiter() -> String {
    ",".to_string()
}

fn default_broker_url() -> String {
    "mqtt://localhost:1883".to_string()
}

fn default_prefetch() -> usize {
    10
}

fn default_chunk_size() -> usize {
    64 * 1024
}

fn default_quorum_size() -> usize {
    1
}

fn default_timeout_secs() -> u64 {
    30
}

fn default_threads() -> usize {
    4
}

impl Default for ProcessingSection {
    fn default() -> Self {
        ProcessingSection {
            delimiter: default_delimiter(),
            fields: String::new(),
            suppress: false,
        }
    }
}

impl Default for BrokerSection {
    fn default() -> Self {
        BrokerSection {
            broker_url: default_broker_url(),
            username_env: None,
            password_env: None,
            prefetch: default_prefetch(),
        }
    }
}

impl Default for CoordinatorSection {
    fn default() -> Self {
        CoordinatorSection {
            chunk_size_bytes: default_chunk_size(),
            quorum_size: default_quorum_size(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

impl Default for WorkerSection {
    fn default() -> Self {
        WorkerSection {
            id: None,
            threads: default_threads(),
        }
    }
}

impl AppConfig {
    pub fn load_from_file(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)?;
        let config: AppConfig = toml::from_str(&contents)?;
        config.validate()?;
        info!(path = %path.display(), "loaded configuration");
        Ok(config)
    }

    /// Load from an explicit path, or the first default location found,
    /// falling back to built-in defaults when no file exists.
    pub fn load(explicit_path: Option<&Path>) -> Result<Self, ConfigError> {
        if let Some(path) = explicit_path {
            return Self::load_from_file(path);
        }

        for candidate in Self::default_paths() {
            let path = Path::new(candidate);
            if path.exists() {
                return Self::load_from_file(path);
            }
        }

        debug!("no config file found, using defaults");
        Ok(AppConfig::default())
    }

    fn default_paths() -> &'static [&'static str] {
        &["linecut.toml", "config/linecut.toml"]
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.processing.delimiter.is_empty() {
            return Err(ConfigError::Invalid("delimiter must not be empty".into()));
        }
        if self.broker.prefetch == 0 {
            return Err(ConfigError::Invalid("broker.prefetch must be >= 1".into()));
        }
        if self.coordinator.chunk_size_bytes == 0 {
            return Err(ConfigError::Invalid(
                "coordinator.chunk_size_bytes must be >= 1".into(),
            ));
        }
        if self.coordinator.quorum_size == 0 {
            return Err(ConfigError::Invalid(
                "coordinator.quorum_size must be >= 1".into(),
            ));
        }
        if self.coordinator.timeout_secs == 0 {
            return Err(ConfigError::Invalid(
                "coordinator.timeout_secs must be >= 1".into(),
            ));
        }
        if self.worker.threads == 0 {
            return Err(ConfigError::Invalid("worker.threads must be >= 1".into()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_defaults_are_valid() {
        let config = AppConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.processing.delimiter, ",");
        assert_eq!(config.broker.broker_url, "mqtt://localhost:1883");
        assert_eq!(config.broker.prefetch, 10);
        assert_eq!(config.coordinator.chunk_size_bytes, 64 * 1024);
        assert_eq!(config.coordinator.timeout_secs, 30);
        assert_eq!(config.worker.threads, 4);
        assert!(config.worker.id.is_none());
    }

    #[test]
    fn test_load_from_file() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"
[processing]
delimiter = "|"
fields = "1,3-5"

[broker]
broker_url = "mqtts://broker.example.com:8883"
username_env = "LINECUT_USER"
prefetch = 25

[coordinator]
chunk_size_bytes = 4096
timeout_secs = 60

[worker]
id = "worker-a"
threads = 8
"#
        )
        .unwrap();

        let config = AppConfig::load_from_file(file.path()).unwrap();
        assert_eq!(config.processing.delimiter, "|");
        assert_eq!(config.processing.fields, "1,3-5");
        assert_eq!(config.broker.broker_url, "mqtts://broker.example.com:8883");
        assert_eq!(config.broker.username_env.as_deref(), Some("LINECUT_USER"));
        assert_eq!(config.broker.prefetch, 25);
        assert_eq!(config.coordinator.chunk_size_bytes, 4096);
        assert_eq!(config.coordinator.quorum_size, 1);
        assert_eq!(config.worker.id.as_deref(), Some("worker-a"));
        assert_eq!(config.worker.threads, 8);
    }

    #[test]
    fn test_partial_file_gets_defaults() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "[worker]\nthreads = 2").unwrap();

        let config = AppConfig::load_from_file(file.path()).unwrap();
        assert_eq!(config.worker.threads, 2);
        assert_eq!(config.processing.delimiter, ",");
        assert_eq!(config.broker.prefetch, 10);
    }

    #[test]
    fn test_invalid_values_rejected() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "[worker]\nthreads = 0").unwrap();

        let result = AppConfig::load_from_file(file.path());
        assert!(matches!(result, Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn test_malformed_toml_rejected() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "not valid toml [").unwrap();

        let result = AppConfig::load_from_file(file.path());
        assert!(matches!(result, Err(ConfigError::TomlParse(_))));
    }

    #[test]
    fn test_missing_file_is_an_error_when_explicit() {
        let result = AppConfig::load(Some(Path::new("/nonexistent/linecut.toml")));
        assert!(matches!(result, Err(ConfigError::FileRead(_))));
    }
}
