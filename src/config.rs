//! Migration configuration.
//!
//! All paths and endpoints the orchestrator touches live in an explicit
//! `MigrationConfig` passed in at construction, never in global constants.
//! Defaults target the public visual-coding archive this tool was built to
//! migrate; every field can be overridden via environment variables or the
//! CLI.

use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

/// Environment variable holding the registry write credential.
///
/// Its absence is a fatal precondition failure for any publish-capable
/// invocation, checked at startup rather than per session.
pub const REGISTRY_API_KEY_VAR: &str = "REGISTRY_API_KEY";

/// Errors that can occur during configuration operations.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// A required environment variable is missing.
    #[error("Missing environment variable: {0}")]
    MissingEnvVar(String),

    /// An environment variable has an invalid value.
    #[error("Invalid value for {key}: {message}")]
    InvalidValue { key: String, message: String },

    /// Configuration validation failed.
    #[error("Configuration validation failed: {0}")]
    ValidationFailed(String),
}

/// Configuration for the batch migration orchestrator.
#[derive(Debug, Clone)]
pub struct MigrationConfig {
    // Local filesystem
    /// Base directory under which per-session workspaces are created.
    pub base_dir: PathBuf,

    // Execution settings
    /// Number of sessions migrated concurrently.
    pub concurrency: usize,

    // Remote endpoints
    /// Base URL of the dataset registry API.
    pub registry_url: String,
    /// Registry namespace (dataset id) that receives published artifacts.
    pub dataset_id: String,
    /// Base URL of the read-only blob store holding legacy source files.
    pub blob_url: String,

    // Naming conventions
    /// Remote key templates for a session's source files; `{session}` is
    /// substituted with the session id. One or two entries.
    pub input_templates: Vec<String>,
    /// Substring that separates the registry's two asset classes: assets
    /// containing the marker enumerate the session universe, assets without
    /// it are completed migrations.
    pub class_marker: String,

    // Pause control
    /// Sentinel file path; while it exists, no new pipeline step starts.
    pub pause_file: Option<PathBuf>,
    /// Interval between pause-sentinel polls.
    pub pause_poll: Duration,

    // Network policy
    /// Bound applied to every registry and blob-store request.
    pub http_timeout: Duration,
}

impl Default for MigrationConfig {
    fn default() -> Self {
        Self {
            base_dir: PathBuf::from("./visual_coding"),
            concurrency: 2,
            registry_url: "https://api.dandiarchive.org/api".to_string(),
            dataset_id: "000728".to_string(),
            blob_url: "https://allen-brain-observatory.s3.us-west-2.amazonaws.com/visual-coding-2p"
                .to_string(),
            input_templates: vec![
                "ophys_experiment_data/{session}.nwb".to_string(),
                "ophys_movies/ophys_experiment_{session}.h5".to_string(),
            ],
            class_marker: "behavior".to_string(),
            pause_file: None,
            pause_poll: Duration::from_secs(60),
            http_timeout: Duration::from_secs(300),
        }
    }
}

impl MigrationConfig {
    /// Creates a new configuration with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates configuration from environment variables.
    ///
    /// # Environment Variables
    ///
    /// - `SESSIONFORGE_BASE_DIR`: workspace base directory
    /// - `SESSIONFORGE_CONCURRENCY`: concurrent sessions (default: 2)
    /// - `SESSIONFORGE_REGISTRY_URL`: registry API base URL
    /// - `SESSIONFORGE_DATASET_ID`: registry dataset namespace
    /// - `SESSIONFORGE_BLOB_URL`: blob store base URL
    /// - `SESSIONFORGE_INPUT_TEMPLATES`: comma-separated source key templates
    /// - `SESSIONFORGE_CLASS_MARKER`: asset-class marker substring
    /// - `SESSIONFORGE_PAUSE_FILE`: pause sentinel path (unset disables)
    /// - `SESSIONFORGE_PAUSE_POLL_SECS`: pause poll interval (default: 60)
    /// - `SESSIONFORGE_HTTP_TIMEOUT_SECS`: network timeout (default: 300)
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if a variable has an invalid value.
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut config = Self::default();

        if let Ok(dir) = std::env::var("SESSIONFORGE_BASE_DIR") {
            config.base_dir = PathBuf::from(dir);
        }
        if let Ok(value) = std::env::var("SESSIONFORGE_CONCURRENCY") {
            config.concurrency = parse_var("SESSIONFORGE_CONCURRENCY", &value)?;
        }
        if let Ok(url) = std::env::var("SESSIONFORGE_REGISTRY_URL") {
            config.registry_url = url;
        }
        if let Ok(id) = std::env::var("SESSIONFORGE_DATASET_ID") {
            config.dataset_id = id;
        }
        if let Ok(url) = std::env::var("SESSIONFORGE_BLOB_URL") {
            config.blob_url = url;
        }
        if let Ok(templates) = std::env::var("SESSIONFORGE_INPUT_TEMPLATES") {
            config.input_templates = templates
                .split(',')
                .map(|t| t.trim().to_string())
                .filter(|t| !t.is_empty())
                .collect();
        }
        if let Ok(marker) = std::env::var("SESSIONFORGE_CLASS_MARKER") {
            config.class_marker = marker;
        }
        if let Ok(path) = std::env::var("SESSIONFORGE_PAUSE_FILE") {
            config.pause_file = Some(PathBuf::from(path));
        }
        if let Ok(value) = std::env::var("SESSIONFORGE_PAUSE_POLL_SECS") {
            config.pause_poll = Duration::from_secs(parse_var("SESSIONFORGE_PAUSE_POLL_SECS", &value)?);
        }
        if let Ok(value) = std::env::var("SESSIONFORGE_HTTP_TIMEOUT_SECS") {
            config.http_timeout =
                Duration::from_secs(parse_var("SESSIONFORGE_HTTP_TIMEOUT_SECS", &value)?);
        }

        Ok(config)
    }

    /// Validates the configuration.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::ValidationFailed` if any setting is unusable.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.base_dir.as_os_str().is_empty() {
            return Err(ConfigError::ValidationFailed(
                "base_dir must not be empty".to_string(),
            ));
        }
        if self.concurrency == 0 {
            return Err(ConfigError::ValidationFailed(
                "concurrency must be at least 1".to_string(),
            ));
        }
        if self.input_templates.is_empty() {
            return Err(ConfigError::ValidationFailed(
                "at least one input template is required".to_string(),
            ));
        }
        for template in &self.input_templates {
            if !template.contains("{session}") {
                return Err(ConfigError::ValidationFailed(format!(
                    "input template '{template}' does not contain '{{session}}'"
                )));
            }
        }
        if self.registry_url.is_empty() || self.blob_url.is_empty() {
            return Err(ConfigError::ValidationFailed(
                "registry_url and blob_url must not be empty".to_string(),
            ));
        }
        if self.http_timeout.is_zero() {
            return Err(ConfigError::ValidationFailed(
                "http_timeout must be non-zero".to_string(),
            ));
        }
        Ok(())
    }

    /// Reads the registry write credential from the environment.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::MissingEnvVar` if the credential is absent.
    pub fn require_credential(&self) -> Result<String, ConfigError> {
        std::env::var(REGISTRY_API_KEY_VAR)
            .map_err(|_| ConfigError::MissingEnvVar(REGISTRY_API_KEY_VAR.to_string()))
    }
}

fn parse_var<T: std::str::FromStr>(key: &str, value: &str) -> Result<T, ConfigError>
where
    T::Err: std::fmt::Display,
{
    value.parse().map_err(|e: T::Err| ConfigError::InvalidValue {
        key: key.to_string(),
        message: e.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = MigrationConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.input_templates.len(), 2);
    }

    #[test]
    fn test_validate_rejects_zero_concurrency() {
        let config = MigrationConfig {
            concurrency: 0,
            ..Default::default()
        };
        assert!(matches!(
            config.validate(),
            Err(ConfigError::ValidationFailed(_))
        ));
    }

    #[test]
    fn test_validate_rejects_template_without_placeholder() {
        let config = MigrationConfig {
            input_templates: vec!["fixed_name.nwb".to_string()],
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_empty_templates() {
        let config = MigrationConfig {
            input_templates: Vec::new(),
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_parse_var_reports_key() {
        let err = parse_var::<usize>("SESSIONFORGE_CONCURRENCY", "lots").unwrap_err();
        assert!(err.to_string().contains("SESSIONFORGE_CONCURRENCY"));
    }
}
