//! Runtime configuration.
//!
//! Loaded from YAML, then overridden from the environment:
//!
//! ```yaml
//! data_root: "/var/lib/relay"
//! retry:
//!   max_attempts: 5
//!   attempt_timeout_secs: 120
//! logging:
//!   capacity: 1000
//!   export_limit: 10000
//!   flush_interval_secs: 30
//!   level: info
//! quality:
//!   min_score: 0.7
//! collaborators:
//!   content:
//!     base_url: "${ANTHROPIC_BASE_URL}"
//!     api_key_env: ANTHROPIC_API_KEY
//!     model: claude-3-5-sonnet-latest
//!   assets:
//!     base_url: "http://localhost:8700"
//!     api_key_env: RELAY_ASSETS_API_KEY
//!   pricing:
//!     base_url: "http://localhost:8800"
//!     api_key_env: RELAY_PRICING_API_KEY
//! ```
//!
//! `${VAR}` references in the file are expanded from the environment.
//! `RELAY_DATA_ROOT`, `RELAY_MAX_ATTEMPTS` and `RELAY_LOG_LEVEL` override the file.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::RelayError;
use crate::retry::RetryPolicy;
use crate::telemetry::LogLevel;

pub const ENV_DATA_ROOT: &str = "RELAY_DATA_ROOT";
pub const ENV_MAX_ATTEMPTS: &str = "RELAY_MAX_ATTEMPTS";
pub const ENV_LOG_LEVEL: &str = "RELAY_LOG_LEVEL";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RelayConfig {
    pub data_root: PathBuf,
    pub retry: RetryConfig,
    pub logging: LoggingConfig,
    pub quality: QualityConfig,
    pub collaborators: CollaboratorsConfig,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            data_root: default_data_root(),
            retry: RetryConfig::default(),
            logging: LoggingConfig::default(),
            quality: QualityConfig::default(),
            collaborators: CollaboratorsConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    pub max_attempts: u32,
    /// 0 disables the per-attempt timeout
    pub attempt_timeout_secs: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            attempt_timeout_secs: 120,
        }
    }
}

impl RetryConfig {
    pub fn policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.max_attempts,
            attempt_timeout: (self.attempt_timeout_secs > 0)
                .then(|| Duration::from_secs(self.attempt_timeout_secs)),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub capacity: usize,
    pub export_limit: usize,
    pub flush_interval_secs: u64,
    pub level: LogLevel,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            capacity: 1000,
            export_limit: 10_000,
            flush_interval_secs: 30,
            level: LogLevel::Info,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct QualityConfig {
    pub min_score: f64,
}

impl Default for QualityConfig {
    fn default() -> Self {
        Self { min_score: 0.7 }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CollaboratorsConfig {
    pub content: ContentGeneratorConfig,
    pub assets: EndpointConfig,
    pub pricing: Option<EndpointConfig>,
}

impl Default for CollaboratorsConfig {
    fn default() -> Self {
        Self {
            content: ContentGeneratorConfig::default(),
            assets: EndpointConfig {
                base_url: "http://localhost:8700".to_string(),
                api_key_env: "RELAY_ASSETS_API_KEY".to_string(),
            },
            pricing: None,
        }
    }
}

/// Anthropic-compatible messages endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ContentGeneratorConfig {
    pub base_url: String,
    /// Name of the environment variable holding the API key
    pub api_key_env: String,
    pub model: String,
    pub max_tokens: u32,
    pub temperature: Option<f64>,
}

impl Default for ContentGeneratorConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.anthropic.com".to_string(),
            api_key_env: "ANTHROPIC_API_KEY".to_string(),
            model: "claude-3-5-sonnet-latest".to_string(),
            max_tokens: 4096,
            temperature: None,
        }
    }
}

/// Plain JSON HTTP endpoint with bearer auth.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EndpointConfig {
    pub base_url: String,
    /// Name of the environment variable holding the API key
    pub api_key_env: String,
}

fn default_data_root() -> PathBuf {
    dirs::home_dir()
        .map(|home| home.join(".relay"))
        .unwrap_or_else(|| PathBuf::from(".relay"))
}

impl RelayConfig {
    /// Parse a YAML document, expanding `${VAR}` references via `lookup`.
    pub fn from_yaml_with<F>(yaml: &str, lookup: F) -> Result<Self, RelayError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let expanded = expand_env_refs(yaml, &lookup);
        serde_yaml::from_str(&expanded)
            .map_err(|e| RelayError::Configuration(format!("Failed to parse config YAML: {}", e)))
    }

    pub fn from_yaml(yaml: &str) -> Result<Self, RelayError> {
        Self::from_yaml_with(yaml, |k| std::env::var(k).ok())
    }

    /// Load from `path` (or `<data_root>/config.yaml` if present), apply
    /// environment overrides and validate.
    pub fn load(path: Option<&Path>) -> Result<Self, RelayError> {
        let mut config = match path {
            Some(path) => {
                let content = std::fs::read_to_string(path).map_err(|e| {
                    RelayError::Configuration(format!(
                        "Failed to read config file '{}': {}",
                        path.display(),
                        e
                    ))
                })?;
                Self::from_yaml(&content)?
            }
            None => {
                let default_path = default_data_root().join("config.yaml");
                if default_path.exists() {
                    let content = std::fs::read_to_string(&default_path)?;
                    Self::from_yaml(&content)?
                } else {
                    Self::default()
                }
            }
        };
        config.apply_env_overrides(|k| std::env::var(k).ok())?;
        config.validate()?;
        Ok(config)
    }

    pub fn apply_env_overrides<F>(&mut self, lookup: F) -> Result<(), RelayError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(root) = lookup(ENV_DATA_ROOT).filter(|v| !v.is_empty()) {
            self.data_root = PathBuf::from(root);
        }
        if let Some(raw) = lookup(ENV_MAX_ATTEMPTS).filter(|v| !v.is_empty()) {
            self.retry.max_attempts = raw.trim().parse().map_err(|_| {
                RelayError::Configuration(format!("{} must be a positive integer, got '{}'", ENV_MAX_ATTEMPTS, raw))
            })?;
        }
        if let Some(raw) = lookup(ENV_LOG_LEVEL).filter(|v| !v.is_empty()) {
            self.logging.level = LogLevel::from_str(&raw).ok_or_else(|| {
                RelayError::Configuration(format!("{} must be debug|info|warn|error, got '{}'", ENV_LOG_LEVEL, raw))
            })?;
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<(), RelayError> {
        if self.retry.max_attempts < 1 {
            return Err(RelayError::Configuration(
                "retry.max_attempts must be at least 1".to_string(),
            ));
        }
        if self.logging.capacity == 0 || self.logging.export_limit == 0 {
            return Err(RelayError::Configuration(
                "logging.capacity and logging.export_limit must be positive".to_string(),
            ));
        }
        if self.logging.flush_interval_secs == 0 {
            return Err(RelayError::Configuration(
                "logging.flush_interval_secs must be positive".to_string(),
            ));
        }
        if !(0.0..=1.0).contains(&self.quality.min_score) {
            return Err(RelayError::Configuration(
                "quality.min_score must be between 0.0 and 1.0".to_string(),
            ));
        }
        Ok(())
    }

    pub fn db_path(&self) -> PathBuf {
        self.data_root.join("relay.db")
    }

    pub fn logs_dir(&self) -> PathBuf {
        self.data_root.join("logs")
    }

    pub fn traces_dir(&self) -> PathBuf {
        self.data_root.join("traces")
    }

    pub fn campaigns_dir(&self) -> PathBuf {
        self.data_root.join("campaigns")
    }
}

/// Replace `${VAR}` with its value; unknown variables become empty strings.
fn expand_env_refs<F>(input: &str, lookup: &F) -> String
where
    F: Fn(&str) -> Option<String>,
{
    let re = match regex::Regex::new(r"\$\{([A-Za-z_][A-Za-z0-9_]*)\}") {
        Ok(re) => re,
        Err(_) => return input.to_string(),
    };
    re.replace_all(input, |caps: &regex::Captures| {
        lookup(&caps[1]).unwrap_or_default()
    })
    .to_string()
}
