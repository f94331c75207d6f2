//! Configuration management for resultscraper
//!
//! Configuration is loaded from `./config/resultscraper.toml` unless another
//! path is given on the command line. The `[payload]` section names the input
//! and output tables; `[http]`, `[retry]` and `[report]` are optional and fall
//! back to the values in the bundled template.

use serde::Deserialize;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

use crate::extractor::RetryPolicy;

/// Configuration file path relative to working directory
pub const CONFIG_PATH: &str = "./config/resultscraper.toml";

/// Default configuration file content, written by `--init`
pub const DEFAULT_CONFIG: &str = include_str!("../config/resultscraper.toml");

pub const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/96.0.4664.93 Safari/537.36";
pub const DEFAULT_ACCEPT_LANGUAGE: &str = "it-IT,it;q=0.9,en-US;q=0.8,en;q=0.7";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Configuration file not found at {0}")]
    FileNotFound(PathBuf),

    #[error("Failed to read configuration file: {0}")]
    IoError(#[from] io::Error),

    #[error("Failed to parse configuration file: {0}")]
    ParseError(#[from] toml::de::Error),

    #[error("Missing key in payload: '{field}'")]
    MissingKey { field: String },

    #[error("Configuration field '{field}' cannot be empty")]
    EmptyRequired { field: String },
}

/// Root configuration structure
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub payload: PayloadConfig,
    #[serde(default)]
    pub http: HttpConfig,
    #[serde(default)]
    pub retry: RetryConfig,
    #[serde(default)]
    pub report: ReportConfig,
}

/// The run payload as written in the file. Every key is optional at parse
/// time so that a missing one can be reported by name.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct PayloadConfig {
    pub csv_filename: Option<PathBuf>,
    pub output_csv_filename: Option<PathBuf>,
    pub random_sample: Option<bool>,
    pub sample_size: Option<usize>,
}

/// A payload with every required key present
#[derive(Debug, Clone, PartialEq)]
pub struct RunPayload {
    pub csv_filename: PathBuf,
    pub output_csv_filename: PathBuf,
    pub random_sample: bool,
    pub sample_size: usize,
}

impl PayloadConfig {
    /// Check that all four keys are present, in the order they are documented
    pub fn resolve(&self) -> Result<RunPayload, ConfigError> {
        let csv_filename = required(&self.csv_filename, "csv_filename")?;
        let output_csv_filename = required(&self.output_csv_filename, "output_csv_filename")?;
        let random_sample = self.random_sample.ok_or_else(|| missing("random_sample"))?;
        let sample_size = self.sample_size.ok_or_else(|| missing("sample_size"))?;

        Ok(RunPayload {
            csv_filename,
            output_csv_filename,
            random_sample,
            sample_size,
        })
    }
}

fn missing(field: &str) -> ConfigError {
    ConfigError::MissingKey { field: field.to_string() }
}

fn required(value: &Option<PathBuf>, field: &str) -> Result<PathBuf, ConfigError> {
    let value = value.as_ref().ok_or_else(|| missing(field))?;
    if value.to_string_lossy().trim().is_empty() {
        return Err(ConfigError::EmptyRequired {
            field: format!("payload.{}", field),
        });
    }
    Ok(value.clone())
}

/// HTTP client configuration
#[derive(Debug, Clone, Deserialize)]
pub struct HttpConfig {
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
    #[serde(default = "default_accept_language")]
    pub accept_language: String,
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

fn default_user_agent() -> String {
    DEFAULT_USER_AGENT.to_string()
}

fn default_accept_language() -> String {
    DEFAULT_ACCEPT_LANGUAGE.to_string()
}

fn default_request_timeout_secs() -> u64 {
    15
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            user_agent: default_user_agent(),
            accept_language: default_accept_language(),
            request_timeout_secs: default_request_timeout_secs(),
        }
    }
}

impl HttpConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

/// Retry and throttle configuration
#[derive(Debug, Clone, Deserialize)]
pub struct RetryConfig {
    /// Additional attempts allowed after the first (403 and timeouts only)
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    /// Wait between attempts for the same URL (milliseconds)
    #[serde(default = "default_retry_delay_ms")]
    pub retry_delay_ms: u64,
    /// Wait between successive URLs (milliseconds)
    #[serde(default = "default_throttle_delay_ms")]
    pub throttle_delay_ms: u64,
}

fn default_max_retries() -> u32 {
    2
}

fn default_retry_delay_ms() -> u64 {
    5000
}

fn default_throttle_delay_ms() -> u64 {
    2000
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            retry_delay_ms: default_retry_delay_ms(),
            throttle_delay_ms: default_throttle_delay_ms(),
        }
    }
}

impl RetryConfig {
    pub fn policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_retries: self.max_retries,
            retry_delay: Duration::from_millis(self.retry_delay_ms),
        }
    }

    pub fn throttle_delay(&self) -> Duration {
        Duration::from_millis(self.throttle_delay_ms)
    }
}

/// Run report configuration
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ReportConfig {
    /// Write the batch summary as JSON to this path
    #[serde(default)]
    pub summary_json: Option<String>,
}

impl AppConfig {
    /// Load configuration from the default path
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from_path(Path::new(CONFIG_PATH))
    }

    /// Load configuration from a specific path
    pub fn load_from_path(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            return Err(ConfigError::FileNotFound(path.to_path_buf()));
        }

        let content = fs::read_to_string(path)?;
        let config: AppConfig = toml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate the HTTP section. Payload keys are checked separately by
    /// `PayloadConfig::resolve` so that command-line overrides can fill them.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.http.user_agent.trim().is_empty() {
            return Err(ConfigError::EmptyRequired {
                field: "http.user_agent".to_string(),
            });
        }
        if self.http.accept_language.trim().is_empty() {
            return Err(ConfigError::EmptyRequired {
                field: "http.accept_language".to_string(),
            });
        }
        if self.http.request_timeout_secs == 0 {
            return Err(ConfigError::EmptyRequired {
                field: "http.request_timeout_secs".to_string(),
            });
        }
        Ok(())
    }

    /// Write the default configuration template to `path`
    pub fn create_default_config(path: &Path) -> Result<PathBuf, ConfigError> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        fs::write(path, DEFAULT_CONFIG)?;
        Ok(path.to_path_buf())
    }
}
