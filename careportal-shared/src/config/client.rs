use serde::{Deserialize, Serialize};
use std::{env, fs, path::PathBuf, time::Duration};
use thiserror::Error;
use url::Url;

/// Errors raised while resolving the client configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read configuration file: {0}")]
    Io(#[from] std::io::Error),
    #[error("invalid YAML configuration: {0}")]
    Yaml(#[from] serde_yml::Error),
    #[error("invalid JSON configuration: {0}")]
    Json(#[from] serde_json::Error),
    #[error("Unsupported configuration format. Use 'yaml' or 'json'.")]
    UnsupportedFormat,
    #[error("Invalid {name} value: {reason}")]
    InvalidEnv { name: &'static str, reason: String },
    #[error("{0}")]
    Invalid(String),
}

/// The main configuration structure for the CarePortal messaging client
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(default)]
pub struct Config {
    /// Base URL of the portal REST API (e.g. `http://localhost:3000/api`)
    pub api_base_url: String,

    /// Interval between poll ticks, in milliseconds
    pub poll_interval_ms: u64,

    /// Per-request timeout applied by the HTTP gateway, in seconds
    pub request_timeout_secs: u64,

    /// Number of messages loaded when a thread is opened or paged back
    pub page_size: u32,

    /// Number of messages re-fetched on every poll tick
    pub poll_page_size: u32,

    /// Logging level used when `RUST_LOG` is not set
    pub log_level: String,
}

impl Default for Config {
    fn default() -> Self {
        Self::with_defaults()
    }
}

const ENV_API_BASE_URL: &str = "CAREPORTAL_API_BASE_URL";
const ENV_POLL_INTERVAL_MS: &str = "CAREPORTAL_POLL_INTERVAL_MS";
const ENV_REQUEST_TIMEOUT_SECS: &str = "CAREPORTAL_REQUEST_TIMEOUT_SECS";
const ENV_PAGE_SIZE: &str = "CAREPORTAL_PAGE_SIZE";
const ENV_LOG_LEVEL: &str = "CAREPORTAL_LOG_LEVEL";

const MAX_PAGE_SIZE: u32 = 100;

impl Config {
    /// Generates a default configuration.
    #[must_use]
    pub fn with_defaults() -> Self {
        Self {
            api_base_url: "http://localhost:3000/api".to_string(),
            poll_interval_ms: 4000,
            request_timeout_secs: 15,
            page_size: 20,
            poll_page_size: 50,
            log_level: "info".to_string(),
        }
    }

    /// Loads the configuration from a file, environment variables, or defaults.
    ///
    /// File values win over environment variables; environment variables only
    /// fill in settings the file left at their defaults. `base_url_override`
    /// (the CLI `--server` flag) wins over both.
    ///
    /// # Errors
    /// Returns an error if the file cannot be read or parsed, an environment
    /// variable is malformed, or the resolved configuration fails validation.
    pub fn load_config(
        config_path: Option<PathBuf>,
        base_url_override: Option<&str>,
    ) -> Result<Self, ConfigError> {
        let defaults = Self::with_defaults();
        let mut config = match config_path {
            Some(path) => {
                let content = fs::read_to_string(&path)?;
                match path.extension().and_then(|ext| ext.to_str()) {
                    Some("yaml" | "yml") => serde_yml::from_str(&content)?,
                    Some("json") => serde_json::from_str(&content)?,
                    _ => return Err(ConfigError::UnsupportedFormat),
                }
            }
            None => defaults.clone(),
        };

        if config.api_base_url == defaults.api_base_url
            && let Ok(url) = env::var(ENV_API_BASE_URL)
        {
            config.api_base_url = url;
        }
        if config.poll_interval_ms == defaults.poll_interval_ms
            && let Ok(value) = env::var(ENV_POLL_INTERVAL_MS)
        {
            config.poll_interval_ms = parse_env(ENV_POLL_INTERVAL_MS, &value)?;
        }
        if config.request_timeout_secs == defaults.request_timeout_secs
            && let Ok(value) = env::var(ENV_REQUEST_TIMEOUT_SECS)
        {
            config.request_timeout_secs = parse_env(ENV_REQUEST_TIMEOUT_SECS, &value)?;
        }
        if config.page_size == defaults.page_size
            && let Ok(value) = env::var(ENV_PAGE_SIZE)
        {
            config.page_size = parse_env(ENV_PAGE_SIZE, &value)?;
        }
        if config.log_level == defaults.log_level
            && let Ok(level) = env::var(ENV_LOG_LEVEL)
        {
            config.log_level = level;
        }

        if let Some(url) = base_url_override {
            config.api_base_url = url.to_string();
        }

        config.validate().map_err(|errors| ConfigError::Invalid(errors.join("; ")))?;
        Ok(config)
    }

    /// Validate the resolved configuration.
    ///
    /// # Errors
    /// Returns every problem found, one message per setting.
    pub fn validate(&self) -> Result<(), Vec<String>> {
        let mut errors = Vec::new();

        match Url::parse(&self.api_base_url) {
            Ok(url) if matches!(url.scheme(), "http" | "https") => {}
            Ok(url) => errors.push(format!(
                "Unsupported API base URL scheme '{}'. Use http or https.",
                url.scheme()
            )),
            Err(err) => errors.push(format!(
                "Invalid API base URL '{}': {err}",
                self.api_base_url
            )),
        }

        if self.poll_interval_ms == 0 {
            errors.push("Invalid poll interval. Must be greater than 0.".to_string());
        }
        if self.request_timeout_secs == 0 {
            errors.push("Invalid request timeout. Must be greater than 0.".to_string());
        }
        for (name, value) in [
            ("page size", self.page_size),
            ("poll page size", self.poll_page_size),
        ] {
            if value == 0 || value > MAX_PAGE_SIZE {
                errors.push(format!(
                    "Invalid {name}. Must be between 1 and {MAX_PAGE_SIZE}."
                ));
            }
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }

    #[must_use]
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    #[must_use]
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

fn parse_env<T: std::str::FromStr>(name: &'static str, value: &str) -> Result<T, ConfigError> {
    value.trim().parse().map_err(|_| ConfigError::InvalidEnv {
        name,
        reason: format!("'{value}' is not a valid number"),
    })
}
