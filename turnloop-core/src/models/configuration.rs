//! Configuration data structures

use super::Transport;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Logging level configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum LogLevel {
    #[serde(rename = "error")]
    Error,
    #[serde(rename = "warn")]
    Warn,
    #[serde(rename = "info")]
    #[default]
    Info,
    #[serde(rename = "debug")]
    Debug,
    #[serde(rename = "trace")]
    Trace,
}

/// Retry behavior for transient transport failures
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Total attempts including the first one
    pub max_attempts: u32,
    /// Delay before the first retry in milliseconds
    pub initial_delay_ms: u64,
    /// Multiplier applied to the delay after every retry
    #[serde(default = "default_backoff_multiplier")]
    pub backoff_multiplier: f64,
    /// Upper bound for a single delay in milliseconds
    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,
}

fn default_backoff_multiplier() -> f64 {
    2.0
}

fn default_max_delay_ms() -> u64 {
    30_000
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5, // initial call + 4 retries
            initial_delay_ms: 1_000,
            backoff_multiplier: default_backoff_multiplier(),
            max_delay_ms: default_max_delay_ms(),
        }
    }
}

impl RetryPolicy {
    /// A policy with the default attempt budget and the given initial delay
    pub fn with_initial_delay(initial_delay: Duration) -> Self {
        Self {
            initial_delay_ms: initial_delay.as_millis() as u64,
            ..Self::default()
        }
    }

    /// Delay to wait before retry number `retry` (1-indexed)
    pub fn delay_for_retry(&self, retry: u32) -> Duration {
        if retry == 0 {
            return Duration::ZERO;
        }

        let exponent = i32::try_from(retry - 1).unwrap_or(i32::MAX);
        let delay_ms = self.initial_delay_ms as f64 * self.backoff_multiplier.powi(exponent);

        Duration::from_millis(delay_ms.min(self.max_delay_ms as f64) as u64)
    }
}

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Configuration {
    /// Base URL of the bot backend; `conversations[/{id}]` is resolved against it
    pub base_url: String,
    /// Wire transport for every turn
    #[serde(default)]
    pub transport: Transport,
    /// Extra request headers (e.g. authorization)
    #[serde(default)]
    pub headers: BTreeMap<String, String>,
    /// Ask the backend to emit its greeting when the conversation starts
    #[serde(default = "default_emit_start_conversation_event")]
    pub emit_start_conversation_event: bool,
    /// Logging verbosity level
    #[serde(default)]
    pub log_level: LogLevel,
    #[serde(default)]
    pub retry: RetryPolicy,
}

fn default_emit_start_conversation_event() -> bool {
    true
}

impl Default for Configuration {
    fn default() -> Self {
        Self {
            base_url: "http://127.0.0.1:8080/".to_string(),
            transport: Transport::Rest,
            headers: BTreeMap::new(),
            emit_start_conversation_event: true,
            log_level: LogLevel::Info,
            retry: RetryPolicy::default(),
        }
    }
}

impl Configuration {
    /// Load configuration from file
    pub fn load_from_file(path: &Path) -> Result<Self> {
        if path.exists() {
            let content = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read {}", path.display()))?;
            let config: Configuration = toml::from_str(&content)
                .with_context(|| format!("Failed to parse {}", path.display()))?;
            Ok(config)
        } else {
            // Return default configuration if file doesn't exist
            Ok(Configuration::default())
        }
    }

    /// Save configuration to file
    pub fn save_to_file(&self, path: &Path) -> Result<()> {
        let content = toml::to_string_pretty(self).context("Failed to serialize configuration")?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Get the XDG config directory path
    pub fn default_config_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir().context("Could not determine config directory")?;
        Ok(config_dir.join("turnloop").join("config.toml"))
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<(), Vec<String>> {
        let mut errors = Vec::new();

        match url::Url::parse(&self.base_url) {
            Ok(url) if url.cannot_be_a_base() => {
                errors.push(format!("base_url cannot be used as a base: {}", self.base_url));
            }
            Ok(url) if !matches!(url.scheme(), "http" | "https") => {
                errors.push(format!("base_url must use http or https: {}", self.base_url));
            }
            Ok(_) => {}
            Err(e) => errors.push(format!("base_url is invalid: {}", e)),
        }

        if self.retry.max_attempts == 0 {
            errors.push("retry.max_attempts must be at least 1".to_string());
        }

        if self.retry.max_attempts > 10 {
            errors.push("retry.max_attempts cannot exceed 10".to_string());
        }

        if self.retry.backoff_multiplier < 1.0 {
            errors.push("retry.backoff_multiplier must be at least 1.0".to_string());
        }

        for name in self.headers.keys() {
            if name.is_empty() || name.chars().any(|c| c.is_whitespace() || c == ':') {
                errors.push(format!("header name is invalid: {:?}", name));
            }
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}
