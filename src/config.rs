//! Configuration file handling.
//!
//! This module handles loading and merging configuration from
//! `.pcats.toml` files.

use anyhow::{Context, Result};
use pcats_client::{Backoff, ClientConfig, PollPolicy, DEFAULT_BASE_URL};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

use crate::cli::OutputFormat;

/// Default configuration file name.
pub const CONFIG_FILE: &str = ".pcats.toml";

/// Upper bound for every seconds value in the polling section (30 days).
pub const MAX_DELAY_SECONDS: f64 = 30.0 * 24.0 * 3600.0;

/// Root configuration structure.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Service connection settings.
    #[serde(default)]
    pub service: ServiceConfig,

    /// Polling settings.
    #[serde(default)]
    pub polling: PollingConfig,

    /// Output settings.
    #[serde(default)]
    pub output: OutputConfig,
}

/// Service connection settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceConfig {
    /// API base URL.
    #[serde(default = "default_url")]
    pub url: String,

    /// Bearer token. Prefer `PCATS_TOKEN` over storing it here.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,

    /// Timeout for a single HTTP request, uploads included.
    #[serde(default = "default_request_timeout")]
    pub request_timeout_seconds: u64,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            url: default_url(),
            token: None,
            request_timeout_seconds: default_request_timeout(),
        }
    }
}

fn default_url() -> String {
    DEFAULT_BASE_URL.to_string()
}

fn default_request_timeout() -> u64 {
    120
}

/// Delay growth between status polls.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PollStrategy {
    Fixed,
    #[default]
    Exponential,
}

/// Polling settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PollingConfig {
    #[serde(default)]
    pub strategy: PollStrategy,

    /// Fixed interval, or the first delay of the exponential schedule.
    #[serde(default = "default_interval")]
    pub interval_seconds: f64,

    #[serde(default = "default_multiplier")]
    pub multiplier: f64,

    #[serde(default = "default_max_interval")]
    pub max_interval_seconds: f64,

    /// Give up waiting after this long. The remote job keeps running.
    #[serde(default = "default_poll_timeout")]
    pub timeout_seconds: u64,

    /// First delay after a transient failure (doubles up to `retry_max_seconds`).
    #[serde(default = "default_retry_initial")]
    pub retry_initial_seconds: f64,

    #[serde(default = "default_retry_max")]
    pub retry_max_seconds: f64,
}

impl Default for PollingConfig {
    fn default() -> Self {
        Self {
            strategy: PollStrategy::default(),
            interval_seconds: default_interval(),
            multiplier: default_multiplier(),
            max_interval_seconds: default_max_interval(),
            timeout_seconds: default_poll_timeout(),
            retry_initial_seconds: default_retry_initial(),
            retry_max_seconds: default_retry_max(),
        }
    }
}

fn default_interval() -> f64 {
    2.0
}

fn default_multiplier() -> f64 {
    1.5
}

fn default_max_interval() -> f64 {
    30.0
}

fn default_poll_timeout() -> u64 {
    3600
}

fn default_retry_initial() -> f64 {
    1.0
}

fn default_retry_max() -> f64 {
    30.0
}

/// Output settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutputConfig {
    #[serde(default)]
    pub format: OutputFormat,

    /// Show a spinner while waiting for a job.
    #[serde(default = "default_true")]
    pub show_progress: bool,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            format: OutputFormat::default(),
            show_progress: true,
        }
    }
}

fn default_true() -> bool {
    true
}

impl Config {
    /// Load configuration from a file path.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: Config = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        config
            .validate()
            .with_context(|| format!("Invalid config file: {}", path.display()))?;

        Ok(config)
    }

    /// Try to load configuration from the default location.
    ///
    /// Returns `Ok(None)` if the file doesn't exist, `Err` if it exists but can't be parsed.
    pub fn load_default() -> Result<Option<Self>> {
        let default_path = Path::new(CONFIG_FILE);

        if default_path.exists() {
            Ok(Some(Self::load(default_path)?))
        } else {
            Ok(None)
        }
    }

    /// Check value ranges that serde cannot express.
    pub fn validate(&self) -> Result<()> {
        let p = &self.polling;
        for (name, value) in [
            ("interval_seconds", p.interval_seconds),
            ("max_interval_seconds", p.max_interval_seconds),
            ("retry_initial_seconds", p.retry_initial_seconds),
            ("retry_max_seconds", p.retry_max_seconds),
        ] {
            if !value.is_finite() || value > MAX_DELAY_SECONDS {
                anyhow::bail!(
                    "polling.{} must be a finite number of seconds up to {}",
                    name,
                    MAX_DELAY_SECONDS
                );
            }
        }
        if !(p.interval_seconds > 0.0) {
            anyhow::bail!("polling.interval_seconds must be positive");
        }
        if p.strategy == PollStrategy::Exponential && !(p.multiplier >= 1.0) {
            anyhow::bail!("polling.multiplier must be at least 1.0");
        }
        if !(p.max_interval_seconds >= p.interval_seconds) {
            anyhow::bail!("polling.max_interval_seconds must not be below interval_seconds");
        }
        if p.timeout_seconds == 0 {
            anyhow::bail!("polling.timeout_seconds must be at least 1");
        }
        if !(p.retry_initial_seconds > 0.0) || !(p.retry_max_seconds >= p.retry_initial_seconds) {
            anyhow::bail!("polling.retry_initial_seconds must be positive and not above retry_max_seconds");
        }
        if self.service.request_timeout_seconds == 0 {
            anyhow::bail!("service.request_timeout_seconds must be at least 1");
        }
        Ok(())
    }

    /// Merge this configuration with CLI arguments.
    ///
    /// CLI arguments take precedence over config file settings.
    /// This method only overrides config when CLI provides explicit values.
    pub fn merge_with_args(&mut self, args: &crate::cli::Args) {
        if let Some(ref url) = args.url {
            self.service.url = url.clone();
        }
        if let Some(ref token) = args.token {
            self.service.token = Some(token.clone());
        }

        if let Some(interval) = args.poll_interval {
            self.polling.interval_seconds = interval;
            if self.polling.max_interval_seconds < interval {
                self.polling.max_interval_seconds = interval;
            }
        }
        if args.fixed_interval {
            self.polling.strategy = PollStrategy::Fixed;
        }
        if let Some(timeout) = args.timeout {
            self.polling.timeout_seconds = timeout;
        }

        if let Some(format) = args.format {
            self.output.format = format;
        }

        // Flags always override
        if args.quiet {
            self.output.show_progress = false;
        }
    }

    /// Generate a default configuration file content.
    pub fn default_toml() -> String {
        let config = Config::default();
        toml::to_string_pretty(&config).unwrap_or_else(|_| String::new())
    }
}

impl From<&ServiceConfig> for ClientConfig {
    fn from(service: &ServiceConfig) -> Self {
        ClientConfig {
            base_url: service.url.clone(),
            token: service.token.clone(),
            request_timeout: Duration::from_secs(service.request_timeout_seconds),
        }
    }
}

impl From<&PollingConfig> for PollPolicy {
    fn from(polling: &PollingConfig) -> Self {
        let interval = Duration::from_secs_f64(polling.interval_seconds);
        let backoff = match polling.strategy {
            PollStrategy::Fixed => Backoff::Fixed { interval },
            PollStrategy::Exponential => Backoff::Exponential {
                initial: interval,
                multiplier: polling.multiplier,
                max: Duration::from_secs_f64(polling.max_interval_seconds),
            },
        };

        PollPolicy {
            backoff,
            timeout: Duration::from_secs(polling.timeout_seconds),
            retry_initial: Duration::from_secs_f64(polling.retry_initial_seconds),
            retry_max: Duration::from_secs_f64(polling.retry_max_seconds),
        }
    }
}
