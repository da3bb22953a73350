//! Configuration management
//!
//! Loads and validates configuration from a TOML file. Every field has a
//! default, so an empty file (or no file at all) is a valid configuration.

use anyhow::{Context, Result};
use serde::Deserialize;
use std::net::{Ipv4Addr, SocketAddr};
use std::path::Path;
use std::time::Duration;

use crate::metrics::{is_valid_name, DEFAULT_NAMESPACE, DEFAULT_PORT};

/// Root configuration structure
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub metrics: MetricsConfig,
    #[serde(default)]
    pub worker: WorkerConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Metrics endpoint configuration
#[derive(Debug, Clone, Deserialize)]
pub struct MetricsConfig {
    /// Serve the scrape endpoint
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Scrape endpoint bind address
    #[serde(default = "default_metrics_addr")]
    pub bind_addr: SocketAddr,
    /// Prefix for every metric name
    #[serde(default = "default_namespace")]
    pub namespace: String,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: default_true(),
            bind_addr: default_metrics_addr(),
            namespace: default_namespace(),
        }
    }
}

/// Background worker configuration
#[derive(Debug, Clone, Deserialize)]
pub struct WorkerConfig {
    /// Number of worker threads (0 = one per CPU)
    #[serde(default = "default_workers")]
    pub workers: usize,
    /// Iterations per worker before stopping (0 = run until shutdown)
    #[serde(default)]
    pub iterations: u64,
    /// Pause between iterations in milliseconds
    #[serde(default = "default_interval_ms")]
    pub interval_ms: u64,
    /// Keys are drawn from `0..key_space`; must be > 0
    #[serde(default = "default_key_space")]
    pub key_space: u32,
}

impl WorkerConfig {
    /// Get effective worker count (auto-detect if 0)
    pub fn effective_workers(&self) -> usize {
        if self.workers == 0 {
            num_cpus::get()
        } else {
            self.workers
        }
    }

    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            workers: default_workers(),
            iterations: 0,
            interval_ms: default_interval_ms(),
            key_space: default_key_space(),
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Log level
    #[serde(default = "default_log_level")]
    pub level: String,
    /// Output format: "json" or "pretty"
    #[serde(default = "default_log_format")]
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

// Default value functions
fn default_true() -> bool { true }
fn default_metrics_addr() -> SocketAddr { SocketAddr::from((Ipv4Addr::UNSPECIFIED, DEFAULT_PORT)) }
fn default_namespace() -> String { DEFAULT_NAMESPACE.to_string() }
fn default_workers() -> usize { 1 }
fn default_interval_ms() -> u64 { 100 }
fn default_key_space() -> u32 { 100 }
fn default_log_level() -> String { "info".to_string() }
fn default_log_format() -> String { "pretty".to_string() }

impl Config {
    /// Load configuration from a TOML file
    pub fn load(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {:?}", path))?;

        Self::parse(&contents)
    }

    /// Parse and validate configuration from TOML text
    pub fn parse(contents: &str) -> Result<Self> {
        let config: Config = toml::from_str(contents)
            .with_context(|| "Failed to parse config file")?;

        config.validate()?;
        Ok(config)
    }

    /// Validate configuration values
    fn validate(&self) -> Result<()> {
        if self.worker.key_space == 0 {
            anyhow::bail!("key_space must be > 0");
        }
        let namespace = &self.metrics.namespace;
        if !namespace.is_empty() && !is_valid_name(namespace) {
            anyhow::bail!("namespace {:?} is not a valid metric name prefix", namespace);
        }
        if !matches!(self.logging.format.as_str(), "json" | "pretty") {
            anyhow::bail!("logging format must be \"json\" or \"pretty\"");
        }
        Ok(())
    }
}
