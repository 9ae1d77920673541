//! Configuration loading.
//!
//! Settings come from an optional TOML file, then environment variables
//! used by existing deployments override individual keys:
//!
//! | Variable | Key |
//! |----------|-----|
//! | `BACKEND_PORT` | `server.bind` (as `0.0.0.0:<port>`) |
//! | `EXTERNAL_API_BASE_URL` | `catalog.base_url` |
//! | `EXTERNAL_API_START_PAGE` | `catalog.start_page` |
//! | `BATCH_SIZE` | `batch.default_size` |
//! | `MAX_CONCURRENCY` | `batch.max_concurrency` |
//!
//! Integer variables that fail to parse are ignored.

use anyhow::{bail, Context, Result};
use reqwest::Url;
use serde::{Deserialize, Serialize};
use std::num::NonZeroUsize;
use std::path::Path;

/// Largest batch size a caller may request.
pub const MAX_BATCH_SIZE: usize = 1000;

#[derive(Debug, Deserialize, Serialize, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub catalog: CatalogConfig,
    #[serde(default)]
    pub batch: BatchConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct ServerConfig {
    #[serde(default = "default_bind")]
    pub bind: String,
    /// Largest accepted upload body, in bytes.
    #[serde(default = "default_max_upload_bytes")]
    pub max_upload_bytes: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
            max_upload_bytes: default_max_upload_bytes(),
        }
    }
}

fn default_bind() -> String {
    "0.0.0.0:8080".to_string()
}
fn default_max_upload_bytes() -> usize {
    64 * 1024 * 1024
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct CatalogConfig {
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default = "default_start_page")]
    pub start_page: u32,
    /// Per-request timeout in seconds. `0` disables it.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for CatalogConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            start_page: default_start_page(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

fn default_base_url() -> String {
    "https://hackathon-produtos-api.onrender.com/api/produtos".to_string()
}
fn default_start_page() -> u32 {
    1
}
fn default_timeout_secs() -> u64 {
    30
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct BatchConfig {
    #[serde(default = "default_batch_size")]
    pub default_size: usize,
    #[serde(default = "default_max_concurrency")]
    pub max_concurrency: usize,
    /// Fetches are network-bound, so the in-flight limit is a multiple of
    /// the worker count.
    #[serde(default = "default_in_flight_multiplier")]
    pub in_flight_multiplier: usize,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            default_size: default_batch_size(),
            max_concurrency: default_max_concurrency(),
            in_flight_multiplier: default_in_flight_multiplier(),
        }
    }
}

fn default_batch_size() -> usize {
    1000
}
fn default_max_concurrency() -> usize {
    std::thread::available_parallelism()
        .map(NonZeroUsize::get)
        .unwrap_or(1)
}
fn default_in_flight_multiplier() -> usize {
    4
}

impl BatchConfig {
    /// The validated default batch size.
    pub fn default_batch_size(&self) -> NonZeroUsize {
        NonZeroUsize::new(self.default_size).unwrap_or(NonZeroUsize::MIN)
    }

    /// Maximum number of batch tasks allowed in flight at once.
    pub fn max_in_flight(&self) -> NonZeroUsize {
        NonZeroUsize::new(self.max_concurrency.saturating_mul(self.in_flight_multiplier))
            .unwrap_or(NonZeroUsize::MIN)
    }
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct LoggingConfig {
    /// `EnvFilter` directive. `RUST_LOG` takes precedence when set.
    #[serde(default = "default_level")]
    pub level: String,
    #[serde(default)]
    pub format: LogFormat,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_level(),
            format: LogFormat::default(),
        }
    }
}

fn default_level() -> String {
    "info".to_string()
}

#[derive(Debug, Deserialize, Serialize, Clone, Copy, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Json,
    Pretty,
}

impl Config {
    /// Applies the deployment environment variables on top of the file values.
    ///
    /// `lookup` abstracts `std::env::var` so tests can supply their own map.
    pub fn apply_env_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(port) = lookup("BACKEND_PORT").filter(|p| !p.is_empty()) {
            self.server.bind = format!("0.0.0.0:{}", port);
        }
        if let Some(url) = lookup("EXTERNAL_API_BASE_URL") {
            self.catalog.base_url = url;
        }
        if let Some(page) = lookup("EXTERNAL_API_START_PAGE").and_then(|v| v.parse().ok()) {
            self.catalog.start_page = page;
        }
        if let Some(size) = lookup("BATCH_SIZE").and_then(|v| v.parse().ok()) {
            self.batch.default_size = size;
        }
        if let Some(n) = lookup("MAX_CONCURRENCY").and_then(|v| v.parse().ok()) {
            self.batch.max_concurrency = n;
        }
    }

    /// Checks invariants the rest of the application relies on.
    pub fn validate(&self) -> Result<()> {
        if self.server.max_upload_bytes == 0 {
            bail!("server.max_upload_bytes must be > 0");
        }
        if self.catalog.start_page < 1 {
            bail!("catalog.start_page must be >= 1");
        }

        let url = Url::parse(&self.catalog.base_url)
            .with_context(|| format!("invalid catalog.base_url: {}", self.catalog.base_url))?;
        if !matches!(url.scheme(), "http" | "https") {
            bail!(
                "catalog.base_url must use http or https, got '{}'",
                url.scheme()
            );
        }

        if !(1..=MAX_BATCH_SIZE).contains(&self.batch.default_size) {
            bail!("batch.default_size must be in [1, {}]", MAX_BATCH_SIZE);
        }
        if self.batch.max_concurrency < 1 {
            bail!("batch.max_concurrency must be >= 1");
        }
        if self.batch.in_flight_multiplier < 1 {
            bail!("batch.in_flight_multiplier must be >= 1");
        }

        Ok(())
    }
}

/// Parses a TOML configuration document. Missing sections take defaults.
pub fn parse_config(content: &str) -> Result<Config> {
    toml::from_str(content).with_context(|| "Failed to parse config file")
}

/// Loads the configuration from `path` (or defaults when `None`), applies
/// environment overrides, and validates the result.
pub fn load_config(path: Option<&Path>) -> Result<Config> {
    let mut config = match path {
        Some(path) => {
            let content = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read config file: {}", path.display()))?;
            parse_config(&content)?
        }
        None => Config::default(),
    };

    config.apply_env_overrides(|key| std::env::var(key).ok());
    config.validate()?;
    Ok(config)
}
