//! Configuration management for the bubble-map pipeline.
//!
//! Supports loading from environment variables, config files, and CLI arguments.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TOML error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("BITQUERY_TOKEN environment variable not set")]
    MissingToken,

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Main pipeline configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct PipelineConfig {
    /// Query service connection settings
    #[serde(default)]
    pub service: ServiceConfig,

    /// Per-request timeout and retry policy
    #[serde(default)]
    pub retry: RetryPolicy,

    /// Pagination and pacing
    #[serde(default)]
    pub paging: PagingConfig,

    /// Bounds on the reduced graph
    #[serde(default)]
    pub limits: GraphLimits,

    /// Output artifact locations
    #[serde(default)]
    pub output: OutputConfig,
}

#[derive(Clone, Serialize, Deserialize)]
pub struct ServiceConfig {
    /// GraphQL endpoint of the analytics API
    #[serde(default = "default_endpoint")]
    pub endpoint: String,

    /// OAuth bearer token. Usually supplied through `BITQUERY_TOKEN`.
    #[serde(default)]
    pub api_token: String,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            endpoint: default_endpoint(),
            api_token: String::new(),
        }
    }
}

// Keep the token out of logs.
impl std::fmt::Debug for ServiceConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServiceConfig")
            .field("endpoint", &self.endpoint)
            .field("api_token", &"<redacted>")
            .finish()
    }
}

/// Retry behaviour for a single page request.
///
/// The delay before retry `n` is `backoff_base_ms * n`: linear, no jitter, no cap.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Timeout for one attempt (ms)
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,

    /// Total attempts per page, including the first one
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Base delay for linear backoff (ms)
    #[serde(default = "default_backoff_base_ms")]
    pub backoff_base_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            timeout_ms: default_timeout_ms(),
            max_attempts: default_max_attempts(),
            backoff_base_ms: default_backoff_base_ms(),
        }
    }
}

impl RetryPolicy {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    /// Delay to wait after the given failed attempt (1-based).
    pub fn backoff_for(&self, attempt: u32) -> Duration {
        Duration::from_millis(self.backoff_base_ms.saturating_mul(attempt as u64))
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct PagingConfig {
    /// Records requested per page
    #[serde(default = "default_page_size")]
    pub page_size: u32,

    /// Pause between consecutive pages (ms). 0 disables pacing.
    #[serde(default = "default_inter_page_delay_ms")]
    pub inter_page_delay_ms: u64,

    /// Hard cap on the number of pages folded in one run
    #[serde(default = "default_max_pages")]
    pub max_pages: u32,
}

impl Default for PagingConfig {
    fn default() -> Self {
        Self {
            page_size: default_page_size(),
            inter_page_delay_ms: default_inter_page_delay_ms(),
            max_pages: default_max_pages(),
        }
    }
}

impl PagingConfig {
    pub fn inter_page_delay(&self) -> Option<Duration> {
        (self.inter_page_delay_ms > 0).then(|| Duration::from_millis(self.inter_page_delay_ms))
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct GraphLimits {
    /// Maximum nodes kept after ranking
    #[serde(default = "default_node_cap")]
    pub node_cap: usize,

    /// Maximum edges kept after ranking
    #[serde(default = "default_edge_cap")]
    pub edge_cap: usize,
}

impl Default for GraphLimits {
    fn default() -> Self {
        Self {
            node_cap: default_node_cap(),
            edge_cap: default_edge_cap(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutputConfig {
    /// HTML template holding the data-loading placeholder
    #[serde(default = "default_template_path")]
    pub template_path: PathBuf,

    /// Rendered HTML with the graph embedded
    #[serde(default = "default_html_path")]
    pub html_path: PathBuf,

    /// Optional raw JSON copy of the graph
    #[serde(default)]
    pub json_path: Option<PathBuf>,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            template_path: default_template_path(),
            html_path: default_html_path(),
            json_path: None,
        }
    }
}

// Default value functions
fn default_endpoint() -> String {
    "https://asia.graphql.bitquery.io".to_string()
}

fn default_timeout_ms() -> u64 {
    60_000
}

fn default_max_attempts() -> u32 {
    5
}

fn default_backoff_base_ms() -> u64 {
    800
}

fn default_page_size() -> u32 {
    100 // reduce if queries are heavy
}

fn default_inter_page_delay_ms() -> u64 {
    200
}

fn default_max_pages() -> u32 {
    4
}

fn default_node_cap() -> usize {
    300
}

fn default_edge_cap() -> usize {
    1000
}

fn default_template_path() -> PathBuf {
    PathBuf::from("index.html")
}

fn default_html_path() -> PathBuf {
    PathBuf::from("output.html")
}

impl PipelineConfig {
    /// Load configuration from the environment (and `.env` if present)
    pub fn load() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();

        let mut config = Self::default();
        config.apply_env();
        Ok(config)
    }

    /// Load from a TOML config file with environment overrides
    pub fn load_from_file(path: &Path) -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();

        let contents = std::fs::read_to_string(path)?;
        let mut config: Self = toml::from_str(&contents)?;
        config.apply_env();
        Ok(config)
    }

    /// Environment variables override file settings
    fn apply_env(&mut self) {
        if let Ok(token) = std::env::var("BITQUERY_TOKEN") {
            self.service.api_token = token;
        }
        if let Ok(url) = std::env::var("BITQUERY_ENDPOINT") {
            self.service.endpoint = url;
        }
    }

    /// Validate knob ranges. Does not require a token; see [`Self::require_token`].
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.service.endpoint.trim().is_empty() {
            return Err(ConfigError::Invalid("service.endpoint must not be empty".into()));
        }
        if self.retry.timeout_ms == 0 {
            return Err(ConfigError::Invalid("retry.timeout_ms must be > 0".into()));
        }
        if self.retry.max_attempts == 0 {
            return Err(ConfigError::Invalid("retry.max_attempts must be > 0".into()));
        }
        if self.paging.page_size == 0 {
            return Err(ConfigError::Invalid("paging.page_size must be > 0".into()));
        }
        if self.paging.max_pages == 0 {
            return Err(ConfigError::Invalid("paging.max_pages must be > 0".into()));
        }
        if self.limits.node_cap == 0 {
            return Err(ConfigError::Invalid("limits.node_cap must be > 0".into()));
        }
        if self.limits.edge_cap == 0 {
            return Err(ConfigError::Invalid("limits.edge_cap must be > 0".into()));
        }
        Ok(())
    }

    pub fn require_token(&self) -> Result<&str, ConfigError> {
        let token = self.service.api_token.trim();
        if token.is_empty() {
            return Err(ConfigError::MissingToken);
        }
        Ok(token)
    }
}
