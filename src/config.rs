//! Configuration management for Mercado.
//!
//! Configuration is layered: serde defaults, then an optional YAML file, then
//! environment variables prefixed with `MERCADO_` (nested keys separated by
//! `__`, e.g. `MERCADO_BILLING__ACCESS_TOKEN`).

use serde::{Deserialize, Serialize};
use std::fmt;
use std::net::SocketAddr;
use std::time::Duration;

use crate::error::Result;

/// Main configuration for the Mercado service.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MercadoConfig {
    /// Server configuration
    #[serde(default)]
    pub server: ServerConfig,

    /// Rate limiting configuration
    #[serde(default)]
    pub rate_limiting: RateLimitingConfig,

    /// Outbound billing API configuration
    #[serde(default)]
    pub billing: BillingConfig,
}

/// Server configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// HTTP server address
    #[serde(default = "default_http_addr")]
    pub http_addr: SocketAddr,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            http_addr: default_http_addr(),
        }
    }
}

fn default_http_addr() -> SocketAddr {
    SocketAddr::from(([127, 0, 0, 1], 3000))
}

/// Rate limiting configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateLimitingConfig {
    /// Interval between sweeps of expired rate limit entries, in seconds
    #[serde(default = "default_sweep_interval")]
    pub sweep_interval_secs: u64,

    /// Path to a YAML file of named rate limit policies
    #[serde(default)]
    pub policies_path: Option<String>,
}

impl Default for RateLimitingConfig {
    fn default() -> Self {
        Self {
            sweep_interval_secs: default_sweep_interval(),
            policies_path: None,
        }
    }
}

impl RateLimitingConfig {
    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs.max(1))
    }
}

fn default_sweep_interval() -> u64 {
    300
}

/// Outbound billing API configuration.
#[derive(Clone, Serialize, Deserialize)]
pub struct BillingConfig {
    /// Base URL every endpoint is appended to
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Bearer token for the billing API
    #[serde(default)]
    pub access_token: Option<String>,

    /// Per-attempt timeout in milliseconds
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,

    /// Backoff between retried attempts
    #[serde(default)]
    pub backoff: BackoffConfig,
}

impl Default for BillingConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            access_token: None,
            timeout_ms: default_timeout_ms(),
            backoff: BackoffConfig::default(),
        }
    }
}

impl fmt::Debug for BillingConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BillingConfig")
            .field("base_url", &self.base_url)
            .field(
                "access_token",
                &self.access_token.as_ref().map(|_| "<redacted>"),
            )
            .field("timeout_ms", &self.timeout_ms)
            .field("backoff", &self.backoff)
            .finish()
    }
}

fn default_base_url() -> String {
    "https://api.mercadopago.com".to_string()
}

fn default_timeout_ms() -> u64 {
    10_000
}

/// Exponential backoff parameters.
///
/// The delay before retrying after attempt `k` (zero-based) is
/// `min(max_delay_ms, base_delay_ms * 2^k)` plus a random jitter in
/// `[0, max_jitter_ms)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackoffConfig {
    #[serde(default = "default_base_delay")]
    pub base_delay_ms: u64,

    #[serde(default = "default_max_delay")]
    pub max_delay_ms: u64,

    #[serde(default = "default_max_jitter")]
    pub max_jitter_ms: u64,
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self {
            base_delay_ms: default_base_delay(),
            max_delay_ms: default_max_delay(),
            max_jitter_ms: default_max_jitter(),
        }
    }
}

fn default_base_delay() -> u64 {
    300
}

fn default_max_delay() -> u64 {
    2_000
}

fn default_max_jitter() -> u64 {
    100
}

impl MercadoConfig {
    /// Load configuration from an optional YAML file plus the environment.
    pub fn load(path: Option<&str>) -> Result<Self> {
        let mut builder = config::Config::builder();
        if let Some(path) = path {
            builder = builder.add_source(config::File::with_name(path));
        }
        Self::build(builder)
    }

    /// Load configuration from a YAML string plus the environment.
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let builder = config::Config::builder()
            .add_source(config::File::from_str(yaml, config::FileFormat::Yaml));
        Self::build(builder)
    }

    fn build(
        builder: config::ConfigBuilder<config::builder::DefaultState>,
    ) -> Result<Self> {
        let config = builder
            .add_source(
                config::Environment::with_prefix("MERCADO")
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?
            .try_deserialize()?;
        Ok(config)
    }
}
