//! Core configuration structures for the token payout engine

use payout_types::ChainFamily;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Main application configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,

    /// Batch execution tuning
    #[serde(default)]
    pub executor: ExecutorConfig,

    /// Confirmation tracking tuning
    #[serde(default)]
    pub confirmation: ConfirmationConfig,

    /// Chain configurations by name
    #[serde(default)]
    pub chains: HashMap<String, ChainConfig>,

    /// Persistence configuration
    #[serde(default)]
    pub store: StoreConfig,

    /// Metrics exposition
    #[serde(default)]
    pub metrics: MetricsConfig,
}

impl AppConfig {
    /// Find the chain entry for a family and chain key
    pub fn chain(&self, family: ChainFamily, chain_key: &str) -> Option<&ChainConfig> {
        self.chains
            .values()
            .find(|c| c.family == family && c.chain_key == chain_key)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Emit JSON lines instead of human readable output
    #[serde(default)]
    pub json: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutorConfig {
    /// Delay between batches when the campaign does not set one
    #[serde(default = "default_send_interval_ms")]
    pub default_send_interval_ms: u64,

    /// Attempts per batch submission
    #[serde(default = "default_submit_max_attempts")]
    pub submit_max_attempts: u32,

    /// Attempts per status read after a transient failure
    #[serde(default = "default_status_recheck_attempts")]
    pub status_recheck_attempts: u32,

    /// Initial retry delay for submissions
    #[serde(default = "default_retry_base_delay_ms")]
    pub retry_base_delay_ms: u64,

    /// Initial retry delay for status reads
    #[serde(default = "default_status_recheck_delay_ms")]
    pub status_recheck_delay_ms: u64,

    /// Upper bound for any retry delay
    #[serde(default = "default_retry_max_delay_ms")]
    pub retry_max_delay_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfirmationConfig {
    /// Constant congestion multiplier applied to every chain timeout
    #[serde(default = "default_congestion_multiplier")]
    pub congestion_multiplier: f64,

    /// Optional UTC hour windows with their own multiplier
    #[serde(default)]
    pub peak_windows: Vec<PeakWindow>,
}

/// UTC hour range `[start_hour, end_hour)`; wraps past midnight when start > end
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PeakWindow {
    pub start_hour: u8,
    pub end_hour: u8,
    pub multiplier: f64,
}

impl PeakWindow {
    pub fn contains(&self, hour: u8) -> bool {
        if self.start_hour <= self.end_hour {
            hour >= self.start_hour && hour < self.end_hour
        } else {
            hour >= self.start_hour || hour < self.end_hour
        }
    }
}

/// Configuration for one chain
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChainConfig {
    /// Chain family
    pub family: ChainFamily,

    /// EVM chain id or Solana cluster name
    pub chain_key: String,

    /// JSON-RPC endpoint URL
    pub rpc_url: String,

    /// Override for the built-in block time
    #[serde(default)]
    pub block_time_ms: Option<u64>,

    /// Override for the built-in confirmation timeout
    #[serde(default)]
    pub confirmation_timeout_secs: Option<u64>,

    /// Override for the built-in batch ceiling
    #[serde(default)]
    pub max_batch_size: Option<usize>,

    /// Override for the per-transaction gas budget (EVM only)
    #[serde(default)]
    pub gas_limit_budget: Option<u64>,

    /// RPC request timeout in milliseconds
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    /// SQLite database URL
    #[serde(default = "default_database_url")]
    pub database_url: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsConfig {
    /// Enable the metrics endpoint
    #[serde(default)]
    pub enabled: bool,

    /// Listen address for the metrics endpoint
    #[serde(default = "default_metrics_addr")]
    pub listen_addr: String,
}

// Default value functions
fn default_log_level() -> String {
    "info".to_string()
}

fn default_send_interval_ms() -> u64 {
    500
}

fn default_submit_max_attempts() -> u32 {
    3
}

fn default_status_recheck_attempts() -> u32 {
    2
}

fn default_retry_base_delay_ms() -> u64 {
    1000
}

fn default_status_recheck_delay_ms() -> u64 {
    500
}

fn default_retry_max_delay_ms() -> u64 {
    30_000
}

fn default_congestion_multiplier() -> f64 {
    1.0
}

fn default_request_timeout_ms() -> u64 {
    30_000
}

fn default_database_url() -> String {
    "sqlite://payout.db".to_string()
}

fn default_metrics_addr() -> String {
    "0.0.0.0:9090".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            default_send_interval_ms: default_send_interval_ms(),
            submit_max_attempts: default_submit_max_attempts(),
            status_recheck_attempts: default_status_recheck_attempts(),
            retry_base_delay_ms: default_retry_base_delay_ms(),
            status_recheck_delay_ms: default_status_recheck_delay_ms(),
            retry_max_delay_ms: default_retry_max_delay_ms(),
        }
    }
}

impl Default for ConfirmationConfig {
    fn default() -> Self {
        Self {
            congestion_multiplier: default_congestion_multiplier(),
            peak_windows: Vec::new(),
        }
    }
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            database_url: default_database_url(),
        }
    }
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            listen_addr: default_metrics_addr(),
        }
    }
}

impl ChainConfig {
    pub fn new(family: ChainFamily, chain_key: impl Into<String>, rpc_url: impl Into<String>) -> Self {
        Self {
            family,
            chain_key: chain_key.into(),
            rpc_url: rpc_url.into(),
            block_time_ms: None,
            confirmation_timeout_secs: None,
            max_batch_size: None,
            gas_limit_budget: None,
            request_timeout_ms: default_request_timeout_ms(),
        }
    }
}
