//! Configuration validation

use crate::{AppConfig, ChainConfig, ConfigError, Result};
use payout_types::ChainFamily;
use std::collections::HashSet;

/// Validation error details
#[derive(Debug, Clone)]
pub struct ValidationError {
    pub field: String,
    pub message: String,
}

impl ValidationError {
    pub fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

/// Timeouts are scaled by multipliers, so NaN and infinity are rejected
fn is_multiplier(value: f64) -> bool {
    value.is_finite() && value >= 1.0
}

/// Validate the entire application configuration
pub fn validate_config(config: &AppConfig) -> Result<()> {
    let mut errors = Vec::new();

    if let Err(e) = validate_log_level(&config.logging.level) {
        errors.push(e);
    }

    // Executor tuning
    if config.executor.submit_max_attempts == 0 {
        errors.push(ValidationError::new(
            "executor.submit_max_attempts",
            "must be greater than 0",
        ));
    }

    if config.executor.status_recheck_attempts == 0 {
        errors.push(ValidationError::new(
            "executor.status_recheck_attempts",
            "must be greater than 0",
        ));
    }

    if config.executor.retry_max_delay_ms < config.executor.retry_base_delay_ms {
        errors.push(ValidationError::new(
            "executor.retry_max_delay_ms",
            "must be >= retry_base_delay_ms",
        ));
    }

    // Confirmation tuning
    if !is_multiplier(config.confirmation.congestion_multiplier) {
        errors.push(ValidationError::new(
            "confirmation.congestion_multiplier",
            "must be finite and >= 1.0",
        ));
    }

    for (idx, window) in config.confirmation.peak_windows.iter().enumerate() {
        if window.start_hour > 23 || window.end_hour > 24 {
            errors.push(ValidationError::new(
                format!("confirmation.peak_windows[{idx}]"),
                "hours must be within 0..24",
            ));
        }
        if window.start_hour == window.end_hour {
            errors.push(ValidationError::new(
                format!("confirmation.peak_windows[{idx}]"),
                "window must not be empty",
            ));
        }
        if !is_multiplier(window.multiplier) {
            errors.push(ValidationError::new(
                format!("confirmation.peak_windows[{idx}].multiplier"),
                "must be finite and >= 1.0",
            ));
        }
    }

    // Chains
    let mut seen = HashSet::new();
    for (chain_name, chain_config) in &config.chains {
        if let Err(e) = validate_chain_config(chain_config) {
            errors.push(ValidationError::new(format!("chains.{chain_name}"), e));
        }

        if !seen.insert((chain_config.family, chain_config.chain_key.as_str())) {
            errors.push(ValidationError::new(
                format!("chains.{chain_name}"),
                format!(
                    "duplicate {} chain key '{}'",
                    chain_config.family, chain_config.chain_key
                ),
            ));
        }
    }

    if config.store.database_url.is_empty() {
        errors.push(ValidationError::new(
            "store.database_url",
            "database URL is required",
        ));
    }

    if config.metrics.enabled && config.metrics.listen_addr.parse::<std::net::SocketAddr>().is_err()
    {
        errors.push(ValidationError::new(
            "metrics.listen_addr",
            format!("invalid socket address '{}'", config.metrics.listen_addr),
        ));
    }

    if !errors.is_empty() {
        let error_msg = errors
            .iter()
            .map(|e| e.to_string())
            .collect::<Vec<_>>()
            .join("; ");
        return Err(ConfigError::ValidationError(error_msg));
    }

    Ok(())
}

/// Validate a chain configuration
pub fn validate_chain_config(chain: &ChainConfig) -> std::result::Result<(), String> {
    if chain.chain_key.is_empty() {
        return Err("chain_key is required".to_string());
    }

    if chain.family == ChainFamily::Evm && chain.chain_key.parse::<u64>().is_err() {
        return Err(format!(
            "EVM chain_key must be a numeric chain id, got '{}'",
            chain.chain_key
        ));
    }

    validate_url(&chain.rpc_url)?;

    if chain.block_time_ms == Some(0) {
        return Err("block_time_ms must be greater than 0".to_string());
    }

    if chain.confirmation_timeout_secs == Some(0) {
        return Err("confirmation_timeout_secs must be greater than 0".to_string());
    }

    if chain.max_batch_size == Some(0) {
        return Err("max_batch_size must be greater than 0".to_string());
    }

    if chain.gas_limit_budget.is_some() && chain.family != ChainFamily::Evm {
        return Err("gas_limit_budget only applies to EVM chains".to_string());
    }

    if chain.request_timeout_ms == 0 {
        return Err("request_timeout_ms must be greater than 0".to_string());
    }

    Ok(())
}

/// Validate a URL
pub fn validate_url(url: &str) -> std::result::Result<(), String> {
    if url.is_empty() {
        return Err("URL cannot be empty".to_string());
    }

    if !url.starts_with("http://") && !url.starts_with("https://") {
        return Err("URL must start with http:// or https://".to_string());
    }

    Ok(())
}

fn validate_log_level(level: &str) -> std::result::Result<(), ValidationError> {
    match level.to_lowercase().as_str() {
        "trace" | "debug" | "info" | "warn" | "error" => Ok(()),
        _ => Err(ValidationError::new(
            "logging.level",
            format!(
                "invalid log level '{level}', must be one of: trace, debug, info, warn, error"
            ),
        )),
    }
}
