use payout_retry::{Classification, Classify};
use thiserror::Error;

/// Errors surfaced by chain adapters
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ChainError {
    #[error("network error: {0}")]
    Network(String),

    #[error("request timed out: {0}")]
    Timeout(String),

    #[error("rate limited: {0}")]
    RateLimited(String),

    #[error("rpc error {code}: {message}")]
    Rpc { code: i64, message: String },

    #[error("transaction reverted: {0}")]
    Reverted(String),

    #[error("insufficient funds: {0}")]
    InsufficientFunds(String),

    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("unsupported operation: {0}")]
    Unsupported(String),

    /// Broadcast was acknowledged but no final status was observed
    #[error("transaction {tx_hash} unconfirmed: {message}")]
    Unconfirmed { tx_hash: String, message: String },
}

impl ChainError {
    /// Map a JSON-RPC error object onto the error taxonomy
    pub fn from_rpc(code: i64, message: impl Into<String>) -> Self {
        let message = message.into();
        let lower = message.to_lowercase();

        if code == -32005 || code == 429 || lower.contains("rate limit") || lower.contains("too many requests") {
            ChainError::RateLimited(message)
        } else if lower.contains("insufficient funds") || lower.contains("insufficient lamports") {
            ChainError::InsufficientFunds(message)
        } else if lower.contains("execution reverted") {
            ChainError::Reverted(message)
        } else if lower.contains("timeout") || lower.contains("timed out") {
            ChainError::Timeout(message)
        } else {
            ChainError::Rpc { code, message }
        }
    }

    /// Node already holds (or has executed) the exact transaction rebroadcast
    pub fn is_already_known(&self) -> bool {
        let message = match self {
            ChainError::Rpc { message, .. } => message,
            _ => return false,
        };
        let lower = message.to_lowercase();
        lower.contains("already known")
            || lower.contains("known transaction")
            || lower.contains("nonce too low")
            || lower.contains("already been processed")
            || lower.contains("alreadyprocessed")
    }

    /// On-chain state errors fail a batch but never the whole campaign
    pub fn is_chain_state(&self) -> bool {
        matches!(self, ChainError::Reverted(_) | ChainError::InsufficientFunds(_))
    }
}

impl Classify for ChainError {
    fn classify(&self) -> Classification {
        match self {
            ChainError::Network(_) | ChainError::Timeout(_) | ChainError::RateLimited(_) => {
                Classification::Retryable
            }
            // -32603 is a node-side internal error, usually transient
            ChainError::Rpc { code, .. } if *code == -32603 => Classification::Retryable,
            _ => Classification::Fatal,
        }
    }
}

impl From<reqwest::Error> for ChainError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            ChainError::Timeout(err.to_string())
        } else if err.status().map(|s| s.as_u16()) == Some(429) {
            ChainError::RateLimited(err.to_string())
        } else if err.is_decode() {
            ChainError::Rpc {
                code: 0,
                message: format!("malformed response: {err}"),
            }
        } else {
            ChainError::Network(err.to_string())
        }
    }
}
