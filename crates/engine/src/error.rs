use payout_chain::ChainError;
use payout_retry::{Classification, Classify};
use payout_store::StoreError;
use payout_types::CampaignStatus;
use thiserror::Error;

use crate::planner::PlanError;

/// Error categories that decide how far a failure propagates
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Malformed recipients or batch; aborts the run
    Validation,
    /// Transient transport failure; retried, then fails the batch
    Network,
    /// Revert or insufficient balance; fails the batch only
    ChainState,
    /// No terminal status before the deadline; fails the batch only
    ConfirmationTimeout,
    /// Campaign lock already held
    AlreadyExecuting,
    /// Missing adapter, profile, wallet or contract; aborts the run
    Configuration,
    NotFound,
    InvalidState,
    /// Persistence unavailable; aborts the run
    Store,
}

impl ErrorKind {
    /// Whether a failure of this kind ends the whole run
    pub fn is_campaign_fatal(&self) -> bool {
        matches!(
            self,
            ErrorKind::Validation | ErrorKind::Configuration | ErrorKind::Store
        )
    }

    /// Kind of a chain error once retries are exhausted
    pub fn of_chain_error(err: &ChainError) -> Self {
        match err {
            ChainError::InvalidInput(_) => ErrorKind::Validation,
            ChainError::Configuration(_) | ChainError::Unsupported(_) => ErrorKind::Configuration,
            ChainError::Reverted(_) | ChainError::InsufficientFunds(_) => ErrorKind::ChainState,
            ChainError::Unconfirmed { .. } => ErrorKind::ConfirmationTimeout,
            other => match other.classify() {
                Classification::Retryable => ErrorKind::Network,
                Classification::Fatal => ErrorKind::ChainState,
            },
        }
    }
}

/// Errors returned by [`Executor`](crate::Executor) operations
#[derive(Debug, Error)]
pub enum ExecutorError {
    #[error("campaign {0} is already executing")]
    AlreadyExecuting(String),

    #[error("campaign {0} not found")]
    CampaignNotFound(String),

    #[error("campaign {campaign_id} cannot {operation} from status {status}")]
    InvalidState {
        campaign_id: String,
        operation: &'static str,
        status: CampaignStatus,
    },

    /// An acknowledged deployment has not been mined yet
    #[error("campaign {campaign_id} has deployment {tx_hash} still pending")]
    DeploymentPending { campaign_id: String, tx_hash: String },

    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("validation failed: {0}")]
    Validation(String),

    #[error("invalid batch plan: {0}")]
    Plan(#[from] PlanError),

    #[error("store error: {0}")]
    Store(#[from] StoreError),

    #[error("chain error: {0}")]
    Chain(#[from] ChainError),
}

impl ExecutorError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            ExecutorError::AlreadyExecuting(_) => ErrorKind::AlreadyExecuting,
            ExecutorError::CampaignNotFound(_) => ErrorKind::NotFound,
            ExecutorError::InvalidState { .. } => ErrorKind::InvalidState,
            ExecutorError::DeploymentPending { .. } => ErrorKind::ConfirmationTimeout,
            ExecutorError::Configuration(_) => ErrorKind::Configuration,
            ExecutorError::Validation(_) | ExecutorError::Plan(_) => ErrorKind::Validation,
            ExecutorError::Store(_) => ErrorKind::Store,
            ExecutorError::Chain(err) => ErrorKind::of_chain_error(err),
        }
    }
}
