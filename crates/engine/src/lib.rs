//! Campaign batch-transfer execution.
//!
//! [`Executor`] runs a campaign's pending recipients through the chain
//! adapter one batch at a time, tracking each transaction to a final status
//! and keeping the campaign's progress in the store. [`BatchPlanner`] sizes
//! batches for the target chain, [`ConfirmationTracker`] does the adaptive
//! polling and [`ExecutionLockRegistry`] keeps runs exclusive per campaign.

pub mod confirmation;
pub mod congestion;
pub mod error;
pub mod events;
pub mod executor;
pub mod lock;
pub mod planner;
pub mod recovery;

#[cfg(test)]
mod tests;

pub use confirmation::{ConfirmationOutcome, ConfirmationResult, ConfirmationTracker};
pub use congestion::{policy_from_config, CongestionPolicy, ConstantCongestion, PeakHoursCongestion};
pub use error::{ErrorKind, ExecutorError};
pub use events::{ProgressBus, ProgressEvent};
pub use executor::{
    BatchFailurePolicy, BatchOutcome, BuilderError, DeployOutcome, EngineConfig, Executor,
    ExecutorBuilder, RunSummary, BATCH_FAILURE_POLICY,
};
pub use lock::{ControlSignal, ExecutionGuard, ExecutionLockRegistry, LockKey};
pub use planner::{
    estimate_solana_tx_size, Batch, BatchPlanner, PlanError, PlanRequest, EVM_MIN_BATCH_SIZE,
    SOLANA_NATIVE_MAX_TRANSFERS, SOLANA_SPL_MAX_TRANSFERS,
};
pub use recovery::RecoveryReport;
