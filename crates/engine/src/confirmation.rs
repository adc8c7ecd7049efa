use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use payout_chain::{ChainAdapter, ChainError, ChainProfile, TxStatus, TxStatusReport};
use payout_retry::RetryPolicy;
use payout_types::ChainFamily;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::congestion::{ConstantCongestion, CongestionPolicy};

/// Shortest EVM poll interval
const EVM_MIN_POLL: Duration = Duration::from_secs(1);

/// Solana poll interval, shorter than a second regardless of slot time
const SOLANA_POLL: Duration = Duration::from_millis(500);

/// How a confirmation wait ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfirmationOutcome {
    Confirmed,
    Failed,
    Timeout,
}

impl ConfirmationOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConfirmationOutcome::Confirmed => "confirmed",
            ConfirmationOutcome::Failed => "failed",
            ConfirmationOutcome::Timeout => "timeout",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ConfirmationResult {
    pub confirmed: bool,
    pub outcome: ConfirmationOutcome,
    /// Last status seen; `Pending` after a timeout
    pub final_status: TxStatus,
    /// Status checks performed, each possibly retried internally
    pub attempts: u32,
    pub elapsed: Duration,
    pub block_number: Option<u64>,
    pub gas_used: Option<u64>,
}

impl ConfirmationResult {
    fn terminal(report: TxStatusReport, attempts: u32, elapsed: Duration) -> Self {
        let confirmed = report.status == TxStatus::Confirmed;
        Self {
            confirmed,
            outcome: if confirmed {
                ConfirmationOutcome::Confirmed
            } else {
                ConfirmationOutcome::Failed
            },
            final_status: report.status,
            attempts,
            elapsed,
            block_number: report.block_number,
            gas_used: report.gas_used,
        }
    }

    fn timeout(attempts: u32, elapsed: Duration) -> Self {
        Self {
            confirmed: false,
            outcome: ConfirmationOutcome::Timeout,
            final_status: TxStatus::Pending,
            attempts,
            elapsed,
            block_number: None,
            gas_used: None,
        }
    }
}

/// Adaptive polling until a transaction is final or its deadline passes
#[derive(Debug, Clone)]
pub struct ConfirmationTracker {
    congestion: Arc<dyn CongestionPolicy>,
    recheck: RetryPolicy,
}

impl ConfirmationTracker {
    pub fn new(congestion: Arc<dyn CongestionPolicy>) -> Self {
        Self {
            congestion,
            recheck: RetryPolicy::status_recheck(),
        }
    }

    pub fn with_recheck_policy(mut self, recheck: RetryPolicy) -> Self {
        self.recheck = recheck;
        self
    }

    /// Deadline for one transaction on this chain right now
    pub fn max_wait(&self, profile: &ChainProfile) -> Duration {
        let multiplier = self
            .congestion
            .multiplier(profile.family, &profile.chain_key)
            .max(1.0);
        Duration::try_from_secs_f64(profile.base_timeout.as_secs_f64() * multiplier)
            .unwrap_or(profile.base_timeout)
    }

    /// Interval before the first slowdown
    pub fn base_poll_interval(profile: &ChainProfile) -> Duration {
        match profile.family {
            ChainFamily::Evm => profile.block_time.max(EVM_MIN_POLL),
            ChainFamily::Solana => SOLANA_POLL,
        }
    }

    /// Interval after `elapsed` of `max_wait`: x1.5 past half, x2 past 80%
    pub fn poll_interval(profile: &ChainProfile, elapsed: Duration, max_wait: Duration) -> Duration {
        let base = Self::base_poll_interval(profile);
        if max_wait.is_zero() {
            return base;
        }
        let progress = elapsed.as_secs_f64() / max_wait.as_secs_f64();
        if progress >= 0.8 {
            base * 2
        } else if progress >= 0.5 {
            base.mul_f64(1.5)
        } else {
            base
        }
    }

    /// Poll `status_fn` until the transaction is final or the deadline passes.
    ///
    /// A status read that still fails after the re-check policy is logged and
    /// the wait continues.
    pub async fn wait<F, Fut>(
        &self,
        profile: &ChainProfile,
        tx_hash: &str,
        status_fn: F,
    ) -> ConfirmationResult
    where
        F: Fn() -> Fut,
        Fut: Future<Output = Result<TxStatusReport, ChainError>>,
    {
        let max_wait = self.max_wait(profile);
        let start = Instant::now();
        let mut attempts = 0u32;

        debug!(
            tx_hash = %tx_hash,
            chain = %profile.name,
            max_wait_ms = max_wait.as_millis() as u64,
            "waiting for confirmation"
        );

        loop {
            attempts += 1;
            let remaining = max_wait.saturating_sub(start.elapsed());
            let check =
                tokio::time::timeout(remaining, self.recheck.execute_classified(&status_fn)).await;
            let Ok(check) = check else {
                let elapsed = start.elapsed();
                warn!(
                    tx_hash = %tx_hash,
                    attempts,
                    elapsed_ms = elapsed.as_millis() as u64,
                    outcome = "timeout",
                    "confirmation timed out during status re-check"
                );
                return ConfirmationResult::timeout(attempts, elapsed);
            };

            match check {
                Ok(report) if report.status.is_terminal() => {
                    let result = ConfirmationResult::terminal(report, attempts, start.elapsed());
                    if result.confirmed {
                        info!(
                            tx_hash = %tx_hash,
                            attempts,
                            block_number = ?result.block_number,
                            elapsed_ms = result.elapsed.as_millis() as u64,
                            outcome = "confirmed",
                            "transaction confirmed"
                        );
                    } else {
                        warn!(
                            tx_hash = %tx_hash,
                            attempts,
                            block_number = ?result.block_number,
                            outcome = "failed",
                            "transaction failed on chain"
                        );
                    }
                    return result;
                }
                Ok(_) => {}
                Err(err) => {
                    warn!(
                        tx_hash = %tx_hash,
                        attempt = attempts,
                        error = %err,
                        "status check failed"
                    );
                }
            }

            let elapsed = start.elapsed();
            if elapsed >= max_wait {
                warn!(
                    tx_hash = %tx_hash,
                    attempts,
                    elapsed_ms = elapsed.as_millis() as u64,
                    outcome = "timeout",
                    "confirmation timed out"
                );
                return ConfirmationResult::timeout(attempts, elapsed);
            }

            let interval = Self::poll_interval(profile, elapsed, max_wait);
            tokio::time::sleep(interval.min(max_wait - elapsed)).await;
        }
    }

    /// [`wait`](Self::wait) reading status from a chain adapter
    pub async fn wait_for(
        &self,
        profile: &ChainProfile,
        adapter: &dyn ChainAdapter,
        tx_hash: &str,
    ) -> ConfirmationResult {
        self.wait(profile, tx_hash, move || adapter.get_status(tx_hash))
            .await
    }
}

impl Default for ConfirmationTracker {
    fn default() -> Self {
        Self::new(Arc::new(ConstantCongestion::default()))
    }
}
