use std::time::Duration;

use payout_types::{CampaignStatus, ChainFamily};
use prometheus::{Encoder, Registry, TextEncoder};

use crate::metrics::*;

/// Metrics collector for the token payout engine
pub struct MetricsCollector {
    registry: Registry,
}

impl MetricsCollector {
    /// Create a new metrics collector with default registry
    pub fn new() -> Self {
        let registry = Registry::new();
        Self { registry }
    }

    /// Create a new metrics collector with custom registry
    pub fn with_registry(registry: Registry) -> Self {
        Self { registry }
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // RUN METRICS
    // ═══════════════════════════════════════════════════════════════════════════

    /// Record a run that acquired its campaign's execution lock
    pub fn record_run_started(&self) {
        RUNS_STARTED.inc();
        ACTIVE_RUNS.inc();
    }

    /// Record the campaign status a run left behind
    pub fn record_run_finished(&self, status: CampaignStatus) {
        let status_str = match status {
            CampaignStatus::Completed => "completed",
            CampaignStatus::Paused => "paused",
            CampaignStatus::Failed => "failed",
            CampaignStatus::Sending => "sending",
            CampaignStatus::Ready => "ready",
            CampaignStatus::Created => "created",
        };
        RUNS_FINISHED.with_label_values(&[status_str]).inc();
        ACTIVE_RUNS.dec();
    }

    /// Record a rejected lock acquisition
    pub fn record_lock_contention(&self, lock: &str) {
        LOCK_CONTENTION.with_label_values(&[lock]).inc();
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // BATCH METRICS
    // ═══════════════════════════════════════════════════════════════════════════

    /// Record a batch broadcast
    pub fn record_batch_submitted(&self, family: ChainFamily, recipients: usize) {
        BATCHES_SUBMITTED
            .with_label_values(&[family_label(family)])
            .inc();
        BATCH_SIZE.observe(recipients as f64);
    }

    /// Record a finished batch and the recipients it settled
    pub fn record_batch_result(&self, result: BatchResult, recipients: usize) {
        BATCHES_FINISHED
            .with_label_values(&[result.as_label()])
            .inc();

        let status = if result == BatchResult::Confirmed {
            "completed"
        } else {
            "failed"
        };
        RECIPIENTS_FINISHED
            .with_label_values(&[status])
            .inc_by(recipients as u64);
    }

    /// Record the retries behind an operation that took `attempts` tries
    pub fn record_retries(&self, operation: &str, attempts: u32) {
        if attempts > 1 {
            RETRY_ATTEMPTS
                .with_label_values(&[operation])
                .inc_by(u64::from(attempts - 1));
        }
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // CONFIRMATION METRICS
    // ═══════════════════════════════════════════════════════════════════════════

    /// Record one confirmation wait
    pub fn record_confirmation(
        &self,
        family: ChainFamily,
        outcome: &str,
        elapsed: Duration,
        polls: u32,
    ) {
        CONFIRMATION_DURATION
            .with_label_values(&[family_label(family), outcome])
            .observe(elapsed.as_secs_f64());
        CONFIRMATION_POLLS.observe(f64::from(polls));
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // DEPLOYMENT METRICS
    // ═══════════════════════════════════════════════════════════════════════════

    pub fn record_deployment(&self, success: bool) {
        let outcome = if success { "deployed" } else { "failed" };
        DEPLOYMENTS.with_label_values(&[outcome]).inc();
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // LOG METRICS
    // ═══════════════════════════════════════════════════════════════════════════

    pub fn record_log_event(&self, level: &str, target: &str) {
        LOG_EVENTS.with_label_values(&[level, target]).inc();
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // EXPORT
    // ═══════════════════════════════════════════════════════════════════════════

    /// Export metrics in Prometheus text format
    pub fn export_metrics(&self) -> Result<String, MetricsError> {
        let encoder = TextEncoder::new();
        let mut metric_families = prometheus::gather();
        metric_families.extend(self.registry.gather());
        let mut buffer = Vec::new();
        encoder
            .encode(&metric_families, &mut buffer)
            .map_err(|e| MetricsError::EncodingError(e.to_string()))?;

        String::from_utf8(buffer).map_err(|e| MetricsError::EncodingError(e.to_string()))
    }
}

impl Default for MetricsCollector {
    fn default() -> Self {
        Self::new()
    }
}

fn family_label(family: ChainFamily) -> &'static str {
    match family {
        ChainFamily::Evm => "evm",
        ChainFamily::Solana => "solana",
    }
}

/// How a batch ended, for outcome-labelled metrics
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BatchResult {
    Confirmed,
    /// Reverted or otherwise failed on chain
    Failed,
    /// No terminal status before the confirmation deadline
    TimedOut,
    /// Never broadcast
    SubmitFailed,
}

impl BatchResult {
    pub fn as_label(&self) -> &'static str {
        match self {
            BatchResult::Confirmed => "confirmed",
            BatchResult::Failed => "failed",
            BatchResult::TimedOut => "timeout",
            BatchResult::SubmitFailed => "submit_failed",
        }
    }
}

/// Metrics error types
#[derive(Debug, thiserror::Error)]
pub enum MetricsError {
    #[error("encoding error: {0}")]
    EncodingError(String),
    #[error("registry error: {0}")]
    RegistryError(String),
}

impl From<prometheus::Error> for MetricsError {
    fn from(err: prometheus::Error) -> Self {
        MetricsError::RegistryError(err.to_string())
    }
}
