use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use payout_chain::{
    AdapterRegistry, ChainAdapter, ChainError, ChainProfile, ChainRegistry, DeployReceipt,
    DeployRequest, FeeQuery, TransferBatch,
};
use payout_config::AppConfig;
use payout_metrics::{BatchResult, MetricsCollector, RunSpan};
use payout_retry::RetryPolicy;
use payout_store::CampaignStore;
use payout_types::{
    parse_amount, Campaign, CampaignStatus, Recipient, RecipientCounts, RecipientStatus,
    TransactionKind, TransactionRecord, TransactionStatus,
};
use thiserror::Error;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn, Instrument};

use crate::confirmation::{ConfirmationOutcome, ConfirmationTracker};
use crate::congestion::{policy_from_config, ConstantCongestion, CongestionPolicy};
use crate::error::{ErrorKind, ExecutorError};
use crate::events::{ProgressBus, ProgressEvent};
use crate::lock::{ControlSignal, ExecutionLockRegistry, LockKey};
use crate::planner::{Batch, BatchPlanner, PlanRequest};
use crate::recovery::RecoveryReport;

/// What a run does after a batch fails permanently
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BatchFailurePolicy {
    /// Mark the batch's recipients failed and move on
    Continue,
    /// Stop the run and fail the campaign
    Abort,
}

pub const BATCH_FAILURE_POLICY: BatchFailurePolicy = BatchFailurePolicy::Continue;

/// Engine tuning
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Delay between batches for campaigns without their own interval
    pub default_send_interval: Duration,
    pub submit_policy: RetryPolicy,
    pub recheck_policy: RetryPolicy,
    /// Progress events buffered per subscriber
    pub event_capacity: usize,
}

impl EngineConfig {
    pub fn from_config(config: &payout_config::ExecutorConfig) -> Self {
        let max_delay = Duration::from_millis(config.retry_max_delay_ms);
        Self {
            default_send_interval: Duration::from_millis(config.default_send_interval_ms),
            submit_policy: RetryPolicy::new(
                config.submit_max_attempts,
                Duration::from_millis(config.retry_base_delay_ms),
            )
            .with_max_delay(max_delay),
            recheck_policy: RetryPolicy::new(
                config.status_recheck_attempts,
                Duration::from_millis(config.status_recheck_delay_ms),
            )
            .with_max_delay(max_delay),
            event_capacity: 256,
        }
    }

    pub fn with_send_interval(mut self, interval: Duration) -> Self {
        self.default_send_interval = interval;
        self
    }

    pub fn with_submit_policy(mut self, policy: RetryPolicy) -> Self {
        self.submit_policy = policy;
        self
    }

    pub fn with_recheck_policy(mut self, policy: RetryPolicy) -> Self {
        self.recheck_policy = policy;
        self
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            default_send_interval: Duration::from_millis(500),
            submit_policy: RetryPolicy::submission(),
            recheck_policy: RetryPolicy::status_recheck(),
            event_capacity: 256,
        }
    }
}

/// Result of one batch, consumed by the run loop
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BatchOutcome {
    Confirmed {
        tx_hash: String,
        block_number: Option<u64>,
        gas_used: Option<u64>,
    },
    /// Never broadcast (`tx_hash` is `None`) or failed on chain
    Failed {
        tx_hash: Option<String>,
        kind: ErrorKind,
        error: String,
    },
    /// Broadcast but not final before the confirmation deadline
    TimedOut { tx_hash: String, elapsed: Duration },
}

impl BatchOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, BatchOutcome::Confirmed { .. })
    }

    pub fn tx_hash(&self) -> Option<&str> {
        match self {
            BatchOutcome::Confirmed { tx_hash, .. } | BatchOutcome::TimedOut { tx_hash, .. } => {
                Some(tx_hash)
            }
            BatchOutcome::Failed { tx_hash, .. } => tx_hash.as_deref(),
        }
    }

    pub fn recipient_status(&self) -> RecipientStatus {
        if self.is_success() {
            RecipientStatus::Completed
        } else {
            RecipientStatus::Failed
        }
    }

    /// Error stored on each of the batch's recipients
    pub fn error_message(&self) -> Option<String> {
        match self {
            BatchOutcome::Confirmed { .. } => None,
            BatchOutcome::Failed { error, .. } => Some(error.clone()),
            BatchOutcome::TimedOut { tx_hash, elapsed } => Some(format!(
                "confirmation timeout after {}s for transaction {tx_hash}",
                elapsed.as_secs()
            )),
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            BatchOutcome::Confirmed { .. } => "confirmed",
            BatchOutcome::Failed { .. } => "failed",
            BatchOutcome::TimedOut { .. } => "timeout",
        }
    }

    fn metric(&self) -> BatchResult {
        match self {
            BatchOutcome::Confirmed { .. } => BatchResult::Confirmed,
            BatchOutcome::Failed { tx_hash: None, .. } => BatchResult::SubmitFailed,
            BatchOutcome::Failed { .. } => BatchResult::Failed,
            BatchOutcome::TimedOut { .. } => BatchResult::TimedOut,
        }
    }
}

/// Summary of a run that ended without a campaign-level error
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunSummary {
    pub campaign_id: String,
    pub run_id: String,
    /// Campaign status after the run
    pub status: CampaignStatus,
    pub batches_planned: usize,
    pub batches_processed: usize,
    pub counts: RecipientCounts,
    /// Recipients reconciled from an interrupted run
    pub recovery: RecoveryReport,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeployOutcome {
    Deployed(DeployReceipt),
    /// The chain family sends directly; the campaign moved to READY
    NotRequired,
}

/// Everything a run needs, resolved once up front
pub(crate) struct RunContext {
    pub(crate) campaign: Campaign,
    pub(crate) profile: ChainProfile,
    pub(crate) adapter: Arc<dyn ChainAdapter>,
    pub(crate) wallet_ref: String,
    pub(crate) send_interval: Duration,
}

/// Builder error
#[derive(Debug, Error)]
pub enum BuilderError {
    #[error("missing required field: {field}")]
    MissingField { field: String },
}

/// Builder for [`Executor`]
pub struct ExecutorBuilder {
    store: Option<Arc<dyn CampaignStore>>,
    adapters: AdapterRegistry,
    chains: ChainRegistry,
    congestion: Arc<dyn CongestionPolicy>,
    locks: ExecutionLockRegistry,
    config: EngineConfig,
    metrics: Option<Arc<MetricsCollector>>,
}

impl ExecutorBuilder {
    /// Create a new builder with defaults
    pub fn new() -> Self {
        Self {
            store: None,
            adapters: AdapterRegistry::new(),
            chains: ChainRegistry::builtin(),
            congestion: Arc::new(ConstantCongestion::default()),
            locks: ExecutionLockRegistry::new(),
            config: EngineConfig::default(),
            metrics: None,
        }
    }

    /// Chain profiles, congestion policy and engine tuning from app config
    pub fn with_app_config(mut self, config: &AppConfig) -> Self {
        self.chains = ChainRegistry::from_config(config);
        self.congestion = policy_from_config(&config.confirmation);
        self.config = EngineConfig::from_config(&config.executor);
        self
    }

    pub fn with_store(mut self, store: Arc<dyn CampaignStore>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn with_adapters(mut self, adapters: AdapterRegistry) -> Self {
        self.adapters = adapters;
        self
    }

    /// Adapter for one chain key of the adapter's family
    pub fn with_adapter(mut self, chain_key: &str, adapter: Arc<dyn ChainAdapter>) -> Self {
        self.adapters.register(chain_key, adapter);
        self
    }

    /// Adapter for every chain key of the adapter's family
    pub fn with_family_adapter(mut self, adapter: Arc<dyn ChainAdapter>) -> Self {
        self.adapters.register_family(adapter);
        self
    }

    pub fn with_chains(mut self, chains: ChainRegistry) -> Self {
        self.chains = chains;
        self
    }

    pub fn with_congestion(mut self, congestion: Arc<dyn CongestionPolicy>) -> Self {
        self.congestion = congestion;
        self
    }

    /// Share a lock registry with other executors in the process
    pub fn with_locks(mut self, locks: ExecutionLockRegistry) -> Self {
        self.locks = locks;
        self
    }

    pub fn with_config(mut self, config: EngineConfig) -> Self {
        self.config = config;
        self
    }

    pub fn with_metrics(mut self, metrics: Arc<MetricsCollector>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    pub fn build(self) -> Result<Executor, BuilderError> {
        let store = self.store.ok_or_else(|| BuilderError::MissingField {
            field: "store".to_string(),
        })?;

        let tracker = ConfirmationTracker::new(self.congestion)
            .with_recheck_policy(self.config.recheck_policy.clone());

        Ok(Executor {
            store,
            adapters: self.adapters,
            planner: BatchPlanner::new(self.chains),
            tracker,
            locks: self.locks,
            events: ProgressBus::new(self.config.event_capacity),
            config: self.config,
            metrics: self.metrics.unwrap_or_default(),
        })
    }
}

impl Default for ExecutorBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Drives campaigns through `READY/PAUSED -> SENDING -> {PAUSED, COMPLETED, FAILED}`.
///
/// Each run holds the campaign's execution lock for its whole duration and
/// processes batches strictly one after another. Chain specifics stay behind
/// [`ChainAdapter`].
pub struct Executor {
    pub(crate) store: Arc<dyn CampaignStore>,
    pub(crate) adapters: AdapterRegistry,
    pub(crate) planner: BatchPlanner,
    pub(crate) tracker: ConfirmationTracker,
    pub(crate) locks: ExecutionLockRegistry,
    pub(crate) config: EngineConfig,
    pub(crate) metrics: Arc<MetricsCollector>,
    pub(crate) events: ProgressBus,
}

impl Executor {
    pub fn builder() -> ExecutorBuilder {
        ExecutorBuilder::new()
    }

    pub fn store(&self) -> &Arc<dyn CampaignStore> {
        &self.store
    }

    pub fn locks(&self) -> &ExecutionLockRegistry {
        &self.locks
    }

    pub fn planner(&self) -> &BatchPlanner {
        &self.planner
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ProgressEvent> {
        self.events.subscribe()
    }

    /// Stop the campaign's run after its current batch
    pub fn pause(&self, campaign_id: &str) {
        info!(campaign_id, "pause requested");
        self.locks.pause(campaign_id);
    }

    /// Clear a pause request; the caller runs the campaign again
    pub fn resume(&self, campaign_id: &str) {
        info!(campaign_id, "resume requested");
        self.locks.resume(campaign_id);
    }

    /// Stop the campaign's run after its current batch and fail it
    pub fn cancel(&self, campaign_id: &str) {
        info!(campaign_id, "cancel requested");
        self.locks.cancel(campaign_id);
    }

    pub fn is_running(&self, campaign_id: &str) -> bool {
        self.locks
            .is_held(&LockKey::Execute(campaign_id.to_string()))
    }

    /// Run the campaign on its own task
    pub fn spawn_run(
        self: &Arc<Self>,
        campaign_id: impl Into<String>,
    ) -> JoinHandle<Result<RunSummary, ExecutorError>> {
        let executor = Arc::clone(self);
        let campaign_id = campaign_id.into();
        tokio::spawn(async move { executor.run(&campaign_id).await })
    }

    /// Send every pending recipient of a READY or PAUSED campaign.
    ///
    /// Returns `AlreadyExecuting` without touching any state when another run
    /// or deployment holds the campaign. Campaign-level errors fail the
    /// campaign before they are returned.
    pub async fn run(&self, campaign_id: &str) -> Result<RunSummary, ExecutorError> {
        let Some(guard) = self
            .locks
            .try_acquire(LockKey::Execute(campaign_id.to_string()))
        else {
            self.metrics.record_lock_contention("execute");
            warn!(campaign_id, "run rejected, campaign already executing");
            return Err(ExecutorError::AlreadyExecuting(campaign_id.to_string()));
        };

        let campaign = self
            .store
            .load_campaign(campaign_id)
            .await?
            .ok_or_else(|| ExecutorError::CampaignNotFound(campaign_id.to_string()))?;

        if !campaign.status.is_runnable() {
            return Err(ExecutorError::InvalidState {
                campaign_id: campaign_id.to_string(),
                operation: "run",
                status: campaign.status,
            });
        }

        let span = RunSpan::new(campaign_id);
        let result = self
            .execute_run(campaign, &span)
            .instrument(span.span())
            .await;
        drop(guard);
        result
    }

    async fn execute_run(
        &self,
        campaign: Campaign,
        span: &RunSpan,
    ) -> Result<RunSummary, ExecutorError> {
        let campaign_id = campaign.id.clone();
        self.metrics.record_run_started();
        info!(status = %campaign.status, "run started");

        match self.drive(campaign, span).await {
            Ok(summary) => {
                self.metrics.record_run_finished(summary.status);
                self.events.publish(ProgressEvent::RunFinished {
                    campaign_id,
                    status: summary.status,
                    counts: summary.counts,
                });
                info!(
                    status = %summary.status,
                    batches = summary.batches_processed,
                    completed = summary.counts.completed,
                    failed = summary.counts.failed,
                    pending = summary.counts.pending,
                    "run finished"
                );
                Ok(summary)
            }
            Err(err) => {
                error!(error = %err, kind = ?err.kind(), "run aborted");
                let counts = self.abort_campaign(&campaign_id).await;
                self.metrics.record_run_finished(CampaignStatus::Failed);
                self.events.publish(ProgressEvent::RunFinished {
                    campaign_id,
                    status: CampaignStatus::Failed,
                    counts,
                });
                Err(err)
            }
        }
    }

    /// Best effort: the store may be the reason the run aborted
    async fn abort_campaign(&self, campaign_id: &str) -> RecipientCounts {
        if let Err(err) = self
            .store
            .update_campaign_status(campaign_id, CampaignStatus::Failed)
            .await
        {
            error!(error = %err, "could not mark campaign failed");
        }
        self.locks.clear_signals(campaign_id);
        match self.sync_progress(campaign_id).await {
            Ok(counts) => counts,
            Err(err) => {
                error!(error = %err, "could not persist progress");
                RecipientCounts::default()
            }
        }
    }

    async fn drive(&self, campaign: Campaign, span: &RunSpan) -> Result<RunSummary, ExecutorError> {
        let ctx = self.resolve(campaign)?;
        let campaign_id = ctx.campaign.id.as_str();

        self.store
            .update_campaign_status(campaign_id, CampaignStatus::Sending)
            .await?;

        let recovery = self.reconcile_processing(&ctx).await?;

        let pending = self.store.list_pending_recipients(campaign_id).await?;
        self.validate_recipients(&ctx, &pending)?;
        let batches = self
            .planner
            .split(&pending, &PlanRequest::for_campaign(&ctx.campaign))?;

        self.events.publish(ProgressEvent::RunStarted {
            campaign_id: campaign_id.to_string(),
            run_id: span.run_id.as_str(),
            pending: pending.len(),
            batches: batches.len(),
        });

        if batches.is_empty() {
            debug!("no pending recipients");
        } else {
            self.preview_fees(&ctx, &batches).await;
        }

        let mut summary = RunSummary {
            campaign_id: campaign_id.to_string(),
            run_id: span.run_id.as_str(),
            status: CampaignStatus::Sending,
            batches_planned: batches.len(),
            batches_processed: 0,
            counts: RecipientCounts::default(),
            recovery,
        };

        for batch in &batches {
            if batch.index > 0 {
                tokio::time::sleep(ctx.send_interval).await;
            }

            match self.locks.signal(campaign_id) {
                Some(ControlSignal::Cancel) => {
                    info!(batch_index = batch.index, "run cancelled");
                    return self.finish(summary, CampaignStatus::Failed).await;
                }
                Some(ControlSignal::Pause) => {
                    info!(batch_index = batch.index, "run paused");
                    return self.finish(summary, CampaignStatus::Paused).await;
                }
                None => {}
            }

            let outcome = self.process_batch(&ctx, batch).await?;
            summary.batches_processed += 1;
            self.sync_progress(campaign_id).await?;

            if !outcome.is_success() {
                match BATCH_FAILURE_POLICY {
                    BatchFailurePolicy::Continue => {}
                    BatchFailurePolicy::Abort => {
                        return self.finish(summary, CampaignStatus::Failed).await;
                    }
                }
            }
        }

        let counts = self.store.recipient_counts(campaign_id).await?;
        let status = if counts.pending == 0 && counts.processing == 0 {
            CampaignStatus::Completed
        } else {
            // recipients added while the run was in flight
            CampaignStatus::Paused
        };
        self.finish(summary, status).await
    }

    async fn finish(
        &self,
        mut summary: RunSummary,
        status: CampaignStatus,
    ) -> Result<RunSummary, ExecutorError> {
        self.store
            .update_campaign_status(&summary.campaign_id, status)
            .await?;
        summary.counts = self.sync_progress(&summary.campaign_id).await?;
        summary.status = status;
        if status.is_terminal() {
            self.locks.clear_signals(&summary.campaign_id);
        }
        Ok(summary)
    }

    /// Copy recipient totals onto the campaign row
    async fn sync_progress(&self, campaign_id: &str) -> Result<RecipientCounts, ExecutorError> {
        let counts = self.store.recipient_counts(campaign_id).await?;
        self.store
            .update_campaign_progress(campaign_id, counts.completed, counts.failed)
            .await?;
        Ok(counts)
    }

    pub(crate) fn resolve(&self, campaign: Campaign) -> Result<RunContext, ExecutorError> {
        let family = campaign.chain_family;
        let chain_key = campaign.chain_id.as_str();

        let profile = self
            .planner
            .chains()
            .get(family, chain_key)
            .cloned()
            .ok_or_else(|| {
                ExecutorError::Configuration(format!("no chain profile for {family} chain {chain_key}"))
            })?;

        let adapter = self.adapters.get(family, chain_key).ok_or_else(|| {
            ExecutorError::Configuration(format!("no chain adapter for {family} chain {chain_key}"))
        })?;

        let wallet_ref = campaign
            .wallet_ref
            .clone()
            .filter(|w| !w.is_empty())
            .ok_or_else(|| {
                ExecutorError::Configuration(format!(
                    "campaign {} has no wallet reference",
                    campaign.id
                ))
            })?;

        if adapter.requires_contract() && campaign.contract_ref.is_none() {
            return Err(ExecutorError::Configuration(format!(
                "campaign {} has no deployed distribution contract",
                campaign.id
            )));
        }

        let send_interval = if campaign.send_interval_ms > 0 {
            Duration::from_millis(campaign.send_interval_ms)
        } else {
            self.config.default_send_interval
        };

        Ok(RunContext {
            campaign,
            profile,
            adapter,
            wallet_ref,
            send_interval,
        })
    }

    fn validate_recipients(
        &self,
        ctx: &RunContext,
        recipients: &[Recipient],
    ) -> Result<(), ExecutorError> {
        for recipient in recipients {
            if !ctx.adapter.validate_address(&recipient.address) {
                return Err(ExecutorError::Validation(format!(
                    "invalid address {}",
                    recipient.address
                )));
            }
            parse_amount(&recipient.amount).map_err(|e| {
                ExecutorError::Validation(format!("recipient {}: {e}", recipient.address))
            })?;
        }
        Ok(())
    }

    /// Log the expected cost of the plan; failure to estimate is not fatal
    async fn preview_fees(&self, ctx: &RunContext, batches: &[Batch]) {
        let query = FeeQuery {
            chain_key: ctx.campaign.chain_id.clone(),
            token: ctx.campaign.token_address.clone(),
            wallet_ref: Some(ctx.wallet_ref.clone()),
            batch_sizes: batches.iter().map(Batch::len).collect(),
        };
        match ctx.adapter.estimate_fee(&query).await {
            Ok(fee) => info!(
                batches = batches.len(),
                total = %fee.total,
                unit = %fee.unit,
                "estimated fees"
            ),
            Err(err) => warn!(error = %err, "fee estimate unavailable"),
        }
    }

    async fn process_batch(
        &self,
        ctx: &RunContext,
        batch: &Batch,
    ) -> Result<BatchOutcome, ExecutorError> {
        let campaign_id = ctx.campaign.id.as_str();

        for address in batch.addresses() {
            self.store
                .update_recipient_status(campaign_id, address, RecipientStatus::Processing, None, None)
                .await?;
        }

        let transfer_batch = TransferBatch {
            campaign_id: campaign_id.to_string(),
            chain_key: ctx.campaign.chain_id.clone(),
            token: ctx.campaign.token_address.clone(),
            contract: ctx.campaign.contract_ref.clone(),
            wallet_ref: ctx.wallet_ref.clone(),
            transfers: batch.transfers(),
        };

        let attempts = AtomicU32::new(0);
        let submitted = {
            let counter = &attempts;
            let adapter = ctx.adapter.as_ref();
            let transfer_batch = &transfer_batch;
            self.config
                .submit_policy
                .execute_classified(move || {
                    counter.fetch_add(1, Ordering::SeqCst);
                    adapter.submit_batch(transfer_batch)
                })
                .await
        };
        self.metrics
            .record_retries("submit", attempts.load(Ordering::SeqCst));

        let tx_hash = match submitted {
            Ok(tx_hash) => tx_hash,
            Err(err) => {
                let attempts = err.attempts();
                let chain_error = err.into_inner();
                let kind = ErrorKind::of_chain_error(&chain_error);
                warn!(
                    batch_index = batch.index,
                    attempts,
                    kind = ?kind,
                    error = %chain_error,
                    outcome = "submit_failed",
                    "batch submission failed"
                );

                let outcome = BatchOutcome::Failed {
                    tx_hash: None,
                    kind,
                    error: chain_error.to_string(),
                };
                self.apply_outcome(ctx, batch, &outcome).await?;
                if kind.is_campaign_fatal() {
                    return Err(chain_error.into());
                }
                return Ok(outcome);
            }
        };

        self.metrics
            .record_batch_submitted(ctx.campaign.chain_family, batch.len());
        self.store
            .record_transaction(&TransactionRecord::pending(
                &tx_hash,
                campaign_id,
                TransactionKind::BatchSend,
                batch.len() as u32,
            ))
            .await?;
        for address in batch.addresses() {
            self.store
                .update_recipient_status(
                    campaign_id,
                    address,
                    RecipientStatus::Processing,
                    Some(&tx_hash),
                    None,
                )
                .await?;
        }

        info!(
            batch_index = batch.index,
            tx_hash = %tx_hash,
            recipients = batch.len(),
            "batch submitted"
        );
        self.events.publish(ProgressEvent::BatchSubmitted {
            campaign_id: campaign_id.to_string(),
            batch_index: batch.index,
            tx_hash: tx_hash.clone(),
            recipients: batch.len(),
        });

        let confirmation = self
            .tracker
            .wait_for(&ctx.profile, ctx.adapter.as_ref(), &tx_hash)
            .await;
        self.metrics.record_confirmation(
            ctx.campaign.chain_family,
            confirmation.outcome.as_str(),
            confirmation.elapsed,
            confirmation.attempts,
        );

        let outcome = match confirmation.outcome {
            ConfirmationOutcome::Confirmed => {
                self.store
                    .update_transaction_status(
                        &tx_hash,
                        TransactionStatus::Confirmed,
                        confirmation.block_number,
                        confirmation.gas_used,
                    )
                    .await?;
                BatchOutcome::Confirmed {
                    tx_hash,
                    block_number: confirmation.block_number,
                    gas_used: confirmation.gas_used,
                }
            }
            ConfirmationOutcome::Failed => {
                self.store
                    .update_transaction_status(
                        &tx_hash,
                        TransactionStatus::Failed,
                        confirmation.block_number,
                        confirmation.gas_used,
                    )
                    .await?;
                BatchOutcome::Failed {
                    error: format!("transaction {tx_hash} failed on chain"),
                    tx_hash: Some(tx_hash),
                    kind: ErrorKind::ChainState,
                }
            }
            // the transaction stays PENDING; it may still land
            ConfirmationOutcome::Timeout => BatchOutcome::TimedOut {
                tx_hash,
                elapsed: confirmation.elapsed,
            },
        };

        self.apply_outcome(ctx, batch, &outcome).await?;
        Ok(outcome)
    }

    async fn apply_outcome(
        &self,
        ctx: &RunContext,
        batch: &Batch,
        outcome: &BatchOutcome,
    ) -> Result<(), ExecutorError> {
        let campaign_id = ctx.campaign.id.as_str();
        let status = outcome.recipient_status();
        let error = outcome.error_message();

        for address in batch.addresses() {
            self.store
                .update_recipient_status(
                    campaign_id,
                    address,
                    status,
                    outcome.tx_hash(),
                    error.as_deref(),
                )
                .await?;
        }

        self.metrics.record_batch_result(outcome.metric(), batch.len());
        self.events.publish(ProgressEvent::BatchFinished {
            campaign_id: campaign_id.to_string(),
            batch_index: batch.index,
            outcome: outcome.label().to_string(),
            recipients: batch.len(),
        });
        debug!(
            batch_index = batch.index,
            outcome = outcome.label(),
            "batch finished"
        );
        Ok(())
    }

    /// Deploy the campaign's distribution contract and move it to READY.
    ///
    /// Holds both the deploy and execution keys so a deployment never races a
    /// run. Families that send directly skip deployment and go straight to
    /// READY.
    pub async fn deploy_contract(&self, campaign_id: &str) -> Result<DeployOutcome, ExecutorError> {
        let keys = vec![
            LockKey::Deploy(campaign_id.to_string()),
            LockKey::Execute(campaign_id.to_string()),
        ];
        let Some(_guard) = self.locks.try_acquire_all(keys) else {
            self.metrics.record_lock_contention("deploy");
            warn!(campaign_id, "deploy rejected, campaign already executing");
            return Err(ExecutorError::AlreadyExecuting(campaign_id.to_string()));
        };

        let campaign = self
            .store
            .load_campaign(campaign_id)
            .await?
            .ok_or_else(|| ExecutorError::CampaignNotFound(campaign_id.to_string()))?;

        if campaign.status != CampaignStatus::Created {
            return Err(ExecutorError::InvalidState {
                campaign_id: campaign_id.to_string(),
                operation: "deploy",
                status: campaign.status,
            });
        }

        let adapter = self
            .adapters
            .get(campaign.chain_family, &campaign.chain_id)
            .ok_or_else(|| {
                ExecutorError::Configuration(format!(
                    "no chain adapter for {} chain {}",
                    campaign.chain_family, campaign.chain_id
                ))
            })?;

        if !adapter.requires_contract() {
            self.store
                .update_campaign_status(campaign_id, CampaignStatus::Ready)
                .await?;
            info!(campaign_id, "no contract required, campaign ready");
            return Ok(DeployOutcome::NotRequired);
        }

        if let Some(receipt) = self.resume_deployment(campaign_id, adapter.as_ref()).await? {
            return self.complete_deployment(campaign_id, receipt).await;
        }

        let wallet_ref = campaign
            .wallet_ref
            .clone()
            .filter(|w| !w.is_empty())
            .ok_or_else(|| {
                ExecutorError::Configuration(format!("campaign {campaign_id} has no wallet reference"))
            })?;

        let request = DeployRequest {
            campaign_id: campaign_id.to_string(),
            chain_key: campaign.chain_id.clone(),
            token: campaign.token_address.clone(),
            wallet_ref,
        };

        info!(campaign_id, chain = %campaign.chain_id, "deploying distribution contract");
        // single attempt: a retried deployment could land twice
        let receipt = match adapter.deploy_contract(&request).await {
            Ok(receipt) => receipt,
            Err(ChainError::Unconfirmed { tx_hash, message }) => {
                self.metrics.record_deployment(false);
                self.store
                    .record_transaction(&TransactionRecord::pending(
                        &tx_hash,
                        campaign_id,
                        TransactionKind::DeployContract,
                        0,
                    ))
                    .await?;
                warn!(campaign_id, tx_hash = %tx_hash, reason = %message, "deployment unconfirmed");
                return Err(ExecutorError::DeploymentPending {
                    campaign_id: campaign_id.to_string(),
                    tx_hash,
                });
            }
            Err(err) => {
                self.metrics.record_deployment(false);
                error!(campaign_id, error = %err, "deployment failed");
                return Err(err.into());
            }
        };
        self.complete_deployment(campaign_id, receipt).await
    }

    /// Resolve a deployment an earlier call broadcast but never saw mined.
    ///
    /// Returns its receipt once mined. A reverted one is marked failed so a
    /// fresh deployment can go out; one still pending blocks redeployment.
    async fn resume_deployment(
        &self,
        campaign_id: &str,
        adapter: &dyn ChainAdapter,
    ) -> Result<Option<DeployReceipt>, ExecutorError> {
        let pending = self
            .store
            .list_transactions(campaign_id)
            .await?
            .into_iter()
            .find(|tx| {
                tx.kind == TransactionKind::DeployContract && tx.status == TransactionStatus::Pending
            });
        let Some(pending) = pending else {
            return Ok(None);
        };

        match adapter.deployment_status(&pending.tx_hash).await {
            Ok(Some(receipt)) => {
                info!(campaign_id, tx_hash = %pending.tx_hash, "earlier deployment mined");
                Ok(Some(receipt))
            }
            Ok(None) => Err(ExecutorError::DeploymentPending {
                campaign_id: campaign_id.to_string(),
                tx_hash: pending.tx_hash,
            }),
            Err(ChainError::Reverted(reason)) => {
                self.store
                    .update_transaction_status(&pending.tx_hash, TransactionStatus::Failed, None, None)
                    .await?;
                warn!(campaign_id, tx_hash = %pending.tx_hash, reason = %reason, "earlier deployment reverted");
                Ok(None)
            }
            Err(err) => Err(err.into()),
        }
    }

    async fn complete_deployment(
        &self,
        campaign_id: &str,
        receipt: DeployReceipt,
    ) -> Result<DeployOutcome, ExecutorError> {
        self.metrics.record_deployment(true);

        let mut record = TransactionRecord::pending(
            &receipt.tx_hash,
            campaign_id,
            TransactionKind::DeployContract,
            0,
        );
        record.status = TransactionStatus::Confirmed;
        record.block_number = Some(receipt.block_number);
        record.gas_used = Some(receipt.gas_used);
        self.store.record_transaction(&record).await?;

        self.store
            .set_contract_ref(campaign_id, &receipt.contract_address)
            .await?;
        self.store
            .update_campaign_status(campaign_id, CampaignStatus::Ready)
            .await?;

        info!(
            campaign_id,
            contract = %receipt.contract_address,
            tx_hash = %receipt.tx_hash,
            "distribution contract deployed"
        );
        Ok(DeployOutcome::Deployed(receipt))
    }
}
