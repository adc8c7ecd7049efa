use payout_types::{CampaignStatus, RecipientStatus, TransactionStatus};
use tracing::{info, warn};

use crate::confirmation::ConfirmationOutcome;
use crate::error::ExecutorError;
use crate::executor::{Executor, RunContext};
use crate::lock::LockKey;

/// Recipients left PROCESSING by an interrupted run and what became of them
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RecoveryReport {
    /// Never broadcast, back to PENDING
    pub requeued: usize,
    pub completed: usize,
    pub failed: usize,
    /// Distinct transactions re-checked
    pub transactions: usize,
}

impl RecoveryReport {
    pub fn is_empty(&self) -> bool {
        self.requeued == 0 && self.completed == 0 && self.failed == 0
    }
}

impl Executor {
    /// Settle recipients stuck in PROCESSING before new batches are planned.
    ///
    /// Recipients without a transaction hash were never broadcast and are
    /// requeued. The rest are resolved from their transaction's on-chain
    /// status; a transaction that stays pending fails its recipients so they
    /// are never sent twice.
    pub(crate) async fn reconcile_processing(
        &self,
        ctx: &RunContext,
    ) -> Result<RecoveryReport, ExecutorError> {
        let campaign_id = ctx.campaign.id.as_str();
        let stuck = self
            .store
            .list_recipients_by_status(campaign_id, RecipientStatus::Processing)
            .await?;
        if stuck.is_empty() {
            return Ok(RecoveryReport::default());
        }

        warn!(recipients = stuck.len(), "reconciling recipients from interrupted run");

        let mut report = RecoveryReport::default();
        // submission order, one entry per transaction
        let mut by_tx: Vec<(String, Vec<String>)> = Vec::new();

        for recipient in stuck {
            match recipient.tx_hash {
                None => {
                    self.store
                        .update_recipient_status(
                            campaign_id,
                            &recipient.address,
                            RecipientStatus::Pending,
                            None,
                            None,
                        )
                        .await?;
                    report.requeued += 1;
                }
                Some(tx_hash) => match by_tx.iter_mut().find(|(hash, _)| *hash == tx_hash) {
                    Some((_, addresses)) => addresses.push(recipient.address),
                    None => by_tx.push((tx_hash, vec![recipient.address])),
                },
            }
        }

        for (tx_hash, addresses) in by_tx {
            report.transactions += 1;
            let result = self
                .tracker
                .wait_for(&ctx.profile, ctx.adapter.as_ref(), &tx_hash)
                .await;

            let (status, error) = match result.outcome {
                ConfirmationOutcome::Confirmed => {
                    self.store
                        .update_transaction_status(
                            &tx_hash,
                            TransactionStatus::Confirmed,
                            result.block_number,
                            result.gas_used,
                        )
                        .await?;
                    (RecipientStatus::Completed, None)
                }
                ConfirmationOutcome::Failed => {
                    self.store
                        .update_transaction_status(
                            &tx_hash,
                            TransactionStatus::Failed,
                            result.block_number,
                            result.gas_used,
                        )
                        .await?;
                    (
                        RecipientStatus::Failed,
                        Some(format!("transaction {tx_hash} failed on chain")),
                    )
                }
                ConfirmationOutcome::Timeout => (
                    RecipientStatus::Failed,
                    Some(format!(
                        "transaction {tx_hash} still unconfirmed after interrupted run"
                    )),
                ),
            };

            for address in &addresses {
                self.store
                    .update_recipient_status(campaign_id, address, status, None, error.as_deref())
                    .await?;
            }

            if status == RecipientStatus::Completed {
                report.completed += addresses.len();
            } else {
                report.failed += addresses.len();
            }
        }

        info!(
            requeued = report.requeued,
            completed = report.completed,
            failed = report.failed,
            transactions = report.transactions,
            "interrupted run reconciled"
        );
        Ok(report)
    }

    /// Move a campaign left SENDING by a dead process to PAUSED.
    ///
    /// Returns the campaign's status afterwards. A campaign whose run is live
    /// in this process is rejected with `AlreadyExecuting`.
    pub async fn recover_interrupted(
        &self,
        campaign_id: &str,
    ) -> Result<CampaignStatus, ExecutorError> {
        let Some(_guard) = self
            .locks
            .try_acquire(LockKey::Execute(campaign_id.to_string()))
        else {
            return Err(ExecutorError::AlreadyExecuting(campaign_id.to_string()));
        };

        let campaign = self
            .store
            .load_campaign(campaign_id)
            .await?
            .ok_or_else(|| ExecutorError::CampaignNotFound(campaign_id.to_string()))?;

        if campaign.status != CampaignStatus::Sending {
            return Ok(campaign.status);
        }

        self.store
            .update_campaign_status(campaign_id, CampaignStatus::Paused)
            .await?;
        warn!(campaign_id, "interrupted run found, campaign paused");
        Ok(CampaignStatus::Paused)
    }

    /// [`recover_interrupted`](Self::recover_interrupted) for every SENDING
    /// campaign; returns the ids that were paused
    pub async fn recover_all(&self) -> Result<Vec<String>, ExecutorError> {
        let sending = self
            .store
            .list_campaigns_by_status(CampaignStatus::Sending)
            .await?;

        let mut paused = Vec::new();
        for campaign in sending {
            match self.recover_interrupted(&campaign.id).await {
                Ok(CampaignStatus::Paused) => paused.push(campaign.id),
                Ok(_) => {}
                // live in this process
                Err(ExecutorError::AlreadyExecuting(_)) => {}
                Err(err) => return Err(err),
            }
        }

        if !paused.is_empty() {
            info!(campaigns = paused.len(), "recovered interrupted campaigns");
        }
        Ok(paused)
    }
}
