use payout_types::{CampaignStatus, RecipientCounts};
use serde::Serialize;
use tokio::sync::broadcast;

/// Progress of campaign runs, published as they happen
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum ProgressEvent {
    RunStarted {
        campaign_id: String,
        run_id: String,
        pending: usize,
        batches: usize,
    },
    BatchSubmitted {
        campaign_id: String,
        batch_index: usize,
        tx_hash: String,
        recipients: usize,
    },
    BatchFinished {
        campaign_id: String,
        batch_index: usize,
        /// `confirmed`, `failed` or `timeout`
        outcome: String,
        recipients: usize,
    },
    RunFinished {
        campaign_id: String,
        status: CampaignStatus,
        counts: RecipientCounts,
    },
}

impl ProgressEvent {
    pub fn campaign_id(&self) -> &str {
        match self {
            ProgressEvent::RunStarted { campaign_id, .. }
            | ProgressEvent::BatchSubmitted { campaign_id, .. }
            | ProgressEvent::BatchFinished { campaign_id, .. }
            | ProgressEvent::RunFinished { campaign_id, .. } => campaign_id,
        }
    }
}

/// Broadcast fan-out of [`ProgressEvent`]s; lagging subscribers lose the
/// oldest events
#[derive(Debug, Clone)]
pub struct ProgressBus {
    sender: broadcast::Sender<ProgressEvent>,
}

impl ProgressBus {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ProgressEvent> {
        self.sender.subscribe()
    }

    pub fn publish(&self, event: ProgressEvent) {
        // no subscribers is fine
        let _ = self.sender.send(event);
    }
}

impl Default for ProgressBus {
    fn default() -> Self {
        Self::new(256)
    }
}
