use async_trait::async_trait;
use payout_types::{
    current_timestamp, Campaign, CampaignStatus, Recipient, RecipientCounts, RecipientStatus,
    TransactionRecord, TransactionStatus,
};
use std::collections::HashMap;
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};
use thiserror::Error;

// ═══════════════════════════════════════════════════════════════════════════
// ERROR TYPES
// ═══════════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum StoreError {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("duplicate ID: {0}")]
    DuplicateId(String),

    #[error("database error: {0}")]
    DatabaseError(String),

    #[error("serialization error: {0}")]
    SerializationError(String),

    #[error("connection error: {0}")]
    ConnectionError(String),
}

// ═══════════════════════════════════════════════════════════════════════════
// STORE TRAIT
// ═══════════════════════════════════════════════════════════════════════════

/// Durable campaign state. Every call is atomic for the entity it touches;
/// callers never rely on a transaction spanning several calls.
#[async_trait]
pub trait CampaignStore: Send + Sync {
    /// Store a new campaign
    async fn create_campaign(&self, campaign: &Campaign) -> Result<(), StoreError>;

    async fn load_campaign(&self, id: &str) -> Result<Option<Campaign>, StoreError>;

    async fn list_campaigns_by_status(
        &self,
        status: CampaignStatus,
    ) -> Result<Vec<Campaign>, StoreError>;

    async fn update_campaign_status(
        &self,
        campaign_id: &str,
        status: CampaignStatus,
    ) -> Result<(), StoreError>;

    /// Overwrite the completed/failed counters
    async fn update_campaign_progress(
        &self,
        campaign_id: &str,
        completed: u64,
        failed: u64,
    ) -> Result<(), StoreError>;

    async fn set_contract_ref(&self, campaign_id: &str, contract: &str) -> Result<(), StoreError>;

    /// Append recipients and grow `total_recipients`; an address already in
    /// the campaign rejects the whole call
    async fn add_recipients(
        &self,
        campaign_id: &str,
        recipients: &[Recipient],
    ) -> Result<(), StoreError>;

    /// Pending recipients in load order
    async fn list_pending_recipients(&self, campaign_id: &str) -> Result<Vec<Recipient>, StoreError> {
        self.list_recipients_by_status(campaign_id, RecipientStatus::Pending)
            .await
    }

    /// Recipients with `status`, in load order
    async fn list_recipients_by_status(
        &self,
        campaign_id: &str,
        status: RecipientStatus,
    ) -> Result<Vec<Recipient>, StoreError>;

    /// Set a recipient's status and error. `tx_hash` is only written when
    /// given; `error` is always overwritten.
    async fn update_recipient_status(
        &self,
        campaign_id: &str,
        address: &str,
        status: RecipientStatus,
        tx_hash: Option<&str>,
        error: Option<&str>,
    ) -> Result<(), StoreError>;

    async fn recipient_counts(&self, campaign_id: &str) -> Result<RecipientCounts, StoreError>;

    /// Insert or replace a transaction keyed by hash
    async fn record_transaction(&self, tx: &TransactionRecord) -> Result<(), StoreError>;

    async fn update_transaction_status(
        &self,
        tx_hash: &str,
        status: TransactionStatus,
        block_number: Option<u64>,
        gas_used: Option<u64>,
    ) -> Result<(), StoreError>;

    async fn get_transaction(&self, tx_hash: &str) -> Result<Option<TransactionRecord>, StoreError>;

    /// Transactions for a campaign, oldest first
    async fn list_transactions(&self, campaign_id: &str)
        -> Result<Vec<TransactionRecord>, StoreError>;
}

// ═══════════════════════════════════════════════════════════════════════════
// IN-MEMORY STORE (for testing)
// ═══════════════════════════════════════════════════════════════════════════

#[derive(Debug, Default)]
struct RecipientTable {
    rows: Vec<Recipient>,
    index: HashMap<String, usize>,
}

#[derive(Debug, Default)]
struct Tables {
    campaigns: HashMap<String, Campaign>,
    recipients: HashMap<String, RecipientTable>,
    transactions: HashMap<String, TransactionRecord>,
    // insertion order for list_transactions
    tx_order: Vec<String>,
}

#[derive(Debug, Default, Clone)]
pub struct InMemoryStore {
    tables: Arc<RwLock<Tables>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, Tables>, StoreError> {
        self.tables
            .read()
            .map_err(|_| StoreError::DatabaseError("store lock poisoned".to_string()))
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, Tables>, StoreError> {
        self.tables
            .write()
            .map_err(|_| StoreError::DatabaseError("store lock poisoned".to_string()))
    }

    /// Number of campaigns (for testing)
    pub fn len(&self) -> usize {
        self.read().map(|t| t.campaigns.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl CampaignStore for InMemoryStore {
    async fn create_campaign(&self, campaign: &Campaign) -> Result<(), StoreError> {
        let mut tables = self.write()?;
        if tables.campaigns.contains_key(&campaign.id) {
            return Err(StoreError::DuplicateId(campaign.id.clone()));
        }
        tables
            .campaigns
            .insert(campaign.id.clone(), campaign.clone());
        tables.recipients.entry(campaign.id.clone()).or_default();
        Ok(())
    }

    async fn load_campaign(&self, id: &str) -> Result<Option<Campaign>, StoreError> {
        Ok(self.read()?.campaigns.get(id).cloned())
    }

    async fn list_campaigns_by_status(
        &self,
        status: CampaignStatus,
    ) -> Result<Vec<Campaign>, StoreError> {
        let tables = self.read()?;
        let mut campaigns: Vec<_> = tables
            .campaigns
            .values()
            .filter(|c| c.status == status)
            .cloned()
            .collect();
        campaigns.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
        Ok(campaigns)
    }

    async fn update_campaign_status(
        &self,
        campaign_id: &str,
        status: CampaignStatus,
    ) -> Result<(), StoreError> {
        let mut tables = self.write()?;
        let campaign = tables
            .campaigns
            .get_mut(campaign_id)
            .ok_or_else(|| StoreError::NotFound(campaign_id.to_string()))?;
        campaign.status = status;
        campaign.updated_at = current_timestamp();
        Ok(())
    }

    async fn update_campaign_progress(
        &self,
        campaign_id: &str,
        completed: u64,
        failed: u64,
    ) -> Result<(), StoreError> {
        let mut tables = self.write()?;
        let campaign = tables
            .campaigns
            .get_mut(campaign_id)
            .ok_or_else(|| StoreError::NotFound(campaign_id.to_string()))?;
        campaign.completed_recipients = completed;
        campaign.failed_recipients = failed;
        campaign.updated_at = current_timestamp();
        Ok(())
    }

    async fn set_contract_ref(&self, campaign_id: &str, contract: &str) -> Result<(), StoreError> {
        let mut tables = self.write()?;
        let campaign = tables
            .campaigns
            .get_mut(campaign_id)
            .ok_or_else(|| StoreError::NotFound(campaign_id.to_string()))?;
        campaign.contract_ref = Some(contract.to_string());
        campaign.updated_at = current_timestamp();
        Ok(())
    }

    async fn add_recipients(
        &self,
        campaign_id: &str,
        recipients: &[Recipient],
    ) -> Result<(), StoreError> {
        let mut tables = self.write()?;
        if !tables.campaigns.contains_key(campaign_id) {
            return Err(StoreError::NotFound(campaign_id.to_string()));
        }

        let table = tables.recipients.entry(campaign_id.to_string()).or_default();
        let mut seen = std::collections::HashSet::new();
        for recipient in recipients {
            if table.index.contains_key(&recipient.address) || !seen.insert(&recipient.address) {
                return Err(StoreError::DuplicateId(format!(
                    "{campaign_id}/{}",
                    recipient.address
                )));
            }
        }

        table.rows.extend(recipients.iter().map(|r| Recipient {
            campaign_id: campaign_id.to_string(),
            ..r.clone()
        }));
        table.rows.sort_by_key(|r| r.position);
        table.index = table
            .rows
            .iter()
            .enumerate()
            .map(|(i, r)| (r.address.clone(), i))
            .collect();

        if let Some(campaign) = tables.campaigns.get_mut(campaign_id) {
            campaign.total_recipients += recipients.len() as u64;
            campaign.updated_at = current_timestamp();
        }
        Ok(())
    }

    async fn list_recipients_by_status(
        &self,
        campaign_id: &str,
        status: RecipientStatus,
    ) -> Result<Vec<Recipient>, StoreError> {
        let tables = self.read()?;
        Ok(tables
            .recipients
            .get(campaign_id)
            .map(|t| t.rows.iter().filter(|r| r.status == status).cloned().collect())
            .unwrap_or_default())
    }

    async fn update_recipient_status(
        &self,
        campaign_id: &str,
        address: &str,
        status: RecipientStatus,
        tx_hash: Option<&str>,
        error: Option<&str>,
    ) -> Result<(), StoreError> {
        let mut tables = self.write()?;
        let table = tables
            .recipients
            .get_mut(campaign_id)
            .ok_or_else(|| StoreError::NotFound(campaign_id.to_string()))?;
        let idx = *table
            .index
            .get(address)
            .ok_or_else(|| StoreError::NotFound(format!("{campaign_id}/{address}")))?;

        let row = &mut table.rows[idx];
        row.status = status;
        if let Some(hash) = tx_hash {
            row.tx_hash = Some(hash.to_string());
        }
        row.error = error.map(str::to_string);
        Ok(())
    }

    async fn recipient_counts(&self, campaign_id: &str) -> Result<RecipientCounts, StoreError> {
        let tables = self.read()?;
        let mut counts = RecipientCounts::default();
        if let Some(table) = tables.recipients.get(campaign_id) {
            for row in &table.rows {
                counts.add(row.status);
            }
        }
        Ok(counts)
    }

    async fn record_transaction(&self, tx: &TransactionRecord) -> Result<(), StoreError> {
        let mut tables = self.write()?;
        if tables
            .transactions
            .insert(tx.tx_hash.clone(), tx.clone())
            .is_none()
        {
            tables.tx_order.push(tx.tx_hash.clone());
        }
        Ok(())
    }

    async fn update_transaction_status(
        &self,
        tx_hash: &str,
        status: TransactionStatus,
        block_number: Option<u64>,
        gas_used: Option<u64>,
    ) -> Result<(), StoreError> {
        let mut tables = self.write()?;
        let tx = tables
            .transactions
            .get_mut(tx_hash)
            .ok_or_else(|| StoreError::NotFound(tx_hash.to_string()))?;
        tx.status = status;
        if block_number.is_some() {
            tx.block_number = block_number;
        }
        if gas_used.is_some() {
            tx.gas_used = gas_used;
        }
        tx.updated_at = current_timestamp();
        Ok(())
    }

    async fn get_transaction(&self, tx_hash: &str) -> Result<Option<TransactionRecord>, StoreError> {
        Ok(self.read()?.transactions.get(tx_hash).cloned())
    }

    async fn list_transactions(
        &self,
        campaign_id: &str,
    ) -> Result<Vec<TransactionRecord>, StoreError> {
        let tables = self.read()?;
        Ok(tables
            .tx_order
            .iter()
            .filter_map(|hash| tables.transactions.get(hash))
            .filter(|tx| tx.campaign_id == campaign_id)
            .cloned()
            .collect())
    }
}
