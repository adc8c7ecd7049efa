use async_trait::async_trait;
use payout_types::{
    current_timestamp, Campaign, CampaignStatus, ChainFamily, Recipient, RecipientCounts,
    RecipientStatus, TransactionKind, TransactionRecord, TransactionStatus,
};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions, SqliteRow};
use sqlx::{Row, SqlitePool};
use std::str::FromStr;
use tracing::debug;

use crate::store::{CampaignStore, StoreError};

// ═══════════════════════════════════════════════════════════════════════════
// SQLITE STORE IMPLEMENTATION
// ═══════════════════════════════════════════════════════════════════════════

const MIGRATIONS: &[&str] = &[
    include_str!("../migrations/001_create_campaigns.sql"),
    include_str!("../migrations/002_create_recipients.sql"),
    include_str!("../migrations/003_create_recipient_status_index.sql"),
    include_str!("../migrations/004_create_transactions.sql"),
];

pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    /// Open (creating if missing) the database at `url`, e.g. `sqlite://payout.db`
    pub async fn connect(url: &str) -> Result<Self, StoreError> {
        let options = SqliteConnectOptions::from_str(url)
            .map_err(|e| StoreError::ConnectionError(e.to_string()))?
            .create_if_missing(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(4)
            .connect_with(options)
            .await
            .map_err(|e| StoreError::ConnectionError(e.to_string()))?;

        let store = Self { pool };
        store.run_migrations().await?;
        Ok(store)
    }

    /// Create an in-memory SQLite database (for testing)
    pub async fn in_memory() -> Result<Self, StoreError> {
        // every connection to :memory: is a separate database
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .map_err(|e| StoreError::ConnectionError(e.to_string()))?;

        let store = Self { pool };
        store.run_migrations().await?;
        Ok(store)
    }

    async fn run_migrations(&self) -> Result<(), StoreError> {
        for migration in MIGRATIONS {
            sqlx::query(migration)
                .execute(&self.pool)
                .await
                .map_err(db_err)?;
        }
        debug!(count = MIGRATIONS.len(), "sqlite migrations applied");
        Ok(())
    }

    fn row_to_campaign(row: &SqliteRow) -> Result<Campaign, StoreError> {
        Ok(Campaign {
            id: row.get("id"),
            chain_family: ChainFamily::from_str(row.get::<&str, _>("chain_family"))
                .map_err(ser_err)?,
            chain_id: row.get("chain_id"),
            token_address: row.get("token_address"),
            contract_ref: row.get("contract_ref"),
            wallet_ref: row.get("wallet_ref"),
            status: CampaignStatus::from_str(row.get::<&str, _>("status")).map_err(ser_err)?,
            total_recipients: row.get::<i64, _>("total_recipients") as u64,
            completed_recipients: row.get::<i64, _>("completed_recipients") as u64,
            failed_recipients: row.get::<i64, _>("failed_recipients") as u64,
            batch_size: row.get::<i64, _>("batch_size") as u32,
            send_interval_ms: row.get::<i64, _>("send_interval_ms") as u64,
            created_at: row.get::<i64, _>("created_at") as u64,
            updated_at: row.get::<i64, _>("updated_at") as u64,
        })
    }

    fn row_to_recipient(row: &SqliteRow) -> Result<Recipient, StoreError> {
        Ok(Recipient {
            campaign_id: row.get("campaign_id"),
            address: row.get("address"),
            amount: row.get("amount"),
            status: RecipientStatus::from_str(row.get::<&str, _>("status")).map_err(ser_err)?,
            tx_hash: row.get("tx_hash"),
            error: row.get("error"),
            position: row.get::<i64, _>("position") as u64,
        })
    }

    fn row_to_transaction(row: &SqliteRow) -> Result<TransactionRecord, StoreError> {
        Ok(TransactionRecord {
            tx_hash: row.get("tx_hash"),
            campaign_id: row.get("campaign_id"),
            kind: TransactionKind::from_str(row.get::<&str, _>("kind")).map_err(ser_err)?,
            status: TransactionStatus::from_str(row.get::<&str, _>("status")).map_err(ser_err)?,
            gas_used: row.get::<Option<i64>, _>("gas_used").map(|v| v as u64),
            block_number: row.get::<Option<i64>, _>("block_number").map(|v| v as u64),
            recipient_count: row.get::<i64, _>("recipient_count") as u32,
            created_at: row.get::<i64, _>("created_at") as u64,
            updated_at: row.get::<i64, _>("updated_at") as u64,
        })
    }
}

#[async_trait]
impl CampaignStore for SqliteStore {
    async fn create_campaign(&self, campaign: &Campaign) -> Result<(), StoreError> {
        let result = sqlx::query(
            r#"
            INSERT INTO campaigns (
                id, chain_family, chain_id, token_address, contract_ref, wallet_ref,
                status, total_recipients, completed_recipients, failed_recipients,
                batch_size, send_interval_ms, created_at, updated_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&campaign.id)
        .bind(campaign.chain_family.as_str())
        .bind(&campaign.chain_id)
        .bind(&campaign.token_address)
        .bind(&campaign.contract_ref)
        .bind(&campaign.wallet_ref)
        .bind(campaign.status.as_str())
        .bind(campaign.total_recipients as i64)
        .bind(campaign.completed_recipients as i64)
        .bind(campaign.failed_recipients as i64)
        .bind(campaign.batch_size as i64)
        .bind(campaign.send_interval_ms as i64)
        .bind(campaign.created_at as i64)
        .bind(campaign.updated_at as i64)
        .execute(&self.pool)
        .await;

        match result {
            Ok(_) => Ok(()),
            Err(sqlx::Error::Database(e)) if e.is_unique_violation() => {
                Err(StoreError::DuplicateId(campaign.id.clone()))
            }
            Err(e) => Err(db_err(e)),
        }
    }

    async fn load_campaign(&self, id: &str) -> Result<Option<Campaign>, StoreError> {
        let row = sqlx::query("SELECT * FROM campaigns WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(db_err)?;

        row.as_ref().map(Self::row_to_campaign).transpose()
    }

    async fn list_campaigns_by_status(
        &self,
        status: CampaignStatus,
    ) -> Result<Vec<Campaign>, StoreError> {
        let rows = sqlx::query("SELECT * FROM campaigns WHERE status = ? ORDER BY created_at, id")
            .bind(status.as_str())
            .fetch_all(&self.pool)
            .await
            .map_err(db_err)?;

        rows.iter().map(Self::row_to_campaign).collect()
    }

    async fn update_campaign_status(
        &self,
        campaign_id: &str,
        status: CampaignStatus,
    ) -> Result<(), StoreError> {
        let result = sqlx::query("UPDATE campaigns SET status = ?, updated_at = ? WHERE id = ?")
            .bind(status.as_str())
            .bind(current_timestamp() as i64)
            .bind(campaign_id)
            .execute(&self.pool)
            .await
            .map_err(db_err)?;
        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound(campaign_id.to_string()));
        }
        Ok(())
    }

    async fn update_campaign_progress(
        &self,
        campaign_id: &str,
        completed: u64,
        failed: u64,
    ) -> Result<(), StoreError> {
        let result = sqlx::query(
            r#"
            UPDATE campaigns
            SET completed_recipients = ?, failed_recipients = ?, updated_at = ?
            WHERE id = ?
            "#,
        )
        .bind(completed as i64)
        .bind(failed as i64)
        .bind(current_timestamp() as i64)
        .bind(campaign_id)
        .execute(&self.pool)
        .await
        .map_err(db_err)?;
        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound(campaign_id.to_string()));
        }
        Ok(())
    }

    async fn set_contract_ref(&self, campaign_id: &str, contract: &str) -> Result<(), StoreError> {
        let result = sqlx::query("UPDATE campaigns SET contract_ref = ?, updated_at = ? WHERE id = ?")
            .bind(contract)
            .bind(current_timestamp() as i64)
            .bind(campaign_id)
            .execute(&self.pool)
            .await
            .map_err(db_err)?;
        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound(campaign_id.to_string()));
        }
        Ok(())
    }

    async fn add_recipients(
        &self,
        campaign_id: &str,
        recipients: &[Recipient],
    ) -> Result<(), StoreError> {
        let mut tx = self.pool.begin().await.map_err(db_err)?;

        for recipient in recipients {
            let result = sqlx::query(
                r#"
                INSERT INTO recipients (
                    campaign_id, address, amount, status, tx_hash, error, position
                ) VALUES (?, ?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(campaign_id)
            .bind(&recipient.address)
            .bind(&recipient.amount)
            .bind(recipient.status.as_str())
            .bind(&recipient.tx_hash)
            .bind(&recipient.error)
            .bind(recipient.position as i64)
            .execute(&mut *tx)
            .await;

            match result {
                Ok(_) => {}
                Err(sqlx::Error::Database(e)) if e.is_unique_violation() => {
                    return Err(StoreError::DuplicateId(format!(
                        "{campaign_id}/{}",
                        recipient.address
                    )));
                }
                Err(sqlx::Error::Database(e)) if e.is_foreign_key_violation() => {
                    return Err(StoreError::NotFound(campaign_id.to_string()));
                }
                Err(e) => return Err(db_err(e)),
            }
        }

        let result = sqlx::query(
            r#"
            UPDATE campaigns
            SET total_recipients = total_recipients + ?, updated_at = ?
            WHERE id = ?
            "#,
        )
        .bind(recipients.len() as i64)
        .bind(current_timestamp() as i64)
        .bind(campaign_id)
        .execute(&mut *tx)
        .await
        .map_err(db_err)?;
        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound(campaign_id.to_string()));
        }

        tx.commit().await.map_err(db_err)
    }

    async fn list_recipients_by_status(
        &self,
        campaign_id: &str,
        status: RecipientStatus,
    ) -> Result<Vec<Recipient>, StoreError> {
        let rows = sqlx::query(
            "SELECT * FROM recipients WHERE campaign_id = ? AND status = ? ORDER BY position",
        )
        .bind(campaign_id)
        .bind(status.as_str())
        .fetch_all(&self.pool)
        .await
        .map_err(db_err)?;

        rows.iter().map(Self::row_to_recipient).collect()
    }

    async fn update_recipient_status(
        &self,
        campaign_id: &str,
        address: &str,
        status: RecipientStatus,
        tx_hash: Option<&str>,
        error: Option<&str>,
    ) -> Result<(), StoreError> {
        let result = sqlx::query(
            r#"
            UPDATE recipients
            SET status = ?, tx_hash = COALESCE(?, tx_hash), error = ?
            WHERE campaign_id = ? AND address = ?
            "#,
        )
        .bind(status.as_str())
        .bind(tx_hash)
        .bind(error)
        .bind(campaign_id)
        .bind(address)
        .execute(&self.pool)
        .await
        .map_err(db_err)?;

        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound(format!("{campaign_id}/{address}")));
        }
        Ok(())
    }

    async fn recipient_counts(&self, campaign_id: &str) -> Result<RecipientCounts, StoreError> {
        let rows = sqlx::query(
            "SELECT status, COUNT(*) AS n FROM recipients WHERE campaign_id = ? GROUP BY status",
        )
        .bind(campaign_id)
        .fetch_all(&self.pool)
        .await
        .map_err(db_err)?;

        let mut counts = RecipientCounts::default();
        for row in &rows {
            let n = row.get::<i64, _>("n") as u64;
            match RecipientStatus::from_str(row.get::<&str, _>("status")).map_err(ser_err)? {
                RecipientStatus::Pending => counts.pending = n,
                RecipientStatus::Processing => counts.processing = n,
                RecipientStatus::Completed => counts.completed = n,
                RecipientStatus::Failed => counts.failed = n,
            }
        }
        Ok(counts)
    }

    async fn record_transaction(&self, tx: &TransactionRecord) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO transactions (
                tx_hash, campaign_id, kind, status, gas_used, block_number,
                recipient_count, created_at, updated_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(tx_hash) DO UPDATE SET
                status = excluded.status,
                gas_used = excluded.gas_used,
                block_number = excluded.block_number,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(&tx.tx_hash)
        .bind(&tx.campaign_id)
        .bind(tx.kind.as_str())
        .bind(tx.status.as_str())
        .bind(tx.gas_used.map(|v| v as i64))
        .bind(tx.block_number.map(|v| v as i64))
        .bind(tx.recipient_count as i64)
        .bind(tx.created_at as i64)
        .bind(tx.updated_at as i64)
        .execute(&self.pool)
        .await
        .map_err(db_err)?;
        Ok(())
    }

    async fn update_transaction_status(
        &self,
        tx_hash: &str,
        status: TransactionStatus,
        block_number: Option<u64>,
        gas_used: Option<u64>,
    ) -> Result<(), StoreError> {
        let result = sqlx::query(
            r#"
            UPDATE transactions
            SET status = ?,
                block_number = COALESCE(?, block_number),
                gas_used = COALESCE(?, gas_used),
                updated_at = ?
            WHERE tx_hash = ?
            "#,
        )
        .bind(status.as_str())
        .bind(block_number.map(|v| v as i64))
        .bind(gas_used.map(|v| v as i64))
        .bind(current_timestamp() as i64)
        .bind(tx_hash)
        .execute(&self.pool)
        .await
        .map_err(db_err)?;

        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound(tx_hash.to_string()));
        }
        Ok(())
    }

    async fn get_transaction(&self, tx_hash: &str) -> Result<Option<TransactionRecord>, StoreError> {
        let row = sqlx::query("SELECT * FROM transactions WHERE tx_hash = ?")
            .bind(tx_hash)
            .fetch_optional(&self.pool)
            .await
            .map_err(db_err)?;

        row.as_ref().map(Self::row_to_transaction).transpose()
    }

    async fn list_transactions(
        &self,
        campaign_id: &str,
    ) -> Result<Vec<TransactionRecord>, StoreError> {
        let rows = sqlx::query(
            "SELECT * FROM transactions WHERE campaign_id = ? ORDER BY created_at, rowid",
        )
        .bind(campaign_id)
        .fetch_all(&self.pool)
        .await
        .map_err(db_err)?;

        rows.iter().map(Self::row_to_transaction).collect()
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// HELPER FUNCTIONS
// ═══════════════════════════════════════════════════════════════════════════

fn db_err(e: sqlx::Error) -> StoreError {
    StoreError::DatabaseError(e.to_string())
}

fn ser_err(e: payout_types::ParseEnumError) -> StoreError {
    StoreError::SerializationError(e.to_string())
}
