use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::{current_timestamp, ParseEnumError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TransactionKind {
    DeployContract,
    Approve,
    BatchSend,
    Withdraw,
}

impl TransactionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransactionKind::DeployContract => "DEPLOY_CONTRACT",
            TransactionKind::Approve => "APPROVE",
            TransactionKind::BatchSend => "BATCH_SEND",
            TransactionKind::Withdraw => "WITHDRAW",
        }
    }
}

impl fmt::Display for TransactionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TransactionKind {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "DEPLOY_CONTRACT" => Ok(TransactionKind::DeployContract),
            "APPROVE" => Ok(TransactionKind::Approve),
            "BATCH_SEND" => Ok(TransactionKind::BatchSend),
            "WITHDRAW" => Ok(TransactionKind::Withdraw),
            _ => Err(ParseEnumError::new("transaction kind", s)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TransactionStatus {
    Pending,
    Confirmed,
    Failed,
}

impl TransactionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransactionStatus::Pending => "PENDING",
            TransactionStatus::Confirmed => "CONFIRMED",
            TransactionStatus::Failed => "FAILED",
        }
    }
}

impl fmt::Display for TransactionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TransactionStatus {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "PENDING" => Ok(TransactionStatus::Pending),
            "CONFIRMED" => Ok(TransactionStatus::Confirmed),
            "FAILED" => Ok(TransactionStatus::Failed),
            _ => Err(ParseEnumError::new("transaction status", s)),
        }
    }
}

/// On-chain transaction submitted on behalf of a campaign.
///
/// Recorded right after submission, before the outcome is known, so an
/// interrupted run can be audited and resumed from stored state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionRecord {
    pub tx_hash: String,
    pub campaign_id: String,
    pub kind: TransactionKind,
    pub status: TransactionStatus,
    pub gas_used: Option<u64>,
    pub block_number: Option<u64>,
    pub recipient_count: u32,
    pub created_at: u64,
    pub updated_at: u64,
}

impl TransactionRecord {
    pub fn pending(
        tx_hash: impl Into<String>,
        campaign_id: impl Into<String>,
        kind: TransactionKind,
        recipient_count: u32,
    ) -> Self {
        let now = current_timestamp();
        Self {
            tx_hash: tx_hash.into(),
            campaign_id: campaign_id.into(),
            kind,
            status: TransactionStatus::Pending,
            gas_used: None,
            block_number: None,
            recipient_count,
            created_at: now,
            updated_at: now,
        }
    }
}
