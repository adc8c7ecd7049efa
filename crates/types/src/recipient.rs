use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::ParseEnumError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RecipientStatus {
    Pending,
    Processing,
    Completed,
    Failed,
}

impl RecipientStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RecipientStatus::Pending => "PENDING",
            RecipientStatus::Processing => "PROCESSING",
            RecipientStatus::Completed => "COMPLETED",
            RecipientStatus::Failed => "FAILED",
        }
    }
}

impl fmt::Display for RecipientStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RecipientStatus {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "PENDING" => Ok(RecipientStatus::Pending),
            "PROCESSING" => Ok(RecipientStatus::Processing),
            "COMPLETED" => Ok(RecipientStatus::Completed),
            "FAILED" => Ok(RecipientStatus::Failed),
            _ => Err(ParseEnumError::new("recipient status", s)),
        }
    }
}

/// One payout target within a campaign
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Recipient {
    pub campaign_id: String,
    pub address: String,
    /// Decimal amount in display units; chain precision is applied by the adapter
    pub amount: String,
    pub status: RecipientStatus,
    pub tx_hash: Option<String>,
    pub error: Option<String>,
    /// Insertion order within the campaign
    pub position: u64,
}

impl Recipient {
    pub fn new(
        campaign_id: impl Into<String>,
        address: impl Into<String>,
        amount: impl Into<String>,
        position: u64,
    ) -> Self {
        Self {
            campaign_id: campaign_id.into(),
            address: address.into(),
            amount: amount.into(),
            status: RecipientStatus::Pending,
            tx_hash: None,
            error: None,
            position,
        }
    }

    pub fn to_transfer(&self) -> Transfer {
        Transfer {
            address: self.address.clone(),
            amount: self.amount.clone(),
        }
    }
}

/// Address/amount pair handed to a chain adapter
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Transfer {
    pub address: String,
    pub amount: String,
}

/// Parse a recipient amount, rejecting zero, negative and malformed values
pub fn parse_amount(amount: &str) -> Result<Decimal, AmountError> {
    let value = Decimal::from_str(amount.trim())
        .map_err(|_| AmountError::Malformed(amount.to_string()))?;
    if value <= Decimal::ZERO {
        return Err(AmountError::NotPositive(amount.to_string()));
    }
    Ok(value)
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AmountError {
    #[error("malformed amount: {0}")]
    Malformed(String),

    #[error("amount must be positive: {0}")]
    NotPositive(String),
}

/// Per-status recipient totals for one campaign
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecipientCounts {
    pub pending: u64,
    pub processing: u64,
    pub completed: u64,
    pub failed: u64,
}

impl RecipientCounts {
    pub fn total(&self) -> u64 {
        self.pending + self.processing + self.completed + self.failed
    }

    pub fn add(&mut self, status: RecipientStatus) {
        match status {
            RecipientStatus::Pending => self.pending += 1,
            RecipientStatus::Processing => self.processing += 1,
            RecipientStatus::Completed => self.completed += 1,
            RecipientStatus::Failed => self.failed += 1,
        }
    }
}
