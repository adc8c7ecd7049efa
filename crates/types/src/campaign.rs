use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::{current_timestamp, ParseEnumError};

/// Blockchain family a campaign pays out on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ChainFamily {
    Evm,
    Solana,
}

impl ChainFamily {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChainFamily::Evm => "EVM",
            ChainFamily::Solana => "SOLANA",
        }
    }
}

impl fmt::Display for ChainFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ChainFamily {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "EVM" => Ok(ChainFamily::Evm),
            "SOLANA" => Ok(ChainFamily::Solana),
            _ => Err(ParseEnumError::new("chain family", s)),
        }
    }
}

/// Campaign lifecycle status
///
/// `CREATED -> READY -> SENDING -> {PAUSED, COMPLETED, FAILED}` with
/// `PAUSED -> SENDING` on resume.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CampaignStatus {
    Created,
    Ready,
    Sending,
    Paused,
    Completed,
    Failed,
}

impl CampaignStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            CampaignStatus::Created => "CREATED",
            CampaignStatus::Ready => "READY",
            CampaignStatus::Sending => "SENDING",
            CampaignStatus::Paused => "PAUSED",
            CampaignStatus::Completed => "COMPLETED",
            CampaignStatus::Failed => "FAILED",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, CampaignStatus::Completed | CampaignStatus::Failed)
    }

    /// Whether a run may start from this status
    pub fn is_runnable(&self) -> bool {
        matches!(self, CampaignStatus::Ready | CampaignStatus::Paused)
    }

    pub fn can_transition_to(&self, next: CampaignStatus) -> bool {
        use CampaignStatus::*;
        matches!(
            (self, next),
            (Created, Ready)
                | (Created, Failed)
                | (Ready, Sending)
                | (Ready, Paused)
                | (Ready, Failed)
                | (Paused, Sending)
                | (Paused, Failed)
                | (Sending, Paused)
                | (Sending, Completed)
                | (Sending, Failed)
        )
    }
}

impl fmt::Display for CampaignStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CampaignStatus {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "CREATED" => Ok(CampaignStatus::Created),
            "READY" => Ok(CampaignStatus::Ready),
            "SENDING" => Ok(CampaignStatus::Sending),
            "PAUSED" => Ok(CampaignStatus::Paused),
            "COMPLETED" => Ok(CampaignStatus::Completed),
            "FAILED" => Ok(CampaignStatus::Failed),
            _ => Err(ParseEnumError::new("campaign status", s)),
        }
    }
}

/// A configured token distribution job
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Campaign {
    pub id: String,
    pub chain_family: ChainFamily,
    /// Chain key within the family, e.g. "1", "137" or "mainnet-beta"
    pub chain_id: String,
    /// Token contract or mint; `None` pays out the chain's native coin
    pub token_address: Option<String>,
    /// Distribution contract, set once deployed
    pub contract_ref: Option<String>,
    /// Opaque handle to the signing key
    pub wallet_ref: Option<String>,
    pub status: CampaignStatus,
    pub total_recipients: u64,
    pub completed_recipients: u64,
    pub failed_recipients: u64,
    /// Requested recipients per batch; zero lets the planner decide
    pub batch_size: u32,
    /// Delay between batches; zero falls back to the engine default
    pub send_interval_ms: u64,
    pub created_at: u64,
    pub updated_at: u64,
}

impl Campaign {
    pub fn new(
        id: impl Into<String>,
        chain_family: ChainFamily,
        chain_id: impl Into<String>,
        token_address: Option<String>,
        wallet_ref: impl Into<String>,
    ) -> Self {
        let now = current_timestamp();
        Self {
            id: id.into(),
            chain_family,
            chain_id: chain_id.into(),
            token_address,
            contract_ref: None,
            wallet_ref: Some(wallet_ref.into()),
            status: CampaignStatus::Created,
            total_recipients: 0,
            completed_recipients: 0,
            failed_recipients: 0,
            batch_size: 0,
            send_interval_ms: 0,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn with_batch_size(mut self, batch_size: u32) -> Self {
        self.batch_size = batch_size;
        self
    }

    pub fn with_send_interval_ms(mut self, send_interval_ms: u64) -> Self {
        self.send_interval_ms = send_interval_ms;
        self
    }

    pub fn with_status(mut self, status: CampaignStatus) -> Self {
        self.status = status;
        self
    }

    pub fn with_contract(mut self, contract_ref: impl Into<String>) -> Self {
        self.contract_ref = Some(contract_ref.into());
        self
    }

    pub fn is_native_token(&self) -> bool {
        self.token_address
            .as_deref()
            .map(|t| t.is_empty() || t.eq_ignore_ascii_case("native"))
            .unwrap_or(true)
    }

    /// Recipients neither completed nor failed
    pub fn outstanding_recipients(&self) -> u64 {
        self.total_recipients
            .saturating_sub(self.completed_recipients + self.failed_recipients)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_round_trip_strings() {
        for status in [
            CampaignStatus::Created,
            CampaignStatus::Ready,
            CampaignStatus::Sending,
            CampaignStatus::Paused,
            CampaignStatus::Completed,
            CampaignStatus::Failed,
        ] {
            assert_eq!(status.as_str().parse::<CampaignStatus>().unwrap(), status);
        }
        assert!("SENT".parse::<CampaignStatus>().is_err());
    }

    #[test]
    fn test_runnable_states() {
        assert!(CampaignStatus::Ready.is_runnable());
        assert!(CampaignStatus::Paused.is_runnable());
        assert!(!CampaignStatus::Created.is_runnable());
        assert!(!CampaignStatus::Sending.is_runnable());
        assert!(!CampaignStatus::Completed.is_runnable());
    }

    #[test]
    fn test_transitions() {
        assert!(CampaignStatus::Ready.can_transition_to(CampaignStatus::Sending));
        assert!(CampaignStatus::Paused.can_transition_to(CampaignStatus::Sending));
        assert!(CampaignStatus::Sending.can_transition_to(CampaignStatus::Completed));
        assert!(!CampaignStatus::Completed.can_transition_to(CampaignStatus::Sending));
        assert!(!CampaignStatus::Created.can_transition_to(CampaignStatus::Sending));
    }

    #[test]
    fn test_native_token_detection() {
        let native = Campaign::new("c1", ChainFamily::Solana, "mainnet-beta", None, "w");
        assert!(native.is_native_token());

        let spl = Campaign::new(
            "c2",
            ChainFamily::Solana,
            "mainnet-beta",
            Some("EPjFWdd5AufqSSqeM2qN1xzybapC8G4wEGGkZwyTDt1v".to_string()),
            "w",
        );
        assert!(!spl.is_native_token());
    }

    #[test]
    fn test_chain_family_parse_is_case_insensitive() {
        assert_eq!("evm".parse::<ChainFamily>().unwrap(), ChainFamily::Evm);
        assert_eq!("Solana".parse::<ChainFamily>().unwrap(), ChainFamily::Solana);
    }
}
