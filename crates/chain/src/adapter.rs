use async_trait::async_trait;
use payout_types::{parse_amount, ChainFamily, Transfer};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;

use crate::ChainError;

/// One batch of transfers to submit as a single transaction
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TransferBatch {
    pub campaign_id: String,
    pub chain_key: String,
    /// Token contract or mint; `None` sends the native coin
    pub token: Option<String>,
    /// Distribution contract, when the family needs one
    pub contract: Option<String>,
    pub wallet_ref: String,
    pub transfers: Vec<Transfer>,
}

impl TransferBatch {
    pub fn len(&self) -> usize {
        self.transfers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.transfers.is_empty()
    }

    /// Reject batches no adapter could submit
    pub fn validate_with(
        &self,
        validate_address: impl Fn(&str) -> bool,
    ) -> Result<(), ChainError> {
        if self.transfers.is_empty() {
            return Err(ChainError::InvalidInput("empty recipient list".to_string()));
        }
        for transfer in &self.transfers {
            if !validate_address(&transfer.address) {
                return Err(ChainError::InvalidInput(format!(
                    "invalid address: {}",
                    transfer.address
                )));
            }
            parse_amount(&transfer.amount)
                .map_err(|e| ChainError::InvalidInput(e.to_string()))?;
        }
        Ok(())
    }
}

/// On-chain state of a submitted transaction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TxStatus {
    Pending,
    Confirmed,
    Failed,
}

impl TxStatus {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, TxStatus::Pending)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TxStatusReport {
    pub status: TxStatus,
    pub block_number: Option<u64>,
    pub gas_used: Option<u64>,
}

impl TxStatusReport {
    pub fn pending() -> Self {
        Self {
            status: TxStatus::Pending,
            block_number: None,
            gas_used: None,
        }
    }

    pub fn confirmed(block_number: u64, gas_used: Option<u64>) -> Self {
        Self {
            status: TxStatus::Confirmed,
            block_number: Some(block_number),
            gas_used,
        }
    }

    pub fn failed(block_number: Option<u64>, gas_used: Option<u64>) -> Self {
        Self {
            status: TxStatus::Failed,
            block_number,
            gas_used,
        }
    }
}

/// Parameters for deploying a campaign's distribution contract
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeployRequest {
    pub campaign_id: String,
    pub chain_key: String,
    pub token: Option<String>,
    pub wallet_ref: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeployReceipt {
    pub contract_address: String,
    pub tx_hash: String,
    pub block_number: u64,
    pub gas_used: u64,
}

/// Fee preview request for a planned set of batches
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeeQuery {
    pub chain_key: String,
    pub token: Option<String>,
    pub wallet_ref: Option<String>,
    /// Recipients per planned batch
    pub batch_sizes: Vec<usize>,
}

/// Fee estimate in the chain's smallest native unit
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeeEstimate {
    pub per_batch: Vec<u128>,
    pub total: u128,
    /// "wei" or "lamports"
    pub unit: String,
}

impl FeeEstimate {
    pub fn from_batches(per_batch: Vec<u128>, unit: impl Into<String>) -> Self {
        let total = per_batch.iter().fold(0u128, |acc, f| acc.saturating_add(*f));
        Self {
            per_batch,
            total,
            unit: unit.into(),
        }
    }
}

/// Per-family chain capability. Implementations hold no campaign state.
#[async_trait]
pub trait ChainAdapter: Send + Sync {
    fn family(&self) -> ChainFamily;

    /// Whether campaigns must deploy a distribution contract before sending
    fn requires_contract(&self) -> bool;

    fn validate_address(&self, address: &str) -> bool;

    /// Build, sign and broadcast one batch; returns the transaction hash
    async fn submit_batch(&self, batch: &TransferBatch) -> Result<String, ChainError>;

    async fn get_status(&self, tx_hash: &str) -> Result<TxStatusReport, ChainError>;

    /// Broadcast the deployment and wait for its receipt. Once the broadcast
    /// is acknowledged, failing to observe a final status yields
    /// [`ChainError::Unconfirmed`] carrying the transaction hash.
    async fn deploy_contract(&self, request: &DeployRequest) -> Result<DeployReceipt, ChainError>;

    /// Receipt of an earlier deployment; `None` while it is still pending
    async fn deployment_status(&self, tx_hash: &str) -> Result<Option<DeployReceipt>, ChainError> {
        Err(ChainError::Unsupported(format!(
            "deployment lookup for {tx_hash}"
        )))
    }

    async fn estimate_fee(&self, query: &FeeQuery) -> Result<FeeEstimate, ChainError>;
}

/// Adapters keyed by family and chain key.
///
/// A family-wide adapter answers for every chain key of that family that has
/// no dedicated entry.
#[derive(Default, Clone)]
pub struct AdapterRegistry {
    by_chain: HashMap<(ChainFamily, String), Arc<dyn ChainAdapter>>,
    by_family: HashMap<ChainFamily, Arc<dyn ChainAdapter>>,
}

impl AdapterRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, chain_key: impl Into<String>, adapter: Arc<dyn ChainAdapter>) {
        self.by_chain
            .insert((adapter.family(), chain_key.into()), adapter);
    }

    pub fn register_family(&mut self, adapter: Arc<dyn ChainAdapter>) {
        self.by_family.insert(adapter.family(), adapter);
    }

    pub fn with_family(mut self, adapter: Arc<dyn ChainAdapter>) -> Self {
        self.register_family(adapter);
        self
    }

    pub fn get(&self, family: ChainFamily, chain_key: &str) -> Option<Arc<dyn ChainAdapter>> {
        self.by_chain
            .get(&(family, chain_key.to_string()))
            .or_else(|| self.by_family.get(&family))
            .cloned()
    }

    pub fn is_empty(&self) -> bool {
        self.by_chain.is_empty() && self.by_family.is_empty()
    }
}

impl std::fmt::Debug for AdapterRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AdapterRegistry")
            .field("chains", &self.by_chain.keys().collect::<Vec<_>>())
            .field("families", &self.by_family.keys().collect::<Vec<_>>())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct StubAdapter(ChainFamily, &'static str);

    #[async_trait]
    impl ChainAdapter for StubAdapter {
        fn family(&self) -> ChainFamily {
            self.0
        }

        fn requires_contract(&self) -> bool {
            false
        }

        fn validate_address(&self, address: &str) -> bool {
            !address.is_empty()
        }

        async fn submit_batch(&self, _batch: &TransferBatch) -> Result<String, ChainError> {
            Ok(self.1.to_string())
        }

        async fn get_status(&self, _tx_hash: &str) -> Result<TxStatusReport, ChainError> {
            Ok(TxStatusReport::pending())
        }

        async fn deploy_contract(
            &self,
            _request: &DeployRequest,
        ) -> Result<DeployReceipt, ChainError> {
            Err(ChainError::Unsupported("stub".into()))
        }

        async fn estimate_fee(&self, _query: &FeeQuery) -> Result<FeeEstimate, ChainError> {
            Ok(FeeEstimate::from_batches(vec![], "wei"))
        }
    }

    #[tokio::test]
    async fn test_registry_prefers_chain_specific_adapter() {
        let mut registry = AdapterRegistry::new();
        registry.register_family(Arc::new(StubAdapter(ChainFamily::Evm, "family")));
        registry.register("137", Arc::new(StubAdapter(ChainFamily::Evm, "polygon")));

        let batch = TransferBatch {
            campaign_id: "c".into(),
            chain_key: "137".into(),
            token: None,
            contract: None,
            wallet_ref: "w".into(),
            transfers: vec![],
        };

        let polygon = registry.get(ChainFamily::Evm, "137").unwrap();
        assert_eq!(polygon.submit_batch(&batch).await.unwrap(), "polygon");

        let eth = registry.get(ChainFamily::Evm, "1").unwrap();
        assert_eq!(eth.submit_batch(&batch).await.unwrap(), "family");

        assert!(registry.get(ChainFamily::Solana, "mainnet-beta").is_none());
    }

    #[test]
    fn test_batch_validation() {
        let mut batch = TransferBatch {
            campaign_id: "c".into(),
            chain_key: "1".into(),
            token: None,
            contract: None,
            wallet_ref: "w".into(),
            transfers: vec![],
        };
        let valid = |a: &str| a.starts_with("0x");

        assert!(matches!(batch.validate_with(valid), Err(ChainError::InvalidInput(_))));

        batch.transfers.push(Transfer {
            address: "0xabc".into(),
            amount: "1.5".into(),
        });
        assert!(batch.validate_with(valid).is_ok());

        batch.transfers.push(Transfer {
            address: "abc".into(),
            amount: "1".into(),
        });
        assert!(batch.validate_with(valid).is_err());

        batch.transfers.pop();
        batch.transfers.push(Transfer {
            address: "0xdef".into(),
            amount: "0".into(),
        });
        assert!(batch.validate_with(valid).is_err());
    }

    #[test]
    fn test_fee_estimate_total() {
        let fee = FeeEstimate::from_batches(vec![100, 250, 50], "lamports");
        assert_eq!(fee.total, 400);
    }
}
