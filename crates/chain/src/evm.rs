use async_trait::async_trait;
use payout_config::ChainConfig;
use payout_retry::{Classification, Classify};
use payout_types::ChainFamily;
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::inflight::InFlight;
use crate::profile::evm_batch_gas;
use crate::rpc::{parse_hex_u128, parse_hex_u64, JsonRpcClient};
use crate::signer::{EvmBatchCall, EvmDeployCall, EvmSigner, SignedEvmTransaction};
use crate::{
    ChainAdapter, ChainError, DeployReceipt, DeployRequest, FeeEstimate, FeeQuery, TransferBatch,
    TxStatus, TxStatusReport,
};

/// Gas limit for deploying the distribution contract
const DEPLOY_GAS_LIMIT: u64 = 2_000_000;

/// `0x` followed by 40 hex characters
pub fn is_evm_address(address: &str) -> bool {
    match address.strip_prefix("0x").or_else(|| address.strip_prefix("0X")) {
        Some(body) => body.len() == 40 && hex::decode(body).is_ok(),
        None => false,
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Receipt {
    #[serde(default)]
    status: Option<String>,
    #[serde(default)]
    block_number: Option<String>,
    #[serde(default)]
    gas_used: Option<String>,
    #[serde(default)]
    contract_address: Option<String>,
}

fn parse_receipt(receipt: Option<Receipt>) -> Result<TxStatusReport, ChainError> {
    let Some(receipt) = receipt else {
        return Ok(TxStatusReport::pending());
    };
    let Some(block_hex) = receipt.block_number.as_deref() else {
        return Ok(TxStatusReport::pending());
    };

    let block_number = parse_hex_u64(block_hex)?;
    let gas_used = receipt.gas_used.as_deref().map(parse_hex_u64).transpose()?;

    match receipt.status.as_deref() {
        Some("0x1") => Ok(TxStatusReport::confirmed(block_number, gas_used)),
        Some("0x0") => Ok(TxStatusReport::failed(Some(block_number), gas_used)),
        // pre-Byzantium receipts carry no status field
        None => Ok(TxStatusReport::confirmed(block_number, gas_used)),
        Some(other) => Err(ChainError::Rpc {
            code: 0,
            message: format!("unexpected receipt status {other}"),
        }),
    }
}

/// Deployment result from a receipt; `None` while unmined
fn deployment_from_receipt(
    tx_hash: &str,
    receipt: Option<Receipt>,
) -> Result<Option<DeployReceipt>, ChainError> {
    let Some(receipt) = receipt else {
        return Ok(None);
    };
    let address = receipt.contract_address.clone();
    let report = parse_receipt(Some(receipt))?;

    match (report.status, address) {
        (TxStatus::Pending, _) => Ok(None),
        (TxStatus::Confirmed, Some(contract_address)) => Ok(Some(DeployReceipt {
            contract_address,
            tx_hash: tx_hash.to_string(),
            block_number: report.block_number.unwrap_or_default(),
            gas_used: report.gas_used.unwrap_or_default(),
        })),
        (TxStatus::Confirmed, None) => Err(ChainError::Rpc {
            code: 0,
            message: format!("deployment {tx_hash} produced no contract address"),
        }),
        (TxStatus::Failed, _) => Err(ChainError::Reverted(format!("deployment {tx_hash} reverted"))),
    }
}

/// EVM adapter speaking plain Ethereum JSON-RPC.
///
/// A batch is signed once; retries rebroadcast the same transaction until the
/// node acknowledges it.
pub struct EvmAdapter {
    rpc: JsonRpcClient,
    signer: Arc<dyn EvmSigner>,
    chain_id: u64,
    deploy_timeout: Duration,
    deploy_poll_interval: Duration,
    in_flight: InFlight<SignedEvmTransaction>,
}

impl EvmAdapter {
    pub fn new(rpc: JsonRpcClient, signer: Arc<dyn EvmSigner>, chain_id: u64) -> Self {
        Self {
            rpc,
            signer,
            chain_id,
            deploy_timeout: Duration::from_secs(300),
            deploy_poll_interval: Duration::from_secs(2),
            in_flight: InFlight::new(),
        }
    }

    pub fn from_config(config: &ChainConfig, signer: Arc<dyn EvmSigner>) -> Result<Self, ChainError> {
        if config.family != ChainFamily::Evm {
            return Err(ChainError::Configuration(format!(
                "chain {} is not an EVM chain",
                config.chain_key
            )));
        }
        let chain_id = config.chain_key.parse::<u64>().map_err(|_| {
            ChainError::Configuration(format!("invalid EVM chain id {}", config.chain_key))
        })?;
        let rpc = JsonRpcClient::new(
            &config.rpc_url,
            Duration::from_millis(config.request_timeout_ms),
        )?;
        Ok(Self::new(rpc, signer, chain_id))
    }

    pub fn with_deploy_timeout(mut self, timeout: Duration, poll_interval: Duration) -> Self {
        self.deploy_timeout = timeout;
        self.deploy_poll_interval = poll_interval;
        self
    }

    async fn gas_price(&self) -> Result<u128, ChainError> {
        let price: String = self.rpc.call("eth_gasPrice", json!([])).await?;
        parse_hex_u128(&price)
    }

    async fn pending_nonce(&self, address: &str) -> Result<u64, ChainError> {
        let nonce: String = self
            .rpc
            .call("eth_getTransactionCount", json!([address, "pending"]))
            .await?;
        parse_hex_u64(&nonce)
    }

    async fn send_raw(&self, signed: &[u8]) -> Result<String, ChainError> {
        let raw = format!("0x{}", hex::encode(signed));
        self.rpc.call("eth_sendRawTransaction", json!([raw])).await
    }

    async fn receipt(&self, tx_hash: &str) -> Result<Option<Receipt>, ChainError> {
        self.rpc
            .call("eth_getTransactionReceipt", json!([tx_hash]))
            .await
    }

    async fn sign_batch(
        &self,
        batch: &TransferBatch,
        contract: String,
    ) -> Result<SignedEvmTransaction, ChainError> {
        let from = self.signer.address(&batch.wallet_ref).await?;
        let nonce = self.pending_nonce(&from).await?;
        let gas_price = self.gas_price().await?;

        let call = EvmBatchCall {
            chain_id: self.chain_id,
            nonce,
            gas_price,
            gas_limit: evm_batch_gas(batch.len()),
            contract,
            token: batch.token.clone(),
            transfers: batch.transfers.clone(),
        };
        let signed = self.signer.sign_batch(&batch.wallet_ref, &call).await?;
        debug!(campaign_id = %batch.campaign_id, nonce, tx_hash = %signed.tx_hash, "batch signed");
        Ok(signed)
    }
}

#[async_trait]
impl ChainAdapter for EvmAdapter {
    fn family(&self) -> ChainFamily {
        ChainFamily::Evm
    }

    fn requires_contract(&self) -> bool {
        true
    }

    fn validate_address(&self, address: &str) -> bool {
        is_evm_address(address)
    }

    async fn submit_batch(&self, batch: &TransferBatch) -> Result<String, ChainError> {
        batch.validate_with(is_evm_address)?;
        let contract = batch
            .contract
            .clone()
            .ok_or_else(|| ChainError::Configuration("distribution contract not deployed".into()))?;

        let (signed, rebroadcast) = match self.in_flight.get(batch) {
            Some(signed) => (signed, true),
            None => {
                let signed = self.sign_batch(batch, contract).await?;
                self.in_flight.insert(batch, signed.clone());
                (signed, false)
            }
        };

        let result = match self.send_raw(&signed.raw).await {
            Err(err) if rebroadcast && err.is_already_known() => {
                debug!(
                    campaign_id = %batch.campaign_id,
                    tx_hash = %signed.tx_hash,
                    error = %err,
                    "rebroadcast already known to node"
                );
                Ok(signed.tx_hash.clone())
            }
            other => other,
        };
        self.in_flight.settle(batch, &result);
        let tx_hash = result?;

        debug!(
            campaign_id = %batch.campaign_id,
            chain_id = self.chain_id,
            recipients = batch.len(),
            rebroadcast,
            tx_hash = %tx_hash,
            "batch broadcast"
        );
        Ok(tx_hash)
    }

    async fn get_status(&self, tx_hash: &str) -> Result<TxStatusReport, ChainError> {
        parse_receipt(self.receipt(tx_hash).await?)
    }

    async fn deploy_contract(&self, request: &DeployRequest) -> Result<DeployReceipt, ChainError> {
        let from = self.signer.address(&request.wallet_ref).await?;
        let call = EvmDeployCall {
            chain_id: self.chain_id,
            nonce: self.pending_nonce(&from).await?,
            gas_price: self.gas_price().await?,
            gas_limit: DEPLOY_GAS_LIMIT,
            token: request.token.clone(),
        };
        let signed = self.signer.sign_deploy(&request.wallet_ref, &call).await?;
        let tx_hash = self.send_raw(&signed.raw).await?;

        info!(campaign_id = %request.campaign_id, tx_hash = %tx_hash, "deployment broadcast");

        let deadline = tokio::time::Instant::now() + self.deploy_timeout;
        loop {
            match self.receipt(&tx_hash).await {
                Ok(receipt) => {
                    if let Some(deployed) = deployment_from_receipt(&tx_hash, receipt)? {
                        return Ok(deployed);
                    }
                }
                Err(err) if err.classify() == Classification::Retryable => {
                    warn!(tx_hash = %tx_hash, error = %err, "deployment receipt read failed, polling again");
                }
                Err(err) => {
                    return Err(ChainError::Unconfirmed {
                        tx_hash,
                        message: err.to_string(),
                    });
                }
            }

            if tokio::time::Instant::now() >= deadline {
                return Err(ChainError::Unconfirmed {
                    message: format!("not mined within {:?}", self.deploy_timeout),
                    tx_hash,
                });
            }
            tokio::time::sleep(self.deploy_poll_interval).await;
        }
    }

    async fn deployment_status(&self, tx_hash: &str) -> Result<Option<DeployReceipt>, ChainError> {
        deployment_from_receipt(tx_hash, self.receipt(tx_hash).await?)
    }

    async fn estimate_fee(&self, query: &FeeQuery) -> Result<FeeEstimate, ChainError> {
        let gas_price = self.gas_price().await?;
        let per_batch = query
            .batch_sizes
            .iter()
            .map(|n| gas_price.saturating_mul(evm_batch_gas(*n) as u128))
            .collect();
        Ok(FeeEstimate::from_batches(per_batch, "wei"))
    }
}
