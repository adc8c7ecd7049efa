use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use payout_config::ChainConfig;
use payout_types::ChainFamily;
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

use crate::inflight::InFlight;
use crate::rpc::JsonRpcClient;
use crate::signer::{SolanaSigner, SolanaTransferMessage};
use crate::{
    ChainAdapter, ChainError, DeployReceipt, DeployRequest, FeeEstimate, FeeQuery, TransferBatch,
    TxStatusReport,
};

/// Maximum serialized transaction size (IPv6 MTU minus headers)
pub const SOLANA_PACKET_LIMIT: usize = 1232;

/// Base fee per transaction signature
pub const LAMPORTS_PER_SIGNATURE: u128 = 5_000;

/// Base58 string decoding to a 32-byte public key
pub fn is_solana_address(address: &str) -> bool {
    match bs58::decode(address).into_vec() {
        Ok(bytes) => bytes.len() == 32,
        Err(_) => false,
    }
}

#[derive(Debug, Deserialize)]
struct RpcContextValue<T> {
    value: T,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct LatestBlockhash {
    blockhash: String,
    last_valid_block_height: u64,
}

/// Signed transfer kept until its broadcast is acknowledged
#[derive(Debug, Clone)]
struct SignedTransfer {
    raw: Vec<u8>,
    signature: String,
    last_valid_block_height: u64,
}

enum Prepared {
    Send {
        signed: SignedTransfer,
        rebroadcast: bool,
    },
    /// An expired earlier transaction for the batch already reached the chain
    Landed(String),
}

/// Base58 transaction id: the first signature of a wire-format transaction
fn first_signature(raw: &[u8]) -> Result<String, ChainError> {
    // compact-u16 signature count, one byte below 0x80
    match raw.first() {
        Some(&count) if count > 0 && count < 0x80 && raw.len() >= 65 => {
            Ok(bs58::encode(&raw[1..65]).into_string())
        }
        _ => Err(ChainError::InvalidInput(
            "signed transaction carries no signature".to_string(),
        )),
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SignatureStatus {
    slot: u64,
    #[serde(default)]
    err: Option<Value>,
    #[serde(default)]
    confirmation_status: Option<String>,
}

fn parse_signature_status(status: Option<SignatureStatus>) -> TxStatusReport {
    let Some(status) = status else {
        return TxStatusReport::pending();
    };

    if status.err.as_ref().is_some_and(|e| !e.is_null()) {
        return TxStatusReport::failed(Some(status.slot), None);
    }

    match status.confirmation_status.as_deref() {
        Some("confirmed") | Some("finalized") => TxStatusReport::confirmed(status.slot, None),
        _ => TxStatusReport::pending(),
    }
}

/// Solana adapter using the cluster JSON-RPC API.
///
/// A batch keeps its signed transaction until the node acknowledges it.
/// Retries resend those bytes while the blockhash is valid, and only re-sign
/// once it has expired without the signature being seen.
pub struct SolanaAdapter {
    rpc: JsonRpcClient,
    signer: Arc<dyn SolanaSigner>,
    in_flight: InFlight<SignedTransfer>,
}

impl SolanaAdapter {
    pub fn new(rpc: JsonRpcClient, signer: Arc<dyn SolanaSigner>) -> Self {
        Self {
            rpc,
            signer,
            in_flight: InFlight::new(),
        }
    }

    pub fn from_config(
        config: &ChainConfig,
        signer: Arc<dyn SolanaSigner>,
    ) -> Result<Self, ChainError> {
        if config.family != ChainFamily::Solana {
            return Err(ChainError::Configuration(format!(
                "chain {} is not a Solana cluster",
                config.chain_key
            )));
        }
        let rpc = JsonRpcClient::new(
            &config.rpc_url,
            Duration::from_millis(config.request_timeout_ms),
        )?;
        Ok(Self::new(rpc, signer))
    }

    async fn latest_blockhash(&self) -> Result<LatestBlockhash, ChainError> {
        let response: RpcContextValue<LatestBlockhash> = self
            .rpc
            .call("getLatestBlockhash", json!([{"commitment": "confirmed"}]))
            .await?;
        Ok(response.value)
    }

    async fn block_height(&self) -> Result<u64, ChainError> {
        self.rpc
            .call("getBlockHeight", json!([{"commitment": "confirmed"}]))
            .await
    }

    async fn signature_statuses(
        &self,
        signature: &str,
    ) -> Result<Option<SignatureStatus>, ChainError> {
        let response: RpcContextValue<Vec<Option<SignatureStatus>>> = self
            .rpc
            .call(
                "getSignatureStatuses",
                json!([[signature], {"searchTransactionHistory": true}]),
            )
            .await?;
        Ok(response.value.into_iter().next().flatten())
    }

    async fn sign(&self, batch: &TransferBatch) -> Result<SignedTransfer, ChainError> {
        let blockhash = self.latest_blockhash().await?;
        let message = SolanaTransferMessage {
            recent_blockhash: blockhash.blockhash,
            mint: batch.token.clone(),
            transfers: batch.transfers.clone(),
        };
        let raw = self.signer.sign_transfer(&batch.wallet_ref, &message).await?;
        if raw.len() > SOLANA_PACKET_LIMIT {
            return Err(ChainError::InvalidInput(format!(
                "transaction is {} bytes, limit is {SOLANA_PACKET_LIMIT}",
                raw.len()
            )));
        }

        Ok(SignedTransfer {
            signature: first_signature(&raw)?,
            raw,
            last_valid_block_height: blockhash.last_valid_block_height,
        })
    }

    async fn prepare(&self, batch: &TransferBatch) -> Result<Prepared, ChainError> {
        if let Some(previous) = self.in_flight.get(batch) {
            if self.block_height().await? <= previous.last_valid_block_height {
                return Ok(Prepared::Send {
                    signed: previous,
                    rebroadcast: true,
                });
            }
            if self.signature_statuses(&previous.signature).await?.is_some() {
                return Ok(Prepared::Landed(previous.signature));
            }
            debug!(
                campaign_id = %batch.campaign_id,
                signature = %previous.signature,
                "blockhash expired unseen, signing again"
            );
        }

        let signed = self.sign(batch).await?;
        self.in_flight.insert(batch, signed.clone());
        Ok(Prepared::Send {
            signed,
            rebroadcast: false,
        })
    }
}

#[async_trait]
impl ChainAdapter for SolanaAdapter {
    fn family(&self) -> ChainFamily {
        ChainFamily::Solana
    }

    fn requires_contract(&self) -> bool {
        false
    }

    fn validate_address(&self, address: &str) -> bool {
        is_solana_address(address)
    }

    async fn submit_batch(&self, batch: &TransferBatch) -> Result<String, ChainError> {
        batch.validate_with(is_solana_address)?;
        if let Some(mint) = batch.token.as_deref() {
            if !is_solana_address(mint) {
                return Err(ChainError::InvalidInput(format!("invalid mint: {mint}")));
            }
        }

        let (signed, rebroadcast) = match self.prepare(batch).await? {
            Prepared::Send {
                signed,
                rebroadcast,
            } => (signed, rebroadcast),
            Prepared::Landed(landed) => {
                self.in_flight.remove(batch);
                debug!(campaign_id = %batch.campaign_id, signature = %landed, "earlier broadcast landed");
                return Ok(landed);
            }
        };

        let result = match self
            .rpc
            .call::<_, String>(
                "sendTransaction",
                json!([STANDARD.encode(&signed.raw), {"encoding": "base64", "preflightCommitment": "confirmed"}]),
            )
            .await
        {
            Err(err) if rebroadcast && err.is_already_known() => Ok(signed.signature.clone()),
            other => other,
        };
        self.in_flight.settle(batch, &result);
        let signature = result?;

        debug!(
            campaign_id = %batch.campaign_id,
            recipients = batch.len(),
            bytes = signed.raw.len(),
            rebroadcast,
            signature = %signature,
            "batch broadcast"
        );
        Ok(signature)
    }

    async fn get_status(&self, tx_hash: &str) -> Result<TxStatusReport, ChainError> {
        Ok(parse_signature_status(self.signature_statuses(tx_hash).await?))
    }

    async fn deploy_contract(&self, _request: &DeployRequest) -> Result<DeployReceipt, ChainError> {
        Err(ChainError::Unsupported(
            "solana campaigns transfer directly and need no contract".to_string(),
        ))
    }

    async fn estimate_fee(&self, query: &FeeQuery) -> Result<FeeEstimate, ChainError> {
        // one fee payer signature per batch transaction
        let per_batch = query
            .batch_sizes
            .iter()
            .map(|_| LAMPORTS_PER_SIGNATURE)
            .collect();
        Ok(FeeEstimate::from_batches(per_batch, "lamports"))
    }
}
