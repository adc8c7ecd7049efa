//! Signing boundary.
//!
//! Key custody, ABI encoding and transaction serialization live outside this
//! crate. Adapters gather chain state (nonce, gas price, blockhash), hand the
//! signer an unsigned description, and broadcast the bytes it returns.

use async_trait::async_trait;
use payout_types::Transfer;
use serde::{Deserialize, Serialize};

use crate::ChainError;

/// Unsigned EVM batch transfer through the distribution contract
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EvmBatchCall {
    pub chain_id: u64,
    pub nonce: u64,
    pub gas_price: u128,
    pub gas_limit: u64,
    pub contract: String,
    /// ERC-20 token; `None` sends the native coin
    pub token: Option<String>,
    pub transfers: Vec<Transfer>,
}

/// Unsigned EVM distribution contract deployment
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EvmDeployCall {
    pub chain_id: u64,
    pub nonce: u64,
    pub gas_price: u128,
    pub gas_limit: u64,
    pub token: Option<String>,
}

/// Signed EVM transaction and the hash the network knows it by
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignedEvmTransaction {
    pub raw: Vec<u8>,
    /// `0x`-prefixed keccak hash of `raw`
    pub tx_hash: String,
}

#[async_trait]
pub trait EvmSigner: Send + Sync {
    /// Sender address controlled by `wallet_ref`
    async fn address(&self, wallet_ref: &str) -> Result<String, ChainError>;

    async fn sign_batch(
        &self,
        wallet_ref: &str,
        call: &EvmBatchCall,
    ) -> Result<SignedEvmTransaction, ChainError>;

    async fn sign_deploy(
        &self,
        wallet_ref: &str,
        call: &EvmDeployCall,
    ) -> Result<SignedEvmTransaction, ChainError>;
}

/// Unsigned Solana transfer message
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SolanaTransferMessage {
    pub recent_blockhash: String,
    /// SPL mint; `None` transfers lamports
    pub mint: Option<String>,
    pub transfers: Vec<Transfer>,
}

#[async_trait]
pub trait SolanaSigner: Send + Sync {
    async fn pubkey(&self, wallet_ref: &str) -> Result<String, ChainError>;

    /// Signed, wire-serialized transaction. The fee payer's signature comes
    /// first and doubles as the transaction id.
    async fn sign_transfer(
        &self,
        wallet_ref: &str,
        message: &SolanaTransferMessage,
    ) -> Result<Vec<u8>, ChainError>;
}
