//! Chain adapters for the token payout engine.
//!
//! The engine only talks to chains through [`ChainAdapter`]. This crate ships
//! the EVM and Solana implementations, the JSON-RPC transport they share, and
//! the per-chain timing/sizing profiles.

pub mod adapter;
pub mod error;
pub mod evm;
mod inflight;
pub mod profile;
pub mod rpc;
pub mod signer;
pub mod solana;

pub use adapter::{
    AdapterRegistry, ChainAdapter, DeployReceipt, DeployRequest, FeeEstimate, FeeQuery,
    TransferBatch, TxStatus, TxStatusReport,
};
pub use error::ChainError;
pub use evm::{is_evm_address, EvmAdapter};
pub use profile::{evm_batch_gas, ChainProfile, ChainRegistry, EVM_BASE_GAS, EVM_GAS_PER_RECIPIENT};
pub use rpc::JsonRpcClient;
pub use signer::{
    EvmBatchCall, EvmDeployCall, EvmSigner, SignedEvmTransaction, SolanaSigner, SolanaTransferMessage,
};
pub use solana::{is_solana_address, SolanaAdapter, LAMPORTS_PER_SIGNATURE, SOLANA_PACKET_LIMIT};
