use std::collections::HashSet;

use payout_chain::{ChainProfile, ChainRegistry, SOLANA_PACKET_LIMIT};
use payout_types::{Campaign, ChainFamily, Recipient, Transfer};
use thiserror::Error;

/// Smallest recommended EVM batch
pub const EVM_MIN_BATCH_SIZE: usize = 25;

/// Native SOL transfers per transaction
pub const SOLANA_NATIVE_MAX_TRANSFERS: usize = 15;

/// SPL transfers per transaction; each is paired with an idempotent
/// associated-token-account creation
pub const SOLANA_SPL_MAX_TRANSFERS: usize = 8;

const SIGNATURE_BYTES: usize = 64;
const PUBKEY_BYTES: usize = 32;
const BLOCKHASH_BYTES: usize = 32;
const MESSAGE_HEADER_BYTES: usize = 3;

/// Recommended EVM batch size by campaign size, capped later by the chain
const EVM_RECOMMENDATION_TIERS: &[(usize, usize)] = &[
    (50, EVM_MIN_BATCH_SIZE),
    (200, 50),
    (1_000, 100),
    (5_000, 200),
];

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PlanError {
    #[error("no chain profile for {family} chain {chain_key}")]
    UnknownChain {
        family: ChainFamily,
        chain_key: String,
    },

    #[error("recipient {0} appears more than once")]
    DuplicateRecipient(String),

    #[error("batch {index} has {size} recipients, limit is {limit}")]
    Oversized {
        index: usize,
        size: usize,
        limit: usize,
    },

    #[error("batch {index} serializes to {bytes} bytes, limit is {limit}")]
    PayloadTooLarge {
        index: usize,
        bytes: usize,
        limit: usize,
    },
}

/// Recipients submitted together as one transaction
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Batch {
    /// Zero-based position within the plan
    pub index: usize,
    pub recipients: Vec<Recipient>,
}

impl Batch {
    pub fn len(&self) -> usize {
        self.recipients.len()
    }

    pub fn is_empty(&self) -> bool {
        self.recipients.is_empty()
    }

    pub fn transfers(&self) -> Vec<Transfer> {
        self.recipients.iter().map(Recipient::to_transfer).collect()
    }

    pub fn addresses(&self) -> impl Iterator<Item = &str> {
        self.recipients.iter().map(|r| r.address.as_str())
    }
}

/// What a plan is built for
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlanRequest {
    pub family: ChainFamily,
    pub chain_key: String,
    /// Requested recipients per batch; zero uses the recommendation
    pub requested_batch_size: usize,
    /// Native coin rather than a token contract or mint
    pub native: bool,
}

impl PlanRequest {
    pub fn for_campaign(campaign: &Campaign) -> Self {
        Self {
            family: campaign.chain_family,
            chain_key: campaign.chain_id.clone(),
            requested_batch_size: campaign.batch_size as usize,
            native: campaign.is_native_token(),
        }
    }
}

fn compact_len(n: usize) -> usize {
    match n {
        0..=0x7f => 1,
        0x80..=0x3fff => 2,
        _ => 3,
    }
}

/// Serialized size of a single-signer legacy transaction paying `transfers`
/// recipients.
///
/// Native: payer, system program, one key and one 12-byte transfer
/// instruction per recipient. SPL: payer, source account, mint, token
/// program, associated-token program and system program, plus wallet and
/// token account per recipient, each with a `TransferChecked` and an
/// idempotent account creation.
pub fn estimate_solana_tx_size(transfers: usize, native: bool) -> usize {
    let (static_keys, keys_per_transfer, instruction_bytes) = if native {
        // program idx, 2 account idx, 4-byte tag + 8-byte lamports
        let transfer = 1 + compact_len(2) + 2 + compact_len(12) + 12;
        (2, 1, transfer)
    } else {
        // program idx, 4 accounts, tag + amount + decimals
        let transfer_checked = 1 + compact_len(4) + 4 + compact_len(10) + 10;
        // program idx, 6 accounts, 1-byte tag
        let create_ata = 1 + compact_len(6) + 6 + compact_len(1) + 1;
        (6, 2, transfer_checked + create_ata)
    };

    let keys = static_keys + keys_per_transfer * transfers;
    let instructions = if native { transfers } else { transfers * 2 };

    compact_len(1)
        + SIGNATURE_BYTES
        + MESSAGE_HEADER_BYTES
        + compact_len(keys)
        + keys * PUBKEY_BYTES
        + BLOCKHASH_BYTES
        + compact_len(instructions)
        + instruction_bytes * transfers
}

/// Splits recipients into chain-safe batches
#[derive(Debug, Clone)]
pub struct BatchPlanner {
    chains: ChainRegistry,
}

impl BatchPlanner {
    pub fn new(chains: ChainRegistry) -> Self {
        Self { chains }
    }

    pub fn chains(&self) -> &ChainRegistry {
        &self.chains
    }

    fn profile(&self, family: ChainFamily, chain_key: &str) -> Result<&ChainProfile, PlanError> {
        self.chains
            .get(family, chain_key)
            .ok_or_else(|| PlanError::UnknownChain {
                family,
                chain_key: chain_key.to_string(),
            })
    }

    /// Largest batch the chain accepts
    pub fn max_batch_size(
        &self,
        family: ChainFamily,
        chain_key: &str,
        native: bool,
    ) -> Result<usize, PlanError> {
        let profile = self.profile(family, chain_key)?;
        let limit = match family {
            ChainFamily::Evm => profile.gas_bounded_batch_size(),
            ChainFamily::Solana => {
                let per_tx = if native {
                    SOLANA_NATIVE_MAX_TRANSFERS
                } else {
                    SOLANA_SPL_MAX_TRANSFERS
                };
                let mut limit = profile.max_batch_size.min(per_tx);
                while limit > 1 && estimate_solana_tx_size(limit, native) > SOLANA_PACKET_LIMIT {
                    limit -= 1;
                }
                limit
            }
        };
        Ok(limit.max(1))
    }

    /// Suggested batch size for a campaign of `recipient_count` recipients.
    ///
    /// Solana suggestions assume native transfers; [`split`](Self::split)
    /// clamps token batches further.
    pub fn recommend_batch_size(
        &self,
        family: ChainFamily,
        chain_key: &str,
        recipient_count: usize,
    ) -> Result<usize, PlanError> {
        let max = self.max_batch_size(family, chain_key, true)?;
        let suggested = match family {
            ChainFamily::Evm => EVM_RECOMMENDATION_TIERS
                .iter()
                .find(|(below, _)| recipient_count < *below)
                .map(|(_, size)| *size)
                .unwrap_or(max),
            ChainFamily::Solana => max,
        };
        Ok(suggested.min(max).min(recipient_count.max(1)))
    }

    /// Batch size used for `request` with `recipient_count` recipients
    pub fn effective_batch_size(
        &self,
        request: &PlanRequest,
        recipient_count: usize,
    ) -> Result<usize, PlanError> {
        let max = self.max_batch_size(request.family, &request.chain_key, request.native)?;
        let wanted = if request.requested_batch_size == 0 {
            self.recommend_batch_size(request.family, &request.chain_key, recipient_count)?
        } else {
            request.requested_batch_size
        };
        Ok(wanted.clamp(1, max))
    }

    /// Split recipients into batches in their given order.
    ///
    /// Boundaries depend only on the recipient list and the request.
    pub fn split(
        &self,
        recipients: &[Recipient],
        request: &PlanRequest,
    ) -> Result<Vec<Batch>, PlanError> {
        let mut seen = HashSet::with_capacity(recipients.len());
        for recipient in recipients {
            if !seen.insert(recipient.address.as_str()) {
                return Err(PlanError::DuplicateRecipient(recipient.address.clone()));
            }
        }
        if recipients.is_empty() {
            return Ok(Vec::new());
        }

        let size = self.effective_batch_size(request, recipients.len())?;
        let batches: Vec<Batch> = recipients
            .chunks(size)
            .enumerate()
            .map(|(index, chunk)| Batch {
                index,
                recipients: chunk.to_vec(),
            })
            .collect();

        self.check(&batches, request)?;
        Ok(batches)
    }

    /// Reject any batch over the chain's limits
    pub fn check(&self, batches: &[Batch], request: &PlanRequest) -> Result<(), PlanError> {
        let limit = self.max_batch_size(request.family, &request.chain_key, request.native)?;
        for batch in batches {
            if batch.len() > limit {
                return Err(PlanError::Oversized {
                    index: batch.index,
                    size: batch.len(),
                    limit,
                });
            }
            if request.family == ChainFamily::Solana {
                let bytes = estimate_solana_tx_size(batch.len(), request.native);
                if bytes > SOLANA_PACKET_LIMIT {
                    return Err(PlanError::PayloadTooLarge {
                        index: batch.index,
                        bytes,
                        limit: SOLANA_PACKET_LIMIT,
                    });
                }
            }
        }
        Ok(())
    }
}

impl Default for BatchPlanner {
    fn default() -> Self {
        Self::new(ChainRegistry::builtin())
    }
}
