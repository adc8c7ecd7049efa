use payout_config::{AppConfig, ChainConfig};
use payout_types::ChainFamily;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;

/// Fixed gas overhead of a batch transfer call
pub const EVM_BASE_GAS: u64 = 50_000;

/// Gas consumed per recipient inside a batch transfer
pub const EVM_GAS_PER_RECIPIENT: u64 = 35_000;

/// Timing and sizing limits for one chain
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChainProfile {
    pub family: ChainFamily,
    pub chain_key: String,
    pub name: String,
    /// Average block (or slot) time
    pub block_time: Duration,
    /// Confirmation wait before congestion scaling
    pub base_timeout: Duration,
    /// Hard ceiling on recipients per batch
    pub max_batch_size: usize,
    /// Gas available to one batch transaction (EVM only)
    pub gas_limit_budget: Option<u64>,
}

impl ChainProfile {
    fn evm(chain_key: &str, name: &str, block_ms: u64, timeout_secs: u64, ceiling: usize, gas: u64) -> Self {
        Self {
            family: ChainFamily::Evm,
            chain_key: chain_key.to_string(),
            name: name.to_string(),
            block_time: Duration::from_millis(block_ms),
            base_timeout: Duration::from_secs(timeout_secs),
            max_batch_size: ceiling,
            gas_limit_budget: Some(gas),
        }
    }

    fn solana(cluster: &str) -> Self {
        Self {
            family: ChainFamily::Solana,
            chain_key: cluster.to_string(),
            name: format!("solana-{cluster}"),
            block_time: Duration::from_millis(400),
            base_timeout: Duration::from_secs(30),
            max_batch_size: 15,
            gas_limit_budget: None,
        }
    }

    /// Built-in profile for a known chain
    pub fn builtin(family: ChainFamily, chain_key: &str) -> Option<Self> {
        let profile = match (family, chain_key) {
            (ChainFamily::Evm, "1") => Self::evm("1", "ethereum", 12_000, 300, 200, 8_000_000),
            (ChainFamily::Evm, "11155111") => {
                Self::evm("11155111", "sepolia", 12_000, 300, 200, 8_000_000)
            }
            (ChainFamily::Evm, "137") => Self::evm("137", "polygon", 2_000, 120, 500, 20_000_000),
            (ChainFamily::Evm, "42161") => {
                Self::evm("42161", "arbitrum", 250, 60, 500, 20_000_000)
            }
            (ChainFamily::Evm, "10") => Self::evm("10", "optimism", 2_000, 60, 500, 20_000_000),
            (ChainFamily::Evm, "8453") => Self::evm("8453", "base", 2_000, 60, 500, 20_000_000),
            (ChainFamily::Evm, "56") => Self::evm("56", "bsc", 3_000, 180, 500, 20_000_000),
            (ChainFamily::Solana, "mainnet-beta" | "devnet" | "testnet" | "localnet") => {
                Self::solana(chain_key)
            }
            _ => return None,
        };
        Some(profile)
    }

    /// Conservative profile for a configured chain with no built-in entry
    pub fn fallback(family: ChainFamily, chain_key: &str) -> Self {
        match family {
            ChainFamily::Evm => Self::evm(chain_key, chain_key, 12_000, 300, 200, 8_000_000),
            ChainFamily::Solana => Self::solana(chain_key),
        }
    }

    /// Apply per-chain overrides from configuration
    pub fn with_overrides(mut self, config: &ChainConfig) -> Self {
        if let Some(ms) = config.block_time_ms {
            self.block_time = Duration::from_millis(ms);
        }
        if let Some(secs) = config.confirmation_timeout_secs {
            self.base_timeout = Duration::from_secs(secs);
        }
        if let Some(max) = config.max_batch_size {
            self.max_batch_size = max;
        }
        if self.family == ChainFamily::Evm {
            if let Some(gas) = config.gas_limit_budget {
                self.gas_limit_budget = Some(gas);
            }
        }
        self
    }

    /// Recipients that fit the gas budget, capped at the ceiling
    pub fn gas_bounded_batch_size(&self) -> usize {
        match self.gas_limit_budget {
            Some(budget) => {
                let fit = budget.saturating_sub(EVM_BASE_GAS) / EVM_GAS_PER_RECIPIENT;
                (fit as usize).min(self.max_batch_size)
            }
            None => self.max_batch_size,
        }
    }
}

/// Estimated gas limit for a batch of `recipients` transfers
pub fn evm_batch_gas(recipients: usize) -> u64 {
    EVM_BASE_GAS + EVM_GAS_PER_RECIPIENT * recipients as u64
}

/// Chain profiles keyed by family and chain key
#[derive(Debug, Clone, Default)]
pub struct ChainRegistry {
    profiles: HashMap<(ChainFamily, String), ChainProfile>,
}

impl ChainRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry holding every built-in profile
    pub fn builtin() -> Self {
        let mut registry = Self::new();
        for key in ["1", "11155111", "137", "42161", "10", "8453", "56"] {
            if let Some(profile) = ChainProfile::builtin(ChainFamily::Evm, key) {
                registry.insert(profile);
            }
        }
        for cluster in ["mainnet-beta", "devnet", "testnet", "localnet"] {
            if let Some(profile) = ChainProfile::builtin(ChainFamily::Solana, cluster) {
                registry.insert(profile);
            }
        }
        registry
    }

    /// Built-in profiles plus configured chains, with config overrides applied
    pub fn from_config(config: &AppConfig) -> Self {
        let mut registry = Self::builtin();
        for chain in config.chains.values() {
            let base = registry
                .get(chain.family, &chain.chain_key)
                .cloned()
                .unwrap_or_else(|| ChainProfile::fallback(chain.family, &chain.chain_key));
            registry.insert(base.with_overrides(chain));
        }
        registry
    }

    pub fn insert(&mut self, profile: ChainProfile) {
        self.profiles
            .insert((profile.family, profile.chain_key.clone()), profile);
    }

    pub fn get(&self, family: ChainFamily, chain_key: &str) -> Option<&ChainProfile> {
        self.profiles.get(&(family, chain_key.to_string()))
    }

    pub fn len(&self) -> usize {
        self.profiles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.profiles.is_empty()
    }
}
