use std::fmt;
use std::sync::Arc;

use chrono::Timelike;
use payout_config::{ConfirmationConfig, PeakWindow};
use payout_types::ChainFamily;

/// Scales confirmation deadlines for current network conditions
pub trait CongestionPolicy: Send + Sync + fmt::Debug {
    /// Factor applied to a chain's base timeout; never below 1.0
    fn multiplier(&self, family: ChainFamily, chain_key: &str) -> f64;
}

/// Same multiplier at all times
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ConstantCongestion(f64);

impl ConstantCongestion {
    pub fn new(multiplier: f64) -> Self {
        Self(multiplier.max(1.0))
    }
}

impl Default for ConstantCongestion {
    fn default() -> Self {
        Self(1.0)
    }
}

impl CongestionPolicy for ConstantCongestion {
    fn multiplier(&self, _family: ChainFamily, _chain_key: &str) -> f64 {
        self.0
    }
}

/// Multiplier raised during configured UTC hour windows
#[derive(Debug, Clone, PartialEq)]
pub struct PeakHoursCongestion {
    base: f64,
    windows: Vec<PeakWindow>,
}

impl PeakHoursCongestion {
    pub fn new(base: f64, windows: Vec<PeakWindow>) -> Self {
        Self {
            base: base.max(1.0),
            windows,
        }
    }

    /// Multiplier for a UTC hour; the largest matching window wins
    pub fn multiplier_at(&self, hour: u8) -> f64 {
        self.windows
            .iter()
            .filter(|w| w.contains(hour))
            .map(|w| w.multiplier)
            .fold(self.base, f64::max)
    }
}

impl CongestionPolicy for PeakHoursCongestion {
    fn multiplier(&self, _family: ChainFamily, _chain_key: &str) -> f64 {
        self.multiplier_at(chrono::Utc::now().hour() as u8)
    }
}

/// Policy described by the confirmation config section
pub fn policy_from_config(config: &ConfirmationConfig) -> Arc<dyn CongestionPolicy> {
    if config.peak_windows.is_empty() {
        Arc::new(ConstantCongestion::new(config.congestion_multiplier))
    } else {
        Arc::new(PeakHoursCongestion::new(
            config.congestion_multiplier,
            config.peak_windows.clone(),
        ))
    }
}
