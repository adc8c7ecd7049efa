use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard};

use tracing::debug;

/// Key guarded by the registry
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum LockKey {
    /// Batch sending for a campaign
    Execute(String),
    /// Contract deployment for a campaign
    Deploy(String),
}

impl LockKey {
    pub fn campaign_id(&self) -> &str {
        match self {
            LockKey::Execute(id) | LockKey::Deploy(id) => id,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            LockKey::Execute(_) => "execute",
            LockKey::Deploy(_) => "deploy",
        }
    }
}

/// Cooperative request observed by a run at batch boundaries
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlSignal {
    Pause,
    Cancel,
}

#[derive(Debug, Default, Clone, Copy)]
struct Signals {
    pause: bool,
    cancel: bool,
}

#[derive(Debug, Default)]
struct RegistryState {
    held: HashSet<LockKey>,
    signals: HashMap<String, Signals>,
}

/// Per-campaign mutual exclusion plus pause/cancel signals.
///
/// Every operation is a single map access under one mutex, independent of
/// how many campaigns are registered. Clones share state.
#[derive(Debug, Clone, Default)]
pub struct ExecutionLockRegistry {
    state: Arc<Mutex<RegistryState>>,
}

impl ExecutionLockRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    // every mutation is a single insert/remove, so poisoning is ignored
    fn state(&self) -> MutexGuard<'_, RegistryState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Take `key` if it is free
    pub fn try_acquire(&self, key: LockKey) -> Option<ExecutionGuard> {
        self.try_acquire_all(vec![key])
    }

    /// Take every key or none of them
    pub fn try_acquire_all(&self, keys: Vec<LockKey>) -> Option<ExecutionGuard> {
        let mut state = self.state();
        if keys.iter().any(|key| state.held.contains(key)) {
            return None;
        }
        for key in &keys {
            state.held.insert(key.clone());
        }
        drop(state);

        debug!(keys = ?keys, "lock acquired");
        Some(ExecutionGuard {
            registry: self.clone(),
            keys,
        })
    }

    pub fn is_held(&self, key: &LockKey) -> bool {
        self.state().held.contains(key)
    }

    fn release(&self, keys: &[LockKey]) {
        let mut state = self.state();
        for key in keys {
            state.held.remove(key);
        }
    }

    /// Ask a running campaign to stop after its current batch
    pub fn pause(&self, campaign_id: &str) {
        self.state()
            .signals
            .entry(campaign_id.to_string())
            .or_default()
            .pause = true;
    }

    pub fn resume(&self, campaign_id: &str) {
        let mut state = self.state();
        if let Some(signals) = state.signals.get_mut(campaign_id) {
            signals.pause = false;
            if !signals.cancel {
                state.signals.remove(campaign_id);
            }
        }
    }

    /// Ask a running campaign to stop and fail after its current batch
    pub fn cancel(&self, campaign_id: &str) {
        self.state()
            .signals
            .entry(campaign_id.to_string())
            .or_default()
            .cancel = true;
    }

    /// Pending signal for a campaign; cancel wins over pause
    pub fn signal(&self, campaign_id: &str) -> Option<ControlSignal> {
        let state = self.state();
        let signals = state.signals.get(campaign_id)?;
        if signals.cancel {
            Some(ControlSignal::Cancel)
        } else if signals.pause {
            Some(ControlSignal::Pause)
        } else {
            None
        }
    }

    pub fn is_paused(&self, campaign_id: &str) -> bool {
        self.signal(campaign_id) == Some(ControlSignal::Pause)
    }

    pub fn clear_signals(&self, campaign_id: &str) {
        self.state().signals.remove(campaign_id);
    }
}

/// Releases its keys on drop
#[derive(Debug)]
pub struct ExecutionGuard {
    registry: ExecutionLockRegistry,
    keys: Vec<LockKey>,
}

impl ExecutionGuard {
    pub fn keys(&self) -> &[LockKey] {
        &self.keys
    }
}

impl Drop for ExecutionGuard {
    fn drop(&mut self) {
        self.registry.release(&self.keys);
        debug!(keys = ?self.keys, "lock released");
    }
}
