//! Signed batches whose broadcast has not been acknowledged.
//!
//! A broadcast that times out may still have reached the node. Retrying with
//! a freshly signed transaction (new nonce or blockhash) could then pay the
//! batch twice, so adapters keep the first signed payload here and rebroadcast
//! those exact bytes until the node answers.

use payout_retry::{Classification, Classify};
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

use crate::{ChainError, TransferBatch};

pub(crate) struct InFlight<T> {
    entries: Mutex<HashMap<TransferBatch, T>>,
}

impl<T: Clone> InFlight<T> {
    pub(crate) fn new() -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
        }
    }

    // single insert/remove per lock, poisoning is ignored
    fn entries(&self) -> MutexGuard<'_, HashMap<TransferBatch, T>> {
        self.entries.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub(crate) fn get(&self, batch: &TransferBatch) -> Option<T> {
        self.entries().get(batch).cloned()
    }

    pub(crate) fn insert(&self, batch: &TransferBatch, signed: T) {
        self.entries().insert(batch.clone(), signed);
    }

    pub(crate) fn remove(&self, batch: &TransferBatch) {
        self.entries().remove(batch);
    }

    #[cfg(test)]
    pub(crate) fn len(&self) -> usize {
        self.entries().len()
    }

    /// Forget the batch once the node has answered for certain.
    ///
    /// Transient failures keep the entry so the next attempt rebroadcasts the
    /// same bytes.
    pub(crate) fn settle(&self, batch: &TransferBatch, result: &Result<String, ChainError>) {
        match result {
            Ok(_) => self.remove(batch),
            Err(err) if err.classify() == Classification::Fatal => self.remove(batch),
            Err(_) => {}
        }
    }
}
