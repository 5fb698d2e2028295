//! Wait-for graph used to detect deadlocks between unordered lock sets.

use std::collections::HashMap;

use super::key::LockKey;
use super::TxnId;

/// Owner and waiter bookkeeping for every contended key.
///
/// All updates happen under one mutex so that of two transactions closing
/// a cycle, exactly one observes it.
#[derive(Debug, Default)]
pub(crate) struct WaitGraph {
    /// Current holder of each key.
    owners: HashMap<LockKey, TxnId>,
    /// Key each blocked transaction is waiting for.
    waiting: HashMap<TxnId, LockKey>,
}

impl WaitGraph {
    /// Record `txn` as the holder of `key`.
    pub(crate) fn grant(&mut self, txn: TxnId, key: &LockKey) {
        self.owners.insert(key.clone(), txn);
    }

    /// Forget `txn` as the holder of `key`, if it still is.
    pub(crate) fn release(&mut self, txn: TxnId, key: &LockKey) {
        if self.owners.get(key) == Some(&txn) {
            self.owners.remove(key);
        }
    }

    /// Register that `txn` is about to block on `key`.
    ///
    /// Fails with the cycle (starting at `txn`) when the wait would close
    /// one; the edge is not recorded in that case.
    pub(crate) fn begin_wait(&mut self, txn: TxnId, key: &LockKey) -> Result<(), Vec<TxnId>> {
        let mut path = vec![txn];
        let mut cursor = key;

        while let Some(&owner) = self.owners.get(cursor) {
            if owner == txn {
                return Err(path);
            }
            if path.contains(&owner) {
                break;
            }
            path.push(owner);
            match self.waiting.get(&owner) {
                Some(next) => cursor = next,
                None => break,
            }
        }

        self.waiting.insert(txn, key.clone());
        Ok(())
    }

    /// Remove the wait edge of `txn`.
    pub(crate) fn end_wait(&mut self, txn: TxnId) {
        self.waiting.remove(&txn);
    }

    #[cfg(test)]
    pub(crate) fn waiting_count(&self) -> usize {
        self.waiting.len()
    }
}
