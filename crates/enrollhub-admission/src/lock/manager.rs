//! Entity lock manager.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use dashmap::DashMap;
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::{debug, warn};

use enrollhub_core::config::LockPolicy;

use super::graph::WaitGraph;
use super::key::LockKey;
use super::metrics::{LockMetrics, LockMetricsSnapshot};
use super::{LockError, TxnId};

/// Shared lock table. Entity locks keep it alive for their release path.
#[derive(Debug)]
struct LockTable {
    /// One mutex per key that is held or awaited. Idle entries are pruned.
    slots: DashMap<LockKey, Arc<Mutex<()>>>,
    /// Wait-for bookkeeping, only maintained under the unordered policy.
    graph: std::sync::Mutex<WaitGraph>,
    /// Acquisition discipline.
    policy: LockPolicy,
    /// Source of transaction identifiers.
    next_txn: AtomicU64,
    /// Contention counters.
    metrics: LockMetrics,
}

impl LockTable {
    fn slot(&self, key: &LockKey) -> Arc<Mutex<()>> {
        Arc::clone(
            self.slots
                .entry(key.clone())
                .or_insert_with(|| Arc::new(Mutex::new(())))
                .value(),
        )
    }

    fn tracks_waits(&self) -> bool {
        self.policy == LockPolicy::Unordered
    }

    fn with_graph<T>(&self, f: impl FnOnce(&mut WaitGraph) -> T) -> Option<T> {
        self.graph.lock().ok().map(|mut graph| f(&mut graph))
    }

    fn prune(&self, key: &LockKey) {
        self.slots
            .remove_if(key, |_, slot| Arc::strong_count(slot) == 1);
    }
}

/// Grants exclusive, entity-scoped locks.
///
/// Cloning is cheap; all clones share one lock table.
#[derive(Debug, Clone)]
pub struct LockManager {
    table: Arc<LockTable>,
}

impl LockManager {
    /// Create a lock manager with the given multi-lock policy.
    pub fn new(policy: LockPolicy) -> Self {
        Self {
            table: Arc::new(LockTable {
                slots: DashMap::new(),
                graph: std::sync::Mutex::new(WaitGraph::default()),
                policy,
                next_txn: AtomicU64::new(1),
                metrics: LockMetrics::new(),
            }),
        }
    }

    /// Active policy.
    pub fn policy(&self) -> LockPolicy {
        self.table.policy
    }

    /// Start an empty lock set for a new transaction.
    pub fn begin(&self) -> LockSet {
        LockSet {
            txn: self.table.next_txn.fetch_add(1, Ordering::Relaxed),
            table: Arc::clone(&self.table),
            locks: Vec::new(),
        }
    }

    /// Acquire a single key.
    pub async fn acquire(&self, key: LockKey, timeout: Duration) -> Result<LockSet, LockError> {
        self.acquire_all([key], timeout).await
    }

    /// Acquire every key within one shared time budget.
    ///
    /// Under [`LockPolicy::Ordered`] keys are sorted into the global order
    /// first; under [`LockPolicy::Unordered`] they are taken in the order
    /// given. Duplicate keys are collapsed. On failure nothing stays held.
    pub async fn acquire_all(
        &self,
        keys: impl IntoIterator<Item = LockKey>,
        timeout: Duration,
    ) -> Result<LockSet, LockError> {
        let mut keys: Vec<LockKey> = keys.into_iter().collect();
        match self.table.policy {
            LockPolicy::Ordered => {
                keys.sort();
                keys.dedup();
            }
            LockPolicy::Unordered => {
                let mut seen = Vec::with_capacity(keys.len());
                keys.retain(|k| {
                    if seen.contains(k) {
                        false
                    } else {
                        seen.push(k.clone());
                        true
                    }
                });
            }
        }

        let deadline = Instant::now() + timeout;
        let mut set = self.begin();
        for key in keys {
            set.acquire(key, deadline).await?;
        }
        Ok(set)
    }

    /// Number of keys with a live lock slot.
    pub fn active_keys(&self) -> usize {
        self.table.slots.len()
    }

    #[cfg(test)]
    fn is_locked(&self, key: &LockKey) -> bool {
        self.table
            .slots
            .get(key)
            .map(|slot| slot.try_lock().is_err())
            .unwrap_or(false)
    }

    #[cfg(test)]
    fn waiting_count(&self) -> usize {
        self.table.with_graph(|g| g.waiting_count()).unwrap_or(0)
    }

    /// Contention counters.
    pub fn metrics(&self) -> LockMetricsSnapshot {
        self.table.metrics.snapshot()
    }
}

/// Wait-for edge of a blocked acquisition. Cleared on drop, including
/// when the acquiring future is dropped mid-wait.
struct WaitEdge<'a> {
    table: &'a LockTable,
    txn: TxnId,
}

impl Drop for WaitEdge<'_> {
    fn drop(&mut self) {
        self.table.with_graph(|g| g.end_wait(self.txn));
    }
}

/// One held entity lock. Releases on drop.
#[derive(Debug)]
struct EntityLock {
    key: LockKey,
    txn: TxnId,
    guard: Option<OwnedMutexGuard<()>>,
    table: Arc<LockTable>,
}

impl Drop for EntityLock {
    fn drop(&mut self) {
        if self.table.tracks_waits() {
            self.table.with_graph(|g| g.release(self.txn, &self.key));
        }
        drop(self.guard.take());
        self.table.prune(&self.key);
    }
}

/// The locks held by one transaction.
///
/// Dropping the set releases every lock exactly once, in reverse
/// acquisition order.
#[derive(Debug)]
pub struct LockSet {
    txn: TxnId,
    table: Arc<LockTable>,
    locks: Vec<EntityLock>,
}

impl LockSet {
    /// Transaction identifier of this set.
    pub fn txn(&self) -> TxnId {
        self.txn
    }

    /// Number of locks held.
    pub fn len(&self) -> usize {
        self.locks.len()
    }

    /// Whether no lock is held.
    pub fn is_empty(&self) -> bool {
        self.locks.is_empty()
    }

    /// Whether this set holds `key`.
    pub fn holds(&self, key: &LockKey) -> bool {
        self.locks.iter().any(|l| &l.key == key)
    }

    /// Keys held, in acquisition order.
    pub fn keys(&self) -> Vec<LockKey> {
        self.locks.iter().map(|l| l.key.clone()).collect()
    }

    /// Acquire one more key, waiting until `deadline` at most.
    ///
    /// Any failure releases every lock already in the set before
    /// returning. Re-acquiring a held key is a no-op.
    pub async fn acquire(&mut self, key: LockKey, deadline: Instant) -> Result<(), LockError> {
        if self.holds(&key) {
            return Ok(());
        }

        let result = self.acquire_inner(key, deadline).await;
        if result.is_err() {
            self.release_all();
        }
        result
    }

    /// Release every held lock now.
    pub fn release(mut self) {
        self.release_all();
    }

    async fn acquire_inner(&mut self, key: LockKey, deadline: Instant) -> Result<(), LockError> {
        let table = Arc::clone(&self.table);

        if table.policy == LockPolicy::Ordered {
            if let Some(highest) = self.locks.last().map(|l| &l.key) {
                if &key < highest {
                    return Err(LockError::OutOfOrder {
                        key: key.to_string(),
                        highest: highest.to_string(),
                    });
                }
            }
        }

        let slot = table.slot(&key);

        if let Ok(guard) = Arc::clone(&slot).try_lock_owned() {
            table.metrics.record_acquisition(false);
            self.push(key, guard);
            return Ok(());
        }

        let edge = if table.tracks_waits() {
            let verdict = table
                .with_graph(|g| g.begin_wait(self.txn, &key))
                .unwrap_or(Ok(()));
            if let Err(cycle) = verdict {
                drop(slot);
                table.metrics.record_deadlock();
                warn!(
                    txn = self.txn,
                    key = %key,
                    cycle = ?cycle,
                    "Deadlock detected, aborting transaction"
                );
                return Err(LockError::Deadlock {
                    key: key.to_string(),
                    txn: self.txn,
                });
            }
            Some(WaitEdge {
                table: &table,
                txn: self.txn,
            })
        } else {
            None
        };

        let started = Instant::now();
        let remaining = deadline.saturating_duration_since(started);
        let outcome = tokio::time::timeout(remaining, Arc::clone(&slot).lock_owned()).await;

        drop(edge);
        drop(slot);

        match outcome {
            Ok(guard) => {
                table.metrics.record_acquisition(true);
                debug!(
                    txn = self.txn,
                    key = %key,
                    waited_ms = started.elapsed().as_millis() as u64,
                    "Contended lock acquired"
                );
                self.push(key, guard);
                Ok(())
            }
            Err(_) => {
                table.metrics.record_timeout();
                table.prune(&key);
                Err(LockError::Timeout {
                    key: key.to_string(),
                    waited_ms: started.elapsed().as_millis() as u64,
                })
            }
        }
    }

    fn push(&mut self, key: LockKey, guard: OwnedMutexGuard<()>) {
        if self.table.tracks_waits() {
            self.table.with_graph(|g| g.grant(self.txn, &key));
        }
        self.locks.push(EntityLock {
            key,
            txn: self.txn,
            guard: Some(guard),
            table: Arc::clone(&self.table),
        });
    }

    fn release_all(&mut self) {
        while let Some(lock) = self.locks.pop() {
            drop(lock);
        }
    }
}

impl Drop for LockSet {
    fn drop(&mut self) {
        self.release_all();
    }
}
