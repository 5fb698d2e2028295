//! Bounded pool of execution slots.
//!
//! Every admission and cancellation holds one [`Lease`] for its whole
//! duration, which bounds the number of transactions in flight. A lease
//! can only be obtained through [`LeasePool::acquire`] and goes back to
//! the pool when dropped, so it is returned exactly once on every path.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tracing::{debug, info, warn};

/// Lease acquisition failures.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum LeaseError {
    /// No slot freed up within the wait budget.
    #[error("All {size} execution slots busy (waited {waited_ms}ms)")]
    Exhausted {
        /// Pool size.
        size: usize,
        /// Time spent waiting.
        waited_ms: u64,
    },

    /// The pool no longer hands out leases.
    #[error("Lease pool is closed")]
    Closed,
}

#[derive(Debug)]
struct PoolInner {
    size: usize,
    semaphore: Arc<Semaphore>,
    closed: AtomicBool,
    granted: AtomicU64,
    exhausted: AtomicU64,
}

/// Bounded pool of reusable execution slots.
#[derive(Debug, Clone)]
pub struct LeasePool {
    inner: Arc<PoolInner>,
}

/// One execution slot. Returned to the pool on drop.
#[derive(Debug)]
pub struct Lease {
    _permit: OwnedSemaphorePermit,
}

/// Point-in-time pool occupancy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LeasePoolStatus {
    /// Total slots.
    pub size: usize,
    /// Slots currently leased.
    pub in_use: usize,
    /// Slots free.
    pub available: usize,
    /// Leases granted since start.
    pub total_granted: u64,
    /// Acquisitions rejected because the pool stayed full.
    pub total_exhausted: u64,
    /// Whether the pool is closed.
    pub closed: bool,
}

impl LeasePool {
    /// Create a pool with `size` slots.
    pub fn new(size: usize) -> Self {
        Self {
            inner: Arc::new(PoolInner {
                size,
                semaphore: Arc::new(Semaphore::new(size)),
                closed: AtomicBool::new(false),
                granted: AtomicU64::new(0),
                exhausted: AtomicU64::new(0),
            }),
        }
    }

    /// Obtain a slot, waiting at most `timeout`.
    pub async fn acquire(&self, timeout: Duration) -> Result<Lease, LeaseError> {
        if self.inner.closed.load(Ordering::Acquire) {
            return Err(LeaseError::Closed);
        }

        let started = Instant::now();
        let permit = match Arc::clone(&self.inner.semaphore).try_acquire_owned() {
            Ok(permit) => permit,
            Err(_) => {
                match tokio::time::timeout(
                    timeout,
                    Arc::clone(&self.inner.semaphore).acquire_owned(),
                )
                .await
                {
                    Ok(Ok(permit)) => permit,
                    Ok(Err(_)) => return Err(LeaseError::Closed),
                    Err(_) => {
                        self.inner.exhausted.fetch_add(1, Ordering::Relaxed);
                        let waited_ms = started.elapsed().as_millis() as u64;
                        warn!(
                            size = self.inner.size,
                            waited_ms = waited_ms,
                            "Lease pool exhausted"
                        );
                        return Err(LeaseError::Exhausted {
                            size: self.inner.size,
                            waited_ms,
                        });
                    }
                }
            }
        };

        // Re-check: close() may have run while we were waiting.
        if self.inner.closed.load(Ordering::Acquire) {
            return Err(LeaseError::Closed);
        }

        let id = self.inner.granted.fetch_add(1, Ordering::Relaxed) + 1;
        debug!(lease_id = id, "Lease granted");
        Ok(Lease { _permit: permit })
    }

    /// Stop granting new leases. Outstanding leases stay valid.
    pub fn close(&self) {
        if !self.inner.closed.swap(true, Ordering::AcqRel) {
            info!(size = self.inner.size, "Lease pool closed");
        }
    }

    /// Wait for every outstanding lease to come back.
    ///
    /// Returns `false` if some were still out when `timeout` elapsed.
    pub async fn drain(&self, timeout: Duration) -> bool {
        let permits = u32::try_from(self.inner.size).unwrap_or(u32::MAX);
        match tokio::time::timeout(timeout, self.inner.semaphore.acquire_many(permits)).await {
            Ok(Ok(_all)) => true,
            Ok(Err(_)) => true,
            Err(_) => {
                warn!(
                    in_use = self.status().in_use,
                    "Lease pool drain timed out with leases outstanding"
                );
                false
            }
        }
    }

    /// Current occupancy.
    pub fn status(&self) -> LeasePoolStatus {
        let available = self.inner.semaphore.available_permits().min(self.inner.size);
        LeasePoolStatus {
            size: self.inner.size,
            in_use: self.inner.size - available,
            available,
            total_granted: self.inner.granted.load(Ordering::Relaxed),
            total_exhausted: self.inner.exhausted.load(Ordering::Relaxed),
            closed: self.inner.closed.load(Ordering::Acquire),
        }
    }
}
