//! Lock contention counters.

use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};

/// Lock-free counters for lock acquisitions.
#[derive(Debug, Default)]
pub struct LockMetrics {
    /// Total successful acquisitions.
    acquisitions: AtomicU64,
    /// Acquisitions that had to wait.
    contended: AtomicU64,
    /// Acquisitions that ran out of time.
    timeouts: AtomicU64,
    /// Transactions aborted to break a wait-for cycle.
    deadlocks: AtomicU64,
}

impl LockMetrics {
    /// Create zeroed counters.
    pub const fn new() -> Self {
        Self {
            acquisitions: AtomicU64::new(0),
            contended: AtomicU64::new(0),
            timeouts: AtomicU64::new(0),
            deadlocks: AtomicU64::new(0),
        }
    }

    /// Record a successful acquisition.
    pub fn record_acquisition(&self, was_contended: bool) {
        self.acquisitions.fetch_add(1, Ordering::Relaxed);
        if was_contended {
            self.contended.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// Record a timeout.
    pub fn record_timeout(&self) {
        self.timeouts.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a deadlock abort.
    pub fn record_deadlock(&self) {
        self.deadlocks.fetch_add(1, Ordering::Relaxed);
    }

    /// Take a snapshot of all counters.
    pub fn snapshot(&self) -> LockMetricsSnapshot {
        LockMetricsSnapshot {
            acquisitions: self.acquisitions.load(Ordering::Relaxed),
            contended: self.contended.load(Ordering::Relaxed),
            timeouts: self.timeouts.load(Ordering::Relaxed),
            deadlocks: self.deadlocks.load(Ordering::Relaxed),
        }
    }
}

/// Point-in-time lock counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LockMetricsSnapshot {
    /// Total successful acquisitions.
    pub acquisitions: u64,
    /// Acquisitions that had to wait.
    pub contended: u64,
    /// Acquisitions that ran out of time.
    pub timeouts: u64,
    /// Transactions aborted to break a wait-for cycle.
    pub deadlocks: u64,
}

impl LockMetricsSnapshot {
    /// Share of acquisitions that had to wait (0.0 to 1.0).
    pub fn contention_rate(&self) -> f64 {
        if self.acquisitions == 0 {
            return 0.0;
        }
        self.contended as f64 / self.acquisitions as f64
    }
}
