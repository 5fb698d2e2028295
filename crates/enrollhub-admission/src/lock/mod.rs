//! Exclusive entity locks.
//!
//! Transactions lock the consumer and resource they touch. Under the
//! default ordered policy every multi-key request is sorted into one
//! global order, which rules out circular waits. The unordered policy
//! takes keys in request order and breaks cycles through a wait-for
//! graph; it exists to exercise deadlock handling.

mod graph;
pub mod key;
pub mod manager;
pub mod metrics;

use thiserror::Error;

pub use key::LockKey;
pub use manager::{LockManager, LockSet};
pub use metrics::{LockMetrics, LockMetricsSnapshot};

/// Identifier of one lock-holding transaction.
pub type TxnId = u64;

/// Lock acquisition failures. Every variant leaves nothing held.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum LockError {
    /// The time budget ran out while waiting for `key`.
    #[error("Timed out after {waited_ms}ms waiting for {key}")]
    Timeout {
        /// Key that could not be obtained.
        key: String,
        /// Time spent waiting on that key.
        waited_ms: u64,
    },

    /// Waiting for `key` would have closed a wait-for cycle.
    #[error("Transaction {txn} aborted: waiting for {key} would deadlock")]
    Deadlock {
        /// Key that would have closed the cycle.
        key: String,
        /// Aborted transaction.
        txn: TxnId,
    },

    /// A key was requested below one already held under the ordered policy.
    #[error("Lock order violation: {key} requested while holding {highest}")]
    OutOfOrder {
        /// Requested key.
        key: String,
        /// Highest key already held.
        highest: String,
    },
}
