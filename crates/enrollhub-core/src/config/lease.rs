//! Execution slot pool configuration.

use serde::{Deserialize, Serialize};
use validator::Validate;

/// Bounds the number of admission and cancellation transactions in flight.
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct LeasePoolConfig {
    /// Number of slots.
    #[serde(default = "default_size")]
    #[validate(range(min = 1, max = 4096))]
    pub size: usize,
    /// How long a transaction waits for a free slot before giving up.
    #[serde(default = "default_acquire_timeout")]
    pub acquire_timeout_ms: u64,
    /// How long shutdown waits for outstanding leases to return.
    #[serde(default = "default_drain_timeout")]
    pub drain_timeout_seconds: u64,
}

impl Default for LeasePoolConfig {
    fn default() -> Self {
        Self {
            size: default_size(),
            acquire_timeout_ms: default_acquire_timeout(),
            drain_timeout_seconds: default_drain_timeout(),
        }
    }
}

fn default_size() -> usize {
    10
}

fn default_acquire_timeout() -> u64 {
    3000
}

fn default_drain_timeout() -> u64 {
    30
}
