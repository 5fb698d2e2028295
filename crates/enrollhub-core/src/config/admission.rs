//! Admission, retry, and reconciliation configuration.

use serde::{Deserialize, Serialize};
use validator::Validate;

/// Admission transaction configuration.
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct AdmissionConfig {
    /// Total time budget for acquiring every lock a transaction needs.
    #[serde(default = "default_lock_timeout_ms")]
    #[validate(range(min = 1, max = 60000))]
    pub lock_timeout_ms: u64,
    /// Multi-lock acquisition discipline.
    #[serde(default)]
    pub lock_policy: LockPolicy,
    /// What cancellation does to the held count of a canceled resource.
    #[serde(default)]
    pub canceled_resource_policy: CanceledResourcePolicy,
    /// Cumulative credit limits per quota tier.
    #[serde(default)]
    #[validate(nested)]
    pub quota: QuotaConfig,
}

impl Default for AdmissionConfig {
    fn default() -> Self {
        Self {
            lock_timeout_ms: default_lock_timeout_ms(),
            lock_policy: LockPolicy::default(),
            canceled_resource_policy: CanceledResourcePolicy::default(),
            quota: QuotaConfig::default(),
        }
    }
}

/// How a transaction acquires more than one entity lock.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LockPolicy {
    /// Keys are sorted into the global order before acquisition.
    Ordered,
    /// Keys are acquired in request order with wait-for cycle detection.
    /// Only meant for exercising deadlock handling.
    Unordered,
}

impl Default for LockPolicy {
    fn default() -> Self {
        Self::Ordered
    }
}

impl std::fmt::Display for LockPolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LockPolicy::Ordered => write!(f, "ordered"),
            LockPolicy::Unordered => write!(f, "unordered"),
        }
    }
}

/// Held-count behavior when an allocation on a canceled resource is cancelled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CanceledResourcePolicy {
    /// Leave `held` untouched; the seat is not recovered.
    FreezeHeld,
    /// Decrement `held` as for any other resource.
    ReleaseHeld,
}

impl Default for CanceledResourcePolicy {
    fn default() -> Self {
        Self::FreezeHeld
    }
}

impl std::fmt::Display for CanceledResourcePolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CanceledResourcePolicy::FreezeHeld => write!(f, "freeze_held"),
            CanceledResourcePolicy::ReleaseHeld => write!(f, "release_held"),
        }
    }
}

/// Credit limits per quota tier.
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct QuotaConfig {
    /// Limit applied to ordinary consumers.
    #[serde(default = "default_standard_quota")]
    #[validate(range(min = 0.0, max = 1000.0))]
    pub standard: f64,
    /// Limit applied to consumers granted a merit exception.
    #[serde(default = "default_merit_quota")]
    #[validate(range(min = 0.0, max = 1000.0))]
    pub merit_exception: f64,
}

impl Default for QuotaConfig {
    fn default() -> Self {
        Self {
            standard: default_standard_quota(),
            merit_exception: default_merit_quota(),
        }
    }
}

/// Retry behavior for contention failures (busy, timeout, deadlock).
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct RetryConfig {
    /// Maximum attempts including the first one.
    #[serde(default = "default_max_attempts")]
    #[validate(range(min = 1, max = 20))]
    pub max_attempts: u32,
    /// Delay before the first retry.
    #[serde(default = "default_initial_backoff_ms")]
    pub initial_backoff_ms: u64,
    /// Upper bound for any single delay.
    #[serde(default = "default_max_backoff_ms")]
    pub max_backoff_ms: u64,
    /// Exponential growth factor.
    #[serde(default = "default_backoff_multiplier")]
    #[validate(range(min = 1.0, max = 10.0))]
    pub backoff_multiplier: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            initial_backoff_ms: default_initial_backoff_ms(),
            max_backoff_ms: default_max_backoff_ms(),
            backoff_multiplier: default_backoff_multiplier(),
        }
    }
}

/// Background ledger reconciliation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReconcilerConfig {
    /// Whether the periodic reconciler runs.
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Seconds between reconciliation passes.
    #[serde(default = "default_reconcile_interval")]
    pub interval_seconds: u64,
}

impl Default for ReconcilerConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            interval_seconds: default_reconcile_interval(),
        }
    }
}

fn default_lock_timeout_ms() -> u64 {
    3000
}

fn default_standard_quota() -> f64 {
    18.0
}

fn default_merit_quota() -> f64 {
    21.0
}

fn default_max_attempts() -> u32 {
    3
}

fn default_initial_backoff_ms() -> u64 {
    10
}

fn default_max_backoff_ms() -> u64 {
    1000
}

fn default_backoff_multiplier() -> f64 {
    2.0
}

fn default_true() -> bool {
    true
}

fn default_reconcile_interval() -> u64 {
    300
}
