//! Shared components every transaction runs against.

use std::sync::Arc;
use std::time::Duration;

use enrollhub_core::config::{AppConfig, CanceledResourcePolicy};
use enrollhub_core::error::AppError;
use enrollhub_core::result::AppResult;
use enrollhub_core::types::Credits;
use enrollhub_entity::consumer::QuotaTier;

use crate::collaborator::{CatalogService, ConsumerDirectory};
use crate::lease::{Lease, LeasePool};
use crate::ledger::LedgerIndex;
use crate::lock::LockManager;
use crate::metrics::AdmissionMetrics;
use crate::store::{AllocationRepository, ResourceStore};

/// Credit limits per quota tier.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QuotaLimits {
    /// Ordinary limit.
    pub standard: Credits,
    /// Raised limit for merit exceptions.
    pub merit_exception: Credits,
}

impl QuotaLimits {
    /// Limit that applies to `tier`.
    pub fn for_tier(&self, tier: QuotaTier) -> Credits {
        match tier {
            QuotaTier::Standard => self.standard,
            QuotaTier::MeritException => self.merit_exception,
        }
    }
}

/// Transaction tunables resolved from configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AdmissionSettings {
    /// Budget for acquiring every lock of one transaction.
    pub lock_timeout: Duration,
    /// Budget for obtaining a lease.
    pub lease_timeout: Duration,
    /// Held-count treatment when cancelling on a canceled resource.
    pub canceled_resource_policy: CanceledResourcePolicy,
    /// Credit limits.
    pub quota: QuotaLimits,
}

impl AdmissionSettings {
    /// Resolve settings from the application configuration.
    pub fn from_config(config: &AppConfig) -> AppResult<Self> {
        let quota = &config.admission.quota;
        let to_credits = |value: f64, name: &str| {
            Credits::from_f64(value).ok_or_else(|| {
                AppError::configuration(format!("Quota {name} must be a non-negative number, got {value}"))
            })
        };

        Ok(Self {
            lock_timeout: Duration::from_millis(config.admission.lock_timeout_ms),
            lease_timeout: Duration::from_millis(config.lease_pool.acquire_timeout_ms),
            canceled_resource_policy: config.admission.canceled_resource_policy,
            quota: QuotaLimits {
                standard: to_credits(quota.standard, "standard")?,
                merit_exception: to_credits(quota.merit_exception, "merit_exception")?,
            },
        })
    }
}

/// Handles to the state and collaborators of one admission core.
#[derive(Clone)]
pub struct AdmissionContext {
    /// Resource rows.
    pub resources: Arc<ResourceStore>,
    /// Allocation table.
    pub allocations: Arc<dyn AllocationRepository>,
    /// Credit ledger.
    pub ledger: Arc<LedgerIndex>,
    /// Entity locks.
    pub locks: LockManager,
    /// Execution slots.
    pub leases: LeasePool,
    /// Resource definitions.
    pub catalog: Arc<dyn CatalogService>,
    /// Consumer records.
    pub directory: Arc<dyn ConsumerDirectory>,
    /// Tunables.
    pub settings: AdmissionSettings,
    /// Outcome counters.
    pub metrics: Arc<AdmissionMetrics>,
}

impl AdmissionContext {
    pub(crate) async fn lease(&self) -> Result<Lease, crate::lease::LeaseError> {
        self.leases.acquire(self.settings.lease_timeout).await
    }
}

impl std::fmt::Debug for AdmissionContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AdmissionContext")
            .field("resources", &self.resources.len())
            .field("ledger", &self.ledger.len())
            .field("lock_policy", &self.locks.policy())
            .field("lease_pool", &self.leases.status())
            .field("settings", &self.settings)
            .finish()
    }
}
