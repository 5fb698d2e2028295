//! Cancellation of active allocations.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use enrollhub_core::config::CanceledResourcePolicy;
use enrollhub_core::types::{AllocationId, Credits};
use enrollhub_entity::allocation::Allocation;
use enrollhub_entity::resource::ResourceSnapshot;

use crate::context::AdmissionContext;
use crate::error::AdmissionError;
use crate::lock::LockKey;

/// A completed cancellation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Cancellation {
    /// The allocation, now cancelled.
    pub allocation: Allocation,
    /// Whether the seat went back to the resource.
    pub held_released: bool,
    /// Resource state after the cancellation, if the resource is still known.
    pub resource: Option<ResourceSnapshot>,
    /// Consumer's credits in the allocation's term after the cancellation.
    pub ledger: Credits,
}

/// Reverses allocations under the same locking discipline as admission.
#[derive(Debug, Clone, Copy)]
pub struct CancellationHandler<'a> {
    ctx: &'a AdmissionContext,
}

impl<'a> CancellationHandler<'a> {
    /// Bind to a context.
    pub fn new(ctx: &'a AdmissionContext) -> Self {
        Self { ctx }
    }

    /// Cancel allocation `allocation_id`.
    ///
    /// On a withdrawn resource the seat stays held unless the configured
    /// policy releases it. Ledger and allocation status always change.
    pub async fn cancel(&self, allocation_id: AllocationId) -> Result<Cancellation, AdmissionError> {
        let ctx = self.ctx;

        let found = ctx
            .allocations
            .find_by_id(allocation_id)
            .await?
            .ok_or(AdmissionError::AllocationNotFound { allocation_id })?;
        if !found.is_active() {
            return Err(AdmissionError::AlreadyCancelled {
                allocation_id,
                cancelled_at: found.cancelled_at,
            });
        }

        let _lease = ctx.lease().await?;
        let _locks = ctx
            .locks
            .acquire_all(
                [
                    LockKey::consumer(&found.consumer_id),
                    LockKey::resource(found.resource_id),
                ],
                ctx.settings.lock_timeout,
            )
            .await
            .map_err(|e| {
                warn!(allocation_id = %allocation_id, error = %e, "Cancellation aborted while locking");
                AdmissionError::from(e)
            })?;

        let allocation = ctx
            .allocations
            .find_by_id(allocation_id)
            .await?
            .ok_or(AdmissionError::AllocationNotFound { allocation_id })?;
        if !allocation.is_active() {
            debug!(allocation_id = %allocation_id, "Allocation cancelled concurrently");
            return Err(AdmissionError::AlreadyCancelled {
                allocation_id,
                cancelled_at: allocation.cancelled_at,
            });
        }

        let release_held = match ctx.catalog.get_resource(allocation.resource_id).await? {
            Some(catalog) => {
                let row = ctx.resources.refresh(&catalog);
                !row.canceled
                    || ctx.settings.canceled_resource_policy == CanceledResourcePolicy::ReleaseHeld
            }
            None => {
                warn!(
                    allocation_id = %allocation_id,
                    resource_id = %allocation.resource_id,
                    "Resource missing from catalog, leaving held count untouched"
                );
                false
            }
        };

        let cancelled = ctx
            .allocations
            .mark_cancelled(allocation_id, Utc::now())
            .await?;
        let ledger = ctx
            .ledger
            .subtract(&cancelled.consumer_id, cancelled.term, cancelled.credit_weight);

        let mut held_released = false;
        if release_held {
            match ctx.resources.decrement_held(cancelled.resource_id) {
                Ok(_) => held_released = true,
                Err(e) => warn!(
                    allocation_id = %allocation_id,
                    resource_id = %cancelled.resource_id,
                    error = %e,
                    "Seat release skipped"
                ),
            }
        }
        let resource = ctx.resources.snapshot(cancelled.resource_id);

        info!(
            allocation_id = %allocation_id,
            consumer_id = %cancelled.consumer_id,
            resource_id = %cancelled.resource_id,
            held_released = held_released,
            held = resource.map(|r| r.held),
            ledger = %ledger,
            "Allocation cancelled"
        );

        Ok(Cancellation {
            allocation: cancelled,
            held_released,
            resource,
            ledger,
        })
    }
}
