//! The admission transaction.
//!
//! One admission runs as: lease, consumer and resource locks, a fresh
//! read of both collaborators, the validation chain, then a three-write
//! commit (seat, allocation, ledger) guarded by an undo journal. The
//! lease and locks are released when the transaction value goes out of
//! scope, on every path.

pub mod undo;

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, warn};

use enrollhub_core::types::{ConsumerId, Credits, ResourceId};
use enrollhub_entity::allocation::{Allocation, NewAllocation};
use enrollhub_entity::consumer::CourseOutcome;
use enrollhub_entity::resource::ResourceSnapshot;

use crate::context::AdmissionContext;
use crate::error::AdmissionError;
use crate::lock::LockKey;

pub use undo::{CommitJournal, Undo};

/// A committed admission.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Admission {
    /// The new active allocation.
    pub allocation: Allocation,
    /// Resource state right after the commit.
    pub resource: ResourceSnapshot,
    /// Consumer's credits in the resource's term after the commit.
    pub ledger: Credits,
}

/// Runs admissions against one [`AdmissionContext`].
#[derive(Debug, Clone, Copy)]
pub struct AdmissionTransaction<'a> {
    ctx: &'a AdmissionContext,
}

impl<'a> AdmissionTransaction<'a> {
    /// Bind to a context.
    pub fn new(ctx: &'a AdmissionContext) -> Self {
        Self { ctx }
    }

    /// Admit `consumer_id` to `resource_id`.
    pub async fn admit(
        &self,
        consumer_id: &ConsumerId,
        resource_id: ResourceId,
    ) -> Result<Admission, AdmissionError> {
        let ctx = self.ctx;

        let _lease = ctx.lease().await.map_err(|e| {
            warn!(consumer_id = %consumer_id, resource_id = %resource_id, error = %e, "Admission rejected: no execution slot");
            AdmissionError::from(e)
        })?;

        let _locks = ctx
            .locks
            .acquire_all(
                [LockKey::consumer(consumer_id), LockKey::resource(resource_id)],
                ctx.settings.lock_timeout,
            )
            .await
            .map_err(|e| {
                warn!(consumer_id = %consumer_id, resource_id = %resource_id, error = %e, "Admission aborted while locking");
                AdmissionError::from(e)
            })?;

        let result = self.validate_and_commit(consumer_id, resource_id).await;
        if let Err(e) = &result {
            debug!(
                consumer_id = %consumer_id,
                resource_id = %resource_id,
                reason = e.code(),
                "Admission rejected"
            );
        }
        result
    }

    async fn validate_and_commit(
        &self,
        consumer_id: &ConsumerId,
        resource_id: ResourceId,
    ) -> Result<Admission, AdmissionError> {
        let ctx = self.ctx;

        let consumer = ctx
            .directory
            .get_consumer(consumer_id)
            .await?
            .ok_or_else(|| AdmissionError::ConsumerNotFound {
                consumer_id: consumer_id.clone(),
            })?;
        if !consumer.eligibility.is_eligible() {
            return Err(AdmissionError::ConsumerIneligible {
                consumer_id: consumer_id.clone(),
            });
        }

        let catalog = ctx
            .catalog
            .get_resource(resource_id)
            .await?
            .ok_or(AdmissionError::ResourceNotFound { resource_id })?;
        let resource = ctx.resources.refresh(&catalog);

        if resource.canceled {
            return Err(AdmissionError::ResourceCanceled {
                resource: resource.snapshot(),
            });
        }

        if let Some(existing) = ctx.allocations.find_active(consumer_id, resource_id).await? {
            return Err(AdmissionError::DuplicateAllocation {
                allocation_id: existing.id,
                consumer_id: consumer_id.clone(),
                resource_id,
            });
        }

        let retake = match catalog.course_code.as_deref() {
            Some(code) => match consumer.outcome_for(code) {
                Some(CourseOutcome::Passed) => {
                    return Err(AdmissionError::RetakeNotAllowed {
                        consumer_id: consumer_id.clone(),
                        course_code: code.to_string(),
                    });
                }
                Some(CourseOutcome::Failed) => true,
                None => false,
            },
            None => false,
        };

        let current = ctx.ledger.get(consumer_id, resource.term);
        let limit = ctx.settings.quota.for_tier(consumer.quota_tier);
        let within_quota = current
            .checked_add(resource.credit_weight)
            .is_some_and(|total| total <= limit);
        if !within_quota {
            return Err(AdmissionError::QuotaExceeded {
                consumer_id: consumer_id.clone(),
                term: resource.term,
                current,
                requested: resource.credit_weight,
                limit,
            });
        }

        if resource.is_full() {
            return Err(AdmissionError::CapacityExceeded {
                resource: resource.snapshot(),
            });
        }

        self.commit(NewAllocation {
            consumer_id: consumer_id.clone(),
            resource_id,
            term: resource.term,
            credit_weight: resource.credit_weight,
            retake,
        })
        .await
    }

    async fn commit(&self, new: NewAllocation) -> Result<Admission, AdmissionError> {
        let ctx = self.ctx;
        let mut journal =
            CommitJournal::new(Arc::clone(&ctx.resources), Arc::clone(&ctx.allocations));

        let resource = match ctx.resources.increment_held(new.resource_id) {
            Ok(snapshot) => snapshot,
            Err(e) => {
                error!(resource_id = %new.resource_id, error = %e, "Seat increment failed");
                journal.rollback().await;
                return Err(AdmissionError::internal(e.to_string()));
            }
        };
        journal.record(Undo::ReleaseHeld(new.resource_id));

        let allocation = match ctx.allocations.insert(new.clone()).await {
            Ok(allocation) => allocation,
            Err(e) => {
                error!(
                    consumer_id = %new.consumer_id,
                    resource_id = %new.resource_id,
                    error = %e,
                    "Allocation insert failed, rolling back"
                );
                journal.rollback().await;
                return Err(AdmissionError::internal(e.to_string()));
            }
        };
        journal.record(Undo::RemoveAllocation(allocation.id));

        let ledger = match ctx.ledger.add(&new.consumer_id, new.term, new.credit_weight) {
            Some(total) => total,
            None => {
                error!(consumer_id = %new.consumer_id, term = %new.term, "Ledger overflow, rolling back");
                journal.rollback().await;
                return Err(AdmissionError::internal("ledger overflow"));
            }
        };
        journal.commit();

        info!(
            allocation_id = %allocation.id,
            consumer_id = %allocation.consumer_id,
            resource_id = %allocation.resource_id,
            held = resource.held,
            capacity = resource.capacity,
            ledger = %ledger,
            retake = allocation.retake,
            "Admission committed"
        );

        Ok(Admission {
            allocation,
            resource,
            ledger,
        })
    }
}
