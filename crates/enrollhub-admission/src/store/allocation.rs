//! Allocation table.

use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use tracing::debug;

use enrollhub_core::error::AppError;
use enrollhub_core::result::AppResult;
use enrollhub_core::types::{AllocationId, ConsumerId, ResourceId};
use enrollhub_entity::allocation::{Allocation, AllocationStatus, NewAllocation};

/// Storage for allocations.
///
/// Allocations are append-mostly: after insertion only the status flips
/// from active to cancelled. `remove` exists solely to undo an insert
/// whose enclosing transaction failed.
#[async_trait]
pub trait AllocationRepository: Send + Sync + 'static {
    /// Insert a new active allocation and assign its id.
    async fn insert(&self, new: NewAllocation) -> AppResult<Allocation>;

    /// Delete an allocation created by a transaction that rolled back.
    async fn remove(&self, id: AllocationId) -> AppResult<()>;

    /// Find an allocation by id.
    async fn find_by_id(&self, id: AllocationId) -> AppResult<Option<Allocation>>;

    /// Find the active allocation of a consumer on a resource.
    async fn find_active(
        &self,
        consumer_id: &ConsumerId,
        resource_id: ResourceId,
    ) -> AppResult<Option<Allocation>>;

    /// All allocations of a consumer, oldest first.
    async fn find_by_consumer(&self, consumer_id: &ConsumerId) -> AppResult<Vec<Allocation>>;

    /// Flip an active allocation to cancelled.
    async fn mark_cancelled(&self, id: AllocationId, at: DateTime<Utc>) -> AppResult<Allocation>;

    /// Every allocation, ordered by id.
    async fn all(&self) -> AppResult<Vec<Allocation>>;

    /// Replace the table and continue id assignment after the highest id.
    async fn restore(&self, allocations: Vec<Allocation>) -> AppResult<()>;
}

/// In-memory allocation table.
#[derive(Debug)]
pub struct MemoryAllocationRepository {
    rows: DashMap<AllocationId, Allocation>,
    active: DashMap<(ConsumerId, ResourceId), AllocationId>,
    next_id: AtomicU64,
}

impl MemoryAllocationRepository {
    /// Create an empty table.
    pub fn new() -> Self {
        Self {
            rows: DashMap::new(),
            active: DashMap::new(),
            next_id: AtomicU64::new(1),
        }
    }
}

impl Default for MemoryAllocationRepository {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl AllocationRepository for MemoryAllocationRepository {
    async fn insert(&self, new: NewAllocation) -> AppResult<Allocation> {
        let key = (new.consumer_id.clone(), new.resource_id);
        let id = AllocationId::new(self.next_id.fetch_add(1, Ordering::Relaxed));

        match self.active.entry(key) {
            Entry::Occupied(existing) => {
                return Err(AppError::conflict(format!(
                    "Consumer {} already holds active allocation {} on resource {}",
                    new.consumer_id,
                    existing.get(),
                    new.resource_id
                )));
            }
            Entry::Vacant(slot) => {
                slot.insert(id);
            }
        }

        let allocation = Allocation {
            id,
            consumer_id: new.consumer_id,
            resource_id: new.resource_id,
            term: new.term,
            credit_weight: new.credit_weight,
            status: AllocationStatus::Active,
            retake: new.retake,
            created_at: Utc::now(),
            cancelled_at: None,
        };
        self.rows.insert(id, allocation.clone());
        debug!(allocation_id = %id, "Allocation inserted");
        Ok(allocation)
    }

    async fn remove(&self, id: AllocationId) -> AppResult<()> {
        let (_, allocation) = self
            .rows
            .remove(&id)
            .ok_or_else(|| AppError::not_found(format!("Allocation {id} not found")))?;
        self.active.remove_if(
            &(allocation.consumer_id.clone(), allocation.resource_id),
            |_, active_id| *active_id == id,
        );
        Ok(())
    }

    async fn find_by_id(&self, id: AllocationId) -> AppResult<Option<Allocation>> {
        Ok(self.rows.get(&id).map(|a| a.clone()))
    }

    async fn find_active(
        &self,
        consumer_id: &ConsumerId,
        resource_id: ResourceId,
    ) -> AppResult<Option<Allocation>> {
        let id = match self.active.get(&(consumer_id.clone(), resource_id)) {
            Some(id) => *id,
            None => return Ok(None),
        };
        Ok(self.rows.get(&id).map(|a| a.clone()))
    }

    async fn find_by_consumer(&self, consumer_id: &ConsumerId) -> AppResult<Vec<Allocation>> {
        let mut found: Vec<Allocation> = self
            .rows
            .iter()
            .filter(|a| &a.consumer_id == consumer_id)
            .map(|a| a.value().clone())
            .collect();
        found.sort_by_key(|a| a.id);
        Ok(found)
    }

    async fn mark_cancelled(&self, id: AllocationId, at: DateTime<Utc>) -> AppResult<Allocation> {
        let mut row = self
            .rows
            .get_mut(&id)
            .ok_or_else(|| AppError::not_found(format!("Allocation {id} not found")))?;
        if !row.status.is_active() {
            return Err(AppError::conflict(format!("Allocation {id} is already cancelled")));
        }
        row.status = AllocationStatus::Cancelled;
        row.cancelled_at = Some(at);
        let updated = row.clone();
        drop(row);

        self.active.remove_if(
            &(updated.consumer_id.clone(), updated.resource_id),
            |_, active_id| *active_id == id,
        );
        Ok(updated)
    }

    async fn all(&self) -> AppResult<Vec<Allocation>> {
        let mut rows: Vec<Allocation> = self.rows.iter().map(|a| a.value().clone()).collect();
        rows.sort_by_key(|a| a.id);
        Ok(rows)
    }

    async fn restore(&self, allocations: Vec<Allocation>) -> AppResult<()> {
        self.rows.clear();
        self.active.clear();

        let mut highest = 0;
        for allocation in allocations {
            highest = highest.max(allocation.id.value());
            if allocation.is_active() {
                let key = (allocation.consumer_id.clone(), allocation.resource_id);
                if let Some(previous) = self.active.insert(key, allocation.id) {
                    return Err(AppError::validation(format!(
                        "Allocations {previous} and {} are both active for consumer {} on resource {}",
                        allocation.id, allocation.consumer_id, allocation.resource_id
                    )));
                }
            }
            self.rows.insert(allocation.id, allocation);
        }
        self.next_id.store(highest + 1, Ordering::Relaxed);
        Ok(())
    }
}
