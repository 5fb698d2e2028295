//! Undo journal for the admission commit.

use std::sync::Arc;

use tracing::{error, warn};

use enrollhub_core::types::{AllocationId, ResourceId};

use crate::store::{AllocationRepository, ResourceStore};

/// Inverse of one applied commit step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Undo {
    /// Give back the seat taken on a resource.
    ReleaseHeld(ResourceId),
    /// Delete the allocation that was inserted.
    RemoveAllocation(AllocationId),
}

/// Records the inverse of every applied write until the commit completes.
///
/// The ledger write comes last and cannot fail after it is applied, so it
/// never needs an undo step. A journal that is neither committed nor
/// rolled back (a panic mid-commit) undoes its steps in reverse order when
/// dropped.
pub struct CommitJournal {
    resources: Arc<ResourceStore>,
    allocations: Arc<dyn AllocationRepository>,
    steps: Vec<Undo>,
}

impl CommitJournal {
    /// Start an empty journal.
    pub fn new(resources: Arc<ResourceStore>, allocations: Arc<dyn AllocationRepository>) -> Self {
        Self {
            resources,
            allocations,
            steps: Vec::with_capacity(2),
        }
    }

    /// Register the inverse of a write that just succeeded.
    pub fn record(&mut self, undo: Undo) {
        self.steps.push(undo);
    }

    #[cfg(test)]
    fn steps(&self) -> &[Undo] {
        &self.steps
    }

    /// Keep every write.
    pub fn commit(mut self) {
        self.steps.clear();
    }

    /// Undo every recorded write, newest first.
    pub async fn rollback(mut self) {
        while let Some(step) = self.steps.pop() {
            match step {
                Undo::RemoveAllocation(id) => {
                    if let Err(e) = self.allocations.remove(id).await {
                        error!(allocation_id = %id, error = %e, "Rollback could not remove allocation");
                    }
                }
                other => self.undo_local(other),
            }
        }
    }

    fn undo_local(&self, step: Undo) {
        match step {
            Undo::ReleaseHeld(resource_id) => {
                if let Err(e) = self.resources.decrement_held(resource_id) {
                    error!(resource_id = %resource_id, error = %e, "Rollback could not release seat");
                }
            }
            Undo::RemoveAllocation(id) => {
                let allocations = Arc::clone(&self.allocations);
                match tokio::runtime::Handle::try_current() {
                    Ok(handle) => {
                        handle.spawn(async move {
                            if let Err(e) = allocations.remove(id).await {
                                error!(allocation_id = %id, error = %e, "Deferred rollback could not remove allocation");
                            }
                        });
                    }
                    Err(_) => {
                        error!(allocation_id = %id, "No runtime to remove allocation of abandoned transaction");
                    }
                }
            }
        }
    }
}

impl Drop for CommitJournal {
    fn drop(&mut self) {
        if self.steps.is_empty() {
            return;
        }
        warn!(steps = self.steps.len(), "Admission abandoned mid-commit, undoing writes");
        while let Some(step) = self.steps.pop() {
            self.undo_local(step);
        }
    }
}

impl std::fmt::Debug for CommitJournal {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CommitJournal").field("steps", &self.steps).finish()
    }
}
