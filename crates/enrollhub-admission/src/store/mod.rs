//! Admission-owned state: resource rows, allocations, and snapshots.

pub mod allocation;
pub mod resource;
pub mod snapshot;

use thiserror::Error;

use enrollhub_core::types::ResourceId;

pub use allocation::{AllocationRepository, MemoryAllocationRepository};
pub use resource::ResourceStore;
pub use snapshot::StoreSnapshot;

/// Row-level failures of the resource store.
///
/// Any of these surfacing during a transaction means an invariant was
/// about to break; the transaction rolls back and reports an internal
/// failure.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum StoreError {
    /// No row exists for the resource.
    #[error("Resource {resource_id} has no store row")]
    ResourceMissing {
        /// Resource identifier.
        resource_id: ResourceId,
    },

    /// Incrementing would push `held` past `capacity`.
    #[error("Resource {resource_id} is at {held}/{capacity}")]
    CapacityInvariant {
        /// Resource identifier.
        resource_id: ResourceId,
        /// Seats held.
        held: u32,
        /// Capacity.
        capacity: u32,
    },

    /// Decrementing would push `held` below zero.
    #[error("Resource {resource_id} has no held seat to release")]
    HeldUnderflow {
        /// Resource identifier.
        resource_id: ResourceId,
    },
}
