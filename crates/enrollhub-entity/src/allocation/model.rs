//! Allocation entity model.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use enrollhub_core::types::{AllocationId, ConsumerId, Credits, ResourceId, TermKey};

use super::status::AllocationStatus;

/// One consumer's claim on one resource's capacity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Allocation {
    /// Unique, monotonically assigned identifier.
    pub id: AllocationId,
    /// Holder of the allocation.
    pub consumer_id: ConsumerId,
    /// Resource whose capacity is claimed.
    pub resource_id: ResourceId,
    /// Term the resource belonged to at admission.
    pub term: TermKey,
    /// Credit weight charged at admission.
    pub credit_weight: Credits,
    /// Lifecycle state.
    pub status: AllocationStatus,
    /// Whether this repeats a previously failed course.
    #[serde(default)]
    pub retake: bool,
    /// When the allocation was admitted.
    pub created_at: DateTime<Utc>,
    /// When the allocation was cancelled.
    #[serde(default)]
    pub cancelled_at: Option<DateTime<Utc>>,
}

impl Allocation {
    /// Whether the allocation still counts against capacity and quota.
    pub fn is_active(&self) -> bool {
        self.status.is_active()
    }
}

/// Data required to create a new allocation. The store assigns the id.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewAllocation {
    /// Holder of the allocation.
    pub consumer_id: ConsumerId,
    /// Resource whose capacity is claimed.
    pub resource_id: ResourceId,
    /// Term of the resource.
    pub term: TermKey,
    /// Credit weight charged.
    pub credit_weight: Credits,
    /// Whether this repeats a previously failed course.
    pub retake: bool,
}
