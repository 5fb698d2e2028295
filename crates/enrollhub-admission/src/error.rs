//! Admission and cancellation outcomes other than success.

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::json;
use thiserror::Error;

use enrollhub_core::error::{AppError, ErrorKind};
use enrollhub_core::types::{AllocationId, ConsumerId, Credits, ResourceId, TermKey};
use enrollhub_entity::resource::ResourceSnapshot;

use crate::lease::LeaseError;
use crate::lock::LockError;

/// Coarse grouping of failures by how a caller should react.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureClass {
    /// The named entity does not exist. Terminal.
    NotFound,
    /// A business rule rejected the request. Terminal for this attempt.
    BusinessRule,
    /// Contention on leases or locks. Safe to retry.
    Contention,
    /// Storage or invariant failure. No partial state remains.
    Fatal,
}

impl FailureClass {
    /// Return the class as a snake_case string.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::NotFound => "not_found",
            Self::BusinessRule => "business_rule",
            Self::Contention => "contention",
            Self::Fatal => "fatal",
        }
    }
}

impl std::fmt::Display for FailureClass {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Why an admission or cancellation did not complete.
///
/// Every variant carries what was observed at the moment of failure.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum AdmissionError {
    /// The directory has no record of the consumer.
    #[error("Consumer {consumer_id} not found")]
    ConsumerNotFound {
        /// Consumer identifier.
        consumer_id: ConsumerId,
    },

    /// The catalog has no record of the resource.
    #[error("Resource {resource_id} not found")]
    ResourceNotFound {
        /// Resource identifier.
        resource_id: ResourceId,
    },

    /// No allocation with this id exists.
    #[error("Allocation {allocation_id} not found")]
    AllocationNotFound {
        /// Allocation identifier.
        allocation_id: AllocationId,
    },

    /// The consumer is not currently allowed to register.
    #[error("Consumer {consumer_id} is not eligible to register")]
    ConsumerIneligible {
        /// Consumer identifier.
        consumer_id: ConsumerId,
    },

    /// The resource has been withdrawn.
    #[error("Resource {} is canceled", .resource.id)]
    ResourceCanceled {
        /// Resource state at rejection.
        resource: ResourceSnapshot,
    },

    /// The consumer already holds an active allocation on the resource.
    #[error("Consumer {consumer_id} already holds allocation {allocation_id} on resource {resource_id}")]
    DuplicateAllocation {
        /// The existing active allocation.
        allocation_id: AllocationId,
        /// Consumer identifier.
        consumer_id: ConsumerId,
        /// Resource identifier.
        resource_id: ResourceId,
    },

    /// The consumer already passed this course.
    #[error("Consumer {consumer_id} already passed {course_code}")]
    RetakeNotAllowed {
        /// Consumer identifier.
        consumer_id: ConsumerId,
        /// Course code shared by the resource and the completed course.
        course_code: String,
    },

    /// Admitting would push the consumer's term credits past the limit.
    #[error("Consumer {consumer_id} holds {current} credits in {term}; adding {requested} exceeds limit {limit}")]
    QuotaExceeded {
        /// Consumer identifier.
        consumer_id: ConsumerId,
        /// Term of the resource.
        term: TermKey,
        /// Credits held before this request.
        current: Credits,
        /// Credit weight of the resource.
        requested: Credits,
        /// Limit for the consumer's tier.
        limit: Credits,
    },

    /// Every seat is taken.
    #[error("Resource {} is full ({}/{})", .resource.id, .resource.held, .resource.capacity)]
    CapacityExceeded {
        /// Resource state at rejection.
        resource: ResourceSnapshot,
    },

    /// The allocation was already cancelled.
    #[error("Allocation {allocation_id} is already cancelled")]
    AlreadyCancelled {
        /// Allocation identifier.
        allocation_id: AllocationId,
        /// When it was cancelled.
        cancelled_at: Option<DateTime<Utc>>,
    },

    /// No execution slot freed up in time.
    #[error("All {pool_size} execution slots busy (waited {waited_ms}ms)")]
    Busy {
        /// Lease pool size.
        pool_size: usize,
        /// Time spent waiting.
        waited_ms: u64,
    },

    /// A lock could not be obtained in time.
    #[error("Timed out after {waited_ms}ms waiting for {key}")]
    Timeout {
        /// Key that could not be obtained.
        key: String,
        /// Time spent waiting.
        waited_ms: u64,
    },

    /// The transaction was chosen as the victim of a lock cycle.
    #[error("Aborted to break a deadlock on {key}")]
    DeadlockAborted {
        /// Key whose wait would have closed the cycle.
        key: String,
    },

    /// Storage or invariant failure. Nothing was committed.
    #[error("Internal admission failure: {message}")]
    Internal {
        /// Description.
        message: String,
    },
}

impl AdmissionError {
    /// Failure class of this outcome.
    pub fn class(&self) -> FailureClass {
        match self {
            Self::ConsumerNotFound { .. }
            | Self::ResourceNotFound { .. }
            | Self::AllocationNotFound { .. } => FailureClass::NotFound,
            Self::ConsumerIneligible { .. }
            | Self::ResourceCanceled { .. }
            | Self::DuplicateAllocation { .. }
            | Self::RetakeNotAllowed { .. }
            | Self::QuotaExceeded { .. }
            | Self::CapacityExceeded { .. }
            | Self::AlreadyCancelled { .. } => FailureClass::BusinessRule,
            Self::Busy { .. } | Self::Timeout { .. } | Self::DeadlockAborted { .. } => {
                FailureClass::Contention
            }
            Self::Internal { .. } => FailureClass::Fatal,
        }
    }

    /// Whether retrying the same request may succeed.
    pub fn is_retryable(&self) -> bool {
        self.class() == FailureClass::Contention
    }

    /// Stable machine-readable code.
    pub fn code(&self) -> &'static str {
        match self {
            Self::ConsumerNotFound { .. } => "consumer_not_found",
            Self::ResourceNotFound { .. } => "resource_not_found",
            Self::AllocationNotFound { .. } => "allocation_not_found",
            Self::ConsumerIneligible { .. } => "consumer_ineligible",
            Self::ResourceCanceled { .. } => "resource_canceled",
            Self::DuplicateAllocation { .. } => "duplicate_allocation",
            Self::RetakeNotAllowed { .. } => "retake_not_allowed",
            Self::QuotaExceeded { .. } => "quota_exceeded",
            Self::CapacityExceeded { .. } => "capacity_exceeded",
            Self::AlreadyCancelled { .. } => "already_cancelled",
            Self::Busy { .. } => "busy",
            Self::Timeout { .. } => "timeout",
            Self::DeadlockAborted { .. } => "deadlock_aborted",
            Self::Internal { .. } => "internal",
        }
    }

    /// State observed at failure time, as JSON.
    pub fn details(&self) -> serde_json::Value {
        let state = match self {
            Self::ConsumerNotFound { consumer_id } | Self::ConsumerIneligible { consumer_id } => {
                json!({ "consumer_id": consumer_id })
            }
            Self::ResourceNotFound { resource_id } => json!({ "resource_id": resource_id }),
            Self::AllocationNotFound { allocation_id } => json!({ "allocation_id": allocation_id }),
            Self::ResourceCanceled { resource } | Self::CapacityExceeded { resource } => {
                json!({ "resource": resource })
            }
            Self::DuplicateAllocation {
                allocation_id,
                consumer_id,
                resource_id,
            } => json!({
                "allocation_id": allocation_id,
                "consumer_id": consumer_id,
                "resource_id": resource_id,
            }),
            Self::RetakeNotAllowed {
                consumer_id,
                course_code,
            } => json!({ "consumer_id": consumer_id, "course_code": course_code }),
            Self::QuotaExceeded {
                consumer_id,
                term,
                current,
                requested,
                limit,
            } => json!({
                "consumer_id": consumer_id,
                "term": term,
                "current": current,
                "requested": requested,
                "limit": limit,
            }),
            Self::AlreadyCancelled {
                allocation_id,
                cancelled_at,
            } => json!({ "allocation_id": allocation_id, "cancelled_at": cancelled_at }),
            Self::Busy {
                pool_size,
                waited_ms,
            } => json!({ "pool_size": pool_size, "waited_ms": waited_ms }),
            Self::Timeout { key, waited_ms } => json!({ "key": key, "waited_ms": waited_ms }),
            Self::DeadlockAborted { key } => json!({ "key": key }),
            Self::Internal { .. } => json!({}),
        };
        json!({
            "code": self.code(),
            "class": self.class(),
            "state": state,
        })
    }

    pub(crate) fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }
}

impl From<LockError> for AdmissionError {
    fn from(err: LockError) -> Self {
        match err {
            LockError::Timeout { key, waited_ms } => Self::Timeout { key, waited_ms },
            LockError::Deadlock { key, .. } => Self::DeadlockAborted { key },
            LockError::OutOfOrder { .. } => Self::internal(err.to_string()),
        }
    }
}

impl From<LeaseError> for AdmissionError {
    fn from(err: LeaseError) -> Self {
        match err {
            LeaseError::Exhausted { size, waited_ms } => Self::Busy {
                pool_size: size,
                waited_ms,
            },
            LeaseError::Closed => Self::Busy {
                pool_size: 0,
                waited_ms: 0,
            },
        }
    }
}

impl From<AppError> for AdmissionError {
    fn from(err: AppError) -> Self {
        Self::internal(err.to_string())
    }
}

impl From<AdmissionError> for AppError {
    fn from(err: AdmissionError) -> Self {
        let details = err.details();
        let message = err.to_string();
        let kind = match &err {
            AdmissionError::Busy { .. } | AdmissionError::DeadlockAborted { .. } => {
                ErrorKind::ServiceUnavailable
            }
            AdmissionError::Timeout { .. } => ErrorKind::Timeout,
            AdmissionError::Internal { .. } => ErrorKind::Internal,
            other => match other.class() {
                FailureClass::NotFound => ErrorKind::NotFound,
                _ => ErrorKind::Conflict,
            },
        };
        AppError::new(kind, message).with_details(details)
    }
}
