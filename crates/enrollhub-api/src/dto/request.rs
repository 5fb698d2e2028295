//! Request DTOs with validation.

use serde::{Deserialize, Serialize};
use validator::Validate;

use enrollhub_core::types::TermKey;

/// Enrollment request body.
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct EnrollRequest {
    /// Consumer to enroll.
    #[validate(length(min = 1, max = 64, message = "consumer_id is required"))]
    pub consumer_id: String,
    /// Resource to enroll in.
    pub resource_id: u64,
    /// Retry contention failures with backoff.
    #[serde(default)]
    pub retry: bool,
}

/// Query string for allocation listings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AllocationQuery {
    /// Restrict to one term, e.g. `2025-fall`.
    pub term: Option<TermKey>,
}
