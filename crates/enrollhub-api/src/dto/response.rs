//! Response DTOs.

use serde::{Deserialize, Serialize};

use enrollhub_admission::lease::LeasePoolStatus;
use enrollhub_admission::reconciler::ConsistencyReport;

/// Standard success response wrapper.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiResponse<T: Serialize> {
    /// Whether the request was successful.
    pub success: bool,
    /// Response data.
    pub data: T,
}

impl<T: Serialize> ApiResponse<T> {
    /// Creates a successful response.
    pub fn ok(data: T) -> Self {
        Self {
            success: true,
            data,
        }
    }
}

/// Health check response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    /// Status.
    pub status: String,
    /// Version.
    pub version: String,
    /// Uptime.
    pub uptime_seconds: u64,
    /// Lease pool occupancy.
    pub lease_pool: LeasePoolStatus,
}

/// Consistency audit response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConsistencyResponse {
    /// Whether every invariant holds.
    pub consistent: bool,
    /// Findings.
    pub report: ConsistencyReport,
}
