//! Operational handlers: metrics, pool occupancy, consistency.

use axum::Json;
use axum::extract::State;

use enrollhub_admission::lease::LeasePoolStatus;
use enrollhub_admission::metrics::MetricsReport;
use enrollhub_admission::reconciler::ReconcileOutcome;

use crate::dto::response::{ApiResponse, ConsistencyResponse};
use crate::error::ApiError;
use crate::state::AppState;

/// GET /api/admin/metrics
pub async fn metrics(State(state): State<AppState>) -> Json<ApiResponse<MetricsReport>> {
    Json(ApiResponse::ok(state.service.metrics()))
}

/// GET /api/admin/lease-pool
pub async fn lease_pool(State(state): State<AppState>) -> Json<ApiResponse<LeasePoolStatus>> {
    Json(ApiResponse::ok(state.service.lease_status()))
}

/// GET /api/admin/consistency
pub async fn consistency(
    State(state): State<AppState>,
) -> Result<Json<ApiResponse<ConsistencyResponse>>, ApiError> {
    let report = state.service.verify().await?;
    Ok(Json(ApiResponse::ok(ConsistencyResponse {
        consistent: report.is_consistent(),
        report,
    })))
}

/// POST /api/admin/reconcile
pub async fn reconcile(
    State(state): State<AppState>,
) -> Result<Json<ApiResponse<ReconcileOutcome>>, ApiError> {
    let outcome = state.service.reconcile().await?;
    Ok(Json(ApiResponse::ok(outcome)))
}
