//! Enrollment and cancellation handlers.

use axum::Json;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use validator::Validate;

use enrollhub_admission::{Admission, Cancellation};
use enrollhub_core::types::{AllocationId, ConsumerId, ResourceId};

use crate::dto::request::EnrollRequest;
use crate::dto::response::ApiResponse;
use crate::error::ApiError;
use crate::state::AppState;

/// POST /api/enrollments
pub async fn enroll(
    State(state): State<AppState>,
    Json(req): Json<EnrollRequest>,
) -> Result<(StatusCode, Json<ApiResponse<Admission>>), ApiError> {
    req.validate()?;
    let consumer_id = ConsumerId::new(req.consumer_id);
    let resource_id = ResourceId::new(req.resource_id);

    let admission = if req.retry {
        state.service.admit_with_retry(&consumer_id, resource_id).await?
    } else {
        state.service.admit(&consumer_id, resource_id).await?
    };
    Ok((StatusCode::CREATED, Json(ApiResponse::ok(admission))))
}

/// DELETE /api/enrollments/{id}
pub async fn cancel(
    State(state): State<AppState>,
    Path(id): Path<u64>,
) -> Result<Json<ApiResponse<Cancellation>>, ApiError> {
    let cancellation = state.service.cancel(AllocationId::new(id)).await?;
    Ok(Json(ApiResponse::ok(cancellation)))
}
