//! Resource query handlers.

use axum::Json;
use axum::extract::{Path, State};

use enrollhub_core::types::ResourceId;
use enrollhub_entity::resource::ResourceSnapshot;

use crate::dto::response::ApiResponse;
use crate::error::ApiError;
use crate::state::AppState;

/// GET /api/resources/{id}
pub async fn get_resource(
    State(state): State<AppState>,
    Path(id): Path<u64>,
) -> Result<Json<ApiResponse<ResourceSnapshot>>, ApiError> {
    let snapshot = state.service.query_resource(ResourceId::new(id)).await?;
    Ok(Json(ApiResponse::ok(snapshot)))
}
