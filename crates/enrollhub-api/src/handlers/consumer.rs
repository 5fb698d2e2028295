//! Consumer-scoped query handlers.

use axum::Json;
use axum::extract::{Path, Query, State};

use enrollhub_core::error::AppError;
use enrollhub_core::types::{ConsumerId, TermKey};
use enrollhub_entity::allocation::Allocation;
use enrollhub_entity::ledger::LedgerEntry;

use crate::dto::request::AllocationQuery;
use crate::dto::response::ApiResponse;
use crate::error::ApiError;
use crate::state::AppState;

/// GET /api/consumers/{id}/allocations
pub async fn list_allocations(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Query(query): Query<AllocationQuery>,
) -> Result<Json<ApiResponse<Vec<Allocation>>>, ApiError> {
    let allocations = state
        .service
        .allocations(&ConsumerId::new(id), query.term)
        .await?;
    Ok(Json(ApiResponse::ok(allocations)))
}

/// GET /api/consumers/{id}/ledger/{term}
pub async fn get_ledger(
    State(state): State<AppState>,
    Path((id, term)): Path<(String, String)>,
) -> Result<Json<ApiResponse<LedgerEntry>>, ApiError> {
    let term: TermKey = term.parse().map_err(AppError::validation)?;
    Ok(Json(ApiResponse::ok(
        state.service.query_ledger(&ConsumerId::new(id), term),
    )))
}
