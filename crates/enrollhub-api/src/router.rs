//! Route definitions for the EnrollHub HTTP API.
//!
//! All routes are mounted under `/api` and share `AppState`.

use axum::{
    Router, middleware as axum_middleware,
    routing::{delete, get, post},
};

use crate::handlers;
use crate::middleware;
use crate::state::AppState;

/// Build the router with every route and the request logger.
pub fn build_router(state: AppState) -> Router {
    let api_routes = Router::new()
        .merge(enrollment_routes())
        .merge(consumer_routes())
        .merge(resource_routes())
        .merge(admin_routes())
        .route("/health", get(handlers::health::health));

    Router::new()
        .nest("/api", api_routes)
        .layer(axum_middleware::from_fn(middleware::logging::request_logging))
        .with_state(state)
}

fn enrollment_routes() -> Router<AppState> {
    Router::new()
        .route("/enrollments", post(handlers::enrollment::enroll))
        .route("/enrollments/{id}", delete(handlers::enrollment::cancel))
}

fn consumer_routes() -> Router<AppState> {
    Router::new()
        .route(
            "/consumers/{id}/allocations",
            get(handlers::consumer::list_allocations),
        )
        .route(
            "/consumers/{id}/ledger/{term}",
            get(handlers::consumer::get_ledger),
        )
}

fn resource_routes() -> Router<AppState> {
    Router::new().route("/resources/{id}", get(handlers::resource::get_resource))
}

fn admin_routes() -> Router<AppState> {
    Router::new()
        .route("/admin/metrics", get(handlers::admin::metrics))
        .route("/admin/lease-pool", get(handlers::admin::lease_pool))
        .route("/admin/consistency", get(handlers::admin::consistency))
        .route("/admin/reconcile", post(handlers::admin::reconcile))
}
