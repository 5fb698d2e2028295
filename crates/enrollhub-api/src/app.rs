//! Application builder: wires router, middleware and state into an Axum app.

use std::time::Duration;

use axum::Router;
use tokio::sync::watch;
use tower_http::trace::TraceLayer;

use enrollhub_admission::bootstrap::{build_service, persist_snapshot};
use enrollhub_admission::reconciler::ReconcilerService;
use enrollhub_core::config::{AppConfig, CorsConfig};
use enrollhub_core::error::AppError;

use crate::middleware::compression::build_compression_layer;
use crate::middleware::cors::build_cors_layer;
use crate::router::build_router;
use crate::state::AppState;

/// Builds the complete Axum application with all routes and middleware.
pub fn build_app(state: AppState, cors_config: &CorsConfig) -> Router {
    build_router(state)
        .layer(build_compression_layer())
        .layer(build_cors_layer(cors_config))
        .layer(TraceLayer::new_for_http())
}

/// Runs the EnrollHub server until a shutdown signal arrives.
pub async fn run_server(config: AppConfig) -> Result<(), AppError> {
    tracing::info!("Starting EnrollHub server...");

    // ── Step 1: Admission core ───────────────────────────────────
    let service = build_service(&config).await?;

    // ── Step 2: Background reconciler ────────────────────────────
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let reconciler_handle = if config.reconciler.enabled {
        let interval = Duration::from_secs(config.reconciler.interval_seconds.max(1));
        let reconciler = ReconcilerService::new(service.reconciler(), interval);
        let cancel = shutdown_rx.clone();
        Some(tokio::spawn(async move {
            reconciler.run(cancel).await;
        }))
    } else {
        None
    };

    // ── Step 3: HTTP server ──────────────────────────────────────
    let state = AppState::new(config.clone(), service.clone());
    let app = build_app(state, &config.server.cors);
    let addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .map_err(|e| AppError::internal(format!("Failed to bind {}: {}", addr, e)))?;

    tracing::info!("EnrollHub server listening on {}", addr);

    let server = axum::serve(listener, app).with_graceful_shutdown(async move {
        shutdown_signal().await;
        let _ = shutdown_tx.send(true);
    });

    let served = server
        .await
        .map_err(|e| AppError::internal(format!("Server error: {}", e)));

    // ── Step 4: Drain and persist ────────────────────────────────
    if let Some(handle) = reconciler_handle {
        if let Err(e) = handle.await {
            tracing::error!(error = %e, "Reconciler task failed");
        }
    }

    let drain = Duration::from_secs(config.lease_pool.drain_timeout_seconds);
    if !service.shutdown(drain).await {
        tracing::warn!(
            timeout_seconds = drain.as_secs(),
            "Transactions still running at shutdown"
        );
    }
    persist_snapshot(&service, &config).await?;

    tracing::info!("EnrollHub server stopped");
    served
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for Ctrl+C");
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received");
}
