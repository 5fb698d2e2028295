//! # enrollhub-api
//!
//! HTTP API layer for EnrollHub built on Axum.
//!
//! Exposes enrollment, cancellation, ledger and resource queries, plus
//! operational endpoints for metrics and consistency checks.

pub mod app;
pub mod dto;
pub mod error;
pub mod handlers;
pub mod middleware;
pub mod router;
pub mod state;

pub use app::{build_app, run_server};
pub use error::ApiError;
pub use state::AppState;
