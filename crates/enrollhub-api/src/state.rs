//! Application state shared across all handlers and middleware.

use std::sync::Arc;
use std::time::Instant;

use enrollhub_admission::AdmissionService;
use enrollhub_core::config::AppConfig;

/// Application state passed to every handler via `State<AppState>`.
#[derive(Debug, Clone)]
pub struct AppState {
    /// Application configuration
    pub config: Arc<AppConfig>,
    /// Admission core
    pub service: AdmissionService,
    /// Process start, for uptime reporting
    pub started_at: Instant,
}

impl AppState {
    /// Create state around a built service.
    pub fn new(config: AppConfig, service: AdmissionService) -> Self {
        Self {
            config: Arc::new(config),
            service,
            started_at: Instant::now(),
        }
    }
}
