//! Application configuration schemas.
//!
//! All configuration structs are deserialized from TOML files via the
//! `config` crate. Each sub-module represents a logical configuration
//! section.

pub mod admission;
pub mod app;
pub mod lease;
pub mod logging;
pub mod store;

use serde::{Deserialize, Serialize};
use validator::Validate;

pub use self::admission::{
    AdmissionConfig, CanceledResourcePolicy, LockPolicy, QuotaConfig, ReconcilerConfig,
    RetryConfig,
};
pub use self::app::{CorsConfig, ServerConfig};
pub use self::lease::LeasePoolConfig;
pub use self::logging::LoggingConfig;
pub use self::store::StoreConfig;

use crate::error::AppError;

/// Root application configuration.
///
/// This struct is the top-level deserialization target for the merged
/// TOML configuration files (default.toml + environment overlay).
#[derive(Debug, Clone, Default, Serialize, Deserialize, Validate)]
pub struct AppConfig {
    /// HTTP server settings.
    #[serde(default)]
    pub server: ServerConfig,
    /// Admission transaction settings.
    #[serde(default)]
    #[validate(nested)]
    pub admission: AdmissionConfig,
    /// Execution slot pool settings.
    #[serde(default)]
    #[validate(nested)]
    pub lease_pool: LeasePoolConfig,
    /// Retry settings for contention failures.
    #[serde(default)]
    #[validate(nested)]
    pub retry: RetryConfig,
    /// Background ledger reconciliation settings.
    #[serde(default)]
    pub reconciler: ReconcilerConfig,
    /// Seed and snapshot file locations.
    #[serde(default)]
    pub store: StoreConfig,
    /// Logging settings.
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl AppConfig {
    /// Load configuration from TOML files.
    ///
    /// Merges the default configuration with an environment-specific overlay
    /// and environment variables prefixed with `ENROLLHUB__`.
    pub fn load(env: &str) -> Result<Self, AppError> {
        Self::load_from("config/default", env)
    }

    /// Load configuration starting from an explicit base file.
    pub fn load_from(base: &str, env: &str) -> Result<Self, AppError> {
        let config = config::Config::builder()
            .add_source(config::File::with_name(base).required(false))
            .add_source(config::File::with_name(&format!("config/{env}")).required(false))
            .add_source(
                config::Environment::with_prefix("ENROLLHUB")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .map_err(|e| AppError::configuration(format!("Failed to build config: {e}")))?;

        let loaded: Self = config
            .try_deserialize()
            .map_err(|e| AppError::configuration(format!("Failed to deserialize config: {e}")))?;

        loaded.validate()?;
        Ok(loaded)
    }
}
