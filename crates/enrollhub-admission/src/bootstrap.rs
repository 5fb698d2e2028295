//! Service assembly from configuration.

use std::sync::Arc;

use tracing::info;

use enrollhub_core::config::AppConfig;
use enrollhub_core::result::AppResult;

use crate::collaborator::SeedData;
use crate::service::AdmissionService;
use crate::store::StoreSnapshot;

/// Build a service with in-memory collaborators and allocation table.
///
/// Collaborators are filled from the configured seed file. State is
/// restored from the configured snapshot when one exists; the ledger is
/// rebuilt from allocations either way.
pub async fn build_service(config: &AppConfig) -> AppResult<AdmissionService> {
    let seed = match &config.store.seed_path {
        Some(path) => SeedData::load(path).await?,
        None => {
            info!("No seed file configured, starting with empty collaborators");
            SeedData::default()
        }
    };
    let (catalog, directory) = seed.into_collaborators();
    let service = AdmissionService::with_memory_store(config, Arc::new(catalog), Arc::new(directory))?;

    let snapshot = match &config.store.snapshot_path {
        Some(path) => StoreSnapshot::load(path).await?,
        None => None,
    };
    match snapshot {
        Some(snapshot) => {
            service.restore(snapshot).await?;
        }
        None => {
            service.recover().await?;
        }
    }

    Ok(service)
}

/// Write the service state to the configured snapshot path, if any.
pub async fn persist_snapshot(service: &AdmissionService, config: &AppConfig) -> AppResult<()> {
    if let Some(path) = &config.store.snapshot_path {
        service.snapshot().await?.save(path).await?;
    }
    Ok(())
}
