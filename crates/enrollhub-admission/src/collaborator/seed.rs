//! Seed data for the in-process collaborators.

use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::info;

use enrollhub_core::error::{AppError, ErrorKind};
use enrollhub_core::result::AppResult;
use enrollhub_entity::consumer::Consumer;
use enrollhub_entity::resource::CatalogResource;

use super::memory::{MemoryCatalog, MemoryDirectory};

/// Catalog resources and directory consumers loaded from a JSON file.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SeedData {
    /// Catalog resources.
    #[serde(default)]
    pub resources: Vec<CatalogResource>,
    /// Directory consumers.
    #[serde(default)]
    pub consumers: Vec<Consumer>,
}

impl SeedData {
    /// Parse a seed document.
    pub fn from_json(body: &str) -> AppResult<Self> {
        let seed: Self = serde_json::from_str(body)?;
        seed.validate()?;
        Ok(seed)
    }

    /// Read and parse a seed file.
    pub async fn load(path: impl AsRef<Path>) -> AppResult<Self> {
        let path = path.as_ref();
        let body = tokio::fs::read_to_string(path).await.map_err(|e| {
            AppError::with_source(
                ErrorKind::Configuration,
                format!("Cannot read seed file {}", path.display()),
                e,
            )
        })?;
        let seed = Self::from_json(&body)?;
        info!(
            path = %path.display(),
            resources = seed.resources.len(),
            consumers = seed.consumers.len(),
            "Seed data loaded"
        );
        Ok(seed)
    }

    /// Build in-process collaborators holding this data.
    pub fn into_collaborators(self) -> (MemoryCatalog, MemoryDirectory) {
        (
            MemoryCatalog::with_resources(self.resources),
            MemoryDirectory::with_consumers(self.consumers),
        )
    }

    fn validate(&self) -> AppResult<()> {
        let mut ids: Vec<_> = self.resources.iter().map(|r| r.id).collect();
        ids.sort();
        if let Some(pair) = ids.windows(2).find(|w| w[0] == w[1]) {
            return Err(AppError::validation(format!(
                "Duplicate resource {} in seed data",
                pair[0]
            )));
        }

        let mut consumers: Vec<_> = self.consumers.iter().map(|c| &c.id).collect();
        consumers.sort();
        if let Some(pair) = consumers.windows(2).find(|w| w[0] == w[1]) {
            return Err(AppError::validation(format!(
                "Duplicate consumer {} in seed data",
                pair[0]
            )));
        }
        Ok(())
    }
}
