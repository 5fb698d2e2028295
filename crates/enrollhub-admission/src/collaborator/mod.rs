//! External collaborators consulted during admission.
//!
//! The catalog owns resource definitions and the directory owns consumer
//! records. Both are read fresh inside every transaction.

pub mod memory;
pub mod seed;

use async_trait::async_trait;

use enrollhub_core::result::AppResult;
use enrollhub_core::types::{ConsumerId, ResourceId};
use enrollhub_entity::consumer::Consumer;
use enrollhub_entity::resource::CatalogResource;

pub use memory::{MemoryCatalog, MemoryDirectory};
pub use seed::SeedData;

/// Source of truth for resource definitions.
#[async_trait]
pub trait CatalogService: Send + Sync + 'static {
    /// Current catalog record for `id`, if the resource exists.
    async fn get_resource(&self, id: ResourceId) -> AppResult<Option<CatalogResource>>;
}

/// Source of truth for consumer records.
#[async_trait]
pub trait ConsumerDirectory: Send + Sync + 'static {
    /// Current record for `id`, if the consumer exists.
    async fn get_consumer(&self, id: &ConsumerId) -> AppResult<Option<Consumer>>;
}
