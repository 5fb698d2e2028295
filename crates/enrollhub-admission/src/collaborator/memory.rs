//! In-process catalog and directory.

use async_trait::async_trait;
use dashmap::DashMap;

use enrollhub_core::result::AppResult;
use enrollhub_core::types::{ConsumerId, ResourceId};
use enrollhub_entity::consumer::{Consumer, Eligibility};
use enrollhub_entity::resource::CatalogResource;

use super::{CatalogService, ConsumerDirectory};

/// Catalog held in memory. Mutations take effect on the next read.
#[derive(Debug, Default)]
pub struct MemoryCatalog {
    resources: DashMap<ResourceId, CatalogResource>,
}

impl MemoryCatalog {
    /// Create an empty catalog.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a catalog holding `resources`.
    pub fn with_resources(resources: impl IntoIterator<Item = CatalogResource>) -> Self {
        let catalog = Self::new();
        for resource in resources {
            catalog.upsert(resource);
        }
        catalog
    }

    /// Insert or replace a resource.
    pub fn upsert(&self, resource: CatalogResource) {
        self.resources.insert(resource.id, resource);
    }

    /// Flip the canceled flag. Returns `false` if the resource is unknown.
    pub fn set_canceled(&self, id: ResourceId, canceled: bool) -> bool {
        match self.resources.get_mut(&id) {
            Some(mut resource) => {
                resource.canceled = canceled;
                true
            }
            None => false,
        }
    }

    /// Remove a resource from the catalog.
    pub fn remove(&self, id: ResourceId) -> Option<CatalogResource> {
        self.resources.remove(&id).map(|(_, r)| r)
    }

    /// Every resource, sorted by id.
    pub fn list(&self) -> Vec<CatalogResource> {
        let mut all: Vec<CatalogResource> =
            self.resources.iter().map(|r| r.value().clone()).collect();
        all.sort_by_key(|r| r.id);
        all
    }
}

#[async_trait]
impl CatalogService for MemoryCatalog {
    async fn get_resource(&self, id: ResourceId) -> AppResult<Option<CatalogResource>> {
        Ok(self.resources.get(&id).map(|r| r.clone()))
    }
}

/// Directory held in memory.
#[derive(Debug, Default)]
pub struct MemoryDirectory {
    consumers: DashMap<ConsumerId, Consumer>,
}

impl MemoryDirectory {
    /// Create an empty directory.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a directory holding `consumers`.
    pub fn with_consumers(consumers: impl IntoIterator<Item = Consumer>) -> Self {
        let directory = Self::new();
        for consumer in consumers {
            directory.upsert(consumer);
        }
        directory
    }

    /// Insert or replace a consumer.
    pub fn upsert(&self, consumer: Consumer) {
        self.consumers.insert(consumer.id.clone(), consumer);
    }

    /// Change eligibility. Returns `false` if the consumer is unknown.
    pub fn set_eligibility(&self, id: &ConsumerId, eligibility: Eligibility) -> bool {
        match self.consumers.get_mut(id) {
            Some(mut consumer) => {
                consumer.eligibility = eligibility;
                true
            }
            None => false,
        }
    }

    /// Every consumer, sorted by id.
    pub fn list(&self) -> Vec<Consumer> {
        let mut all: Vec<Consumer> = self.consumers.iter().map(|c| c.value().clone()).collect();
        all.sort_by(|a, b| a.id.cmp(&b.id));
        all
    }
}

#[async_trait]
impl ConsumerDirectory for MemoryDirectory {
    async fn get_consumer(&self, id: &ConsumerId) -> AppResult<Option<Consumer>> {
        Ok(self.consumers.get(id).map(|c| c.clone()))
    }
}
