//! Resource table with capacity bookkeeping.

use dashmap::DashMap;
use tracing::warn;

use enrollhub_core::types::ResourceId;
use enrollhub_entity::resource::{CatalogResource, Resource, ResourceSnapshot};

use super::StoreError;

/// Resource rows keyed by id.
///
/// `held` is only changed by callers holding the resource's entity lock.
/// Each method touches one row atomically.
#[derive(Debug, Default)]
pub struct ResourceStore {
    resources: DashMap<ResourceId, Resource>,
}

impl ResourceStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Copy of one row.
    pub fn get(&self, id: ResourceId) -> Option<Resource> {
        self.resources.get(&id).map(|r| r.clone())
    }

    /// Capacity view of one row.
    pub fn snapshot(&self, id: ResourceId) -> Option<ResourceSnapshot> {
        self.resources.get(&id).map(|r| r.snapshot())
    }

    /// Upsert catalog-owned fields from a fresh catalog read, keeping
    /// `held`. Returns the updated row.
    pub fn refresh(&self, catalog: &CatalogResource) -> Resource {
        let mut row = self
            .resources
            .entry(catalog.id)
            .or_insert_with(|| Resource::from_catalog(catalog));
        row.apply_catalog(catalog);
        if row.held > row.capacity {
            warn!(
                resource_id = %row.id,
                held = row.held,
                capacity = row.capacity,
                "Catalog capacity below held count"
            );
        }
        row.clone()
    }

    /// Take one seat. Fails when the row is missing or already full.
    pub fn increment_held(&self, id: ResourceId) -> Result<ResourceSnapshot, StoreError> {
        let mut row = self
            .resources
            .get_mut(&id)
            .ok_or(StoreError::ResourceMissing { resource_id: id })?;
        if row.held >= row.capacity {
            return Err(StoreError::CapacityInvariant {
                resource_id: id,
                held: row.held,
                capacity: row.capacity,
            });
        }
        row.held += 1;
        Ok(row.snapshot())
    }

    /// Give back one seat. Fails when the row is missing or nothing is held.
    pub fn decrement_held(&self, id: ResourceId) -> Result<ResourceSnapshot, StoreError> {
        let mut row = self
            .resources
            .get_mut(&id)
            .ok_or(StoreError::ResourceMissing { resource_id: id })?;
        if row.held == 0 {
            return Err(StoreError::HeldUnderflow { resource_id: id });
        }
        row.held -= 1;
        Ok(row.snapshot())
    }

    /// All rows, sorted by id.
    pub fn all(&self) -> Vec<Resource> {
        let mut rows: Vec<Resource> = self.resources.iter().map(|r| r.value().clone()).collect();
        rows.sort_by_key(|r| r.id);
        rows
    }

    /// Replace the whole table. Only call while no transaction is running.
    pub fn restore(&self, rows: Vec<Resource>) {
        self.resources.clear();
        for row in rows {
            self.resources.insert(row.id, row);
        }
    }

    /// Number of rows.
    pub fn len(&self) -> usize {
        self.resources.len()
    }

    /// Whether the table is empty.
    pub fn is_empty(&self) -> bool {
        self.resources.is_empty()
    }
}
