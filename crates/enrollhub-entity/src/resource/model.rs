//! Resource entity model.

use serde::{Deserialize, Serialize};

use enrollhub_core::types::{Credits, ResourceId, TermKey};

/// A resource as published by the catalog (one offered course section).
///
/// The catalog owns everything here. Capacity bookkeeping is not part
/// of this view.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CatalogResource {
    /// Resource identifier.
    pub id: ResourceId,
    /// Maximum number of active allocations.
    pub capacity: u32,
    /// Credit weight charged against the consumer quota.
    pub credit_weight: Credits,
    /// Whether the offering has been withdrawn.
    #[serde(default)]
    pub canceled: bool,
    /// Term the resource belongs to.
    pub term: TermKey,
    /// Course code shared by every offering of the same course.
    #[serde(default)]
    pub course_code: Option<String>,
    /// Display title.
    #[serde(default)]
    pub title: Option<String>,
}

/// A resource row in the admission store.
///
/// Mirrors the catalog fields last observed plus the `held` count, which
/// only the admission core mutates.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Resource {
    /// Resource identifier.
    pub id: ResourceId,
    /// Maximum number of active allocations.
    pub capacity: u32,
    /// Seats currently counted against capacity.
    pub held: u32,
    /// Whether the offering has been withdrawn.
    pub canceled: bool,
    /// Credit weight charged against the consumer quota.
    pub credit_weight: Credits,
    /// Term the resource belongs to.
    pub term: TermKey,
}

impl Resource {
    /// Create a store row from a catalog record with nothing held.
    pub fn from_catalog(catalog: &CatalogResource) -> Self {
        Self {
            id: catalog.id,
            capacity: catalog.capacity,
            held: 0,
            canceled: catalog.canceled,
            credit_weight: catalog.credit_weight,
            term: catalog.term,
        }
    }

    /// Overwrite catalog-owned fields, keeping `held`.
    pub fn apply_catalog(&mut self, catalog: &CatalogResource) {
        self.capacity = catalog.capacity;
        self.canceled = catalog.canceled;
        self.credit_weight = catalog.credit_weight;
        self.term = catalog.term;
    }

    /// Whether no seat remains.
    pub fn is_full(&self) -> bool {
        self.held >= self.capacity
    }

    /// Seats still available.
    pub fn available(&self) -> u32 {
        self.capacity.saturating_sub(self.held)
    }

    /// Capacity view of this row.
    pub fn snapshot(&self) -> ResourceSnapshot {
        ResourceSnapshot {
            id: self.id,
            capacity: self.capacity,
            held: self.held,
            canceled: self.canceled,
        }
    }
}

/// Point-in-time capacity view of a resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceSnapshot {
    /// Resource identifier.
    pub id: ResourceId,
    /// Maximum number of active allocations.
    pub capacity: u32,
    /// Seats currently counted against capacity.
    pub held: u32,
    /// Whether the offering has been withdrawn.
    pub canceled: bool,
}

#[cfg(test)]
mod tests {
    use super::*;
    use enrollhub_core::types::Season;

    fn catalog(capacity: u32) -> CatalogResource {
        CatalogResource {
            id: ResourceId::new(1),
            capacity,
            credit_weight: Credits::from_hundredths(300),
            canceled: false,
            term: TermKey::new(2025, Season::Fall),
            course_code: Some("CS101".to_string()),
            title: None,
        }
    }

    #[test]
    fn test_apply_catalog_keeps_held() {
        let mut row = Resource::from_catalog(&catalog(30));
        row.held = 12;

        let mut updated = catalog(40);
        updated.canceled = true;
        row.apply_catalog(&updated);

        assert_eq!(row.held, 12);
        assert_eq!(row.capacity, 40);
        assert!(row.canceled);
        assert_eq!(row.available(), 28);
    }

    #[test]
    fn test_is_full() {
        let mut row = Resource::from_catalog(&catalog(1));
        assert!(!row.is_full());
        row.held = 1;
        assert!(row.is_full());
    }
}
