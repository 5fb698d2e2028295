//! Allocatable resource entities.

pub mod model;

pub use model::{CatalogResource, Resource, ResourceSnapshot};
