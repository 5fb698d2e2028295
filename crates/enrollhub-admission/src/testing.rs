//! Shared fixtures for unit tests.

use std::sync::Arc;

use enrollhub_core::config::AppConfig;
use enrollhub_core::types::{Credits, ResourceId, Season, TermKey};
use enrollhub_entity::consumer::Consumer;
use enrollhub_entity::resource::CatalogResource;

use crate::collaborator::{MemoryCatalog, MemoryDirectory};
use crate::service::AdmissionService;

pub(crate) struct Fixture {
    pub service: AdmissionService,
    pub catalog: Arc<MemoryCatalog>,
    pub directory: Arc<MemoryDirectory>,
}

pub(crate) fn term() -> TermKey {
    TermKey::new(2025, Season::Fall)
}

pub(crate) fn credits(value: f64) -> Credits {
    Credits::from_f64(value).expect("credits")
}

pub(crate) fn resource(id: u64, capacity: u32, weight: f64) -> CatalogResource {
    CatalogResource {
        id: ResourceId::new(id),
        capacity,
        credit_weight: credits(weight),
        canceled: false,
        term: term(),
        course_code: None,
        title: None,
    }
}

pub(crate) fn fixture_with(
    config: AppConfig,
    resources: Vec<CatalogResource>,
    consumers: Vec<Consumer>,
) -> Fixture {
    let catalog = Arc::new(MemoryCatalog::with_resources(resources));
    let directory = Arc::new(MemoryDirectory::with_consumers(consumers));
    let service = AdmissionService::with_memory_store(&config, catalog.clone(), directory.clone())
        .expect("service");
    Fixture {
        service,
        catalog,
        directory,
    }
}

pub(crate) fn fixture(resources: Vec<CatalogResource>, consumers: Vec<Consumer>) -> Fixture {
    fixture_with(AppConfig::default(), resources, consumers)
}
