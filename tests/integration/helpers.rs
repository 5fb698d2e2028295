//! Shared test helpers for integration tests.

#![allow(dead_code)]

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use axum::Router;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use chrono::{DateTime, Utc};
use serde_json::Value;
use tower::ServiceExt;

use enrollhub_admission::AdmissionService;
use enrollhub_admission::collaborator::{MemoryCatalog, MemoryDirectory};
use enrollhub_admission::store::{AllocationRepository, MemoryAllocationRepository};
use enrollhub_api::{AppState, build_app};
use enrollhub_core::config::AppConfig;
use enrollhub_core::error::AppError;
use enrollhub_core::result::AppResult;
use enrollhub_core::types::{AllocationId, ConsumerId, Credits, ResourceId, Season, TermKey};
use enrollhub_entity::allocation::{Allocation, NewAllocation};
use enrollhub_entity::consumer::Consumer;
use enrollhub_entity::resource::CatalogResource;

/// Term every fixture resource belongs to.
pub fn term() -> TermKey {
    TermKey::new(2025, Season::Fall)
}

/// Credits from a decimal literal.
pub fn credits(value: f64) -> Credits {
    Credits::from_f64(value).expect("credits")
}

/// An open catalog resource in [`term`].
pub fn resource(id: u64, capacity: u32, weight: f64) -> CatalogResource {
    CatalogResource {
        id: ResourceId::new(id),
        capacity,
        credit_weight: credits(weight),
        canceled: false,
        term: term(),
        course_code: Some(format!("C{id}")),
        title: None,
    }
}

/// `count` eligible consumers named `{prefix}{i}`.
pub fn consumers(prefix: &str, count: usize) -> Vec<Consumer> {
    (1..=count)
        .map(|i| Consumer::eligible(format!("{prefix}{i}")))
        .collect()
}

/// Admission core with handles on its collaborators.
pub struct TestCore {
    /// The service under test
    pub service: AdmissionService,
    /// Catalog backing the service
    pub catalog: Arc<MemoryCatalog>,
    /// Directory backing the service
    pub directory: Arc<MemoryDirectory>,
    /// Configuration the service was built from
    pub config: AppConfig,
}

impl TestCore {
    /// Build a core over an in-memory allocation table.
    pub fn new(config: AppConfig, resources: Vec<CatalogResource>, consumers: Vec<Consumer>) -> Self {
        Self::with_repository(
            config,
            resources,
            consumers,
            Arc::new(MemoryAllocationRepository::new()),
        )
    }

    /// Build a core with default configuration.
    pub fn with_defaults(resources: Vec<CatalogResource>, consumers: Vec<Consumer>) -> Self {
        Self::new(AppConfig::default(), resources, consumers)
    }

    /// Build a core over a caller-supplied allocation table.
    pub fn with_repository(
        config: AppConfig,
        resources: Vec<CatalogResource>,
        consumers: Vec<Consumer>,
        allocations: Arc<dyn AllocationRepository>,
    ) -> Self {
        let catalog = Arc::new(MemoryCatalog::with_resources(resources));
        let directory = Arc::new(MemoryDirectory::with_consumers(consumers));
        let service = AdmissionService::new(&config, catalog.clone(), directory.clone(), allocations)
            .expect("Failed to build admission service");
        Self {
            service,
            catalog,
            directory,
            config,
        }
    }

    /// Held count of a resource.
    pub async fn held(&self, id: u64) -> u32 {
        self.service
            .query_resource(ResourceId::new(id))
            .await
            .expect("resource")
            .held
    }

    /// Ledger credits of a consumer in [`term`].
    pub fn ledger(&self, consumer: &str) -> Credits {
        self.service
            .query_ledger(&ConsumerId::new(consumer), term())
            .credits
    }

    /// Assert every invariant holds.
    pub async fn assert_consistent(&self) {
        let report = self.service.verify().await.expect("verify");
        assert!(report.is_consistent(), "inconsistent state: {report:?}");
    }
}

/// Allocation table whose inserts can be made to fail or to stall.
#[derive(Debug, Default)]
pub struct FlakyAllocationRepository {
    inner: MemoryAllocationRepository,
    fail_inserts: AtomicBool,
    insert_delay_ms: AtomicU64,
}

impl FlakyAllocationRepository {
    /// Make subsequent inserts fail or succeed.
    pub fn fail_inserts(&self, fail: bool) {
        self.fail_inserts.store(fail, Ordering::SeqCst);
    }

    /// Make subsequent inserts pause for `delay` after the row is written.
    pub fn delay_inserts(&self, delay: Duration) {
        self.insert_delay_ms
            .store(delay.as_millis() as u64, Ordering::SeqCst);
    }
}

#[async_trait]
impl AllocationRepository for FlakyAllocationRepository {
    async fn insert(&self, new: NewAllocation) -> AppResult<Allocation> {
        if self.fail_inserts.load(Ordering::SeqCst) {
            return Err(AppError::storage("allocation table unavailable"));
        }
        let allocation = self.inner.insert(new).await?;
        let delay = self.insert_delay_ms.load(Ordering::SeqCst);
        if delay > 0 {
            tokio::time::sleep(Duration::from_millis(delay)).await;
        }
        Ok(allocation)
    }

    async fn remove(&self, id: AllocationId) -> AppResult<()> {
        self.inner.remove(id).await
    }

    async fn find_by_id(&self, id: AllocationId) -> AppResult<Option<Allocation>> {
        self.inner.find_by_id(id).await
    }

    async fn find_active(
        &self,
        consumer_id: &ConsumerId,
        resource_id: ResourceId,
    ) -> AppResult<Option<Allocation>> {
        self.inner.find_active(consumer_id, resource_id).await
    }

    async fn find_by_consumer(&self, consumer_id: &ConsumerId) -> AppResult<Vec<Allocation>> {
        self.inner.find_by_consumer(consumer_id).await
    }

    async fn mark_cancelled(&self, id: AllocationId, at: DateTime<Utc>) -> AppResult<Allocation> {
        self.inner.mark_cancelled(id, at).await
    }

    async fn all(&self) -> AppResult<Vec<Allocation>> {
        self.inner.all().await
    }

    async fn restore(&self, allocations: Vec<Allocation>) -> AppResult<()> {
        self.inner.restore(allocations).await
    }
}

/// Test application context
pub struct TestApp {
    /// The Axum router for making test requests
    pub router: Router,
    /// Core behind the router
    pub core: TestCore,
}

impl TestApp {
    /// Create a test application over the given collaborators.
    pub fn new(resources: Vec<CatalogResource>, consumers: Vec<Consumer>) -> Self {
        let core = TestCore::with_defaults(resources, consumers);
        let state = AppState::new(core.config.clone(), core.service.clone());
        let router = build_app(state, &core.config.server.cors);
        Self { router, core }
    }

    /// Send a request through the router.
    pub async fn request(&self, method: &str, path: &str, body: Option<Value>) -> TestResponse {
        let body_str = body
            .map(|b| serde_json::to_string(&b).expect("Failed to serialize body"))
            .unwrap_or_default();

        let req = Request::builder()
            .method(method)
            .uri(path)
            .header("Content-Type", "application/json")
            .body(Body::from(body_str))
            .expect("Failed to build request");

        let response = self
            .router
            .clone()
            .oneshot(req)
            .await
            .expect("Failed to send request");

        let status = response.status();
        let body_bytes = axum::body::to_bytes(response.into_body(), 1024 * 1024)
            .await
            .expect("Failed to read body");

        let body: Value = serde_json::from_slice(&body_bytes).unwrap_or(Value::Null);

        TestResponse { status, body }
    }
}

/// Test response wrapper
#[derive(Debug)]
pub struct TestResponse {
    /// HTTP status code
    pub status: StatusCode,
    /// Parsed JSON body
    pub body: Value,
}
