//! External-facing admission service.

use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::{debug, info};

use enrollhub_core::config::AppConfig;
use enrollhub_core::result::AppResult;
use enrollhub_core::types::{AllocationId, ConsumerId, ResourceId, TermKey};
use enrollhub_entity::allocation::Allocation;
use enrollhub_entity::ledger::LedgerEntry;
use enrollhub_entity::resource::ResourceSnapshot;

use crate::cancel::{Cancellation, CancellationHandler};
use crate::collaborator::{CatalogService, ConsumerDirectory};
use crate::context::{AdmissionContext, AdmissionSettings};
use crate::error::AdmissionError;
use crate::lease::{LeasePool, LeasePoolStatus};
use crate::ledger::LedgerIndex;
use crate::lock::LockManager;
use crate::metrics::{AdmissionMetrics, MetricsReport};
use crate::reconciler::{ConsistencyReport, LedgerReconciler, ReconcileOutcome};
use crate::retry::RetryPolicy;
use crate::store::{AllocationRepository, MemoryAllocationRepository, ResourceStore, StoreSnapshot};
use crate::transaction::{Admission, AdmissionTransaction};

/// Enrollment, cancellation, and query operations over one admission core.
///
/// Cloning is cheap; clones share all state.
#[derive(Debug, Clone)]
pub struct AdmissionService {
    ctx: AdmissionContext,
    retry: RetryPolicy,
}

impl AdmissionService {
    /// Build a service over the given collaborators and allocation table.
    pub fn new(
        config: &AppConfig,
        catalog: Arc<dyn CatalogService>,
        directory: Arc<dyn ConsumerDirectory>,
        allocations: Arc<dyn AllocationRepository>,
    ) -> AppResult<Self> {
        let settings = AdmissionSettings::from_config(config)?;
        let ctx = AdmissionContext {
            resources: Arc::new(ResourceStore::new()),
            allocations,
            ledger: Arc::new(LedgerIndex::new()),
            locks: LockManager::new(config.admission.lock_policy),
            leases: LeasePool::new(config.lease_pool.size),
            catalog,
            directory,
            settings,
            metrics: Arc::new(AdmissionMetrics::new()),
        };

        info!(
            lock_policy = %config.admission.lock_policy,
            canceled_resource_policy = %config.admission.canceled_resource_policy,
            lease_pool_size = config.lease_pool.size,
            "Admission service initialized"
        );

        Ok(Self {
            ctx,
            retry: RetryPolicy::from(&config.retry),
        })
    }

    /// Build a service backed by an in-memory allocation table.
    pub fn with_memory_store(
        config: &AppConfig,
        catalog: Arc<dyn CatalogService>,
        directory: Arc<dyn ConsumerDirectory>,
    ) -> AppResult<Self> {
        Self::new(
            config,
            catalog,
            directory,
            Arc::new(MemoryAllocationRepository::new()),
        )
    }

    /// Admit `consumer_id` to `resource_id`. Makes exactly one attempt.
    ///
    /// The transaction runs on its own task, so once started it commits or
    /// rolls back even if the caller stops waiting for the result.
    pub async fn admit(
        &self,
        consumer_id: &ConsumerId,
        resource_id: ResourceId,
    ) -> Result<Admission, AdmissionError> {
        let ctx = self.ctx.clone();
        let consumer_id = consumer_id.clone();
        let task = tokio::spawn(async move {
            let started = Instant::now();
            let result = AdmissionTransaction::new(&ctx)
                .admit(&consumer_id, resource_id)
                .await;
            ctx.metrics
                .record_admission(result.as_ref().map(|_| ()), started.elapsed());
            result
        });
        task.await.unwrap_or_else(|e| {
            Err(AdmissionError::internal(format!(
                "Admission task failed: {e}"
            )))
        })
    }

    /// Admit, retrying contention failures with exponential backoff.
    ///
    /// A retry after a lost success reports `DuplicateAllocation`.
    pub async fn admit_with_retry(
        &self,
        consumer_id: &ConsumerId,
        resource_id: ResourceId,
    ) -> Result<Admission, AdmissionError> {
        let mut attempt: u32 = 0;
        loop {
            match self.admit(consumer_id, resource_id).await {
                Err(e) if e.is_retryable() && !self.retry.is_exhausted(attempt + 1) => {
                    let delay = self.retry.backoff_delay(attempt);
                    debug!(
                        consumer_id = %consumer_id,
                        resource_id = %resource_id,
                        attempt = attempt + 1,
                        delay_ms = delay.as_millis() as u64,
                        reason = e.code(),
                        "Retrying admission"
                    );
                    self.ctx.metrics.record_retry();
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                other => return other,
            }
        }
    }

    /// Cancel an active allocation.
    ///
    /// Runs on its own task, like [`AdmissionService::admit`].
    pub async fn cancel(&self, allocation_id: AllocationId) -> Result<Cancellation, AdmissionError> {
        let ctx = self.ctx.clone();
        let task = tokio::spawn(async move {
            let result = CancellationHandler::new(&ctx).cancel(allocation_id).await;
            ctx.metrics.record_cancellation(result.as_ref().map(|_| ()));
            result
        });
        task.await.unwrap_or_else(|e| {
            Err(AdmissionError::internal(format!(
                "Cancellation task failed: {e}"
            )))
        })
    }

    /// Credits `consumer_id` holds in `term`.
    pub fn query_ledger(&self, consumer_id: &ConsumerId, term: TermKey) -> LedgerEntry {
        self.ctx.ledger.entry(consumer_id, term)
    }

    /// Capacity view of a resource.
    ///
    /// Resources the store has not seen yet are reported from the catalog
    /// with nothing held.
    pub async fn query_resource(&self, resource_id: ResourceId) -> Result<ResourceSnapshot, AdmissionError> {
        if let Some(snapshot) = self.ctx.resources.snapshot(resource_id) {
            return Ok(snapshot);
        }
        match self.ctx.catalog.get_resource(resource_id).await? {
            Some(catalog) => Ok(ResourceSnapshot {
                id: catalog.id,
                capacity: catalog.capacity,
                held: 0,
                canceled: catalog.canceled,
            }),
            None => Err(AdmissionError::ResourceNotFound { resource_id }),
        }
    }

    /// Allocations of a consumer, optionally restricted to one term.
    pub async fn allocations(
        &self,
        consumer_id: &ConsumerId,
        term: Option<TermKey>,
    ) -> Result<Vec<Allocation>, AdmissionError> {
        let mut found = self.ctx.allocations.find_by_consumer(consumer_id).await?;
        if let Some(term) = term {
            found.retain(|a| a.term == term);
        }
        Ok(found)
    }

    /// Reconciler over this service's state.
    pub fn reconciler(&self) -> LedgerReconciler {
        LedgerReconciler::new(self.ctx.clone())
    }

    /// Consistency audit.
    pub async fn verify(&self) -> AppResult<ConsistencyReport> {
        self.reconciler().verify().await
    }

    /// Repair ledger drift.
    pub async fn reconcile(&self) -> AppResult<ReconcileOutcome> {
        self.reconciler().reconcile().await
    }

    /// Rebuild the ledger from allocation history.
    pub async fn recover(&self) -> AppResult<ConsistencyReport> {
        self.reconciler().startup_recovery().await
    }

    /// Outcome counters, lock contention, and pool occupancy.
    pub fn metrics(&self) -> MetricsReport {
        MetricsReport {
            admission: self.ctx.metrics.snapshot(),
            locks: self.ctx.locks.metrics(),
            lease_pool: self.ctx.leases.status(),
        }
    }

    /// Lease pool occupancy.
    pub fn lease_status(&self) -> LeasePoolStatus {
        self.ctx.leases.status()
    }

    /// The lease pool.
    pub fn lease_pool(&self) -> &LeasePool {
        &self.ctx.leases
    }

    /// The lock manager.
    pub fn lock_manager(&self) -> &LockManager {
        &self.ctx.locks
    }

    /// Shared components.
    pub fn context(&self) -> &AdmissionContext {
        &self.ctx
    }

    /// Capture resource rows and allocations.
    pub async fn snapshot(&self) -> AppResult<StoreSnapshot> {
        Ok(StoreSnapshot::new(
            self.ctx.resources.all(),
            self.ctx.allocations.all().await?,
        ))
    }

    /// Replace resource rows and allocations, then rebuild the ledger.
    ///
    /// Only call before the service starts taking requests.
    pub async fn restore(&self, snapshot: StoreSnapshot) -> AppResult<ConsistencyReport> {
        info!(
            resources = snapshot.resources.len(),
            allocations = snapshot.allocations.len(),
            saved_at = %snapshot.saved_at,
            "Restoring store snapshot"
        );
        self.ctx.resources.restore(snapshot.resources);
        self.ctx.allocations.restore(snapshot.allocations).await?;
        self.recover().await
    }

    /// Stop accepting transactions and wait for in-flight ones.
    ///
    /// Returns `false` if some were still running after `timeout`.
    pub async fn shutdown(&self, timeout: Duration) -> bool {
        self.ctx.leases.close();
        let drained = self.ctx.leases.drain(timeout).await;
        info!(drained = drained, "Admission service stopped");
        drained
    }
}
