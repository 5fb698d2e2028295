//! Consistency audit and ledger reconciliation.
//!
//! Detects and corrects drift between the cached ledger and the
//! allocation table. Held-count drift is reported but never repaired.

use std::collections::HashMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use tracing::{error, info, warn};

use enrollhub_core::result::AppResult;
use enrollhub_core::types::{ConsumerId, Credits, ResourceId};
use enrollhub_entity::resource::ResourceSnapshot;

use crate::context::AdmissionContext;
use crate::ledger::{LedgerDrift, LedgerIndex};
use crate::lock::LockKey;

/// A resource whose held count differs from its active allocations.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HeldDrift {
    /// Resource identifier.
    pub resource_id: ResourceId,
    /// Held count in the store.
    pub held: u32,
    /// Active allocations on the resource.
    pub active: u32,
}

/// A consumer holding more than one active allocation on a resource.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DuplicateActive {
    /// Consumer identifier.
    pub consumer_id: ConsumerId,
    /// Resource identifier.
    pub resource_id: ResourceId,
    /// Number of active allocations found.
    pub count: u32,
}

/// Result of a consistency audit.
///
/// Taken without locks, so a transaction in flight may show up as drift.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConsistencyReport {
    /// Ledger entries that differ from the allocation table.
    pub ledger_drift: Vec<LedgerDrift>,
    /// Non-canceled resources whose held count differs from active allocations.
    pub held_drift: Vec<HeldDrift>,
    /// Resources holding more seats than their capacity.
    pub over_capacity: Vec<ResourceSnapshot>,
    /// Consumer and resource pairs with more than one active allocation.
    pub duplicate_active: Vec<DuplicateActive>,
}

impl ConsistencyReport {
    /// Whether nothing was found.
    pub fn is_consistent(&self) -> bool {
        self.ledger_drift.is_empty()
            && self.held_drift.is_empty()
            && self.over_capacity.is_empty()
            && self.duplicate_active.is_empty()
    }
}

/// Result of one reconciliation pass.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReconcileOutcome {
    /// Whether any ledger drift was observed.
    pub drift_detected: bool,
    /// Ledger entries that were rewritten.
    pub corrected: Vec<LedgerDrift>,
    /// Audit taken before corrections.
    pub report: ConsistencyReport,
}

/// Audits state and repairs the ledger.
#[derive(Debug, Clone)]
pub struct LedgerReconciler {
    ctx: AdmissionContext,
}

impl LedgerReconciler {
    /// Create a reconciler over `ctx`.
    pub fn new(ctx: AdmissionContext) -> Self {
        Self { ctx }
    }

    /// Audit every invariant the admission core maintains.
    pub async fn verify(&self) -> AppResult<ConsistencyReport> {
        let allocations = self.ctx.allocations.all().await?;

        let mut active_per_resource: HashMap<ResourceId, u32> = HashMap::new();
        let mut active_per_pair: HashMap<(ConsumerId, ResourceId), u32> = HashMap::new();
        for allocation in allocations.iter().filter(|a| a.is_active()) {
            *active_per_resource.entry(allocation.resource_id).or_insert(0) += 1;
            *active_per_pair
                .entry((allocation.consumer_id.clone(), allocation.resource_id))
                .or_insert(0) += 1;
        }

        let mut report = ConsistencyReport {
            ledger_drift: self.ctx.ledger.verify(&allocations),
            ..ConsistencyReport::default()
        };

        for row in self.ctx.resources.all() {
            if row.held > row.capacity {
                report.over_capacity.push(row.snapshot());
            }
            let active = active_per_resource.get(&row.id).copied().unwrap_or(0);
            if !row.canceled && row.held != active {
                report.held_drift.push(HeldDrift {
                    resource_id: row.id,
                    held: row.held,
                    active,
                });
            }
        }

        let mut duplicates: Vec<DuplicateActive> = active_per_pair
            .into_iter()
            .filter(|(_, count)| *count > 1)
            .map(|((consumer_id, resource_id), count)| DuplicateActive {
                consumer_id,
                resource_id,
                count,
            })
            .collect();
        duplicates.sort_by(|a, b| (&a.consumer_id, a.resource_id).cmp(&(&b.consumer_id, b.resource_id)));
        report.duplicate_active = duplicates;

        Ok(report)
    }

    /// Audit, then rewrite every drifted ledger entry.
    ///
    /// Each entry is recomputed under its consumer's lock, so a drift
    /// observed only because a transaction was mid-commit is left alone.
    pub async fn reconcile(&self) -> AppResult<ReconcileOutcome> {
        let report = self.verify().await?;
        let drift_detected = !report.ledger_drift.is_empty();

        if !report.held_drift.is_empty() || !report.over_capacity.is_empty() {
            warn!(
                held_drift = report.held_drift.len(),
                over_capacity = report.over_capacity.len(),
                "Resource held counts disagree with allocations"
            );
        }

        let mut corrected = Vec::new();
        for drift in &report.ledger_drift {
            let _lock = match self
                .ctx
                .locks
                .acquire(
                    LockKey::consumer(&drift.consumer_id),
                    self.ctx.settings.lock_timeout,
                )
                .await
            {
                Ok(lock) => lock,
                Err(e) => {
                    warn!(consumer_id = %drift.consumer_id, error = %e, "Skipping ledger entry, consumer busy");
                    continue;
                }
            };

            let held = self.ctx.allocations.find_by_consumer(&drift.consumer_id).await?;
            let expected = LedgerIndex::compute(&held)
                .get(&(drift.consumer_id.clone(), drift.term))
                .copied()
                .unwrap_or(Credits::ZERO);
            let cached = self.ctx.ledger.get(&drift.consumer_id, drift.term);
            if cached != expected {
                warn!(
                    consumer_id = %drift.consumer_id,
                    term = %drift.term,
                    cached = %cached,
                    expected = %expected,
                    "Ledger drift detected, correcting"
                );
                self.ctx.ledger.set(&drift.consumer_id, drift.term, expected);
                corrected.push(LedgerDrift {
                    consumer_id: drift.consumer_id.clone(),
                    term: drift.term,
                    cached,
                    expected,
                });
            }
        }

        if !corrected.is_empty() {
            info!(corrected = corrected.len(), "Ledger reconciliation completed");
        }

        Ok(ReconcileOutcome {
            drift_detected,
            corrected,
            report,
        })
    }

    /// Rebuild the ledger from the allocation table and audit the result.
    ///
    /// Call once at startup, before any transaction runs.
    pub async fn startup_recovery(&self) -> AppResult<ConsistencyReport> {
        info!("Running startup ledger recovery");

        let allocations = self.ctx.allocations.all().await?;
        self.ctx.ledger.rebuild(&allocations);

        let report = self.verify().await?;
        if report.is_consistent() {
            info!("Startup recovery: state is consistent");
        } else {
            warn!(
                held_drift = report.held_drift.len(),
                over_capacity = report.over_capacity.len(),
                duplicate_active = report.duplicate_active.len(),
                "Startup recovery found inconsistencies"
            );
        }
        Ok(report)
    }
}

/// Runs [`LedgerReconciler::reconcile`] on a fixed interval.
#[derive(Debug)]
pub struct ReconcilerService {
    reconciler: LedgerReconciler,
    interval: Duration,
}

impl ReconcilerService {
    /// Create a service reconciling every `interval`.
    pub fn new(reconciler: LedgerReconciler, interval: Duration) -> Self {
        Self {
            reconciler,
            interval,
        }
    }

    /// Run until `shutdown` turns true.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        info!(interval_seconds = self.interval.as_secs(), "Ledger reconciler started");

        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        // The first tick completes immediately; startup recovery already ran.
        ticker.tick().await;

        loop {
            tokio::select! {
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        info!("Ledger reconciler received shutdown signal");
                        break;
                    }
                }
                _ = ticker.tick() => {
                    match self.reconciler.reconcile().await {
                        Ok(outcome) if outcome.drift_detected => {
                            info!(corrected = outcome.corrected.len(), "Periodic reconciliation corrected drift");
                        }
                        Ok(_) => {}
                        Err(e) => error!(error = %e, "Periodic reconciliation failed"),
                    }
                }
            }
        }

        info!("Ledger reconciler stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{credits, fixture, resource, term};
    use enrollhub_entity::consumer::Consumer;

    #[tokio::test]
    async fn test_clean_state_is_consistent() {
        let f = fixture(vec![resource(1, 5, 3.0)], vec![Consumer::eligible("S1")]);
        f.service
            .admit(&ConsumerId::new("S1"), ResourceId::new(1))
            .await
            .expect("admit");
        let report = f.service.verify().await.expect("verify");
        assert!(report.is_consistent(), "{report:?}");
    }

    #[tokio::test]
    async fn test_reconcile_repairs_ledger() {
        let f = fixture(vec![resource(1, 5, 3.0)], vec![Consumer::eligible("S1")]);
        let s1 = ConsumerId::new("S1");
        f.service.admit(&s1, ResourceId::new(1)).await.expect("admit");
        f.service.context().ledger.set(&s1, term(), credits(9.0));
        f.service
            .context()
            .ledger
            .set(&ConsumerId::new("ghost"), term(), credits(1.0));

        let outcome = f.service.reconcile().await.expect("reconcile");
        assert!(outcome.drift_detected);
        assert_eq!(outcome.corrected.len(), 2);
        assert_eq!(f.service.query_ledger(&s1, term()).credits, credits(3.0));
        assert!(f.service.verify().await.expect("verify").is_consistent());
    }

    #[tokio::test]
    async fn test_held_drift_reported_not_repaired() {
        let f = fixture(vec![resource(1, 5, 3.0)], vec![]);
        f.service.context().resources.refresh(&resource(1, 5, 3.0));
        f.service
            .context()
            .resources
            .increment_held(ResourceId::new(1))
            .expect("seat");

        let outcome = f.service.reconcile().await.expect("reconcile");
        assert!(!outcome.drift_detected);
        assert_eq!(
            outcome.report.held_drift,
            vec![HeldDrift {
                resource_id: ResourceId::new(1),
                held: 1,
                active: 0
            }]
        );
        assert_eq!(
            f.service
                .query_resource(ResourceId::new(1))
                .await
                .expect("resource")
                .held,
            1
        );
    }

    #[tokio::test]
    async fn test_service_loop_stops_on_shutdown() {
        let f = fixture(vec![], vec![]);
        let service = ReconcilerService::new(f.service.reconciler(), Duration::from_millis(10));
        let (tx, rx) = watch::channel(false);
        let handle = tokio::spawn(async move { service.run(rx).await });

        tokio::time::sleep(Duration::from_millis(35)).await;
        tx.send(true).expect("send");
        tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .expect("stopped")
            .expect("join");
    }
}
