//! Integration tests for ledger reconstruction and snapshot persistence.

mod helpers;

use std::sync::Arc;

use enrollhub_admission::AdmissionService;
use enrollhub_admission::bootstrap::{build_service, persist_snapshot};
use enrollhub_admission::collaborator::{MemoryCatalog, MemoryDirectory};
use enrollhub_admission::ledger::LedgerIndex;
use enrollhub_admission::store::StoreSnapshot;
use enrollhub_core::config::AppConfig;
use enrollhub_core::types::{ConsumerId, ResourceId};

use helpers::{TestCore, consumers, credits, resource, term};

async fn populated_core() -> TestCore {
    let core = TestCore::with_defaults(
        vec![resource(1, 10, 3.0), resource(2, 10, 2.5), resource(3, 10, 0.5)],
        consumers("S", 5),
    );
    for i in 1..=5u64 {
        let consumer = ConsumerId::new(format!("S{i}"));
        for r in 1..=3u64 {
            if (i + r) % 3 != 0 {
                core.service
                    .admit(&consumer, ResourceId::new(r))
                    .await
                    .expect("admit");
            }
        }
    }
    let first = core
        .service
        .allocations(&ConsumerId::new("S1"), None)
        .await
        .expect("list")[0]
        .id;
    core.service.cancel(first).await.expect("cancel");
    core
}

#[tokio::test]
async fn test_rebuild_matches_incremental_ledger() {
    let core = populated_core().await;
    let allocations = core.service.context().allocations.all().await.expect("all");

    let rebuilt = LedgerIndex::new();
    rebuilt.rebuild(&allocations);
    for i in 1..=5 {
        let consumer = ConsumerId::new(format!("S{i}"));
        assert_eq!(
            rebuilt.get(&consumer, term()),
            core.service.query_ledger(&consumer, term()).credits,
            "ledger mismatch for {consumer}"
        );
    }
    assert!(core.service.context().ledger.verify(&allocations).is_empty());
}

#[tokio::test]
async fn test_restore_into_fresh_service_rebuilds_ledger() {
    let core = populated_core().await;
    let snapshot = core.service.snapshot().await.expect("snapshot");

    let restarted = AdmissionService::with_memory_store(
        &AppConfig::default(),
        Arc::new(MemoryCatalog::with_resources(core.catalog.list())),
        Arc::new(MemoryDirectory::with_consumers(core.directory.list())),
    )
    .expect("service");
    let report = restarted.restore(snapshot).await.expect("restore");
    assert!(report.is_consistent(), "{report:?}");

    for i in 1..=5 {
        let consumer = ConsumerId::new(format!("S{i}"));
        assert_eq!(
            restarted.query_ledger(&consumer, term()),
            core.service.query_ledger(&consumer, term())
        );
    }
    for r in 1..=3 {
        assert_eq!(
            restarted.query_resource(ResourceId::new(r)).await.expect("resource"),
            core.service.query_resource(ResourceId::new(r)).await.expect("resource")
        );
    }

    let next = restarted
        .admit(&ConsumerId::new("S1"), ResourceId::new(1))
        .await
        .expect("re-admit after restart");
    let highest = core
        .service
        .context()
        .allocations
        .all()
        .await
        .expect("all")
        .iter()
        .map(|a| a.id)
        .max()
        .expect("some");
    assert!(next.allocation.id > highest);
}

#[tokio::test]
async fn test_snapshot_file_round_trip() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("state").join("snapshot.json");
    let core = populated_core().await;

    core.service
        .snapshot()
        .await
        .expect("snapshot")
        .save(&path)
        .await
        .expect("save");
    let loaded = StoreSnapshot::load(&path)
        .await
        .expect("load")
        .expect("present");
    assert_eq!(loaded.allocations, core.service.snapshot().await.expect("snapshot").allocations);

    assert!(
        StoreSnapshot::load(dir.path().join("missing.json"))
            .await
            .expect("load")
            .is_none()
    );
}

#[tokio::test]
async fn test_reconcile_corrects_injected_drift() {
    let core = populated_core().await;
    let s2 = ConsumerId::new("S2");
    let before = core.ledger("S2");
    core.service.context().ledger.set(&s2, term(), credits(99.0));

    let report = core.service.verify().await.expect("verify");
    assert_eq!(report.ledger_drift.len(), 1);

    let outcome = core.service.reconcile().await.expect("reconcile");
    assert!(outcome.drift_detected);
    assert_eq!(core.ledger("S2"), before);
    core.assert_consistent().await;
}

#[tokio::test]
async fn test_bootstrap_persists_across_restart() {
    let dir = tempfile::tempdir().expect("tempdir");
    let seed_path = dir.path().join("seed.json");
    tokio::fs::write(
        &seed_path,
        r#"{
            "resources": [ { "id": 7, "capacity": 3, "credit_weight": 2.0, "term": "2025-fall" } ],
            "consumers": [
                { "id": "A", "eligibility": "eligible" },
                { "id": "B", "eligibility": "eligible" }
            ]
        }"#,
    )
    .await
    .expect("write seed");

    let mut config = AppConfig::default();
    config.store.seed_path = Some(seed_path.display().to_string());
    config.store.snapshot_path = Some(dir.path().join("snapshot.json").display().to_string());

    let service = build_service(&config).await.expect("build");
    service
        .admit(&ConsumerId::new("A"), ResourceId::new(7))
        .await
        .expect("admit A");
    let b = service
        .admit(&ConsumerId::new("B"), ResourceId::new(7))
        .await
        .expect("admit B");
    service.cancel(b.allocation.id).await.expect("cancel B");
    assert!(service.shutdown(std::time::Duration::from_secs(1)).await);
    persist_snapshot(&service, &config).await.expect("persist");

    let restarted = build_service(&config).await.expect("rebuild");
    assert_eq!(
        restarted
            .query_resource(ResourceId::new(7))
            .await
            .expect("resource")
            .held,
        1
    );
    assert_eq!(
        restarted.query_ledger(&ConsumerId::new("A"), term()).credits,
        credits(2.0)
    );
    assert_eq!(
        restarted.allocations(&ConsumerId::new("B"), None).await.expect("list").len(),
        1
    );
    assert!(restarted.verify().await.expect("verify").is_consistent());
}
