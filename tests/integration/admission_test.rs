//! Integration tests for admission under concurrency.

mod helpers;

use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use tokio::sync::Barrier;

use enrollhub_admission::AdmissionError;
use enrollhub_core::config::AppConfig;
use enrollhub_core::types::{ConsumerId, Credits, ResourceId};
use enrollhub_entity::consumer::Consumer;

use helpers::{FlakyAllocationRepository, TestCore, consumers, credits, resource};

#[tokio::test(flavor = "multi_thread", worker_threads = 8)]
async fn test_capacity_race_admits_exactly_capacity() {
    let core = TestCore::with_defaults(vec![resource(1, 30, 3.0)], consumers("S", 100));

    let tasks = (1..=100).map(|i| {
        let service = core.service.clone();
        tokio::spawn(async move {
            service
                .admit(&ConsumerId::new(format!("S{i}")), ResourceId::new(1))
                .await
        })
    });
    let results: Vec<_> = join_all(tasks)
        .await
        .into_iter()
        .map(|r| r.expect("join"))
        .collect();

    let admitted = results.iter().filter(|r| r.is_ok()).count();
    let full = results
        .iter()
        .filter(|r| matches!(r, Err(AdmissionError::CapacityExceeded { .. })))
        .count();
    assert_eq!(admitted, 30);
    assert_eq!(full, 70);
    assert_eq!(core.held(1).await, 30);
    core.assert_consistent().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_capacity_failure_reports_full_snapshot() {
    let core = TestCore::with_defaults(vec![resource(1, 1, 3.0)], consumers("S", 2));
    core.service
        .admit(&ConsumerId::new("S1"), ResourceId::new(1))
        .await
        .expect("first seat");

    let err = core
        .service
        .admit(&ConsumerId::new("S2"), ResourceId::new(1))
        .await
        .expect_err("full");
    match err {
        AdmissionError::CapacityExceeded { resource } => {
            assert_eq!(resource.held, 1);
            assert_eq!(resource.capacity, 1);
        }
        other => panic!("unexpected {other:?}"),
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_quota_boundary_only_smaller_request_fits() {
    // Resource 2 weighs 0.5 and resource 3 weighs 1.0; 0.5 credits remain.
    let orders = [[3, 2], [2, 3]];

    for order in orders {
        for _ in 0..10 {
            let core = TestCore::with_defaults(
                vec![resource(1, 10, 17.5), resource(2, 10, 0.5), resource(3, 10, 1.0)],
                vec![Consumer::eligible("S1")],
            );
            let s1 = ConsumerId::new("S1");
            core.service.admit(&s1, ResourceId::new(1)).await.expect("17.5");

            let barrier = Arc::new(Barrier::new(order.len()));
            let tasks: Vec<_> = order
                .iter()
                .map(|&id| {
                    let service = core.service.clone();
                    let barrier = Arc::clone(&barrier);
                    let s1 = s1.clone();
                    tokio::spawn(async move {
                        barrier.wait().await;
                        service.admit(&s1, ResourceId::new(id)).await
                    })
                })
                .collect();
            let results: Vec<_> = join_all(tasks)
                .await
                .into_iter()
                .map(|r| r.expect("join"))
                .collect();

            for (&id, result) in order.iter().zip(&results) {
                if id == 2 {
                    assert!(result.is_ok(), "order {order:?}: {result:?}");
                    continue;
                }
                match result {
                    Err(AdmissionError::QuotaExceeded {
                        current,
                        requested,
                        limit,
                        ..
                    }) => {
                        assert_eq!(*requested, credits(1.0));
                        assert_eq!(*limit, credits(18.0));
                        assert!(*current == credits(17.5) || *current == credits(18.0));
                    }
                    other => panic!("order {order:?}: unexpected {other:?}"),
                }
            }
            assert_eq!(core.ledger("S1"), credits(18.0));
            core.assert_consistent().await;
        }
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_abandoned_admission_still_commits_whole() {
    let repo = Arc::new(FlakyAllocationRepository::default());
    repo.delay_inserts(Duration::from_millis(50));
    let core = TestCore::with_repository(
        AppConfig::default(),
        vec![resource(1, 1, 3.0)],
        consumers("S", 2),
        repo.clone(),
    );
    let s1 = ConsumerId::new("S1");

    let abandoned =
        tokio::time::timeout(Duration::from_millis(10), core.service.admit(&s1, ResourceId::new(1)))
            .await;
    assert!(abandoned.is_err(), "insert should still be in flight");

    tokio::time::timeout(Duration::from_secs(2), async {
        while core.held(1).await != 1 || core.service.lease_status().in_use > 0 {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("admission finished in the background");
    repo.delay_inserts(Duration::ZERO);

    assert_eq!(core.ledger("S1"), credits(3.0));
    core.assert_consistent().await;

    let err = core
        .service
        .admit(&ConsumerId::new("S2"), ResourceId::new(1))
        .await
        .expect_err("seat is taken");
    assert!(matches!(err, AdmissionError::CapacityExceeded { .. }), "{err:?}");
    assert_eq!(core.held(1).await, 1);
}

#[tokio::test]
async fn test_retry_after_success_reports_duplicate() {
    let core = TestCore::with_defaults(vec![resource(1, 5, 3.0)], vec![Consumer::eligible("S1")]);
    let s1 = ConsumerId::new("S1");
    let first = core.service.admit(&s1, ResourceId::new(1)).await.expect("admit");

    let err = core
        .service
        .admit_with_retry(&s1, ResourceId::new(1))
        .await
        .expect_err("duplicate");
    match err {
        AdmissionError::DuplicateAllocation { allocation_id, .. } => {
            assert_eq!(allocation_id, first.allocation.id)
        }
        other => panic!("unexpected {other:?}"),
    }
    assert_eq!(core.held(1).await, 1);
    assert_eq!(core.ledger("S1"), credits(3.0));
}

#[tokio::test]
async fn test_retake_of_passed_course_rejected() {
    let mut passed = Consumer::eligible("S1");
    passed
        .completed_courses
        .insert("C1".to_string(), enrollhub_entity::consumer::CourseOutcome::Passed);
    let mut failed = Consumer::eligible("S2");
    failed
        .completed_courses
        .insert("C1".to_string(), enrollhub_entity::consumer::CourseOutcome::Failed);
    let core = TestCore::with_defaults(vec![resource(1, 5, 3.0)], vec![passed, failed]);

    let err = core
        .service
        .admit(&ConsumerId::new("S1"), ResourceId::new(1))
        .await
        .expect_err("retake");
    assert!(matches!(err, AdmissionError::RetakeNotAllowed { .. }));

    let retake = core
        .service
        .admit(&ConsumerId::new("S2"), ResourceId::new(1))
        .await
        .expect("retake after failing");
    assert!(retake.allocation.retake);
}

#[tokio::test]
async fn test_lease_pool_exhaustion_is_busy() {
    let mut config = AppConfig::default();
    config.lease_pool.size = 1;
    config.lease_pool.acquire_timeout_ms = 20;
    let core = TestCore::new(config, vec![resource(1, 5, 3.0)], vec![Consumer::eligible("S1")]);

    let held = core
        .service
        .lease_pool()
        .acquire(Duration::from_secs(1))
        .await
        .expect("lease");

    let err = core
        .service
        .admit(&ConsumerId::new("S1"), ResourceId::new(1))
        .await
        .expect_err("busy");
    assert!(matches!(err, AdmissionError::Busy { pool_size: 1, .. }));
    assert!(err.is_retryable());

    drop(held);
    core.service
        .admit(&ConsumerId::new("S1"), ResourceId::new(1))
        .await
        .expect("admit once the slot is back");
    assert_eq!(core.service.lease_status().in_use, 0);
}

#[tokio::test]
async fn test_lock_timeout_leaves_state_unchanged() {
    let mut config = AppConfig::default();
    config.admission.lock_timeout_ms = 30;
    let core = TestCore::new(config, vec![resource(1, 5, 3.0)], vec![Consumer::eligible("S1")]);

    let guard = core
        .service
        .lock_manager()
        .acquire(
            enrollhub_admission::lock::LockKey::resource(ResourceId::new(1)),
            Duration::from_secs(1),
        )
        .await
        .expect("lock");

    let err = core
        .service
        .admit(&ConsumerId::new("S1"), ResourceId::new(1))
        .await
        .expect_err("timeout");
    assert!(matches!(err, AdmissionError::Timeout { .. }), "{err:?}");
    drop(guard);

    assert_eq!(core.held(1).await, 0);
    assert_eq!(core.ledger("S1"), Credits::ZERO);
    assert_eq!(core.service.lease_status().in_use, 0);
}

#[tokio::test]
async fn test_failed_insert_rolls_back_every_write() {
    let repo = Arc::new(FlakyAllocationRepository::default());
    let core = TestCore::with_repository(
        AppConfig::default(),
        vec![resource(1, 5, 3.0)],
        vec![Consumer::eligible("S1")],
        repo.clone(),
    );
    repo.fail_inserts(true);

    let err = core
        .service
        .admit(&ConsumerId::new("S1"), ResourceId::new(1))
        .await
        .expect_err("storage down");
    assert!(matches!(err, AdmissionError::Internal { .. }));
    assert_eq!(core.held(1).await, 0);
    assert_eq!(core.ledger("S1"), Credits::ZERO);
    assert!(
        core.service
            .allocations(&ConsumerId::new("S1"), None)
            .await
            .expect("list")
            .is_empty()
    );

    repo.fail_inserts(false);
    core.service
        .admit(&ConsumerId::new("S1"), ResourceId::new(1))
        .await
        .expect("admit after recovery");
    core.assert_consistent().await;
}

#[tokio::test]
async fn test_metrics_count_outcomes() {
    let core = TestCore::with_defaults(vec![resource(1, 1, 3.0)], consumers("S", 2));
    core.service
        .admit(&ConsumerId::new("S1"), ResourceId::new(1))
        .await
        .expect("admit");
    let _ = core
        .service
        .admit(&ConsumerId::new("S2"), ResourceId::new(1))
        .await;
    let _ = core
        .service
        .admit(&ConsumerId::new("ghost"), ResourceId::new(1))
        .await;

    let metrics = core.service.metrics().admission;
    assert_eq!(metrics.attempted, 3);
    assert_eq!(metrics.admitted, 1);
    assert_eq!(metrics.rejected, 1);
    assert_eq!(metrics.not_found, 1);
    assert_eq!(metrics.sample_count, 3);
    assert!(metrics.latency_p50.is_some());
}
