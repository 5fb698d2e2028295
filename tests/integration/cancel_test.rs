//! Integration tests for cancellation and capacity recovery.

mod helpers;

use futures::future::join_all;

use enrollhub_admission::AdmissionError;
use enrollhub_core::config::{AppConfig, CanceledResourcePolicy};
use enrollhub_core::types::{ConsumerId, Credits, ResourceId};
use enrollhub_entity::consumer::Consumer;

use helpers::{TestCore, consumers, credits, resource};

#[tokio::test]
async fn test_cancel_frees_seat_for_newcomer() {
    let core = TestCore::with_defaults(vec![resource(1, 3, 3.0)], consumers("S", 4));
    let mut admitted = Vec::new();
    for i in 1..=3 {
        let admission = core
            .service
            .admit(&ConsumerId::new(format!("S{i}")), ResourceId::new(1))
            .await
            .expect("admit");
        admitted.push(admission.allocation.id);
    }

    let err = core
        .service
        .admit(&ConsumerId::new("S4"), ResourceId::new(1))
        .await
        .expect_err("full");
    assert!(matches!(err, AdmissionError::CapacityExceeded { .. }));

    let cancellation = core.service.cancel(admitted[0]).await.expect("cancel");
    assert_eq!(cancellation.resource.map(|r| r.held), Some(2));
    assert_eq!(core.ledger("S1"), Credits::ZERO);

    core.service
        .admit(&ConsumerId::new("S4"), ResourceId::new(1))
        .await
        .expect("newcomer takes the freed seat");
    assert_eq!(core.held(1).await, 3);
    core.assert_consistent().await;
}

#[tokio::test]
async fn test_canceled_resource_freezes_seat() {
    let core = TestCore::with_defaults(
        vec![resource(1, 5, 3.0)],
        vec![Consumer::eligible("S1"), Consumer::eligible("S2")],
    );
    let admission = core
        .service
        .admit(&ConsumerId::new("S1"), ResourceId::new(1))
        .await
        .expect("admit");
    core.catalog.set_canceled(ResourceId::new(1), true);

    let cancellation = core.service.cancel(admission.allocation.id).await.expect("cancel");
    assert!(!cancellation.held_released);
    assert_eq!(core.held(1).await, 1);
    assert_eq!(core.ledger("S1"), Credits::ZERO);

    let err = core
        .service
        .admit(&ConsumerId::new("S2"), ResourceId::new(1))
        .await
        .expect_err("canceled");
    match err {
        AdmissionError::ResourceCanceled { resource } => {
            assert!(resource.canceled);
            assert_eq!(resource.held, 1);
        }
        other => panic!("unexpected {other:?}"),
    }
    core.assert_consistent().await;
}

#[tokio::test]
async fn test_release_policy_returns_seat_of_canceled_resource() {
    let mut config = AppConfig::default();
    config.admission.canceled_resource_policy = CanceledResourcePolicy::ReleaseHeld;
    let core = TestCore::new(config, vec![resource(1, 5, 3.0)], vec![Consumer::eligible("S1")]);
    let admission = core
        .service
        .admit(&ConsumerId::new("S1"), ResourceId::new(1))
        .await
        .expect("admit");
    core.catalog.set_canceled(ResourceId::new(1), true);

    let cancellation = core.service.cancel(admission.allocation.id).await.expect("cancel");
    assert!(cancellation.held_released);
    assert_eq!(core.held(1).await, 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_cancels_succeed_once() {
    let core = TestCore::with_defaults(vec![resource(1, 5, 2.0)], vec![Consumer::eligible("S1")]);
    let admission = core
        .service
        .admit(&ConsumerId::new("S1"), ResourceId::new(1))
        .await
        .expect("admit");

    let tasks = (0..8).map(|_| {
        let service = core.service.clone();
        let id = admission.allocation.id;
        tokio::spawn(async move { service.cancel(id).await })
    });
    let results: Vec<_> = join_all(tasks)
        .await
        .into_iter()
        .map(|r| r.expect("join"))
        .collect();

    assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 1);
    assert!(
        results
            .iter()
            .filter_map(|r| r.as_ref().err())
            .all(|e| matches!(e, AdmissionError::AlreadyCancelled { .. }))
    );
    assert_eq!(core.held(1).await, 0);
    assert_eq!(core.ledger("S1"), Credits::ZERO);
    core.assert_consistent().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_admit_and_cancel_churn_keeps_invariants() {
    let core = TestCore::with_defaults(
        vec![resource(1, 4, 3.0), resource(2, 4, 1.5)],
        consumers("S", 12),
    );

    let tasks = (1..=12).map(|i| {
        let service = core.service.clone();
        tokio::spawn(async move {
            let consumer = ConsumerId::new(format!("S{i}"));
            for round in 0..5u64 {
                let resource = ResourceId::new(1 + (i + round) % 2);
                if let Ok(admission) = service.admit_with_retry(&consumer, resource).await {
                    if round % 2 == 0 {
                        let _ = service.cancel(admission.allocation.id).await;
                    }
                }
            }
        })
    });
    for joined in join_all(tasks).await {
        joined.expect("join");
    }

    assert!(core.held(1).await <= 4);
    assert!(core.held(2).await <= 4);
    core.assert_consistent().await;

    let total: Credits = (1..=12)
        .map(|i| core.ledger(&format!("S{i}")))
        .fold(Credits::ZERO, |acc, c| acc.checked_add(c).expect("sum"));
    let expected = credits(3.0 * f64::from(core.held(1).await) + 1.5 * f64::from(core.held(2).await));
    assert_eq!(total, expected);
}
