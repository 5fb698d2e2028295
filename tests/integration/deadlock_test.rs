//! Integration tests for lock ordering and deadlock detection.

mod helpers;

use std::sync::Arc;
use std::time::{Duration, Instant};

use futures::future::join_all;
use rand::Rng;
use tokio::sync::Barrier;

use enrollhub_admission::AdmissionError;
use enrollhub_admission::lock::{LockError, LockKey, LockManager};
use enrollhub_core::config::{AppConfig, LockPolicy};
use enrollhub_core::types::{ConsumerId, ResourceId};

use helpers::{TestCore, consumers, resource};

async fn opposing_pair(manager: &LockManager, timeout: Duration) -> Vec<Result<(), LockError>> {
    let a = LockKey::resource(ResourceId::new(1));
    let b = LockKey::resource(ResourceId::new(2));
    let barrier = Arc::new(Barrier::new(2));

    let tasks = [(a.clone(), b.clone()), (b, a)].map(|(first, second)| {
        let manager = manager.clone();
        let barrier = Arc::clone(&barrier);
        tokio::spawn(async move {
            let deadline = Instant::now() + timeout;
            let mut set = manager.begin();
            set.acquire(first, deadline).await?;
            barrier.wait().await;
            set.acquire(second, deadline).await?;
            tokio::time::sleep(Duration::from_millis(5)).await;
            set.release();
            Ok::<(), LockError>(())
        })
    });

    join_all(tasks)
        .await
        .into_iter()
        .map(|r| r.expect("join"))
        .collect()
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_unordered_cycle_aborts_exactly_one() {
    let manager = LockManager::new(LockPolicy::Unordered);
    let results = opposing_pair(&manager, Duration::from_secs(2)).await;

    assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 1, "{results:?}");
    let failure = results
        .iter()
        .find_map(|r| r.as_ref().err())
        .expect("one failure");
    assert!(
        matches!(failure, LockError::Deadlock { .. } | LockError::Timeout { .. }),
        "{failure:?}"
    );
    assert_eq!(manager.active_keys(), 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_deadlock_maps_to_retryable_abort() {
    let manager = LockManager::new(LockPolicy::Unordered);
    let results = opposing_pair(&manager, Duration::from_secs(2)).await;

    let err = results
        .into_iter()
        .find_map(Result::err)
        .map(AdmissionError::from)
        .expect("one failure");
    assert!(matches!(
        err,
        AdmissionError::DeadlockAborted { .. } | AdmissionError::Timeout { .. }
    ));
    assert!(err.is_retryable());
    assert!(manager.metrics().deadlocks + manager.metrics().timeouts >= 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_ordered_policy_sorts_opposing_requests() {
    let manager = LockManager::new(LockPolicy::Ordered);
    let a = LockKey::resource(ResourceId::new(1));
    let b = LockKey::resource(ResourceId::new(2));

    let tasks = [vec![a.clone(), b.clone()], vec![b, a]].map(|keys| {
        let manager = manager.clone();
        tokio::spawn(async move {
            for _ in 0..50 {
                let set = manager.acquire_all(keys.clone(), Duration::from_secs(2)).await?;
                tokio::task::yield_now().await;
                set.release();
            }
            Ok::<(), LockError>(())
        })
    });
    for result in join_all(tasks).await {
        result.expect("join").expect("no lock failure");
    }
    assert_eq!(manager.metrics().deadlocks, 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 8)]
async fn test_ordered_random_stress_never_deadlocks() {
    let resources = (1..=6).map(|id| resource(id, 20, 1.0)).collect();
    let core = TestCore::with_defaults(resources, consumers("S", 40));

    let plans: Vec<Vec<u64>> = {
        let mut rng = rand::thread_rng();
        (0..40)
            .map(|_| (0..4).map(|_| rng.gen_range(1..=6)).collect())
            .collect()
    };

    let tasks = plans.into_iter().enumerate().map(|(i, plan)| {
        let service = core.service.clone();
        tokio::spawn(async move {
            let consumer = ConsumerId::new(format!("S{}", i + 1));
            let mut outcomes = Vec::new();
            for resource_id in plan {
                outcomes.push(service.admit_with_retry(&consumer, ResourceId::new(resource_id)).await);
            }
            outcomes
        })
    });
    let outcomes: Vec<_> = join_all(tasks)
        .await
        .into_iter()
        .flat_map(|r| r.expect("join"))
        .collect();

    assert!(
        !outcomes
            .iter()
            .any(|r| matches!(r, Err(AdmissionError::DeadlockAborted { .. })))
    );
    assert_eq!(core.service.metrics().locks.deadlocks, 0);
    core.assert_consistent().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_unordered_service_still_admits() {
    let mut config = AppConfig::default();
    config.admission.lock_policy = LockPolicy::Unordered;
    let core = TestCore::new(config, vec![resource(1, 10, 1.0)], consumers("S", 20));

    let tasks = (1..=20).map(|i| {
        let service = core.service.clone();
        tokio::spawn(async move {
            service
                .admit_with_retry(&ConsumerId::new(format!("S{i}")), ResourceId::new(1))
                .await
        })
    });
    let admitted = join_all(tasks)
        .await
        .into_iter()
        .filter(|r| matches!(r, Ok(Ok(_))))
        .count();
    assert_eq!(admitted, 10);
    core.assert_consistent().await;
}
