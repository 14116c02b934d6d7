//! Integration tests for `ClientRotationManager`.
//!
//! Covers the three rotation triggers working together, handle lifetime across
//! rotations, factory failures and concurrent acquisition.

use crate::mock_infrastructure::{CountingClientFactory, MockUpstreamClient};
use relay_core::{
    config::RotationConfig,
    metrics::MetricsCollector,
    rotation::{ClientFactory, ClientRotationManager, RotationError},
};
use std::{
    collections::{BTreeMap, BTreeSet},
    sync::Arc,
    time::Duration,
};

fn shared_manager(
    config: &RotationConfig,
) -> (
    ClientRotationManager<impl ClientFactory<Client = MockUpstreamClient>>,
    Arc<CountingClientFactory>,
) {
    let factory = Arc::new(CountingClientFactory::new());
    let builder = factory.clone();
    let manager =
        ClientRotationManager::new(config, move || builder.construct(), MetricsCollector::new())
            .unwrap();
    (manager, factory)
}

fn generation<F: ClientFactory<Client = MockUpstreamClient>>(
    manager: &ClientRotationManager<F>,
) -> u64 {
    manager.get_handle().unwrap().generation
}

#[tokio::test]
async fn test_transaction_ceiling_sequence() {
    let config = RotationConfig { transaction_reset: Some(2), ..Default::default() };
    let (manager, factory) = shared_manager(&config);

    let seen: Vec<u64> = (0..7).map(|_| generation(&manager)).collect();

    assert_eq!(seen, vec![1, 1, 2, 2, 3, 3, 4]);
    assert_eq!(factory.constructed(), 4);
    assert_eq!(manager.rotation_count(), 3);
}

#[tokio::test(start_paused = true)]
async fn test_duration_rotation_resets_transaction_budget() {
    let config = RotationConfig {
        transaction_reset: Some(5),
        duration_reset_ms: Some(30_000),
        ..Default::default()
    };
    let (manager, _) = shared_manager(&config);

    for _ in 0..3 {
        assert_eq!(generation(&manager), 1);
    }
    assert_eq!(manager.transactions_remaining(), Some(2));

    tokio::time::advance(Duration::from_secs(30)).await;
    assert_eq!(manager.time_until_rotation(), Some(Duration::ZERO));
    assert_eq!(generation(&manager), 2);
    assert_eq!(manager.transactions_remaining(), Some(4));

    for _ in 0..4 {
        assert_eq!(generation(&manager), 2);
    }
    assert_eq!(generation(&manager), 3);
}

#[tokio::test]
async fn test_error_trigger_resets_every_counter() {
    let config = RotationConfig {
        transaction_reset: Some(10),
        error_reset: Some(2),
        error_codes: BTreeSet::from([21, 50]),
        ..Default::default()
    };
    let (manager, _) = shared_manager(&config);

    assert_eq!(generation(&manager), 1);
    manager.record_error_status(50);
    manager.record_error_status(21);
    manager.record_error_status(21);
    manager.record_error_status(404);
    assert_eq!(manager.error_counts_remaining(), BTreeMap::from([(21, 0), (50, 1)]));

    assert_eq!(generation(&manager), 2);
    assert_eq!(manager.error_counts_remaining(), BTreeMap::from([(21, 2), (50, 2)]));
    assert_eq!(manager.transactions_remaining(), Some(9));
}

#[tokio::test]
async fn test_errors_after_exhaustion_do_not_underflow() {
    let config = RotationConfig {
        error_reset: Some(1),
        error_codes: BTreeSet::from([21]),
        ..Default::default()
    };
    let (manager, _) = shared_manager(&config);

    for _ in 0..5 {
        manager.record_error_status(21);
    }
    assert_eq!(manager.error_counts_remaining(), BTreeMap::from([(21, 0)]));
    assert_eq!(generation(&manager), 2);
    assert_eq!(generation(&manager), 2);
}

#[tokio::test]
async fn test_in_flight_handle_outlives_rotation() {
    let config = RotationConfig { transaction_reset: Some(1), ..Default::default() };
    let (manager, _) = shared_manager(&config);

    let in_flight = manager.get_handle().unwrap();
    let replacement = manager.get_handle().unwrap();

    assert!(!Arc::ptr_eq(&in_flight, &replacement));
    assert_eq!(in_flight.generation, 1);
    assert_eq!(replacement.generation, 2);
}

#[tokio::test]
async fn test_factory_failure_keeps_serving_after_recovery() {
    let config = RotationConfig { transaction_reset: Some(1), ..Default::default() };
    let (manager, factory) = shared_manager(&config);

    assert_eq!(generation(&manager), 1);
    factory.set_failing(true);
    assert!(matches!(manager.get_handle(), Err(RotationError::ClientConstruction(_))));
    assert_eq!(manager.rotation_count(), 0);

    factory.set_failing(false);
    assert_eq!(generation(&manager), 2);
    assert_eq!(manager.rotation_count(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_disabled_manager_ignores_volume_time_and_errors() {
    let (manager, factory) = shared_manager(&RotationConfig::default());

    for _ in 0..500 {
        manager.record_error_status(21);
        assert_eq!(generation(&manager), 1);
    }
    tokio::time::advance(Duration::from_secs(86_400)).await;
    assert_eq!(generation(&manager), 1);
    assert_eq!(factory.constructed(), 1);
    assert!(!manager.is_rotation_enabled());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_acquisition_respects_ceiling() {
    let config = RotationConfig { transaction_reset: Some(10), ..Default::default() };
    let (manager, factory) = shared_manager(&config);
    let manager = Arc::new(manager);

    let mut tasks = Vec::new();
    for _ in 0..8 {
        let manager = manager.clone();
        tasks.push(tokio::spawn(async move {
            (0..25).map(|_| manager.get_handle().unwrap().generation).collect::<Vec<_>>()
        }));
    }

    let mut per_generation: BTreeMap<u64, u64> = BTreeMap::new();
    for task in tasks {
        for generation in task.await.unwrap() {
            *per_generation.entry(generation).or_default() += 1;
        }
    }

    assert_eq!(per_generation.len(), 20);
    for (generation, count) in &per_generation {
        assert_eq!(*count, 10, "generation {generation}");
    }
    assert_eq!(factory.constructed(), 20);
}
