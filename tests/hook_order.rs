//! Hooks called outside their valid state are usage errors and leave the
//! group untouched.

mod common;

use common::scenario;
use common::test_db::TestDatabase;
use dbfixture::{EnvironmentConfig, LifecycleCoordinator, LifecycleState, Severity};

#[tokio::test]
async fn hooks_before_the_group_are_rejected() {
    let store = TestDatabase::in_memory().await;
    let mut coordinator = LifecycleCoordinator::new(scenario::users_and_settings(store));

    let err = coordinator.before_each().await.unwrap_err();
    assert!(err.is_usage());
    assert_eq!(err.severity(), Severity::Group);
    assert!(coordinator.after_each().unwrap_err().is_usage());
    assert!(coordinator.after_group().unwrap_err().is_usage());
    assert_eq!(coordinator.state(), LifecycleState::Unbuilt);
}

#[tokio::test]
async fn nested_before_group_is_rejected() {
    let store = TestDatabase::in_memory().await;
    let mut coordinator = LifecycleCoordinator::new(scenario::users_and_settings(store));
    coordinator.before_group(EnvironmentConfig::minimal()).await.unwrap();
    let group = coordinator.group_id();

    let err = coordinator.before_group(EnvironmentConfig::minimal()).await.unwrap_err();
    assert!(err.is_usage());
    assert_eq!(coordinator.group_id(), group);
    assert_eq!(coordinator.state(), LifecycleState::SnapshotReady);
}

#[tokio::test]
async fn hooks_after_the_group_are_rejected() {
    let store = TestDatabase::in_memory().await;
    let mut coordinator = LifecycleCoordinator::new(scenario::users_and_settings(store));
    coordinator.before_group(EnvironmentConfig::minimal()).await.unwrap();
    coordinator.after_group().unwrap();

    assert!(coordinator.before_each().await.unwrap_err().is_usage());
    assert!(coordinator.rebuild().await.unwrap_err().is_usage());
    assert!(coordinator.after_group().unwrap_err().is_usage());
}

#[tokio::test]
async fn next_group_may_change_config() {
    let store = TestDatabase::in_memory().await;
    let mut coordinator = LifecycleCoordinator::new(scenario::users_and_settings(store));
    coordinator.before_group(EnvironmentConfig::minimal()).await.unwrap();
    assert!(!coordinator.snapshot().unwrap().contains("translations"));
    coordinator.after_group().unwrap();

    let config = EnvironmentConfig::minimal().with_translations(true);
    coordinator.before_group(config).await.unwrap();
    assert!(coordinator.snapshot().unwrap().contains("translations"));
    assert_eq!(coordinator.config(), Some(&config));

    coordinator.after_group().unwrap();
    coordinator.before_group(EnvironmentConfig::minimal()).await.unwrap();
    assert!(!coordinator.store().table_exists("translations").await.unwrap());
}

#[tokio::test]
async fn enabled_step_without_registration_aborts_the_group() {
    let store = TestDatabase::in_memory().await;
    let mut coordinator = LifecycleCoordinator::new(scenario::three_tables(store));

    let err = coordinator
        .before_group(EnvironmentConfig::minimal().with_components(true))
        .await
        .unwrap_err();
    assert!(err.is_setup_failure());
    assert_eq!(coordinator.state(), LifecycleState::Unbuilt);
    assert!(coordinator.store().list_tables().await.unwrap().is_empty());
}
