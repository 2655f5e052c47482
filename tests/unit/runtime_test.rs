//! Tests for runtime API models

use migration_scheduler::core::{DataSourceCoordinator, Resource, ResourceAllocator};
use migration_scheduler::runtime::{
    health, initialize_source, list_resources, load_source, source_status, TokioSpawner,
};

#[test]
fn test_health() {
    assert!(health().ok);
}

#[test]
fn test_list_resources_reflects_grants() {
    let allocator = ResourceAllocator::default();
    let grant = allocator
        .allocate("task-1", &[(Resource::TransferJob, 2)].into_iter().collect())
        .into_result("task-1")
        .unwrap();

    let listed = list_resources(&allocator);
    assert_eq!(listed.len(), 3);
    let jobs = listed
        .iter()
        .find(|r| r.resource == Resource::TransferJob)
        .unwrap();
    assert_eq!((jobs.capacity, jobs.available), (5, 3));

    allocator.release(grant);
    assert!(list_resources(&allocator)
        .iter()
        .all(|r| r.capacity == r.available));
}

#[tokio::test]
async fn test_load_unknown_source_is_rejected() {
    let coordinator = DataSourceCoordinator::new(TokioSpawner::current());
    let response = load_source(&coordinator, "hive-prod");
    assert!(!response.accepted);
    assert_eq!(response.message, "hive-prod has not been added");
    assert!(response.session.is_none());

    let status = source_status(&coordinator, "hive-prod");
    assert!(!status.loading);
    assert!((status.progress + 1.0).abs() < f32::EPSILON);
    assert_eq!(status.last_error, None);
    assert_eq!(status.loaded_at_ms, None);
    assert_eq!(status.init_status, None);

    let response = initialize_source(&coordinator, "hive-prod").await;
    assert!(!response.accepted);
    assert_eq!(response.message, "hive-prod has not been added");
}

#[test]
fn test_status_serializes() {
    let coordinator = DataSourceCoordinator::new(());
    let json = serde_json::to_value(source_status(&coordinator, "lake")).unwrap();
    assert_eq!(json["source"], "lake");
    assert_eq!(json["loading"], false);
}
