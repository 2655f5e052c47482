//! Tests for configuration validation

use std::time::Duration;

use migration_scheduler::config::{OrchestratorConfig, ReconcileConfig, SequenceConfig};
use migration_scheduler::core::{Resource, SourceKind};

#[test]
fn test_defaults() {
    let cfg = OrchestratorConfig::default();
    assert!(cfg.validate().is_ok());
    assert_eq!(cfg.sequence.block_size, 100);
    assert_eq!(cfg.reconcile.interval_ms, 3_000);
    assert_eq!(cfg.reconcile.channel_capacity, 1_024);
    assert!(cfg.reconcile.reconcile_on_start);

    let capacities = cfg.capacities();
    assert_eq!(capacities[&Resource::TransferJob], 5);
    assert_eq!(capacities[&Resource::TransferWorker], 25);
    assert_eq!(capacities[&Resource::MetadataOperation], 10);
}

#[test]
fn test_parse_partial_json() {
    let cfg = OrchestratorConfig::from_json_str(
        r#"{
            "resources": { "transfer_worker": 40 },
            "reconcile": { "interval_ms": 500 },
            "sources": [
                {
                    "name": "hive-prod",
                    "kind": "hive",
                    "filter": { "db_whitelist": ["sales"], "table_blacklist": ["*.tmp"] },
                    "parallelism": 4
                }
            ]
        }"#,
    )
    .unwrap();

    let capacities = cfg.capacities();
    assert_eq!(capacities[&Resource::TransferWorker], 40);
    assert_eq!(capacities[&Resource::TransferJob], 5);
    assert_eq!(cfg.reconcile.settings().interval, Duration::from_millis(500));
    assert!(cfg.reconcile.reconcile_on_start);
    assert_eq!(cfg.sources[0].kind, SourceKind::Hive);
    assert_eq!(cfg.sources[0].filter.db_whitelist, vec!["sales".to_string()]);
    assert_eq!(cfg.sources[0].parallelism, Some(4));
}

#[test]
fn test_zero_block_size_rejected() {
    let cfg = OrchestratorConfig {
        sequence: SequenceConfig { block_size: 0 },
        ..OrchestratorConfig::default()
    };
    assert!(cfg.validate().is_err());
}

#[test]
fn test_zero_interval_rejected() {
    let cfg = OrchestratorConfig {
        reconcile: ReconcileConfig {
            interval_ms: 0,
            ..ReconcileConfig::default()
        },
        ..OrchestratorConfig::default()
    };
    assert!(cfg.validate().is_err());
}

#[test]
fn test_duplicate_source_rejected() {
    let err = OrchestratorConfig::from_json_str(
        r#"{ "sources": [
            { "name": "odps", "kind": "warehouse" },
            { "name": "odps", "kind": "object_store" }
        ] }"#,
    )
    .unwrap_err();
    assert!(err.contains("defined twice"));
}

#[test]
fn test_parse_error_reported() {
    let err = OrchestratorConfig::from_json_str("{ not json").unwrap_err();
    assert!(err.starts_with("parse error"));
}

#[test]
fn test_from_path() {
    let path = std::env::temp_dir().join(format!("orchestrator-{}.json", uuid::Uuid::new_v4()));
    std::fs::write(&path, r#"{ "sequence": { "block_size": 1 } }"#).unwrap();
    let cfg = OrchestratorConfig::from_path(&path).unwrap();
    assert_eq!(cfg.sequence.block_size, 1);
    let _ = std::fs::remove_file(path);

    assert!(OrchestratorConfig::from_path("/nonexistent/orchestrator.json").is_err());
}
