//! Tests for builder modules

use std::sync::Arc;

use async_trait::async_trait;
use migration_scheduler::builders::build_context;
use migration_scheduler::config::{OrchestratorConfig, SequenceConfig};
use migration_scheduler::core::{
    AppResult, MetaLoader, PartitionMeta, Resource, SchedulerError, SourceKind, TableMeta,
};
use migration_scheduler::infra::{InMemoryCounter, InMemoryJobStore};
use migration_scheduler::runtime::TokioSpawner;

struct NoopLoader(SourceKind);

#[async_trait]
impl MetaLoader for NoopLoader {
    fn kind(&self) -> SourceKind {
        self.0
    }
    async fn list_database_names(&self) -> AppResult<Vec<String>> {
        Ok(Vec::new())
    }
    async fn list_table_names(&self, _database: &str) -> AppResult<Vec<String>> {
        Ok(Vec::new())
    }
    async fn get_table(&self, database: &str, table: &str) -> AppResult<TableMeta> {
        anyhow::bail!("{database}.{table} does not exist")
    }
    async fn list_partitions(&self, _table: &TableMeta) -> AppResult<Vec<PartitionMeta>> {
        Ok(Vec::new())
    }
}

fn two_sources() -> OrchestratorConfig {
    OrchestratorConfig::from_json_str(
        r#"{
            "resources": { "transfer_job": 2 },
            "sequence": { "block_size": 10 },
            "sources": [
                { "name": "hive-prod", "kind": "hive" },
                { "name": "lake", "kind": "object_store", "parallelism": 2 }
            ]
        }"#,
    )
    .unwrap()
}

#[tokio::test]
async fn test_build_context_wires_components() {
    let cfg = two_sources();
    let ctx = build_context(
        &cfg,
        Arc::new(InMemoryCounter::new()),
        Arc::new(InMemoryJobStore::new()),
        |source| Ok(Arc::new(NoopLoader(source.kind)) as Arc<dyn MetaLoader>),
        TokioSpawner::current(),
    )
    .unwrap();

    assert_eq!(ctx.allocator.available(Resource::TransferJob), 2);
    assert_eq!(ctx.allocator.available(Resource::TransferWorker), 25);
    assert_eq!(ctx.coordinator.source_names(), vec!["hive-prod", "lake"]);

    assert_eq!(ctx.job_ids.name(), "job");
    assert_eq!(ctx.task_ids.name(), "task");
    assert_eq!(ctx.job_ids.next_id().unwrap(), 0);
    assert_eq!(ctx.task_ids.next_id().unwrap(), 0);
    assert_eq!(ctx.job_ids.next_id().unwrap(), 1);

    let report = ctx.reconciler.flush().await.unwrap();
    assert_eq!(report.jobs_updated, 0);
}

#[tokio::test]
async fn test_invalid_config_rejected() {
    let cfg = OrchestratorConfig {
        sequence: SequenceConfig { block_size: 0 },
        ..OrchestratorConfig::default()
    };
    let result = build_context(
        &cfg,
        Arc::new(InMemoryCounter::new()),
        Arc::new(InMemoryJobStore::new()),
        |source| Ok(Arc::new(NoopLoader(source.kind)) as Arc<dyn MetaLoader>),
        TokioSpawner::current(),
    );
    assert!(matches!(result, Err(SchedulerError::Config(_))));
}

#[tokio::test]
async fn test_loader_factory_error_propagates() {
    let cfg = two_sources();
    let result = build_context(
        &cfg,
        Arc::new(InMemoryCounter::new()),
        Arc::new(InMemoryJobStore::new()),
        |source| match source.kind {
            SourceKind::ObjectStore => Err(SchedulerError::Backend("no object-store loader".into())),
            kind => Ok(Arc::new(NoopLoader(kind)) as Arc<dyn MetaLoader>),
        },
        TokioSpawner::current(),
    );
    assert!(matches!(result, Err(SchedulerError::Backend(_))));
}
