//! Core orchestration primitives: capacity accounting, identifiers, status
//! rollup, partition selection, metadata loading and reconciliation.

pub mod coordinator;
pub mod error;
pub mod executor;
pub mod metadata;
pub mod partition;
pub mod reconciler;
pub mod resource_allocator;
pub mod sequence;
pub mod status;

pub use coordinator::{
    DataSourceCoordinator, InitAttempt, InitStatus, LoadAttempt, SessionInfo, SourceRegistration,
};
pub use error::{AppResult, SchedulerError};
pub use executor::{ExecutionContext, Spawn, TaskExecutor};
pub use metadata::{
    crawl, DatabaseMeta, LoadProgress, MetaLoader, PartitionMeta, SourceCatalog, SourceFilter,
    SourceKind, TableMeta,
};
pub use partition::{compare_partitions, in_range, PartitionOrder, PartitionRangeFilter};
pub use reconciler::{
    JobStatusStore, ReconcileReport, ReconcileSettings, ReconcilerHandle, ReconciliationScheduler,
};
pub use resource_allocator::{
    default_capacities, Allocation, AllocatorStats, Grant, Resource, ResourceAllocator,
    ResourceMap,
};
pub use sequence::{DurableCounter, SequenceAllocator, SequenceBlock};
pub use status::{
    resolve_parent_status, rollup_catalog_objects, rollup_job, rollup_migration, rollup_sub_jobs,
    rollup_tasks, JobStatus, JobStatusBatch, MigrationStatus, StatusDistribution, SubJobStatus,
    TaskSnapshot, TaskStatus,
};
