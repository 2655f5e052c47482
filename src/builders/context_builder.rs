//! Build the orchestration context from configuration.

use std::sync::Arc;

use crate::config::{OrchestratorConfig, SourceConfig};
use crate::core::{
    DataSourceCoordinator, DurableCounter, JobStatusStore, MetaLoader, ReconcilerHandle,
    ReconciliationScheduler, ResourceAllocator, SchedulerError, SequenceAllocator,
    SourceRegistration, Spawn,
};
use crate::runtime::Dispatcher;

/// Durable counter key of the job id sequence.
pub const JOB_SEQUENCE: &str = "job";
/// Durable counter key of the task id sequence.
pub const TASK_SEQUENCE: &str = "task";

/// Every shared component of the orchestration core, owned by the entry point.
pub struct OrchestratorContext<S> {
    /// Resource pool consulted before each dispatch.
    pub allocator: Arc<ResourceAllocator>,
    /// Job id sequence.
    pub job_ids: Arc<SequenceAllocator>,
    /// Task id sequence.
    pub task_ids: Arc<SequenceAllocator>,
    /// Metadata load coordinator.
    pub coordinator: Arc<DataSourceCoordinator<S>>,
    /// Producer side of the reconciliation loop.
    pub reconciler: ReconcilerHandle,
    /// Spawner shared by every component.
    pub spawner: S,
}

impl<S: Spawn + Clone> OrchestratorContext<S> {
    /// Dispatcher that runs tasks with `executor`.
    pub fn dispatcher<E>(&self, executor: E) -> Dispatcher<E, S> {
        Dispatcher::new(
            Arc::clone(&self.allocator),
            self.reconciler.clone(),
            executor,
            self.spawner.clone(),
        )
    }
}

/// Build the context from a config and injected collaborators.
///
/// `loader_factory` is called once per configured source to pick the loader
/// for its kind. The reconciliation loop is started on `spawner`, so this must
/// run inside a tokio runtime.
///
/// # Errors
///
/// Returns `SchedulerError::Config` when the config is invalid, or whatever
/// `loader_factory` returns.
pub fn build_context<S, F>(
    cfg: &OrchestratorConfig,
    counter: Arc<dyn DurableCounter>,
    store: Arc<dyn JobStatusStore>,
    mut loader_factory: F,
    spawner: S,
) -> Result<OrchestratorContext<S>, SchedulerError>
where
    S: Spawn + Clone,
    F: FnMut(&SourceConfig) -> Result<Arc<dyn MetaLoader>, SchedulerError>,
{
    cfg.validate().map_err(SchedulerError::Config)?;

    let allocator = Arc::new(ResourceAllocator::new(cfg.capacities()));
    let job_ids = Arc::new(SequenceAllocator::new(
        JOB_SEQUENCE,
        cfg.sequence.block_size,
        Arc::clone(&counter),
    )?);
    let task_ids = Arc::new(SequenceAllocator::new(
        TASK_SEQUENCE,
        cfg.sequence.block_size,
        counter,
    )?);

    let coordinator = Arc::new(DataSourceCoordinator::new(spawner.clone()));
    for source in &cfg.sources {
        let loader = loader_factory(source)?;
        let mut registration = SourceRegistration::new(loader).with_filter(source.filter.clone());
        if let Some(parallelism) = source.parallelism {
            registration = registration.with_parallelism(parallelism);
        }
        coordinator.register_source(source.name.clone(), registration);
    }

    let reconciler = ReconciliationScheduler::spawn(store, cfg.reconcile.settings(), &spawner);
    tracing::info!(
        sources = cfg.sources.len(),
        block_size = cfg.sequence.block_size,
        "orchestrator context built"
    );

    Ok(OrchestratorContext {
        allocator,
        job_ids,
        task_ids,
        coordinator,
        reconciler,
        spawner,
    })
}
