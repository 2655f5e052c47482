//! Integration tests for resource-gated dispatch.
//!
//! Covers:
//! 1. Granted tasks run with their (possibly downgraded) grant
//! 2. Exhausted resources defer the task without side effects
//! 3. Grants are returned and the job reconciled whatever the executor outcome,
//!    including a panic

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use migration_scheduler::core::{
    AppResult, ExecutionContext, JobStatus, JobStatusStore, ReconcileSettings,
    ReconciliationScheduler, Resource, ResourceAllocator, ResourceMap, TaskExecutor, TaskSnapshot,
    TaskStatus,
};
use migration_scheduler::infra::InMemoryJobStore;
use migration_scheduler::runtime::{DispatchOutcome, DispatchRequest, Dispatcher, TokioSpawner};
use parking_lot::Mutex;
use tokio::sync::Notify;

#[derive(Clone)]
enum Work {
    Succeed,
    Fail,
    Panic,
    WaitFor(Arc<Notify>),
}

/// Executor that marks its task done in the store on success, like a real
/// executor would.
#[derive(Clone)]
struct StoreExecutor {
    store: Arc<InMemoryJobStore>,
    seen: Arc<Mutex<Vec<ExecutionContext>>>,
}

#[async_trait]
impl TaskExecutor<Work> for StoreExecutor {
    async fn execute(&self, work: Work, ctx: ExecutionContext) -> AppResult<()> {
        self.seen.lock().push(ctx.clone());
        match work {
            Work::Succeed => {}
            Work::Fail => {
                self.store.set_task_status(ctx.task_id, TaskStatus::DataFailed);
                anyhow::bail!("copy of task {} failed", ctx.task_id);
            }
            Work::Panic => {
                self.store.set_task_status(ctx.task_id, TaskStatus::DataDoing);
                panic!("executor crashed");
            }
            Work::WaitFor(gate) => gate.notified().await,
        }
        self.store.set_task_status(ctx.task_id, TaskStatus::Done);
        Ok(())
    }
}

struct Harness {
    store: Arc<InMemoryJobStore>,
    allocator: Arc<ResourceAllocator>,
    executor: StoreExecutor,
    dispatcher: Dispatcher<StoreExecutor, TokioSpawner>,
    reconciler: migration_scheduler::core::ReconcilerHandle,
}

fn harness() -> Harness {
    let store = Arc::new(InMemoryJobStore::new());
    for task_id in 1..=3 {
        store.upsert_task(TaskSnapshot {
            task_id,
            job_id: 100,
            status: TaskStatus::Init,
            stopped: false,
        });
    }
    let spawner = TokioSpawner::current();
    let reconciler = ReconciliationScheduler::spawn(
        Arc::clone(&store) as Arc<dyn JobStatusStore>,
        ReconcileSettings {
            interval: Duration::from_secs(3_600),
            channel_capacity: 16,
            reconcile_on_start: false,
        },
        &spawner,
    );
    let allocator = Arc::new(ResourceAllocator::default());
    let executor = StoreExecutor {
        store: Arc::clone(&store),
        seen: Arc::new(Mutex::new(Vec::new())),
    };
    let dispatcher = Dispatcher::new(
        Arc::clone(&allocator),
        reconciler.clone(),
        executor.clone(),
        spawner,
    );
    Harness {
        store,
        allocator,
        executor,
        dispatcher,
        reconciler,
    }
}

fn request(task_id: u64, work: Work, resources: &[(Resource, u64)]) -> DispatchRequest<Work> {
    DispatchRequest {
        job_id: 100,
        task_id,
        resources: resources.iter().copied().collect::<ResourceMap>(),
        payload: work,
    }
}

async fn wait_for_full_pool(allocator: &ResourceAllocator) {
    for _ in 0..300 {
        let stats = allocator.snapshot();
        if stats.available == stats.capacity {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("grants were not returned");
}

#[tokio::test]
async fn test_downgraded_grant_reaches_executor() {
    let h = harness();
    let outcome = h.dispatcher.dispatch(request(
        1,
        Work::Succeed,
        &[(Resource::TransferJob, 1), (Resource::TransferWorker, 40)],
    ));

    let DispatchOutcome::Started { granted } = outcome else {
        panic!("dispatch should start");
    };
    assert_eq!(granted[&Resource::TransferWorker], 25);

    wait_for_full_pool(&h.allocator).await;
    let seen = h.executor.seen.lock().clone();
    assert_eq!(seen.len(), 1);
    assert_eq!(seen[0].granted, granted);
}

#[tokio::test]
async fn test_exhausted_pool_defers() {
    let h = harness();
    h.allocator.update(Resource::TransferJob, 1);
    let gate = Arc::new(Notify::new());

    let first = h.dispatcher.dispatch(request(
        1,
        Work::WaitFor(Arc::clone(&gate)),
        &[(Resource::TransferJob, 1)],
    ));
    assert!(matches!(first, DispatchOutcome::Started { .. }));

    let second = h
        .dispatcher
        .dispatch(request(2, Work::Succeed, &[(Resource::TransferJob, 1)]));
    assert_eq!(
        second,
        DispatchOutcome::Deferred {
            resource: Resource::TransferJob
        }
    );

    gate.notify_one();
    wait_for_full_pool(&h.allocator).await;
    assert!(matches!(
        h.dispatcher
            .dispatch(request(2, Work::Succeed, &[(Resource::TransferJob, 1)])),
        DispatchOutcome::Started { .. }
    ));
    wait_for_full_pool(&h.allocator).await;
}

#[tokio::test]
async fn test_failed_and_panicking_executors_release() {
    let h = harness();
    h.dispatcher
        .dispatch(request(1, Work::Fail, &[(Resource::TransferWorker, 5)]));
    h.dispatcher
        .dispatch(request(2, Work::Panic, &[(Resource::TransferWorker, 5)]));
    h.dispatcher
        .dispatch(request(3, Work::Succeed, &[(Resource::TransferWorker, 5)]));

    wait_for_full_pool(&h.allocator).await;
    assert_eq!(h.allocator.available(Resource::TransferWorker), 25);
}

#[tokio::test]
async fn test_panicking_executor_still_queues_job() {
    let h = harness();
    h.dispatcher
        .dispatch(request(2, Work::Panic, &[(Resource::TransferWorker, 5)]));
    wait_for_full_pool(&h.allocator).await;

    // The signal follows the release, so it may land after the pool refills.
    for _ in 0..300 {
        let report = h.reconciler.flush().await.unwrap();
        if report.jobs_requested == 1 {
            assert_eq!(report.jobs_updated, 1);
            assert_eq!(h.store.job_status(100), Some(JobStatus::Doing));
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("job of the panicking task was never queued");
}

#[tokio::test]
async fn test_completion_reconciles_job() {
    let h = harness();
    for task_id in 1..=3 {
        h.dispatcher
            .dispatch(request(task_id, Work::Succeed, &[(Resource::TransferJob, 1)]));
    }
    wait_for_full_pool(&h.allocator).await;

    // Completion signals are sent after the grant is returned.
    for _ in 0..300 {
        h.reconciler.flush().await.unwrap();
        if h.store.job_status(100) == Some(JobStatus::Done) {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("job was never reconciled to DONE");
}
