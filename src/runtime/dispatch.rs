//! Resource-gated dispatch of tasks to external executors.

use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures::FutureExt;
use serde::{Deserialize, Serialize};

use crate::core::{
    Allocation, ExecutionContext, Grant, ReconcilerHandle, Resource, ResourceAllocator,
    ResourceMap, Spawn, TaskExecutor,
};
use crate::util::{JobId, TaskId};

/// A task ready to run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DispatchRequest<P> {
    /// Owning job.
    pub job_id: JobId,
    /// Task to run.
    pub task_id: TaskId,
    /// Resources the task asks for.
    pub resources: ResourceMap,
    /// Executor input.
    pub payload: P,
}

/// Result of a dispatch attempt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum DispatchOutcome {
    /// Resources were granted and the executor was spawned.
    Started {
        /// Amounts actually granted.
        granted: ResourceMap,
    },
    /// Nothing was granted; retry later.
    Deferred {
        /// Kind that had no units left.
        resource: Resource,
    },
}

/// Returns the grant to the pool when dropped.
struct GrantGuard {
    allocator: Arc<ResourceAllocator>,
    grant: Option<Grant>,
}

impl Drop for GrantGuard {
    fn drop(&mut self) {
        if let Some(grant) = self.grant.take() {
            self.allocator.release(grant);
        }
    }
}

/// Starts tasks once the allocator admits them and reports their completion
/// to the reconciler.
pub struct Dispatcher<E, S> {
    allocator: Arc<ResourceAllocator>,
    reconciler: ReconcilerHandle,
    executor: E,
    spawner: S,
}

impl<E, S> Dispatcher<E, S> {
    /// Create a dispatcher over shared collaborators.
    pub fn new(
        allocator: Arc<ResourceAllocator>,
        reconciler: ReconcilerHandle,
        executor: E,
        spawner: S,
    ) -> Self {
        Self {
            allocator,
            reconciler,
            executor,
            spawner,
        }
    }

    /// Allocator the dispatcher draws from.
    #[must_use]
    pub const fn allocator(&self) -> &Arc<ResourceAllocator> {
        &self.allocator
    }
}

impl<E, S: Spawn> Dispatcher<E, S> {
    /// Try to start a task.
    ///
    /// On a grant the executor runs detached with the granted amounts, which
    /// may be less than requested. Its resources are released exactly once
    /// when it finishes, whatever the outcome, and the owning job is queued
    /// for reconciliation. A panicking executor counts as a failed one.
    pub fn dispatch<P>(&self, request: DispatchRequest<P>) -> DispatchOutcome
    where
        P: Send + 'static,
        E: TaskExecutor<P>,
    {
        let DispatchRequest {
            job_id,
            task_id,
            resources,
            payload,
        } = request;
        let action_id = format!("task-{task_id}");

        let grant = match self.allocator.allocate(&action_id, &resources) {
            Allocation::Granted(grant) => grant,
            Allocation::Refused { resource } => {
                tracing::debug!(job_id, task_id, %resource, "dispatch deferred");
                return DispatchOutcome::Deferred { resource };
            }
        };
        let granted = grant.resources().clone();
        let ctx = ExecutionContext {
            job_id,
            task_id,
            granted: granted.clone(),
        };
        let guard = GrantGuard {
            allocator: Arc::clone(&self.allocator),
            grant: Some(grant),
        };
        let executor = self.executor.clone();
        let reconciler = self.reconciler.clone();

        tracing::info!(job_id, task_id, "task dispatched");
        self.spawner.spawn(async move {
            let result = AssertUnwindSafe(executor.execute(payload, ctx))
                .catch_unwind()
                .await;
            drop(guard);
            match result {
                Ok(Ok(())) => tracing::info!(job_id, task_id, "task finished"),
                Ok(Err(err)) => tracing::error!(job_id, task_id, error = %err, "task failed"),
                Err(_) => tracing::error!(job_id, task_id, "task executor panicked"),
            }
            if let Err(err) = reconciler.task_completed(job_id).await {
                tracing::warn!(job_id, error = %err, "completion signal dropped");
            }
        });
        DispatchOutcome::Started { granted }
    }
}
