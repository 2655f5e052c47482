//! Task execution and spawning abstractions.

use std::future::Future;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::core::{AppResult, ResourceMap};
use crate::util::{JobId, TaskId};

/// Abstraction for spawning detached work on a runtime.
pub trait Spawn {
    /// Spawn a future that runs to completion independently of the caller.
    fn spawn<F>(&self, fut: F)
    where
        F: Future<Output = ()> + Send + 'static;
}

/// What an executor learns about the task it is running.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionContext {
    /// Owning job.
    pub job_id: JobId,
    /// Task being executed.
    pub task_id: TaskId,
    /// Resources granted for this run; may be less than requested.
    pub granted: ResourceMap,
}

/// External executor that performs the actual migration work of one task.
///
/// Executors are opaque to the scheduler: they move schema and data, update the
/// task's phase in the store themselves, and only report success or failure.
///
/// # Example
///
/// ```rust,ignore
/// use async_trait::async_trait;
/// use migration_scheduler::core::{AppResult, ExecutionContext, TaskExecutor};
///
/// #[derive(Clone)]
/// struct CopyTableExecutor;
///
/// #[async_trait]
/// impl TaskExecutor<String> for CopyTableExecutor {
///     async fn execute(&self, table: String, ctx: ExecutionContext) -> AppResult<()> {
///         tracing::info!(task_id = ctx.task_id, %table, "copying table");
///         Ok(())
///     }
/// }
/// ```
#[async_trait]
pub trait TaskExecutor<P>: Send + Sync + Clone + 'static
where
    P: Send + 'static,
{
    /// Run the task to completion.
    ///
    /// # Errors
    ///
    /// Any error marks the run as failed; the scheduler logs it and releases the
    /// task's resources either way.
    async fn execute(&self, payload: P, ctx: ExecutionContext) -> AppResult<()>;
}
