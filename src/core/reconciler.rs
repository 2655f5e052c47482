//! Batched reconciliation of job statuses from task completion signals.
//!
//! Producers push job ids into a bounded channel through a
//! [`ReconcilerHandle`]. A single loop owns the pending set; on every tick it
//! drains the set, loads the affected tasks, rolls them up and commits the
//! resulting statuses as one batch. Each id sent is drained by exactly one
//! cycle, or re-queued when that cycle fails.

use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::{mpsc, oneshot};
use tokio::time::MissedTickBehavior;

use crate::core::{JobStatusBatch, SchedulerError, Spawn, TaskSnapshot};
use crate::util::JobId;

/// Persistence the reconciler reads tasks from and writes job statuses to.
#[async_trait]
pub trait JobStatusStore: Send + Sync {
    /// Tasks belonging to `job_ids`; an empty slice selects every job.
    ///
    /// # Errors
    ///
    /// Returns `SchedulerError::Backend` when the store is unreachable.
    async fn task_snapshots(&self, job_ids: &[JobId]) -> Result<Vec<TaskSnapshot>, SchedulerError>;

    /// Persist a batch of job statuses atomically: all or nothing.
    ///
    /// # Errors
    ///
    /// Returns `SchedulerError::Backend` when the batch was not written.
    async fn commit_job_statuses(&self, batch: &JobStatusBatch) -> Result<(), SchedulerError>;
}

/// Loop timing and buffering.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReconcileSettings {
    /// Period between cycles.
    pub interval: Duration,
    /// Bound of the signal channel.
    pub channel_capacity: usize,
    /// Reconcile every job once when the loop starts.
    pub reconcile_on_start: bool,
}

impl Default for ReconcileSettings {
    fn default() -> Self {
        Self {
            interval: Duration::from_millis(3_000),
            channel_capacity: 1_024,
            reconcile_on_start: true,
        }
    }
}

/// What one cycle did.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReconcileReport {
    /// Job ids drained from the pending set.
    pub jobs_requested: usize,
    /// Whether every job was reconciled.
    pub full_scan: bool,
    /// Task snapshots loaded.
    pub tasks_seen: usize,
    /// Job statuses committed.
    pub jobs_updated: usize,
}

enum ReconcileSignal {
    TaskCompleted(JobId),
    Flush(oneshot::Sender<Result<ReconcileReport, SchedulerError>>),
}

/// Cloneable producer side of the reconciliation loop.
///
/// The loop stops after a final cycle once every handle is dropped.
#[derive(Clone)]
pub struct ReconcilerHandle {
    tx: mpsc::Sender<ReconcileSignal>,
}

impl ReconcilerHandle {
    /// Record that a task of `job_id` changed state, waiting for channel room.
    ///
    /// # Errors
    ///
    /// Returns `SchedulerError::Shutdown` when the loop has stopped.
    pub async fn task_completed(&self, job_id: JobId) -> Result<(), SchedulerError> {
        self.tx
            .send(ReconcileSignal::TaskCompleted(job_id))
            .await
            .map_err(|_| SchedulerError::Shutdown("reconciler"))
    }

    /// Record a task state change without waiting.
    ///
    /// # Errors
    ///
    /// Returns `SchedulerError::Backend` when the channel is full and
    /// `SchedulerError::Shutdown` when the loop has stopped.
    pub fn try_task_completed(&self, job_id: JobId) -> Result<(), SchedulerError> {
        self.tx
            .try_send(ReconcileSignal::TaskCompleted(job_id))
            .map_err(|err| match err {
                mpsc::error::TrySendError::Full(_) => {
                    tracing::warn!(job_id, "reconcile queue full");
                    SchedulerError::Backend("reconcile queue full".into())
                }
                mpsc::error::TrySendError::Closed(_) => SchedulerError::Shutdown("reconciler"),
            })
    }

    /// Run a cycle now and return its report.
    ///
    /// # Errors
    ///
    /// Returns the cycle's error, or `SchedulerError::Shutdown` when the loop
    /// has stopped.
    pub async fn flush(&self) -> Result<ReconcileReport, SchedulerError> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(ReconcileSignal::Flush(reply))
            .await
            .map_err(|_| SchedulerError::Shutdown("reconciler"))?;
        rx.await.map_err(|_| SchedulerError::Shutdown("reconciler"))?
    }
}

impl std::fmt::Debug for ReconcilerHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReconcilerHandle")
            .field("closed", &self.tx.is_closed())
            .finish()
    }
}

/// Owner of the reconciliation loop.
pub struct ReconciliationScheduler {
    store: Arc<dyn JobStatusStore>,
    pending: BTreeSet<JobId>,
    full_scan: bool,
}

impl ReconciliationScheduler {
    /// Start the loop on `spawner` and return its producer handle.
    ///
    /// Must be called from within a tokio runtime; the loop uses tokio timers.
    pub fn spawn<S: Spawn>(
        store: Arc<dyn JobStatusStore>,
        settings: ReconcileSettings,
        spawner: &S,
    ) -> ReconcilerHandle {
        let (tx, rx) = mpsc::channel(settings.channel_capacity.max(1));
        let scheduler = Self {
            store,
            pending: BTreeSet::new(),
            full_scan: settings.reconcile_on_start,
        };
        spawner.spawn(scheduler.run(rx, settings.interval));
        ReconcilerHandle { tx }
    }

    async fn run(mut self, mut rx: mpsc::Receiver<ReconcileSignal>, period: Duration) {
        let mut ticker = tokio::time::interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        tracing::info!(interval_ms = period.as_millis(), "reconciler started");

        // The first tick completes immediately; it is the startup cycle.
        ticker.tick().await;
        if self.full_scan {
            let _ = self.cycle().await;
        }

        loop {
            tokio::select! {
                signal = rx.recv() => match signal {
                    Some(ReconcileSignal::TaskCompleted(job_id)) => {
                        self.pending.insert(job_id);
                    }
                    Some(ReconcileSignal::Flush(reply)) => {
                        let _ = reply.send(self.cycle().await);
                    }
                    None => {
                        let _ = self.cycle().await;
                        tracing::info!(pending = self.pending.len(), "reconciler stopped");
                        break;
                    }
                },
                _ = ticker.tick() => {
                    if !self.pending.is_empty() || self.full_scan {
                        let _ = self.cycle().await;
                    }
                }
            }
        }
    }

    async fn cycle(&mut self) -> Result<ReconcileReport, SchedulerError> {
        let ids: Vec<JobId> = std::mem::take(&mut self.pending).into_iter().collect();
        let full_scan = std::mem::take(&mut self.full_scan);
        if ids.is_empty() && !full_scan {
            return Ok(ReconcileReport::default());
        }

        let scope: &[JobId] = if full_scan { &[] } else { &ids };
        let result = self.reconcile(scope).await;
        match result {
            Ok((tasks_seen, jobs_updated)) => {
                let report = ReconcileReport {
                    jobs_requested: ids.len(),
                    full_scan,
                    tasks_seen,
                    jobs_updated,
                };
                tracing::info!(
                    jobs = report.jobs_requested,
                    full_scan,
                    tasks = tasks_seen,
                    updated = jobs_updated,
                    "reconcile cycle committed"
                );
                Ok(report)
            }
            Err(err) => {
                tracing::warn!(jobs = ids.len(), full_scan, error = %err, "reconcile cycle failed; re-queued");
                self.pending.extend(ids);
                self.full_scan |= full_scan;
                Err(err)
            }
        }
    }

    async fn reconcile(&self, job_ids: &[JobId]) -> Result<(usize, usize), SchedulerError> {
        let snapshots = self.store.task_snapshots(job_ids).await?;
        let batch = JobStatusBatch::from_tasks(&snapshots);
        if !batch.is_empty() {
            self.store.commit_job_statuses(&batch).await?;
        }
        Ok((snapshots.len(), batch.len()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_settings() {
        let settings = ReconcileSettings::default();
        assert_eq!(settings.interval, Duration::from_secs(3));
        assert_eq!(settings.channel_capacity, 1_024);
        assert!(settings.reconcile_on_start);
    }
}
