//! Tests for error types

use migration_scheduler::core::{Resource, SchedulerError};

#[test]
fn test_resource_exhausted_display() {
    let err = SchedulerError::ResourceExhausted {
        action_id: "task-7".into(),
        resource: Resource::TransferWorker,
    };
    assert_eq!(
        err.to_string(),
        "resource exhausted for task-7: run out of transfer_worker"
    );
}

#[test]
fn test_coordinator_errors_display() {
    assert_eq!(
        SchedulerError::SessionBusy("hive-prod".into()).to_string(),
        "hive-prod is being loaded"
    );
    assert_eq!(
        SchedulerError::SourceNotRegistered("hive-prod".into()).to_string(),
        "hive-prod has not been added"
    );
    assert_eq!(
        SchedulerError::InitializerFailed {
            source_name: "hive-prod".into(),
            reason: "permission denied".into(),
        }
        .to_string(),
        "failed to run hive-prod initializer: permission denied"
    );
}

#[test]
fn test_error_converts_into_anyhow() {
    fn fails() -> migration_scheduler::core::AppResult<()> {
        let validated: Result<(), SchedulerError> =
            Err(SchedulerError::Config("sequence.block_size must be greater than 0".into()));
        validated?;
        Ok(())
    }
    let err = fails().unwrap_err();
    assert!(err.to_string().starts_with("config invalid:"));
    assert!(err.downcast_ref::<SchedulerError>().is_some());
}

#[test]
fn test_shutdown_display() {
    assert_eq!(
        SchedulerError::Shutdown("reconciler").to_string(),
        "reconciler has shut down"
    );
}
