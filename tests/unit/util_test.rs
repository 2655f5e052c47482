//! Tests for utility functions

use migration_scheduler::util::{now_ms, JobId, TaskId};

#[test]
fn test_now_ms_advances() {
    let first = now_ms();
    std::thread::sleep(std::time::Duration::from_millis(2));
    assert!(now_ms() > first);
}

#[test]
fn test_id_aliases() {
    let job: JobId = 42;
    let task: TaskId = job * 100;
    assert_eq!(task, 4_200);
}

#[test]
fn test_init_tracing_is_idempotent() {
    migration_scheduler::util::init_tracing();
    migration_scheduler::util::init_tracing();
}
