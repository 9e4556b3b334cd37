// taskpool-core/tests/dispatch.rs
//! End-to-end scenarios against the real `taskpool-worker` binary.

use std::path::PathBuf;
use std::time::{Duration, Instant};

use taskpool_common::{PoolConfig, TaskError};
use taskpool_core::Pool;

fn test_pool(workers: usize) -> Pool {
    let worker_exe = PathBuf::from(env!("CARGO_BIN_EXE_taskpool-worker"));
    let config = PoolConfig::new(workers).with_worker_exe(worker_exe);
    Pool::new(config).expect("pool should start")
}

#[test]
fn happy_path_add_returns_sum() {
    let pool = test_pool(1);
    let handle = pool.submit("add", serde_json::json!([1, 1]), serde_json::json!({}));
    assert_eq!(handle.result().unwrap(), serde_json::json!(2));
    pool.stop();
}

#[test]
fn user_panic_surfaces_as_user_error() {
    let pool = test_pool(1);
    let handle = pool.submit("panic_boom", serde_json::json!([]), serde_json::json!({}));
    match handle.result() {
        Err(TaskError::UserError { message }) => assert!(message.contains("BOOM!")),
        other => panic!("expected UserError, got {other:?}"),
    }
    pool.stop();
}

#[test]
fn non_serializable_result_surfaces_as_serialization_error() {
    let pool = test_pool(1);
    let handle = pool.submit("non_finite", serde_json::json!([]), serde_json::json!({}));
    match handle.result() {
        Err(TaskError::SerializationError { .. }) => {}
        other => panic!("expected SerializationError, got {other:?}"),
    }
    pool.stop();
}

#[test]
fn slow_task_times_out() {
    let pool = test_pool(1);
    let handle = pool.submit_with_timeout(
        "sleep_10",
        serde_json::json!([]),
        serde_json::json!({}),
        Some(Duration::from_millis(100)),
    );
    let started = Instant::now();
    let result = handle.result();
    assert!(matches!(result, Err(TaskError::Timeout)));
    assert!(started.elapsed() >= Duration::from_millis(100));
    pool.stop();
}

#[test]
fn worker_process_death_surfaces_as_process_expired() {
    let pool = test_pool(1);
    let handle = pool.submit("exit_with_code", serde_json::json!(123), serde_json::json!({}));
    match handle.result() {
        Err(TaskError::ProcessExpired { exit_code }) => assert_eq!(exit_code, 123),
        other => panic!("expected ProcessExpired, got {other:?}"),
    }
    pool.stop();
}

#[test]
fn cancel_after_start_resolves_cancelled_and_frees_the_worker() {
    let pool = test_pool(1);
    let handle = pool.submit_with_timeout(
        "sleep_10",
        serde_json::json!([]),
        serde_json::json!({}),
        None,
    );

    // Give the worker a moment to acknowledge so cancellation lands on a
    // started task, matching the Status Monitor's "already started" rule.
    std::thread::sleep(Duration::from_millis(150));
    handle.cancel();

    assert!(matches!(handle.result(), Err(TaskError::Cancelled)));

    std::thread::sleep(Duration::from_millis(300));
    assert_eq!(pool.stats().live_workers, 1);
    pool.stop();
}

#[test]
fn signal_ignoring_worker_is_still_force_killed_on_timeout() {
    let pool = test_pool(1);
    let handle = pool.submit_with_timeout(
        "ignore_sigterm_and_sleep",
        serde_json::json!([]),
        serde_json::json!({}),
        Some(Duration::from_millis(100)),
    );
    assert!(matches!(handle.result(), Err(TaskError::Timeout)));
    pool.stop();
}
