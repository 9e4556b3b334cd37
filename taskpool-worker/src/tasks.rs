// taskpool-worker/src/tasks.rs
//! Task functions compiled into this binary. A real deployment registers its
//! own functions the same way, in whatever crate defines them; these are the
//! ones exercised by `taskpool-core`'s end-to-end tests.

use serde_json::Value;
use taskpool_common::{register_task, TaskError};

fn add(args: Value, _kwargs: Value) -> Result<Value, TaskError> {
    let (a, b): (i64, i64) = serde_json::from_value(args).map_err(TaskError::serialization)?;
    Ok(serde_json::json!(a + b))
}
register_task!("add", add);

fn panic_boom(_args: Value, _kwargs: Value) -> Result<Value, TaskError> {
    panic!("BOOM!");
}
register_task!("panic_boom", panic_boom);

fn non_finite(_args: Value, _kwargs: Value) -> Result<Value, TaskError> {
    // `serde_json::to_vec` rejects NaN/Infinity, so this return value cannot
    // be encoded back across the channel -- exercises the serialization
    // failure path from the worker's own sending side.
    Ok(Value::from(f64::NAN))
}
register_task!("non_finite", non_finite);

fn sleep_10(_args: Value, _kwargs: Value) -> Result<Value, TaskError> {
    std::thread::sleep(std::time::Duration::from_secs(10));
    Ok(Value::Null)
}
register_task!("sleep_10", sleep_10);

fn exit_with_code(args: Value, _kwargs: Value) -> Result<Value, TaskError> {
    let code: i32 = serde_json::from_value(args).unwrap_or(123);
    std::process::exit(code);
}
register_task!("exit_with_code", exit_with_code);

fn ignore_sigterm_and_sleep(_args: Value, _kwargs: Value) -> Result<Value, TaskError> {
    unsafe {
        let _ = nix::sys::signal::signal(nix::sys::signal::Signal::SIGTERM, nix::sys::signal::SigHandler::SigIgn);
    }
    std::thread::sleep(std::time::Duration::from_secs(10));
    Ok(Value::Null)
}
register_task!("ignore_sigterm_and_sleep", ignore_sigterm_and_sleep);
