// taskpool-worker/src/main.rs
//! The worker binary: parses its bootstrap environment, ignores `SIGINT`,
//! then runs the receive-acknowledge-execute-reply dispatch loop.

mod tasks;

use std::any::Any;
use std::env;
use std::path::PathBuf;
use std::time::Duration;

use serde_json::Value;
use taskpool_common::{bootstrap, registry, Payload, TaskError, TaskOutcome};
use taskpool_core::channel::WorkerChannel;
use tracing::{debug, error, info, warn};
use tracing_subscriber::EnvFilter;

fn main() {
    init_logging();
    ignore_sigint();

    let own_pid = std::process::id() as i32;
    let from_workers_sock = PathBuf::from(required_env(bootstrap::ENV_FROM_WORKERS_SOCK));
    let lock_path = PathBuf::from(required_env(bootstrap::ENV_LOCK_PATH));
    let task_limit: usize = env::var(bootstrap::ENV_TASK_LIMIT)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(0);
    let sleep_unit = Duration::from_millis(
        env::var(bootstrap::ENV_SLEEP_UNIT_MS)
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(50),
    );

    // Safety: `TO_WORKERS_FD` is the fixed fd the parent pool process
    // `dup2`'d its bound socket onto before `exec`ing this binary.
    let channel = match unsafe {
        WorkerChannel::from_raw_parts(bootstrap::TO_WORKERS_FD, from_workers_sock, lock_path)
    } {
        Ok(channel) => channel,
        Err(e) => {
            error!("failed to reconstruct worker channel from inherited fd: {e}");
            std::process::exit(1);
        }
    };

    info!(pid = own_pid, task_limit, "worker dispatch loop starting");

    if let Ok(name) = env::var(bootstrap::ENV_INITIALIZER) {
        let args = env_args(bootstrap::ENV_INITIALIZER_ARGS);
        if !run_hook(&name, args) {
            warn!(name, "initializer failed, exiting so the pool can respawn");
            std::process::exit(0);
        }
    }

    let mut executed = 0usize;
    loop {
        if task_limit != 0 && executed >= task_limit {
            break;
        }

        let (task_id, payload) = match channel.recv_and_acknowledge(own_pid, sleep_unit) {
            Ok(Some(pair)) => pair,
            Ok(None) => continue,
            Err(e) => {
                error!("channel I/O error while waiting for a task: {e}");
                std::process::exit(1);
            }
        };

        let outcome = execute(&payload);
        debug!(%task_id, ok = outcome.is_ok(), "task executed");

        if let Err(e) = channel.send_results(task_id, outcome.clone()) {
            warn!(%task_id, "failed to send results, retrying as a serialization error: {e}");
            if let Err(e2) = channel.send_results(task_id, Err(TaskError::serialization(e))) {
                error!(%task_id, "channel I/O error sending results: {e2}");
                std::process::exit(1);
            }
        }

        executed += 1;
    }

    if let Ok(name) = env::var(bootstrap::ENV_DEINITIALIZER) {
        let args = env_args(bootstrap::ENV_DEINITIALIZER_ARGS);
        run_hook(&name, args);
    }

    info!(pid = own_pid, executed, "worker exiting after task limit reached");
}

/// Runs a registered initializer/deinitializer, catching panics the same way
/// as a regular task. Returns whether it succeeded.
fn run_hook(name: &str, args: Value) -> bool {
    match registry::lookup(name) {
        None => {
            warn!(name, "hook function is not registered");
            false
        }
        Some(f) => {
            match std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
                f(args, Value::Null)
            })) {
                Ok(Ok(_)) => true,
                Ok(Err(e)) => {
                    warn!(name, "hook returned an error: {e}");
                    false
                }
                Err(panic_payload) => {
                    warn!(name, "hook panicked: {}", panic_message(&panic_payload));
                    false
                }
            }
        }
    }
}

fn execute(payload: &Payload) -> TaskOutcome {
    let Some(f) = registry::lookup(&payload.task_fn) else {
        return Err(TaskError::UnknownTaskFn(payload.task_fn.clone()));
    };

    match std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
        f(payload.args.clone(), payload.kwargs.clone())
    })) {
        Ok(result) => result,
        Err(panic_payload) => Err(TaskError::user(panic_message(&panic_payload))),
    }
}

fn panic_message(payload: &Box<dyn Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "worker task panicked with a non-string payload".to_string()
    }
}

fn env_args(var: &str) -> Value {
    env::var(var)
        .ok()
        .and_then(|raw| serde_json::from_str(&raw).ok())
        .unwrap_or(Value::Null)
}

fn required_env(var: &str) -> String {
    env::var(var).unwrap_or_else(|_| {
        eprintln!("taskpool-worker: missing required environment variable {var}");
        std::process::exit(1);
    })
}

fn ignore_sigint() {
    // Safety: installing a signal disposition at startup, before any other
    // threads exist, with a plain `SigIgn` handler.
    unsafe {
        let _ = nix::sys::signal::signal(
            nix::sys::signal::Signal::SIGINT,
            nix::sys::signal::SigHandler::SigIgn,
        );
    }
}

fn init_logging() {
    let env_filter = EnvFilter::builder()
        .with_default_directive(tracing::Level::INFO.into())
        .with_env_var("TASKPOOL_WORKER_LOG")
        .from_env_lossy();

    let _ = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr)
        .with_ansi(false)
        .without_time()
        .try_init();
}
