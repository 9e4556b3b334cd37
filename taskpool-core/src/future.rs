// taskpool-core/src/future.rs
//! The caller-facing handle returned by `Pool::submit`.

use std::sync::{Arc, Condvar, Mutex};
use std::time::Duration;

use taskpool_common::{TaskError, TaskOutcome};

struct Inner {
    outcome: Option<TaskOutcome>,
    cancelled: bool,
    done_callbacks: Vec<Box<dyn FnOnce(&TaskOutcome) + Send>>,
}

/// The registry's side of a task's completion signal. Cloning shares the
/// same underlying state; `TaskRegistry` holds one clone per in-flight task,
/// `TaskHandle` holds the other.
#[derive(Clone)]
pub struct Shared {
    state: Arc<Mutex<Inner>>,
    condvar: Arc<Condvar>,
}

impl Shared {
    fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(Inner {
                outcome: None,
                cancelled: false,
                done_callbacks: Vec::new(),
            })),
            condvar: Arc::new(Condvar::new()),
        }
    }

    /// Resolves the task exactly once; callbacks registered via
    /// `TaskHandle::add_done_callback` run inline, on whichever thread calls
    /// this (the Message Pump or the Status Monitor).
    pub fn resolve(&self, outcome: TaskOutcome) {
        let mut inner = self.state.lock().unwrap_or_else(|e| e.into_inner());
        if inner.outcome.is_some() {
            return;
        }
        inner.outcome = Some(outcome.clone());
        let callbacks = std::mem::take(&mut inner.done_callbacks);
        drop(inner);
        for cb in callbacks {
            cb(&outcome);
        }
        self.condvar.notify_all();
    }

    pub fn is_cancelled(&self) -> bool {
        self.state.lock().unwrap_or_else(|e| e.into_inner()).cancelled
    }
}

/// Handle returned to callers of `Pool::submit`: `result`, `cancel`, `done`,
/// `add_done_callback`.
pub struct TaskHandle {
    shared: Shared,
}

impl TaskHandle {
    /// Builds a fresh `(Shared, TaskHandle)` pair; the registry keeps
    /// `Shared`, the caller keeps `TaskHandle`.
    pub fn new_pair() -> (Shared, TaskHandle) {
        let shared = Shared::new();
        (shared.clone(), TaskHandle { shared })
    }

    /// Blocks until the task resolves, returning its outcome.
    pub fn result(&self) -> TaskOutcome {
        self.result_timeout(None)
    }

    /// Blocks up to `timeout`, returning `Err(TaskError::Timeout)` if the
    /// task has not resolved by then -- distinct from the pool's own
    /// per-task timeout, this one is purely local to the caller's wait.
    pub fn result_timeout(&self, timeout: Option<Duration>) -> TaskOutcome {
        let mut inner = self
            .shared
            .state
            .lock()
            .unwrap_or_else(|e| e.into_inner());
        loop {
            if let Some(outcome) = &inner.outcome {
                return outcome.clone();
            }
            inner = match timeout {
                Some(t) => {
                    let (guard, wait_result) = self
                        .shared
                        .condvar
                        .wait_timeout(inner, t)
                        .unwrap_or_else(|e| e.into_inner());
                    if wait_result.timed_out() && guard.outcome.is_none() {
                        return Err(TaskError::Timeout);
                    }
                    guard
                }
                None => self
                    .shared
                    .condvar
                    .wait(inner)
                    .unwrap_or_else(|e| e.into_inner()),
            };
        }
    }

    /// Requests cancellation; has no effect once the task has resolved.
    /// Actual teardown (stopping the owning worker if already dispatched)
    /// happens on the Scheduler's next pass over
    /// `TaskRegistry::find_cancelled`.
    pub fn cancel(&self) {
        let mut inner = self
            .shared
            .state
            .lock()
            .unwrap_or_else(|e| e.into_inner());
        if inner.outcome.is_none() {
            inner.cancelled = true;
        }
    }

    pub fn done(&self) -> bool {
        self.shared
            .state
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .outcome
            .is_some()
    }

    /// Registers a callback invoked once, from whichever thread resolves the
    /// task. Runs immediately, inline, if the task is already done.
    pub fn add_done_callback<F>(&self, callback: F)
    where
        F: FnOnce(&TaskOutcome) + Send + 'static,
    {
        let mut inner = self
            .shared
            .state
            .lock()
            .unwrap_or_else(|e| e.into_inner());
        if let Some(outcome) = &inner.outcome {
            let outcome = outcome.clone();
            drop(inner);
            callback(&outcome);
        } else {
            inner.done_callbacks.push(Box::new(callback));
        }
    }
}
