// taskpool-core/src/manager.rs
//! The central coordinator. Owns the Task Registry and Worker Registry
//! behind one mutex, keeping every cross-registry invariant inside a single
//! critical section instead of two locks that could be observed out of
//! step.

use std::sync::Mutex;

use taskpool_common::message::ChannelMessage;
use tracing::{debug, warn};

use crate::submission_queue::Task;
use crate::task_registry::TaskRegistry;
use crate::worker_registry::WorkerRegistry;

struct State {
    tasks: TaskRegistry,
    workers: WorkerRegistry,
}

pub struct PoolManager {
    state: Mutex<State>,
}

impl PoolManager {
    pub fn new(workers: WorkerRegistry) -> Self {
        Self {
            state: Mutex::new(State {
                tasks: TaskRegistry::new(),
                workers,
            }),
        }
    }

    pub fn start(&self) {
        self.state.lock().unwrap_or_else(|e| e.into_inner()).workers.create_workers();
    }

    pub fn stop(&self) {
        self.state.lock().unwrap_or_else(|e| e.into_inner()).workers.stop_workers();
    }

    /// Registers the task, then hands it to the Worker Registry to write
    /// onto the channel. Registration happens first so any
    /// `Acknowledgement`/`Results` racing in from the Message Pump always
    /// finds an entry.
    pub fn schedule(&self, task: Task) {
        let Task {
            task_id,
            payload,
            timeout,
            shared,
        } = task;

        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        state.tasks.register(task_id, timeout, shared);

        if let Err(e) = state.workers.dispatch(task_id, payload) {
            warn!(%task_id, "failed to dispatch task onto channel: {e}");
            state
                .tasks
                .task_done(task_id, Err(taskpool_common::TaskError::serialization(e)));
        }
    }

    /// Handles one message observed by the Message Pump.
    pub fn process_message(&self, msg: ChannelMessage) {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        match msg {
            ChannelMessage::Acknowledgement { worker_pid, task_id } => {
                debug!(%task_id, worker_pid, "task acknowledged");
                state.tasks.task_start(task_id, worker_pid);
            }
            ChannelMessage::Results { task_id, result } => {
                debug!(%task_id, ok = result.is_ok(), "task results received");
                state.tasks.task_done(task_id, result);
            }
            ChannelMessage::NoMessage => {}
            ChannelMessage::NewTask { .. } => {
                // Only ever written by the pool itself onto the workers-side
                // socket; never read back on the pool-side endpoint.
            }
        }
    }

    /// `update_tasks` then `update_workers`, invoked once per Status
    /// Monitor tick.
    pub fn update_status(&self) {
        self.update_tasks();
        self.update_workers();
    }

    fn update_tasks(&self) {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());

        for (task_id, worker_pid) in state.tasks.find_timed_out() {
            warn!(%task_id, worker_pid, "task timed out, stopping worker");
            state.tasks.fail_timed_out(task_id);
            state.workers.stop_worker(worker_pid);
        }

        for (task_id, worker_pid) in state.tasks.find_cancelled() {
            debug!(%task_id, worker_pid, "task cancelled, stopping worker");
            state.tasks.fail_cancelled(task_id);
            state.workers.stop_worker(worker_pid);
        }
    }

    fn update_workers(&self) {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());

        for (worker_pid, exit_code) in state.workers.inspect_expired() {
            warn!(worker_pid, exit_code, "worker exited abnormally");
            state.tasks.fail_tasks_of_worker(worker_pid, exit_code);
        }

        state.workers.create_workers();
    }

    pub fn stats(&self) -> PoolStats {
        let state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        let (timeouts, cancellations) = state.tasks.inspect();
        PoolStats {
            live_workers: state.workers.live_count(),
            pending_tasks: state.tasks.len(),
            timeouts,
            cancellations,
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct PoolStats {
    pub live_workers: usize,
    pub pending_tasks: usize,
    pub timeouts: u64,
    pub cancellations: u64,
}
