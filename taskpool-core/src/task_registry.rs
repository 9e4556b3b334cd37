// taskpool-core/src/task_registry.rs
//! Bookkeeping for in-flight tasks.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use taskpool_common::TaskId;

use crate::future::Shared;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskState {
    Pending,
    Running,
}

struct Entry {
    state: TaskState,
    started_at: Option<Instant>,
    timeout: Option<Duration>,
    worker_pid: Option<i32>,
    shared: Shared,
}

/// Tracks every task from submission through completion. Owned by
/// `PoolManager`, always accessed behind its mutex -- no internal locking of
/// its own.
#[derive(Default)]
pub struct TaskRegistry {
    entries: HashMap<TaskId, Entry>,
    timeouts: u64,
    cancellations: u64,
}

impl TaskRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, task_id: TaskId, timeout: Option<Duration>, shared: Shared) {
        self.entries.insert(
            task_id,
            Entry {
                state: TaskState::Pending,
                started_at: None,
                timeout,
                worker_pid: None,
                shared,
            },
        );
    }

    /// Marks a task running once its `Acknowledgement` arrives.
    pub fn task_start(&mut self, task_id: TaskId, worker_pid: i32) {
        if let Some(entry) = self.entries.get_mut(&task_id) {
            entry.state = TaskState::Running;
            entry.started_at = Some(Instant::now());
            entry.worker_pid = Some(worker_pid);
        }
    }

    /// Removes a task and resolves its future with its final outcome.
    pub fn task_done(&mut self, task_id: TaskId, outcome: taskpool_common::TaskOutcome) {
        if let Some(entry) = self.entries.remove(&task_id) {
            entry.shared.resolve(outcome);
        }
    }

    pub fn worker_pid_of(&self, task_id: TaskId) -> Option<i32> {
        self.entries.get(&task_id).and_then(|e| e.worker_pid)
    }

    pub fn is_cancelled(&self, task_id: TaskId) -> bool {
        self.entries
            .get(&task_id)
            .map(|e| e.shared.is_cancelled())
            .unwrap_or(false)
    }

    /// Finds running tasks whose timeout has elapsed, returning their id and
    /// owning worker pid so the caller (the Status Monitor) can stop the
    /// worker.
    pub fn find_timed_out(&self) -> Vec<(TaskId, i32)> {
        let now = Instant::now();
        self.entries
            .iter()
            .filter_map(|(id, entry)| {
                let started = entry.started_at?;
                let timeout = entry.timeout?;
                if entry.state == TaskState::Running && now.duration_since(started) >= timeout {
                    entry.worker_pid.map(|pid| (*id, pid))
                } else {
                    None
                }
            })
            .collect()
    }

    /// Finds *started* tasks whose future was cancelled by the caller.
    /// Cancellation before dispatch is the Scheduler's problem; a
    /// pending-but-cancelled entry here simply waits for its owning worker
    /// to acknowledge before the next tick can act on it.
    pub fn find_cancelled(&self) -> Vec<(TaskId, i32)> {
        self.entries
            .iter()
            .filter(|(_, entry)| entry.state == TaskState::Running && entry.shared.is_cancelled())
            .filter_map(|(id, entry)| entry.worker_pid.map(|pid| (*id, pid)))
            .collect()
    }

    pub fn fail_timed_out(&mut self, task_id: TaskId) {
        if let Some(entry) = self.entries.remove(&task_id) {
            self.timeouts += 1;
            entry.shared.resolve(Err(taskpool_common::TaskError::Timeout));
        }
    }

    pub fn fail_cancelled(&mut self, task_id: TaskId) {
        if let Some(entry) = self.entries.remove(&task_id) {
            self.cancellations += 1;
            entry
                .shared
                .resolve(Err(taskpool_common::TaskError::Cancelled));
        }
    }

    /// Fails every task owned by a worker that exited unexpectedly.
    pub fn fail_tasks_of_worker(&mut self, worker_pid: i32, exit_code: i32) {
        let ids: Vec<TaskId> = self
            .entries
            .iter()
            .filter(|(_, e)| e.worker_pid == Some(worker_pid))
            .map(|(id, _)| *id)
            .collect();
        for id in ids {
            if let Some(entry) = self.entries.remove(&id) {
                entry
                    .shared
                    .resolve(Err(taskpool_common::TaskError::ProcessExpired { exit_code }));
            }
        }
    }

    pub fn pending_ids(&self) -> Vec<TaskId> {
        self.entries
            .iter()
            .filter(|(_, e)| e.state == TaskState::Pending)
            .map(|(id, _)| *id)
            .collect()
    }

    /// `(timeouts, cancellations)` counters surfaced through `Pool::stats`.
    pub fn inspect(&self) -> (u64, u64) {
        (self.timeouts, self.cancellations)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::future::TaskHandle;

    #[test]
    fn task_done_resolves_the_future_with_the_outcome() {
        let mut registry = TaskRegistry::new();
        let (shared, handle) = TaskHandle::new_pair();
        let task_id = taskpool_common::task::TaskIdAllocator::new().allocate();
        registry.register(task_id, None, shared);

        registry.task_done(task_id, Ok(serde_json::json!(42)));

        assert_eq!(handle.result().unwrap(), serde_json::json!(42));
        assert!(registry.is_empty());
    }

    #[test]
    fn find_timed_out_only_reports_running_tasks_past_their_deadline() {
        let mut registry = TaskRegistry::new();
        let (shared, _handle) = TaskHandle::new_pair();
        let task_id = taskpool_common::task::TaskIdAllocator::new().allocate();
        registry.register(task_id, Some(Duration::from_millis(0)), shared);

        // Still pending -- not yet running, so not reported.
        assert!(registry.find_timed_out().is_empty());

        registry.task_start(task_id, 999);
        std::thread::sleep(Duration::from_millis(5));
        let timed_out = registry.find_timed_out();
        assert_eq!(timed_out, vec![(task_id, 999)]);
    }

    #[test]
    fn fail_tasks_of_worker_resolves_only_that_workers_tasks() {
        let mut registry = TaskRegistry::new();
        let (shared_a, handle_a) = TaskHandle::new_pair();
        let (shared_b, handle_b) = TaskHandle::new_pair();
        let alloc = taskpool_common::task::TaskIdAllocator::new();
        let a = alloc.allocate();
        let b = alloc.allocate();
        registry.register(a, None, shared_a);
        registry.register(b, None, shared_b);
        registry.task_start(a, 111);
        registry.task_start(b, 222);

        registry.fail_tasks_of_worker(111, 1);

        assert!(matches!(
            handle_a.result(),
            Err(taskpool_common::TaskError::ProcessExpired { exit_code: 1 })
        ));
        assert_eq!(registry.len(), 1);
        drop(handle_b);
    }
}
