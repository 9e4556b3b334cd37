// taskpool-core/src/worker_registry.rs
//! Owns the live worker subprocesses.

use std::collections::HashMap;
use std::io;
use std::os::unix::process::CommandExt;
use std::process::Command;
use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use taskpool_common::bootstrap;
use tracing::{debug, error, warn};

use crate::channel::PoolChannel;
use crate::worker_handle::WorkerHandle;

pub struct WorkerRegistry {
    workers: HashMap<i32, WorkerHandle>,
    channel: Arc<PoolChannel>,
    worker_exe: std::path::PathBuf,
    target_count: usize,
    task_limit: usize,
    sleep_unit: Duration,
    initializer: Option<String>,
    initializer_args: Value,
    deinitializer: Option<String>,
    deinitializer_args: Value,
}

impl WorkerRegistry {
    pub fn new(
        channel: Arc<PoolChannel>,
        worker_exe: std::path::PathBuf,
        target_count: usize,
        task_limit: usize,
        sleep_unit: Duration,
        initializer: Option<String>,
        initializer_args: Value,
        deinitializer: Option<String>,
        deinitializer_args: Value,
    ) -> Self {
        Self {
            workers: HashMap::new(),
            channel,
            worker_exe,
            target_count,
            task_limit,
            sleep_unit,
            initializer,
            initializer_args,
            deinitializer,
            deinitializer_args,
        }
    }

    pub fn live_count(&self) -> usize {
        self.workers.len()
    }

    /// Spawn enough workers to reach `target_count`.
    pub fn create_workers(&mut self) {
        let missing = self.target_count.saturating_sub(self.workers.len());
        for _ in 0..missing {
            match self.spawn_one() {
                Ok(handle) => {
                    debug!(pid = handle.pid(), "spawned worker");
                    self.workers.insert(handle.pid(), handle);
                }
                Err(e) => {
                    error!("failed to spawn worker: {e}");
                }
            }
        }
    }

    fn spawn_one(&self) -> io::Result<WorkerHandle> {
        let mut command = Command::new(&self.worker_exe);
        command
            .env(
                bootstrap::ENV_FROM_WORKERS_SOCK,
                &self.channel.paths().from_workers_sock,
            )
            .env(bootstrap::ENV_LOCK_PATH, &self.channel.paths().lock_path)
            .env(bootstrap::ENV_TASK_LIMIT, self.task_limit.to_string())
            .env(
                bootstrap::ENV_SLEEP_UNIT_MS,
                self.sleep_unit.as_millis().to_string(),
            );

        if let Some(name) = &self.initializer {
            command.env(bootstrap::ENV_INITIALIZER, name);
            command.env(
                bootstrap::ENV_INITIALIZER_ARGS,
                self.initializer_args.to_string(),
            );
        }
        if let Some(name) = &self.deinitializer {
            command.env(bootstrap::ENV_DEINITIALIZER, name);
            command.env(
                bootstrap::ENV_DEINITIALIZER_ARGS,
                self.deinitializer_args.to_string(),
            );
        }

        let to_workers_fd = self.channel.to_workers_raw_fd();
        // Safety: `pre_exec` runs after `fork` but before `exec`, single
        // threaded in the child, so duplicating a raw fd here is sound; the
        // closure only calls async-signal-safe syscalls.
        unsafe {
            command.pre_exec(move || {
                nix::unistd::dup2(to_workers_fd, bootstrap::TO_WORKERS_FD)
                    .map(|_| ())
                    .map_err(io::Error::from)
            });
        }

        let child = command.spawn()?;
        Ok(WorkerHandle::spawn(child))
    }

    /// Hands a `NewTask` to the shared workers-side channel, called from
    /// `PoolManager::schedule`.
    pub fn dispatch(
        &self,
        task_id: taskpool_common::TaskId,
        payload: taskpool_common::Payload,
    ) -> io::Result<()> {
        self.channel.send_new_task(task_id, payload)
    }

    /// Collects workers that have exited with a non-success code, removing
    /// them from the registry either way.
    pub fn inspect_expired(&mut self) -> Vec<(i32, i32)> {
        let mut expired = Vec::new();
        let exited_pids: Vec<i32> = self
            .workers
            .iter_mut()
            .filter_map(|(pid, handle)| match handle.try_exit_code() {
                Ok(Some(code)) => Some((*pid, Some(code))),
                Ok(None) => None,
                Err(e) => {
                    warn!(pid, "failed to poll worker exit status: {e}");
                    None
                }
            })
            .map(|(pid, code)| {
                if let Some(code) = code {
                    if code != 0 {
                        expired.push((pid, code));
                    }
                }
                pid
            })
            .collect();

        for pid in exited_pids {
            self.workers.remove(&pid);
        }
        expired
    }

    pub fn stop_workers(&mut self) {
        let pids: Vec<i32> = self.workers.keys().copied().collect();
        for pid in pids {
            self.stop_worker(pid);
        }
    }

    /// Attempts to stop a single worker; a no-op if it is already gone.
    /// Lock acquisition itself is the channel's problem
    /// (`WorkerChannel::recv_and_acknowledge` holds it only for the
    /// receive+ack transaction); here we just send the signal and reap,
    /// bounded by `WorkerHandle::terminate`'s own grace period.
    pub fn stop_worker(&mut self, pid: i32) {
        if let Some(mut handle) = self.workers.remove(&pid) {
            if let Err(e) = handle.terminate() {
                warn!(pid, "error stopping worker: {e}");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channel::ChannelPaths;

    /// A registry whose `worker_exe` is never actually spawned by these
    /// tests -- they exercise `inspect_expired`'s bookkeeping against real
    /// `sh` subprocesses inserted directly, standing in for a fake
    /// `waitpid`.
    fn fake_registry() -> WorkerRegistry {
        let dir = tempfile::tempdir().unwrap();
        let paths = ChannelPaths::new(dir.path());
        let channel = Arc::new(PoolChannel::bind(paths).unwrap());
        WorkerRegistry::new(
            channel,
            std::path::PathBuf::from("/nonexistent-taskpool-worker"),
            0,
            0,
            Duration::from_millis(10),
            None,
            Value::Null,
            None,
            Value::Null,
        )
    }

    #[test]
    fn inspect_expired_reports_and_removes_nonzero_exits() {
        let mut registry = fake_registry();
        let child = Command::new("sh").args(["-c", "exit 7"]).spawn().unwrap();
        let handle = WorkerHandle::spawn(child);
        let pid = handle.pid();
        registry.workers.insert(pid, handle);

        std::thread::sleep(Duration::from_millis(50));

        let expired = registry.inspect_expired();
        assert_eq!(expired, vec![(pid, 7)]);
        assert_eq!(registry.live_count(), 0);
    }

    #[test]
    fn inspect_expired_removes_clean_exits_without_reporting() {
        let mut registry = fake_registry();
        let child = Command::new("sh").args(["-c", "exit 0"]).spawn().unwrap();
        let handle = WorkerHandle::spawn(child);
        let pid = handle.pid();
        registry.workers.insert(pid, handle);

        std::thread::sleep(Duration::from_millis(50));

        let expired = registry.inspect_expired();
        assert!(expired.is_empty());
        assert_eq!(registry.live_count(), 0);
    }

    #[test]
    fn create_workers_tops_up_to_target_even_on_spawn_failure() {
        let mut registry = fake_registry();
        registry.target_count = 2;
        // worker_exe does not exist, so both spawn attempts fail and are
        // logged -- the registry simply stays empty rather than panicking.
        registry.create_workers();
        assert_eq!(registry.live_count(), 0);
    }
}
