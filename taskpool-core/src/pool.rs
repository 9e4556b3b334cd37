// taskpool-core/src/pool.rs
//! The public entry point.

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;
use std::time::Duration;

use anyhow::{anyhow, Context};
use serde_json::Value;
use taskpool_common::task::TaskIdAllocator;
use taskpool_common::{Payload, PoolConfig};
use tracing::{debug, info};

use crate::channel::{ChannelPaths, PoolChannel};
use crate::future::TaskHandle;
use crate::manager::{PoolManager, PoolStats};
use crate::submission_queue::{
    SubmissionItem, SubmissionQueueFactory, SubmissionSender, Task, UnboundedQueueFactory,
};
use crate::worker_registry::WorkerRegistry;
use crate::{monitor, pump, scheduler};

/// A running multi-process worker pool. Construct with [`Pool::new`], submit
/// work with [`Pool::submit`], and either call [`Pool::stop`] explicitly or
/// let `Drop` best-effort clean up.
pub struct Pool {
    manager: Arc<PoolManager>,
    queue_tx: SubmissionSender,
    id_alloc: TaskIdAllocator,
    running: Arc<AtomicBool>,
    threads: Mutex<Vec<JoinHandle<()>>>,
    // Keeps the temporary channel directory alive for the pool's lifetime;
    // never read, only held.
    _channel_dir: Option<tempfile::TempDir>,
}

impl Pool {
    pub fn new(config: PoolConfig) -> anyhow::Result<Self> {
        Self::with_queue_factory(config, &UnboundedQueueFactory)
    }

    pub fn with_queue_factory(
        config: PoolConfig,
        queue_factory: &dyn SubmissionQueueFactory,
    ) -> anyhow::Result<Self> {
        let (dir_path, channel_dir) = match &config.channel_dir {
            Some(path) => (path.clone(), None),
            None => {
                let dir = tempfile::tempdir().context("failed to create channel directory")?;
                let path = dir.path().to_path_buf();
                (path, Some(dir))
            }
        };

        let worker_exe = resolve_worker_exe(&config)?;

        let paths = ChannelPaths::new(&dir_path);
        let channel = Arc::new(PoolChannel::bind(paths).context("failed to bind pool channel")?);

        let worker_registry = WorkerRegistry::new(
            channel.clone(),
            worker_exe,
            config.workers,
            config.task_limit,
            config.sleep_unit,
            config.initializer.clone(),
            config.initializer_args.clone(),
            config.deinitializer.clone(),
            config.deinitializer_args.clone(),
        );
        let manager = Arc::new(PoolManager::new(worker_registry));

        let (queue_tx, queue_rx) = queue_factory.build();
        let running = Arc::new(AtomicBool::new(true));

        manager.start();
        info!(workers = config.workers, "pool started");

        let scheduler_handle = {
            let manager = manager.clone();
            std::thread::spawn(move || scheduler::run(manager, queue_rx))
        };
        let monitor_handle = {
            let manager = manager.clone();
            let running = running.clone();
            let sleep_unit = config.sleep_unit;
            std::thread::spawn(move || monitor::run(manager, sleep_unit, running))
        };
        let pump_handle = {
            let manager = manager.clone();
            let channel = channel.clone();
            let running = running.clone();
            let sleep_unit = config.sleep_unit;
            std::thread::spawn(move || pump::run(manager, channel, sleep_unit, running))
        };

        Ok(Self {
            manager,
            queue_tx,
            id_alloc: TaskIdAllocator::new(),
            running,
            threads: Mutex::new(vec![scheduler_handle, monitor_handle, pump_handle]),
            _channel_dir: channel_dir,
        })
    }

    /// Submits one task for execution.
    pub fn submit(&self, task_fn: impl Into<String>, args: Value, kwargs: Value) -> TaskHandle {
        self.submit_with_timeout(task_fn, args, kwargs, None)
    }

    pub fn submit_with_timeout(
        &self,
        task_fn: impl Into<String>,
        args: Value,
        kwargs: Value,
        timeout: Option<Duration>,
    ) -> TaskHandle {
        let task_id = self.id_alloc.allocate();
        let (shared, handle) = TaskHandle::new_pair();
        let payload = Payload::new(task_fn, args, kwargs);
        let task = Task {
            task_id,
            payload,
            timeout,
            shared: shared.clone(),
        };

        if self.queue_tx.send(SubmissionItem::Task(task)).is_err() {
            debug!(%task_id, "submission queue is gone, failing task immediately");
            shared.resolve(Err(taskpool_common::TaskError::Cancelled));
        }

        handle
    }

    pub fn stats(&self) -> PoolStats {
        self.manager.stats()
    }

    /// Stops all workers and every pool-side loop. Idempotent.
    pub fn stop(&self) {
        if self.running.swap(false, Ordering::AcqRel) {
            let _ = self.queue_tx.send(SubmissionItem::Shutdown);
            self.manager.stop();
        }

        let handles = std::mem::take(&mut *self.threads.lock().unwrap_or_else(|e| e.into_inner()));
        for handle in handles {
            let _ = handle.join();
        }
    }
}

impl Drop for Pool {
    fn drop(&mut self) {
        self.stop();
    }
}

fn resolve_worker_exe(config: &PoolConfig) -> anyhow::Result<PathBuf> {
    config.worker_exe.clone().ok_or_else(|| {
        anyhow!(
            "no taskpool-worker executable found next to the current binary; \
             set PoolConfig::worker_exe or the TASKPOOL_WORKER_EXE environment variable"
        )
    })
}
