// taskpool-common/src/config.rs
use std::env;
use std::path::PathBuf;
use std::time::Duration;

use serde_json::Value;
use tracing::debug;

/// Default cadence for the Status Monitor / Message Pump. Overridable via
/// `TASKPOOL_SLEEP_UNIT_MS` so integration tests can tighten the detection
/// loop instead of padding every timing assertion.
const DEFAULT_SLEEP_UNIT_MS: u64 = 50;

/// Construction parameters for a `Pool`.
#[derive(Debug, Clone)]
pub struct PoolConfig {
    pub workers: usize,
    pub task_limit: usize,
    pub initializer: Option<String>,
    pub initializer_args: Value,
    pub deinitializer: Option<String>,
    pub deinitializer_args: Value,
    pub sleep_unit: Duration,
    pub channel_dir: Option<PathBuf>,
    pub worker_exe: Option<PathBuf>,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            workers: num_cpus(),
            task_limit: 0,
            initializer: None,
            initializer_args: Value::Null,
            deinitializer: None,
            deinitializer_args: Value::Null,
            sleep_unit: default_sleep_unit(),
            channel_dir: None,
            worker_exe: default_worker_exe(),
        }
    }
}

impl PoolConfig {
    pub fn new(workers: usize) -> Self {
        Self {
            workers: workers.max(1),
            ..Default::default()
        }
    }

    pub fn with_task_limit(mut self, task_limit: usize) -> Self {
        self.task_limit = task_limit;
        self
    }

    pub fn with_initializer(mut self, task_fn: impl Into<String>, args: Value) -> Self {
        self.initializer = Some(task_fn.into());
        self.initializer_args = args;
        self
    }

    pub fn with_deinitializer(mut self, task_fn: impl Into<String>, args: Value) -> Self {
        self.deinitializer = Some(task_fn.into());
        self.deinitializer_args = args;
        self
    }

    pub fn with_worker_exe(mut self, path: PathBuf) -> Self {
        self.worker_exe = Some(path);
        self
    }
}

fn default_sleep_unit() -> Duration {
    let millis = env::var("TASKPOOL_SLEEP_UNIT_MS")
        .ok()
        .and_then(|v| v.parse::<u64>().ok())
        .unwrap_or(DEFAULT_SLEEP_UNIT_MS);
    debug!("Using sleep_unit of {millis}ms");
    Duration::from_millis(millis)
}

fn default_worker_exe() -> Option<PathBuf> {
    if let Ok(path) = env::var("TASKPOOL_WORKER_EXE") {
        debug!("Using worker executable from TASKPOOL_WORKER_EXE: {path}");
        return Some(PathBuf::from(path));
    }
    env::current_exe().ok().and_then(|exe| {
        let dir = exe.parent()?.to_path_buf();
        let candidate = dir.join(worker_binary_name());
        candidate.exists().then_some(candidate)
    })
}

fn worker_binary_name() -> &'static str {
    if cfg!(windows) {
        "taskpool-worker.exe"
    } else {
        "taskpool-worker"
    }
}

fn num_cpus() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1)
}

#[cfg(test)]
mod tests {
    use std::ffi::OsString;
    use std::sync::Mutex;

    use super::*;

    static ENV_LOCK: Mutex<()> = Mutex::new(());

    struct EnvVarGuard {
        key: &'static str,
        prev: Option<OsString>,
    }

    impl EnvVarGuard {
        fn set(key: &'static str, value: &str) -> Self {
            let prev = env::var_os(key);
            env::set_var(key, value);
            Self { key, prev }
        }
    }

    impl Drop for EnvVarGuard {
        fn drop(&mut self) {
            match self.prev.take() {
                Some(value) => env::set_var(self.key, value),
                None => env::remove_var(self.key),
            }
        }
    }

    #[test]
    fn default_config_has_sane_fallbacks() {
        let cfg = PoolConfig::default();
        assert!(cfg.workers >= 1);
        assert_eq!(cfg.task_limit, 0);
        assert!(cfg.initializer.is_none());
    }

    #[test]
    fn builder_methods_set_fields() {
        let cfg = PoolConfig::new(4)
            .with_task_limit(10)
            .with_initializer("init_fn", serde_json::json!([1]));
        assert_eq!(cfg.workers, 4);
        assert_eq!(cfg.task_limit, 10);
        assert_eq!(cfg.initializer.as_deref(), Some("init_fn"));
    }

    #[test]
    fn new_clamps_zero_workers_to_one() {
        let cfg = PoolConfig::new(0);
        assert_eq!(cfg.workers, 1);
    }

    #[test]
    fn sleep_unit_and_worker_exe_are_overridable_via_env() {
        let _lock = ENV_LOCK.lock().unwrap_or_else(|e| e.into_inner());
        let _sleep_guard = EnvVarGuard::set("TASKPOOL_SLEEP_UNIT_MS", "250");
        let _exe_guard = EnvVarGuard::set("TASKPOOL_WORKER_EXE", "/tmp/fake-taskpool-worker");

        let cfg = PoolConfig::default();

        assert_eq!(cfg.sleep_unit, Duration::from_millis(250));
        assert_eq!(cfg.worker_exe, Some(PathBuf::from("/tmp/fake-taskpool-worker")));
    }
}
