// taskpool-common/src/bootstrap.rs
//! Names shared between `taskpool-core` (which spawns workers) and
//! `taskpool-worker` (which reads its own environment at startup). Kept as
//! plain constants rather than duplicated string literals on each side.

/// Fixed fd number the shared workers-side socket is `dup2`'d onto before
/// `exec`, chosen past the three standard streams.
pub const TO_WORKERS_FD: i32 = 3;

pub const ENV_FROM_WORKERS_SOCK: &str = "TASKPOOL_FROM_WORKERS_SOCK";
pub const ENV_LOCK_PATH: &str = "TASKPOOL_LOCK_PATH";
pub const ENV_TASK_LIMIT: &str = "TASKPOOL_TASK_LIMIT";
pub const ENV_SLEEP_UNIT_MS: &str = "TASKPOOL_WORKER_SLEEP_UNIT_MS";
pub const ENV_INITIALIZER: &str = "TASKPOOL_INITIALIZER";
pub const ENV_INITIALIZER_ARGS: &str = "TASKPOOL_INITIALIZER_ARGS";
pub const ENV_DEINITIALIZER: &str = "TASKPOOL_DEINITIALIZER";
pub const ENV_DEINITIALIZER_ARGS: &str = "TASKPOOL_DEINITIALIZER_ARGS";
