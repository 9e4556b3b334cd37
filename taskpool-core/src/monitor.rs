// taskpool-core/src/monitor.rs
//! The Status Monitor loop.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crate::manager::PoolManager;

/// Ticks every `sleep_unit`, asking the `PoolManager` to inspect tasks and
/// workers, until `running` is cleared by `Pool::stop`.
pub fn run(manager: Arc<PoolManager>, sleep_unit: Duration, running: Arc<AtomicBool>) {
    while running.load(Ordering::Acquire) {
        manager.update_status();
        std::thread::sleep(sleep_unit);
    }
}
