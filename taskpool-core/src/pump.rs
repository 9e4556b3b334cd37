// taskpool-core/src/pump.rs
//! The Message Pump loop.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tracing::warn;

use crate::channel::PoolChannel;
use crate::manager::PoolManager;

/// Polls the pool-side channel with a bounded wait of `sleep_unit`, forwarding
/// whatever arrives (including the `NoMessage` sentinel) to the manager.
pub fn run(
    manager: Arc<PoolManager>,
    channel: Arc<PoolChannel>,
    sleep_unit: Duration,
    running: Arc<AtomicBool>,
) {
    while running.load(Ordering::Acquire) {
        match channel.poll(sleep_unit) {
            Ok(msg) => manager.process_message(msg),
            Err(e) => {
                warn!("message pump read error: {e}");
                std::thread::sleep(sleep_unit);
            }
        }
    }
}
