// taskpool-core/src/scheduler.rs
//! The Task Scheduler loop.

use std::sync::Arc;

use tracing::{debug, info};

use crate::manager::PoolManager;
use crate::submission_queue::{SubmissionItem, SubmissionReceiver};

/// Drains the Submission Queue until the shutdown sentinel arrives. Runs on
/// its own `std::thread::spawn` daemon, owned by `Pool`.
pub fn run(manager: Arc<PoolManager>, queue: SubmissionReceiver) {
    loop {
        let item = match queue.recv() {
            Ok(item) => item,
            Err(_) => {
                // Sender side (the `Pool`) was dropped without sending a
                // sentinel; nothing left to schedule.
                info!("submission queue disconnected, scheduler exiting");
                return;
            }
        };

        match item {
            SubmissionItem::Shutdown => {
                debug!("scheduler received shutdown sentinel");
                return;
            }
            SubmissionItem::Task(task) => {
                if task.shared.is_cancelled() {
                    debug!(task_id = %task.task_id, "dropping cancelled task before dispatch");
                    continue;
                }
                manager.schedule(task);
            }
        }
    }
}
