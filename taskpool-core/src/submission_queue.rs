// taskpool-core/src/submission_queue.rs
//! The ingress FIFO between `Pool::submit` and the Scheduler thread.

use std::time::Duration;

use taskpool_common::{Payload, TaskId};

use crate::future::Shared;

/// One submitted unit of work, already carrying the `Shared` half of its
/// future -- the Scheduler never constructs futures, it only forwards them.
pub struct Task {
    pub task_id: TaskId,
    pub payload: Payload,
    pub timeout: Option<Duration>,
    pub shared: Shared,
}

/// What travels through the queue: a live task, or the sentinel that tells
/// the Scheduler to stop.
pub enum SubmissionItem {
    Task(Task),
    Shutdown,
}

/// Pluggable queue construction, so a caller can swap in a bounded or
/// priority-ordered queue without touching the Scheduler. The default is an
/// unbounded `crossbeam_channel`, the crate already used elsewhere in this
/// pool for cross-thread work handoff.
pub trait SubmissionQueueFactory: Send + Sync {
    fn build(&self) -> (SubmissionSender, SubmissionReceiver);
}

#[derive(Clone)]
pub struct SubmissionSender(crossbeam_channel::Sender<SubmissionItem>);

pub struct SubmissionReceiver(crossbeam_channel::Receiver<SubmissionItem>);

impl SubmissionSender {
    pub fn send(&self, item: SubmissionItem) -> Result<(), crossbeam_channel::SendError<SubmissionItem>> {
        self.0.send(item)
    }
}

impl SubmissionReceiver {
    /// Blocks until an item is available -- the Scheduler's only suspension
    /// point.
    pub fn recv(&self) -> Result<SubmissionItem, crossbeam_channel::RecvError> {
        self.0.recv()
    }
}

pub struct UnboundedQueueFactory;

impl SubmissionQueueFactory for UnboundedQueueFactory {
    fn build(&self) -> (SubmissionSender, SubmissionReceiver) {
        let (tx, rx) = crossbeam_channel::unbounded();
        (SubmissionSender(tx), SubmissionReceiver(rx))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::future::TaskHandle;

    #[test]
    fn items_are_delivered_fifo() {
        let (tx, rx) = UnboundedQueueFactory.build();
        let (shared_a, _handle_a) = TaskHandle::new_pair();
        let (shared_b, _handle_b) = TaskHandle::new_pair();
        let alloc = taskpool_common::task::TaskIdAllocator::new();

        tx.send(SubmissionItem::Task(Task {
            task_id: alloc.allocate(),
            payload: Payload::new("a", serde_json::json!([]), serde_json::json!({})),
            timeout: None,
            shared: shared_a,
        }))
        .unwrap();
        tx.send(SubmissionItem::Task(Task {
            task_id: alloc.allocate(),
            payload: Payload::new("b", serde_json::json!([]), serde_json::json!({})),
            timeout: None,
            shared: shared_b,
        }))
        .unwrap();

        match rx.recv().unwrap() {
            SubmissionItem::Task(t) => assert_eq!(t.payload.task_fn, "a"),
            SubmissionItem::Shutdown => panic!("unexpected shutdown"),
        }
        match rx.recv().unwrap() {
            SubmissionItem::Task(t) => assert_eq!(t.payload.task_fn, "b"),
            SubmissionItem::Shutdown => panic!("unexpected shutdown"),
        }
    }

    #[test]
    fn shutdown_sentinel_is_delivered() {
        let (tx, rx) = UnboundedQueueFactory.build();
        tx.send(SubmissionItem::Shutdown).unwrap();
        assert!(matches!(rx.recv().unwrap(), SubmissionItem::Shutdown));
    }
}
