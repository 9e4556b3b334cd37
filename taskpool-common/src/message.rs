// taskpool-common/src/message.rs
//! Wire format for the duplex channel between the pool and its workers.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::TaskError;
use crate::task::TaskId;

/// What crosses the wire to describe a unit of work: a registered function
/// id plus its positional and keyword arguments, each transported as JSON.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Payload {
    pub task_fn: String,
    pub args: Value,
    pub kwargs: Value,
}

impl Payload {
    pub fn new(task_fn: impl Into<String>, args: Value, kwargs: Value) -> Self {
        Self {
            task_fn: task_fn.into(),
            args,
            kwargs,
        }
    }
}

/// The result of executing a `Payload`: either its JSON return value or a
/// structured `TaskError`.
pub type TaskOutcome = Result<Value, TaskError>;

/// The four message variants carried by the pool/worker channel.
///
/// Tagged externally (`serde`'s default enum representation) so a malformed
/// frame fails to deserialize as `NoMessage` by accident -- the sentinel is
/// only ever produced locally by a timed-out poll, never sent on the wire.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum ChannelMessage {
    NewTask { task_id: TaskId, payload: Payload },
    Acknowledgement { worker_pid: i32, task_id: TaskId },
    Results { task_id: TaskId, result: TaskOutcome },
    NoMessage,
}

impl ChannelMessage {
    pub fn is_no_message(&self) -> bool {
        matches!(self, ChannelMessage::NoMessage)
    }
}
