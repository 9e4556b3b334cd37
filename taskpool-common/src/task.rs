// taskpool-common/src/task.rs
//! Task identity.
//!
//! Object addresses aren't a usable identity here: they're unstable across
//! processes and meaningless once a task crosses the wire. A monotonically
//! increasing counter is used instead.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};

/// Stable identity for a task, unique for the lifetime of the pool that
/// allocated it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TaskId(u64);

impl TaskId {
    /// Only constructible via `TaskIdAllocator`, so a `TaskId` can never be
    /// forged from an arbitrary integer by callers outside this crate.
    fn new(value: u64) -> Self {
        TaskId(value)
    }

    pub fn as_u64(self) -> u64 {
        self.0
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "task#{}", self.0)
    }
}

/// Allocates monotonically increasing `TaskId`s. One instance lives for the
/// lifetime of a `Pool`.
#[derive(Debug, Default)]
pub struct TaskIdAllocator {
    next: AtomicU64,
}

impl TaskIdAllocator {
    pub fn new() -> Self {
        Self {
            next: AtomicU64::new(1),
        }
    }

    pub fn allocate(&self) -> TaskId {
        TaskId::new(self.next.fetch_add(1, Ordering::Relaxed))
    }
}
