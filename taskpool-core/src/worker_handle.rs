// taskpool-core/src/worker_handle.rs
//! A live worker subprocess.

use std::io;
use std::os::unix::process::ExitStatusExt;
use std::process::{Child, ExitStatus};
use std::thread;
use std::time::{Duration, Instant};

use nix::sys::signal::{self, Signal};
use nix::unistd::Pid;
use tracing::{debug, warn};

/// How long a worker gets between `SIGTERM` and `SIGKILL` when stopped.
const TERMINATE_GRACE: Duration = Duration::from_millis(200);

pub struct WorkerHandle {
    pid: i32,
    child: Child,
}

impl WorkerHandle {
    pub fn spawn(child: Child) -> Self {
        let pid = child.id() as i32;
        Self { child, pid }
    }

    pub fn pid(&self) -> i32 {
        self.pid
    }

    /// Non-blocking exit check, used by `WorkerRegistry::inspect`. `Ok(None)`
    /// means still alive.
    pub fn try_exit_code(&mut self) -> io::Result<Option<i32>> {
        Ok(self.child.try_wait()?.map(exit_code_of))
    }

    /// `SIGTERM`, wait up to `TERMINATE_GRACE`, then `SIGKILL` and reap.
    pub fn terminate(&mut self) -> io::Result<()> {
        debug!(pid = self.pid, "sending SIGTERM to worker");
        if signal::kill(Pid::from_raw(self.pid), Signal::SIGTERM).is_err() {
            // Already gone; try_wait below will collect the zombie if any.
        }

        let deadline = Instant::now() + TERMINATE_GRACE;
        while Instant::now() < deadline {
            if self.child.try_wait()?.is_some() {
                return Ok(());
            }
            thread::sleep(Duration::from_millis(5));
        }

        warn!(
            pid = self.pid,
            "worker ignored SIGTERM within {:?}, sending SIGKILL", TERMINATE_GRACE
        );
        if signal::kill(Pid::from_raw(self.pid), Signal::SIGKILL).is_err() {
            // Process exited between the timeout check above and here.
        }
        self.child.wait()?;
        Ok(())
    }
}

fn exit_code_of(status: ExitStatus) -> i32 {
    status
        .code()
        .unwrap_or_else(|| 128 + status.signal().unwrap_or(0))
}
