// taskpool-core/src/lock.rs
//! The cross-process advisory lock guarding the workers-side receive+ack
//! transaction.
//!
//! `flock(2)` only offers a blocking or non-blocking acquisition, not a
//! bounded wait, so `try_lock` polls the non-blocking form until either it
//! succeeds or the deadline passes, giving callers a "return `None`" timeout
//! contract instead of blocking forever.

use std::fs::{File, OpenOptions};
use std::io;
use std::os::unix::io::AsRawFd;
use std::path::Path;
use std::thread;
use std::time::{Duration, Instant};

use nix::errno::Errno;
use nix::fcntl::{flock, FlockArg};

const POLL_INTERVAL: Duration = Duration::from_millis(1);

pub struct FileLock {
    file: File,
}

impl FileLock {
    pub fn open(path: &Path) -> io::Result<Self> {
        let file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(false)
            .open(path)?;
        Ok(Self { file })
    }

    /// Attempts to acquire the lock within `bound`. Returns `Ok(None)` if the
    /// lock stayed busy for the whole bound -- the caller is expected to
    /// treat that as "skip this round", never as an error.
    pub fn try_lock(&self, bound: Duration) -> io::Result<Option<LockGuard<'_>>> {
        let deadline = Instant::now() + bound;
        loop {
            match flock(self.file.as_raw_fd(), FlockArg::LockExclusiveNonblock) {
                Ok(()) => return Ok(Some(LockGuard { file: &self.file })),
                Err(Errno::EWOULDBLOCK) => {
                    if Instant::now() >= deadline {
                        return Ok(None);
                    }
                    thread::sleep(POLL_INTERVAL);
                }
                Err(errno) => return Err(io::Error::from(errno)),
            }
        }
    }
}

pub struct LockGuard<'a> {
    file: &'a File,
}

impl Drop for LockGuard<'_> {
    fn drop(&mut self) {
        let _ = flock(self.file.as_raw_fd(), FlockArg::UnlockNonblock);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn second_nonblocking_acquire_from_same_process_succeeds_after_release() {
        // flock is per-open-file-description, not per-process, but dropping
        // the guard still releases it so a subsequent acquire from the same
        // handle succeeds.
        let dir = tempfile::tempdir().unwrap();
        let lock = FileLock::open(&dir.path().join("lock")).unwrap();
        {
            let guard = lock.try_lock(Duration::from_millis(50)).unwrap();
            assert!(guard.is_some());
        }
        let guard = lock.try_lock(Duration::from_millis(50)).unwrap();
        assert!(guard.is_some());
    }
}
