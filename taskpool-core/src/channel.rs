// taskpool-core/src/channel.rs
//! The duplex channel between the pool process and its workers.
//!
//! Two `AF_UNIX` datagram sockets carry the traffic:
//!
//! - `to_workers` -- bound once by the pool; every worker inherits a `dup`'d
//!   copy of the same file descriptor across `exec`, so all of them drain
//!   one shared kernel queue as a single workers-side endpoint. The pool
//!   writes `NewTask` by sending a datagram to its own bound address.
//! - `from_workers` -- bound by the pool, a single reader (the Message
//!   Pump); every worker opens its own unbound socket to `send_to` it.
//!
//! `SOCK_DGRAM` preserves message boundaries, so every send/recv here is one
//! whole `ChannelMessage`, framing-free.

use std::io;
use std::os::fd::{AsRawFd, RawFd};
use std::os::unix::net::UnixDatagram;
use std::path::{Path, PathBuf};
use std::time::Duration;

use taskpool_common::message::ChannelMessage;
use taskpool_common::task::TaskId;
use taskpool_common::Payload;

use crate::lock::FileLock;

const MAX_FRAME: usize = 1 << 20;

fn encode(msg: &ChannelMessage) -> io::Result<Vec<u8>> {
    serde_json::to_vec(msg).map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))
}

fn decode(bytes: &[u8]) -> io::Result<ChannelMessage> {
    serde_json::from_slice(bytes).map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))
}

/// Filesystem paths backing one pool's channel. Lives inside a
/// `tempfile::TempDir` owned by `Pool` so two pools on the same host never
/// collide and cleanup is automatic.
#[derive(Debug, Clone)]
pub struct ChannelPaths {
    pub to_workers_sock: PathBuf,
    pub from_workers_sock: PathBuf,
    pub lock_path: PathBuf,
}

impl ChannelPaths {
    pub fn new(dir: &Path) -> Self {
        Self {
            to_workers_sock: dir.join("to_workers.sock"),
            from_workers_sock: dir.join("from_workers.sock"),
            lock_path: dir.join("workers.lock"),
        }
    }
}

/// The pool's end of the channel.
pub struct PoolChannel {
    to_workers: UnixDatagram,
    from_workers: UnixDatagram,
    paths: ChannelPaths,
}

impl PoolChannel {
    pub fn bind(paths: ChannelPaths) -> io::Result<Self> {
        let to_workers = UnixDatagram::bind(&paths.to_workers_sock)?;
        let from_workers = UnixDatagram::bind(&paths.from_workers_sock)?;
        Ok(Self {
            to_workers,
            from_workers,
            paths,
        })
    }

    pub fn paths(&self) -> &ChannelPaths {
        &self.paths
    }

    /// Raw fd every spawned worker inherits a `dup` of. Kept as a plain
    /// accessor rather than exposed mutably -- `WorkerRegistry` only ever
    /// needs to read it at spawn time.
    pub fn to_workers_raw_fd(&self) -> RawFd {
        self.to_workers.as_raw_fd()
    }

    /// Writes a `NewTask` onto the shared workers-side queue, called from
    /// `PoolManager::schedule`.
    pub fn send_new_task(&self, task_id: TaskId, payload: Payload) -> io::Result<()> {
        let msg = ChannelMessage::NewTask { task_id, payload };
        let bytes = encode(&msg)?;
        self.to_workers.send_to(&bytes, &self.paths.to_workers_sock)?;
        Ok(())
    }

    /// Polls the pool-side end with a bounded wait, returning `NoMessage` on
    /// timeout. This is the Message Pump's only suspension point.
    pub fn poll(&self, timeout: Duration) -> io::Result<ChannelMessage> {
        self.from_workers.set_read_timeout(Some(timeout))?;
        let mut buf = [0u8; MAX_FRAME];
        match self.from_workers.recv(&mut buf) {
            Ok(n) => decode(&buf[..n]),
            Err(e) if matches!(e.kind(), io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut) => {
                Ok(ChannelMessage::NoMessage)
            }
            Err(e) => Err(e),
        }
    }
}

/// The shared worker-side endpoint, reconstructed from the environment a
/// worker process is launched with (see `taskpool-worker/src/bootstrap.rs`).
pub struct WorkerChannel {
    to_workers: UnixDatagram,
    from_workers_sock: PathBuf,
    lock: FileLock,
}

impl WorkerChannel {
    /// # Safety
    /// `to_workers_fd` must be a valid, open `AF_UNIX SOCK_DGRAM` descriptor
    /// inherited from the parent pool process, not otherwise in use by this
    /// process.
    pub unsafe fn from_raw_parts(
        to_workers_fd: RawFd,
        from_workers_sock: PathBuf,
        lock_path: PathBuf,
    ) -> io::Result<Self> {
        use std::os::fd::FromRawFd;
        let to_workers = UnixDatagram::from_raw_fd(to_workers_fd);
        let lock = FileLock::open(&lock_path)?;
        Ok(Self {
            to_workers,
            from_workers_sock,
            lock,
        })
    }

    /// Acquire the shared lock, receive one `NewTask`, send the
    /// `Acknowledgement`, release. Returns `Ok(None)` when the lock stayed
    /// busy or no task arrived within `sleep_unit` -- the dispatch loop just
    /// tries again.
    pub fn recv_and_acknowledge(
        &self,
        own_pid: i32,
        sleep_unit: Duration,
    ) -> io::Result<Option<(TaskId, Payload)>> {
        let Some(_guard) = self.lock.try_lock(sleep_unit)? else {
            return Ok(None);
        };

        self.to_workers.set_read_timeout(Some(sleep_unit))?;
        let mut buf = [0u8; MAX_FRAME];
        let n = match self.to_workers.recv(&mut buf) {
            Ok(n) => n,
            Err(e) if matches!(e.kind(), io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut) => {
                return Ok(None);
            }
            Err(e) => return Err(e),
        };

        let (task_id, payload) = match decode(&buf[..n])? {
            ChannelMessage::NewTask { task_id, payload } => (task_id, payload),
            other => {
                return Err(io::Error::new(
                    io::ErrorKind::InvalidData,
                    format!("expected NewTask on the workers-side channel, got {other:?}"),
                ))
            }
        };

        self.send_acknowledgement(own_pid, task_id)?;
        Ok(Some((task_id, payload)))
    }

    fn send_acknowledgement(&self, worker_pid: i32, task_id: TaskId) -> io::Result<()> {
        let msg = ChannelMessage::Acknowledgement {
            worker_pid,
            task_id,
        };
        let bytes = encode(&msg)?;
        let sock = UnixDatagram::unbound()?;
        sock.send_to(&bytes, &self.from_workers_sock)?;
        Ok(())
    }

    /// Sends `Results` back to the pool -- outside the lock, since the
    /// pool-side endpoint has a single reader and tolerates many writers.
    pub fn send_results(
        &self,
        task_id: TaskId,
        result: taskpool_common::message::TaskOutcome,
    ) -> io::Result<()> {
        let msg = ChannelMessage::Results { task_id, result };
        let bytes = encode(&msg)?;
        let sock = UnixDatagram::unbound()?;
        sock.send_to(&bytes, &self.from_workers_sock)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pool_send_new_task_is_received_on_a_dup_of_the_shared_fd() {
        let dir = tempfile::tempdir().unwrap();
        let paths = ChannelPaths::new(dir.path());
        let pool_channel = PoolChannel::bind(paths.clone()).unwrap();

        // Stand in for fd inheritance across `exec`: dup the same fd the
        // real `WorkerRegistry` would pass down via `pre_exec`/`dup2`.
        let dup_fd = nix::unistd::dup(pool_channel.to_workers_raw_fd()).unwrap();
        let worker_channel = unsafe {
            WorkerChannel::from_raw_parts(dup_fd, paths.from_workers_sock.clone(), paths.lock_path.clone())
                .unwrap()
        };

        let alloc = taskpool_common::task::TaskIdAllocator::new();
        let task_id = alloc.allocate();
        pool_channel
            .send_new_task(task_id, Payload::new("add", serde_json::json!([1, 1]), serde_json::json!({})))
            .unwrap();

        let (got_id, payload) = worker_channel
            .recv_and_acknowledge(4242, Duration::from_millis(200))
            .unwrap()
            .expect("task should have arrived");
        assert_eq!(got_id, task_id);
        assert_eq!(payload.task_fn, "add");

        let ack = pool_channel.poll(Duration::from_millis(200)).unwrap();
        match ack {
            ChannelMessage::Acknowledgement { worker_pid, task_id: acked } => {
                assert_eq!(worker_pid, 4242);
                assert_eq!(acked, task_id);
            }
            other => panic!("expected Acknowledgement, got {other:?}"),
        }
    }

    #[test]
    fn poll_times_out_to_no_message() {
        let dir = tempfile::tempdir().unwrap();
        let paths = ChannelPaths::new(dir.path());
        let pool_channel = PoolChannel::bind(paths).unwrap();
        let msg = pool_channel.poll(Duration::from_millis(20)).unwrap();
        assert!(msg.is_no_message());
    }

    #[test]
    fn recv_and_acknowledge_times_out_to_none_with_no_task() {
        let dir = tempfile::tempdir().unwrap();
        let paths = ChannelPaths::new(dir.path());
        let pool_channel = PoolChannel::bind(paths.clone()).unwrap();
        let dup_fd = nix::unistd::dup(pool_channel.to_workers_raw_fd()).unwrap();
        let worker_channel = unsafe {
            WorkerChannel::from_raw_parts(dup_fd, paths.from_workers_sock.clone(), paths.lock_path.clone())
                .unwrap()
        };
        let got = worker_channel
            .recv_and_acknowledge(1, Duration::from_millis(20))
            .unwrap();
        assert!(got.is_none());
    }
}
