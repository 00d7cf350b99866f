//! Point-to-point transport used by the tree reduction.

use crate::error::Result;
use std::time::Duration;

/// Blocking point-to-point messaging within a fixed process group.
///
/// Messages are FIFO per (sender, receiver, tag). `rank()` and `size()` never
/// change for the lifetime of the transport.
pub trait Transport {
    /// Rank of the calling process, in `0..size()`.
    fn rank(&self) -> usize;

    /// Number of processes in the group.
    fn size(&self) -> usize;

    /// Send `payload` to `dest` under `tag`.
    fn send(&self, dest: usize, tag: i32, payload: &[u8]) -> Result<()>;

    /// Send `payload` to `dest` under `tag`, withdrawing it if the receiver has
    /// not taken it once `timeout` passes.
    ///
    /// Returns `Ok(false)` when the message was withdrawn. Backends whose sends
    /// never wait for the receiver deliver immediately and return `Ok(true)`.
    fn send_within(
        &self,
        dest: usize,
        tag: i32,
        payload: &[u8],
        timeout: Option<Duration>,
    ) -> Result<bool> {
        let _ = timeout;
        self.send(dest, tag, payload).map(|()| true)
    }

    /// Receive the next message from `source` under `tag`.
    ///
    /// With `timeout == None` this blocks until the message arrives. With a
    /// deadline it returns `Ok(None)` once the deadline passes without a
    /// matching message; a message that arrives later stays queued under its
    /// own tag.
    fn recv(&self, source: usize, tag: i32, timeout: Option<Duration>) -> Result<Option<Vec<u8>>>;

    /// Tear down the whole group with `code`.
    ///
    /// Backends that can terminate every process (MPI) do not return.
    fn abort(&self, code: i32) -> Result<()>;
}

impl<T: Transport + ?Sized> Transport for &T {
    fn rank(&self) -> usize {
        (**self).rank()
    }

    fn size(&self) -> usize {
        (**self).size()
    }

    fn send(&self, dest: usize, tag: i32, payload: &[u8]) -> Result<()> {
        (**self).send(dest, tag, payload)
    }

    fn send_within(
        &self,
        dest: usize,
        tag: i32,
        payload: &[u8],
        timeout: Option<Duration>,
    ) -> Result<bool> {
        (**self).send_within(dest, tag, payload, timeout)
    }

    fn recv(&self, source: usize, tag: i32, timeout: Option<Duration>) -> Result<Option<Vec<u8>>> {
        (**self).recv(source, tag, timeout)
    }

    fn abort(&self, code: i32) -> Result<()> {
        (**self).abort(code)
    }
}
