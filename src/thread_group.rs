//! In-process process group: one OS thread per rank.
//!
//! Each rank owns a single inbox fed by every other rank. A crossbeam channel
//! preserves per-sender order, so messages are FIFO per (sender, receiver, tag);
//! frames that arrive for a different (source, tag) than the one being waited
//! on are parked until asked for.
//!
//! # Example
//!
//! ```
//! use treeduce::thread_group;
//! use treeduce::Transport;
//!
//! let ranks = thread_group::run(3, |ep| ep.rank() * 10).unwrap();
//! assert_eq!(ranks, vec![0, 10, 20]);
//! ```

use crate::error::{Error, Result};
use crate::transport::Transport;
use crossbeam_channel::{unbounded, Receiver, RecvTimeoutError, Sender};
use std::cell::{Cell, RefCell};
use std::collections::{HashMap, VecDeque};
use std::thread;
use std::time::{Duration, Instant};
use tracing::trace;

enum Frame {
    Message {
        source: usize,
        tag: i32,
        bytes: Vec<u8>,
    },
    Abort {
        source: usize,
        code: i32,
    },
}

/// One rank's view of an in-process group.
pub struct ThreadEndpoint {
    rank: usize,
    size: usize,
    /// Senders into every other rank's inbox; `None` at our own rank
    peers: Vec<Option<Sender<Frame>>>,
    inbox: Receiver<Frame>,
    parked: RefCell<HashMap<(usize, i32), VecDeque<Vec<u8>>>>,
    aborted: Cell<Option<(usize, i32)>>,
}

/// Create connected endpoints for a group of `size` ranks.
///
/// The inbox of a rank disconnects once every other endpoint is dropped, so a
/// receive whose partner has exited reports [`Error::Disconnected`] instead of
/// blocking forever.
pub fn endpoints(size: usize) -> Result<Vec<ThreadEndpoint>> {
    if size == 0 {
        return Err(Error::EmptyGroup);
    }
    let (senders, receivers): (Vec<_>, Vec<_>) = (0..size).map(|_| unbounded()).unzip();

    Ok(receivers
        .into_iter()
        .enumerate()
        .map(|(rank, inbox)| ThreadEndpoint {
            rank,
            size,
            peers: senders
                .iter()
                .enumerate()
                .map(|(peer, tx)| (peer != rank).then(|| tx.clone()))
                .collect(),
            inbox,
            parked: RefCell::new(HashMap::new()),
            aborted: Cell::new(None),
        })
        .collect())
}

/// Run `f` once per rank on its own thread and collect the results in rank order.
///
/// Returns an error if a rank thread cannot be spawned or panics.
pub fn run<F, T>(size: usize, f: F) -> Result<Vec<T>>
where
    F: Fn(ThreadEndpoint) -> T + Sync,
    T: Send,
{
    let endpoints = endpoints(size)?;
    let f = &f;
    thread::scope(|scope| {
        let handles = endpoints
            .into_iter()
            .map(|ep| {
                thread::Builder::new()
                    .name(format!("rank-{}", ep.rank))
                    .spawn_scoped(scope, move || f(ep))
                    .map_err(Error::Io)
            })
            .collect::<Result<Vec<_>>>()?;

        handles
            .into_iter()
            .enumerate()
            .map(|(rank, handle)| {
                handle
                    .join()
                    .map_err(|_| Error::Internal(format!("rank {rank} panicked")))
            })
            .collect()
    })
}

impl ThreadEndpoint {
    fn peer(&self, rank: usize) -> Result<&Sender<Frame>> {
        match self.peers.get(rank) {
            Some(Some(tx)) => Ok(tx),
            Some(None) => Err(Error::Protocol(format!(
                "rank {rank} cannot message itself"
            ))),
            None => Err(Error::InvalidRank {
                rank,
                size: self.size,
            }),
        }
    }

    fn take_parked(&self, source: usize, tag: i32) -> Option<Vec<u8>> {
        self.parked
            .borrow_mut()
            .get_mut(&(source, tag))
            .and_then(VecDeque::pop_front)
    }
}

impl Transport for ThreadEndpoint {
    fn rank(&self) -> usize {
        self.rank
    }

    fn size(&self) -> usize {
        self.size
    }

    fn send(&self, dest: usize, tag: i32, payload: &[u8]) -> Result<()> {
        let tx = self.peer(dest)?;
        trace!(rank = self.rank, dest, tag, bytes = payload.len(), "send");
        tx.send(Frame::Message {
            source: self.rank,
            tag,
            bytes: payload.to_vec(),
        })
        .map_err(|_| Error::Disconnected { peer: dest })
    }

    fn recv(&self, source: usize, tag: i32, timeout: Option<Duration>) -> Result<Option<Vec<u8>>> {
        self.peer(source)?;
        if let Some(bytes) = self.take_parked(source, tag) {
            return Ok(Some(bytes));
        }
        if let Some((rank, code)) = self.aborted.get() {
            return Err(Error::Aborted { rank, code });
        }

        let deadline = timeout.and_then(|t| Instant::now().checked_add(t));
        loop {
            let frame = match deadline {
                None => self
                    .inbox
                    .recv()
                    .map_err(|_| Error::Disconnected { peer: source })?,
                Some(deadline) => match self.inbox.recv_deadline(deadline) {
                    Ok(frame) => frame,
                    Err(RecvTimeoutError::Timeout) => return Ok(None),
                    Err(RecvTimeoutError::Disconnected) => {
                        return Err(Error::Disconnected { peer: source })
                    }
                },
            };

            match frame {
                Frame::Message {
                    source: from,
                    tag: t,
                    bytes,
                } if from == source && t == tag => {
                    trace!(rank = self.rank, source, tag, bytes = bytes.len(), "recv");
                    return Ok(Some(bytes));
                }
                Frame::Message {
                    source: from,
                    tag: t,
                    bytes,
                } => {
                    self.parked
                        .borrow_mut()
                        .entry((from, t))
                        .or_default()
                        .push_back(bytes);
                }
                Frame::Abort { source: from, code } => {
                    self.aborted.set(Some((from, code)));
                    return Err(Error::Aborted { rank: from, code });
                }
            }
        }
    }

    fn abort(&self, code: i32) -> Result<()> {
        for tx in self.peers.iter().flatten() {
            // Peers that already exited do not need the notice.
            let _ = tx.send(Frame::Abort {
                source: self.rank,
                code,
            });
        }
        self.aborted.set(Some((self.rank, code)));
        Ok(())
    }
}
