//! Tree reduction across an in-process thread group.
//!
//! Covers the message pattern of a six-rank group, absent contributions at
//! every position of the tree, and an escalated receive deadline.

use serde::{Deserialize, Serialize};
use std::sync::Mutex;
use std::time::Duration;
use treeduce::thread_group::{self, ThreadEndpoint};
use treeduce::{
    tree_reduce, Error, IncompatibleResultError, Mergeable, Partial, ReduceConfig, Result,
    TimeoutPolicy, Transport, ROUND_TAG_BASE,
};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct Sum {
    total: u64,
    parts: usize,
}

impl Sum {
    fn of(value: u64) -> Self {
        Sum {
            total: value,
            parts: 1,
        }
    }
}

impl Mergeable for Sum {
    fn merge(&mut self, other: Self) -> std::result::Result<(), IncompatibleResultError> {
        self.total += other.total;
        self.parts += other.parts;
        Ok(())
    }

    fn record_count(&self) -> usize {
        self.parts
    }
}

/// Wraps an endpoint and records every (source, dest, round) it sends.
struct Recording<'a> {
    inner: ThreadEndpoint,
    log: &'a Mutex<Vec<(usize, usize, u32)>>,
}

impl Transport for Recording<'_> {
    fn rank(&self) -> usize {
        self.inner.rank()
    }

    fn size(&self) -> usize {
        self.inner.size()
    }

    fn send(&self, dest: usize, tag: i32, payload: &[u8]) -> Result<()> {
        let round = (tag - ROUND_TAG_BASE) as u32;
        self.log.lock().unwrap().push((self.rank(), dest, round));
        self.inner.send(dest, tag, payload)
    }

    fn recv(&self, source: usize, tag: i32, timeout: Option<Duration>) -> Result<Option<Vec<u8>>> {
        self.inner.recv(source, tag, timeout)
    }

    fn abort(&self, code: i32) -> Result<()> {
        self.inner.abort(code)
    }
}

fn reduce_group(size: usize, local: impl Fn(usize) -> Partial<Sum> + Sync) -> Partial<Sum> {
    let results = thread_group::run(size, |ep| {
        let rank = ep.rank();
        tree_reduce(&ep, local(rank), &ReduceConfig::default())
            .unwrap()
            .reduction
            .into_root()
    })
    .unwrap();
    results.into_iter().flatten().next().unwrap()
}

#[test]
fn six_ranks_follow_the_binary_tree() {
    let log = Mutex::new(Vec::new());
    let results = thread_group::run(6, |ep| {
        let rank = ep.rank();
        let transport = Recording { inner: ep, log: &log };
        tree_reduce(&transport, Partial::Present(Sum::of(rank as u64 + 1)), &ReduceConfig::default())
            .unwrap()
    })
    .unwrap();

    let mut sends = log.into_inner().unwrap();
    sends.sort_by_key(|&(source, _, round)| (round, source));
    assert_eq!(
        sends,
        vec![(1, 0, 0), (3, 2, 0), (5, 4, 0), (2, 0, 1), (4, 0, 2)]
    );

    let root = results[0].reduction.clone().into_root().unwrap();
    assert_eq!(root, Partial::Present(Sum { total: 21, parts: 6 }));
    assert!(results[1..]
        .iter()
        .all(|outcome| outcome.reduction.clone().into_root().is_none()));
    assert_eq!(results[0].stats.received, 3);
    assert_eq!(results[0].stats.rounds, 3);
}

#[test]
fn failed_rank_three_is_skipped() {
    let root = reduce_group(6, |rank| {
        if rank == 3 {
            Partial::Failed("all tasks failed".into())
        } else {
            Partial::Present(Sum::of(rank as u64 + 1))
        }
    });
    assert_eq!(root, Partial::Present(Sum { total: 17, parts: 5 }));
}

#[test]
fn absent_root_adopts_first_incoming() {
    let root = reduce_group(5, |rank| {
        if rank == 0 {
            Partial::Empty
        } else {
            Partial::Present(Sum::of(10))
        }
    });
    assert_eq!(root, Partial::Present(Sum { total: 40, parts: 4 }));
}

#[test]
fn every_absent_position_still_completes() {
    for size in 1..=9 {
        for absent in 0..size {
            let root = reduce_group(size, |rank| {
                if rank == absent {
                    Partial::Empty
                } else {
                    Partial::Present(Sum::of(1))
                }
            });
            assert_eq!(root.record_count(), size - 1, "size {size}, absent {absent}");
        }
    }
}

#[test]
fn all_absent_yields_empty_marker() {
    let root = reduce_group(7, |_| Partial::Empty);
    assert!(root.is_absent());
}

#[test]
fn single_rank_returns_its_own_data() {
    let root = reduce_group(1, |_| Partial::Present(Sum::of(9)));
    assert_eq!(root, Partial::Present(Sum::of(9)));
}

#[test]
fn silent_partner_escalates_under_abort_policy() {
    let eps = thread_group::endpoints(2).unwrap();
    let config = ReduceConfig::with_timeout(Duration::from_millis(30), TimeoutPolicy::Abort);

    // Rank 1 never sends; its endpoint stays alive so the receive times out.
    let err = tree_reduce(&eps[0], Partial::Present(Sum::of(1)), &config).unwrap_err();
    assert!(matches!(
        err,
        Error::ReceiveTimeout {
            round: 0,
            partner: 1,
            ..
        }
    ));
}

#[test]
fn silent_partner_is_skipped_under_no_data_policy() {
    let eps = thread_group::endpoints(2).unwrap();
    let config = ReduceConfig::with_timeout(Duration::from_millis(30), TimeoutPolicy::TreatAsNoData);

    let outcome = tree_reduce(&eps[0], Partial::Present(Sum::of(4)), &config).unwrap();
    assert_eq!(outcome.stats.timeouts, 1);
    assert_eq!(
        outcome.reduction.into_root(),
        Some(Partial::Present(Sum::of(4)))
    );
}
