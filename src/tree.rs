//! Binary-tree reduction of per-rank partial results to rank 0.
//!
//! Every rank walks the same [`RoundSchedule`]. Local failures only change
//! what a rank sends (data or an explicit "no data" envelope), never whether
//! it sends or receives: a skipped matched operation would leave its partner
//! blocked for good.

use crate::capability::Mergeable;
use crate::config::{ReduceConfig, TimeoutPolicy};
use crate::error::{Error, Result};
use crate::message::{round_tag, Envelope, Payload};
use crate::partial::Partial;
use crate::schedule::{Action, RoundSchedule};
use crate::transport::Transport;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::{debug, error, warn};

/// Where a rank's data ended up after the reduction.
#[derive(Debug, Clone, PartialEq)]
pub enum Reduction<R> {
    /// Rank 0: the authoritative, fully merged result
    Root(Partial<R>),
    /// Any other rank: its accumulated result was handed to `dest` in `round`
    Forwarded {
        /// Round of the send
        round: u32,
        /// Receiving rank
        dest: usize,
    },
}

impl<R> Reduction<R> {
    /// The final result, available only on rank 0.
    pub fn into_root(self) -> Option<Partial<R>> {
        match self {
            Reduction::Root(p) => Some(p),
            Reduction::Forwarded { .. } => None,
        }
    }
}

/// Per-rank counters from one reduction.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RoundStats {
    /// Rounds executed
    pub rounds: u32,
    /// Envelopes received
    pub received: usize,
    /// Received envelopes that carried no data
    pub no_data: usize,
    /// Received results merged into (or adopted by) the local result
    pub merged: usize,
    /// Received results discarded because they could not be decoded or merged
    pub discarded: usize,
    /// Receives that hit the deadline and were treated as no data, plus sends
    /// withdrawn because the partner never took them
    pub timeouts: usize,
}

/// Result of [`tree_reduce`] on one rank.
#[derive(Debug, Clone, PartialEq)]
pub struct TreeOutcome<R> {
    /// Final placement of this rank's data
    pub reduction: Reduction<R>,
    /// Counters
    pub stats: RoundStats,
}

/// Merge every rank's `local` result into rank 0.
///
/// Must be called by every rank of the group with the same `config`. Returns
/// an error only for transport failures and, under [`TimeoutPolicy::Abort`],
/// a missed receive deadline. Undecodable or unmergeable data from a partner
/// is logged and discarded.
pub fn tree_reduce<T, R>(
    transport: &T,
    local: Partial<R>,
    config: &ReduceConfig,
) -> Result<TreeOutcome<R>>
where
    T: Transport + ?Sized,
    R: Mergeable + Serialize + DeserializeOwned,
{
    let rank = transport.rank();
    let size = transport.size();
    if size == 0 {
        return Err(Error::EmptyGroup);
    }
    if rank >= size {
        return Err(Error::InvalidRank { rank, size });
    }

    let schedule = RoundSchedule::new(rank, size);
    let mut stats = RoundStats {
        rounds: schedule.rounds(),
        ..RoundStats::default()
    };
    let mut acc = Some(local);
    let mut forwarded = None;

    for step in schedule {
        let round = step.round;
        match step.action {
            Action::SendTo(dest) => {
                let partial = acc.take().unwrap_or_default();
                debug!(
                    rank,
                    round,
                    dest,
                    records = partial.record_count(),
                    "send partial result"
                );
                let bytes = encode_or_no_data(rank, round, partial)?;
                // A receiver that may give up must not leave the send blocked.
                let send_timeout = match config.on_timeout {
                    TimeoutPolicy::TreatAsNoData => config.recv_timeout,
                    TimeoutPolicy::Abort => None,
                };
                if !transport.send_within(dest, round_tag(round), &bytes, send_timeout)? {
                    warn!(
                        rank,
                        round,
                        dest,
                        "partner did not take the partial result before the deadline; withdrawn"
                    );
                    stats.timeouts += 1;
                }
                forwarded = Some((round, dest));
            }
            Action::ReceiveFrom(source) => {
                debug!(rank, round, source, "receive");
                let Some(acc) = acc.as_mut() else {
                    return Err(Error::Internal(format!(
                        "rank {rank} scheduled to receive in round {round} after sending"
                    )));
                };
                match transport.recv(source, round_tag(round), config.recv_timeout)? {
                    Some(bytes) => {
                        stats.received += 1;
                        absorb_envelope(acc, &bytes, rank, round, source, &mut stats);
                    }
                    None => {
                        let timeout = config.recv_timeout.unwrap_or_default();
                        match config.on_timeout {
                            TimeoutPolicy::Abort => {
                                error!(rank, round, source, ?timeout, "receive deadline passed");
                                return Err(Error::ReceiveTimeout {
                                    round,
                                    partner: source,
                                    timeout,
                                });
                            }
                            TimeoutPolicy::TreatAsNoData => {
                                warn!(
                                    rank,
                                    round,
                                    source,
                                    ?timeout,
                                    "receive deadline passed; treating partner as no data"
                                );
                                stats.timeouts += 1;
                            }
                        }
                    }
                }
            }
            Action::NoPartner => {
                debug!(rank, round, "no partner this round");
            }
            Action::Idle => {}
        }
    }

    let reduction = match (acc, forwarded) {
        (Some(result), None) => Reduction::Root(result),
        (None, Some((round, dest))) => Reduction::Forwarded { round, dest },
        _ => {
            return Err(Error::Internal(format!(
                "rank {rank} finished the schedule in an inconsistent state"
            )))
        }
    };
    Ok(TreeOutcome { reduction, stats })
}

/// Encode the outgoing envelope. If the data cannot be encoded, send an
/// explicit "no data" envelope instead so the receiver is still matched.
fn encode_or_no_data<R: Serialize>(rank: usize, round: u32, partial: Partial<R>) -> Result<Vec<u8>> {
    match Envelope::new(rank, round, partial).encode() {
        Ok(bytes) => Ok(bytes),
        Err(e) => {
            error!(rank, round, "cannot encode partial result, sending no data: {e}");
            Envelope::<R>::no_data(rank, round).encode()
        }
    }
}

fn absorb_envelope<R>(
    acc: &mut Partial<R>,
    bytes: &[u8],
    rank: usize,
    round: u32,
    source: usize,
    stats: &mut RoundStats,
) where
    R: Mergeable + DeserializeOwned,
{
    let envelope = match Envelope::<R>::decode(bytes).and_then(|e| e.verify(source, round).map(|()| e))
    {
        Ok(envelope) => envelope,
        Err(e) => {
            stats.discarded += 1;
            error!(rank, round, source, "discarding message: {e}");
            return;
        }
    };

    match envelope.payload {
        Payload::NoData => {
            stats.no_data += 1;
            debug!(rank, round, source, "partner has no data");
        }
        Payload::Data(incoming) => {
            let records = incoming.record_count();
            match acc.absorb(incoming) {
                Ok(()) => {
                    stats.merged += 1;
                    debug!(
                        rank,
                        round,
                        source,
                        records,
                        total = acc.record_count(),
                        "merged partner result"
                    );
                }
                Err(e) => {
                    stats.discarded += 1;
                    error!(rank, round, source, "{e}; keeping local result");
                }
            }
        }
    }
}
