//! One rank's share of a batch job: batch, reduce locally, reduce across the
//! group, persist at the root.

use crate::batch::take_batch;
use crate::capability::Simulator;
use crate::config::ReduceConfig;
use crate::error::Result;
use crate::local::{reduce_batch, LocalSummary};
use crate::partial::Partial;
use crate::sink::{persist, ResultSink};
use crate::transport::Transport;
use crate::tree::{tree_reduce, Reduction, RoundStats};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::{debug, error};

/// Exit code handed to [`Transport::abort`] when the reduction fails.
pub const ABORT_CODE: i32 = 1;

/// Reason carried by the marker rank 0 writes before the reduction starts and
/// replaces once it finishes.
pub const INCOMPLETE_REASON: &str = "reduction incomplete";

/// What one rank did during the job.
#[derive(Debug, Clone, PartialEq)]
pub struct RankReport<R> {
    /// Rank of this process
    pub rank: usize,
    /// Size of the group
    pub size: usize,
    /// Local reduction counters
    pub local: LocalSummary,
    /// Tree reduction counters
    pub tree: RoundStats,
    /// The persisted final result; `Some` only on rank 0
    pub result: Option<Partial<R>>,
}

/// Run this rank's part of the job.
///
/// `tasks` is the complete task list; every rank receives the same list and
/// keeps only its own batch. Task and merge failures never make this return
/// an error: on rank 0 the sink always receives a result, the empty marker if
/// nothing survived. Rank 0 writes an [`INCOMPLETE_REASON`] failure marker
/// before the first round, so a group torn down mid-reduction still leaves an
/// output behind. An error is returned only when the reduction itself breaks
/// down (transport failure or an escalated receive deadline), in which case
/// rank 0 overwrites the marker with the cause and the group is aborted.
pub fn run_rank<T, S, K>(
    transport: &T,
    simulator: &S,
    tasks: Vec<S::Task>,
    sink: &mut K,
    config: &ReduceConfig,
) -> Result<RankReport<S::Output>>
where
    T: Transport + ?Sized,
    S: Simulator,
    S::Output: Serialize + DeserializeOwned,
    K: ResultSink<S::Output> + ?Sized,
{
    let rank = transport.rank();
    let size = transport.size();
    let total_tasks = tasks.len();

    let batch = take_batch(tasks, size, rank);
    debug!(
        rank,
        "process {}/{}, processing batch of {} tasks",
        rank + 1,
        size,
        batch.len()
    );
    let (local, local_summary) = reduce_batch(simulator, &batch, rank);
    drop(batch);

    // Under MPI an abort raised on any rank kills rank 0 too, so the output
    // must already exist before the first round.
    if rank == 0 {
        if let Err(e) = sink.write(&Partial::Failed(INCOMPLETE_REASON.to_string())) {
            error!(rank, "cannot write provisional marker: {e}");
            abort_group(transport, rank);
            return Err(e);
        }
        debug!(rank, "provisional failure marker written");
    }

    let outcome = match tree_reduce(transport, local, config) {
        Ok(outcome) => outcome,
        Err(e) => {
            error!(rank, "reduction failed: {e}");
            if rank == 0 {
                let marker = Partial::Failed(format!("reduction failed: {e}"));
                if let Err(write_err) = persist(sink, &marker) {
                    error!(rank, "cannot write failure marker: {write_err}");
                }
            }
            abort_group(transport, rank);
            return Err(e);
        }
    };

    let result = match outcome.reduction {
        Reduction::Root(result) => {
            let result = group_result(result, total_tasks, size);
            persist(sink, &result)?;
            Some(result)
        }
        Reduction::Forwarded { round, dest } => {
            debug!(rank, round, dest, "contribution forwarded; nothing to persist");
            None
        }
    };

    Ok(RankReport {
        rank,
        size,
        local: local_summary,
        tree: outcome.stats,
        result,
    })
}

/// Restate an absent root result for the whole group; rank 0's own reason
/// only describes its batch.
fn group_result<R>(result: Partial<R>, total_tasks: usize, size: usize) -> Partial<R> {
    match result {
        Partial::Present(_) => result,
        _ if total_tasks == 0 => Partial::Empty,
        _ => Partial::Failed(format!(
            "no usable results from {total_tasks} tasks across {size} processes"
        )),
    }
}

fn abort_group<T: Transport + ?Sized>(transport: &T, rank: usize) {
    if let Err(e) = transport.abort(ABORT_CODE) {
        error!(rank, "abort failed: {e}");
    }
}
