//! Per-rank reduction of a batch of tasks into one partial result.

use crate::capability::Simulator;
use crate::partial::Partial;
use tracing::{debug, error};

/// Counters describing what happened while reducing one batch.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LocalSummary {
    /// Tasks in the batch
    pub tasks: usize,
    /// Tasks whose simulation succeeded
    pub succeeded: usize,
    /// Tasks whose simulation failed and were dropped
    pub failed: usize,
    /// Successful results dropped because they could not be merged
    pub merge_failures: usize,
}

impl LocalSummary {
    /// Results that made it into the local partial result.
    pub fn combined(&self) -> usize {
        self.succeeded - self.merge_failures
    }
}

/// Run every task in `batch` and fold the successes left to right.
///
/// Task failures and merge failures are logged and the offending component is
/// dropped; neither aborts the batch. When nothing succeeds the result is the
/// absent state, logged as an error and returned rather than raised so the
/// caller still takes part in the reduction rounds.
pub fn reduce_batch<S>(
    simulator: &S,
    batch: &[S::Task],
    rank: usize,
) -> (Partial<S::Output>, LocalSummary)
where
    S: Simulator,
{
    let mut summary = LocalSummary {
        tasks: batch.len(),
        ..LocalSummary::default()
    };
    let mut acc: Partial<S::Output> = Partial::Empty;

    for (index, task) in batch.iter().enumerate() {
        let output = match simulator.run(task) {
            Ok(output) => output,
            Err(e) => {
                summary.failed += 1;
                error!(rank, task = index, "dropping task: {e}");
                continue;
            }
        };
        summary.succeeded += 1;
        if let Err(e) = acc.absorb(output) {
            summary.merge_failures += 1;
            error!(rank, task = index, "local average: {e}");
        }
    }

    if summary.tasks > 0 && acc.is_absent() {
        let reason = format!("all {} tasks on rank {rank} failed", summary.tasks);
        error!(rank, "{reason}; contributing no data");
        acc = Partial::Failed(reason);
    } else {
        debug!(
            rank,
            records = acc.record_count(),
            failed = summary.failed,
            merge_failures = summary.merge_failures,
            "finished local propagations"
        );
    }

    (acc, summary)
}
