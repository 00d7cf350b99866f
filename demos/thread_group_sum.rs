//! The same tree reduction as `tree_sum`, with ranks as threads.
//!
//! Rank 3 simulates a batch where every task failed and contributes nothing;
//! the reduction still completes and rank 0's sum simply lacks its share.
//!
//! Run with: cargo run --example thread_group_sum

use serde::{Deserialize, Serialize};
use treeduce::{
    thread_group, tree_reduce, IncompatibleResultError, Mergeable, Partial, ReduceConfig, Result,
    Transport,
};

#[derive(Debug, Serialize, Deserialize)]
struct Sum(i64, usize);

impl Mergeable for Sum {
    fn merge(&mut self, other: Self) -> std::result::Result<(), IncompatibleResultError> {
        self.0 += other.0;
        self.1 += other.1;
        Ok(())
    }

    fn record_count(&self) -> usize {
        self.1
    }
}

fn main() -> Result<()> {
    treeduce::init_logging(true)?;
    let size = 6;

    let outcomes = thread_group::run(size, |ep| {
        let rank = ep.rank();
        let local = if rank == 3 {
            Partial::Failed("every task on rank 3 failed".into())
        } else {
            Partial::Present(Sum(rank as i64 + 1, 1))
        };
        tree_reduce(&ep, local, &ReduceConfig::default())
    })?;

    let mut outcomes = outcomes.into_iter();
    let root = outcomes
        .next()
        .ok_or_else(|| treeduce::Error::Internal("no rank 0".into()))??;
    let Some(Partial::Present(Sum(total, parts))) = root.reduction.into_root() else {
        return Err(treeduce::Error::Internal("rank 0 holds no result".into()));
    };
    println!("sum = {total} from {parts} ranks (rank 3 contributed nothing)");
    assert_eq!(total, 21 - 4);
    assert_eq!(parts, 5);
    Ok(())
}
