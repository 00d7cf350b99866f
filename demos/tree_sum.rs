//! Tree reduction of one integer per rank.
//!
//! Rank `i` contributes `i + 1`; rank 0 ends up with `1 + 2 + ... + n`.
//! With six processes the rounds pair 1→0, 3→2, 5→4, then 2→0, then 4→0.
//!
//! Run with: mpiexec -n 6 cargo run --features mpi --example tree_sum

use serde::{Deserialize, Serialize};
use treeduce::mpi::Mpi;
use treeduce::schedule::{Action, RoundSchedule};
use treeduce::{tree_reduce, IncompatibleResultError, Mergeable, Partial, ReduceConfig, Result, Transport};

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
    let mpi = Mpi::init()?;
    let world = mpi.world();

    let rank = world.rank();
    let size = world.size();

    for step in RoundSchedule::new(rank, size) {
        match step.action {
            Action::SendTo(dest) => println!("round {}: {rank} -> {dest}", step.round),
            Action::ReceiveFrom(source) => println!("round {}: {rank} <- {source}", step.round),
            Action::NoPartner | Action::Idle => {}
        }
    }

    let local = Partial::Present(Sum(rank as i64 + 1, 1));
    let outcome = tree_reduce(&world, local, &ReduceConfig::default())?;

    world.barrier()?;

    if let Some(result) = outcome.reduction.into_root() {
        let total = result.into_present().map_or(0, |s| s.0);
        let expected = (size * (size + 1) / 2) as i64;
        println!("\nRank 0: sum over {size} processes = {total} (expected {expected})");
        assert_eq!(total, expected, "Sum mismatch!");
    }

    Ok(())
}
