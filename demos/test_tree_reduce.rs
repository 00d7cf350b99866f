//! Integration test for the tree reduction over MPI.
//!
//! Exercises the full-group sum, an absent rank in the middle of the tree,
//! an all-absent group, an incompatible contribution, and the receive
//! deadline with the "no data" policy. Scenarios reuse the same round tags
//! and are separated by a barrier, so no message crosses into the next one.
//!
//! A custom panic hook aborts the process so a failing assertion on one rank
//! cannot leave the others blocked in a receive.
//!
//! Run with: mpiexec -n 6 ./target/debug/examples/test_tree_reduce

use serde::{Deserialize, Serialize};
use std::time::Duration;
use treeduce::mpi::{Communicator, Mpi};
use treeduce::{
    tree_reduce, IncompatibleResultError, Mergeable, Partial, ReduceConfig, TimeoutPolicy,
    Transport,
};

/// Sum of integer payloads tagged with a width; widths must agree to merge.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct Tally {
    width: u32,
    sum: i64,
    parts: usize,
}

impl Tally {
    fn new(width: u32, sum: i64) -> Self {
        Tally {
            width,
            sum,
            parts: 1,
        }
    }
}

impl Mergeable for Tally {
    fn merge(&mut self, other: Self) -> Result<(), IncompatibleResultError> {
        if self.width != other.width {
            return Err(IncompatibleResultError::new(format!(
                "width {} vs {}",
                self.width, other.width
            )));
        }
        self.sum += other.sum;
        self.parts += other.parts;
        Ok(())
    }

    fn record_count(&self) -> usize {
        self.parts
    }
}

fn reduce(world: &Communicator<'_>, local: Partial<Tally>, config: &ReduceConfig) -> Option<Partial<Tally>> {
    let outcome = tree_reduce(world, local, config).expect("tree_reduce failed");
    world.barrier().expect("barrier failed");
    outcome.reduction.into_root()
}

fn main() {
    let mpi = Mpi::init().expect("MPI init failed");

    // Install after Mpi::init() so the MPI runtime sees its own handlers first.
    std::panic::set_hook(Box::new(|info| {
        eprintln!("PANIC: {info}");
        std::process::abort();
    }));

    assert!(Mpi::is_initialized(), "MPI reports itself uninitialized");

    let world = mpi.world();
    let rank = world.rank();
    let size = world.size();
    let all: i64 = (1..=size as i64).sum();
    let config = ReduceConfig::default();

    assert!(size >= 2, "test_tree_reduce requires at least 2 processes");

    // ========================================================================
    // Test 1: every rank contributes
    // ========================================================================
    {
        let root = reduce(&world, Partial::Present(Tally::new(1, rank as i64 + 1)), &config);
        if let Some(result) = root {
            let t = result.into_present().expect("rank 0 lost the result");
            assert_eq!(t.sum, all, "full sum mismatch");
            assert_eq!(t.parts, size);
            println!("PASS: full group sum");
        }
    }

    // ========================================================================
    // Test 2: the last rank has no data
    // ========================================================================
    {
        let absent = size - 1;
        let local = if rank == absent {
            Partial::Failed("all tasks failed".into())
        } else {
            Partial::Present(Tally::new(1, rank as i64 + 1))
        };
        if let Some(result) = reduce(&world, local, &config) {
            let t = result.into_present().expect("rank 0 lost the result");
            assert_eq!(t.sum, all - size as i64, "absent-rank sum mismatch");
            assert_eq!(t.parts, size - 1);
            println!("PASS: absent rank {absent} skipped");
        }
    }

    // ========================================================================
    // Test 3: nobody has data
    // ========================================================================
    {
        if let Some(result) = reduce(&world, Partial::Empty, &config) {
            assert!(result.is_absent(), "expected the empty marker at rank 0");
            println!("PASS: all-absent group");
        }
    }

    // ========================================================================
    // Test 4: rank 1 sends an incompatible contribution
    // ========================================================================
    {
        let width = if rank == 1 { 2 } else { 1 };
        if let Some(result) = reduce(&world, Partial::Present(Tally::new(width, 10)), &config) {
            let t = result.into_present().expect("rank 0 lost the result");
            assert_eq!(t.sum, 10 * (size as i64 - 1), "incompatible data not discarded");
            println!("PASS: incompatible contribution discarded");
        }
    }

    // ========================================================================
    // Test 5: deadline with no-data policy when everyone is on time
    // ========================================================================
    {
        let bounded = ReduceConfig::with_timeout(Duration::from_secs(30), TimeoutPolicy::TreatAsNoData);
        if let Some(result) = reduce(&world, Partial::Present(Tally::new(1, 1)), &bounded) {
            assert_eq!(result.record_count(), size, "bounded receive lost data");
            println!("PASS: bounded receive");
        }
    }

    world.barrier().expect("final barrier failed");
    if rank == 0 {
        println!("\n========================================");
        println!("All tree reduction tests passed! (5 tests)");
        println!("========================================");
    }
}
