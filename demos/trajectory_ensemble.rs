//! Ensemble average of Ornstein–Uhlenbeck sample paths across MPI processes.
//!
//! Every rank generates the same task list, keeps its own batch, averages it
//! locally, and the tree reduction combines the averages at rank 0. One task
//! in ten is forced to fail to show that failures only thin the ensemble.
//!
//! Run with: mpiexec -n 4 cargo run --release --features mpi --example trajectory_ensemble

use treeduce::mpi::Mpi;
use treeduce::trajectory::{OrnsteinUhlenbeck, PathParams, Trajectory};
use treeduce::{run_rank, MemorySink, ReduceConfig, Result, Transport};

fn main() -> Result<()> {
    let mpi = Mpi::init()?;
    let world = mpi.world();

    let rank = world.rank();
    let size = world.size();

    let total_paths: u64 = 2_000;
    let tasks: Vec<PathParams> = (0..total_paths)
        .map(|seed| PathParams {
            x0: 2.0,
            fail: seed % 10 == 7,
            ..PathParams::new(seed, 1_000, 0.005)
        })
        .collect();

    if rank == 0 {
        println!("Processes: {size}");
        println!("Sample paths: {total_paths}");
        println!();
    }

    world.barrier()?;
    let start_time = Mpi::wtime();

    let mut sink = MemorySink::<Trajectory>::default();
    let report = run_rank(&world, &OrnsteinUhlenbeck, tasks, &mut sink, &ReduceConfig::default())?;

    let elapsed = Mpi::wtime() - start_time;
    println!(
        "Rank {rank}: {} tasks, {} failed, {:.3}s",
        report.local.tasks, report.local.failed, elapsed
    );

    world.barrier()?;

    if let Some(result) = report.result {
        let t = result.into_present().expect("every rank had surviving paths");
        let expected = total_paths - total_paths / 10;
        assert_eq!(t.records as u64, expected, "ensemble size mismatch");

        // The mean relaxes from x0 = 2 towards mu = 0 as exp(-theta t).
        let end = t.mean.len() - 1;
        let analytic = 2.0 * (-(end as f64) * t.dt).exp();
        let variance = t.variance()[end];
        println!("\nResults:");
        println!("  Paths averaged:  {}", t.records);
        println!("  <x(T)>:          {:.5} (analytic {analytic:.5})", t.mean[end]);
        println!("  Var x(T):        {variance:.5} (stationary 0.125)");
        assert!((t.mean[end] - analytic).abs() < 0.05, "mean too far from analytic value");
    }

    Ok(())
}
