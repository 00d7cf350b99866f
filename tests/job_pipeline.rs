//! End-to-end batch jobs: batching, local reduction, tree reduction and the
//! JSON result file.

use serde::{Deserialize, Serialize};
use std::fs;
use treeduce::thread_group;
use treeduce::trajectory::{OrnsteinUhlenbeck, PathParams, Trajectory};
use treeduce::{
    run_rank, IncompatibleResultError, JsonFileSink, MemorySink, Mergeable, ReduceConfig,
    SimulationError, Simulator,
};

fn paths(n: u64) -> Vec<PathParams> {
    (0..n).map(|seed| PathParams::new(seed, 32, 0.01)).collect()
}

fn read_json(path: &std::path::Path) -> serde_json::Value {
    serde_json::from_str(&fs::read_to_string(path).unwrap()).unwrap()
}

#[test]
fn merged_result_is_written_by_rank_zero() {
    let dir = tempfile::tempdir().unwrap();
    let output = dir.path().join("combined_trajectory.json");

    thread_group::run(4, |ep| {
        let mut sink = JsonFileSink::new(&output);
        run_rank(&ep, &OrnsteinUhlenbeck, paths(13), &mut sink, &ReduceConfig::default()).unwrap();
    })
    .unwrap();

    let doc = read_json(&output);
    assert_eq!(doc["status"], "merged");
    assert_eq!(doc["records"], 13);
    assert_eq!(doc["result"]["mean"].as_array().unwrap().len(), 33);
}

#[test]
fn zero_tasks_write_the_empty_marker() {
    let dir = tempfile::tempdir().unwrap();
    let output = dir.path().join("out.json");

    thread_group::run(3, |ep| {
        let mut sink = JsonFileSink::new(&output);
        run_rank(&ep, &OrnsteinUhlenbeck, Vec::new(), &mut sink, &ReduceConfig::default())
            .unwrap();
    })
    .unwrap();

    let doc = read_json(&output);
    assert_eq!(doc["status"], "empty");
}

#[test]
fn failing_paths_thin_the_ensemble() {
    let tasks: Vec<PathParams> = (0..20)
        .map(|seed| PathParams {
            fail: seed % 4 == 0,
            ..PathParams::new(seed, 8, 0.1)
        })
        .collect();

    let reports = thread_group::run(6, |ep| {
        let mut sink = MemorySink::<Trajectory>::default();
        run_rank(&ep, &OrnsteinUhlenbeck, tasks.clone(), &mut sink, &ReduceConfig::default())
            .unwrap()
    })
    .unwrap();

    let failed: usize = reports.iter().map(|r| r.local.failed).sum();
    assert_eq!(failed, 5);
    let root = reports[0].result.clone().unwrap();
    assert_eq!(root.record_count(), 15);
}

#[test]
fn more_ranks_than_tasks() {
    let reports = thread_group::run(8, |ep| {
        let mut sink = MemorySink::<Trajectory>::default();
        run_rank(&ep, &OrnsteinUhlenbeck, paths(3), &mut sink, &ReduceConfig::default()).unwrap()
    })
    .unwrap();

    let idle = reports.iter().filter(|r| r.local.tasks == 0).count();
    assert_eq!(idle, 5);
    assert_eq!(reports[0].result.as_ref().unwrap().record_count(), 3);
}

/// Counts outputs; a task fails when it is negative.
struct Counter;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct Count(usize);

impl Mergeable for Count {
    fn merge(&mut self, other: Self) -> Result<(), IncompatibleResultError> {
        self.0 += other.0;
        Ok(())
    }

    fn record_count(&self) -> usize {
        self.0
    }
}

impl Simulator for Counter {
    type Task = i64;
    type Output = Count;

    fn run(&self, task: &i64) -> Result<Count, SimulationError> {
        if *task < 0 {
            return Err(SimulationError::new(format!("negative task {task}")));
        }
        Ok(Count(1))
    }
}

#[test]
fn ranks_whose_batch_fails_entirely_contribute_nothing() {
    // Ranks 1 and 2 of 4 get only negative tasks.
    let tasks = vec![1, 1, -1, -1, -1, -1, 1, 1];
    let reports = thread_group::run(4, |ep| {
        let mut sink = MemorySink::<Count>::default();
        run_rank(&ep, &Counter, tasks.clone(), &mut sink, &ReduceConfig::default()).unwrap()
    })
    .unwrap();

    assert_eq!(reports[1].local.succeeded, 0);
    assert_eq!(reports[2].local.succeeded, 0);
    assert_eq!(reports[0].result.clone().unwrap().into_present(), Some(Count(4)));
}
