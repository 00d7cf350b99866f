//! Run a batch of stochastic trajectories across a process group and write
//! the ensemble average from rank 0.
//!
//! Under MPI (build with `--features mpi`):
//!
//! ```text
//! mpiexec -n 160 treeduce --backend mpi --debug tasks.json
//! ```
//!
//! Without MPI, the group runs as threads in one process:
//!
//! ```text
//! treeduce --ranks 8 tasks.json
//! ```
//!
//! `tasks.json` is a JSON array of path parameters, e.g.
//! `[{"seed": 1, "steps": 1000, "dt": 0.001}, ...]`.

use clap::{Parser, ValueEnum};
use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info};
use treeduce::slurm::JobTopology;
use treeduce::trajectory::{OrnsteinUhlenbeck, PathParams};
use treeduce::{
    init_logging, parse_timeout_secs, run_rank, JsonFileSink, ReduceConfig, Result, TimeoutPolicy,
    Transport,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Backend {
    /// One thread per rank inside this process
    Threads,
    /// One MPI process per rank
    Mpi,
}

#[derive(Debug, Parser)]
#[command(name = "treeduce", version)]
#[command(about = "Average stochastic trajectories across a process group")]
struct Cli {
    /// JSON file with the list of trajectory parameters
    tasks: PathBuf,

    /// Where rank 0 writes the combined result
    #[arg(short, long, default_value = "combined_trajectory.json")]
    output: PathBuf,

    /// Raise the default log level to debug (on top of RUST_LOG, if set)
    #[arg(long)]
    debug: bool,

    /// Communication backend
    #[arg(long, value_enum, default_value_t = Backend::Threads)]
    backend: Backend,

    /// Number of ranks for the threads backend
    #[arg(long, default_value_t = 4)]
    ranks: usize,

    /// Deadline in seconds for each round's receive (default: wait forever)
    #[arg(long, value_parser = parse_timeout_secs)]
    recv_timeout_secs: Option<Duration>,

    /// What to do when a receive deadline passes
    #[arg(long)]
    on_timeout: Option<TimeoutPolicy>,
}

impl Cli {
    fn reduce_config(&self) -> Result<ReduceConfig> {
        let mut config = ReduceConfig::from_env()?;
        if let Some(timeout) = self.recv_timeout_secs {
            config.recv_timeout = Some(timeout);
        }
        if let Some(policy) = self.on_timeout {
            config.on_timeout = policy;
        }
        Ok(config)
    }
}

fn load_tasks(path: &Path) -> Result<Vec<PathParams>> {
    let reader = BufReader::new(File::open(path)?);
    Ok(serde_json::from_reader(reader)?)
}

fn run_on<T: Transport>(
    transport: &T,
    tasks: Vec<PathParams>,
    output: &Path,
    config: &ReduceConfig,
) -> Result<()> {
    let topology = JobTopology::detect();
    debug!(
        rank = transport.rank(),
        size = transport.size(),
        %topology,
        "process started"
    );

    let mut sink = JsonFileSink::new(output);
    let report = run_rank(transport, &OrnsteinUhlenbeck, tasks, &mut sink, config)?;
    if let Some(result) = &report.result {
        info!(
            records = result.record_count(),
            output = %output.display(),
            "combined result written"
        );
    }
    Ok(())
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.debug)?;

    let config = cli.reduce_config()?;
    let tasks = load_tasks(&cli.tasks)?;

    match cli.backend {
        Backend::Threads => {
            let outcomes = treeduce::thread_group::run(cli.ranks, |ep| {
                run_on(&ep, tasks.clone(), &cli.output, &config)
            })?;
            outcomes.into_iter().collect()
        }
        Backend::Mpi => run_mpi(tasks, &cli.output, &config),
    }
}

#[cfg(feature = "mpi")]
fn run_mpi(tasks: Vec<PathParams>, output: &Path, config: &ReduceConfig) -> Result<()> {
    use treeduce::mpi::Mpi;

    let mpi = Mpi::init()?;
    let world = mpi.world();
    let node = world.processor_name()?;
    debug!(
        rank = world.rank(),
        %node,
        thread_level = ?mpi.thread_level(),
        "MPI initialized"
    );
    if world.rank() == 0 {
        let library = Mpi::version()?;
        info!(size = world.size(), %library, "MPI group ready");
    }
    run_on(&world, tasks, output, config)
}

#[cfg(not(feature = "mpi"))]
fn run_mpi(_tasks: Vec<PathParams>, _output: &Path, _config: &ReduceConfig) -> Result<()> {
    Err(treeduce::Error::NotSupported(
        "this build has no MPI backend; rebuild with `--features mpi`".into(),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use treeduce::{ON_TIMEOUT_ENV, RECV_TIMEOUT_ENV};

    fn parse(args: &[&str]) -> std::result::Result<Cli, clap::Error> {
        Cli::try_parse_from(std::iter::once("treeduce").chain(args.iter().copied()))
    }

    #[test]
    fn defaults() {
        let cli = parse(&["tasks.json"]).unwrap();
        assert_eq!(cli.tasks, PathBuf::from("tasks.json"));
        assert_eq!(cli.output, PathBuf::from("combined_trajectory.json"));
        assert_eq!(cli.backend, Backend::Threads);
        assert_eq!(cli.ranks, 4);
        assert!(!cli.debug);
        assert_eq!(cli.recv_timeout_secs, None);
        assert_eq!(cli.on_timeout, None);
    }

    #[test]
    fn timeout_flags() {
        let cli = parse(&[
            "--recv-timeout-secs",
            "2.5",
            "--on-timeout",
            "no-data",
            "--backend",
            "mpi",
            "tasks.json",
        ])
        .unwrap();
        assert_eq!(cli.recv_timeout_secs, Some(Duration::from_millis(2500)));
        assert_eq!(cli.on_timeout, Some(TimeoutPolicy::TreatAsNoData));
        assert_eq!(cli.backend, Backend::Mpi);
    }

    #[test]
    fn bad_values_are_rejected() {
        assert!(parse(&["--on-timeout", "retry", "tasks.json"]).is_err());
        assert!(parse(&["--recv-timeout-secs", "0", "tasks.json"]).is_err());
        assert!(parse(&["--recv-timeout-secs", "soon", "tasks.json"]).is_err());
        assert!(parse(&[]).is_err());
    }

    /// The only test in this binary that touches the environment.
    #[test]
    fn flags_override_environment() {
        std::env::set_var(RECV_TIMEOUT_ENV, "30");
        std::env::set_var(ON_TIMEOUT_ENV, "abort");

        let from_env = parse(&["tasks.json"]).unwrap().reduce_config().unwrap();
        assert_eq!(from_env.recv_timeout, Some(Duration::from_secs(30)));
        assert_eq!(from_env.on_timeout, TimeoutPolicy::Abort);

        let overridden = parse(&["--recv-timeout-secs", "5", "--on-timeout", "no-data", "tasks.json"])
            .unwrap()
            .reduce_config()
            .unwrap();
        assert_eq!(overridden.recv_timeout, Some(Duration::from_secs(5)));
        assert_eq!(overridden.on_timeout, TimeoutPolicy::TreatAsNoData);

        let partial = parse(&["--on-timeout", "no-data", "tasks.json"])
            .unwrap()
            .reduce_config()
            .unwrap();
        assert_eq!(partial.recv_timeout, Some(Duration::from_secs(30)));
        assert_eq!(partial.on_timeout, TimeoutPolicy::TreatAsNoData);

        std::env::set_var(ON_TIMEOUT_ENV, "explode");
        assert!(parse(&["tasks.json"]).unwrap().reduce_config().is_err());

        std::env::remove_var(RECV_TIMEOUT_ENV);
        std::env::remove_var(ON_TIMEOUT_ENV);
    }

    #[test]
    fn tasks_file_round_trip_through_the_threads_backend() {
        let dir = tempfile::tempdir().unwrap();
        let tasks_path = dir.path().join("tasks.json");
        let output = dir.path().join("out.json");
        let mut f = File::create(&tasks_path).unwrap();
        writeln!(
            f,
            r#"[{{"seed": 1, "steps": 10, "dt": 0.1}}, {{"seed": 2, "steps": 10, "dt": 0.1, "fail": true}}, {{"seed": 3, "steps": 10, "dt": 0.1}}]"#
        )
        .unwrap();
        drop(f);

        let tasks = load_tasks(&tasks_path).unwrap();
        assert_eq!(tasks.len(), 3);
        assert!(tasks[1].fail);
        assert_eq!(tasks[0].sigma, 0.5);

        let outcomes = treeduce::thread_group::run(2, |ep| {
            run_on(&ep, tasks.clone(), &output, &ReduceConfig::default())
        })
        .unwrap();
        assert!(outcomes.iter().all(|o| o.is_ok()));

        let doc: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&output).unwrap()).unwrap();
        assert_eq!(doc["status"], "merged");
        assert_eq!(doc["records"], 2);
    }

    #[test]
    fn malformed_tasks_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tasks.json");
        std::fs::write(&path, "{not json").unwrap();
        assert!(load_tasks(&path).is_err());
        assert!(load_tasks(&dir.path().join("missing.json")).is_err());
    }
}
