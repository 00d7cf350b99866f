//! # treeduce
//!
//! Fault-tolerant reduction of stochastic-trajectory ensembles across a fixed
//! group of cooperating processes.
//!
//! A batch job proceeds in four stages on every rank:
//! - **batching**: the task list is split into one contiguous batch per rank
//!   ([`split_batches`], [`take_batch`])
//! - **local reduction**: each rank runs its batch and averages the successes
//!   into one [`Partial`] result ([`reduce_batch`])
//! - **tree reduction**: `ceil(log2(n))` rounds of paired send/receive merge
//!   every rank's result into rank 0 ([`tree_reduce`])
//! - **persistence**: rank 0 writes the final result, or an empty marker when
//!   nothing survived ([`ResultSink`])
//!
//! Task and merge failures change *what* a rank contributes, never *whether*
//! it takes part in a round: an absent result travels as an explicit
//! "no data" message so every blocking receive is still matched.
//!
//! ## Quick Start
//!
//! ```
//! use treeduce::trajectory::{OrnsteinUhlenbeck, PathParams, Trajectory};
//! use treeduce::{run_rank, thread_group, MemorySink, ReduceConfig};
//!
//! let tasks: Vec<PathParams> = (0..8).map(|seed| PathParams::new(seed, 100, 0.01)).collect();
//!
//! let results = thread_group::run(4, |ep| {
//!     let mut sink = MemorySink::<Trajectory>::default();
//!     run_rank(&ep, &OrnsteinUhlenbeck, tasks.clone(), &mut sink, &ReduceConfig::default())
//!         .map(|report| report.result)
//! })?;
//!
//! let combined = results[0].as_ref().unwrap().as_ref().unwrap();
//! assert_eq!(combined.record_count(), 8);
//! # Ok::<(), treeduce::Error>(())
//! ```
//!
//! ## Feature Flags
//!
//! | Feature | Description | Dependencies |
//! |---------|-------------|--------------|
//! | `mpi`   | MPI transport backend via the C shim in `csrc/` | an MPI installation |
//! | `debug` | Trace every message in the C shim | `mpi` |

#![warn(missing_docs)]
#![warn(clippy::all)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::must_use_candidate)]
#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::cast_possible_wrap)]
#![allow(clippy::cast_sign_loss)]
#![allow(clippy::cast_precision_loss)]

mod batch;
mod capability;
mod config;
mod error;
#[cfg(feature = "mpi")]
mod ffi;
mod job;
mod local;
mod logging;
mod message;
#[cfg(feature = "mpi")]
pub mod mpi;
mod partial;
pub mod schedule;
mod sink;
pub mod slurm;
pub mod thread_group;
pub mod trajectory;
mod transport;
mod tree;

pub use batch::{batch_bounds, split_batches, take_batch};
pub use capability::{Mergeable, Simulator};
pub use config::{parse_timeout_secs, ReduceConfig, TimeoutPolicy, ON_TIMEOUT_ENV, RECV_TIMEOUT_ENV};
pub use error::{Error, IncompatibleResultError, Result, SimulationError};
pub use job::{run_rank, RankReport, ABORT_CODE};
pub use local::{reduce_batch, LocalSummary};
pub use logging::init_logging;
pub use message::{round_tag, Envelope, Payload, ROUND_TAG_BASE};
pub use partial::Partial;
pub use sink::{persist, JsonFileSink, MemorySink, ResultSink};
pub use transport::Transport;
pub use tree::{tree_reduce, Reduction, RoundStats, TreeOutcome};
