//! Error types for treeduce

use std::time::Duration;
use thiserror::Error;

/// Result type for transport and job operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors raised by the transport layer and the job driver.
///
/// Per-task and per-merge failures never surface here: they are contained at
/// the rank that produced them (see [`SimulationError`] and
/// [`IncompatibleResultError`]).
#[derive(Error, Debug)]
pub enum Error {
    /// The transport has already been initialized
    #[error("transport has already been initialized")]
    AlreadyInitialized,

    /// Invalid rank specified
    #[error("invalid rank {rank} for a group of {size}")]
    InvalidRank {
        /// The offending rank
        rank: usize,
        /// Size of the process group
        size: usize,
    },

    /// A process group must contain at least one rank
    #[error("process group must contain at least one rank")]
    EmptyGroup,

    /// The peer hung up before a matched operation completed
    #[error("channel to rank {peer} disconnected")]
    Disconnected {
        /// Rank on the other end of the channel
        peer: usize,
    },

    /// A receive did not complete before its deadline
    #[error("round {round}: no message from rank {partner} within {timeout:?}")]
    ReceiveTimeout {
        /// Round index the receive belonged to
        round: u32,
        /// Expected sender
        partner: usize,
        /// Configured deadline
        timeout: Duration,
    },

    /// Another rank aborted the process group
    #[error("process group aborted by rank {rank} (code {code})")]
    Aborted {
        /// Rank that called abort
        rank: usize,
        /// Exit code it supplied
        code: i32,
    },

    /// A message violated the round schedule
    #[error("protocol violation: {0}")]
    Protocol(String),

    /// Envelope encoding or decoding failed
    #[error("codec error: {0}")]
    Codec(#[from] bincode::Error),

    /// Reading input or writing output failed
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON input/output failed
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Invalid configuration value
    #[error("invalid configuration: {0}")]
    Config(String),

    /// Operation not supported by this build (e.g., MPI backend without the `mpi` feature)
    #[error("operation not supported: {0}")]
    NotSupported(String),

    /// MPI error with code
    #[error("MPI error (code {0})")]
    MpiError(i32),

    /// Internal error
    #[error("internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Create an error from a non-zero C shim return code.
    pub fn from_code(code: i32) -> Self {
        Error::MpiError(code)
    }

    /// Check a C shim return code, returning Ok(()) for success.
    pub fn check(code: i32) -> Result<()> {
        if code == 0 {
            Ok(())
        } else {
            Err(Error::from_code(code))
        }
    }
}

/// A single simulation run failed.
///
/// Contained by the local reducer: the task is logged and dropped.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("simulation failed: {0}")]
pub struct SimulationError(pub String);

impl SimulationError {
    /// Build an error from any displayable reason.
    pub fn new(reason: impl Into<String>) -> Self {
        SimulationError(reason.into())
    }
}

/// Two partial results cannot be combined (mismatched shape or schema).
///
/// Contained wherever a merge happens: the offending component is discarded
/// and the accumulated result is kept.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("incompatible results: {0}")]
pub struct IncompatibleResultError(pub String);

impl IncompatibleResultError {
    /// Build an error from any displayable reason.
    pub fn new(reason: impl Into<String>) -> Self {
        IncompatibleResultError(reason.into())
    }
}
