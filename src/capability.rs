//! Capabilities the reduction pipeline consumes but does not implement.
//!
//! A [`Simulator`] turns one task descriptor into one result; a [`Mergeable`]
//! result knows how to fold another result of the same kind into itself.

use crate::error::{IncompatibleResultError, SimulationError};

/// Produces one result from one task descriptor.
pub trait Simulator {
    /// Opaque parameter record describing one run.
    type Task;
    /// Mergeable outcome of one run.
    type Output: Mergeable;

    /// Run a single task.
    fn run(&self, task: &Self::Task) -> Result<Self::Output, SimulationError>;
}

impl<S: Simulator + ?Sized> Simulator for &S {
    type Task = S::Task;
    type Output = S::Output;

    fn run(&self, task: &Self::Task) -> Result<Self::Output, SimulationError> {
        (**self).run(task)
    }
}

/// A partial result that can absorb another partial result.
///
/// Implementations should be commutative and associative up to the precision
/// of the underlying data: the shape of the reduction tree depends on the
/// process group size and is not otherwise controllable.
pub trait Mergeable: Sized {
    /// Fold `other` into `self`.
    ///
    /// On error `self` must be left exactly as it was before the call.
    fn merge(&mut self, other: Self) -> Result<(), IncompatibleResultError>;

    /// Number of elementary outcomes (e.g. trajectories) aggregated so far.
    fn record_count(&self) -> usize;
}
