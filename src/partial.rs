//! The possibly-absent partial result owned by one rank.

use crate::capability::Mergeable;
use crate::error::IncompatibleResultError;
use serde::{Deserialize, Serialize};

/// Accumulated outcome of zero or more successful tasks on one rank.
///
/// `Empty` and `Failed` are both the *absent* state: there is no usable data.
/// They differ only in what gets logged and persisted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Partial<R> {
    /// At least one task contributed data.
    Present(R),
    /// Nothing was ever assigned or received.
    Empty,
    /// Work was attempted but nothing usable survived.
    Failed(String),
}

impl<R> Default for Partial<R> {
    fn default() -> Self {
        Partial::Empty
    }
}

impl<R> Partial<R> {
    /// Whether this is the absent state.
    pub fn is_absent(&self) -> bool {
        !matches!(self, Partial::Present(_))
    }

    /// Borrow the data, if any.
    pub fn present(&self) -> Option<&R> {
        match self {
            Partial::Present(r) => Some(r),
            _ => None,
        }
    }

    /// Take the data, if any.
    pub fn into_present(self) -> Option<R> {
        match self {
            Partial::Present(r) => Some(r),
            _ => None,
        }
    }

    /// Human-readable reason for the absent state.
    pub fn absence_reason(&self) -> Option<&str> {
        match self {
            Partial::Present(_) => None,
            Partial::Empty => Some("no data"),
            Partial::Failed(reason) => Some(reason),
        }
    }
}

impl<R: Mergeable> Partial<R> {
    /// Fold an incoming result into this one.
    ///
    /// An absent accumulator adopts `incoming`. A present one merges it; on
    /// merge failure the accumulator is unchanged and `incoming` is dropped.
    pub fn absorb(&mut self, incoming: R) -> Result<(), IncompatibleResultError> {
        match self {
            Partial::Present(acc) => acc.merge(incoming),
            _ => {
                *self = Partial::Present(incoming);
                Ok(())
            }
        }
    }

    /// Number of elementary outcomes aggregated (zero when absent).
    pub fn record_count(&self) -> usize {
        self.present().map_or(0, Mergeable::record_count)
    }
}

impl<R> From<Option<R>> for Partial<R> {
    fn from(value: Option<R>) -> Self {
        value.map_or(Partial::Empty, Partial::Present)
    }
}
