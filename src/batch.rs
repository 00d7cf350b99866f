//! Work partitioning across the process group.
//!
//! Tasks are split into `n` contiguous batches, one per rank, whose lengths
//! differ by at most one. Concatenating the batches in rank order reproduces
//! the input sequence.

use std::ops::Range;
use tracing::warn;

/// Index range of the batch owned by `rank` when `len` tasks are split across
/// `size` ranks.
///
/// Boundaries are `floor(i * len / size)`, so the first ranks receive the
/// shorter batches when `len` is not a multiple of `size`.
///
/// # Panics
///
/// Panics if `size == 0` or `rank >= size`.
pub fn batch_bounds(len: usize, size: usize, rank: usize) -> Range<usize> {
    assert!(size > 0, "process group must contain at least one rank");
    assert!(rank < size, "rank {rank} out of range for size {size}");
    let start = rank * len / size;
    let end = (rank + 1) * len / size;
    start..end
}

/// Split `tasks` into `size` contiguous batches, one per rank.
///
/// When there are fewer tasks than ranks some batches are empty; this is
/// logged as a resource-utilization warning and is not an error.
///
/// # Panics
///
/// Panics if `size == 0`.
pub fn split_batches<T>(tasks: Vec<T>, size: usize) -> Vec<Vec<T>> {
    assert!(size > 0, "process group must contain at least one rank");
    let len = tasks.len();
    if len < size {
        warn!(
            tasks = len,
            ranks = size,
            idle = size - len,
            "fewer tasks than processes; some ranks will receive an empty batch"
        );
    }

    let mut iter = tasks.into_iter();
    (0..size)
        .map(|rank| {
            let bounds = batch_bounds(len, size, rank);
            iter.by_ref().take(bounds.len()).collect()
        })
        .collect()
}

/// Extract only the batch owned by `rank`, dropping everything else.
///
/// Every rank of a real process group reads the full task list and keeps its
/// own slice; this avoids materializing the other batches.
pub fn take_batch<T>(tasks: Vec<T>, size: usize, rank: usize) -> Vec<T> {
    let bounds = batch_bounds(tasks.len(), size, rank);
    if bounds.is_empty() {
        warn!(
            rank,
            tasks = tasks.len(),
            ranks = size,
            "empty batch; this process has no simulation work"
        );
    }
    tasks
        .into_iter()
        .skip(bounds.start)
        .take(bounds.len())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn even_split() {
        let batches = split_batches((1..=6).collect::<Vec<_>>(), 3);
        assert_eq!(batches, vec![vec![1, 2], vec![3, 4], vec![5, 6]]);
    }

    #[test]
    fn uneven_split_front_loads_short_batches() {
        let batches = split_batches((0..7).collect::<Vec<_>>(), 3);
        let lens: Vec<_> = batches.iter().map(Vec::len).collect();
        assert_eq!(lens, vec![2, 2, 3]);
    }

    #[test]
    fn fewer_tasks_than_ranks_gives_empty_batches() {
        let batches = split_batches(vec!['a', 'b'], 4);
        assert_eq!(batches.len(), 4);
        assert_eq!(batches.iter().filter(|b| b.is_empty()).count(), 2);
        assert_eq!(batches.concat(), vec!['a', 'b']);
    }

    #[test]
    fn no_tasks() {
        let batches: Vec<Vec<u8>> = split_batches(Vec::new(), 5);
        assert_eq!(batches.len(), 5);
        assert!(batches.iter().all(Vec::is_empty));
    }

    #[test]
    fn single_rank_owns_everything() {
        assert_eq!(split_batches(vec![1, 2, 3], 1), vec![vec![1, 2, 3]]);
    }

    #[test]
    fn take_batch_matches_split() {
        let tasks: Vec<u32> = (0..11).collect();
        let all = split_batches(tasks.clone(), 4);
        for (rank, batch) in all.iter().enumerate() {
            assert_eq!(&take_batch(tasks.clone(), 4, rank), batch);
        }
    }

    #[test]
    #[should_panic(expected = "at least one rank")]
    fn zero_ranks_panics() {
        let _ = split_batches(vec![1], 0);
    }

    proptest! {
        #[test]
        fn concatenation_reproduces_input(len in 0usize..200, size in 1usize..40) {
            let tasks: Vec<usize> = (0..len).collect();
            let batches = split_batches(tasks.clone(), size);
            prop_assert_eq!(batches.len(), size);
            prop_assert_eq!(batches.concat(), tasks);
        }

        #[test]
        fn lengths_differ_by_at_most_one(len in 0usize..200, size in 1usize..40) {
            let lens: Vec<usize> = (0..size).map(|r| batch_bounds(len, size, r).len()).collect();
            let max = *lens.iter().max().unwrap();
            let min = *lens.iter().min().unwrap();
            prop_assert!(max - min <= 1);
        }
    }
}
