//! Shard and GPU partitioning for data-parallel workers.

use std::ops::Range;

use crate::error::InferenceError;

/// Splits `n_items` into `n_splits` contiguous, roughly equal ranges.
///
/// The first `n_items % n_splits` ranges carry one extra item. Concatenating
/// the ranges in order reproduces `0..n_items` exactly, which is what gives
/// the drivers their end-to-end ordering guarantee.
pub fn split_ranges(n_items: usize, n_splits: usize) -> Vec<Range<usize>> {
    assert!(n_splits > 0, "split count must be positive");

    let base = n_items / n_splits;
    let remainder = n_items % n_splits;

    let mut ranges = Vec::with_capacity(n_splits);
    let mut start = 0;
    for i in 0..n_splits {
        let len = base + usize::from(i < remainder);
        ranges.push(start..start + len);
        start += len;
    }
    ranges
}

/// Partitions `n_gpus` devices disjointly across `n_splits` workers.
///
/// Returns one comma-joined device list per split, suitable for
/// `CUDA_VISIBLE_DEVICES`. The GPU count must be divisible by the split
/// count so each worker gets the same tensor-parallel degree.
pub fn gpu_assignments(n_gpus: usize, n_splits: usize) -> Result<Vec<String>, InferenceError> {
    if n_splits == 0 || n_gpus == 0 || n_gpus % n_splits != 0 {
        return Err(InferenceError::InvalidGpuPartition { n_gpus, n_splits });
    }

    let per_split = n_gpus / n_splits;
    Ok((0..n_splits)
        .map(|i| {
            (i * per_split..(i + 1) * per_split)
                .map(|g| g.to_string())
                .collect::<Vec<_>>()
                .join(",")
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ranges_are_contiguous_and_cover_input() {
        for (n_items, n_splits) in [(10, 3), (7, 7), (3, 5), (0, 2), (100, 4)] {
            let ranges = split_ranges(n_items, n_splits);
            assert_eq!(ranges.len(), n_splits);

            let mut expected_start = 0;
            for range in &ranges {
                assert_eq!(range.start, expected_start);
                expected_start = range.end;
            }
            assert_eq!(expected_start, n_items);
        }
    }

    #[test]
    fn ranges_are_balanced() {
        let ranges = split_ranges(10, 3);
        let lens: Vec<usize> = ranges.iter().map(|r| r.len()).collect();
        assert_eq!(lens, vec![4, 3, 3]);
    }

    #[test]
    fn gpus_partition_disjointly() {
        let assignments = gpu_assignments(8, 4).unwrap();
        assert_eq!(assignments, vec!["0,1", "2,3", "4,5", "6,7"]);

        let assignments = gpu_assignments(4, 4).unwrap();
        assert_eq!(assignments, vec!["0", "1", "2", "3"]);
    }

    #[test]
    fn indivisible_gpu_count_is_rejected() {
        assert!(matches!(
            gpu_assignments(6, 4),
            Err(InferenceError::InvalidGpuPartition { n_gpus: 6, n_splits: 4 })
        ));
        assert!(gpu_assignments(0, 2).is_err());
    }
}
