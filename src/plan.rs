//! Partition planning.
//!
//! Splits a manifest's row range into disjoint, contiguous, ordered
//! partitions. Planning is fully deterministic: the same `(row_count, mode)`
//! input always yields the same ranges, which partition file naming relies
//! on. Uneven fixed-count splits front-load the extra rows onto the earliest
//! partitions.

/// Errors raised while computing a partition plan.
#[derive(Debug, thiserror::Error)]
pub enum PlanError {
    /// The manifest has no data rows
    #[error("cannot partition an empty manifest")]
    EmptyManifest,

    /// A partition count of zero was requested
    #[error("partition count must be at least 1")]
    ZeroPartitions,

    /// More partitions than rows would leave empty partitions
    #[error("cannot split {rows} row(s) into {partitions} partitions")]
    MorePartitionsThanRows {
        /// Requested partition count
        partitions: usize,
        /// Available rows
        rows: usize,
    },

    /// A rows-per-partition size of zero was requested
    #[error("rows per partition must be at least 1")]
    ZeroRowsPerPartition,
}

/// How the row range should be split.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlanMode {
    /// Exactly one partition holding every row
    Single,
    /// A fixed number of partitions, sized as evenly as possible
    FixedCount(usize),
    /// Fixed-size partitions with a possibly shorter final remainder
    RowsPer(usize),
}

/// One contiguous slice of manifest rows, with inclusive bounds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PartitionRange {
    /// Zero-based partition index; maps 1:1 to the file name suffix
    pub index: usize,
    /// First row of the slice
    pub first_row: usize,
    /// Last row of the slice (inclusive)
    pub last_row: usize,
}

impl PartitionRange {
    /// Number of rows covered by this range.
    pub fn len(&self) -> usize {
        self.last_row - self.first_row + 1
    }

    /// Always false; a range covers at least one row by construction.
    pub fn is_empty(&self) -> bool {
        false
    }
}

/// An ordered list of disjoint ranges covering all rows exactly once.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PartitionPlan {
    ranges: Vec<PartitionRange>,
}

impl PartitionPlan {
    /// Number of partitions in the plan.
    pub fn len(&self) -> usize {
        self.ranges.len()
    }

    /// True if the plan holds no partitions (never produced by [`plan`]).
    pub fn is_empty(&self) -> bool {
        self.ranges.is_empty()
    }

    /// The planned ranges, ordered by partition index.
    pub fn ranges(&self) -> &[PartitionRange] {
        &self.ranges
    }

    /// Iterates the planned ranges by value.
    pub fn iter(&self) -> impl Iterator<Item = PartitionRange> + '_ {
        self.ranges.iter().copied()
    }
}

/// Computes the partition plan for `row_count` rows under `mode`.
pub fn plan(row_count: usize, mode: PlanMode) -> Result<PartitionPlan, PlanError> {
    if row_count == 0 {
        return Err(PlanError::EmptyManifest);
    }

    let sizes: Vec<usize> = match mode {
        PlanMode::Single => vec![row_count],
        PlanMode::FixedCount(0) => return Err(PlanError::ZeroPartitions),
        PlanMode::FixedCount(partitions) => {
            if partitions > row_count {
                return Err(PlanError::MorePartitionsThanRows {
                    partitions,
                    rows: row_count,
                });
            }
            let base = row_count / partitions;
            let extra = row_count % partitions;
            (0..partitions)
                .map(|index| if index < extra { base + 1 } else { base })
                .collect()
        }
        PlanMode::RowsPer(0) => return Err(PlanError::ZeroRowsPerPartition),
        PlanMode::RowsPer(rows_per) => {
            let full = row_count / rows_per;
            let remainder = row_count % rows_per;
            let mut sizes = vec![rows_per; full];
            if remainder > 0 {
                sizes.push(remainder);
            }
            sizes
        }
    };

    let mut ranges = Vec::with_capacity(sizes.len());
    let mut first_row = 0;
    for (index, size) in sizes.into_iter().enumerate() {
        ranges.push(PartitionRange {
            index,
            first_row,
            last_row: first_row + size - 1,
        });
        first_row += size;
    }

    Ok(PartitionPlan { ranges })
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn assert_covers(plan: &PartitionPlan, rows: usize) {
        let mut next = 0;
        for (i, range) in plan.iter().enumerate() {
            assert_eq!(range.index, i);
            assert_eq!(range.first_row, next);
            assert!(range.last_row >= range.first_row);
            next = range.last_row + 1;
        }
        assert_eq!(next, rows);
    }

    #[test]
    fn ten_rows_into_four_partitions_front_loads() {
        let plan = plan(10, PlanMode::FixedCount(4)).unwrap();
        let sizes: Vec<usize> = plan.iter().map(|r| r.len()).collect();
        assert_eq!(sizes, [3, 3, 2, 2]);
        assert_covers(&plan, 10);
    }

    #[test]
    fn rows_per_partition_leaves_short_remainder() {
        let plan = plan(10, PlanMode::RowsPer(4)).unwrap();
        let sizes: Vec<usize> = plan.iter().map(|r| r.len()).collect();
        assert_eq!(sizes, [4, 4, 2]);
        assert_covers(&plan, 10);
    }

    #[test]
    fn rows_per_partition_exact_multiple_has_no_remainder() {
        let plan = plan(8, PlanMode::RowsPer(4)).unwrap();
        assert_eq!(plan.len(), 2);
        assert_covers(&plan, 8);
    }

    #[test]
    fn single_mode_is_one_range() {
        let plan = plan(3, PlanMode::Single).unwrap();
        assert_eq!(plan.len(), 1);
        assert_eq!(plan.ranges()[0].len(), 3);
    }

    #[test]
    fn zero_rows_fails_for_every_mode() {
        for mode in [
            PlanMode::Single,
            PlanMode::FixedCount(1),
            PlanMode::RowsPer(1),
        ] {
            assert!(matches!(plan(0, mode), Err(PlanError::EmptyManifest)));
        }
    }

    #[test]
    fn invalid_modes_fail() {
        assert!(matches!(
            plan(5, PlanMode::FixedCount(0)),
            Err(PlanError::ZeroPartitions)
        ));
        assert!(matches!(
            plan(5, PlanMode::RowsPer(0)),
            Err(PlanError::ZeroRowsPerPartition)
        ));
        assert!(matches!(
            plan(3, PlanMode::FixedCount(4)),
            Err(PlanError::MorePartitionsThanRows { .. })
        ));
    }

    proptest! {
        #[test]
        fn fixed_count_sizes_differ_by_at_most_one(rows in 1usize..2000, parts in 1usize..50) {
            prop_assume!(parts <= rows);
            let plan = plan(rows, PlanMode::FixedCount(parts)).unwrap();
            prop_assert_eq!(plan.len(), parts);
            let sizes: Vec<usize> = plan.iter().map(|r| r.len()).collect();
            let min = *sizes.iter().min().unwrap();
            let max = *sizes.iter().max().unwrap();
            prop_assert!(max - min <= 1);
            // earlier partitions carry the extra rows
            for window in sizes.windows(2) {
                prop_assert!(window[0] >= window[1]);
            }
            assert_covers(&plan, rows);
        }

        #[test]
        fn rows_per_yields_ceil_div_ranges(rows in 1usize..2000, per in 1usize..100) {
            let plan = plan(rows, PlanMode::RowsPer(per)).unwrap();
            prop_assert_eq!(plan.len(), (rows + per - 1) / per);
            for range in plan.iter().take(plan.len() - 1) {
                prop_assert_eq!(range.len(), per);
            }
            assert_covers(&plan, rows);
        }

        #[test]
        fn planning_is_deterministic(rows in 1usize..500, parts in 1usize..20) {
            prop_assume!(parts <= rows);
            let a = plan(rows, PlanMode::FixedCount(parts)).unwrap();
            let b = plan(rows, PlanMode::FixedCount(parts)).unwrap();
            prop_assert_eq!(a, b);
        }
    }
}
