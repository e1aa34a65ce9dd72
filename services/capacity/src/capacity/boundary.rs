//! Overflow boundary of an age-ordered task queue.
//!
//! Walking the queue oldest first, each task's age (reference time minus
//! creation time) is added to a running total. The boundary is the first
//! position whose *preceding* total is strictly greater than the capacity;
//! every task from there on has overflowed. When the total never exceeds the
//! capacity the boundary is the queue length.
//!
//! A boundary on the last task (or past it) is not acted on, so a pool needs
//! at least two overflowed tasks before anything is moved.

use chrono::{DateTime, TimeDelta, Utc};

use super::model::Task;

/// Default pool capacity: one week of accumulated task age.
pub const DEFAULT_CAPACITY: TimeDelta = TimeDelta::seconds(60 * 60 * 24 * 7);

/// Index of the first task whose exclusive prefix age sum exceeds `capacity`.
///
/// Returns `ages.len()` when there is no such task.
pub fn boundary_index(ages: &[TimeDelta], capacity: TimeDelta) -> usize {
    let mut elapsed = TimeDelta::zero();

    for (i, age) in ages.iter().enumerate() {
        if elapsed > capacity {
            return i;
        }
        elapsed = saturating_add(elapsed, *age);
    }

    ages.len()
}

fn saturating_add(total: TimeDelta, age: TimeDelta) -> TimeDelta {
    total.checked_add(&age).unwrap_or(if age < TimeDelta::zero() {
        TimeDelta::MIN
    } else {
        TimeDelta::MAX
    })
}

/// Whether a boundary leaves anything to remediate.
///
/// False when `boundary >= len - 1`, which also covers empty queues and the
/// "no overflow" boundary of `len`.
pub fn is_actionable(boundary: usize, len: usize) -> bool {
    boundary + 1 < len
}

/// Result of scanning one pool's queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueueScan<'a> {
    /// Position of the first overflowed task, or the queue length.
    pub boundary: usize,
    /// Tasks at and after the boundary; `None` when not actionable.
    pub overflowed: Option<&'a [Task]>,
}

impl QueueScan<'_> {
    /// Number of tasks to remediate.
    pub fn overflow_count(&self) -> usize {
        self.overflowed.map_or(0, <[Task]>::len)
    }
}

/// Scans `tasks` (ascending `created_at`) as of `now`.
pub fn scan_queue(tasks: &[Task], now: DateTime<Utc>, capacity: TimeDelta) -> QueueScan<'_> {
    let ages: Vec<TimeDelta> = tasks
        .iter()
        .map(|task| now.signed_duration_since(task.created_at))
        .collect();

    let boundary = boundary_index(&ages, capacity);
    let overflowed = is_actionable(boundary, tasks.len()).then(|| &tasks[boundary..]);

    QueueScan {
        boundary,
        overflowed,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use laterq_id::{PoolId, TaskId};
    use proptest::prelude::*;
    use rstest::rstest;

    const DAY: TimeDelta = TimeDelta::seconds(86_400);

    fn days(n: usize) -> Vec<TimeDelta> {
        vec![DAY; n]
    }

    fn queue(now: DateTime<Utc>, ages: &[TimeDelta]) -> Vec<Task> {
        let pool_id = PoolId::new();
        ages.iter()
            .map(|age| Task {
                id: TaskId::new(),
                pool_id: Some(pool_id),
                created_at: now - *age,
            })
            .collect()
    }

    #[test]
    fn test_default_capacity_is_one_week() {
        assert_eq!(DEFAULT_CAPACITY.num_seconds(), 604_800);
    }

    #[rstest]
    #[case::empty(vec![], 0)]
    #[case::single_old_task(vec![DAY * 30], 1)]
    #[case::exactly_at_capacity(days(7), 7)]
    #[case::one_day_each_ten_tasks(days(10), 8)]
    #[case::first_task_alone_overflows(vec![DAY * 8, DAY, DAY], 1)]
    #[case::young_tasks(vec![TimeDelta::minutes(5); 50], 50)]
    #[case::sub_millisecond_excess(vec![DAY + TimeDelta::microseconds(900); 10], 7)]
    #[case::nanoseconds_over_capacity(vec![DAY * 7 + TimeDelta::nanoseconds(1), DAY, DAY], 1)]
    fn test_boundary_index(#[case] ages: Vec<TimeDelta>, #[case] expected: usize) {
        assert_eq!(boundary_index(&ages, DEFAULT_CAPACITY), expected);
    }

    #[test]
    fn test_slightly_over_a_day_each_overflows_three() {
        // 7 * (1 day + 1s) already exceeds a week, so the 8th task is the boundary.
        let ages = vec![DAY + TimeDelta::seconds(1); 10];
        assert_eq!(boundary_index(&ages, DEFAULT_CAPACITY), 7);

        let now = Utc::now();
        let tasks = queue(now, &ages);
        let scan = scan_queue(&tasks, now, DEFAULT_CAPACITY);
        assert_eq!(scan.overflow_count(), 3);
        assert_eq!(scan.overflowed.unwrap()[0].id, tasks[7].id);
    }

    #[test]
    fn test_sub_millisecond_ages_count_toward_capacity() {
        // Each task is 900us over a day; seven of them exceed a week by 6.3ms.
        let now = Utc::now();
        let tasks = queue(now, &[DAY + TimeDelta::microseconds(900); 10]);
        let scan = scan_queue(&tasks, now, DEFAULT_CAPACITY);
        assert_eq!(scan.boundary, 7);
        assert_eq!(scan.overflow_count(), 3);
    }

    #[test]
    fn test_huge_ages_saturate() {
        let ages = vec![TimeDelta::MAX, TimeDelta::MAX, DAY];
        assert_eq!(boundary_index(&ages, DEFAULT_CAPACITY), 1);
    }

    #[rstest]
    #[case(0, 0, false)]
    #[case(1, 1, false)]
    #[case(4, 5, false)]
    #[case(5, 5, false)]
    #[case(3, 5, true)]
    #[case(0, 2, true)]
    fn test_is_actionable(#[case] boundary: usize, #[case] len: usize, #[case] expected: bool) {
        assert_eq!(is_actionable(boundary, len), expected);
    }

    #[test]
    fn test_boundary_on_last_task_is_skipped() {
        let now = Utc::now();
        let tasks = queue(now, &[DAY * 2, DAY * 2, DAY * 2, DAY * 2, DAY]);
        let scan = scan_queue(&tasks, now, DEFAULT_CAPACITY);
        assert_eq!(scan.boundary, 4);
        assert_eq!(scan.overflowed, None);
        assert_eq!(scan.overflow_count(), 0);
    }

    #[test]
    fn test_no_overflow_is_skipped() {
        let now = Utc::now();
        let tasks = queue(now, &days(3));
        let scan = scan_queue(&tasks, now, DEFAULT_CAPACITY);
        assert_eq!(scan.boundary, 3);
        assert!(scan.overflowed.is_none());
    }

    #[test]
    fn test_future_tasks_reduce_elapsed_time() {
        let ages = vec![DAY * 8, -DAY * 2, DAY, DAY];
        // 8d > 7d at index 1 already.
        assert_eq!(boundary_index(&ages, DEFAULT_CAPACITY), 1);

        let ages = vec![DAY * 6, -DAY * 2, DAY * 2, DAY, DAY];
        // 6d, 4d, 6d, 7d: never strictly over.
        assert_eq!(boundary_index(&ages, DEFAULT_CAPACITY), 5);
    }

    proptest! {
        #[test]
        fn prop_boundary_is_first_exclusive_prefix_over_capacity(
            secs in proptest::collection::vec(0i64..400_000, 0..40)
        ) {
            let ages: Vec<TimeDelta> = secs.iter().map(|s| TimeDelta::seconds(*s)).collect();
            let boundary = boundary_index(&ages, DEFAULT_CAPACITY);

            let mut prefix = 0i64;
            let mut expected = ages.len();
            for (i, s) in secs.iter().enumerate() {
                if prefix > DEFAULT_CAPACITY.num_seconds() {
                    expected = i;
                    break;
                }
                prefix += s;
            }
            prop_assert_eq!(boundary, expected);
        }

        #[test]
        fn prop_overflow_only_when_at_least_two_tasks_past_boundary(
            secs in proptest::collection::vec(0i64..400_000, 0..40)
        ) {
            let now = Utc::now();
            let ages: Vec<TimeDelta> = secs.iter().map(|s| TimeDelta::seconds(*s)).collect();
            let tasks = queue(now, &ages);
            let scan = scan_queue(&tasks, now, DEFAULT_CAPACITY);
            match scan.overflowed {
                Some(overflowed) => {
                    prop_assert!(overflowed.len() >= 2);
                    prop_assert_eq!(overflowed.len(), tasks.len() - scan.boundary);
                }
                None => prop_assert!(scan.boundary + 1 >= tasks.len()),
            }
        }
    }
}
