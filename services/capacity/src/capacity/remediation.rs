//! Moving overflowed tasks into the owner's pending pool.
//!
//! Every task is handled on its own: the pending pool is resolved per task
//! and a failure only affects that task, which then stays where it was.

use std::fmt;

use laterq_id::{PoolId, TaskId, UserId};
use tracing::{debug, warn};

use super::model::{PoolCategory, Task};
use crate::store::Session;

/// Why a task was left in its original pool.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SkipReason {
    /// The owner has no pending pool.
    NoPendingPool,
    /// Looking up the pending pool failed.
    LookupFailed(String),
    /// The pool reassignment failed.
    UpdateFailed(String),
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SkipReason::NoPendingPool => f.write_str("owner has no pending pool"),
            SkipReason::LookupFailed(e) => write!(f, "pending pool lookup failed: {e}"),
            SkipReason::UpdateFailed(e) => write!(f, "task update failed: {e}"),
        }
    }
}

/// What happened to one overflowed task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RemediationOutcome {
    Moved { to: PoolId },
    Skipped(SkipReason),
}

impl RemediationOutcome {
    pub fn is_moved(&self) -> bool {
        matches!(self, RemediationOutcome::Moved { .. })
    }
}

/// Outcome for a single task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskRemediation {
    pub task_id: TaskId,
    pub outcome: RemediationOutcome,
}

/// Moves each of `overflowed` into `owner_id`'s pending pool.
///
/// Never fails as a whole; per-task problems are returned as
/// [`RemediationOutcome::Skipped`].
pub async fn remediate(
    session: &mut dyn Session,
    owner_id: UserId,
    overflowed: &[Task],
) -> Vec<TaskRemediation> {
    let mut results = Vec::with_capacity(overflowed.len());

    for task in overflowed {
        let outcome = remediate_task(session, owner_id, task).await;
        match &outcome {
            RemediationOutcome::Moved { to } => {
                debug!(task_id = %task.id, pool_id = %to, "Moved overflowed task to pending pool");
            }
            RemediationOutcome::Skipped(reason) => {
                warn!(task_id = %task.id, owner_id = %owner_id, reason = %reason, "Skipped overflowed task");
            }
        }
        results.push(TaskRemediation {
            task_id: task.id,
            outcome,
        });
    }

    results
}

async fn remediate_task(
    session: &mut dyn Session,
    owner_id: UserId,
    task: &Task,
) -> RemediationOutcome {
    let pending = match session.find_pool(owner_id, PoolCategory::Pending).await {
        Ok(Some(pool)) => pool,
        Ok(None) => return RemediationOutcome::Skipped(SkipReason::NoPendingPool),
        Err(e) if e.is_not_found() => return RemediationOutcome::Skipped(SkipReason::NoPendingPool),
        Err(e) => return RemediationOutcome::Skipped(SkipReason::LookupFailed(e.to_string())),
    };

    match session.move_task(task.id, pending.id).await {
        Ok(()) => RemediationOutcome::Moved { to: pending.id },
        Err(e) => RemediationOutcome::Skipped(SkipReason::UpdateFailed(e.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{MemoryStore, Storage};
    use chrono::{TimeDelta, Utc};

    #[tokio::test]
    async fn test_moves_tasks_and_keeps_created_at() {
        let store = MemoryStore::new();
        let owner = UserId::new();
        let active = store.add_pool(owner, PoolCategory::Active).await;
        let pending = store.add_pool(owner, PoolCategory::Pending).await;
        let created_at = Utc::now() - TimeDelta::days(3);
        let task = store.add_task(active.id, created_at).await;

        let mut session = store.open_session().await.unwrap();
        let results = remediate(session.as_mut(), owner, &[task.clone()]).await;

        assert_eq!(
            results,
            vec![TaskRemediation {
                task_id: task.id,
                outcome: RemediationOutcome::Moved { to: pending.id },
            }]
        );
        let stored = store.task(task.id).await.unwrap();
        assert_eq!(stored.pool_id, Some(pending.id));
        assert_eq!(stored.created_at, created_at);
    }

    #[tokio::test]
    async fn test_missing_pending_pool_leaves_task_in_place() {
        let store = MemoryStore::new();
        let owner = UserId::new();
        let active = store.add_pool(owner, PoolCategory::Active).await;
        let task = store.add_task(active.id, Utc::now()).await;

        let mut session = store.open_session().await.unwrap();
        let results = remediate(session.as_mut(), owner, &[task.clone()]).await;

        assert_eq!(
            results[0].outcome,
            RemediationOutcome::Skipped(SkipReason::NoPendingPool)
        );
        assert_eq!(store.task(task.id).await.unwrap().pool_id, Some(active.id));
    }

    #[tokio::test]
    async fn test_update_failure_does_not_stop_the_batch() {
        let store = MemoryStore::new();
        let owner = UserId::new();
        let active = store.add_pool(owner, PoolCategory::Active).await;
        let pending = store.add_pool(owner, PoolCategory::Pending).await;
        let vanished = Task {
            id: TaskId::new(),
            pool_id: Some(active.id),
            created_at: Utc::now(),
        };
        let real = store.add_task(active.id, Utc::now()).await;

        let mut session = store.open_session().await.unwrap();
        let results = remediate(session.as_mut(), owner, &[vanished, real.clone()]).await;

        assert!(matches!(
            results[0].outcome,
            RemediationOutcome::Skipped(SkipReason::UpdateFailed(_))
        ));
        assert!(results[1].outcome.is_moved());
        assert_eq!(store.task(real.id).await.unwrap().pool_id, Some(pending.id));
    }
}
