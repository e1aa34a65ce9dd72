//! The capacity check job.
//!
//! One run walks every active pool in turn:
//!
//! 1. load the pool's tasks, oldest first
//! 2. find the overflow boundary (see [`super::boundary`])
//! 3. move every overflowed task into the owner's pending pool
//! 4. store one notification per overflowed task (duplicates ignored)
//! 5. push each notification to all of the owner's devices
//!
//! Query failures while loading pools or tasks abort the run. Everything
//! after the boundary is best effort per task, per message and per pool, and
//! is reported through [`RunReport`].

use std::sync::Arc;

use chrono::{DateTime, TimeDelta, Utc};
use laterq_id::{PoolId, UserId};
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::{debug, info, instrument, warn};

use super::boundary::{scan_queue, DEFAULT_CAPACITY};
use super::model::{NotificationTemplate, PoolCategory, TaskPool};
use super::notify::{build_notifications, dispatch, DispatchSummary};
use super::remediation::{remediate, TaskRemediation};
use crate::db::DbError;
use crate::push::PushSender;
use crate::store::{Session, Storage};

/// Errors that abort a whole run.
#[derive(Debug, Error)]
pub enum CapacityError {
    #[error("failed to open storage session: {0}")]
    Session(#[source] DbError),

    #[error("failed to load active pools: {0}")]
    LoadPools(#[source] DbError),

    #[error("failed to load tasks of pool {pool_id}: {source}")]
    LoadTasks {
        pool_id: PoolId,
        #[source]
        source: DbError,
    },
}

/// Checker settings.
#[derive(Debug, Clone)]
pub struct CheckerConfig {
    /// Accumulated task age a pool may hold before it overflows.
    pub capacity: TimeDelta,
    pub template: NotificationTemplate,
}

impl Default for CheckerConfig {
    fn default() -> Self {
        Self {
            capacity: DEFAULT_CAPACITY,
            template: NotificationTemplate::default(),
        }
    }
}

/// How the owner's devices were reached for one pool.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Delivery {
    /// Notifications could not be stored, so nothing was pushed.
    NotAttempted,
    /// The device token lookup failed.
    TokenLookupFailed(String),
    /// The owner has no registered devices.
    NoDevices,
    Sent(DispatchSummary),
}

/// What happened to an overflowing pool.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OverflowSummary {
    pub boundary: usize,
    pub remediation: Vec<TaskRemediation>,
    pub notifications_built: usize,
    /// Newly stored notifications; duplicates of earlier runs are not counted.
    pub notifications_inserted: u64,
    /// Set when storing notifications failed.
    pub persist_error: Option<String>,
    pub delivery: Delivery,
}

impl OverflowSummary {
    pub fn tasks_moved(&self) -> usize {
        self.remediation
            .iter()
            .filter(|r| r.outcome.is_moved())
            .count()
    }

    pub fn tasks_skipped(&self) -> usize {
        self.remediation.len() - self.tasks_moved()
    }
}

/// Per-pool result of a run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PoolOutcome {
    NoOverflow { task_count: usize, boundary: usize },
    Overflowed(OverflowSummary),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PoolReport {
    pub pool_id: PoolId,
    pub owner_id: UserId,
    pub outcome: PoolOutcome,
}

impl PoolReport {
    pub fn overflow(&self) -> Option<&OverflowSummary> {
        match &self.outcome {
            PoolOutcome::Overflowed(summary) => Some(summary),
            PoolOutcome::NoOverflow { .. } => None,
        }
    }
}

/// Summary of one run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunReport {
    /// True when another run was already in progress and this one did nothing.
    pub skipped: bool,
    pub pools: Vec<PoolReport>,
}

impl RunReport {
    pub fn skipped() -> Self {
        Self {
            skipped: true,
            pools: Vec::new(),
        }
    }

    fn overflows(&self) -> impl Iterator<Item = &OverflowSummary> {
        self.pools.iter().filter_map(PoolReport::overflow)
    }

    pub fn pools_overflowed(&self) -> usize {
        self.overflows().count()
    }

    pub fn tasks_moved(&self) -> usize {
        self.overflows().map(OverflowSummary::tasks_moved).sum()
    }

    pub fn notifications_built(&self) -> usize {
        self.overflows().map(|o| o.notifications_built).sum()
    }

    pub fn messages_sent(&self) -> usize {
        self.overflows()
            .map(|o| match o.delivery {
                Delivery::Sent(summary) => summary.messages_sent,
                _ => 0,
            })
            .sum()
    }

    /// Notification persistence errors, which the trigger reports as a failure.
    pub fn persist_errors(&self) -> Vec<&str> {
        self.overflows()
            .filter_map(|o| o.persist_error.as_deref())
            .collect()
    }
}

/// Runs capacity checks against a storage backend and push transport.
pub struct CapacityChecker {
    storage: Arc<dyn Storage>,
    push: Arc<dyn PushSender>,
    config: CheckerConfig,
    run_lock: Mutex<()>,
}

impl CapacityChecker {
    pub fn new(storage: Arc<dyn Storage>, push: Arc<dyn PushSender>, config: CheckerConfig) -> Self {
        Self {
            storage,
            push,
            config,
            run_lock: Mutex::new(()),
        }
    }

    /// Run a check as of now.
    pub async fn run(&self) -> Result<RunReport, CapacityError> {
        self.run_at(Utc::now()).await
    }

    /// Run a check using `now` as the reference time for task ages.
    ///
    /// Only one run executes at a time; a call made while another is in
    /// progress returns [`RunReport::skipped`] immediately.
    #[instrument(skip(self))]
    pub async fn run_at(&self, now: DateTime<Utc>) -> Result<RunReport, CapacityError> {
        let Ok(_running) = self.run_lock.try_lock() else {
            info!("Capacity check already running; skipping");
            return Ok(RunReport::skipped());
        };

        let mut session = self
            .storage
            .open_session()
            .await
            .map_err(CapacityError::Session)?;

        let pools = match session.pools_by_category(PoolCategory::Active).await {
            Ok(pools) => pools,
            Err(e) if e.is_not_found() => Vec::new(),
            Err(e) => return Err(CapacityError::LoadPools(e)),
        };
        debug!(pool_count = pools.len(), "Loaded active pools");

        let mut report = RunReport::default();
        for pool in &pools {
            let outcome = self.check_pool(session.as_mut(), pool, now).await?;
            report.pools.push(PoolReport {
                pool_id: pool.id,
                owner_id: pool.owner_id,
                outcome,
            });
        }

        info!(
            pools_checked = report.pools.len(),
            pools_overflowed = report.pools_overflowed(),
            tasks_moved = report.tasks_moved(),
            notifications = report.notifications_built(),
            messages_sent = report.messages_sent(),
            persist_errors = report.persist_errors().len(),
            "Capacity check complete"
        );

        Ok(report)
    }

    #[instrument(skip(self, session, pool, now), fields(pool_id = %pool.id, owner_id = %pool.owner_id))]
    async fn check_pool(
        &self,
        session: &mut dyn Session,
        pool: &TaskPool,
        now: DateTime<Utc>,
    ) -> Result<PoolOutcome, CapacityError> {
        let tasks = match session.tasks_in_pool(pool.id).await {
            Ok(tasks) => tasks,
            Err(e) if e.is_not_found() => Vec::new(),
            Err(source) => {
                return Err(CapacityError::LoadTasks {
                    pool_id: pool.id,
                    source,
                })
            }
        };

        let scan = scan_queue(&tasks, now, self.config.capacity);
        let Some(overflowed) = scan.overflowed else {
            debug!(task_count = tasks.len(), boundary = scan.boundary, "No overflow");
            return Ok(PoolOutcome::NoOverflow {
                task_count: tasks.len(),
                boundary: scan.boundary,
            });
        };

        info!(
            task_count = tasks.len(),
            boundary = scan.boundary,
            overflowed = overflowed.len(),
            "Pool over capacity"
        );

        let remediation = remediate(session, pool.owner_id, overflowed).await;
        let notifications = build_notifications(pool.owner_id, overflowed, &self.config.template);

        let mut summary = OverflowSummary {
            boundary: scan.boundary,
            remediation,
            notifications_built: notifications.len(),
            notifications_inserted: 0,
            persist_error: None,
            delivery: Delivery::NotAttempted,
        };

        match session.insert_notifications(&notifications).await {
            Ok(inserted) => summary.notifications_inserted = inserted,
            Err(e) => {
                warn!(error = %e, "Failed to store notifications");
                summary.persist_error = Some(e.to_string());
                return Ok(PoolOutcome::Overflowed(summary));
            }
        }

        if notifications.is_empty() {
            return Ok(PoolOutcome::Overflowed(summary));
        }

        let devices = match session.device_tokens_for(pool.owner_id).await {
            Ok(devices) => devices,
            Err(e) if e.is_not_found() => Vec::new(),
            Err(e) => {
                warn!(error = %e, "Failed to load device tokens");
                summary.delivery = Delivery::TokenLookupFailed(e.to_string());
                return Ok(PoolOutcome::Overflowed(summary));
            }
        };

        summary.delivery = if devices.is_empty() {
            debug!("Owner has no registered devices");
            Delivery::NoDevices
        } else {
            Delivery::Sent(dispatch(self.push.as_ref(), &notifications, &devices).await)
        };

        Ok(PoolOutcome::Overflowed(summary))
    }
}
