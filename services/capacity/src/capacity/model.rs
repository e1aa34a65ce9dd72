//! Records the capacity checker reads and writes.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use laterq_id::{DeviceTokenId, NotificationId, PoolId, TaskId, UserId};
use serde::{Deserialize, Serialize};

/// Lifecycle stage of a task pool.
///
/// An owner has at most one pool per category.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PoolCategory {
    /// Tasks the owner is currently expected to get through.
    Active,
    /// Tasks that overflowed out of the active pool.
    Pending,
}

impl PoolCategory {
    /// Stored column value.
    pub fn as_str(&self) -> &'static str {
        match self {
            PoolCategory::Active => "active",
            PoolCategory::Pending => "pending",
        }
    }
}

impl fmt::Display for PoolCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned when a stored category value is not recognised.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown pool category '{0}'")]
pub struct UnknownCategory(pub String);

impl FromStr for PoolCategory {
    type Err = UnknownCategory;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "active" => Ok(PoolCategory::Active),
            "pending" => Ok(PoolCategory::Pending),
            other => Err(UnknownCategory(other.to_string())),
        }
    }
}

/// A group of tasks belonging to one owner at one lifecycle stage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskPool {
    pub id: PoolId,
    pub owner_id: UserId,
    pub category: PoolCategory,
}

/// A queued task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Task {
    pub id: TaskId,
    /// `None` when the task is not assigned to any pool.
    pub pool_id: Option<PoolId>,
    pub created_at: DateTime<Utc>,
}

/// A device registration for push delivery.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceToken {
    pub id: DeviceTokenId,
    pub user_id: UserId,
    pub registration_token: String,
}

/// Fixed copy and link base used for overflow notifications.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NotificationTemplate {
    pub title: String,
    pub body: String,
    /// Prefix of the per-task detail page; the task id is appended.
    pub link_base: String,
}

impl Default for NotificationTemplate {
    fn default() -> Self {
        Self {
            title: "時間切れです".to_string(),
            body: "あなたのあとまわしリンクがあふれました".to_string(),
            link_base: "https://dolater.kantacky.com/tasks/".to_string(),
        }
    }
}

impl NotificationTemplate {
    /// Deep link to the detail page of `task_id`.
    pub fn task_url(&self, task_id: TaskId) -> String {
        format!("{}{}", self.link_base, task_id)
    }
}

/// Append-only notification log entry.
///
/// `(user_id, task_id)` is the deduplication key: inserting a second record
/// for the same pair is silently absorbed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Notification {
    pub id: NotificationId,
    pub user_id: UserId,
    pub task_id: TaskId,
    pub title: String,
    pub body: String,
    pub url: String,
}

impl Notification {
    /// Builds the notification telling `owner` that `task` overflowed.
    pub fn for_overflowed_task(
        owner: UserId,
        task: &Task,
        template: &NotificationTemplate,
    ) -> Self {
        Self {
            id: NotificationId::new(),
            user_id: owner,
            task_id: task.id,
            title: template.title.clone(),
            body: template.body.clone(),
            url: template.task_url(task.id),
        }
    }
}
