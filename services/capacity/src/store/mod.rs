//! Storage seam used by the capacity checker.
//!
//! A [`Storage`] hands out one [`Session`] per job run. The session owns
//! whatever connection backs it and gives it back when dropped, so every
//! exit path of a run (success, early return, error or cancellation)
//! releases it.

pub mod memory;

use async_trait::async_trait;
use laterq_id::{PoolId, TaskId, UserId};

use crate::capacity::model::{DeviceToken, Notification, PoolCategory, Task, TaskPool};
use crate::db::DbError;

pub use memory::MemoryStore;

/// Source of storage sessions.
#[async_trait]
pub trait Storage: Send + Sync {
    /// Acquires a session for one job run.
    async fn open_session(&self) -> Result<Box<dyn Session>, DbError>;

    /// Checks that the backing store is reachable.
    async fn ping(&self) -> Result<(), DbError>;
}

/// Record operations available to a job run.
#[async_trait]
pub trait Session: Send {
    /// All pools in `category`.
    async fn pools_by_category(&mut self, category: PoolCategory)
        -> Result<Vec<TaskPool>, DbError>;

    /// Tasks assigned to `pool_id`, oldest first.
    async fn tasks_in_pool(&mut self, pool_id: PoolId) -> Result<Vec<Task>, DbError>;

    /// The pool `owner_id` has in `category`, if any.
    async fn find_pool(
        &mut self,
        owner_id: UserId,
        category: PoolCategory,
    ) -> Result<Option<TaskPool>, DbError>;

    /// Reassigns a task to `pool_id`, touching nothing else.
    ///
    /// Returns [`DbError::NotFound`] when the task does not exist.
    async fn move_task(&mut self, task_id: TaskId, pool_id: PoolId) -> Result<(), DbError>;

    /// Inserts notifications, ignoring any whose `(user_id, task_id)` already
    /// exists. Returns how many rows were actually inserted.
    async fn insert_notifications(&mut self, notifications: &[Notification])
        -> Result<u64, DbError>;

    /// Registered devices of `user_id`.
    async fn device_tokens_for(&mut self, user_id: UserId) -> Result<Vec<DeviceToken>, DbError>;
}
