//! In-memory storage.
//!
//! Honours the same contract as the Postgres store: tasks come back oldest
//! first, task moves only touch the pool reference and notification inserts
//! ignore duplicate `(user_id, task_id)` pairs. Used by tests and by dev mode
//! when no database is configured.

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use laterq_id::{DeviceTokenId, PoolId, TaskId, UserId};
use tokio::sync::Mutex;

use super::{Session, Storage};
use crate::capacity::model::{DeviceToken, Notification, PoolCategory, Task, TaskPool};
use crate::db::DbError;

#[derive(Default)]
struct MemoryState {
    pools: BTreeMap<PoolId, TaskPool>,
    tasks: BTreeMap<TaskId, Task>,
    tokens: Vec<DeviceToken>,
    notifications: HashMap<(UserId, TaskId), Notification>,
}

/// Shared in-memory store. Clones see the same data.
#[derive(Clone, Default)]
pub struct MemoryStore {
    state: Arc<Mutex<MemoryState>>,
    open_sessions: Arc<AtomicUsize>,
}

impl MemoryStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a pool for `owner_id`.
    pub async fn add_pool(&self, owner_id: UserId, category: PoolCategory) -> TaskPool {
        let pool = TaskPool {
            id: PoolId::new(),
            owner_id,
            category,
        };
        self.state.lock().await.pools.insert(pool.id, pool.clone());
        pool
    }

    /// Adds a task created at `created_at` to `pool_id`.
    pub async fn add_task(&self, pool_id: PoolId, created_at: DateTime<Utc>) -> Task {
        let task = Task {
            id: TaskId::new(),
            pool_id: Some(pool_id),
            created_at,
        };
        self.state.lock().await.tasks.insert(task.id, task.clone());
        task
    }

    /// Registers a device for `user_id`.
    pub async fn add_device_token(&self, user_id: UserId, token: impl Into<String>) -> DeviceToken {
        let device = DeviceToken {
            id: DeviceTokenId::new(),
            user_id,
            registration_token: token.into(),
        };
        self.state.lock().await.tokens.push(device.clone());
        device
    }

    /// Current state of a task.
    pub async fn task(&self, task_id: TaskId) -> Option<Task> {
        self.state.lock().await.tasks.get(&task_id).cloned()
    }

    /// Stored notifications for `user_id`.
    pub async fn notifications_for(&self, user_id: UserId) -> Vec<Notification> {
        self.state
            .lock()
            .await
            .notifications
            .values()
            .filter(|n| n.user_id == user_id)
            .cloned()
            .collect()
    }

    /// Number of sessions not yet dropped.
    pub fn open_sessions(&self) -> usize {
        self.open_sessions.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Storage for MemoryStore {
    async fn open_session(&self) -> Result<Box<dyn Session>, DbError> {
        self.open_sessions.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(MemorySession {
            state: Arc::clone(&self.state),
            open_sessions: Arc::clone(&self.open_sessions),
        }))
    }

    async fn ping(&self) -> Result<(), DbError> {
        Ok(())
    }
}

struct MemorySession {
    state: Arc<Mutex<MemoryState>>,
    open_sessions: Arc<AtomicUsize>,
}

impl Drop for MemorySession {
    fn drop(&mut self) {
        self.open_sessions.fetch_sub(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl Session for MemorySession {
    async fn pools_by_category(
        &mut self,
        category: PoolCategory,
    ) -> Result<Vec<TaskPool>, DbError> {
        let state = self.state.lock().await;
        Ok(state
            .pools
            .values()
            .filter(|p| p.category == category)
            .cloned()
            .collect())
    }

    async fn tasks_in_pool(&mut self, pool_id: PoolId) -> Result<Vec<Task>, DbError> {
        let state = self.state.lock().await;
        let mut tasks: Vec<Task> = state
            .tasks
            .values()
            .filter(|t| t.pool_id == Some(pool_id))
            .cloned()
            .collect();
        tasks.sort_by_key(|t| t.created_at);
        Ok(tasks)
    }

    async fn find_pool(
        &mut self,
        owner_id: UserId,
        category: PoolCategory,
    ) -> Result<Option<TaskPool>, DbError> {
        let state = self.state.lock().await;
        Ok(state
            .pools
            .values()
            .find(|p| p.owner_id == owner_id && p.category == category)
            .cloned())
    }

    async fn move_task(&mut self, task_id: TaskId, pool_id: PoolId) -> Result<(), DbError> {
        let mut state = self.state.lock().await;
        let task = state
            .tasks
            .get_mut(&task_id)
            .ok_or_else(|| DbError::NotFound(format!("task {task_id}")))?;
        task.pool_id = Some(pool_id);
        Ok(())
    }

    async fn insert_notifications(
        &mut self,
        notifications: &[Notification],
    ) -> Result<u64, DbError> {
        let mut state = self.state.lock().await;
        let mut inserted = 0;
        for notification in notifications {
            let key = (notification.user_id, notification.task_id);
            if !state.notifications.contains_key(&key) {
                state.notifications.insert(key, notification.clone());
                inserted += 1;
            }
        }
        Ok(inserted)
    }

    async fn device_tokens_for(&mut self, user_id: UserId) -> Result<Vec<DeviceToken>, DbError> {
        let state = self.state.lock().await;
        Ok(state
            .tokens
            .iter()
            .filter(|t| t.user_id == user_id)
            .cloned()
            .collect())
    }
}
