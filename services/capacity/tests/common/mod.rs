//! Shared fakes for capacity service integration tests.

#![allow(dead_code)]

use std::collections::HashSet;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use laterq_capacity::capacity::model::{DeviceToken, Notification, PoolCategory, Task, TaskPool};
use laterq_capacity::db::DbError;
use laterq_capacity::push::{BatchResponse, MulticastMessage, PushError, PushSender, SendResponse};
use laterq_capacity::store::{MemoryStore, Session, Storage};
use laterq_id::{PoolId, TaskId, UserId};
use tokio::sync::Semaphore;

/// Records every message; optionally refuses messages for some URLs.
#[derive(Default)]
pub struct RecordingSender {
    sent: Mutex<Vec<MulticastMessage>>,
    refuse_urls: Mutex<HashSet<String>>,
}

impl RecordingSender {
    pub fn refuse_url(&self, url: impl Into<String>) {
        self.refuse_urls.lock().unwrap().insert(url.into());
    }

    pub fn sent(&self) -> Vec<MulticastMessage> {
        self.sent.lock().unwrap().clone()
    }
}

#[async_trait]
impl PushSender for RecordingSender {
    async fn send_multicast(&self, message: &MulticastMessage) -> Result<BatchResponse, PushError> {
        message.validate()?;
        let url = message.data.get("url").cloned().unwrap_or_default();
        if self.refuse_urls.lock().unwrap().contains(&url) {
            return Err(PushError::EmptyTokens);
        }
        self.sent.lock().unwrap().push(message.clone());
        Ok(BatchResponse {
            responses: message
                .tokens
                .iter()
                .map(|t| SendResponse {
                    token: t.clone(),
                    result: Ok(format!("messages/{t}")),
                })
                .collect(),
        })
    }
}

/// Failure switches for [`FaultyStore`].
#[derive(Default)]
pub struct Faults {
    pub fail_open: bool,
    pub fail_ping: bool,
    pub fail_pools: bool,
    pub fail_tasks_for: Option<PoolId>,
    pub fail_pending_lookup_for: Option<UserId>,
    pub fail_insert_for: Option<UserId>,
    pub fail_tokens_for: Option<UserId>,
}

fn query_error() -> DbError {
    DbError::Query(sqlx::Error::PoolTimedOut)
}

/// Wraps a [`MemoryStore`] and injects failures.
#[derive(Clone)]
pub struct FaultyStore {
    pub inner: MemoryStore,
    faults: Arc<Faults>,
    /// When set, `open_session` waits for a permit before proceeding.
    gate: Option<Arc<Semaphore>>,
}

impl FaultyStore {
    pub fn new(inner: MemoryStore, faults: Faults) -> Self {
        Self {
            inner,
            faults: Arc::new(faults),
            gate: None,
        }
    }

    pub fn gated(inner: MemoryStore, gate: Arc<Semaphore>) -> Self {
        Self {
            inner,
            faults: Arc::new(Faults::default()),
            gate: Some(gate),
        }
    }
}

#[async_trait]
impl Storage for FaultyStore {
    async fn open_session(&self) -> Result<Box<dyn Session>, DbError> {
        if let Some(gate) = &self.gate {
            let _permit = gate.acquire().await.map_err(|_| query_error())?;
        }
        if self.faults.fail_open {
            return Err(DbError::Connect(sqlx::Error::PoolTimedOut));
        }
        let inner = self.inner.open_session().await?;
        Ok(Box::new(FaultySession {
            inner,
            faults: Arc::clone(&self.faults),
        }))
    }

    async fn ping(&self) -> Result<(), DbError> {
        if self.faults.fail_ping {
            return Err(query_error());
        }
        Ok(())
    }
}

struct FaultySession {
    inner: Box<dyn Session>,
    faults: Arc<Faults>,
}

#[async_trait]
impl Session for FaultySession {
    async fn pools_by_category(
        &mut self,
        category: PoolCategory,
    ) -> Result<Vec<TaskPool>, DbError> {
        if self.faults.fail_pools {
            return Err(query_error());
        }
        self.inner.pools_by_category(category).await
    }

    async fn tasks_in_pool(&mut self, pool_id: PoolId) -> Result<Vec<Task>, DbError> {
        if self.faults.fail_tasks_for == Some(pool_id) {
            return Err(query_error());
        }
        self.inner.tasks_in_pool(pool_id).await
    }

    async fn find_pool(
        &mut self,
        owner_id: UserId,
        category: PoolCategory,
    ) -> Result<Option<TaskPool>, DbError> {
        if category == PoolCategory::Pending && self.faults.fail_pending_lookup_for == Some(owner_id)
        {
            return Err(query_error());
        }
        self.inner.find_pool(owner_id, category).await
    }

    async fn move_task(&mut self, task_id: TaskId, pool_id: PoolId) -> Result<(), DbError> {
        self.inner.move_task(task_id, pool_id).await
    }

    async fn insert_notifications(
        &mut self,
        notifications: &[Notification],
    ) -> Result<u64, DbError> {
        if let Some(user) = self.faults.fail_insert_for {
            if notifications.iter().any(|n| n.user_id == user) {
                return Err(query_error());
            }
        }
        self.inner.insert_notifications(notifications).await
    }

    async fn device_tokens_for(&mut self, user_id: UserId) -> Result<Vec<DeviceToken>, DbError> {
        if self.faults.fail_tokens_for == Some(user_id) {
            return Err(query_error());
        }
        self.inner.device_tokens_for(user_id).await
    }
}
