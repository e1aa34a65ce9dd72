//! Postgres-backed job session.
//!
//! A session holds one pooled connection for the duration of a job run; the
//! connection returns to the pool when the session is dropped.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use laterq_id::{DeviceTokenId, PoolId, TaskId, UserId, Uuid};
use sqlx::pool::PoolConnection;
use sqlx::postgres::{PgRow, Postgres};
use sqlx::{QueryBuilder, Row};
use tracing::debug;

use super::DbError;
use crate::capacity::model::{DeviceToken, Notification, PoolCategory, Task, TaskPool};
use crate::store::Session;

/// Rows per notification insert; each row binds six parameters and Postgres
/// caps a statement at 65535.
const INSERT_CHUNK_ROWS: usize = 1000;

fn insert_statement(chunk: &[Notification]) -> QueryBuilder<'static, Postgres> {
    let mut builder =
        QueryBuilder::new("INSERT INTO notifications (id, user_id, task_id, title, body, url) ");
    builder.push_values(chunk, |mut row, n| {
        row.push_bind(n.id.uuid())
            .push_bind(n.user_id.uuid())
            .push_bind(n.task_id.uuid())
            .push_bind(n.title.clone())
            .push_bind(n.body.clone())
            .push_bind(n.url.clone());
    });
    builder.push(" ON CONFLICT (user_id, task_id) DO NOTHING");
    builder
}

struct PoolRow {
    id: Uuid,
    owner_id: Uuid,
    category: String,
}

impl<'r> sqlx::FromRow<'r, PgRow> for PoolRow {
    fn from_row(row: &'r PgRow) -> Result<Self, sqlx::Error> {
        Ok(Self {
            id: row.try_get("id")?,
            owner_id: row.try_get("owner_id")?,
            category: row.try_get("category")?,
        })
    }
}

impl TryFrom<PoolRow> for TaskPool {
    type Error = DbError;

    fn try_from(row: PoolRow) -> Result<Self, Self::Error> {
        let category = row
            .category
            .parse::<PoolCategory>()
            .map_err(|e| DbError::Decode {
                column: "task_pools.category",
                message: e.to_string(),
            })?;
        Ok(TaskPool {
            id: PoolId::from_uuid(row.id),
            owner_id: UserId::from_uuid(row.owner_id),
            category,
        })
    }
}

struct TaskRow {
    id: Uuid,
    pool_id: Option<Uuid>,
    created_at: DateTime<Utc>,
}

impl<'r> sqlx::FromRow<'r, PgRow> for TaskRow {
    fn from_row(row: &'r PgRow) -> Result<Self, sqlx::Error> {
        Ok(Self {
            id: row.try_get("id")?,
            pool_id: row.try_get("pool_id")?,
            created_at: row.try_get("created_at")?,
        })
    }
}

impl From<TaskRow> for Task {
    fn from(row: TaskRow) -> Self {
        Task {
            id: TaskId::from_uuid(row.id),
            pool_id: row.pool_id.map(PoolId::from_uuid),
            created_at: row.created_at,
        }
    }
}

struct TokenRow {
    id: Uuid,
    user_id: Uuid,
    registration_token: String,
}

impl<'r> sqlx::FromRow<'r, PgRow> for TokenRow {
    fn from_row(row: &'r PgRow) -> Result<Self, sqlx::Error> {
        Ok(Self {
            id: row.try_get("id")?,
            user_id: row.try_get("user_id")?,
            registration_token: row.try_get("registration_token")?,
        })
    }
}

impl From<TokenRow> for DeviceToken {
    fn from(row: TokenRow) -> Self {
        DeviceToken {
            id: DeviceTokenId::from_uuid(row.id),
            user_id: UserId::from_uuid(row.user_id),
            registration_token: row.registration_token,
        }
    }
}

/// Session over a single pooled Postgres connection.
pub struct PgSession {
    conn: PoolConnection<Postgres>,
}

impl PgSession {
    pub(super) fn new(conn: PoolConnection<Postgres>) -> Self {
        Self { conn }
    }
}

#[async_trait]
impl Session for PgSession {
    async fn pools_by_category(
        &mut self,
        category: PoolCategory,
    ) -> Result<Vec<TaskPool>, DbError> {
        let rows = sqlx::query_as::<_, PoolRow>(
            r#"
            SELECT id, owner_id, category
            FROM task_pools
            WHERE category = $1
            "#,
        )
        .bind(category.as_str())
        .fetch_all(&mut *self.conn)
        .await
        .map_err(|e| DbError::query("task pools", e))?;

        rows.into_iter().map(TaskPool::try_from).collect()
    }

    async fn tasks_in_pool(&mut self, pool_id: PoolId) -> Result<Vec<Task>, DbError> {
        let rows = sqlx::query_as::<_, TaskRow>(
            r#"
            SELECT id, pool_id, created_at
            FROM tasks
            WHERE pool_id = $1
            ORDER BY created_at ASC
            "#,
        )
        .bind(pool_id.uuid())
        .fetch_all(&mut *self.conn)
        .await
        .map_err(|e| DbError::query("tasks", e))?;

        Ok(rows.into_iter().map(Task::from).collect())
    }

    async fn find_pool(
        &mut self,
        owner_id: UserId,
        category: PoolCategory,
    ) -> Result<Option<TaskPool>, DbError> {
        let row = sqlx::query_as::<_, PoolRow>(
            r#"
            SELECT id, owner_id, category
            FROM task_pools
            WHERE owner_id = $1 AND category = $2
            ORDER BY created_at ASC
            LIMIT 1
            "#,
        )
        .bind(owner_id.uuid())
        .bind(category.as_str())
        .fetch_optional(&mut *self.conn)
        .await
        .map_err(|e| DbError::query("task pool", e))?;

        row.map(TaskPool::try_from).transpose()
    }

    async fn move_task(&mut self, task_id: TaskId, pool_id: PoolId) -> Result<(), DbError> {
        let result = sqlx::query(
            r#"
            UPDATE tasks
            SET pool_id = $2
            WHERE id = $1
            "#,
        )
        .bind(task_id.uuid())
        .bind(pool_id.uuid())
        .execute(&mut *self.conn)
        .await
        .map_err(|e| DbError::query("task", e))?;

        if result.rows_affected() == 0 {
            return Err(DbError::NotFound(format!("task {task_id}")));
        }
        Ok(())
    }

    async fn insert_notifications(
        &mut self,
        notifications: &[Notification],
    ) -> Result<u64, DbError> {
        let mut inserted = 0;
        for chunk in notifications.chunks(INSERT_CHUNK_ROWS) {
            let mut statement = insert_statement(chunk);
            let result = statement
                .build()
                .execute(&mut *self.conn)
                .await
                .map_err(DbError::Query)?;
            inserted += result.rows_affected();
        }

        debug!(
            attempted = notifications.len(),
            inserted, "Inserted notifications"
        );
        Ok(inserted)
    }

    async fn device_tokens_for(&mut self, user_id: UserId) -> Result<Vec<DeviceToken>, DbError> {
        let rows = sqlx::query_as::<_, TokenRow>(
            r#"
            SELECT id, user_id, registration_token
            FROM fcm_tokens
            WHERE user_id = $1
            "#,
        )
        .bind(user_id.uuid())
        .fetch_all(&mut *self.conn)
        .await
        .map_err(|e| DbError::query("device tokens", e))?;

        Ok(rows.into_iter().map(DeviceToken::from).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capacity::model::NotificationTemplate;

    fn notifications(n: usize) -> Vec<Notification> {
        let owner = UserId::new();
        let template = NotificationTemplate::default();
        (0..n)
            .map(|_| {
                let task = Task {
                    id: TaskId::new(),
                    pool_id: Some(PoolId::new()),
                    created_at: Utc::now(),
                };
                Notification::for_overflowed_task(owner, &task, &template)
            })
            .collect()
    }

    #[test]
    fn test_chunk_stays_under_bind_limit() {
        assert!(INSERT_CHUNK_ROWS * 6 <= usize::from(u16::MAX));
    }

    #[test]
    fn test_large_batches_are_split() {
        let all = notifications(INSERT_CHUNK_ROWS * 2 + 1);
        let sizes: Vec<usize> = all.chunks(INSERT_CHUNK_ROWS).map(<[_]>::len).collect();
        assert_eq!(sizes, vec![INSERT_CHUNK_ROWS, INSERT_CHUNK_ROWS, 1]);
    }

    #[test]
    fn test_insert_statement_binds_six_per_row() {
        let chunk = notifications(INSERT_CHUNK_ROWS);
        let builder = insert_statement(&chunk);
        let sql = builder.sql();
        assert!(sql.contains("$6000"));
        assert!(!sql.contains("$6001"));
        assert!(sql.ends_with("ON CONFLICT (user_id, task_id) DO NOTHING"));
    }
}
