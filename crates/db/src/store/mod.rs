//! Task persistence seam used by the orchestration layer.

use async_trait::async_trait;
use gen3d_core::types::DbId;

use crate::models::task::{NewTask, Task, TaskListQuery, TaskSummary, TaskUpdate};
use crate::repositories::TaskRepo;
use crate::DbPool;

mod memory;

pub use memory::MemoryTaskStore;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Duplicate task: {0}")]
    Conflict(String),

    #[error("Database error: {0}")]
    Database(sqlx::Error),
}

impl From<sqlx::Error> for StoreError {
    fn from(err: sqlx::Error) -> Self {
        if let sqlx::Error::Database(db_err) = &err {
            // PostgreSQL unique constraint violation: error code 23505
            if db_err.code().as_deref() == Some("23505") {
                let constraint = db_err.constraint().unwrap_or("unknown");
                return StoreError::Conflict(format!(
                    "duplicate value violates unique constraint: {constraint}"
                ));
            }
        }
        StoreError::Database(err)
    }
}

/// Durable keyed storage for task records.
///
/// Implementations must exclude soft-deleted rows from every read and
/// must refuse [`TaskStore::apply_update`] on terminal rows.
#[async_trait]
pub trait TaskStore: Send + Sync {
    /// Persist a submitted task with status WAIT and progress 0.
    async fn create(&self, provider_task_id: &str, input: &NewTask) -> Result<Task, StoreError>;

    async fn find_by_id(&self, id: DbId) -> Result<Option<Task>, StoreError>;

    async fn find_by_provider_key(
        &self,
        provider: &str,
        provider_task_id: &str,
    ) -> Result<Option<Task>, StoreError>;

    /// One page of summaries (newest first) plus the filtered total.
    async fn list(&self, query: &TaskListQuery) -> Result<(Vec<TaskSummary>, i64), StoreError>;

    /// WAIT and RUN tasks, oldest first.
    async fn list_pending(&self) -> Result<Vec<Task>, StoreError>;

    async fn count_pending(&self) -> Result<i64, StoreError>;

    /// Write all fields of `update` at once. `None` when the row is
    /// missing, deleted or terminal.
    async fn apply_update(&self, id: DbId, update: &TaskUpdate)
        -> Result<Option<Task>, StoreError>;

    /// Returns `true` if a live row was soft-deleted.
    async fn soft_delete(&self, id: DbId) -> Result<bool, StoreError>;
}

/// [`TaskStore`] backed by PostgreSQL.
#[derive(Clone)]
pub struct PgTaskStore {
    pool: DbPool,
}

impl PgTaskStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &DbPool {
        &self.pool
    }
}

#[async_trait]
impl TaskStore for PgTaskStore {
    async fn create(&self, provider_task_id: &str, input: &NewTask) -> Result<Task, StoreError> {
        Ok(TaskRepo::create(&self.pool, provider_task_id, input).await?)
    }

    async fn find_by_id(&self, id: DbId) -> Result<Option<Task>, StoreError> {
        Ok(TaskRepo::find_by_id(&self.pool, id).await?)
    }

    async fn find_by_provider_key(
        &self,
        provider: &str,
        provider_task_id: &str,
    ) -> Result<Option<Task>, StoreError> {
        Ok(TaskRepo::find_by_provider_key(&self.pool, provider, provider_task_id).await?)
    }

    async fn list(&self, query: &TaskListQuery) -> Result<(Vec<TaskSummary>, i64), StoreError> {
        let (items, total) = tokio::try_join!(
            TaskRepo::list(&self.pool, query),
            TaskRepo::count(&self.pool, query),
        )?;
        Ok((items, total))
    }

    async fn list_pending(&self) -> Result<Vec<Task>, StoreError> {
        Ok(TaskRepo::list_pending(&self.pool).await?)
    }

    async fn count_pending(&self) -> Result<i64, StoreError> {
        Ok(TaskRepo::count_pending(&self.pool).await?)
    }

    async fn apply_update(
        &self,
        id: DbId,
        update: &TaskUpdate,
    ) -> Result<Option<Task>, StoreError> {
        Ok(TaskRepo::apply_update(&self.pool, id, update).await?)
    }

    async fn soft_delete(&self, id: DbId) -> Result<bool, StoreError> {
        Ok(TaskRepo::soft_delete(&self.pool, id).await?)
    }
}
