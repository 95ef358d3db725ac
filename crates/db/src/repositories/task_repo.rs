//! Repository for the `ai3d_tasks` table.
//!
//! Every read excludes soft-deleted rows. Status literals go through
//! [`TaskStatus::as_str`]; the column stores the uppercase name.

use gen3d_core::task::TaskStatus;
use gen3d_core::types::DbId;
use sqlx::PgPool;

use crate::models::task::{NewTask, Task, TaskListQuery, TaskSummary, TaskUpdate};

/// Column list for full `ai3d_tasks` rows.
const COLUMNS: &str = "\
    id, provider, provider_task_id, status, progress, input_type, \
    prompt, image_url, image_base64, generation_params, \
    model_url, pre_remeshed_url, thumbnail_url, \
    local_path, nas_path, thumbnail_path, pre_remeshed_path, pre_remeshed_nas_path, \
    file_size, file_hash, error_code, error_message, \
    name, description, category, tags, created_by, created_ip, \
    created_at, updated_at, deleted_at";

/// Column list for listing projections. Never includes `image_base64`.
const SUMMARY_COLUMNS: &str = "\
    id, provider, provider_task_id, status, progress, input_type, \
    prompt, image_url, generation_params, \
    model_url, pre_remeshed_url, thumbnail_url, \
    local_path, nas_path, thumbnail_path, \
    file_size, file_hash, error_code, error_message, \
    name, description, category, tags, created_by, \
    created_at, updated_at";

/// Shared guard for reconciliation writes: live, non-terminal rows only.
const WRITABLE: &str = "deleted_at IS NULL AND status NOT IN ('DONE', 'FAIL')";

/// Provides persistence operations for generation tasks.
pub struct TaskRepo;

impl TaskRepo {
    /// Insert a freshly submitted task with status WAIT and progress 0.
    ///
    /// `image_base64` is always written as NULL.
    pub async fn create(
        pool: &PgPool,
        provider_task_id: &str,
        input: &NewTask,
    ) -> Result<Task, sqlx::Error> {
        let query = format!(
            "INSERT INTO ai3d_tasks \
                 (provider, provider_task_id, status, progress, input_type, prompt, \
                  image_url, generation_params, name, description, category, tags, \
                  created_by, created_ip) \
             VALUES ($1, $2, $3, 0, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13) \
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, Task>(&query)
            .bind(&input.provider)
            .bind(provider_task_id)
            .bind(TaskStatus::Wait.as_str())
            .bind(input.input_type.as_str())
            .bind(&input.prompt)
            .bind(input.image_reference())
            .bind(serde_json::Value::Object(input.generation_params.clone()))
            .bind(input.name.as_deref().unwrap_or_default())
            .bind(&input.description)
            .bind(input.category.as_deref().unwrap_or_default())
            .bind(&input.tags)
            .bind(&input.created_by)
            .bind(&input.created_ip)
            .fetch_one(pool)
            .await
    }

    /// Find a live task by its ID.
    pub async fn find_by_id(pool: &PgPool, id: DbId) -> Result<Option<Task>, sqlx::Error> {
        let query =
            format!("SELECT {COLUMNS} FROM ai3d_tasks WHERE id = $1 AND deleted_at IS NULL");
        sqlx::query_as::<_, Task>(&query)
            .bind(id)
            .fetch_optional(pool)
            .await
    }

    /// Find a live task by its provider and remote job ID.
    pub async fn find_by_provider_key(
        pool: &PgPool,
        provider: &str,
        provider_task_id: &str,
    ) -> Result<Option<Task>, sqlx::Error> {
        let query = format!(
            "SELECT {COLUMNS} FROM ai3d_tasks \
             WHERE provider = $1 AND provider_task_id = $2 AND deleted_at IS NULL"
        );
        sqlx::query_as::<_, Task>(&query)
            .bind(provider)
            .bind(provider_task_id)
            .fetch_optional(pool)
            .await
    }

    /// List one page of task summaries, newest first.
    pub async fn list(
        pool: &PgPool,
        params: &TaskListQuery,
    ) -> Result<Vec<TaskSummary>, sqlx::Error> {
        let (where_clause, bind_idx) = Self::filter_clause(params);
        let query = format!(
            "SELECT {SUMMARY_COLUMNS} FROM ai3d_tasks \
             {where_clause} \
             ORDER BY created_at DESC, id DESC \
             LIMIT ${bind_idx} OFFSET ${}",
            bind_idx + 1,
        );

        let mut q = sqlx::query_as::<_, TaskSummary>(&query);
        if let Some(provider) = params.provider_filter() {
            q = q.bind(provider.to_string());
        }
        if let Some(status) = params.status {
            q = q.bind(status.as_str());
        }
        if let Some(keyword) = params.keyword_filter() {
            q = q.bind(like_pattern(keyword));
        }
        q.bind(params.page_size())
            .bind(params.offset())
            .fetch_all(pool)
            .await
    }

    /// Count all tasks matching the listing filters, ignoring pagination.
    pub async fn count(pool: &PgPool, params: &TaskListQuery) -> Result<i64, sqlx::Error> {
        let (where_clause, _) = Self::filter_clause(params);
        let query = format!("SELECT COUNT(*) FROM ai3d_tasks {where_clause}");

        let mut q = sqlx::query_scalar::<_, i64>(&query);
        if let Some(provider) = params.provider_filter() {
            q = q.bind(provider.to_string());
        }
        if let Some(status) = params.status {
            q = q.bind(status.as_str());
        }
        if let Some(keyword) = params.keyword_filter() {
            q = q.bind(like_pattern(keyword));
        }
        q.fetch_one(pool).await
    }

    /// All live WAIT or RUN tasks, oldest first.
    pub async fn list_pending(pool: &PgPool) -> Result<Vec<Task>, sqlx::Error> {
        let query = format!(
            "SELECT {COLUMNS} FROM ai3d_tasks \
             WHERE deleted_at IS NULL AND status IN ($1, $2) \
             ORDER BY created_at ASC, id ASC"
        );
        sqlx::query_as::<_, Task>(&query)
            .bind(TaskStatus::PENDING[0].as_str())
            .bind(TaskStatus::PENDING[1].as_str())
            .fetch_all(pool)
            .await
    }

    /// Number of live WAIT or RUN tasks.
    pub async fn count_pending(pool: &PgPool) -> Result<i64, sqlx::Error> {
        sqlx::query_scalar::<_, i64>(
            "SELECT COUNT(*) FROM ai3d_tasks \
             WHERE deleted_at IS NULL AND status IN ($1, $2)",
        )
        .bind(TaskStatus::PENDING[0].as_str())
        .bind(TaskStatus::PENDING[1].as_str())
        .fetch_one(pool)
        .await
    }

    /// Apply a set of field changes in a single statement.
    ///
    /// Only live, non-terminal rows are updated. Returns `None` when the
    /// row is missing, deleted or already DONE/FAIL.
    pub async fn apply_update(
        pool: &PgPool,
        id: DbId,
        update: &TaskUpdate,
    ) -> Result<Option<Task>, sqlx::Error> {
        let query = format!(
            "UPDATE ai3d_tasks SET \
                 status = COALESCE($2, status), \
                 progress = COALESCE($3, progress), \
                 model_url = COALESCE($4, model_url), \
                 pre_remeshed_url = COALESCE($5, pre_remeshed_url), \
                 thumbnail_url = COALESCE($6, thumbnail_url), \
                 error_code = COALESCE($7, error_code), \
                 error_message = COALESCE($8, error_message), \
                 local_path = COALESCE($9, local_path), \
                 nas_path = COALESCE($10, nas_path), \
                 thumbnail_path = COALESCE($11, thumbnail_path), \
                 pre_remeshed_path = COALESCE($12, pre_remeshed_path), \
                 pre_remeshed_nas_path = COALESCE($13, pre_remeshed_nas_path), \
                 file_size = COALESCE($14, file_size), \
                 file_hash = COALESCE($15, file_hash), \
                 updated_at = NOW() \
             WHERE id = $1 AND {WRITABLE} \
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, Task>(&query)
            .bind(id)
            .bind(update.status.map(TaskStatus::as_str))
            .bind(update.progress)
            .bind(&update.model_url)
            .bind(&update.pre_remeshed_url)
            .bind(&update.thumbnail_url)
            .bind(&update.error_code)
            .bind(&update.error_message)
            .bind(&update.local_path)
            .bind(&update.nas_path)
            .bind(&update.thumbnail_path)
            .bind(&update.pre_remeshed_path)
            .bind(&update.pre_remeshed_nas_path)
            .bind(update.file_size)
            .bind(&update.file_hash)
            .fetch_optional(pool)
            .await
    }

    /// Soft-delete a task. Returns `true` if a live row was marked.
    pub async fn soft_delete(pool: &PgPool, id: DbId) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE ai3d_tasks SET deleted_at = NOW(), updated_at = NOW() \
             WHERE id = $1 AND deleted_at IS NULL",
        )
        .bind(id)
        .execute(pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Build the listing WHERE clause and return the next bind index.
    ///
    /// Bind order: provider, status, keyword.
    fn filter_clause(params: &TaskListQuery) -> (String, u32) {
        let mut conditions = vec!["deleted_at IS NULL".to_string()];
        let mut bind_idx: u32 = 1;

        if params.provider_filter().is_some() {
            conditions.push(format!("provider = ${bind_idx}"));
            bind_idx += 1;
        }
        if params.status.is_some() {
            conditions.push(format!("status = ${bind_idx}"));
            bind_idx += 1;
        }
        if params.keyword_filter().is_some() {
            conditions.push(format!("name ILIKE ${bind_idx}"));
            bind_idx += 1;
        }

        (format!("WHERE {}", conditions.join(" AND ")), bind_idx)
    }
}

/// Substring pattern for ILIKE with wildcard characters escaped.
fn like_pattern(keyword: &str) -> String {
    let escaped = keyword
        .replace('\\', "\\\\")
        .replace('%', "\\%")
        .replace('_', "\\_");
    format!("%{escaped}%")
}
