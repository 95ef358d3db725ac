use std::collections::BTreeMap;

use async_trait::async_trait;
use chrono::Utc;
use gen3d_core::task::TaskStatus;
use gen3d_core::types::DbId;
use serde_json::Value;
use tokio::sync::RwLock;

use super::{StoreError, TaskStore};
use crate::models::task::{NewTask, Task, TaskListQuery, TaskSummary, TaskUpdate};

/// In-process [`TaskStore`] keyed by ID.
///
/// Mirrors the PostgreSQL store's filtering and guards. Used by tests and
/// by single-process setups that do not need durability.
#[derive(Default)]
pub struct MemoryTaskStore {
    inner: RwLock<Inner>,
}

#[derive(Default)]
struct Inner {
    next_id: DbId,
    rows: BTreeMap<DbId, Task>,
}

impl MemoryTaskStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a fully-formed record, assigning it the next ID.
    pub async fn insert_record(&self, mut task: Task) -> Task {
        let mut inner = self.inner.write().await;
        inner.next_id += 1;
        task.id = inner.next_id;
        inner.rows.insert(task.id, task.clone());
        task
    }

    /// Raw access to a row, including soft-deleted ones.
    pub async fn snapshot(&self, id: DbId) -> Option<Task> {
        self.inner.read().await.rows.get(&id).cloned()
    }
}

#[async_trait]
impl TaskStore for MemoryTaskStore {
    async fn create(&self, provider_task_id: &str, input: &NewTask) -> Result<Task, StoreError> {
        let mut inner = self.inner.write().await;
        let duplicate = inner.rows.values().any(|t| {
            t.deleted_at.is_none()
                && t.provider == input.provider
                && t.provider_task_id == provider_task_id
        });
        if duplicate {
            return Err(StoreError::Conflict(format!(
                "task {}/{provider_task_id} already exists",
                input.provider
            )));
        }

        inner.next_id += 1;
        let now = Utc::now();
        let task = Task {
            id: inner.next_id,
            provider: input.provider.clone(),
            provider_task_id: provider_task_id.to_string(),
            status: TaskStatus::Wait,
            progress: 0,
            input_type: input.input_type,
            prompt: input.prompt.clone(),
            image_url: input.image_reference().map(str::to_string),
            image_base64: None,
            generation_params: Value::Object(input.generation_params.clone()),
            model_url: None,
            pre_remeshed_url: None,
            thumbnail_url: None,
            local_path: None,
            nas_path: None,
            thumbnail_path: None,
            pre_remeshed_path: None,
            pre_remeshed_nas_path: None,
            file_size: None,
            file_hash: None,
            error_code: None,
            error_message: None,
            name: input.name.clone().unwrap_or_default(),
            description: input.description.clone(),
            category: input.category.clone().unwrap_or_default(),
            tags: input.tags.clone(),
            created_by: input.created_by.clone(),
            created_ip: input.created_ip.clone(),
            created_at: now,
            updated_at: now,
            deleted_at: None,
        };
        inner.rows.insert(task.id, task.clone());
        Ok(task)
    }

    async fn find_by_id(&self, id: DbId) -> Result<Option<Task>, StoreError> {
        let inner = self.inner.read().await;
        Ok(inner.rows.get(&id).filter(|t| t.deleted_at.is_none()).cloned())
    }

    async fn find_by_provider_key(
        &self,
        provider: &str,
        provider_task_id: &str,
    ) -> Result<Option<Task>, StoreError> {
        let inner = self.inner.read().await;
        Ok(inner
            .rows
            .values()
            .find(|t| {
                t.deleted_at.is_none()
                    && t.provider == provider
                    && t.provider_task_id == provider_task_id
            })
            .cloned())
    }

    async fn list(&self, query: &TaskListQuery) -> Result<(Vec<TaskSummary>, i64), StoreError> {
        let inner = self.inner.read().await;
        let keyword = query.keyword_filter().map(str::to_lowercase);

        let mut matching: Vec<&Task> = inner
            .rows
            .values()
            .filter(|t| t.deleted_at.is_none())
            .filter(|t| query.provider_filter().map_or(true, |p| t.provider == p))
            .filter(|t| query.status.map_or(true, |s| t.status == s))
            .filter(|t| {
                keyword
                    .as_deref()
                    .map_or(true, |k| t.name.to_lowercase().contains(k))
            })
            .collect();
        matching.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));

        let total = matching.len() as i64;
        let items = matching
            .into_iter()
            .skip(usize::try_from(query.offset()).unwrap_or(usize::MAX))
            .take(usize::try_from(query.page_size()).unwrap_or(0))
            .map(TaskSummary::from)
            .collect();
        Ok((items, total))
    }

    async fn list_pending(&self) -> Result<Vec<Task>, StoreError> {
        let inner = self.inner.read().await;
        let mut pending: Vec<Task> = inner
            .rows
            .values()
            .filter(|t| t.deleted_at.is_none() && !t.status.is_terminal())
            .cloned()
            .collect();
        pending.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
        Ok(pending)
    }

    async fn count_pending(&self) -> Result<i64, StoreError> {
        let inner = self.inner.read().await;
        Ok(inner
            .rows
            .values()
            .filter(|t| t.deleted_at.is_none() && !t.status.is_terminal())
            .count() as i64)
    }

    async fn apply_update(
        &self,
        id: DbId,
        update: &TaskUpdate,
    ) -> Result<Option<Task>, StoreError> {
        let mut inner = self.inner.write().await;
        let Some(task) = inner.rows.get_mut(&id) else {
            return Ok(None);
        };
        if task.deleted_at.is_some() || task.status.is_terminal() {
            return Ok(None);
        }
        update.apply_to(task);
        task.updated_at = Utc::now();
        Ok(Some(task.clone()))
    }

    async fn soft_delete(&self, id: DbId) -> Result<bool, StoreError> {
        let mut inner = self.inner.write().await;
        match inner.rows.get_mut(&id) {
            Some(task) if task.deleted_at.is_none() => {
                let now = Utc::now();
                task.deleted_at = Some(now);
                task.updated_at = now;
                Ok(true)
            }
            _ => Ok(false),
        }
    }
}
