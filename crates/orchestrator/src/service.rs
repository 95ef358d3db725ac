//! Task lifecycle and single-task reconciliation.

use std::collections::HashSet;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use chrono::Utc;
use gen3d_core::error::CoreError;
use gen3d_core::naming::default_task_name;
use gen3d_core::task::{should_persist, InputType, TaskStatus, PROGRESS_MAX};
use gen3d_core::types::DbId;
use gen3d_db::models::task::{NewTask, Task, TaskListQuery, TaskPage, TaskUpdate};
use gen3d_db::store::TaskStore;
use gen3d_providers::{AdapterRegistry, ProviderAdapter};

use crate::error::ServiceError;

/// Error code recorded on tasks canceled through [`TaskService::cancel_task`].
pub const CANCELED_ERROR_CODE: &str = "CANCELED";

/// Default deadline for one remote status query.
pub const DEFAULT_QUERY_TIMEOUT: Duration = Duration::from_secs(30);

/// Default deadline for materializing one task's artifacts.
pub const DEFAULT_DOWNLOAD_TIMEOUT: Duration = Duration::from_secs(300);

/// What one reconciliation did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReconcileOutcome {
    /// The task was already DONE or FAIL; the provider was not called.
    SkippedTerminal,
    /// The observation did not clear the persistence threshold.
    Unchanged,
    /// One write was made.
    Updated {
        status: TaskStatus,
        /// Artifacts were materialized in this write.
        downloaded: bool,
    },
    /// Another reconciliation holds the download slot for this task.
    ClaimedElsewhere,
}

/// Owns task creation, lookup, cancellation and reconciliation.
pub struct TaskService {
    store: Arc<dyn TaskStore>,
    registry: Arc<AdapterRegistry>,
    downloads: DownloadClaims,
    query_timeout: Duration,
    download_timeout: Duration,
}

impl TaskService {
    pub fn new(store: Arc<dyn TaskStore>, registry: Arc<AdapterRegistry>) -> Self {
        Self {
            store,
            registry,
            downloads: DownloadClaims::default(),
            query_timeout: DEFAULT_QUERY_TIMEOUT,
            download_timeout: DEFAULT_DOWNLOAD_TIMEOUT,
        }
    }

    /// Deadline for each `query_task` call made by [`Self::reconcile`].
    pub fn with_query_timeout(mut self, timeout: Duration) -> Self {
        self.query_timeout = timeout;
        self
    }

    /// Deadline for each `download_result` call made by [`Self::reconcile`].
    pub fn with_download_timeout(mut self, timeout: Duration) -> Self {
        self.download_timeout = timeout;
        self
    }

    pub fn registry(&self) -> &AdapterRegistry {
        &self.registry
    }

    /// Validate, submit to the provider, and persist with status WAIT.
    ///
    /// Nothing is persisted if the provider rejects the submission. The
    /// image payload is dropped once submission completes.
    pub async fn create_task(&self, mut input: NewTask) -> Result<Task, ServiceError> {
        validate_input(&input)?;
        let adapter = self.adapter(&input.provider)?;

        if input.name.is_none() {
            input.name = Some(default_task_name(Utc::now()));
        }
        if input.category.is_none() && !adapter.default_category().is_empty() {
            input.category = Some(adapter.default_category().to_string());
        }

        let provider_task_id = adapter.submit_task(&mut input).await.map_err(|e| {
            tracing::error!(provider = %input.provider, error = %e, "Task submission failed");
            e
        })?;

        let task = self.store.create(&provider_task_id, &input).await?;
        tracing::info!(
            task_id = task.id,
            provider = %task.provider,
            provider_task_id = %task.provider_task_id,
            input_type = %task.input_type,
            "Task created",
        );
        Ok(task)
    }

    pub async fn get_task(&self, id: DbId) -> Result<Task, ServiceError> {
        self.store
            .find_by_id(id)
            .await?
            .ok_or(ServiceError::Core(CoreError::NotFound { entity: "task", id }))
    }

    pub async fn get_task_by_provider_key(
        &self,
        provider: &str,
        provider_task_id: &str,
    ) -> Result<Task, ServiceError> {
        self.store
            .find_by_provider_key(provider, provider_task_id)
            .await?
            .ok_or_else(|| {
                ServiceError::Core(CoreError::NotFoundByKey {
                    entity: "task",
                    key: format!("{provider}/{provider_task_id}"),
                })
            })
    }

    /// One page of task summaries, newest first.
    pub async fn list_tasks(&self, query: &TaskListQuery) -> Result<TaskPage, ServiceError> {
        let (items, total) = self.store.list(query).await?;
        Ok(TaskPage {
            items,
            total,
            page: query.page(),
            page_size: query.page_size(),
        })
    }

    /// Reconcile one task now and return its refreshed record.
    pub async fn poll_task(&self, id: DbId) -> Result<Task, ServiceError> {
        let task = self.get_task(id).await?;
        let outcome = self.reconcile(&task).await?;
        tracing::debug!(task_id = id, ?outcome, "Manual poll");
        self.get_task(id).await
    }

    /// WAIT and RUN tasks, oldest first.
    pub async fn get_pending_tasks(&self) -> Result<Vec<Task>, ServiceError> {
        Ok(self.store.list_pending().await?)
    }

    pub async fn pending_count(&self) -> Result<i64, ServiceError> {
        Ok(self.store.count_pending().await?)
    }

    /// Soft-delete a task. The remote job is left alone.
    pub async fn delete_task(&self, id: DbId) -> Result<(), ServiceError> {
        if !self.store.soft_delete(id).await? {
            return Err(CoreError::NotFound { entity: "task", id }.into());
        }
        tracing::info!(task_id = id, "Task deleted");
        Ok(())
    }

    /// Cancel the remote job and mark the task FAIL with code `CANCELED`.
    pub async fn cancel_task(&self, id: DbId) -> Result<Task, ServiceError> {
        let task = self.get_task(id).await?;
        if task.status.is_terminal() {
            return Err(CoreError::Conflict(format!(
                "task {id} is already {}",
                task.status
            ))
            .into());
        }

        let adapter = self.adapter(&task.provider)?;
        adapter.cancel_task(&task.provider_task_id).await?;

        let update = TaskUpdate {
            status: Some(TaskStatus::Fail),
            error_code: Some(CANCELED_ERROR_CODE.to_string()),
            error_message: Some("canceled by user".to_string()),
            ..Default::default()
        };
        let canceled = self.store.apply_update(id, &update).await?.ok_or_else(|| {
            CoreError::Conflict(format!("task {id} finished before it could be canceled"))
        })?;

        tracing::info!(task_id = id, provider = %task.provider, "Task canceled");
        Ok(canceled)
    }

    /// Pull the remote state of `task` into the store.
    ///
    /// Terminal tasks are skipped without calling the provider. A query
    /// error or an elapsed query deadline is returned without touching the
    /// record. The download runs under its own deadline and a failed or
    /// late download still records DONE. Everything an observation changes
    /// goes out in a single write.
    pub async fn reconcile(&self, task: &Task) -> Result<ReconcileOutcome, ServiceError> {
        if task.status.is_terminal() {
            return Ok(ReconcileOutcome::SkippedTerminal);
        }

        let adapter = self.adapter(&task.provider)?;
        let queried =
            tokio::time::timeout(self.query_timeout, adapter.query_task(&task.provider_task_id))
                .await
                .map_err(|_| ServiceError::QueryTimeout {
                    provider: task.provider.clone(),
                    timeout: self.query_timeout,
                });
        let remote = match queried {
            Ok(Ok(remote)) => remote,
            Ok(Err(e)) => {
                tracing::warn!(
                    task_id = task.id,
                    provider = %task.provider,
                    provider_task_id = %task.provider_task_id,
                    error = %e,
                    "Remote query failed",
                );
                return Err(e.into());
            }
            Err(e) => {
                tracing::warn!(
                    task_id = task.id,
                    provider = %task.provider,
                    provider_task_id = %task.provider_task_id,
                    timeout_ms = self.query_timeout.as_millis() as u64,
                    "Remote query timed out",
                );
                return Err(e);
            }
        };

        let observed = remote.status;
        if !task.status.can_transition_to(observed) {
            tracing::debug!(
                task_id = task.id,
                stored = %task.status,
                observed = %observed,
                "Ignoring backward status",
            );
            return Ok(ReconcileOutcome::Unchanged);
        }

        let progress = if observed == TaskStatus::Done {
            PROGRESS_MAX
        } else {
            remote.progress.unwrap_or(task.progress)
        };
        if !should_persist(task.status, task.progress, observed, progress) {
            return Ok(ReconcileOutcome::Unchanged);
        }

        let mut update = TaskUpdate {
            status: Some(observed),
            progress: Some(progress),
            error_code: remote.error_code,
            error_message: remote.error_message,
            ..Default::default()
        };
        if observed == TaskStatus::Done {
            update.model_url = remote.model_url;
            update.pre_remeshed_url = remote.pre_remeshed_url;
            update.thumbnail_url = remote.thumbnail_url;
        }

        // Held until the write below completes.
        let mut _claim = None;
        let mut downloaded = false;
        if observed == TaskStatus::Done && update.model_url.is_some() {
            let Some(claim) = self.downloads.try_claim(task.id) else {
                return Ok(ReconcileOutcome::ClaimedElsewhere);
            };
            _claim = Some(claim);

            let Some(mut fresh) = self.store.find_by_id(task.id).await? else {
                return Ok(ReconcileOutcome::SkippedTerminal);
            };
            if fresh.status.is_terminal() {
                return Ok(ReconcileOutcome::SkippedTerminal);
            }

            update.apply_to(&mut fresh);
            let download =
                tokio::time::timeout(self.download_timeout, adapter.download_result(&fresh)).await;
            match download {
                Ok(Ok(result)) => {
                    result.merge_into(&mut update);
                    downloaded = true;
                }
                Ok(Err(e)) => {
                    tracing::error!(
                        task_id = task.id,
                        provider = %task.provider,
                        error = %e,
                        "Artifact download failed, marking DONE without artifacts",
                    );
                }
                Err(_) => {
                    tracing::error!(
                        task_id = task.id,
                        provider = %task.provider,
                        timeout_ms = self.download_timeout.as_millis() as u64,
                        "Artifact download timed out, marking DONE without artifacts",
                    );
                }
            }
        }

        match self.store.apply_update(task.id, &update).await? {
            Some(updated) => {
                tracing::info!(
                    task_id = updated.id,
                    provider = %updated.provider,
                    status = %updated.status,
                    progress = updated.progress,
                    downloaded,
                    "Task updated",
                );
                Ok(ReconcileOutcome::Updated {
                    status: updated.status,
                    downloaded,
                })
            }
            None => Ok(ReconcileOutcome::SkippedTerminal),
        }
    }

    fn adapter(&self, provider: &str) -> Result<Arc<dyn ProviderAdapter>, ServiceError> {
        self.registry
            .get(provider)
            .ok_or_else(|| ServiceError::UnsupportedProvider(provider.to_string()))
    }
}

fn validate_input(input: &NewTask) -> Result<(), CoreError> {
    match input.input_type {
        InputType::Text => {
            if input.prompt.as_deref().map_or(true, |p| p.trim().is_empty()) {
                return Err(CoreError::Validation(
                    "prompt is required for text input".to_string(),
                ));
            }
        }
        InputType::Image => {
            if input.image.is_none() {
                return Err(CoreError::Validation(
                    "imageUrl or imageBase64 is required for image input".to_string(),
                ));
            }
        }
    }
    Ok(())
}

/// In-process set of task IDs with a download in flight.
#[derive(Default)]
struct DownloadClaims {
    active: Mutex<HashSet<DbId>>,
}

impl DownloadClaims {
    fn try_claim(&self, id: DbId) -> Option<DownloadClaim<'_>> {
        let mut active = self.active.lock().unwrap_or_else(PoisonError::into_inner);
        active.insert(id).then_some(DownloadClaim { claims: self, id })
    }
}

/// Releases the claim on drop, including when the owning future is
/// cancelled by a timeout.
struct DownloadClaim<'a> {
    claims: &'a DownloadClaims,
    id: DbId,
}

impl Drop for DownloadClaim<'_> {
    fn drop(&mut self) {
        self.claims
            .active
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&self.id);
    }
}
