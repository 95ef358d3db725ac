//! The provider adapter contract.

use async_trait::async_trait;
use gen3d_core::task::TaskStatus;
use gen3d_db::models::task::{NewTask, Task, TaskUpdate};

use crate::error::ProviderError;

/// A provider's view of one remote job, mapped onto the uniform lifecycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteStatus {
    pub status: TaskStatus,
    /// `None` when the provider does not report progress.
    pub progress: Option<i16>,
    pub model_url: Option<String>,
    pub pre_remeshed_url: Option<String>,
    pub thumbnail_url: Option<String>,
    pub error_code: Option<String>,
    pub error_message: Option<String>,
}

impl RemoteStatus {
    /// A bare status with no progress and no result fields.
    pub fn new(status: TaskStatus) -> Self {
        Self {
            status,
            progress: None,
            model_url: None,
            pre_remeshed_url: None,
            thumbnail_url: None,
            error_code: None,
            error_message: None,
        }
    }

    pub fn with_progress(mut self, progress: i16) -> Self {
        self.progress = Some(progress);
        self
    }

    pub fn with_model_url(mut self, url: impl Into<String>) -> Self {
        self.model_url = Some(url.into());
        self
    }

    pub fn with_thumbnail_url(mut self, url: impl Into<String>) -> Self {
        self.thumbnail_url = Some(url.into());
        self
    }

    pub fn with_error(mut self, code: Option<String>, message: Option<String>) -> Self {
        self.error_code = code;
        self.error_message = message;
        self
    }
}

/// Where a completed job's artifacts ended up.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DownloadResult {
    pub local_path: Option<String>,
    pub nas_path: Option<String>,
    pub thumbnail_path: Option<String>,
    pub pre_remeshed_path: Option<String>,
    pub pre_remeshed_nas_path: Option<String>,
    pub file_size: i64,
    /// SHA-256 hex digest of the primary artifact.
    pub file_hash: String,
}

impl DownloadResult {
    /// Copy the artifact locations into a pending update.
    pub fn merge_into(self, update: &mut TaskUpdate) {
        update.local_path = self.local_path;
        update.nas_path = self.nas_path;
        update.thumbnail_path = self.thumbnail_path;
        update.pre_remeshed_path = self.pre_remeshed_path;
        update.pre_remeshed_nas_path = self.pre_remeshed_nas_path;
        update.file_size = Some(self.file_size);
        update.file_hash = Some(self.file_hash);
    }
}

/// Uniform interface over a remote generation service.
///
/// Implementations must be safe to call concurrently for different tasks.
#[async_trait]
pub trait ProviderAdapter: Send + Sync {
    /// Registry key, matched against `Task::provider`.
    fn name(&self) -> &str;

    /// Default category for tasks submitted without one.
    fn default_category(&self) -> &str {
        ""
    }

    /// Submit a job and return the provider's job ID.
    ///
    /// Rewrites `input.generation_params` to the values actually sent,
    /// never including image payloads.
    async fn submit_task(&self, input: &mut NewTask) -> Result<String, ProviderError>;

    /// Fetch the current state of a remote job.
    async fn query_task(&self, provider_task_id: &str) -> Result<RemoteStatus, ProviderError>;

    /// Fetch and store the artifacts of a completed job.
    async fn download_result(&self, task: &Task) -> Result<DownloadResult, ProviderError>;

    /// Ask the provider to cancel a remote job.
    async fn cancel_task(&self, provider_task_id: &str) -> Result<(), ProviderError>;
}
