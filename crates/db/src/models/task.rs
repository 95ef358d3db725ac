//! Generation task entity, projections, and DTOs.

use gen3d_core::error::CoreError;
use gen3d_core::image::ImageInput;
use gen3d_core::naming;
use gen3d_core::params::{collect_generation_params, GenerationParams};
use gen3d_core::task::{InputType, TaskStatus};
use gen3d_core::types::{DbId, Timestamp};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use sqlx::FromRow;

/// Default page size for task listing.
pub const DEFAULT_PAGE_SIZE: i64 = 20;

/// Maximum page size for task listing.
pub const MAX_PAGE_SIZE: i64 = 100;

/// A row from the `ai3d_tasks` table.
#[derive(Debug, Clone, FromRow, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Task {
    pub id: DbId,
    pub provider: String,
    pub provider_task_id: String,
    #[sqlx(try_from = "String")]
    pub status: TaskStatus,
    pub progress: i16,
    #[sqlx(try_from = "String")]
    pub input_type: InputType,
    pub prompt: Option<String>,
    pub image_url: Option<String>,
    /// Inline image payload. Never written by the service and never
    /// serialized back to any consumer.
    #[serde(skip_serializing)]
    pub image_base64: Option<String>,
    pub generation_params: Value,
    pub model_url: Option<String>,
    pub pre_remeshed_url: Option<String>,
    pub thumbnail_url: Option<String>,
    pub local_path: Option<String>,
    pub nas_path: Option<String>,
    pub thumbnail_path: Option<String>,
    pub pre_remeshed_path: Option<String>,
    pub pre_remeshed_nas_path: Option<String>,
    pub file_size: Option<i64>,
    pub file_hash: Option<String>,
    pub error_code: Option<String>,
    pub error_message: Option<String>,
    pub name: String,
    pub description: Option<String>,
    pub category: String,
    pub tags: Option<String>,
    pub created_by: String,
    pub created_ip: String,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
    #[serde(skip_serializing)]
    pub deleted_at: Option<Timestamp>,
}

impl Task {
    /// Whether the artifacts were materialized locally or on the NAS.
    pub fn has_artifacts(&self) -> bool {
        self.local_path.is_some() || self.nas_path.is_some()
    }

    /// Public URL of the primary artifact, preferring the local copy.
    pub fn file_url(&self, base_url: &str) -> Option<String> {
        self.local_path
            .as_deref()
            .filter(|p| !p.is_empty())
            .or(self.nas_path.as_deref().filter(|p| !p.is_empty()))
            .and_then(|path| naming::public_file_url(base_url, &self.provider, path))
    }

    /// Public URL of the stored thumbnail.
    pub fn thumbnail_file_url(&self, base_url: &str) -> Option<String> {
        self.thumbnail_path
            .as_deref()
            .and_then(|path| naming::public_file_url(base_url, &self.provider, path))
    }

    /// The persisted generation params as a JSON object.
    pub fn params(&self) -> GenerationParams {
        match &self.generation_params {
            Value::Object(map) => map.clone(),
            _ => GenerationParams::new(),
        }
    }
}

/// Listing projection of [`Task`].
///
/// Carries no image payload field at all, so nothing a listing returns
/// can leak an inline image.
#[derive(Debug, Clone, FromRow, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskSummary {
    pub id: DbId,
    pub provider: String,
    pub provider_task_id: String,
    #[sqlx(try_from = "String")]
    pub status: TaskStatus,
    pub progress: i16,
    #[sqlx(try_from = "String")]
    pub input_type: InputType,
    pub prompt: Option<String>,
    pub image_url: Option<String>,
    pub generation_params: Value,
    pub model_url: Option<String>,
    pub pre_remeshed_url: Option<String>,
    pub thumbnail_url: Option<String>,
    pub local_path: Option<String>,
    pub nas_path: Option<String>,
    pub thumbnail_path: Option<String>,
    pub file_size: Option<i64>,
    pub file_hash: Option<String>,
    pub error_code: Option<String>,
    pub error_message: Option<String>,
    pub name: String,
    pub description: Option<String>,
    pub category: String,
    pub tags: Option<String>,
    pub created_by: String,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

impl From<&Task> for TaskSummary {
    fn from(task: &Task) -> Self {
        Self {
            id: task.id,
            provider: task.provider.clone(),
            provider_task_id: task.provider_task_id.clone(),
            status: task.status,
            progress: task.progress,
            input_type: task.input_type,
            prompt: task.prompt.clone(),
            image_url: task.image_url.clone(),
            generation_params: task.generation_params.clone(),
            model_url: task.model_url.clone(),
            pre_remeshed_url: task.pre_remeshed_url.clone(),
            thumbnail_url: task.thumbnail_url.clone(),
            local_path: task.local_path.clone(),
            nas_path: task.nas_path.clone(),
            thumbnail_path: task.thumbnail_path.clone(),
            file_size: task.file_size,
            file_hash: task.file_hash.clone(),
            error_code: task.error_code.clone(),
            error_message: task.error_message.clone(),
            name: task.name.clone(),
            description: task.description.clone(),
            category: task.category.clone(),
            tags: task.tags.clone(),
            created_by: task.created_by.clone(),
            created_at: task.created_at,
            updated_at: task.updated_at,
        }
    }
}

/// DTO for submitting a new task.
///
/// `image` lives only for the duration of the submission. Adapters may
/// rewrite `generation_params` to the values they actually sent.
#[derive(Debug, Clone)]
pub struct NewTask {
    pub provider: String,
    pub input_type: InputType,
    pub prompt: Option<String>,
    pub image: Option<ImageInput>,
    pub generation_params: GenerationParams,
    pub name: Option<String>,
    pub description: Option<String>,
    pub category: Option<String>,
    pub tags: Option<String>,
    pub created_by: String,
    pub created_ip: String,
}

impl NewTask {
    /// Minimal text-to-3D submission.
    pub fn text(provider: impl Into<String>, prompt: impl Into<String>) -> Self {
        Self {
            provider: provider.into(),
            input_type: InputType::Text,
            prompt: Some(prompt.into()),
            image: None,
            generation_params: GenerationParams::new(),
            name: None,
            description: None,
            category: None,
            tags: None,
            created_by: String::new(),
            created_ip: String::new(),
        }
    }

    /// Minimal image-to-3D submission.
    pub fn image(provider: impl Into<String>, image: ImageInput) -> Self {
        Self {
            input_type: InputType::Image,
            prompt: None,
            image: Some(image),
            ..Self::text(provider, String::new())
        }
    }

    /// Build a submission from a flat JSON request body.
    ///
    /// Recognised top-level keys: `provider`, `inputType`, `prompt`,
    /// `imageUrl`, `imageBase64`, `name`, `description`, `category`,
    /// `tags`, `generationParams`. Every other key is folded into the
    /// generation params.
    pub fn from_request(
        request: &Map<String, Value>,
        created_by: impl Into<String>,
        created_ip: impl Into<String>,
    ) -> Result<Self, CoreError> {
        let provider = non_empty_str(request, "provider").ok_or_else(|| {
            CoreError::Validation("provider and inputType are required".to_string())
        })?;
        let input_type = non_empty_str(request, "inputType").ok_or_else(|| {
            CoreError::Validation("provider and inputType are required".to_string())
        })?;

        Ok(Self {
            provider: provider.to_string(),
            input_type: InputType::from_name(input_type)?,
            prompt: non_empty_str(request, "prompt").map(str::to_string),
            image: ImageInput::from_fields(
                non_empty_str(request, "imageUrl"),
                non_empty_str(request, "imageBase64"),
            ),
            generation_params: collect_generation_params(request),
            name: non_empty_str(request, "name").map(str::to_string),
            description: non_empty_str(request, "description").map(str::to_string),
            category: non_empty_str(request, "category").map(str::to_string),
            tags: non_empty_str(request, "tags").map(str::to_string),
            created_by: created_by.into(),
            created_ip: created_ip.into(),
        })
    }

    /// The image reference that may be stored on the record.
    pub fn image_reference(&self) -> Option<&str> {
        self.image.as_ref().and_then(ImageInput::persisted_reference)
    }
}

fn non_empty_str<'a>(request: &'a Map<String, Value>, key: &str) -> Option<&'a str> {
    request
        .get(key)
        .and_then(Value::as_str)
        .filter(|s| !s.trim().is_empty())
}

/// Field changes produced by one reconciliation (or a cancellation).
///
/// `None` leaves the column untouched. Applied in a single write.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TaskUpdate {
    pub status: Option<TaskStatus>,
    pub progress: Option<i16>,
    pub model_url: Option<String>,
    pub pre_remeshed_url: Option<String>,
    pub thumbnail_url: Option<String>,
    pub error_code: Option<String>,
    pub error_message: Option<String>,
    pub local_path: Option<String>,
    pub nas_path: Option<String>,
    pub thumbnail_path: Option<String>,
    pub pre_remeshed_path: Option<String>,
    pub pre_remeshed_nas_path: Option<String>,
    pub file_size: Option<i64>,
    pub file_hash: Option<String>,
}

impl TaskUpdate {
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }

    /// Whether this update carries materialized artifact fields.
    pub fn has_artifacts(&self) -> bool {
        self.local_path.is_some()
            || self.nas_path.is_some()
            || self.file_hash.is_some()
            || self.file_size.is_some()
    }

    /// Apply the changes to an in-memory record.
    pub fn apply_to(&self, task: &mut Task) {
        fn set<T: Clone>(target: &mut T, value: &Option<T>) {
            if let Some(v) = value {
                *target = v.clone();
            }
        }
        fn set_opt<T: Clone>(target: &mut Option<T>, value: &Option<T>) {
            if value.is_some() {
                *target = value.clone();
            }
        }

        set(&mut task.status, &self.status);
        set(&mut task.progress, &self.progress);
        set_opt(&mut task.model_url, &self.model_url);
        set_opt(&mut task.pre_remeshed_url, &self.pre_remeshed_url);
        set_opt(&mut task.thumbnail_url, &self.thumbnail_url);
        set_opt(&mut task.error_code, &self.error_code);
        set_opt(&mut task.error_message, &self.error_message);
        set_opt(&mut task.local_path, &self.local_path);
        set_opt(&mut task.nas_path, &self.nas_path);
        set_opt(&mut task.thumbnail_path, &self.thumbnail_path);
        set_opt(&mut task.pre_remeshed_path, &self.pre_remeshed_path);
        set_opt(&mut task.pre_remeshed_nas_path, &self.pre_remeshed_nas_path);
        set_opt(&mut task.file_size, &self.file_size);
        set_opt(&mut task.file_hash, &self.file_hash);
    }
}

/// Filters and pagination for task listing.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskListQuery {
    pub provider: Option<String>,
    pub status: Option<TaskStatus>,
    /// Case-insensitive substring match on the task name.
    pub keyword: Option<String>,
    /// 1-based page number. Defaults to 1.
    pub page: Option<i64>,
    /// Defaults to 20, capped at 100.
    pub page_size: Option<i64>,
}

impl TaskListQuery {
    pub fn page(&self) -> i64 {
        self.page.filter(|p| *p >= 1).unwrap_or(1)
    }

    pub fn page_size(&self) -> i64 {
        match self.page_size {
            Some(size) if size >= 1 => size.min(MAX_PAGE_SIZE),
            _ => DEFAULT_PAGE_SIZE,
        }
    }

    /// Rows to skip. Saturates for absurd page numbers.
    pub fn offset(&self) -> i64 {
        (self.page() - 1).saturating_mul(self.page_size())
    }

    /// Provider filter with blanks treated as absent.
    pub fn provider_filter(&self) -> Option<&str> {
        self.provider.as_deref().filter(|p| !p.trim().is_empty())
    }

    /// Keyword filter with blanks treated as absent.
    pub fn keyword_filter(&self) -> Option<&str> {
        self.keyword
            .as_deref()
            .map(str::trim)
            .filter(|k| !k.is_empty())
    }
}

/// One page of task summaries plus the unpaginated total.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskPage {
    pub items: Vec<TaskSummary>,
    pub total: i64,
    pub page: i64,
    pub page_size: i64,
}
