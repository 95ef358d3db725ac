//! REST client for the Meshy image-to-3D API.

use serde::{Deserialize, Serialize};

use crate::error::ProviderError;
use crate::http;

pub const DEFAULT_BASE_URL: &str = "https://api.meshy.ai";
const IMAGE_TO_3D_PATH: &str = "/openapi/v1/image-to-3d";

/// Submission accepts any of these.
const SUBMIT_ACCEPTED: &[u16] = &[200, 201, 202];

/// Body of an image-to-3D creation request.
#[derive(Debug, Clone, Serialize)]
pub struct ImageTo3DRequest {
    /// Public URL or `data:image/...;base64,` URI.
    pub image_url: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub ai_model: String,
    pub enable_pbr: bool,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub topology: String,
    #[serde(skip_serializing_if = "is_zero")]
    pub target_polycount: i64,
    pub should_remesh: bool,
    pub should_texture: bool,
    pub save_pre_remeshed_model: bool,
}

fn is_zero(value: &i64) -> bool {
    *value == 0
}

#[derive(Debug, Deserialize)]
struct SubmitResponse {
    /// The new task ID.
    #[serde(default, deserialize_with = "http::null_as_default")]
    result: String,
}

/// A task as reported by `GET /openapi/v1/image-to-3d/{id}`.
#[derive(Debug, Default, Deserialize)]
pub struct TaskResponse {
    #[serde(default, deserialize_with = "http::null_as_default")]
    pub id: String,
    /// PENDING, IN_PROGRESS, SUCCEEDED, FAILED or CANCELED.
    #[serde(default, deserialize_with = "http::null_as_default")]
    pub status: String,
    #[serde(default, deserialize_with = "http::null_as_default")]
    pub progress: i64,
    pub model_urls: Option<ModelUrls>,
    #[serde(default, deserialize_with = "http::null_as_default")]
    pub thumbnail_url: String,
    pub task_error: Option<TaskError>,
}

#[derive(Debug, Default, Deserialize)]
pub struct ModelUrls {
    #[serde(default, deserialize_with = "http::null_as_default")]
    pub glb: String,
    #[serde(default, deserialize_with = "http::null_as_default")]
    pub fbx: String,
    #[serde(default, deserialize_with = "http::null_as_default")]
    pub usdz: String,
    #[serde(default, deserialize_with = "http::null_as_default")]
    pub obj: String,
    #[serde(default, deserialize_with = "http::null_as_default")]
    pub pre_remeshed_glb: String,
}

#[derive(Debug, Default, Deserialize)]
pub struct TaskError {
    #[serde(default, deserialize_with = "http::null_as_default")]
    pub message: String,
}

/// HTTP client for the Meshy API.
pub struct MeshyApi {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
}

impl MeshyApi {
    /// * `base_url` - API root without trailing slash, e.g. [`DEFAULT_BASE_URL`].
    pub fn new(client: reqwest::Client, base_url: String, api_key: String) -> Self {
        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key,
        }
    }

    /// Create an image-to-3D task. Returns the task ID.
    pub async fn submit_image_to_3d(
        &self,
        request: &ImageTo3DRequest,
    ) -> Result<String, ProviderError> {
        let response = self
            .client
            .post(format!("{}{IMAGE_TO_3D_PATH}", self.base_url))
            .bearer_auth(&self.api_key)
            .json(request)
            .send()
            .await?;

        let body: SubmitResponse = http::parse_response(response, SUBMIT_ACCEPTED).await?;
        if body.result.is_empty() {
            return Err(ProviderError::MissingResult(
                "submission response carried no task ID".to_string(),
            ));
        }
        Ok(body.result)
    }

    /// Fetch one task.
    pub async fn get_task(&self, task_id: &str) -> Result<TaskResponse, ProviderError> {
        let response = self
            .client
            .get(format!("{}{IMAGE_TO_3D_PATH}/{task_id}", self.base_url))
            .bearer_auth(&self.api_key)
            .send()
            .await?;

        http::parse_response(response, &[200]).await
    }
}
