//! Meshy provider.
//!
//! Image input only. Artifacts are stored flat under the storage root as
//! `<taskId>_<hash8>.glb`, with `_pre_remeshed.glb` and `_thumb.png`
//! companions when the remote job produced them.

pub mod api;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use gen3d_core::hashing::ArtifactDigest;
use gen3d_core::params::{bool_param, int_param, string_param, GenerationParams};
use gen3d_core::task::{clamp_progress, InputType, TaskStatus};
use gen3d_db::models::task::{NewTask, Task};
use serde::Serialize;
use serde_json::Value;

use self::api::{ImageTo3DRequest, MeshyApi, TaskResponse};
use crate::adapter::{DownloadResult, ProviderAdapter, RemoteStatus};
use crate::error::ProviderError;
use crate::http;
use crate::storage::{ArtifactStore, FileArtifactStore, StorageConfig, StorageError, StoredFile};

/// Registry key for this provider.
pub const PROVIDER_NAME: &str = "meshy";

#[derive(Debug, Clone)]
pub struct MeshyConfig {
    pub api_key: String,
    pub base_url: String,
    pub default_ai_model: String,
    pub default_enable_pbr: bool,
    pub default_topology: String,
    pub default_target_polycount: i64,
    pub default_should_remesh: bool,
    pub default_should_texture: bool,
    pub default_save_pre_remeshed: bool,
    pub default_category: String,
    pub poll_interval: Duration,
    pub request_timeout: Duration,
    pub download_timeout: Duration,
    pub storage: StorageConfig,
}

impl Default for MeshyConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            base_url: api::DEFAULT_BASE_URL.to_string(),
            default_ai_model: "meshy-6".to_string(),
            default_enable_pbr: true,
            default_topology: "triangle".to_string(),
            default_target_polycount: 30_000,
            default_should_remesh: true,
            default_should_texture: true,
            default_save_pre_remeshed: true,
            default_category: "AI生成".to_string(),
            poll_interval: Duration::from_secs(5),
            request_timeout: Duration::from_secs(30),
            download_timeout: Duration::from_secs(120),
            storage: StorageConfig::local("static/meshy"),
        }
    }
}

impl MeshyConfig {
    pub fn has_credentials(&self) -> bool {
        !self.api_key.is_empty()
    }
}

/// Generation knobs actually sent to Meshy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MeshyParams {
    pub ai_model: String,
    pub enable_pbr: bool,
    pub topology: String,
    pub target_polycount: i64,
    pub should_remesh: bool,
    pub should_texture: bool,
    pub save_pre_remeshed: bool,
}

impl MeshyParams {
    pub fn resolve(params: &GenerationParams, config: &MeshyConfig) -> Self {
        Self {
            ai_model: string_param(params, "aiModel", &config.default_ai_model),
            enable_pbr: bool_param(params, "enablePbr", config.default_enable_pbr),
            topology: string_param(params, "topology", &config.default_topology),
            target_polycount: int_param(
                params,
                "targetPolycount",
                config.default_target_polycount,
            ),
            should_remesh: bool_param(params, "shouldRemesh", config.default_should_remesh),
            should_texture: bool_param(params, "shouldTexture", config.default_should_texture),
            save_pre_remeshed: bool_param(
                params,
                "savePreRemeshed",
                config.default_save_pre_remeshed,
            ),
        }
    }

    fn to_request(&self, image_url: String) -> ImageTo3DRequest {
        ImageTo3DRequest {
            image_url,
            ai_model: self.ai_model.clone(),
            enable_pbr: self.enable_pbr,
            topology: self.topology.clone(),
            target_polycount: self.target_polycount,
            should_remesh: self.should_remesh,
            should_texture: self.should_texture,
            save_pre_remeshed_model: self.save_pre_remeshed,
        }
    }

    pub fn into_map(self) -> GenerationParams {
        match serde_json::to_value(self) {
            Ok(Value::Object(map)) => map,
            _ => GenerationParams::new(),
        }
    }
}

/// [`ProviderAdapter`] for Meshy.
pub struct MeshyAdapter {
    config: MeshyConfig,
    api: MeshyApi,
    downloader: reqwest::Client,
    store: Arc<dyn ArtifactStore>,
}

impl MeshyAdapter {
    pub fn new(config: MeshyConfig) -> Result<Self, ProviderError> {
        let store = Arc::new(FileArtifactStore::new(config.storage.clone()));
        Self::with_store(config, store)
    }

    pub fn with_store(
        config: MeshyConfig,
        store: Arc<dyn ArtifactStore>,
    ) -> Result<Self, ProviderError> {
        let client = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .build()?;
        let downloader = reqwest::Client::builder()
            .timeout(config.download_timeout)
            .build()?;
        let api = MeshyApi::new(client, config.base_url.clone(), config.api_key.clone());
        Ok(Self {
            config,
            api,
            downloader,
            store,
        })
    }

    pub fn config(&self) -> &MeshyConfig {
        &self.config
    }

    async fn save_extra(&self, url: &str, file_name: &str) -> Result<StoredFile, ProviderError> {
        let data = http::fetch_bytes(&self.downloader, url).await?;
        Ok(self.store.save("", file_name, &data).await?)
    }
}

#[async_trait]
impl ProviderAdapter for MeshyAdapter {
    fn name(&self) -> &str {
        PROVIDER_NAME
    }

    fn default_category(&self) -> &str {
        &self.config.default_category
    }

    async fn submit_task(&self, input: &mut NewTask) -> Result<String, ProviderError> {
        if input.input_type != InputType::Image {
            return Err(ProviderError::InvalidInput(
                "meshy only supports image input".into(),
            ));
        }
        let image_url = input
            .image
            .as_ref()
            .map(|image| image.to_url_or_data_uri())
            .ok_or_else(|| ProviderError::InvalidInput("image is required".into()))?;

        let params = MeshyParams::resolve(&input.generation_params, &self.config);
        let request = params.to_request(image_url);
        input.generation_params = params.into_map();

        let task_id = self.api.submit_image_to_3d(&request).await?;
        tracing::info!(
            provider = PROVIDER_NAME,
            provider_task_id = %task_id,
            "Submitted Meshy task",
        );
        Ok(task_id)
    }

    async fn query_task(&self, provider_task_id: &str) -> Result<RemoteStatus, ProviderError> {
        let response = self.api.get_task(provider_task_id).await?;
        Ok(map_task_response(response))
    }

    async fn download_result(&self, task: &Task) -> Result<DownloadResult, ProviderError> {
        let model_url = task
            .model_url
            .as_deref()
            .filter(|u| !u.is_empty())
            .ok_or_else(|| ProviderError::MissingResult("task has no model URL".into()))?;

        let data = http::fetch_bytes(&self.downloader, model_url).await?;
        let digest = ArtifactDigest::of(&data);
        let prefix = format!("{}_{}", task.provider_task_id, digest.prefix(8));

        let file_name = format!("{prefix}.glb");
        let stored = self.store.save("", &file_name, &data).await?;
        if !stored.is_stored() {
            return Err(StorageError::NotStored(file_name).into());
        }

        let mut result = DownloadResult {
            local_path: stored.local_path,
            nas_path: stored.nas_path,
            file_size: digest.size,
            file_hash: digest.sha256.clone(),
            ..Default::default()
        };

        if let Some(url) = task.pre_remeshed_url.as_deref().filter(|u| !u.is_empty()) {
            match self.save_extra(url, &format!("{prefix}_pre_remeshed.glb")).await {
                Ok(stored) => {
                    result.pre_remeshed_path = stored.local_path;
                    result.pre_remeshed_nas_path = stored.nas_path;
                }
                Err(e) => tracing::warn!(
                    task_id = task.id,
                    provider = PROVIDER_NAME,
                    error = %e,
                    "Pre-remeshed model download failed",
                ),
            }
        }

        if let Some(url) = task.thumbnail_url.as_deref().filter(|u| !u.is_empty()) {
            match self.save_extra(url, &format!("{prefix}_thumb.png")).await {
                Ok(stored) => result.thumbnail_path = stored.preferred_path(),
                Err(e) => tracing::warn!(
                    task_id = task.id,
                    provider = PROVIDER_NAME,
                    error = %e,
                    "Thumbnail download failed",
                ),
            }
        }

        Ok(result)
    }

    async fn cancel_task(&self, _provider_task_id: &str) -> Result<(), ProviderError> {
        Err(ProviderError::Unsupported {
            provider: PROVIDER_NAME.to_string(),
            operation: "cancel",
        })
    }
}

/// Meshy's status vocabulary onto the uniform lifecycle.
fn map_status(status: &str) -> TaskStatus {
    match status {
        "PENDING" => TaskStatus::Wait,
        "IN_PROGRESS" => TaskStatus::Run,
        "SUCCEEDED" => TaskStatus::Done,
        "FAILED" | "CANCELED" => TaskStatus::Fail,
        other => {
            tracing::debug!(status = %other, "Unknown Meshy status, treating as WAIT");
            TaskStatus::Wait
        }
    }
}

fn map_task_response(response: TaskResponse) -> RemoteStatus {
    let mut status = RemoteStatus::new(map_status(&response.status))
        .with_progress(clamp_progress(response.progress));

    if let Some(urls) = response.model_urls {
        status.model_url = [urls.glb, urls.fbx, urls.obj]
            .into_iter()
            .find(|u| !u.is_empty());
        status.pre_remeshed_url = Some(urls.pre_remeshed_glb).filter(|u| !u.is_empty());
    }
    if !response.thumbnail_url.is_empty() {
        status.thumbnail_url = Some(response.thumbnail_url);
    }
    status.error_message = response
        .task_error
        .map(|e| e.message)
        .filter(|m| !m.is_empty());

    status
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::api::{ModelUrls, TaskError};
    use super::*;

    #[test]
    fn maps_native_statuses() {
        assert_eq!(map_status("PENDING"), TaskStatus::Wait);
        assert_eq!(map_status("IN_PROGRESS"), TaskStatus::Run);
        assert_eq!(map_status("SUCCEEDED"), TaskStatus::Done);
        assert_eq!(map_status("FAILED"), TaskStatus::Fail);
        assert_eq!(map_status("CANCELED"), TaskStatus::Fail);
        assert_eq!(map_status("EXPIRED"), TaskStatus::Wait);
    }

    #[test]
    fn prefers_glb_then_fbx_then_obj() {
        let status = map_task_response(TaskResponse {
            status: "SUCCEEDED".into(),
            progress: 100,
            model_urls: Some(ModelUrls {
                fbx: "https://cdn/m.fbx".into(),
                obj: "https://cdn/m.obj".into(),
                pre_remeshed_glb: "https://cdn/pre.glb".into(),
                ..Default::default()
            }),
            thumbnail_url: "https://cdn/t.png".into(),
            ..Default::default()
        });
        assert_eq!(status.status, TaskStatus::Done);
        assert_eq!(status.progress, Some(100));
        assert_eq!(status.model_url.as_deref(), Some("https://cdn/m.fbx"));
        assert_eq!(status.pre_remeshed_url.as_deref(), Some("https://cdn/pre.glb"));
        assert_eq!(status.thumbnail_url.as_deref(), Some("https://cdn/t.png"));
    }

    #[test]
    fn carries_task_error_and_clamps_progress() {
        let status = map_task_response(TaskResponse {
            status: "FAILED".into(),
            progress: 140,
            task_error: Some(TaskError {
                message: "bad image".into(),
            }),
            ..Default::default()
        });
        assert_eq!(status.status, TaskStatus::Fail);
        assert_eq!(status.progress, Some(100));
        assert_eq!(status.error_message.as_deref(), Some("bad image"));
        assert_eq!(status.model_url, None);
    }

    #[test]
    fn params_record_what_was_sent() {
        let mut params = GenerationParams::new();
        params.insert("topology".into(), json!("quad"));
        params.insert("targetPolycount".into(), json!(8000));

        let resolved = MeshyParams::resolve(&params, &MeshyConfig::default());
        let request = resolved.to_request("https://x/a.png".into());
        assert_eq!(request.topology, "quad");
        assert_eq!(request.target_polycount, 8000);
        assert!(request.save_pre_remeshed_model);

        let map = resolved.into_map();
        assert_eq!(map["aiModel"], json!("meshy-6"));
        assert_eq!(map["targetPolycount"], json!(8000));
        assert_eq!(map.len(), 7);
    }
}
