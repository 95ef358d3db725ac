//! Hunyuan 3D provider (Tencent Cloud).
//!
//! Text and image input. The remote job already reports WAIT/RUN/DONE/FAIL
//! but no progress. Artifacts are stored as `YYYY/MM/<hash16>.glb` with a
//! `<hash16>.png` preview alongside.

pub mod api;
pub mod sign;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use gen3d_core::hashing::ArtifactDigest;
use gen3d_core::image::ImageInput;
use gen3d_core::naming::year_month_subpath;
use gen3d_core::params::{bool_param, int_param, string_param, GenerationParams};
use gen3d_core::task::{InputType, TaskStatus};
use gen3d_db::models::task::{NewTask, Task};
use serde::Serialize;
use serde_json::Value;

use self::api::{HunyuanApi, QueryJobResponse, ResultFile, SubmitJobRequest};
use crate::adapter::{DownloadResult, ProviderAdapter, RemoteStatus};
use crate::error::ProviderError;
use crate::http;
use crate::storage::{ArtifactStore, FileArtifactStore, StorageConfig, StorageError};

/// Registry key for this provider.
pub const PROVIDER_NAME: &str = "hunyuan";

/// Provider configuration with defaults for every generation knob.
#[derive(Debug, Clone)]
pub struct HunyuanConfig {
    pub secret_id: String,
    pub secret_key: String,
    pub region: String,
    pub api_url: String,
    pub default_model: String,
    pub default_face_count: i64,
    pub default_generate_type: String,
    pub default_enable_pbr: bool,
    pub default_result_format: String,
    pub default_category: String,
    /// Preferred sweep interval for tasks of this provider.
    pub poll_interval: Duration,
    /// Per-call timeout for API requests.
    pub request_timeout: Duration,
    /// Per-call timeout for artifact downloads.
    pub download_timeout: Duration,
    pub storage: StorageConfig,
}

impl Default for HunyuanConfig {
    fn default() -> Self {
        Self {
            secret_id: String::new(),
            secret_key: String::new(),
            region: "ap-guangzhou".to_string(),
            api_url: api::DEFAULT_API_URL.to_string(),
            default_model: "3.1".to_string(),
            default_face_count: 500_000,
            default_generate_type: "Normal".to_string(),
            default_enable_pbr: false,
            default_result_format: "GLB".to_string(),
            default_category: "AI生成".to_string(),
            poll_interval: Duration::from_secs(5),
            request_timeout: Duration::from_secs(30),
            download_timeout: Duration::from_secs(60),
            storage: StorageConfig::local("static/hunyuan"),
        }
    }
}

impl HunyuanConfig {
    pub fn has_credentials(&self) -> bool {
        !self.secret_id.is_empty() && !self.secret_key.is_empty()
    }
}

/// Generation knobs actually sent to Hunyuan.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HunyuanParams {
    pub model: String,
    pub generate_type: String,
    pub face_count: i64,
    pub enable_pbr: bool,
    pub result_format: String,
}

impl HunyuanParams {
    /// Decode from caller params, filling gaps from the config defaults.
    pub fn resolve(params: &GenerationParams, config: &HunyuanConfig) -> Self {
        Self {
            model: string_param(params, "model", &config.default_model),
            generate_type: string_param(params, "generateType", &config.default_generate_type),
            face_count: int_param(params, "faceCount", config.default_face_count),
            enable_pbr: bool_param(params, "enablePbr", config.default_enable_pbr),
            result_format: string_param(params, "resultFormat", &config.default_result_format),
        }
    }

    pub fn into_map(self) -> GenerationParams {
        match serde_json::to_value(self) {
            Ok(Value::Object(map)) => map,
            _ => GenerationParams::new(),
        }
    }
}

/// [`ProviderAdapter`] for Hunyuan 3D.
pub struct HunyuanAdapter {
    config: HunyuanConfig,
    api: HunyuanApi,
    downloader: reqwest::Client,
    store: Arc<dyn ArtifactStore>,
}

impl HunyuanAdapter {
    /// Build the adapter with a [`FileArtifactStore`] over `config.storage`.
    pub fn new(config: HunyuanConfig) -> Result<Self, ProviderError> {
        let store = Arc::new(FileArtifactStore::new(config.storage.clone()));
        Self::with_store(config, store)
    }

    pub fn with_store(
        config: HunyuanConfig,
        store: Arc<dyn ArtifactStore>,
    ) -> Result<Self, ProviderError> {
        let client = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .build()?;
        let downloader = reqwest::Client::builder()
            .timeout(config.download_timeout)
            .build()?;
        let api = HunyuanApi::new(
            client,
            config.api_url.clone(),
            config.secret_id.clone(),
            config.secret_key.clone(),
            config.region.clone(),
        );
        Ok(Self {
            config,
            api,
            downloader,
            store,
        })
    }

    pub fn config(&self) -> &HunyuanConfig {
        &self.config
    }
}

#[async_trait]
impl ProviderAdapter for HunyuanAdapter {
    fn name(&self) -> &str {
        PROVIDER_NAME
    }

    fn default_category(&self) -> &str {
        &self.config.default_category
    }

    async fn submit_task(&self, input: &mut NewTask) -> Result<String, ProviderError> {
        let params = HunyuanParams::resolve(&input.generation_params, &self.config);

        let mut request = SubmitJobRequest {
            model: Some(params.model.clone()),
            enable_pbr: Some(params.enable_pbr),
            face_count: Some(params.face_count),
            generate_type: Some(params.generate_type.clone()),
            result_format: Some(params.result_format.clone()),
            ..Default::default()
        };
        match (input.input_type, &input.image) {
            (InputType::Text, _) => {
                let prompt = input
                    .prompt
                    .as_deref()
                    .filter(|p| !p.trim().is_empty())
                    .ok_or_else(|| ProviderError::InvalidInput("prompt is required".into()))?;
                request.prompt = Some(prompt.to_string());
            }
            (InputType::Image, Some(ImageInput::Url(url))) => {
                request.image_url = Some(url.clone());
            }
            (InputType::Image, Some(ImageInput::Base64(data))) => {
                request.image_base64 = Some(data.clone());
            }
            (InputType::Image, None) => {
                return Err(ProviderError::InvalidInput("image is required".into()));
            }
        }

        input.generation_params = params.into_map();

        let job_id = self.api.submit_job(&request).await?;
        tracing::info!(
            provider = PROVIDER_NAME,
            provider_task_id = %job_id,
            input_type = %input.input_type,
            "Submitted Hunyuan job",
        );
        Ok(job_id)
    }

    async fn query_task(&self, provider_task_id: &str) -> Result<RemoteStatus, ProviderError> {
        let response = self.api.query_job(provider_task_id).await?;
        Ok(map_query_response(response))
    }

    async fn download_result(&self, task: &Task) -> Result<DownloadResult, ProviderError> {
        let model_url = task
            .model_url
            .as_deref()
            .filter(|u| !u.is_empty())
            .ok_or_else(|| ProviderError::MissingResult("task has no model URL".into()))?;

        let data = http::fetch_bytes(&self.downloader, model_url).await?;
        let digest = ArtifactDigest::of(&data);
        let stem = digest.prefix(16);
        let sub_path = year_month_subpath(Utc::now());

        let file_name = format!("{stem}.glb");
        let stored = self.store.save(&sub_path, &file_name, &data).await?;
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

        if let Some(url) = task.thumbnail_url.as_deref().filter(|u| !u.is_empty()) {
            let thumb_name = format!("{stem}.png");
            match self.save_extra(url, &sub_path, &thumb_name).await {
                Ok(path) => result.thumbnail_path = path,
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

impl HunyuanAdapter {
    async fn save_extra(
        &self,
        url: &str,
        sub_path: &str,
        file_name: &str,
    ) -> Result<Option<String>, ProviderError> {
        let data = http::fetch_bytes(&self.downloader, url).await?;
        let stored = self.store.save(sub_path, file_name, &data).await?;
        Ok(stored.preferred_path())
    }
}

/// Map a query response onto the uniform lifecycle.
fn map_query_response(response: QueryJobResponse) -> RemoteStatus {
    let status = TaskStatus::from_name(&response.status).unwrap_or_else(|_| {
        tracing::debug!(status = %response.status, "Unknown Hunyuan status, treating as WAIT");
        TaskStatus::Wait
    });

    RemoteStatus {
        status,
        progress: None,
        model_url: pick_model_url(&response.result_files),
        pre_remeshed_url: None,
        thumbnail_url: response
            .result_files
            .iter()
            .map(|f| f.preview_image_url.as_str())
            .find(|u| !u.is_empty())
            .map(str::to_string),
        error_code: non_empty(response.error_code),
        error_message: non_empty(response.error_message),
    }
}

/// The GLB file if one exists, else the first file with a URL.
fn pick_model_url(files: &[ResultFile]) -> Option<String> {
    files
        .iter()
        .filter(|f| !f.url.is_empty())
        .find(|f| f.file_type.eq_ignore_ascii_case("glb"))
        .or_else(|| files.iter().find(|f| !f.url.is_empty()))
        .map(|f| f.url.clone())
}

fn non_empty(value: String) -> Option<String> {
    (!value.is_empty()).then_some(value)
}
