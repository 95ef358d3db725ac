//! REST client for the Hunyuan 3D API (Tencent Cloud `ai3d` service).
//!
//! Every call is a signed JSON `POST /` with the action name in the
//! `X-TC-Action` header. Errors come back with HTTP 200 inside a
//! `Response.Error` envelope.

use serde::{Deserialize, Serialize};

use super::sign::Signer;
use crate::error::ProviderError;
use crate::http;

pub const DEFAULT_API_URL: &str = "https://ai3d.tencentcloudapi.com";
pub const API_VERSION: &str = "2025-05-13";
const SERVICE: &str = "ai3d";
const SUBMIT_ACTION: &str = "SubmitHunyuanTo3DProJob";
const QUERY_ACTION: &str = "QueryHunyuanTo3DProJob";

/// Body of a `SubmitHunyuanTo3DProJob` request.
#[derive(Debug, Default, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct SubmitJobRequest {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub prompt: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image_base64: Option<String>,
    #[serde(rename = "ImageUrl", skip_serializing_if = "Option::is_none")]
    pub image_url: Option<String>,
    #[serde(rename = "EnablePBR", skip_serializing_if = "Option::is_none")]
    pub enable_pbr: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub face_count: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub generate_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result_format: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct Envelope<T> {
    response: T,
}

/// Error envelope carried inside a 200 response.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ApiError {
    #[serde(default, deserialize_with = "http::null_as_default")]
    pub code: String,
    #[serde(default, deserialize_with = "http::null_as_default")]
    pub message: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct SubmitJobResponse {
    #[serde(default, deserialize_with = "http::null_as_default")]
    job_id: String,
    error: Option<ApiError>,
}

/// Body of a `QueryHunyuanTo3DProJob` response.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct QueryJobResponse {
    /// Already one of WAIT, RUN, DONE, FAIL.
    #[serde(default, deserialize_with = "http::null_as_default")]
    pub status: String,
    #[serde(default, deserialize_with = "http::null_as_default")]
    pub error_code: String,
    #[serde(default, deserialize_with = "http::null_as_default")]
    pub error_message: String,
    #[serde(rename = "ResultFile3Ds", default, deserialize_with = "http::null_as_default")]
    pub result_files: Vec<ResultFile>,
    pub error: Option<ApiError>,
}

/// One generated file.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ResultFile {
    /// File format, e.g. `GLB` or `OBJ`.
    #[serde(rename = "Type", default, deserialize_with = "http::null_as_default")]
    pub file_type: String,
    #[serde(default, deserialize_with = "http::null_as_default")]
    pub url: String,
    #[serde(default, deserialize_with = "http::null_as_default")]
    pub preview_image_url: String,
}

/// HTTP client for the Hunyuan 3D API.
pub struct HunyuanApi {
    client: reqwest::Client,
    api_url: String,
    host: String,
    secret_id: String,
    secret_key: String,
    region: String,
}

impl HunyuanApi {
    /// * `api_url` - Endpoint base URL, normally [`DEFAULT_API_URL`].
    pub fn new(
        client: reqwest::Client,
        api_url: String,
        secret_id: String,
        secret_key: String,
        region: String,
    ) -> Self {
        let host = reqwest::Url::parse(&api_url)
            .ok()
            .and_then(|url| url.host_str().map(str::to_string))
            .unwrap_or_else(|| api_url.clone());
        Self {
            client,
            api_url,
            host,
            secret_id,
            secret_key,
            region,
        }
    }

    /// Submit a generation job. Returns the remote `JobId`.
    pub async fn submit_job(&self, request: &SubmitJobRequest) -> Result<String, ProviderError> {
        let envelope: Envelope<SubmitJobResponse> = self.call(SUBMIT_ACTION, request).await?;
        let response = envelope.response;
        if let Some(error) = response.error {
            return Err(ProviderError::Remote {
                code: error.code,
                message: error.message,
            });
        }
        if response.job_id.is_empty() {
            return Err(ProviderError::MissingResult(
                "submission response carried no JobId".to_string(),
            ));
        }
        Ok(response.job_id)
    }

    /// Query the state of a job.
    pub async fn query_job(&self, job_id: &str) -> Result<QueryJobResponse, ProviderError> {
        let body = serde_json::json!({ "JobId": job_id });
        let envelope: Envelope<QueryJobResponse> = self.call(QUERY_ACTION, &body).await?;
        let mut response = envelope.response;
        if let Some(error) = response.error.take() {
            return Err(ProviderError::Remote {
                code: error.code,
                message: error.message,
            });
        }
        Ok(response)
    }

    async fn call<B, T>(&self, action: &str, body: &B) -> Result<T, ProviderError>
    where
        B: Serialize + ?Sized,
        T: serde::de::DeserializeOwned,
    {
        let payload = serde_json::to_vec(body)
            .map_err(|e| ProviderError::InvalidInput(format!("unserializable request: {e}")))?;
        let timestamp = chrono::Utc::now().timestamp();
        let authorization = Signer {
            secret_id: &self.secret_id,
            secret_key: &self.secret_key,
            service: SERVICE,
            host: &self.host,
        }
        .authorization(&payload, timestamp);

        let response = self
            .client
            .post(&self.api_url)
            .header(reqwest::header::CONTENT_TYPE, "application/json")
            .header(reqwest::header::AUTHORIZATION, authorization)
            .header("X-TC-Action", action)
            .header("X-TC-Version", API_VERSION)
            .header("X-TC-Timestamp", timestamp.to_string())
            .header("X-TC-Region", &self.region)
            .body(payload)
            .send()
            .await?;

        http::parse_response(response, &[200]).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn submit_request_uses_wire_names() {
        let request = SubmitJobRequest {
            model: Some("3.1".into()),
            image_url: Some("https://x/a.png".into()),
            enable_pbr: Some(false),
            face_count: Some(500_000),
            ..Default::default()
        };
        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(json["Model"], "3.1");
        assert_eq!(json["ImageUrl"], "https://x/a.png");
        assert_eq!(json["EnablePBR"], false);
        assert_eq!(json["FaceCount"], 500_000);
        assert!(json.get("Prompt").is_none());
        assert!(json.get("ImageBase64").is_none());
    }

    #[test]
    fn query_response_tolerates_missing_fields() {
        let envelope: Envelope<QueryJobResponse> = serde_json::from_str(
            r#"{"Response":{"Status":"DONE","ResultFile3Ds":[{"Type":"GLB","Url":"https://cdn/m.glb"}],"RequestId":"r"}}"#,
        )
        .unwrap();
        let response = envelope.response;
        assert_eq!(response.status, "DONE");
        assert_eq!(response.result_files[0].url, "https://cdn/m.glb");
        assert!(response.result_files[0].preview_image_url.is_empty());
        assert!(response.error.is_none());
    }

    #[test]
    fn query_response_tolerates_null_fields() {
        let envelope: Envelope<QueryJobResponse> = serde_json::from_str(
            r#"{"Response":{"Status":"RUN","ErrorCode":null,"ErrorMessage":null,"ResultFile3Ds":null,"Error":null,"RequestId":"r"}}"#,
        )
        .unwrap();
        let response = envelope.response;
        assert_eq!(response.status, "RUN");
        assert!(response.error_code.is_empty());
        assert!(response.error_message.is_empty());
        assert!(response.result_files.is_empty());
        assert!(response.error.is_none());

        let envelope: Envelope<QueryJobResponse> = serde_json::from_str(
            r#"{"Response":{"Status":"DONE","ResultFile3Ds":[{"Type":null,"Url":"https://cdn/m.glb","PreviewImageUrl":null}]}}"#,
        )
        .unwrap();
        let file = &envelope.response.result_files[0];
        assert!(file.file_type.is_empty());
        assert_eq!(file.url, "https://cdn/m.glb");
        assert!(file.preview_image_url.is_empty());
    }

    #[test]
    fn submit_response_tolerates_null_job_id() {
        let envelope: Envelope<SubmitJobResponse> = serde_json::from_str(
            r#"{"Response":{"JobId":null,"Error":{"Code":"AuthFailure","Message":null}}}"#,
        )
        .unwrap();
        let response = envelope.response;
        assert!(response.job_id.is_empty());
        let error = response.error.unwrap();
        assert_eq!(error.code, "AuthFailure");
        assert!(error.message.is_empty());
    }

    #[test]
    fn host_is_derived_from_api_url() {
        let api = HunyuanApi::new(
            reqwest::Client::new(),
            DEFAULT_API_URL.to_string(),
            "id".into(),
            "key".into(),
            "ap-guangzhou".into(),
        );
        assert_eq!(api.host, "ai3d.tencentcloudapi.com");
    }
}
