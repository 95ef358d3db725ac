//! Hunyuan adapter against a local stand-in for the Tencent Cloud endpoint.

use std::sync::{Arc, Mutex};

use assert_matches::assert_matches;
use axum::extract::State;
use axum::http::HeaderMap;
use axum::routing::{get, post};
use axum::{Json, Router};
use gen3d_core::image::ImageInput;
use gen3d_core::task::TaskStatus;
use gen3d_db::models::task::NewTask;
use gen3d_providers::hunyuan::{HunyuanAdapter, HunyuanConfig};
use gen3d_providers::storage::StorageConfig;
use gen3d_providers::{ProviderAdapter, ProviderError};
use serde_json::{json, Value};

#[derive(Clone, Default)]
struct Captured {
    requests: Arc<Mutex<Vec<(HeaderMap, Value)>>>,
}

async fn spawn(router: Router) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });
    format!("http://{addr}")
}

async fn hunyuan_server(captured: Captured) -> String {
    async fn dispatch(
        State(captured): State<Captured>,
        headers: HeaderMap,
        Json(body): Json<Value>,
    ) -> Json<Value> {
        let action = headers
            .get("x-tc-action")
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default()
            .to_string();
        captured
            .requests
            .lock()
            .unwrap()
            .push((headers, body.clone()));

        let response = match (action.as_str(), body["JobId"].as_str()) {
            ("SubmitHunyuanTo3DProJob", _) if body.get("Prompt") == Some(&json!("boom")) => json!({
                "Error": { "Code": "InvalidParameter", "Message": "bad prompt" },
                "RequestId": "r1",
            }),
            ("SubmitHunyuanTo3DProJob", _) => json!({ "JobId": "job-1", "RequestId": "r1" }),
            ("QueryHunyuanTo3DProJob", Some("job-1")) => json!({
                "Status": "DONE",
                "ResultFile3Ds": [
                    { "Type": "OBJ", "Url": "https://cdn/m.zip" },
                    { "Type": "GLB", "Url": "https://cdn/m.glb", "PreviewImageUrl": "https://cdn/p.png" },
                ],
                "RequestId": "r2",
            }),
            ("QueryHunyuanTo3DProJob", _) => json!({
                "Error": { "Code": "ResourceNotFound", "Message": "no such job" },
                "RequestId": "r3",
            }),
            _ => json!({ "Error": { "Code": "InvalidAction", "Message": action } }),
        };
        Json(json!({ "Response": response }))
    }

    let router = Router::new()
        .route("/", post(dispatch))
        .route("/files/m.glb", get(|| async { b"glb-bytes".as_slice() }))
        .with_state(captured);
    spawn(router).await
}

fn adapter(api_url: &str, storage_dir: &std::path::Path) -> HunyuanAdapter {
    HunyuanAdapter::new(HunyuanConfig {
        secret_id: "AKIDEXAMPLE".into(),
        secret_key: "secret".into(),
        api_url: api_url.to_string(),
        storage: StorageConfig::local(storage_dir),
        ..Default::default()
    })
    .unwrap()
}

#[tokio::test]
async fn submit_signs_request_and_records_params() {
    let captured = Captured::default();
    let api_url = hunyuan_server(captured.clone()).await;
    let dir = tempfile::tempdir().unwrap();
    let adapter = adapter(&api_url, dir.path());

    let mut input = NewTask::text("hunyuan", "a red chair");
    input
        .generation_params
        .insert("faceCount".into(), json!(200000));

    let job_id = adapter.submit_task(&mut input).await.unwrap();
    assert_eq!(job_id, "job-1");

    let requests = captured.requests.lock().unwrap();
    let (headers, body) = &requests[0];
    assert_eq!(headers["x-tc-version"], "2025-05-13");
    assert_eq!(headers["x-tc-region"], "ap-guangzhou");
    assert!(headers["authorization"]
        .to_str()
        .unwrap()
        .starts_with("TC3-HMAC-SHA256 Credential=AKIDEXAMPLE/"));
    assert_eq!(body["Prompt"], "a red chair");
    assert_eq!(body["FaceCount"], 200000);
    assert_eq!(body["Model"], "3.1");

    assert_eq!(input.generation_params["faceCount"], json!(200000));
    assert_eq!(input.generation_params["resultFormat"], json!("GLB"));
}

#[tokio::test]
async fn submit_passes_inline_image_without_recording_it() {
    let captured = Captured::default();
    let api_url = hunyuan_server(captured.clone()).await;
    let dir = tempfile::tempdir().unwrap();
    let adapter = adapter(&api_url, dir.path());

    let mut input = NewTask::image("hunyuan", ImageInput::Base64("QUJD".into()));
    adapter.submit_task(&mut input).await.unwrap();

    let requests = captured.requests.lock().unwrap();
    assert_eq!(requests[0].1["ImageBase64"], "QUJD");
    assert!(requests[0].1.get("ImageUrl").is_none());
    assert!(!input.generation_params.contains_key("imageBase64"));
}

#[tokio::test]
async fn error_envelope_becomes_remote_error() {
    let api_url = hunyuan_server(Captured::default()).await;
    let dir = tempfile::tempdir().unwrap();
    let adapter = adapter(&api_url, dir.path());

    let mut input = NewTask::text("hunyuan", "boom");
    let err = adapter.submit_task(&mut input).await.unwrap_err();
    assert_matches!(err, ProviderError::Remote { ref code, .. } if code == "InvalidParameter");

    let err = adapter.query_task("missing").await.unwrap_err();
    assert_matches!(err, ProviderError::Remote { ref code, .. } if code == "ResourceNotFound");
}

#[tokio::test]
async fn query_picks_glb_and_preview() {
    let api_url = hunyuan_server(Captured::default()).await;
    let dir = tempfile::tempdir().unwrap();
    let adapter = adapter(&api_url, dir.path());

    let status = adapter.query_task("job-1").await.unwrap();
    assert_eq!(status.status, TaskStatus::Done);
    assert_eq!(status.progress, None);
    assert_eq!(status.model_url.as_deref(), Some("https://cdn/m.glb"));
    assert_eq!(status.thumbnail_url.as_deref(), Some("https://cdn/p.png"));
}

#[tokio::test]
async fn download_shards_by_month_and_soft_fails_thumbnail() {
    let api_url = hunyuan_server(Captured::default()).await;
    let dir = tempfile::tempdir().unwrap();
    let adapter = adapter(&api_url, &dir.path().join("static/hunyuan"));

    let now = chrono::Utc::now();
    let task = gen3d_db::models::task::Task {
        id: 1,
        provider: "hunyuan".into(),
        provider_task_id: "job-1".into(),
        status: TaskStatus::Run,
        progress: 0,
        input_type: gen3d_core::task::InputType::Text,
        prompt: Some("a red chair".into()),
        image_url: None,
        image_base64: None,
        generation_params: json!({}),
        model_url: Some(format!("{api_url}/files/m.glb")),
        pre_remeshed_url: None,
        thumbnail_url: Some(format!("{api_url}/files/nothing.png")),
        local_path: None,
        nas_path: None,
        thumbnail_path: None,
        pre_remeshed_path: None,
        pre_remeshed_nas_path: None,
        file_size: None,
        file_hash: None,
        error_code: None,
        error_message: None,
        name: "chair".into(),
        description: None,
        category: String::new(),
        tags: None,
        created_by: String::new(),
        created_ip: String::new(),
        created_at: now,
        updated_at: now,
        deleted_at: None,
    };

    let result = adapter.download_result(&task).await.unwrap();
    let hash = gen3d_core::hashing::sha256_hex(b"glb-bytes");
    assert_eq!(result.file_hash, hash);

    let local = result.local_path.expect("local path");
    let expected_suffix = format!(
        "{}/{}.glb",
        gen3d_core::naming::year_month_subpath(chrono::Utc::now()),
        &hash[..16]
    );
    assert!(local.ends_with(&expected_suffix), "{local}");
    assert!(result.thumbnail_path.is_none());
}

#[tokio::test]
async fn cancel_is_unsupported() {
    let api_url = hunyuan_server(Captured::default()).await;
    let dir = tempfile::tempdir().unwrap();
    let adapter = adapter(&api_url, dir.path());

    assert_matches!(
        adapter.cancel_task("job-1").await,
        Err(ProviderError::Unsupported { .. })
    );
}
