use axum::{
    Router,
    body::Body,
    http::{Request, StatusCode},
};
use llm_inference::{
    Result,
    pipeline::TextGenerationPipeline,
    server::{AppState, router},
};
use serde_json::Value;
use std::sync::Arc;
use tempfile::TempDir;
use tokio::fs;
use tower::ServiceExt; // for `oneshot`

/// Router wired to the given pipeline.
pub fn create_test_app(pipeline: impl TextGenerationPipeline + 'static) -> Router {
    router(AppState::new(Arc::new(pipeline)))
}

/// POSTs a raw body to `/generate` and returns the status and parsed JSON body.
pub async fn post_generate(app: Router, body: impl Into<Body>) -> (StatusCode, Value) {
    let request = Request::builder()
        .method("POST")
        .uri("/generate")
        .header("content-type", "application/json")
        .body(body.into())
        .unwrap();

    let response = app.oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    (status, serde_json::from_slice(&bytes).unwrap())
}

/// Create a temporary directory for test files
pub fn create_temp_dir() -> TempDir {
    tempfile::tempdir().expect("Failed to create temp directory")
}

/// Create a test config YAML file
pub async fn create_test_config_file(dir: &TempDir, content: &str) -> Result<String> {
    let config_path = dir.path().join("config.yaml");
    fs::write(&config_path, content).await?;
    Ok(config_path.to_string_lossy().to_string())
}

/// Sample configuration YAML for testing
pub const SAMPLE_CONFIG_YAML: &str = r#"
model:
  id: "google/gemma-2-2b-it"
  revision: "main"
  dtype: "f32"
  device: "cuda:1"
  use_flash_attn: true
  chat_template: "{{ messages[0].content }}"
  sampling:
    seed: 42
    temperature: 0.7
    top_p: 0.9
    repeat_penalty: 1.1
    repeat_last_n: 32

server:
  host: "0.0.0.0"
  port: 8000
  logs:
    level: "debug"
"#;
