use std::sync::Arc;

use axum::Router;
use axum::body::{Body, Bytes};
use axum::http::{Request, Response};
use http_body_util::BodyExt;
use quay_artifact::MemoryStore;
use quay_codec::{Codec, JsonCodec};
use quay_dispatch::{DispatchConfig, Dispatcher};
use quay_registry::SqliteRegistry;
use quay_server::{AppState, ServerConfig, build_app_router};
use quay_workflow::{DispatchPayload, TaskDef, TaskRef, WorkflowDef};
use tower::ServiceExt;

pub const BOUNDARY: &str = "quay-test-boundary";

/// Router over an in-memory store and registry, with the production
/// middleware stack.
pub async fn build_test_app() -> Router {
  build_test_app_with(ServerConfig::default()).await
}

pub async fn build_test_app_with(config: ServerConfig) -> Router {
  let registry = SqliteRegistry::in_memory().await.unwrap();
  registry.migrate().await.unwrap();

  let dispatcher = Dispatcher::new(
    Arc::new(JsonCodec::new()),
    Arc::new(MemoryStore::new()),
    Arc::new(registry),
    DispatchConfig::default(),
  );

  build_app_router(AppState {
    dispatcher,
    config: Arc::new(config),
  })
}

pub fn encoded_workflow(name: &str) -> Vec<u8> {
  let payload = DispatchPayload::new(WorkflowDef {
    name: name.to_string(),
    tasks: vec![TaskDef {
      task_id: "only".to_string(),
      task: TaskRef {
        name: "echo".to_string(),
        version: None,
      },
      arguments: Default::default(),
      executor: None,
      timeout_ms: None,
    }],
    edges: vec![],
    timeout_ms: None,
    max_retry_attempts: None,
  });
  JsonCodec::new().encode(&payload).unwrap()
}

pub async fn get(app: Router, uri: &str) -> Response<Body> {
  app
    .oneshot(Request::get(uri).body(Body::empty()).unwrap())
    .await
    .unwrap()
}

pub async fn post(app: Router, uri: &str, body: impl Into<Body>) -> Response<Body> {
  app
    .oneshot(Request::post(uri).body(body.into()).unwrap())
    .await
    .unwrap()
}

pub async fn post_json(app: Router, uri: &str, json: serde_json::Value) -> Response<Body> {
  app
    .oneshot(
      Request::post(uri)
        .header("content-type", "application/json")
        .body(Body::from(json.to_string()))
        .unwrap(),
    )
    .await
    .unwrap()
}

/// POST a multipart form with a single file part.
pub async fn post_file(app: Router, uri: &str, contents: &[u8]) -> Response<Body> {
  let mut body = Vec::new();
  body.extend_from_slice(
    format!(
      "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"file\"; filename=\"input.bin\"\r\nContent-Type: application/octet-stream\r\n\r\n"
    )
    .as_bytes(),
  );
  body.extend_from_slice(contents);
  body.extend_from_slice(format!("\r\n--{BOUNDARY}--\r\n").as_bytes());

  app
    .oneshot(
      Request::post(uri)
        .header(
          "content-type",
          format!("multipart/form-data; boundary={BOUNDARY}"),
        )
        .body(Body::from(body))
        .unwrap(),
    )
    .await
    .unwrap()
}

pub async fn body_bytes(response: Response<Body>) -> Bytes {
  response.into_body().collect().await.unwrap().to_bytes()
}

pub async fn body_json(response: Response<Body>) -> serde_json::Value {
  serde_json::from_slice(&body_bytes(response).await).unwrap()
}
