use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use quay_dispatch::{DispatchError, ErrorKind};
use serde_json::json;

/// Application-level error type for HTTP handlers.
///
/// Renders as `{"error": message, "code": CODE}` with a matching status.
#[derive(Debug, thiserror::Error)]
pub enum AppError {
  #[error(transparent)]
  Dispatch(#[from] DispatchError),

  #[error("bad request: {0}")]
  BadRequest(String),

  #[error("internal error: {0}")]
  InternalError(String),
}

pub type AppResult<T> = Result<T, AppError>;

impl IntoResponse for AppError {
  fn into_response(self) -> Response {
    let (status, code, message) = match &self {
      AppError::Dispatch(err) => match err.kind() {
        ErrorKind::Serialization => {
          (StatusCode::BAD_REQUEST, "SERIALIZATION_ERROR", err.to_string())
        }
        ErrorKind::NotFound => (StatusCode::NOT_FOUND, "NOT_FOUND", err.to_string()),
        ErrorKind::Conflict => (StatusCode::CONFLICT, "CONFLICT", err.to_string()),
        ErrorKind::ArtifactNotReady => (StatusCode::CONFLICT, "NOT_READY", err.to_string()),
        ErrorKind::InvalidState => (StatusCode::CONFLICT, "INVALID_STATE", err.to_string()),
        ErrorKind::Storage => {
          tracing::error!(error = %err, "storage failure");
          (
            StatusCode::INTERNAL_SERVER_ERROR,
            "STORAGE_ERROR",
            "a storage error occurred".to_string(),
          )
        }
      },
      AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, "BAD_REQUEST", msg.clone()),
      AppError::InternalError(msg) => {
        tracing::error!(error = %msg, "internal error");
        (
          StatusCode::INTERNAL_SERVER_ERROR,
          "INTERNAL_ERROR",
          "an internal error occurred".to_string(),
        )
      }
    };

    let body = json!({
      "error": message,
      "code": code,
    });

    (status, axum::Json(body)).into_response()
  }
}
