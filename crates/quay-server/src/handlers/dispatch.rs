//! Handlers for dispatch submission, artifact transfer and status queries.

use axum::Json;
use axum::RequestExt;
use axum::body::{Body, Bytes};
use axum::extract::{Multipart, Path, Query, Request, State};
use axum::http::header::{CONTENT_DISPOSITION, CONTENT_TYPE};
use axum::http::{HeaderMap, HeaderName, HeaderValue, StatusCode};
use axum::response::IntoResponse;
use futures::channel::mpsc;
use futures::{SinkExt, Stream, StreamExt};
use quay_artifact::ByteStream;
use quay_dispatch::Role;
use quay_registry::{DispatchRecord, DispatchStatus, ListFilter};
use serde::{Deserialize, Serialize};

use crate::error::{AppError, AppResult};
use crate::state::AppState;

/// Response header echoing the client's `results_dir` hint.
pub const RESULTS_DIR_HEADER: HeaderName = HeaderName::from_static("x-quay-results-dir");

const DEFAULT_LIST_LIMIT: u32 = 100;
const MAX_LIST_LIMIT: u32 = 1000;

#[derive(Debug, Serialize, Deserialize)]
pub struct SubmitResponse {
  pub dispatch_id: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct UploadResponse {
  pub success: bool,
}

#[derive(Debug, Deserialize)]
pub struct UploadQuery {
  pub slot: Option<u32>,
}

#[derive(Debug, Deserialize)]
pub struct DownloadQuery {
  pub role: Option<String>,
  pub results_dir: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ListQuery {
  pub status: Option<String>,
  pub limit: Option<u32>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct FailRequest {
  pub error: String,
}

/// Forward a request body into a stream the artifact store can consume.
///
/// The returned future drives `source` and must be polled alongside the
/// consumer. It resolves to the client's error message when reading the
/// request failed; the consumer then sees an error instead of a short body.
fn forward<S, E>(source: S) -> (ByteStream, impl Future<Output = Option<String>>)
where
  S: Stream<Item = Result<Bytes, E>>,
  E: std::error::Error + Send + Sync + 'static,
{
  let (mut tx, rx) = mpsc::channel::<Result<Bytes, quay_artifact::Error>>(8);
  let feed = async move {
    futures::pin_mut!(source);
    while let Some(chunk) = source.next().await {
      match chunk {
        Ok(chunk) => {
          if tx.send(Ok(chunk)).await.is_err() {
            return None;
          }
        }
        Err(e) => {
          let message = e.to_string();
          let _ = tx
            .send(Err(quay_artifact::Error::Io(std::io::Error::other(e))))
            .await;
          return Some(message);
        }
      }
    }
    None
  };
  (Box::pin(rx), feed)
}

// ---------------------------------------------------------------------------
// POST /dispatch
// ---------------------------------------------------------------------------

/// Submit a serialized workflow payload.
pub async fn submit(
  State(state): State<AppState>,
  body: Bytes,
) -> AppResult<(StatusCode, Json<SubmitResponse>)> {
  let dispatch_id = state.dispatcher.submission().submit(body).await?;
  Ok((
    StatusCode::ACCEPTED,
    Json(SubmitResponse {
      dispatch_id: dispatch_id.to_string(),
    }),
  ))
}

// ---------------------------------------------------------------------------
// POST /dispatch/{dispatch_id}/upload
// ---------------------------------------------------------------------------

/// Stream the first file part of a multipart form into an upload artifact.
pub async fn upload(
  State(state): State<AppState>,
  Path(dispatch_id): Path<String>,
  Query(query): Query<UploadQuery>,
  mut multipart: Multipart,
) -> AppResult<Json<UploadResponse>> {
  // Fail fast on unknown dispatches before reading the body.
  state.dispatcher.status(&dispatch_id).await?;

  while let Some(field) = multipart
    .next_field()
    .await
    .map_err(|e| AppError::BadRequest(e.to_string()))?
  {
    if field.file_name().is_none() {
      continue;
    }

    let (stream, feed) = forward(field);

    let store = state
      .dispatcher
      .transfer()
      .upload_stream(&dispatch_id, query.slot, stream);

    let (client_error, stored) = futures::join!(feed, store);
    if let Some(message) = client_error {
      return Err(AppError::BadRequest(message));
    }
    return Ok(Json(UploadResponse { success: stored? }));
  }

  Err(AppError::BadRequest("missing file part".to_string()))
}

// ---------------------------------------------------------------------------
// GET /dispatch/{dispatch_id}/download
// ---------------------------------------------------------------------------

/// Stream an artifact of a dispatch, the result by default.
pub async fn download(
  State(state): State<AppState>,
  Path(dispatch_id): Path<String>,
  Query(query): Query<DownloadQuery>,
) -> AppResult<impl IntoResponse> {
  let role = match query.role.as_deref() {
    Some(role) => role.parse::<Role>().map_err(AppError::BadRequest)?,
    None => Role::Result,
  };

  let stream = state
    .dispatcher
    .transfer()
    .download_role(&dispatch_id, role)
    .await?;

  let mut headers = HeaderMap::new();
  headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/octet-stream"));
  let disposition = format!("attachment; filename=\"{dispatch_id}-{role}\"");
  headers.insert(
    CONTENT_DISPOSITION,
    HeaderValue::from_str(&disposition)
      .map_err(|_| AppError::BadRequest("invalid dispatch id".to_string()))?,
  );
  if let Some(results_dir) = &query.results_dir {
    let value = HeaderValue::from_str(results_dir)
      .map_err(|_| AppError::BadRequest("results_dir is not a valid header value".to_string()))?;
    headers.insert(RESULTS_DIR_HEADER, value);
  }


  Ok((headers, Body::from_stream(stream)))
}

// ---------------------------------------------------------------------------
// GET /dispatch/{dispatch_id}
// ---------------------------------------------------------------------------

pub async fn get_dispatch(
  State(state): State<AppState>,
  Path(dispatch_id): Path<String>,
) -> AppResult<Json<DispatchRecord>> {
  Ok(Json(state.dispatcher.status(&dispatch_id).await?))
}

// ---------------------------------------------------------------------------
// GET /dispatch
// ---------------------------------------------------------------------------

/// List dispatches, newest first.
pub async fn list_dispatches(
  State(state): State<AppState>,
  Query(query): Query<ListQuery>,
) -> AppResult<Json<Vec<DispatchRecord>>> {
  let status = query
    .status
    .as_deref()
    .map(str::parse::<DispatchStatus>)
    .transpose()
    .map_err(AppError::BadRequest)?;

  let filter = ListFilter {
    status,
    limit: Some(query.limit.unwrap_or(DEFAULT_LIST_LIMIT).clamp(1, MAX_LIST_LIMIT)),
    ..ListFilter::default()
  };

  Ok(Json(state.dispatcher.list(&filter).await?))
}

// ---------------------------------------------------------------------------
// POST /dispatch/{dispatch_id}/complete
// ---------------------------------------------------------------------------

/// Store the request body as the result and mark the dispatch completed.
pub async fn complete(
  State(state): State<AppState>,
  Path(dispatch_id): Path<String>,
  request: Request,
) -> AppResult<Json<DispatchRecord>> {
  let (stream, feed) = forward(request.into_limited_body().into_data_stream());

  let store = state.dispatcher.transfer().complete(&dispatch_id, stream);

  let (client_error, record) = futures::join!(feed, store);
  if let Some(message) = client_error {
    return Err(AppError::BadRequest(message));
  }
  Ok(Json(record?))
}

// ---------------------------------------------------------------------------
// POST /dispatch/{dispatch_id}/fail
// ---------------------------------------------------------------------------

pub async fn fail(
  State(state): State<AppState>,
  Path(dispatch_id): Path<String>,
  Json(input): Json<FailRequest>,
) -> AppResult<Json<DispatchRecord>> {
  let record = state
    .dispatcher
    .transfer()
    .fail(&dispatch_id, &input.error)
    .await?;
  Ok(Json(record))
}
