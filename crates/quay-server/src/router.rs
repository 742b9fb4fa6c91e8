//! Application router with the shared middleware stack.

use std::time::Duration;

use axum::Router;
use axum::extract::DefaultBodyLimit;
use axum::http::{HeaderName, StatusCode};
use tower_http::catch_panic::CatchPanicLayer;
use tower_http::request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer};
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::{DefaultMakeSpan, DefaultOnResponse, TraceLayer};
use tracing::Level;

use crate::routes;
use crate::state::AppState;

/// Build the full application [`Router`].
///
/// Layers, outermost first: request ID, tracing, request ID propagation,
/// timeout, panic recovery, body limit.
pub fn build_app_router(state: AppState) -> Router {
  let request_id_header = HeaderName::from_static("x-request-id");
  let config = state.config.clone();

  Router::new()
    .merge(routes::health::router())
    .nest("/api/v0", routes::api_routes())
    .layer(DefaultBodyLimit::max(config.max_body_bytes))
    .layer(CatchPanicLayer::new())
    .layer(TimeoutLayer::with_status_code(
      StatusCode::REQUEST_TIMEOUT,
      Duration::from_secs(config.request_timeout_secs),
    ))
    .layer(PropagateRequestIdLayer::new(request_id_header.clone()))
    .layer(
      TraceLayer::new_for_http()
        .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
        .on_response(DefaultOnResponse::new().level(Level::INFO)),
    )
    .layer(SetRequestIdLayer::new(request_id_header, MakeRequestUuid))
    .with_state(state)
}
