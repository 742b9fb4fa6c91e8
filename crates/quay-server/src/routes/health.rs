use axum::extract::State;
use axum::{Json, Router, routing::get};
use quay_registry::ListFilter;
use serde::Serialize;

use crate::state::AppState;

#[derive(Serialize)]
pub struct HealthResponse {
  pub status: &'static str,
  pub version: &'static str,
  pub registry_healthy: bool,
}

/// GET /health: service and registry health.
async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
  let probe = ListFilter {
    limit: Some(1),
    ..ListFilter::default()
  };
  let registry_healthy = state.dispatcher.list(&probe).await.is_ok();

  Json(HealthResponse {
    status: if registry_healthy { "ok" } else { "degraded" },
    version: env!("CARGO_PKG_VERSION"),
    registry_healthy,
  })
}

/// Mount health routes at the root, outside `/api/v0`.
pub fn router() -> Router<AppState> {
  Router::new().route("/health", get(health_check))
}
