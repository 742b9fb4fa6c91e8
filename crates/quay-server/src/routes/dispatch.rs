use axum::Router;
use axum::routing::{get, post};

use crate::handlers::dispatch;
use crate::state::AppState;

pub fn router() -> Router<AppState> {
  Router::new()
    .route(
      "/",
      get(dispatch::list_dispatches).post(dispatch::submit),
    )
    .route("/{dispatch_id}", get(dispatch::get_dispatch))
    .route("/{dispatch_id}/upload", post(dispatch::upload))
    .route("/{dispatch_id}/download", get(dispatch::download))
    .route("/{dispatch_id}/complete", post(dispatch::complete))
    .route("/{dispatch_id}/fail", post(dispatch::fail))
}
