pub mod dispatch;
pub mod health;

use axum::Router;

use crate::state::AppState;

/// Build the `/api/v0` route tree.
///
/// ```text
/// /dispatch                          list (GET), submit (POST)
/// /dispatch/{id}                     record (GET)
/// /dispatch/{id}/upload              multipart upload (POST), ?slot=N
/// /dispatch/{id}/download            streamed artifact (GET), ?role=&results_dir=
/// /dispatch/{id}/complete            store result, mark completed (POST)
/// /dispatch/{id}/fail                mark failed (POST)
/// ```
pub fn api_routes() -> Router<AppState> {
  Router::new().nest("/dispatch", dispatch::router())
}
