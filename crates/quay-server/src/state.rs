use std::sync::Arc;

use quay_dispatch::Dispatcher;

use crate::config::ServerConfig;

/// Shared application state available to all handlers via `State<AppState>`.
#[derive(Clone)]
pub struct AppState {
  pub dispatcher: Dispatcher,
  pub config: Arc<ServerConfig>,
}
