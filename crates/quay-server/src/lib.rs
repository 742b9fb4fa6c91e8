//! HTTP surface for quay.
//!
//! All dispatch routes live under `/api/v0`; `/health` sits at the root.

pub mod config;
pub mod error;
pub mod handlers;
pub mod router;
pub mod routes;
pub mod state;

pub use config::ServerConfig;
pub use router::build_app_router;
pub use state::AppState;
