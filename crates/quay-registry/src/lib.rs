//! Quay Registry
//!
//! This crate provides the registry trait and implementations for dispatch
//! records. The registry is the single source of truth for whether a
//! dispatch ID is known. Data is persisted to SQLite.
//!
//! The [`Registry`] trait defines operations for:
//! - Registering new dispatches (IDs are unique, duplicates conflict)
//! - Looking up and listing dispatch records
//! - Moving a dispatch out of `pending` once the engine reports an outcome

mod sqlite;
mod types;

pub use sqlite::SqliteRegistry;
pub use types::{DispatchId, DispatchRecord, DispatchStatus, InvalidDispatchId, ListFilter};

use async_trait::async_trait;

/// Error type for registry operations.
#[derive(Debug, thiserror::Error)]
pub enum Error {
  /// The requested dispatch was not found.
  #[error("dispatch not found: {0}")]
  NotFound(DispatchId),

  /// A dispatch with this ID is already registered.
  #[error("dispatch already registered: {0}")]
  Conflict(DispatchId),

  /// The requested status change is not allowed.
  #[error("invalid status transition for {dispatch_id}: {from} -> {to}")]
  InvalidTransition {
    dispatch_id: DispatchId,
    from: DispatchStatus,
    to: DispatchStatus,
  },

  /// A database error occurred.
  #[error("database error: {0}")]
  Database(#[from] sqlx::Error),
}

/// Storage trait for dispatch records.
#[async_trait]
pub trait Registry: Send + Sync {
  /// Register a new dispatch in the `pending` state.
  ///
  /// Fails with [`Error::Conflict`] if the ID is already present; an
  /// existing record is never overwritten.
  async fn register(
    &self,
    dispatch_id: &DispatchId,
    payload_ref: &str,
  ) -> Result<DispatchRecord, Error>;

  /// Get a dispatch by ID.
  async fn get(&self, dispatch_id: &DispatchId) -> Result<DispatchRecord, Error>;

  /// Move a dispatch to a new status.
  ///
  /// Only `pending -> completed` and `pending -> failed` are allowed. The
  /// optional error message is recorded alongside the new status.
  async fn update_status(
    &self,
    dispatch_id: &DispatchId,
    status: DispatchStatus,
    error: Option<&str>,
  ) -> Result<DispatchRecord, Error>;

  /// List dispatches matching the filter, newest first.
  async fn list(&self, filter: &ListFilter) -> Result<Vec<DispatchRecord>, Error>;
}
