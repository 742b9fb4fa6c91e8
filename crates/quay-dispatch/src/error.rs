//! Dispatch error taxonomy.

use quay_registry::{DispatchId, DispatchStatus};

use crate::role::Role;

/// Storage-layer failure below the services.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
  #[error("artifact storage failed: {0}")]
  Artifact(#[source] quay_artifact::Error),

  #[error("registry storage failed: {0}")]
  Registry(#[source] quay_registry::Error),
}

/// Errors surfaced by the submission and transfer services.
///
/// Every variant maps to one [`ErrorKind`], so callers can decide between
/// retrying and giving up without matching on messages.
#[derive(Debug, thiserror::Error)]
pub enum DispatchError {
  /// The submitted payload could not be decoded or validated.
  #[error("invalid payload: {0}")]
  Serialization(#[from] quay_codec::Error),

  /// The submitted payload exceeds the configured size limit.
  #[error("payload of {size} bytes exceeds the limit of {limit} bytes")]
  PayloadTooLarge { size: usize, limit: usize },

  /// An ID collision or a write-once violation.
  #[error("conflict: {0}")]
  Conflict(String),

  /// The dispatch ID is unknown.
  #[error("dispatch not found: {0}")]
  NotFound(String),

  /// The dispatch exists but the requested artifact has not been produced.
  #[error("artifact '{role}' of dispatch {dispatch_id} is not ready (status: {status})")]
  ArtifactNotReady {
    dispatch_id: DispatchId,
    role: Role,
    status: DispatchStatus,
  },

  /// An illegal status transition was requested.
  #[error("invalid state for {dispatch_id}: cannot move from {from} to {to}")]
  InvalidState {
    dispatch_id: DispatchId,
    from: DispatchStatus,
    to: DispatchStatus,
  },

  /// The storage medium failed.
  #[error(transparent)]
  Storage(#[from] StorageError),
}

/// Coarse classification of a [`DispatchError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
  Serialization,
  Conflict,
  NotFound,
  ArtifactNotReady,
  InvalidState,
  Storage,
}

impl DispatchError {
  pub fn kind(&self) -> ErrorKind {
    match self {
      DispatchError::Serialization(_) | DispatchError::PayloadTooLarge { .. } => {
        ErrorKind::Serialization
      }
      DispatchError::Conflict(_) => ErrorKind::Conflict,
      DispatchError::NotFound(_) => ErrorKind::NotFound,
      DispatchError::ArtifactNotReady { .. } => ErrorKind::ArtifactNotReady,
      DispatchError::InvalidState { .. } => ErrorKind::InvalidState,
      DispatchError::Storage(_) => ErrorKind::Storage,
    }
  }

  /// Whether the same request may succeed later.
  pub fn is_retryable(&self) -> bool {
    matches!(
      self.kind(),
      ErrorKind::ArtifactNotReady | ErrorKind::Storage
    )
  }

  pub(crate) fn artifact(err: quay_artifact::Error) -> Self {
    match err {
      quay_artifact::Error::AlreadyExists(key) => {
        DispatchError::Conflict(format!("artifact {key} already exists"))
      }
      other => DispatchError::Storage(StorageError::Artifact(other)),
    }
  }
}

impl From<quay_registry::Error> for DispatchError {
  fn from(err: quay_registry::Error) -> Self {
    match err {
      quay_registry::Error::NotFound(id) => DispatchError::NotFound(id.to_string()),
      quay_registry::Error::Conflict(id) => {
        DispatchError::Conflict(format!("dispatch {id} is already registered"))
      }
      quay_registry::Error::InvalidTransition {
        dispatch_id,
        from,
        to,
      } => DispatchError::InvalidState {
        dispatch_id,
        from,
        to,
      },
      other @ quay_registry::Error::Database(_) => {
        DispatchError::Storage(StorageError::Registry(other))
      }
    }
  }
}
