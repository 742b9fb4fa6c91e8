use std::sync::Arc;

use quay_artifact::{ByteStream, Error, Store};
use quay_registry::DispatchId;

use crate::role::Role;

/// Artifact access keyed by (dispatch ID, role).
///
/// Translates the pair into a store key of the form `{dispatch_id}/{role}`
/// and enforces write-once semantics for write-once roles.
#[derive(Clone)]
pub struct Artifacts {
  store: Arc<dyn Store>,
}

impl Artifacts {
  pub fn new(store: Arc<dyn Store>) -> Self {
    Self { store }
  }

  /// Storage key of an artifact.
  pub fn key(dispatch_id: &DispatchId, role: Role) -> String {
    format!("{dispatch_id}/{role}")
  }

  pub async fn put(&self, dispatch_id: &DispatchId, role: Role, data: ByteStream) -> Result<(), Error> {
    let key = Self::key(dispatch_id, role);
    if role.is_write_once() {
      self.store.put_new(&key, data).await
    } else {
      self.store.put(&key, data).await
    }
  }

  /// Store an artifact only if none exists yet, whatever the role.
  pub async fn put_new(
    &self,
    dispatch_id: &DispatchId,
    role: Role,
    data: ByteStream,
  ) -> Result<(), Error> {
    self.store.put_new(&Self::key(dispatch_id, role), data).await
  }

  pub async fn get(&self, dispatch_id: &DispatchId, role: Role) -> Result<ByteStream, Error> {
    self.store.get(&Self::key(dispatch_id, role)).await
  }

  pub async fn exists(&self, dispatch_id: &DispatchId, role: Role) -> Result<bool, Error> {
    self.store.exists(&Self::key(dispatch_id, role)).await
  }

  pub async fn delete(&self, dispatch_id: &DispatchId, role: Role) -> Result<(), Error> {
    self.store.delete(&Self::key(dispatch_id, role)).await
  }
}
