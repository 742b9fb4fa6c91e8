//! Transfer service: uploads and downloads of dispatch artifacts, plus the
//! hooks an executor uses to report outcomes.

use std::sync::Arc;

use bytes::Bytes;
use quay_artifact::{ByteStream, stream_from};
use quay_registry::{DispatchId, DispatchRecord, DispatchStatus, Registry};
use tracing::{error, info, instrument, warn};

use crate::artifacts::Artifacts;
use crate::error::DispatchError;
use crate::retry::RetryPolicy;
use crate::role::Role;

pub struct TransferService {
  artifacts: Artifacts,
  registry: Arc<dyn Registry>,
  retry: RetryPolicy,
}

impl TransferService {
  pub fn new(artifacts: Artifacts, registry: Arc<dyn Registry>) -> Self {
    Self {
      artifacts,
      registry,
      retry: RetryPolicy::default(),
    }
  }

  pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
    self.retry = retry;
    self
  }

  /// Resolve a dispatch ID string to its registry record.
  ///
  /// Strings that are not valid dispatch IDs are reported as not found.
  pub async fn lookup(&self, dispatch_id: &str) -> Result<DispatchRecord, DispatchError> {
    let id: DispatchId = dispatch_id
      .parse()
      .map_err(|_| DispatchError::NotFound(dispatch_id.to_string()))?;
    Ok(self.registry.get(&id).await?)
  }

  /// Upload input data for a dispatch.
  ///
  /// Returns `Ok(false)` when storage keeps failing after all retries, and
  /// an error when the dispatch does not exist.
  pub async fn upload(&self, dispatch_id: &str, data: Bytes) -> Result<bool, DispatchError> {
    self.upload_role(dispatch_id, Role::Upload(None), data).await
  }

  /// Upload input data into a numbered slot.
  pub async fn upload_slot(
    &self,
    dispatch_id: &str,
    slot: u32,
    data: Bytes,
  ) -> Result<bool, DispatchError> {
    self.upload_role(dispatch_id, Role::Upload(Some(slot)), data).await
  }

  #[instrument(name = "dispatch_upload", skip(self, data), fields(size = data.len()))]
  async fn upload_role(
    &self,
    dispatch_id: &str,
    role: Role,
    data: Bytes,
  ) -> Result<bool, DispatchError> {
    let record = self.lookup(dispatch_id).await?;
    let id = &record.dispatch_id;
    let artifacts = &self.artifacts;

    let stored = self
      .retry
      .run("upload", move || artifacts.put(id, role, stream_from(data.clone())))
      .await;

    match stored {
      Ok(()) => {
        info!("upload stored");
        Ok(true)
      }
      // Already logged by the retry loop.
      Err(quay_artifact::Error::Io(_)) => Ok(false),
      Err(e) => Err(DispatchError::artifact(e)),
    }
  }

  /// Upload input data from a stream.
  ///
  /// A stream can only be consumed once, so the write is attempted a
  /// single time.
  #[instrument(name = "dispatch_upload_stream", skip(self, data))]
  pub async fn upload_stream(
    &self,
    dispatch_id: &str,
    slot: Option<u32>,
    data: ByteStream,
  ) -> Result<bool, DispatchError> {
    let record = self.lookup(dispatch_id).await?;

    match self
      .artifacts
      .put(&record.dispatch_id, Role::Upload(slot), data)
      .await
    {
      Ok(()) => {
        info!("upload stored");
        Ok(true)
      }
      Err(quay_artifact::Error::Io(e)) => {
        error!(error = %e, "upload failed");
        Ok(false)
      }
      Err(e) => Err(DispatchError::artifact(e)),
    }
  }

  /// Download the result of a dispatch.
  pub async fn download(&self, dispatch_id: &str) -> Result<ByteStream, DispatchError> {
    self.download_role(dispatch_id, Role::Result).await
  }

  /// Download any artifact of a dispatch.
  ///
  /// A known dispatch whose artifact has not been written yet yields
  /// [`DispatchError::ArtifactNotReady`] carrying the current status.
  #[instrument(name = "dispatch_download", skip(self))]
  pub async fn download_role(
    &self,
    dispatch_id: &str,
    role: Role,
  ) -> Result<ByteStream, DispatchError> {
    let record = self.lookup(dispatch_id).await?;
    let id = &record.dispatch_id;
    let artifacts = &self.artifacts;

    let not_ready = || DispatchError::ArtifactNotReady {
      dispatch_id: record.dispatch_id.clone(),
      role,
      status: record.status,
    };

    let exists = self
      .retry
      .run("exists", move || artifacts.exists(id, role))
      .await
      .map_err(DispatchError::artifact)?;
    if !exists {
      return Err(not_ready());
    }

    match self.retry.run("download", move || artifacts.get(id, role)).await {
      Ok(stream) => Ok(stream),
      // Deleted between the existence check and the read.
      Err(quay_artifact::Error::NotFound(_)) => Err(not_ready()),
      Err(e) => {
        error!(error = %e, "download failed");
        Err(DispatchError::artifact(e))
      }
    }
  }

  /// Fetch the stored payload of a dispatch for execution.
  pub async fn payload(&self, dispatch_id: &str) -> Result<ByteStream, DispatchError> {
    self.download_role(dispatch_id, Role::Payload).await
  }

  /// Store the result of a dispatch and mark it completed.
  ///
  /// The dispatch must still be pending; the result is written before the
  /// status changes so a completed dispatch always has a result. The result
  /// is write-once: a concurrent completion gets a conflict instead of
  /// overwriting it. If the status change is lost to a concurrent
  /// transition, the result written here is deleted again.
  #[instrument(name = "dispatch_complete", skip(self, result))]
  pub async fn complete(
    &self,
    dispatch_id: &str,
    result: ByteStream,
  ) -> Result<DispatchRecord, DispatchError> {
    let record = self.lookup(dispatch_id).await?;
    let id = &record.dispatch_id;
    ensure_transition(&record, DispatchStatus::Completed)?;

    self
      .artifacts
      .put_new(id, Role::Result, result)
      .await
      .map_err(|e| {
        let err = DispatchError::artifact(e);
        error!(error = %err, "failed to store result");
        err
      })?;

    let updated = match self
      .registry
      .update_status(id, DispatchStatus::Completed, None)
      .await
    {
      Ok(updated) => updated,
      Err(e) => {
        let err = DispatchError::from(e);
        error!(error = %err, "failed to mark dispatch completed, removing result");
        if let Err(cleanup) = self.artifacts.delete(id, Role::Result).await {
          error!(error = %cleanup, "failed to remove orphaned result");
        }
        return Err(err);
      }
    };

    info!("dispatch completed");
    Ok(updated)
  }

  /// Mark a pending dispatch as failed.
  #[instrument(name = "dispatch_fail", skip(self))]
  pub async fn fail(&self, dispatch_id: &str, message: &str) -> Result<DispatchRecord, DispatchError> {
    let record = self.lookup(dispatch_id).await?;
    ensure_transition(&record, DispatchStatus::Failed)?;

    let updated = self
      .registry
      .update_status(&record.dispatch_id, DispatchStatus::Failed, Some(message))
      .await
      .map_err(|e| {
        let err = DispatchError::from(e);
        error!(error = %err, "failed to mark dispatch failed");
        err
      })?;

    warn!("dispatch failed");
    Ok(updated)
  }
}

fn ensure_transition(record: &DispatchRecord, to: DispatchStatus) -> Result<(), DispatchError> {
  if record.status.can_transition_to(to) {
    return Ok(());
  }
  let err = DispatchError::InvalidState {
    dispatch_id: record.dispatch_id.clone(),
    from: record.status,
    to,
  };
  error!(error = %err, "rejected status change");
  Err(err)
}
