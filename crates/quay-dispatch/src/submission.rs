//! Submission service: serialized payload in, dispatch ID out.

use std::sync::Arc;

use bytes::Bytes;
use quay_artifact::stream_from;
use quay_codec::Codec;
use quay_registry::{DispatchId, Registry};
use quay_workflow::DispatchPayload;
use tracing::{Span, error, info, instrument, warn};

use crate::artifacts::Artifacts;
use crate::error::DispatchError;
use crate::retry::RetryPolicy;
use crate::role::Role;

/// Accepts serialized workflows and turns them into pending dispatches.
///
/// The payload artifact is always written before the registry entry, so a
/// registered dispatch never points at a missing payload. When
/// registration fails the payload is deleted again; if that cleanup fails
/// too, the artifact stays behind unreferenced and unreachable.
pub struct SubmissionService {
  codec: Arc<dyn Codec>,
  artifacts: Artifacts,
  registry: Arc<dyn Registry>,
  retry: RetryPolicy,
  max_payload_bytes: Option<usize>,
}

impl SubmissionService {
  pub fn new(codec: Arc<dyn Codec>, artifacts: Artifacts, registry: Arc<dyn Registry>) -> Self {
    Self {
      codec,
      artifacts,
      registry,
      retry: RetryPolicy::default(),
      max_payload_bytes: None,
    }
  }

  pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
    self.retry = retry;
    self
  }

  /// Reject payloads larger than `limit` bytes.
  pub fn with_max_payload_bytes(mut self, limit: usize) -> Self {
    self.max_payload_bytes = Some(limit);
    self
  }

  /// Submit a serialized workflow payload.
  ///
  /// The bytes are validated by the codec and stored as-is.
  #[instrument(
    name = "dispatch_submit",
    skip(self, bytes),
    fields(size = bytes.len(), dispatch_id = tracing::field::Empty)
  )]
  pub async fn submit(&self, bytes: Bytes) -> Result<DispatchId, DispatchError> {
    if let Some(limit) = self.max_payload_bytes
      && bytes.len() > limit
    {
      warn!(limit, "payload rejected: too large");
      return Err(DispatchError::PayloadTooLarge {
        size: bytes.len(),
        limit,
      });
    }

    let payload = self.codec.decode(&bytes).map_err(|e| {
      warn!(error = %e, "payload rejected");
      DispatchError::from(e)
    })?;

    let dispatch_id = DispatchId::generate();
    Span::current().record("dispatch_id", tracing::field::display(&dispatch_id));

    self.store_payload(&dispatch_id, bytes).await?;

    let payload_ref = Artifacts::key(&dispatch_id, Role::Payload);
    if let Err(e) = self.registry.register(&dispatch_id, &payload_ref).await {
      let err = DispatchError::from(e);
      error!(error = %err, "registration failed, removing payload");
      if let Err(cleanup) = self.artifacts.delete(&dispatch_id, Role::Payload).await {
        error!(error = %cleanup, payload_ref = %payload_ref, "failed to remove orphaned payload");
      }
      return Err(err);
    }

    info!(
      workflow = %payload.workflow.name,
      tasks = payload.workflow.tasks.len(),
      "dispatch submitted"
    );

    Ok(dispatch_id)
  }

  /// Encode a payload with the service's codec and submit it.
  pub async fn submit_payload(&self, payload: &DispatchPayload) -> Result<DispatchId, DispatchError> {
    let bytes = self.codec.encode(payload)?;
    self.submit(Bytes::from(bytes)).await
  }

  async fn store_payload(&self, dispatch_id: &DispatchId, bytes: Bytes) -> Result<(), DispatchError> {
    let artifacts = &self.artifacts;
    self
      .retry
      .run("store_payload", move || {
        artifacts.put(dispatch_id, Role::Payload, stream_from(bytes.clone()))
      })
      .await
      .map_err(|e| {
        let err = DispatchError::artifact(e);
        error!(error = %err, "failed to store payload");
        err
      })
  }
}
