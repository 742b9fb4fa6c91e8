//! Dispatch services for quay.
//!
//! - [`SubmissionService`] turns serialized workflows into pending dispatches
//! - [`TransferService`] moves artifacts in and out of a dispatch and records
//!   executor outcomes
//!
//! Both are bundled by [`Dispatcher`], which is what the HTTP server and the
//! CLI hold on to.

mod artifacts;
mod error;
mod retry;
mod role;
mod submission;
mod transfer;

use std::sync::Arc;

use quay_artifact::Store;
use quay_codec::Codec;
use quay_registry::{DispatchRecord, ListFilter, Registry};

pub use artifacts::Artifacts;
pub use error::{DispatchError, ErrorKind, StorageError};
pub use retry::{RetryBackoff, RetryPolicy};
pub use role::Role;
pub use submission::SubmissionService;
pub use transfer::TransferService;

/// Tunables shared by the dispatch services.
#[derive(Debug, Clone, Default)]
pub struct DispatchConfig {
  pub max_payload_bytes: Option<usize>,
  pub retry: RetryPolicy,
}

/// Entry point bundling submission, transfer and registry queries.
#[derive(Clone)]
pub struct Dispatcher {
  submission: Arc<SubmissionService>,
  transfer: Arc<TransferService>,
  registry: Arc<dyn Registry>,
}

impl Dispatcher {
  pub fn new(
    codec: Arc<dyn Codec>,
    store: Arc<dyn Store>,
    registry: Arc<dyn Registry>,
    config: DispatchConfig,
  ) -> Self {
    let artifacts = Artifacts::new(store);

    let mut submission = SubmissionService::new(codec, artifacts.clone(), registry.clone())
      .with_retry(config.retry);
    if let Some(limit) = config.max_payload_bytes {
      submission = submission.with_max_payload_bytes(limit);
    }

    let transfer = TransferService::new(artifacts, registry.clone()).with_retry(config.retry);

    Self {
      submission: Arc::new(submission),
      transfer: Arc::new(transfer),
      registry,
    }
  }

  pub fn submission(&self) -> &SubmissionService {
    &self.submission
  }

  pub fn transfer(&self) -> &TransferService {
    &self.transfer
  }

  /// Current record of a dispatch.
  pub async fn status(&self, dispatch_id: &str) -> Result<DispatchRecord, DispatchError> {
    self.transfer.lookup(dispatch_id).await
  }

  pub async fn list(&self, filter: &ListFilter) -> Result<Vec<DispatchRecord>, DispatchError> {
    Ok(self.registry.list(filter).await?)
  }
}
