//! Quay Codec
//!
//! Converts a [`DispatchPayload`] to and from the bytes that clients submit
//! and that the artifact store keeps as the dispatch's `payload` artifact.
//!
//! The [`Codec`] trait is the capability the submission path depends on.
//! [`JsonCodec`] is the shipped implementation: a versioned JSON envelope
//! around the structured workflow.
//!
//! ```json
//! {
//!   "format": "quay.dispatch",
//!   "version": 1,
//!   "payload": { "workflow": { ... }, "inputs": { ... }, "metadata": { ... } }
//! }
//! ```

mod json;

pub use json::{FORMAT, JsonCodec, VERSION};

use quay_workflow::{DispatchPayload, WorkflowError};

/// Error type for encoding and decoding payloads.
#[derive(Debug, thiserror::Error)]
pub enum Error {
  /// The bytes are not a well-formed envelope.
  #[error("malformed payload: {0}")]
  Malformed(#[source] serde_json::Error),

  /// The bytes end before the envelope is complete.
  #[error("truncated payload: {0}")]
  Truncated(#[source] serde_json::Error),

  /// The envelope is well-formed but the payload does not match the schema.
  #[error("payload does not match schema: {0}")]
  Schema(#[source] serde_json::Error),

  /// The envelope names a format this codec does not speak.
  #[error("unknown payload format '{0}'")]
  UnknownFormat(String),

  /// The envelope version is not supported.
  #[error("unsupported payload version {found} (supported: {supported})")]
  UnsupportedVersion { found: u32, supported: u32 },

  /// The payload contains a value that cannot be represented.
  #[error("payload cannot be encoded: {0}")]
  Unencodable(#[source] serde_json::Error),

  /// The workflow structure is invalid.
  #[error("invalid workflow: {0}")]
  Invalid(#[from] WorkflowError),
}

/// Payload serialization capability.
///
/// `decode(encode(p))` must yield a payload equal to `p` for every valid
/// payload. Both directions are pure.
pub trait Codec: Send + Sync {
  /// Encode a payload into its durable byte form.
  fn encode(&self, payload: &DispatchPayload) -> Result<Vec<u8>, Error>;

  /// Decode and validate a payload.
  fn decode(&self, bytes: &[u8]) -> Result<DispatchPayload, Error>;
}
