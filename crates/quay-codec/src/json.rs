use quay_workflow::DispatchPayload;
use serde::{Deserialize, Serialize};

use crate::{Codec, Error};

/// Envelope format tag.
pub const FORMAT: &str = "quay.dispatch";

/// Current envelope version.
pub const VERSION: u32 = 1;

#[derive(Serialize)]
struct EnvelopeRef<'a> {
  format: &'static str,
  version: u32,
  payload: &'a DispatchPayload,
}

#[derive(Deserialize)]
struct Envelope {
  format: String,
  version: u32,
  payload: serde_json::Value,
}

/// JSON envelope codec.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonCodec;

impl JsonCodec {
  pub fn new() -> Self {
    Self
  }
}

impl Codec for JsonCodec {
  fn encode(&self, payload: &DispatchPayload) -> Result<Vec<u8>, Error> {
    payload.validate()?;

    serde_json::to_vec(&EnvelopeRef {
      format: FORMAT,
      version: VERSION,
      payload,
    })
    .map_err(Error::Unencodable)
  }

  fn decode(&self, bytes: &[u8]) -> Result<DispatchPayload, Error> {
    let envelope: Envelope = serde_json::from_slice(bytes).map_err(|e| {
      if e.is_eof() {
        Error::Truncated(e)
      } else {
        Error::Malformed(e)
      }
    })?;

    if envelope.format != FORMAT {
      return Err(Error::UnknownFormat(envelope.format));
    }
    if envelope.version != VERSION {
      return Err(Error::UnsupportedVersion {
        found: envelope.version,
        supported: VERSION,
      });
    }

    let payload: DispatchPayload =
      serde_json::from_value(envelope.payload).map_err(Error::Schema)?;
    payload.validate()?;

    Ok(payload)
  }
}
