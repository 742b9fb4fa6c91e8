use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Which artifact slot of a dispatch is addressed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum Role {
  /// The submitted workflow payload. Write-once.
  Payload,
  /// The result produced by the execution engine.
  Result,
  /// A client upload, optionally in a numbered slot (`upload-N`).
  Upload(Option<u32>),
}

impl Role {
  /// Whether a second write to this role must be rejected.
  pub fn is_write_once(self) -> bool {
    matches!(self, Role::Payload)
  }
}

impl fmt::Display for Role {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      Role::Payload => f.write_str("payload"),
      Role::Result => f.write_str("result"),
      Role::Upload(None) => f.write_str("upload"),
      Role::Upload(Some(n)) => write!(f, "upload-{n}"),
    }
  }
}

impl FromStr for Role {
  type Err = String;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    match s {
      "payload" => Ok(Role::Payload),
      "result" => Ok(Role::Result),
      "upload" => Ok(Role::Upload(None)),
      other => other
        .strip_prefix("upload-")
        .filter(|n| !n.is_empty() && n.bytes().all(|b| b.is_ascii_digit()))
        .and_then(|n| n.parse().ok())
        .map(|n| Role::Upload(Some(n)))
        .ok_or_else(|| format!("unknown artifact role: {other}")),
    }
  }
}

impl TryFrom<String> for Role {
  type Error = String;

  fn try_from(value: String) -> Result<Self, Self::Error> {
    value.parse()
  }
}

impl From<Role> for String {
  fn from(role: Role) -> Self {
    role.to_string()
  }
}
