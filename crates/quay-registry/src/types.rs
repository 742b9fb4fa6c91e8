use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// Returned when a string is not a valid dispatch ID.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid dispatch id: {0:?}")]
pub struct InvalidDispatchId(pub String);

/// Globally unique dispatch identifier.
///
/// Always a lowercase hyphenated UUID, which also makes it safe to use as a
/// storage path segment.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, sqlx::Type)]
#[serde(try_from = "String", into = "String")]
#[sqlx(transparent)]
pub struct DispatchId(String);

impl DispatchId {
  /// Generate a fresh random (v4) dispatch ID.
  pub fn generate() -> Self {
    Self(uuid::Uuid::new_v4().hyphenated().to_string())
  }

  pub fn as_str(&self) -> &str {
    &self.0
  }
}

impl FromStr for DispatchId {
  type Err = InvalidDispatchId;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    uuid::Uuid::parse_str(s)
      .map(|id| Self(id.hyphenated().to_string()))
      .map_err(|_| InvalidDispatchId(s.to_string()))
  }
}

impl TryFrom<String> for DispatchId {
  type Error = InvalidDispatchId;

  fn try_from(value: String) -> Result<Self, Self::Error> {
    value.parse()
  }
}

impl From<DispatchId> for String {
  fn from(id: DispatchId) -> Self {
    id.0
  }
}

impl fmt::Display for DispatchId {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(&self.0)
  }
}

/// Status of a dispatch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "snake_case")]
#[sqlx(rename_all = "snake_case")]
pub enum DispatchStatus {
  Pending,
  Completed,
  Failed,
}

impl DispatchStatus {
  /// Whether the registry accepts a move from `self` to `next`.
  pub fn can_transition_to(self, next: DispatchStatus) -> bool {
    matches!(
      (self, next),
      (DispatchStatus::Pending, DispatchStatus::Completed)
        | (DispatchStatus::Pending, DispatchStatus::Failed)
    )
  }

  pub fn is_terminal(self) -> bool {
    !matches!(self, DispatchStatus::Pending)
  }

  pub fn as_str(self) -> &'static str {
    match self {
      DispatchStatus::Pending => "pending",
      DispatchStatus::Completed => "completed",
      DispatchStatus::Failed => "failed",
    }
  }
}

impl fmt::Display for DispatchStatus {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.as_str())
  }
}

impl FromStr for DispatchStatus {
  type Err = String;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    match s {
      "pending" => Ok(DispatchStatus::Pending),
      "completed" => Ok(DispatchStatus::Completed),
      "failed" => Ok(DispatchStatus::Failed),
      other => Err(format!("unknown dispatch status: {other}")),
    }
  }
}

/// A dispatch as stored in the database.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct DispatchRecord {
  pub dispatch_id: DispatchId,
  pub status: DispatchStatus,
  /// Storage key of the submitted payload artifact.
  pub payload_ref: String,
  pub created_at: DateTime<Utc>,
  pub completed_at: Option<DateTime<Utc>>,
  pub error: Option<String>,
}

/// Criteria for [`crate::Registry::list`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ListFilter {
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub status: Option<DispatchStatus>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub created_after: Option<DateTime<Utc>>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub limit: Option<u32>,
}

impl ListFilter {
  pub fn with_status(status: DispatchStatus) -> Self {
    Self {
      status: Some(status),
      ..Self::default()
    }
  }
}
