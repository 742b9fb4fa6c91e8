//! Bounded retries for storage operations.

use std::future::Future;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{error, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RetryBackoff {
  Constant,
  Linear,
  Exponential,
}

/// How often and how patiently a storage operation is retried.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryPolicy {
  /// Total attempts, including the first one. Zero behaves like one.
  pub max_attempts: u32,
  pub backoff: RetryBackoff,
  pub initial_delay: Duration,
}

impl Default for RetryPolicy {
  fn default() -> Self {
    Self {
      max_attempts: 3,
      backoff: RetryBackoff::Exponential,
      initial_delay: Duration::from_millis(50),
    }
  }
}

impl RetryPolicy {
  /// A policy that never retries.
  pub fn none() -> Self {
    Self {
      max_attempts: 1,
      ..Self::default()
    }
  }

  /// Delay before retry number `retry` (1-based).
  pub fn delay(&self, retry: u32) -> Duration {
    match self.backoff {
      RetryBackoff::Constant => self.initial_delay,
      RetryBackoff::Linear => self.initial_delay.saturating_mul(retry),
      RetryBackoff::Exponential => self
        .initial_delay
        .saturating_mul(2u32.saturating_pow(retry.saturating_sub(1))),
    }
  }

  /// Run `op` until it succeeds, fails with a non-retryable error, or the
  /// attempt budget is spent.
  ///
  /// Only I/O failures of the artifact store are retried.
  pub async fn run<T, F, Fut>(&self, operation: &str, mut op: F) -> Result<T, quay_artifact::Error>
  where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, quay_artifact::Error>>,
  {
    let attempts = self.max_attempts.max(1);
    let mut attempt = 1;

    loop {
      match op().await {
        Ok(value) => return Ok(value),
        Err(quay_artifact::Error::Io(e)) if attempt < attempts => {
          let delay = self.delay(attempt);
          warn!(
            operation,
            attempt,
            max_attempts = attempts,
            delay_ms = delay.as_millis() as u64,
            error = %e,
            "storage operation failed, retrying"
          );
          tokio::time::sleep(delay).await;
          attempt += 1;
        }
        Err(e @ quay_artifact::Error::Io(_)) => {
          error!(operation, attempts, error = %e, "storage operation failed, giving up");
          return Err(e);
        }
        Err(e) => return Err(e),
      }
    }
  }
}
