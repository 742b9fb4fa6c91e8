//! Quay Artifact
//!
//! This crate provides the artifact storage trait and implementations for quay.
//! Artifacts are binary blobs (submitted payloads, uploads, results) that are
//! stored separately from dispatch metadata.
//!
//! The [`Store`] trait defines the backend layer for artifact storage.
//! Implementations handle the actual storage (filesystem, memory) while the
//! dispatch layer translates (dispatch ID, role) pairs to storage keys.
//!
//! The trait uses async streaming for efficient handling of large files.

mod fs;
mod memory;

pub use fs::FsStore;
pub use memory::MemoryStore;

use async_trait::async_trait;
use bytes::{Bytes, BytesMut};
use futures::{Stream, StreamExt};
use std::pin::Pin;

/// A boxed stream of bytes for artifact data.
pub type ByteStream = Pin<Box<dyn Stream<Item = Result<Bytes, Error>> + Send>>;

/// Error type for artifact storage operations.
#[derive(Debug, thiserror::Error)]
pub enum Error {
  /// The requested artifact was not found.
  #[error("artifact not found: {0}")]
  NotFound(String),

  /// A write-once artifact already exists.
  #[error("artifact already exists: {0}")]
  AlreadyExists(String),

  /// The key cannot be mapped onto the backend.
  #[error("invalid artifact key: {0}")]
  InvalidKey(String),

  /// An I/O error occurred.
  #[error("io error: {0}")]
  Io(#[from] std::io::Error),
}

/// Artifact storage trait.
///
/// Implementations provide the actual storage backend. Writes must be
/// atomic: a reader sees either the previous artifact or the complete new
/// one, never a partial write.
#[async_trait]
pub trait Store: Send + Sync {
  /// Retrieve an artifact by key.
  ///
  /// Returns a stream of bytes for efficient handling of large files.
  async fn get(&self, key: &str) -> Result<ByteStream, Error>;

  /// Store an artifact, replacing any previous artifact under the key.
  ///
  /// Accepts a stream of bytes for efficient handling of large files.
  async fn put(&self, key: &str, data: ByteStream) -> Result<(), Error>;

  /// Store an artifact only if the key is unused.
  ///
  /// Fails with [`Error::AlreadyExists`] otherwise. Two concurrent calls for
  /// the same key never both succeed.
  async fn put_new(&self, key: &str, data: ByteStream) -> Result<(), Error>;

  /// Check whether an artifact exists.
  async fn exists(&self, key: &str) -> Result<bool, Error>;

  /// Delete an artifact by key.
  async fn delete(&self, key: &str) -> Result<(), Error>;
}

/// Wrap an in-memory buffer as a single-chunk stream.
pub fn stream_from(data: impl Into<Bytes>) -> ByteStream {
  let data = data.into();
  Box::pin(futures::stream::once(async move { Ok(data) }))
}

/// Drain a stream into one contiguous buffer.
pub async fn read_all(mut stream: ByteStream) -> Result<Bytes, Error> {
  let mut buf = BytesMut::new();
  while let Some(chunk) = stream.next().await {
    buf.extend_from_slice(&chunk?);
  }
  Ok(buf.freeze())
}
