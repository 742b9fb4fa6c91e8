use std::collections::HashMap;

use async_trait::async_trait;
use bytes::Bytes;
use tokio::sync::RwLock;

use crate::{ByteStream, Error, Store, read_all, stream_from};

/// In-memory artifact store.
///
/// Suitable for tests and embedding; nothing survives the process.
#[derive(Debug, Default)]
pub struct MemoryStore {
  data: RwLock<HashMap<String, Bytes>>,
}

impl MemoryStore {
  pub fn new() -> Self {
    Self::default()
  }

  /// Number of stored artifacts.
  pub async fn len(&self) -> usize {
    self.data.read().await.len()
  }

  pub async fn is_empty(&self) -> bool {
    self.data.read().await.is_empty()
  }
}

#[async_trait]
impl Store for MemoryStore {
  async fn get(&self, key: &str) -> Result<ByteStream, Error> {
    let data = self.data.read().await;
    match data.get(key) {
      Some(bytes) => Ok(stream_from(bytes.clone())),
      None => Err(Error::NotFound(key.to_string())),
    }
  }

  async fn put(&self, key: &str, data: ByteStream) -> Result<(), Error> {
    // Buffer before taking the lock so a slow producer cannot stall readers.
    let bytes = read_all(data).await?;
    self.data.write().await.insert(key.to_string(), bytes);
    Ok(())
  }

  async fn put_new(&self, key: &str, data: ByteStream) -> Result<(), Error> {
    let bytes = read_all(data).await?;
    let mut map = self.data.write().await;
    if map.contains_key(key) {
      return Err(Error::AlreadyExists(key.to_string()));
    }
    map.insert(key.to_string(), bytes);
    Ok(())
  }

  async fn exists(&self, key: &str) -> Result<bool, Error> {
    Ok(self.data.read().await.contains_key(key))
  }

  async fn delete(&self, key: &str) -> Result<(), Error> {
    match self.data.write().await.remove(key) {
      Some(_) => Ok(()),
      None => Err(Error::NotFound(key.to_string())),
    }
  }
}
