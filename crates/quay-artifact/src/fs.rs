use std::path::{Component, Path, PathBuf};

use async_trait::async_trait;
use futures::StreamExt;
use tokio::fs::{self, File};
use tokio::io::AsyncWriteExt;
use tokio_util::io::ReaderStream;
use tracing::warn;

use crate::{ByteStream, Error, Store};

/// Filesystem-based artifact store.
///
/// Stores artifacts as files on the local filesystem. Each artifact is stored
/// at `{base_path}/{key}`. Parent directories are created automatically.
///
/// Data is first streamed into a hidden `.partial` file next to the target
/// and fsynced, then published with a rename (overwrite) or a hard link
/// (write-once). The hard link fails if the target exists, which makes
/// [`Store::put_new`] atomic without any in-process locking.
pub struct FsStore {
  base_path: PathBuf,
}

impl FsStore {
  /// Create a new filesystem store with the given base path.
  pub fn new(base_path: impl Into<PathBuf>) -> Self {
    Self {
      base_path: base_path.into(),
    }
  }

  /// Get the root directory of the store.
  pub fn base_path(&self) -> &Path {
    &self.base_path
  }

  /// Map a key onto a path below the base directory.
  ///
  /// Keys are `/`-separated segments of `[A-Za-z0-9._-]`. Segments may not
  /// start with a dot, which keeps keys away from `..` and from the
  /// store's own partial files.
  fn key_to_path(&self, key: &str) -> Result<PathBuf, Error> {
    let valid = !key.is_empty()
      && key.split('/').all(|segment| {
        !segment.is_empty()
          && !segment.starts_with('.')
          && segment
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-'))
      });

    let path = Path::new(key);
    if !valid || !path.components().all(|c| matches!(c, Component::Normal(_))) {
      return Err(Error::InvalidKey(key.to_string()));
    }

    Ok(self.base_path.join(path))
  }

  /// Stream `data` into a fresh partial file beside `path`.
  async fn write_partial(&self, path: &Path, data: ByteStream) -> Result<PathBuf, Error> {
    let parent = path
      .parent()
      .ok_or_else(|| Error::InvalidKey(path.display().to_string()))?;
    fs::create_dir_all(parent).await?;

    let file_name = path
      .file_name()
      .and_then(|n| n.to_str())
      .ok_or_else(|| Error::InvalidKey(path.display().to_string()))?;
    let partial = parent.join(format!(".{}.{}.partial", file_name, uuid::Uuid::new_v4()));

    if let Err(e) = write_file(&partial, data).await {
      remove_partial(&partial).await;
      return Err(e);
    }

    Ok(partial)
  }
}

async fn write_file(path: &Path, data: ByteStream) -> Result<(), Error> {
  let mut file = File::create(path).await?;
  let mut stream = std::pin::pin!(data);

  while let Some(chunk) = stream.next().await {
    let bytes = chunk?;
    file.write_all(&bytes).await?;
  }

  file.flush().await?;
  file.sync_all().await?;
  Ok(())
}

async fn remove_partial(path: &Path) {
  if let Err(e) = fs::remove_file(path).await
    && e.kind() != std::io::ErrorKind::NotFound
  {
    warn!(path = %path.display(), error = %e, "failed to remove partial artifact");
  }
}

fn not_found(key: &str) -> impl FnOnce(std::io::Error) -> Error + '_ {
  move |e| {
    if e.kind() == std::io::ErrorKind::NotFound {
      Error::NotFound(key.to_string())
    } else {
      Error::Io(e)
    }
  }
}

#[async_trait]
impl Store for FsStore {
  async fn get(&self, key: &str) -> Result<ByteStream, Error> {
    let path = self.key_to_path(key)?;
    let file = File::open(&path).await.map_err(not_found(key))?;
    let stream = ReaderStream::new(file).map(|r| r.map_err(Error::Io));
    Ok(Box::pin(stream))
  }

  async fn put(&self, key: &str, data: ByteStream) -> Result<(), Error> {
    let path = self.key_to_path(key)?;
    let partial = self.write_partial(&path, data).await?;

    if let Err(e) = fs::rename(&partial, &path).await {
      remove_partial(&partial).await;
      return Err(Error::Io(e));
    }

    Ok(())
  }

  async fn put_new(&self, key: &str, data: ByteStream) -> Result<(), Error> {
    let path = self.key_to_path(key)?;

    // Fail fast; the hard link below is what actually enforces write-once.
    if fs::try_exists(&path).await? {
      return Err(Error::AlreadyExists(key.to_string()));
    }

    let partial = self.write_partial(&path, data).await?;
    let linked = fs::hard_link(&partial, &path).await;
    remove_partial(&partial).await;

    match linked {
      Ok(()) => Ok(()),
      Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {
        Err(Error::AlreadyExists(key.to_string()))
      }
      Err(e) => Err(Error::Io(e)),
    }
  }

  async fn exists(&self, key: &str) -> Result<bool, Error> {
    let path = self.key_to_path(key)?;
    Ok(fs::try_exists(&path).await?)
  }

  async fn delete(&self, key: &str) -> Result<(), Error> {
    let path = self.key_to_path(key)?;
    fs::remove_file(&path).await.map_err(not_found(key))
  }
}
