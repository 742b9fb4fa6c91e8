//! End-to-end tests of the dispatch services over real and fake backends.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use quay_artifact::{ByteStream, FsStore, MemoryStore, Store, read_all, stream_from};
use quay_codec::{Codec, JsonCodec};
use quay_dispatch::{
  DispatchConfig, DispatchError, Dispatcher, ErrorKind, RetryBackoff, RetryPolicy, Role,
};
use quay_registry::{
  DispatchId, DispatchRecord, DispatchStatus, ListFilter, Registry, SqliteRegistry,
};
use quay_workflow::{DispatchPayload, TaskDef, TaskRef, WorkflowDef};

fn workflow(name: &str) -> DispatchPayload {
  DispatchPayload::new(WorkflowDef {
    name: name.to_string(),
    tasks: vec![TaskDef {
      task_id: "only".to_string(),
      task: TaskRef {
        name: "echo".to_string(),
        version: None,
      },
      arguments: HashMap::new(),
      executor: None,
      timeout_ms: None,
    }],
    edges: vec![],
    timeout_ms: None,
    max_retry_attempts: None,
  })
}

fn encoded(name: &str) -> Bytes {
  Bytes::from(JsonCodec::new().encode(&workflow(name)).unwrap())
}

fn fast_retry(max_attempts: u32) -> RetryPolicy {
  RetryPolicy {
    max_attempts,
    backoff: RetryBackoff::Constant,
    initial_delay: Duration::from_millis(1),
  }
}

async fn registry() -> Arc<SqliteRegistry> {
  let registry = SqliteRegistry::in_memory().await.unwrap();
  registry.migrate().await.unwrap();
  Arc::new(registry)
}

fn dispatcher(store: Arc<dyn Store>, registry: Arc<dyn Registry>) -> Dispatcher {
  Dispatcher::new(
    Arc::new(JsonCodec::new()),
    store,
    registry,
    DispatchConfig {
      max_payload_bytes: Some(64 * 1024),
      retry: fast_retry(3),
    },
  )
}

/// Store whose writes fail with an I/O error a fixed number of times.
struct FlakyStore {
  inner: MemoryStore,
  failures_left: AtomicU32,
  writes: AtomicU32,
}

impl FlakyStore {
  fn new(failures: u32) -> Self {
    Self {
      inner: MemoryStore::new(),
      failures_left: AtomicU32::new(failures),
      writes: AtomicU32::new(0),
    }
  }

  fn check(&self) -> Result<(), quay_artifact::Error> {
    self.writes.fetch_add(1, Ordering::SeqCst);
    let left = self.failures_left.load(Ordering::SeqCst);
    if left > 0 {
      self.failures_left.store(left - 1, Ordering::SeqCst);
      return Err(quay_artifact::Error::Io(std::io::Error::other("disk hiccup")));
    }
    Ok(())
  }
}

#[async_trait]
impl Store for FlakyStore {
  async fn get(&self, key: &str) -> Result<ByteStream, quay_artifact::Error> {
    self.inner.get(key).await
  }

  async fn put(&self, key: &str, data: ByteStream) -> Result<(), quay_artifact::Error> {
    self.check()?;
    self.inner.put(key, data).await
  }

  async fn put_new(&self, key: &str, data: ByteStream) -> Result<(), quay_artifact::Error> {
    self.check()?;
    self.inner.put_new(key, data).await
  }

  async fn exists(&self, key: &str) -> Result<bool, quay_artifact::Error> {
    self.inner.exists(key).await
  }

  async fn delete(&self, key: &str) -> Result<(), quay_artifact::Error> {
    self.inner.delete(key).await
  }
}

/// Store whose write-once puts stall before publishing, widening the window
/// between a completion's status check and its status change.
struct SlowStore {
  inner: MemoryStore,
  delay: Duration,
}

#[async_trait]
impl Store for SlowStore {
  async fn get(&self, key: &str) -> Result<ByteStream, quay_artifact::Error> {
    self.inner.get(key).await
  }

  async fn put(&self, key: &str, data: ByteStream) -> Result<(), quay_artifact::Error> {
    self.inner.put(key, data).await
  }

  async fn put_new(&self, key: &str, data: ByteStream) -> Result<(), quay_artifact::Error> {
    tokio::time::sleep(self.delay).await;
    self.inner.put_new(key, data).await
  }

  async fn exists(&self, key: &str) -> Result<bool, quay_artifact::Error> {
    self.inner.exists(key).await
  }

  async fn delete(&self, key: &str) -> Result<(), quay_artifact::Error> {
    self.inner.delete(key).await
  }
}

/// Registry that rejects every registration as an ID collision.
struct CollidingRegistry;

#[async_trait]
impl Registry for CollidingRegistry {
  async fn register(
    &self,
    dispatch_id: &DispatchId,
    _payload_ref: &str,
  ) -> Result<DispatchRecord, quay_registry::Error> {
    Err(quay_registry::Error::Conflict(dispatch_id.clone()))
  }

  async fn get(&self, dispatch_id: &DispatchId) -> Result<DispatchRecord, quay_registry::Error> {
    Err(quay_registry::Error::NotFound(dispatch_id.clone()))
  }

  async fn update_status(
    &self,
    dispatch_id: &DispatchId,
    _status: DispatchStatus,
    _error: Option<&str>,
  ) -> Result<DispatchRecord, quay_registry::Error> {
    Err(quay_registry::Error::NotFound(dispatch_id.clone()))
  }

  async fn list(&self, _filter: &ListFilter) -> Result<Vec<DispatchRecord>, quay_registry::Error> {
    Ok(vec![])
  }
}

#[tokio::test]
async fn test_submit_complete_download() {
  let dir = tempfile::tempdir().unwrap();
  let store = Arc::new(FsStore::new(dir.path()));
  let dispatcher = dispatcher(store.clone(), registry().await);

  let bytes = encoded("workflow-A");
  let id = dispatcher.submission().submit(bytes.clone()).await.unwrap();

  let record = dispatcher.status(id.as_str()).await.unwrap();
  assert_eq!(record.status, DispatchStatus::Pending);
  assert_eq!(record.payload_ref, format!("{id}/payload"));

  // The payload is stored exactly as submitted.
  let stored = read_all(store.get(&record.payload_ref).await.unwrap()).await.unwrap();
  assert_eq!(stored, bytes);

  let payload = read_all(dispatcher.transfer().payload(id.as_str()).await.unwrap())
    .await
    .unwrap();
  let decoded = JsonCodec::new().decode(&payload).unwrap();
  assert_eq!(decoded.workflow.name, "workflow-A");

  match dispatcher.transfer().download(id.as_str()).await {
    Err(DispatchError::ArtifactNotReady { status, role, .. }) => {
      assert_eq!(status, DispatchStatus::Pending);
      assert_eq!(role, Role::Result);
    }
    Err(other) => panic!("expected not ready, got {other:?}"),
    Ok(_) => panic!("expected not ready, got a result"),
  }

  let completed = dispatcher
    .transfer()
    .complete(id.as_str(), stream_from("42"))
    .await
    .unwrap();
  assert_eq!(completed.status, DispatchStatus::Completed);
  assert!(completed.completed_at.is_some());

  let result = read_all(dispatcher.transfer().download(id.as_str()).await.unwrap())
    .await
    .unwrap();
  assert_eq!(&result[..], b"42");
}

#[tokio::test]
async fn test_rejects_undecodable_payload_without_side_effects() {
  let store = Arc::new(MemoryStore::new());
  let registry = registry().await;
  let dispatcher = dispatcher(store.clone(), registry.clone());

  let err = dispatcher
    .submission()
    .submit(Bytes::from_static(b"workflow-A"))
    .await
    .unwrap_err();
  assert_eq!(err.kind(), ErrorKind::Serialization);

  assert!(store.is_empty().await);
  assert!(registry.list(&ListFilter::default()).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_rejects_oversized_payload() {
  let store = Arc::new(MemoryStore::new());
  let dispatcher = Dispatcher::new(
    Arc::new(JsonCodec::new()),
    store.clone(),
    registry().await,
    DispatchConfig {
      max_payload_bytes: Some(16),
      retry: fast_retry(1),
    },
  );

  let err = dispatcher
    .submission()
    .submit(encoded("workflow-A"))
    .await
    .unwrap_err();
  assert!(matches!(err, DispatchError::PayloadTooLarge { limit: 16, .. }));
  assert!(store.is_empty().await);
}

#[tokio::test]
async fn test_concurrent_submissions_get_distinct_ids() {
  let dispatcher = dispatcher(Arc::new(MemoryStore::new()), registry().await);

  let handles: Vec<_> = (0..16)
    .map(|i| {
      let dispatcher = dispatcher.clone();
      tokio::spawn(async move {
        dispatcher
          .submission()
          .submit(encoded(&format!("workflow-{i}")))
          .await
          .unwrap()
      })
    })
    .collect();

  let mut ids = Vec::new();
  for handle in handles {
    ids.push(handle.await.unwrap());
  }
  ids.sort_by(|a, b| a.as_str().cmp(b.as_str()));
  ids.dedup();
  assert_eq!(ids.len(), 16);

  let listed = dispatcher.list(&ListFilter::default()).await.unwrap();
  assert_eq!(listed.len(), 16);
}

#[tokio::test]
async fn test_upload_to_unknown_dispatch() {
  let store = Arc::new(MemoryStore::new());
  let registry = registry().await;
  let dispatcher = dispatcher(store.clone(), registry.clone());

  let unknown = DispatchId::generate();
  let err = dispatcher
    .transfer()
    .upload(unknown.as_str(), Bytes::from_static(b"data"))
    .await
    .unwrap_err();
  assert_eq!(err.kind(), ErrorKind::NotFound);

  let err = dispatcher
    .transfer()
    .upload("not-a-dispatch-id", Bytes::from_static(b"data"))
    .await
    .unwrap_err();
  assert_eq!(err.kind(), ErrorKind::NotFound);

  assert!(store.is_empty().await);
  assert!(registry.list(&ListFilter::default()).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_upload_slots_are_independent() {
  let dispatcher = dispatcher(Arc::new(MemoryStore::new()), registry().await);
  let id = dispatcher.submission().submit(encoded("uploads")).await.unwrap();
  let transfer = dispatcher.transfer();

  assert!(transfer.upload(id.as_str(), Bytes::from_static(b"main")).await.unwrap());
  assert!(
    transfer
      .upload_slot(id.as_str(), 1, Bytes::from_static(b"one"))
      .await
      .unwrap()
  );
  assert!(
    transfer
      .upload_stream(id.as_str(), Some(2), stream_from("two"))
      .await
      .unwrap()
  );
  // Uploads overwrite.
  assert!(transfer.upload(id.as_str(), Bytes::from_static(b"main-v2")).await.unwrap());

  let id = id.as_str();
  let read = |role| async move {
    read_all(transfer.download_role(id, role).await.unwrap())
      .await
      .unwrap()
  };
  assert_eq!(&read(Role::Upload(None)).await[..], b"main-v2");
  assert_eq!(&read(Role::Upload(Some(1))).await[..], b"one");
  assert_eq!(&read(Role::Upload(Some(2))).await[..], b"two");
}

#[tokio::test]
async fn test_upload_retries_transient_failures() {
  let store = Arc::new(FlakyStore::new(0));
  let dispatcher = dispatcher(store.clone(), registry().await);
  let id = dispatcher.submission().submit(encoded("flaky")).await.unwrap();

  store.failures_left.store(2, Ordering::SeqCst);
  store.writes.store(0, Ordering::SeqCst);

  let stored = dispatcher
    .transfer()
    .upload(id.as_str(), Bytes::from_static(b"data"))
    .await
    .unwrap();
  assert!(stored);
  assert_eq!(store.writes.load(Ordering::SeqCst), 3);
}

#[tokio::test]
async fn test_upload_reports_false_when_retries_exhausted() {
  let store = Arc::new(FlakyStore::new(0));
  let dispatcher = dispatcher(store.clone(), registry().await);
  let id = dispatcher.submission().submit(encoded("broken")).await.unwrap();

  store.failures_left.store(u32::MAX, Ordering::SeqCst);
  store.writes.store(0, Ordering::SeqCst);

  let stored = dispatcher
    .transfer()
    .upload(id.as_str(), Bytes::from_static(b"data"))
    .await
    .unwrap();
  assert!(!stored);
  assert_eq!(store.writes.load(Ordering::SeqCst), 3);

  let stored = dispatcher
    .transfer()
    .upload_stream(id.as_str(), None, stream_from("data"))
    .await
    .unwrap();
  assert!(!stored);
  assert_eq!(store.writes.load(Ordering::SeqCst), 4);
}

#[tokio::test]
async fn test_submit_retries_payload_storage() {
  let store = Arc::new(FlakyStore::new(2));
  let dispatcher = dispatcher(store.clone(), registry().await);

  let id = dispatcher.submission().submit(encoded("retried")).await.unwrap();
  assert_eq!(store.writes.load(Ordering::SeqCst), 3);
  assert!(store.inner.exists(&format!("{id}/payload")).await.unwrap());
}

#[tokio::test]
async fn test_failed_registration_removes_payload() {
  let store = Arc::new(MemoryStore::new());
  let dispatcher = dispatcher(store.clone(), Arc::new(CollidingRegistry));

  let err = dispatcher
    .submission()
    .submit(encoded("workflow-A"))
    .await
    .unwrap_err();
  assert_eq!(err.kind(), ErrorKind::Conflict);
  assert!(store.is_empty().await);
}

#[tokio::test]
async fn test_fail_is_terminal() {
  let dispatcher = dispatcher(Arc::new(MemoryStore::new()), registry().await);
  let id = dispatcher.submission().submit(encoded("doomed")).await.unwrap();

  let failed = dispatcher
    .transfer()
    .fail(id.as_str(), "executor crashed")
    .await
    .unwrap();
  assert_eq!(failed.status, DispatchStatus::Failed);
  assert_eq!(failed.error.as_deref(), Some("executor crashed"));

  let err = dispatcher
    .transfer()
    .complete(id.as_str(), stream_from("late"))
    .await
    .unwrap_err();
  assert!(matches!(
    err,
    DispatchError::InvalidState {
      from: DispatchStatus::Failed,
      to: DispatchStatus::Completed,
      ..
    }
  ));

  // The rejected completion wrote nothing.
  match dispatcher.transfer().download(id.as_str()).await {
    Err(DispatchError::ArtifactNotReady { status, .. }) => {
      assert_eq!(status, DispatchStatus::Failed)
    }
    _ => panic!("expected not ready"),
  }

  let failed_only = dispatcher
    .list(&ListFilter::with_status(DispatchStatus::Failed))
    .await
    .unwrap();
  assert_eq!(failed_only.len(), 1);
}

async fn slow_dispatch() -> (Dispatcher, DispatchId) {
  let store = Arc::new(SlowStore {
    inner: MemoryStore::new(),
    delay: Duration::from_millis(50),
  });
  let dispatcher = dispatcher(store, registry().await);
  // Submission stores the payload through the slow path too.
  let id = dispatcher.submission().submit(encoded("racy")).await.unwrap();
  (dispatcher, id)
}

#[tokio::test]
async fn test_fail_racing_complete_leaves_no_result() {
  let (dispatcher, id) = slow_dispatch().await;
  let transfer = dispatcher.transfer();

  let complete = transfer.complete(id.as_str(), stream_from("42"));
  let fail = async {
    tokio::time::sleep(Duration::from_millis(10)).await;
    transfer.fail(id.as_str(), "executor crashed").await
  };
  let (completed, failed) = tokio::join!(complete, fail);

  assert!(matches!(
    completed,
    Err(DispatchError::InvalidState {
      from: DispatchStatus::Failed,
      to: DispatchStatus::Completed,
      ..
    })
  ));
  assert_eq!(failed.unwrap().status, DispatchStatus::Failed);

  let record = dispatcher.status(id.as_str()).await.unwrap();
  assert_eq!(record.status, DispatchStatus::Failed);
  match transfer.download(id.as_str()).await {
    Err(DispatchError::ArtifactNotReady { status, .. }) => {
      assert_eq!(status, DispatchStatus::Failed)
    }
    Err(other) => panic!("expected not ready, got {other:?}"),
    Ok(_) => panic!("a failed dispatch served a result"),
  }
}

#[tokio::test]
async fn test_concurrent_completions_keep_the_first_result() {
  let (dispatcher, id) = slow_dispatch().await;
  let transfer = dispatcher.transfer();

  let first = transfer.complete(id.as_str(), stream_from("first"));
  let second = async {
    tokio::time::sleep(Duration::from_millis(10)).await;
    transfer.complete(id.as_str(), stream_from("second")).await
  };
  let (first, second) = tokio::join!(first, second);

  assert_eq!(first.unwrap().status, DispatchStatus::Completed);
  assert_eq!(second.unwrap_err().kind(), ErrorKind::Conflict);

  let result = read_all(transfer.download(id.as_str()).await.unwrap())
    .await
    .unwrap();
  assert_eq!(&result[..], b"first");
}
