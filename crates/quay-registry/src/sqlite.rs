use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions};
use sqlx::{QueryBuilder, Sqlite, SqlitePool};

use crate::{DispatchId, DispatchRecord, DispatchStatus, Error, ListFilter, Registry};

const SELECT_COLUMNS: &str =
  "SELECT dispatch_id, status, payload_ref, created_at, completed_at, error FROM dispatches";

/// SQLite-based registry implementation.
#[derive(Clone)]
pub struct SqliteRegistry {
  pool: SqlitePool,
}

impl SqliteRegistry {
  /// Create a new SQLite registry with the given connection pool.
  pub fn new(pool: SqlitePool) -> Self {
    Self { pool }
  }

  /// Open (creating if needed) a database file in WAL mode.
  pub async fn open(path: impl AsRef<Path>) -> Result<Self, sqlx::Error> {
    let options = SqliteConnectOptions::new()
      .filename(path)
      .create_if_missing(true)
      .journal_mode(SqliteJournalMode::Wal)
      .busy_timeout(Duration::from_secs(5));
    let pool = SqlitePoolOptions::new().connect_with(options).await?;
    Ok(Self::new(pool))
  }

  /// Open a private in-memory database.
  ///
  /// Uses a single connection that is never recycled, since every SQLite
  /// memory connection is its own database.
  pub async fn in_memory() -> Result<Self, sqlx::Error> {
    let pool = SqlitePoolOptions::new()
      .max_connections(1)
      .idle_timeout(None)
      .max_lifetime(None)
      .connect("sqlite::memory:")
      .await?;
    Ok(Self::new(pool))
  }

  /// Run database migrations.
  pub async fn migrate(&self) -> Result<(), sqlx::migrate::MigrateError> {
    sqlx::migrate!("../../migrations").run(&self.pool).await
  }

  pub fn pool(&self) -> &SqlitePool {
    &self.pool
  }
}

fn is_unique_violation(err: &sqlx::Error) -> bool {
  matches!(err, sqlx::Error::Database(db) if db.is_unique_violation())
}

#[async_trait]
impl Registry for SqliteRegistry {
  async fn register(
    &self,
    dispatch_id: &DispatchId,
    payload_ref: &str,
  ) -> Result<DispatchRecord, Error> {
    let record = DispatchRecord {
      dispatch_id: dispatch_id.clone(),
      status: DispatchStatus::Pending,
      payload_ref: payload_ref.to_string(),
      created_at: Utc::now(),
      completed_at: None,
      error: None,
    };

    sqlx::query(
      r#"
            INSERT INTO dispatches (dispatch_id, status, payload_ref, created_at, completed_at, error)
            VALUES (?, ?, ?, ?, ?, ?)
            "#,
    )
    .bind(&record.dispatch_id)
    .bind(record.status)
    .bind(&record.payload_ref)
    .bind(record.created_at)
    .bind(record.completed_at)
    .bind(&record.error)
    .execute(&self.pool)
    .await
    .map_err(|e| {
      if is_unique_violation(&e) {
        Error::Conflict(dispatch_id.clone())
      } else {
        Error::Database(e)
      }
    })?;

    Ok(record)
  }

  async fn get(&self, dispatch_id: &DispatchId) -> Result<DispatchRecord, Error> {
    sqlx::query_as(
      r#"
            SELECT dispatch_id, status, payload_ref, created_at, completed_at, error
            FROM dispatches
            WHERE dispatch_id = ?
            "#,
    )
    .bind(dispatch_id)
    .fetch_optional(&self.pool)
    .await?
    .ok_or_else(|| Error::NotFound(dispatch_id.clone()))
  }

  async fn update_status(
    &self,
    dispatch_id: &DispatchId,
    status: DispatchStatus,
    error: Option<&str>,
  ) -> Result<DispatchRecord, Error> {
    let current = self.get(dispatch_id).await?;
    let invalid = |from| Error::InvalidTransition {
      dispatch_id: dispatch_id.clone(),
      from,
      to: status,
    };

    if !current.status.can_transition_to(status) {
      return Err(invalid(current.status));
    }

    // The status guard makes the check above race-free: if another writer
    // moved the dispatch first, no row matches.
    let updated: Option<DispatchRecord> = sqlx::query_as(
      r#"
            UPDATE dispatches
            SET status = ?, completed_at = ?, error = ?
            WHERE dispatch_id = ? AND status = ?
            RETURNING dispatch_id, status, payload_ref, created_at, completed_at, error
            "#,
    )
    .bind(status)
    .bind(Utc::now())
    .bind(error)
    .bind(dispatch_id)
    .bind(current.status)
    .fetch_optional(&self.pool)
    .await?;

    match updated {
      Some(record) => Ok(record),
      None => {
        let latest = self.get(dispatch_id).await?;
        Err(invalid(latest.status))
      }
    }
  }

  async fn list(&self, filter: &ListFilter) -> Result<Vec<DispatchRecord>, Error> {
    let mut query: QueryBuilder<Sqlite> = QueryBuilder::new(SELECT_COLUMNS);
    query.push(" WHERE 1 = 1");

    if let Some(status) = filter.status {
      query.push(" AND status = ").push_bind(status);
    }
    if let Some(created_after) = filter.created_after {
      query.push(" AND created_at > ").push_bind(created_after);
    }

    query.push(" ORDER BY created_at DESC, dispatch_id ASC");

    if let Some(limit) = filter.limit {
      query.push(" LIMIT ").push_bind(i64::from(limit));
    }

    Ok(
      query
        .build_query_as::<DispatchRecord>()
        .fetch_all(&self.pool)
        .await?,
    )
  }
}
