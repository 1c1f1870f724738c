//! Durable registration store backed by SQLite.
//!
//! A fixed set of connections is opened up front. Each operation checks out
//! one connection, runs on the blocking thread pool and is bounded by the
//! configured timeout. Writes use `BEGIN IMMEDIATE` so that concurrent
//! registrations of one phone number serialize on the database write lock.

use crate::error::StorageError;
use crate::store::RegistrationStore;
use crate::types::{DToken, PhoneNumber, Registration, UserRecord};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, TransactionBehavior};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::sync::Semaphore;
use tracing::{debug, info, instrument, warn};

/// Current schema version, stored in `PRAGMA user_version`.
pub const SCHEMA_VERSION: u32 = 1;

const SCHEMA_V1: &str = "
CREATE TABLE IF NOT EXISTS user_data (
    username      TEXT    NOT NULL,
    phone_number  TEXT    NOT NULL PRIMARY KEY,
    d_token       INTEGER NOT NULL UNIQUE,
    registered_at TEXT    NOT NULL
);
";

/// Connection pool sizing and per-operation limits.
#[derive(Debug, Clone, Copy)]
pub struct PoolOptions {
    /// Number of pooled connections
    pub pool_size: usize,
    /// Upper bound for a single store operation, including waiting for a connection
    pub operation_timeout: Duration,
}

impl Default for PoolOptions {
    fn default() -> Self {
        Self {
            pool_size: 5,
            operation_timeout: Duration::from_secs(5),
        }
    }
}

struct ConnectionPool {
    idle: Mutex<Vec<Connection>>,
    permits: Arc<Semaphore>,
}

impl ConnectionPool {
    fn new(connections: Vec<Connection>) -> Self {
        let size = connections.len();
        Self {
            idle: Mutex::new(connections),
            permits: Arc::new(Semaphore::new(size)),
        }
    }

    // Only called while holding a permit, so a connection is always idle.
    fn checkout(&self) -> Result<Connection, StorageError> {
        self.idle
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .pop()
            .ok_or(StorageError::PoolClosed)
    }

    fn checkin(&self, conn: Connection) {
        self.idle
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(conn);
    }
}

/// SQLite-backed [`RegistrationStore`].
#[derive(Clone)]
pub struct SqliteStore {
    pool: Arc<ConnectionPool>,
    operation_timeout: Duration,
}

impl SqliteStore {
    /// Open (or create) the database at `path` and run pending migrations.
    pub async fn open(path: impl Into<PathBuf>, options: PoolOptions) -> Result<Self, StorageError> {
        let path = path.into();
        let pool_size = options.pool_size.max(1);
        let busy_timeout = options.operation_timeout;

        let open_path = path.clone();
        let connections = tokio::task::spawn_blocking(move || {
            open_connections(&open_path, pool_size, busy_timeout)
        })
        .await??;

        info!(
            path = %path.display(),
            pool_size,
            timeout = ?options.operation_timeout,
            "SQLite registration store opened"
        );

        Ok(Self {
            pool: Arc::new(ConnectionPool::new(connections)),
            operation_timeout: options.operation_timeout,
        })
    }

    /// Run `op` on a pooled connection within the operation timeout.
    async fn run<T, F>(&self, op: F) -> Result<T, StorageError>
    where
        T: Send + 'static,
        F: FnOnce(&mut Connection) -> Result<T, StorageError> + Send + 'static,
    {
        let pool = Arc::clone(&self.pool);
        let timeout = self.operation_timeout;

        let task = async move {
            let permit = Arc::clone(&pool.permits)
                .acquire_owned()
                .await
                .map_err(|_| StorageError::PoolClosed)?;

            tokio::task::spawn_blocking(move || {
                let _permit = permit;
                let mut conn = pool.checkout()?;
                let result = op(&mut conn);
                pool.checkin(conn);
                result
            })
            .await?
        };

        match tokio::time::timeout(timeout, task).await {
            Ok(result) => result,
            Err(_) => {
                warn!(?timeout, "Storage operation timed out");
                Err(StorageError::Timeout(timeout))
            }
        }
    }
}

fn open_connections(
    path: &Path,
    pool_size: usize,
    busy_timeout: Duration,
) -> Result<Vec<Connection>, StorageError> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }

    let mut connections = Vec::with_capacity(pool_size);
    for index in 0..pool_size {
        let conn = Connection::open(path)?;
        configure(&conn, busy_timeout)?;
        if index == 0 {
            migrate(&conn)?;
        }
        connections.push(conn);
    }
    Ok(connections)
}

fn configure(conn: &Connection, busy_timeout: Duration) -> Result<(), StorageError> {
    conn.busy_timeout(busy_timeout)?;
    let mode: String =
        conn.pragma_update_and_check(None, "journal_mode", "WAL", |row| row.get(0))?;
    debug!(journal_mode = %mode, "Configured SQLite connection");
    conn.execute_batch("PRAGMA synchronous = NORMAL;")?;
    Ok(())
}

fn migrate(conn: &Connection) -> Result<(), StorageError> {
    let current: u32 = conn.pragma_query_value(None, "user_version", |row| row.get(0))?;

    if current == 0 {
        info!("Initializing registration schema v{SCHEMA_VERSION}");
        conn.execute_batch(SCHEMA_V1)?;
        conn.pragma_update(None, "user_version", SCHEMA_VERSION)?;
    } else if current > SCHEMA_VERSION {
        return Err(StorageError::Migration(format!(
            "Database version {current} is newer than supported {SCHEMA_VERSION}"
        )));
    }

    Ok(())
}

/// Map a write failure, reporting unique-index violations on `d_token` as conflicts.
fn write_error(err: rusqlite::Error, token: DToken) -> StorageError {
    if let rusqlite::Error::SqliteFailure(ffi_err, _) = &err {
        if ffi_err.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_UNIQUE {
            return StorageError::TokenConflict(token);
        }
    }
    StorageError::Sqlite(err)
}

fn token_from_column(value: i64) -> Result<DToken, StorageError> {
    u64::try_from(value)
        .ok()
        .and_then(|v| DToken::new(v).ok())
        .ok_or_else(|| StorageError::Corrupt(format!("d_token out of range: {value}")))
}

fn select_token(conn: &Connection, phone: &str) -> Result<Option<DToken>, StorageError> {
    conn.query_row(
        "SELECT d_token FROM user_data WHERE phone_number = ?1",
        [phone],
        |row| row.get::<_, i64>(0),
    )
    .optional()?
    .map(token_from_column)
    .transpose()
}

fn insert_row(
    conn: &Connection,
    username: &str,
    phone: &str,
    token: DToken,
) -> Result<(), StorageError> {
    conn.execute(
        "INSERT INTO user_data (username, phone_number, d_token, registered_at)
         VALUES (?1, ?2, ?3, ?4)",
        params![username, phone, token.get() as i64, Utc::now().to_rfc3339()],
    )
    .map_err(|e| write_error(e, token))?;
    Ok(())
}

#[async_trait]
impl RegistrationStore for SqliteStore {
    #[instrument(skip(self))]
    async fn find_token_by_phone(
        &self,
        phone: &PhoneNumber,
    ) -> Result<Option<DToken>, StorageError> {
        let phone = phone.as_str().to_owned();
        self.run(move |conn| select_token(conn, &phone)).await
    }

    #[instrument(skip(self))]
    async fn find_by_phone(&self, phone: &PhoneNumber) -> Result<Option<UserRecord>, StorageError> {
        let phone_number = phone.clone();
        self.run(move |conn| {
            let row = conn
                .query_row(
                    "SELECT username, d_token, registered_at FROM user_data
                     WHERE phone_number = ?1",
                    [phone_number.as_str()],
                    |row| {
                        Ok((
                            row.get::<_, String>(0)?,
                            row.get::<_, i64>(1)?,
                            row.get::<_, String>(2)?,
                        ))
                    },
                )
                .optional()?;

            let Some((username, d_token, registered_at)) = row else {
                return Ok(None);
            };

            let registered_at = DateTime::parse_from_rfc3339(&registered_at)
                .map_err(|e| StorageError::Corrupt(format!("registered_at: {e}")))?
                .with_timezone(&Utc);

            Ok(Some(UserRecord {
                username,
                phone_number,
                d_token: token_from_column(d_token)?,
                registered_at,
            }))
        })
        .await
    }

    #[instrument(skip(self))]
    async fn token_exists(&self, token: DToken) -> Result<bool, StorageError> {
        self.run(move |conn| {
            let found = conn
                .query_row(
                    "SELECT 1 FROM user_data WHERE d_token = ?1",
                    [token.get() as i64],
                    |_| Ok(()),
                )
                .optional()?;
            Ok(found.is_some())
        })
        .await
    }

    #[instrument(skip(self))]
    async fn upsert(
        &self,
        username: &str,
        phone: &PhoneNumber,
        token: DToken,
    ) -> Result<(), StorageError> {
        let username = username.to_owned();
        let phone = phone.as_str().to_owned();

        self.run(move |conn| {
            let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

            match select_token(&tx, &phone)? {
                Some(current) if current == token => {}
                Some(_) => {
                    tx.execute(
                        "UPDATE user_data SET d_token = ?1 WHERE phone_number = ?2",
                        params![token.get() as i64, phone],
                    )
                    .map_err(|e| write_error(e, token))?;
                }
                None => insert_row(&tx, &username, &phone, token)?,
            }

            tx.commit()?;
            Ok(())
        })
        .await
    }

    #[instrument(skip(self))]
    async fn insert_if_absent(
        &self,
        username: &str,
        phone: &PhoneNumber,
        token: DToken,
    ) -> Result<Registration, StorageError> {
        let username = username.to_owned();
        let phone = phone.as_str().to_owned();

        self.run(move |conn| {
            let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

            let outcome = match select_token(&tx, &phone)? {
                Some(existing) => Registration::Existing(existing),
                None => {
                    insert_row(&tx, &username, &phone, token)?;
                    Registration::Created(token)
                }
            };

            tx.commit()?;
            Ok(outcome)
        })
        .await
    }

    async fn count(&self) -> Result<usize, StorageError> {
        self.run(|conn| {
            let count: i64 = conn.query_row("SELECT COUNT(*) FROM user_data", [], |row| row.get(0))?;
            usize::try_from(count).map_err(|_| StorageError::Corrupt(format!("row count {count}")))
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;
    use tempfile::TempDir;

    fn phone(s: &str) -> PhoneNumber {
        PhoneNumber::parse(s).unwrap()
    }

    fn token(v: u64) -> DToken {
        DToken::new(v).unwrap()
    }

    async fn open_temp() -> (TempDir, SqliteStore) {
        let dir = tempfile::tempdir().unwrap();
        let store = SqliteStore::open(dir.path().join("dtoken.db"), PoolOptions::default())
            .await
            .unwrap();
        (dir, store)
    }

    #[tokio::test]
    async fn test_schema_version_set() {
        let (dir, _store) = open_temp().await;
        let conn = Connection::open(dir.path().join("dtoken.db")).unwrap();
        let version: u32 = conn
            .pragma_query_value(None, "user_version", |row| row.get(0))
            .unwrap();
        assert_eq!(version, SCHEMA_VERSION);
    }

    #[tokio::test]
    async fn test_newer_schema_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("dtoken.db");
        {
            let conn = Connection::open(&path).unwrap();
            conn.pragma_update(None, "user_version", SCHEMA_VERSION + 1).unwrap();
        }

        let result = SqliteStore::open(&path, PoolOptions::default()).await;
        assert!(matches!(result, Err(StorageError::Migration(_))));
    }

    #[tokio::test]
    async fn test_insert_and_lookup() {
        let (_dir, store) = open_temp().await;
        let p = phone("5551234567");

        let outcome = store
            .insert_if_absent("alice", &p, token(1_234_567_890))
            .await
            .unwrap();
        assert_eq!(outcome, Registration::Created(token(1_234_567_890)));

        assert_eq!(
            store.find_token_by_phone(&p).await.unwrap(),
            Some(token(1_234_567_890))
        );
        assert!(store.token_exists(token(1_234_567_890)).await.unwrap());
        assert!(!store.token_exists(token(1_234_567_891)).await.unwrap());

        let record = store.find_by_phone(&p).await.unwrap().unwrap();
        assert_eq!(record.username, "alice");
        assert_eq!(record.phone_number, p);
        assert_eq!(record.d_token, token(1_234_567_890));
    }

    #[tokio::test]
    async fn test_insert_if_absent_returns_existing() {
        let (_dir, store) = open_temp().await;
        let p = phone("5551234567");

        store.insert_if_absent("alice", &p, token(1_111_111_111)).await.unwrap();
        let second = store
            .insert_if_absent("bob", &p, token(2_222_222_222))
            .await
            .unwrap();

        assert_eq!(second, Registration::Existing(token(1_111_111_111)));
        assert_eq!(store.count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_token_conflict_detected() {
        let (_dir, store) = open_temp().await;
        store
            .insert_if_absent("alice", &phone("5550000001"), token(3_000_000_000))
            .await
            .unwrap();

        let result = store
            .insert_if_absent("bob", &phone("5550000002"), token(3_000_000_000))
            .await;
        assert!(matches!(result, Err(StorageError::TokenConflict(t)) if t == token(3_000_000_000)));

        let result = store
            .upsert("bob", &phone("5550000002"), token(3_000_000_000))
            .await;
        assert!(matches!(result, Err(StorageError::TokenConflict(_))));
        assert_eq!(store.count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_upsert_overwrites_token() {
        let (_dir, store) = open_temp().await;
        let p = phone("5551234567");

        store.upsert("alice", &p, token(1_000_000_001)).await.unwrap();
        store.upsert("alice", &p, token(1_000_000_001)).await.unwrap();
        assert_eq!(store.count().await.unwrap(), 1);

        store.upsert("alice", &p, token(1_000_000_002)).await.unwrap();
        assert_eq!(
            store.find_token_by_phone(&p).await.unwrap(),
            Some(token(1_000_000_002))
        );
        assert!(!store.token_exists(token(1_000_000_001)).await.unwrap());
    }

    #[tokio::test]
    async fn test_records_survive_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("dtoken.db");
        let p = phone("5551234567");

        {
            let store = SqliteStore::open(&path, PoolOptions::default()).await.unwrap();
            store.insert_if_absent("alice", &p, token(7_777_777_777)).await.unwrap();
        }

        let store = SqliteStore::open(&path, PoolOptions::default()).await.unwrap();
        assert_eq!(
            store.find_token_by_phone(&p).await.unwrap(),
            Some(token(7_777_777_777))
        );
    }

    #[tokio::test]
    async fn test_concurrent_same_phone_single_record() {
        let (_dir, store) = open_temp().await;
        let p = phone("5551234567");

        let attempts = (0..8u64).map(|i| {
            let store = store.clone();
            let p = p.clone();
            async move {
                store
                    .insert_if_absent(&format!("user{i}"), &p, token(2_000_000_000 + i))
                    .await
                    .unwrap()
            }
        });
        let outcomes = futures::future::join_all(attempts).await;

        let created = outcomes.iter().filter(|o| o.is_created()).count();
        let tokens: HashSet<DToken> = outcomes.iter().map(|o| o.token()).collect();

        assert_eq!(created, 1);
        assert_eq!(tokens.len(), 1);
        assert_eq!(store.count().await.unwrap(), 1);
    }
}
