//! Database connection and initialization.
//!
//! Provides a thread-safe wrapper around rusqlite for async operations.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use rusqlite::{ffi, Connection, ErrorCode, TransactionBehavior};
use thiserror::Error;
use tokio::sync::Mutex;

use super::schema;
use crate::config::DatabaseSettings;
use crate::domain::EmailActionStatus;

/// Errors that can occur during database operations.
#[derive(Debug, Error)]
pub enum DatabaseError {
    #[error("SQLite error: {0}")]
    Sqlite(rusqlite::Error),

    #[error("{entity} not found: {key}")]
    NotFound { entity: &'static str, key: String },

    #[error("Unique constraint violated: {0}")]
    UniqueViolation(String),

    #[error("Foreign key constraint violated: {0}")]
    ForeignKeyViolation(String),

    #[error("Action {id} cannot move from {from} to {to}")]
    InvalidTransition {
        id: String,
        from: EmailActionStatus,
        to: EmailActionStatus,
    },

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Migration failed: {0}")]
    MigrationFailed(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Blocking task failed: {0}")]
    TaskFailed(String),
}

impl DatabaseError {
    pub(crate) fn not_found(entity: &'static str, key: impl Into<String>) -> Self {
        Self::NotFound {
            entity,
            key: key.into(),
        }
    }

    /// Returns true for unique or primary key violations.
    pub fn is_unique_violation(&self) -> bool {
        matches!(self, Self::UniqueViolation(_))
    }

    /// Returns true for foreign key violations.
    pub fn is_foreign_key_violation(&self) -> bool {
        matches!(self, Self::ForeignKeyViolation(_))
    }

    /// Returns true if a record lookup came back empty.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }
}

impl From<rusqlite::Error> for DatabaseError {
    fn from(err: rusqlite::Error) -> Self {
        if let rusqlite::Error::SqliteFailure(code, message) = &err {
            if code.code == ErrorCode::ConstraintViolation {
                let detail = message.clone().unwrap_or_else(|| code.to_string());
                match code.extended_code {
                    ffi::SQLITE_CONSTRAINT_UNIQUE | ffi::SQLITE_CONSTRAINT_PRIMARYKEY => {
                        return Self::UniqueViolation(detail);
                    }
                    ffi::SQLITE_CONSTRAINT_FOREIGNKEY => {
                        return Self::ForeignKeyViolation(detail);
                    }
                    _ => {}
                }
            }
        }
        Self::Sqlite(err)
    }
}

/// Result type for database operations.
pub type Result<T> = std::result::Result<T, DatabaseError>;

/// How a transaction acquires the database lock.
///
/// SQLite transactions are always serializable; the behavior only decides
/// when the write lock is taken.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TxBehavior {
    /// Take locks lazily on first read or write.
    #[default]
    Deferred,
    /// Take the write lock at `BEGIN`.
    Immediate,
    /// Take an exclusive lock at `BEGIN`.
    Exclusive,
}

impl From<TxBehavior> for TransactionBehavior {
    fn from(behavior: TxBehavior) -> Self {
        match behavior {
            TxBehavior::Deferred => TransactionBehavior::Deferred,
            TxBehavior::Immediate => TransactionBehavior::Immediate,
            TxBehavior::Exclusive => TransactionBehavior::Exclusive,
        }
    }
}

/// Thread-safe database connection wrapper.
///
/// Uses a Mutex to ensure only one operation accesses the connection at a time.
/// All operations are run via `spawn_blocking` to avoid blocking the async runtime.
#[derive(Clone)]
pub struct Database {
    conn: Arc<Mutex<Connection>>,
    path: Option<PathBuf>,
}

impl Database {
    /// Opens a database at the given path with default settings.
    pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
        Self::open_with(path, &DatabaseSettings::default()).await
    }

    /// Opens a database at the given path, creating it if necessary.
    ///
    /// Runs migrations to ensure the schema is up to date.
    pub async fn open_with(path: impl AsRef<Path>, settings: &DatabaseSettings) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let busy_timeout = Duration::from_millis(settings.busy_timeout_ms);
        let wal = settings.wal;

        let conn_path = path.clone();
        let conn = tokio::task::spawn_blocking(move || -> Result<Connection> {
            if let Some(parent) = conn_path.parent() {
                if !parent.as_os_str().is_empty() {
                    std::fs::create_dir_all(parent)?;
                }
            }

            let conn = Connection::open(&conn_path)?;
            conn.busy_timeout(busy_timeout)?;
            conn.execute_batch("PRAGMA foreign_keys = ON;")?;
            if wal {
                conn.execute_batch("PRAGMA journal_mode = WAL;")?;
            }
            Ok(conn)
        })
        .await
        .map_err(|e| DatabaseError::TaskFailed(e.to_string()))??;

        let db = Self {
            conn: Arc::new(Mutex::new(conn)),
            path: Some(path),
        };

        db.run_migrations().await?;
        tracing::info!(path = ?db.path, "database ready");

        Ok(db)
    }

    /// Opens an in-memory database for testing.
    pub async fn open_in_memory() -> Result<Self> {
        let conn = tokio::task::spawn_blocking(|| -> Result<Connection> {
            let conn = Connection::open_in_memory()?;
            conn.execute_batch("PRAGMA foreign_keys = ON;")?;
            Ok(conn)
        })
        .await
        .map_err(|e| DatabaseError::TaskFailed(e.to_string()))??;

        let db = Self {
            conn: Arc::new(Mutex::new(conn)),
            path: None,
        };

        db.run_migrations().await?;

        Ok(db)
    }

    /// Returns the database file path, or `None` for in-memory databases.
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Runs all schema migrations.
    async fn run_migrations(&self) -> Result<()> {
        self.with_conn(|conn| schema::migrate(conn)).await
    }

    /// Returns the schema version recorded in the database.
    pub async fn schema_version(&self) -> Result<u32> {
        self.with_conn(|conn| schema::current_version(conn)).await
    }

    /// Executes a function with access to the database connection.
    ///
    /// The function runs in a blocking task to avoid blocking the async runtime.
    pub async fn with_conn<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&Connection) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let conn = self.conn.clone();

        tokio::task::spawn_blocking(move || {
            let conn = conn.blocking_lock();
            f(&conn)
        })
        .await
        .map_err(|e| DatabaseError::TaskFailed(e.to_string()))?
    }

    /// Executes a function with mutable access to the database connection.
    pub async fn with_conn_mut<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&mut Connection) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let conn = self.conn.clone();

        tokio::task::spawn_blocking(move || {
            let mut conn = conn.blocking_lock();
            f(&mut conn)
        })
        .await
        .map_err(|e| DatabaseError::TaskFailed(e.to_string()))?
    }

    /// Executes a deferred transaction with the given function.
    ///
    /// The transaction is automatically committed on success or rolled back on error.
    pub async fn transaction<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&rusqlite::Transaction<'_>) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        self.transaction_with(TxBehavior::Deferred, f).await
    }

    /// Executes a transaction using the given locking behavior.
    pub async fn transaction_with<F, T>(&self, behavior: TxBehavior, f: F) -> Result<T>
    where
        F: FnOnce(&rusqlite::Transaction<'_>) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        self.with_conn_mut(move |conn| {
            let tx = conn.transaction_with_behavior(behavior.into())?;
            let result = f(&tx)?;
            tx.commit()?;
            Ok(result)
        })
        .await
    }
}

impl std::fmt::Debug for Database {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Database")
            .field("path", &self.path)
            .finish_non_exhaustive()
    }
}
