//! SQLite connection handle shared by every phase of a migration run.

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use rusqlite::{Connection, ErrorCode};
use thiserror::Error;
use tracing::debug;

/// Database error types.
#[derive(Error, Debug)]
pub enum DbError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("Migration error: {0}")]
    Migration(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Connection unavailable: {0}")]
    Unavailable(String),
}

/// Result type for database operations.
pub type DbResult<T> = Result<T, DbError>;

impl DbError {
    /// Whether the error means the destination itself is unusable, as
    /// opposed to a problem with the row being written.
    pub fn is_fatal(&self) -> bool {
        match self {
            Self::Sqlite(rusqlite::Error::SqliteFailure(err, _)) => matches!(
                err.code,
                ErrorCode::CannotOpen
                    | ErrorCode::DatabaseCorrupt
                    | ErrorCode::NotADatabase
                    | ErrorCode::ReadOnly
                    | ErrorCode::DiskFull
                    | ErrorCode::SystemIoFailure
                    | ErrorCode::PermissionDenied
                    | ErrorCode::DatabaseBusy
                    | ErrorCode::DatabaseLocked
                    | ErrorCode::OutOfMemory
            ),
            Self::Sqlite(_) | Self::NotFound(_) => false,
            Self::Migration(_) | Self::Unavailable(_) => true,
        }
    }
}

/// A single SQLite connection behind a mutex.
///
/// The destination is owned exclusively by the migration run, so one
/// serialized connection is all the writer needs. Each `with_conn` call
/// holds the lock for the duration of the closure only.
#[derive(Clone)]
pub struct DbPool {
    conn: Arc<Mutex<Connection>>,
    path: Option<PathBuf>,
}

impl DbPool {
    /// Open (or create) a database file.
    pub fn open(path: &Path) -> DbResult<Self> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).map_err(|e| {
                    DbError::Unavailable(format!("cannot create {}: {}", parent.display(), e))
                })?;
            }
        }

        let conn = Connection::open(path)?;
        conn.execute_batch(
            "PRAGMA journal_mode = WAL; \
             PRAGMA synchronous = NORMAL; \
             PRAGMA foreign_keys = ON;",
        )?;
        debug!(path = %path.display(), "Opened SQLite database");

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
            path: Some(path.to_path_buf()),
        })
    }

    /// Open a private in-memory database.
    pub fn in_memory() -> DbResult<Self> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
            path: None,
        })
    }

    /// Database file, or `None` for in-memory databases.
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Run a closure with shared access to the connection.
    pub fn with_conn<F, T>(&self, f: F) -> DbResult<T>
    where
        F: FnOnce(&Connection) -> DbResult<T>,
    {
        let conn = self
            .conn
            .lock()
            .map_err(|_| DbError::Unavailable("connection lock poisoned".to_string()))?;
        f(&conn)
    }

    /// Run a closure with exclusive access to the connection.
    pub fn with_conn_mut<F, T>(&self, f: F) -> DbResult<T>
    where
        F: FnOnce(&mut Connection) -> DbResult<T>,
    {
        let mut conn = self
            .conn
            .lock()
            .map_err(|_| DbError::Unavailable("connection lock poisoned".to_string()))?;
        f(&mut conn)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_foreign_keys_enabled() {
        let pool = DbPool::in_memory().unwrap();
        let enabled: i64 = pool
            .with_conn(|conn| Ok(conn.query_row("PRAGMA foreign_keys", [], |row| row.get(0))?))
            .unwrap();
        assert_eq!(enabled, 1);
    }

    #[test]
    fn test_open_creates_parent_dirs() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested/dir/intel.db");
        let pool = DbPool::open(&path).unwrap();
        assert!(path.exists());
        assert_eq!(pool.path(), Some(path.as_path()));
    }

    #[test]
    fn test_error_classification() {
        let constraint = DbError::Sqlite(rusqlite::Error::SqliteFailure(
            rusqlite::ffi::Error::new(rusqlite::ffi::SQLITE_CONSTRAINT),
            None,
        ));
        assert!(!constraint.is_fatal());

        let cannot_open = DbError::Sqlite(rusqlite::Error::SqliteFailure(
            rusqlite::ffi::Error::new(rusqlite::ffi::SQLITE_CANTOPEN),
            None,
        ));
        assert!(cannot_open.is_fatal());
        assert!(DbError::Unavailable("gone".into()).is_fatal());
    }
}
