//! Shared `SQLite` handle.
//!
//! Both collections live in one database file so a file's chunk swap and
//! its record can be reasoned about against a single store. Access is
//! serialized through a `parking_lot::Mutex`; callers on the async side
//! reach it through `spawn_blocking`.

use parking_lot::Mutex;
use rusqlite::{Connection, OpenFlags};
use std::path::Path;
use std::sync::Arc;

use super::vector::init_sqlite_vec;
use crate::error::StorageError;
use crate::Result;

const PRAGMAS: &str = "
    PRAGMA journal_mode = WAL;
    PRAGMA synchronous = NORMAL;
    PRAGMA temp_store = MEMORY;
    PRAGMA busy_timeout = 5000;
";

/// Database handle. Clones share one connection.
#[derive(Clone)]
pub struct Database {
    conn: Arc<Mutex<Connection>>,
    location: String,
}

impl Database {
    /// Open or create the database file at `path`, creating parent
    /// directories as needed.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be created, opened or configured.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }

        init_sqlite_vec();
        let conn = Connection::open_with_flags(
            path,
            OpenFlags::SQLITE_OPEN_READ_WRITE
                | OpenFlags::SQLITE_OPEN_CREATE
                | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )
        .map_err(|e| {
            StorageError::Database(format!("failed to open {}: {e}", path.display()))
        })?;

        Self::configure(conn, path.display().to_string())
    }

    /// Open a private in-memory database.
    ///
    /// # Errors
    ///
    /// Returns an error if the database cannot be opened.
    pub fn open_in_memory() -> Result<Self> {
        init_sqlite_vec();
        let conn = Connection::open_in_memory()
            .map_err(|e| StorageError::Database(format!("failed to open in-memory database: {e}")))?;

        Self::configure(conn, ":memory:".to_string())
    }

    fn configure(conn: Connection, location: String) -> Result<Self> {
        conn.execute_batch(PRAGMAS)
            .map_err(|e| StorageError::Database(format!("failed to configure database: {e}")))?;

        tracing::debug!(location = %location, "Database opened");
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
            location,
        })
    }

    /// Run `f` with exclusive access to the connection.
    ///
    /// # Errors
    ///
    /// Returns whatever `f` returns.
    pub fn with_conn<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&Connection) -> Result<T>,
    {
        let conn = self.conn.lock();
        f(&conn)
    }

    /// Run `f` inside an immediate transaction, committing on success and
    /// rolling back on error. The lock is held throughout, so other users
    /// of the handle only ever see the before or after state.
    ///
    /// # Errors
    ///
    /// Returns an error if `f` fails or the transaction cannot be begun or
    /// committed.
    pub fn with_transaction<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&Connection) -> Result<T>,
    {
        let conn = self.conn.lock();
        conn.execute_batch("BEGIN IMMEDIATE")
            .map_err(|e| StorageError::Database(format!("failed to begin transaction: {e}")))?;

        let result = f(&conn);
        let end = if result.is_ok() { "COMMIT" } else { "ROLLBACK" };
        if let Err(e) = conn.execute_batch(end) {
            if result.is_ok() {
                return Err(StorageError::Database(format!("failed to commit: {e}")).into());
            }
            tracing::error!(error = %e, "Rollback failed");
        }
        result
    }

    /// File path, or `:memory:`.
    #[must_use]
    pub fn location(&self) -> &str {
        &self.location
    }
}

impl std::fmt::Debug for Database {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Database")
            .field("location", &self.location)
            .finish_non_exhaustive()
    }
}
