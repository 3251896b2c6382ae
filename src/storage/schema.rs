//! Database schema definitions and migrations.
//!
//! Two logically separate collections share one database file:
//! `documents` holds chunks (plus the `document_embeddings` vec0 table),
//! `file_metadata` holds one record per tracked file.

use rusqlite::Connection;

use crate::error::StorageError;
use crate::Result;

/// Current schema version.
pub const SCHEMA_VERSION: i32 = 1;

/// Document (chunk) collection table.
pub const DOCUMENTS_TABLE: &str = "documents";

/// Vector table paired with the document collection.
pub const EMBEDDINGS_TABLE: &str = "document_embeddings";

/// Metadata collection table.
pub const METADATA_TABLE: &str = "file_metadata";

/// Run all pending migrations.
///
/// # Errors
///
/// Returns an error if migrations fail.
pub fn migrate(conn: &Connection) -> Result<()> {
    conn.execute(
        "CREATE TABLE IF NOT EXISTS schema_migrations (
            version INTEGER PRIMARY KEY,
            applied_at INTEGER NOT NULL
        )",
        [],
    )
    .map_err(|e| StorageError::Migration(format!("failed to create migrations table: {e}")))?;

    let current_version = get_current_version(conn)?;
    tracing::debug!(
        current = current_version,
        target = SCHEMA_VERSION,
        "Checking database migrations"
    );

    if current_version < 1 {
        migrate_v1(conn)?;
    }

    Ok(())
}

fn get_current_version(conn: &Connection) -> Result<i32> {
    let result = conn.query_row(
        "SELECT COALESCE(MAX(version), 0) FROM schema_migrations",
        [],
        |row| row.get(0),
    );

    match result {
        Ok(version) => Ok(version),
        Err(rusqlite::Error::QueryReturnedNoRows) => Ok(0),
        Err(e) => Err(StorageError::Migration(format!("failed to get version: {e}")).into()),
    }
}

fn record_migration(conn: &Connection, version: i32) -> Result<()> {
    conn.execute(
        "INSERT INTO schema_migrations (version, applied_at) VALUES (?, ?)",
        rusqlite::params![version, super::models::now_unix()],
    )
    .map_err(|e| StorageError::Migration(format!("failed to record migration: {e}")))?;

    Ok(())
}

/// Migration v1: both collections.
fn migrate_v1(conn: &Connection) -> Result<()> {
    tracing::info!("Applying migration v1: document and metadata collections");

    create_document_collection(conn)?;
    create_metadata_collection(conn)?;

    record_migration(conn, 1)?;
    Ok(())
}

/// Create the document collection table and its indexes.
///
/// # Errors
///
/// Returns an error if the DDL fails.
pub fn create_document_collection(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        r"
        CREATE TABLE IF NOT EXISTS documents (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            chunk_uuid TEXT NOT NULL UNIQUE,
            file_id TEXT NOT NULL,
            source TEXT NOT NULL,
            chunk_index INTEGER NOT NULL,
            chunk_size INTEGER NOT NULL,
            page INTEGER,
            content TEXT NOT NULL,
            indexed_at INTEGER NOT NULL
        );

        CREATE INDEX IF NOT EXISTS idx_documents_file_id ON documents(file_id);
        ",
    )
    .map_err(|e| StorageError::Migration(format!("failed to create document collection: {e}")))?;
    Ok(())
}

/// Create the metadata collection table.
///
/// # Errors
///
/// Returns an error if the DDL fails.
pub fn create_metadata_collection(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        r"
        CREATE TABLE IF NOT EXISTS file_metadata (
            file_id TEXT PRIMARY KEY,
            file_path TEXT NOT NULL UNIQUE,
            file_name TEXT NOT NULL,
            extension TEXT NOT NULL,
            size INTEGER NOT NULL,
            mtime INTEGER NOT NULL,
            content_hash TEXT,
            chunk_count INTEGER NOT NULL DEFAULT 0,
            indexed_at INTEGER NOT NULL
        );
        ",
    )
    .map_err(|e| StorageError::Migration(format!("failed to create metadata collection: {e}")))?;
    Ok(())
}

/// Drop a collection table.
///
/// # Errors
///
/// Returns an error if the table cannot be dropped.
pub fn drop_collection(conn: &Connection, table: &str) -> Result<()> {
    conn.execute(&format!("DROP TABLE IF EXISTS {table}"), [])
        .map_err(|e| StorageError::Database(format!("failed to drop {table}: {e}")))?;
    Ok(())
}

/// Verify all expected tables exist.
///
/// # Errors
///
/// Returns an error if any expected table is missing from the schema.
pub fn verify_schema(conn: &Connection) -> Result<()> {
    for table in [DOCUMENTS_TABLE, METADATA_TABLE] {
        let exists = conn
            .query_row(
                "SELECT 1 FROM sqlite_master WHERE type='table' AND name=?",
                [table],
                |_| Ok(true),
            )
            .unwrap_or(false);

        if !exists {
            return Err(StorageError::Migration(format!("table '{table}' not found")).into());
        }
    }

    tracing::debug!("Schema verification passed");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::Database;

    #[test]
    fn test_migrate_fresh_database() {
        let db = Database::open_in_memory().unwrap();
        db.with_conn(|conn| {
            migrate(conn)?;
            verify_schema(conn)?;
            assert_eq!(get_current_version(conn)?, SCHEMA_VERSION);
            Ok(())
        })
        .unwrap();
    }

    #[test]
    fn test_migrate_is_idempotent() {
        let db = Database::open_in_memory().unwrap();
        db.with_conn(|conn| {
            migrate(conn)?;
            migrate(conn)?;
            assert_eq!(get_current_version(conn)?, SCHEMA_VERSION);
            Ok(())
        })
        .unwrap();
    }

    #[test]
    fn test_verify_detects_dropped_collection() {
        let db = Database::open_in_memory().unwrap();
        db.with_conn(|conn| {
            migrate(conn)?;
            drop_collection(conn, METADATA_TABLE)?;
            assert!(verify_schema(conn).is_err());

            create_metadata_collection(conn)?;
            verify_schema(conn)?;
            Ok(())
        })
        .unwrap();
    }
}
