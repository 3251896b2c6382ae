//! Metadata collection: one record per tracked source file.

use std::collections::BTreeMap;

use rusqlite::{params, Connection, Row};

use super::connection::Database;
use super::models::FileRecord;
use super::schema::{create_metadata_collection, drop_collection, METADATA_TABLE};
use crate::error::StorageError;
use crate::Result;

const SELECT_COLUMNS: &str =
    "file_id, file_path, file_name, extension, size, mtime, content_hash, chunk_count, indexed_at";

fn row_to_record(row: &Row<'_>) -> rusqlite::Result<FileRecord> {
    let size: i64 = row.get(4)?;
    let chunk_count: i64 = row.get(7)?;
    Ok(FileRecord {
        file_id: row.get(0)?,
        file_path: row.get(1)?,
        file_name: row.get(2)?,
        extension: row.get(3)?,
        size: u64::try_from(size).unwrap_or_default(),
        mtime: row.get(5)?,
        content_hash: row.get(6)?,
        chunk_count: usize::try_from(chunk_count).unwrap_or_default(),
        indexed_at: row.get(8)?,
    })
}

/// Get a file record by id.
///
/// # Errors
///
/// Returns an error if the database query fails.
pub fn get_file_record(conn: &Connection, file_id: &str) -> Result<Option<FileRecord>> {
    let result = conn.query_row(
        &format!("SELECT {SELECT_COLUMNS} FROM file_metadata WHERE file_id = ?"),
        [file_id],
        row_to_record,
    );

    match result {
        Ok(record) => Ok(Some(record)),
        Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
        Err(e) => Err(StorageError::Database(e.to_string()).into()),
    }
}

/// Insert or fully replace a file record.
///
/// # Errors
///
/// Returns an error if the database operation fails.
pub fn upsert_file_record(conn: &Connection, record: &FileRecord) -> Result<()> {
    #[allow(clippy::cast_possible_wrap)]
    conn.execute(
        "INSERT OR REPLACE INTO file_metadata
            (file_id, file_path, file_name, extension, size, mtime, content_hash, chunk_count, indexed_at)
         VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)",
        params![
            record.file_id,
            record.file_path,
            record.file_name,
            record.extension,
            record.size as i64,
            record.mtime,
            record.content_hash,
            record.chunk_count as i64,
            record.indexed_at,
        ],
    )
    .map_err(|e| StorageError::Database(e.to_string()))?;
    Ok(())
}

/// Delete a file record. Returns whether a record existed.
///
/// # Errors
///
/// Returns an error if the database operation fails.
pub fn delete_file_record(conn: &Connection, file_id: &str) -> Result<bool> {
    let deleted = conn
        .execute("DELETE FROM file_metadata WHERE file_id = ?", [file_id])
        .map_err(|e| StorageError::Database(e.to_string()))?;
    Ok(deleted > 0)
}

/// List all file records ordered by path.
///
/// # Errors
///
/// Returns an error if the database query fails.
pub fn list_file_records(conn: &Connection) -> Result<Vec<FileRecord>> {
    let mut stmt = conn
        .prepare(&format!(
            "SELECT {SELECT_COLUMNS} FROM file_metadata ORDER BY file_path"
        ))
        .map_err(|e| StorageError::Database(e.to_string()))?;

    let records = stmt
        .query_map([], row_to_record)
        .map_err(|e| StorageError::Database(e.to_string()))?
        .collect::<std::result::Result<Vec<_>, _>>()
        .map_err(|e| StorageError::Database(e.to_string()))?;

    Ok(records)
}

/// Count tracked files.
///
/// # Errors
///
/// Returns an error if the database query fails.
pub fn count_file_records(conn: &Connection) -> Result<usize> {
    let count: i64 = conn
        .query_row("SELECT COUNT(*) FROM file_metadata", [], |row| row.get(0))
        .map_err(|e| StorageError::Database(e.to_string()))?;
    Ok(usize::try_from(count).unwrap_or_default())
}

/// Aggregate figures over the metadata collection.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MetadataStats {
    /// Number of tracked files.
    pub tracked_files: usize,

    /// Sum of recorded chunk counts.
    pub total_chunks: usize,

    /// Sum of recorded sizes in bytes.
    pub total_size: u64,

    /// Tracked file count per extension.
    pub extensions: BTreeMap<String, usize>,

    /// Most recent `indexed_at` among tracked files.
    pub last_indexed_at: Option<i64>,
}

/// Persistent map `file_id -> FileRecord`.
///
/// Backed by the `file_metadata` table of the shared database. All writes
/// are single statements, so a crash never leaves a half-written record.
#[derive(Debug, Clone)]
pub struct MetadataStore {
    db: Database,
}

impl MetadataStore {
    /// Create a store over an initialized database.
    #[must_use]
    pub const fn new(db: Database) -> Self {
        Self { db }
    }

    /// Fetch the record for `file_id`, if tracked.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be read.
    pub fn get(&self, file_id: &str) -> Result<Option<FileRecord>> {
        self.db.with_conn(|conn| get_file_record(conn, file_id))
    }

    /// Insert or replace the record keyed by its `file_id`.
    ///
    /// # Errors
    ///
    /// Returns an error if the write fails.
    pub fn put(&self, record: &FileRecord) -> Result<()> {
        self.db.with_conn(|conn| upsert_file_record(conn, record))?;
        tracing::trace!(file_id = %record.file_id, path = %record.file_path, "Stored file record");
        Ok(())
    }

    /// Remove the record for `file_id`. Removing an untracked id is a no-op.
    ///
    /// # Errors
    ///
    /// Returns an error if the write fails.
    pub fn delete(&self, file_id: &str) -> Result<bool> {
        self.db.with_conn(|conn| delete_file_record(conn, file_id))
    }

    /// All tracked records.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be read.
    pub fn list_all(&self) -> Result<Vec<FileRecord>> {
        self.db.with_conn(list_file_records)
    }

    /// Number of tracked records.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be read.
    pub fn count(&self) -> Result<usize> {
        self.db.with_conn(count_file_records)
    }

    /// Drop and recreate the collection.
    ///
    /// # Errors
    ///
    /// Returns an error if the collection cannot be recreated.
    pub fn clear(&self) -> Result<()> {
        self.db.with_transaction(|conn| {
            drop_collection(conn, METADATA_TABLE)?;
            create_metadata_collection(conn)
        })?;
        tracing::info!("Metadata collection cleared");
        Ok(())
    }

    /// Aggregate figures for status reporting.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be read.
    pub fn stats(&self) -> Result<MetadataStats> {
        let records = self.list_all()?;
        let mut stats = MetadataStats {
            tracked_files: records.len(),
            ..MetadataStats::default()
        };

        for record in &records {
            stats.total_chunks += record.chunk_count;
            stats.total_size += record.size;
            let extension = if record.extension.is_empty() {
                "(none)".to_string()
            } else {
                record.extension.clone()
            };
            *stats.extensions.entry(extension).or_default() += 1;
            stats.last_indexed_at = stats.last_indexed_at.max(Some(record.indexed_at));
        }

        Ok(stats)
    }
}
