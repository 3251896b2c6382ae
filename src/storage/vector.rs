//! sqlite-vec plumbing for the chunk embeddings table.
//!
//! Embeddings live in a vec0 virtual table whose rowid equals the rowid of
//! the owning row in the documents table.

use rusqlite::Connection;
use sqlite_vec::sqlite3_vec_init;
use std::sync::Once;

use crate::error::StorageError;
use crate::Result;

static INIT: Once = Once::new();

/// Register sqlite-vec for every connection opened afterwards.
#[allow(unsafe_code)]
pub fn init_sqlite_vec() {
    INIT.call_once(|| {
        // SAFETY: `sqlite3_vec_init` is the extension entry point exported by
        // sqlite-vec and has the signature `sqlite3_auto_extension` expects.
        #[allow(clippy::missing_transmute_annotations)]
        unsafe {
            rusqlite::ffi::sqlite3_auto_extension(Some(std::mem::transmute(
                sqlite3_vec_init as *const (),
            )));
        }
        tracing::debug!("sqlite-vec registered");
    });
}

/// Check that sqlite-vec is usable on `conn`.
///
/// # Errors
///
/// Returns [`StorageError::Vector`] if the extension is missing.
pub fn load_extension(conn: &Connection) -> Result<()> {
    let version: String = conn
        .query_row("SELECT vec_version()", [], |row| row.get(0))
        .map_err(|e| StorageError::Vector(format!("sqlite-vec unavailable: {e}")))?;
    tracing::debug!(version = %version, "sqlite-vec available");
    Ok(())
}

/// Create the embeddings table with `dimension` floats per row.
///
/// # Errors
///
/// Returns an error if the table cannot be created.
pub fn create_vec_table(conn: &Connection, table: &str, dimension: usize) -> Result<()> {
    conn.execute(
        &format!(
            "CREATE VIRTUAL TABLE IF NOT EXISTS {table} USING vec0(
                id INTEGER PRIMARY KEY,
                embedding FLOAT[{dimension}]
            )"
        ),
        [],
    )
    .map_err(|e| StorageError::Vector(format!("failed to create {table}: {e}")))?;
    Ok(())
}

/// Drop the embeddings table if present.
///
/// # Errors
///
/// Returns an error if the table cannot be dropped.
pub fn drop_vec_table(conn: &Connection, table: &str) -> Result<()> {
    conn.execute(&format!("DROP TABLE IF EXISTS {table}"), [])
        .map_err(|e| StorageError::Vector(format!("failed to drop {table}: {e}")))?;
    Ok(())
}

/// Store `embedding` under `rowid`.
///
/// # Errors
///
/// Returns an error if the insert fails, including a dimension mismatch.
pub fn insert_vector(conn: &Connection, table: &str, rowid: i64, embedding: &[f32]) -> Result<()> {
    conn.execute(
        &format!("INSERT INTO {table} (id, embedding) VALUES (?1, ?2)"),
        rusqlite::params![rowid, to_blob(embedding)],
    )
    .map_err(|e| StorageError::Vector(format!("failed to insert embedding {rowid}: {e}")))?;
    Ok(())
}

/// Up to `limit` nearest rowids to `query`, as `(rowid, distance)`,
/// closest first.
///
/// # Errors
///
/// Returns an error if the KNN query fails.
pub fn search_similar(
    conn: &Connection,
    table: &str,
    query: &[f32],
    limit: usize,
) -> Result<Vec<(i64, f32)>> {
    if limit == 0 {
        return Ok(Vec::new());
    }

    let mut stmt = conn
        .prepare(&format!(
            "SELECT id, distance FROM {table}
             WHERE embedding MATCH ?1 AND k = ?2
             ORDER BY distance"
        ))
        .map_err(|e| StorageError::Vector(format!("failed to prepare KNN query: {e}")))?;

    let k = i64::try_from(limit).unwrap_or(i64::MAX);
    let rows = stmt
        .query_map(rusqlite::params![to_blob(query), k], |row| {
            Ok((row.get::<_, i64>(0)?, row.get::<_, f32>(1)?))
        })
        .map_err(|e| StorageError::Vector(format!("KNN query failed: {e}")))?;

    rows.collect::<std::result::Result<Vec<_>, _>>()
        .map_err(|e| StorageError::Vector(format!("failed to read KNN row: {e}")).into())
}

/// Remove the embeddings stored under `rowids`. Unknown rowids are ignored.
///
/// # Errors
///
/// Returns an error if a deletion fails.
pub fn delete_vectors(conn: &Connection, table: &str, rowids: &[i64]) -> Result<()> {
    if rowids.is_empty() {
        return Ok(());
    }

    let mut stmt = conn
        .prepare(&format!("DELETE FROM {table} WHERE id = ?1"))
        .map_err(|e| StorageError::Vector(format!("failed to prepare delete: {e}")))?;
    for rowid in rowids {
        stmt.execute([rowid])
            .map_err(|e| StorageError::Vector(format!("failed to delete embedding {rowid}: {e}")))?;
    }
    Ok(())
}

fn to_blob(v: &[f32]) -> Vec<u8> {
    v.iter().flat_map(|f| f.to_le_bytes()).collect()
}
