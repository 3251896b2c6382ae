//! Chunk storage operations.
//!
//! CRUD over the document collection. Every chunk row may have a paired
//! embedding row in the vec0 table keyed by the same rowid.

use std::collections::HashMap;

use rusqlite::{params, Connection, Row};

use super::models::{ChunkMetadata, ChunkRecord};
use super::schema::EMBEDDINGS_TABLE;
use super::vector::{delete_vectors, insert_vector};
use crate::error::StorageError;
use crate::Result;

const SELECT_COLUMNS: &str =
    "id, chunk_uuid, file_id, source, chunk_index, chunk_size, page, content, indexed_at";

/// Insert a chunk, with its embedding if given.
///
/// Returns the assigned rowid.
///
/// # Errors
///
/// Returns an error if the insertion fails.
pub fn insert_chunk(
    conn: &Connection,
    chunk: &ChunkRecord,
    embedding: Option<&[f32]>,
) -> Result<i64> {
    let sql = "
        INSERT INTO documents (chunk_uuid, file_id, source, chunk_index, chunk_size, page, content, indexed_at)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?)
    ";

    #[allow(clippy::cast_possible_wrap)]
    conn.execute(
        sql,
        params![
            chunk.id,
            chunk.metadata.file_id,
            chunk.metadata.source,
            chunk.metadata.chunk_id as i64,
            chunk.metadata.chunk_size as i64,
            chunk.metadata.page,
            chunk.content,
            chunk.indexed_at,
        ],
    )
    .map_err(|e| StorageError::Database(format!("failed to insert chunk: {e}")))?;

    let rowid = conn.last_insert_rowid();

    if let Some(embedding) = embedding {
        insert_vector(conn, EMBEDDINGS_TABLE, rowid, embedding)?;
    }

    tracing::trace!(rowid, file_id = %chunk.metadata.file_id, "Inserted chunk");
    Ok(rowid)
}

fn row_to_chunk(row: &Row<'_>) -> rusqlite::Result<(i64, ChunkRecord)> {
    let chunk_index: i64 = row.get(4)?;
    let chunk_size: i64 = row.get(5)?;
    Ok((
        row.get(0)?,
        ChunkRecord {
            id: row.get(1)?,
            metadata: ChunkMetadata {
                file_id: row.get(2)?,
                source: row.get(3)?,
                chunk_id: usize::try_from(chunk_index).unwrap_or_default(),
                chunk_size: usize::try_from(chunk_size).unwrap_or_default(),
                page: row.get(6)?,
            },
            content: row.get(7)?,
            indexed_at: row.get(8)?,
        },
    ))
}

fn query_chunks(
    conn: &Connection,
    sql: &str,
    params: &[&dyn rusqlite::ToSql],
) -> Result<Vec<(i64, ChunkRecord)>> {
    let mut stmt = conn
        .prepare(sql)
        .map_err(|e| StorageError::Database(format!("failed to prepare query: {e}")))?;

    let rows = stmt
        .query_map(params, row_to_chunk)
        .map_err(|e| StorageError::Database(format!("failed to query chunks: {e}")))?;

    let mut result = Vec::new();
    for row in rows {
        result.push(row.map_err(|e| StorageError::Database(format!("failed to read chunk: {e}")))?);
    }
    Ok(result)
}

/// Get all chunks, optionally restricted to one file, in file/position order.
///
/// # Errors
///
/// Returns an error if the query fails.
pub fn get_chunks(conn: &Connection, file_id: Option<&str>) -> Result<Vec<ChunkRecord>> {
    let rows = match file_id {
        Some(file_id) => {
            let sql = format!(
                "SELECT {SELECT_COLUMNS} FROM documents WHERE file_id = ? ORDER BY chunk_index, id"
            );
            query_chunks(conn, &sql, &[&file_id])?
        }
        None => {
            let sql = format!("SELECT {SELECT_COLUMNS} FROM documents ORDER BY file_id, chunk_index, id");
            query_chunks(conn, &sql, &[])?
        }
    };
    Ok(rows.into_iter().map(|(_, chunk)| chunk).collect())
}

/// Get chunks by rowid, keyed by rowid.
///
/// # Errors
///
/// Returns an error if the query fails.
pub fn get_chunks_by_rowids(conn: &Connection, rowids: &[i64]) -> Result<HashMap<i64, ChunkRecord>> {
    if rowids.is_empty() {
        return Ok(HashMap::new());
    }

    let placeholders = vec!["?"; rowids.len()].join(",");
    let sql = format!("SELECT {SELECT_COLUMNS} FROM documents WHERE id IN ({placeholders})");
    let params: Vec<&dyn rusqlite::ToSql> =
        rowids.iter().map(|id| id as &dyn rusqlite::ToSql).collect();

    Ok(query_chunks(conn, &sql, &params)?.into_iter().collect())
}

fn delete_rowids(conn: &Connection, rowids: &[i64]) -> Result<usize> {
    delete_vectors(conn, EMBEDDINGS_TABLE, rowids)?;

    let mut deleted = 0;
    for rowid in rowids {
        deleted += conn
            .execute("DELETE FROM documents WHERE id = ?", [rowid])
            .map_err(|e| StorageError::Database(format!("failed to delete chunk: {e}")))?;
    }
    Ok(deleted)
}

fn select_rowids(conn: &Connection, sql: &str, param: &str) -> Result<Vec<i64>> {
    let mut stmt = conn
        .prepare(sql)
        .map_err(|e| StorageError::Database(format!("failed to prepare query: {e}")))?;

    let ids = stmt
        .query_map([param], |row| row.get(0))
        .map_err(|e| StorageError::Database(format!("failed to query: {e}")))?
        .collect::<std::result::Result<Vec<i64>, _>>()
        .map_err(|e| StorageError::Database(format!("failed to read rowid: {e}")))?;
    Ok(ids)
}

/// Delete chunks by uuid.
///
/// Returns the number of chunks deleted; unknown ids are ignored.
///
/// # Errors
///
/// Returns an error if the deletion fails.
pub fn delete_chunks(conn: &Connection, chunk_ids: &[String]) -> Result<usize> {
    let mut rowids = Vec::with_capacity(chunk_ids.len());
    for chunk_id in chunk_ids {
        rowids.extend(select_rowids(
            conn,
            "SELECT id FROM documents WHERE chunk_uuid = ?",
            chunk_id,
        )?);
    }
    delete_rowids(conn, &rowids)
}

/// Delete all chunks for a file.
///
/// Returns the number of chunks deleted.
///
/// # Errors
///
/// Returns an error if the deletion fails.
pub fn delete_chunks_by_file_id(conn: &Connection, file_id: &str) -> Result<usize> {
    let rowids = select_rowids(conn, "SELECT id FROM documents WHERE file_id = ?", file_id)?;
    let count = delete_rowids(conn, &rowids)?;

    tracing::debug!(file_id, count, "Deleted chunks for file");
    Ok(count)
}

/// Count total chunks.
///
/// # Errors
///
/// Returns an error if the query fails.
pub fn count_chunks(conn: &Connection) -> Result<usize> {
    let count: i64 = conn
        .query_row("SELECT COUNT(*) FROM documents", [], |row| row.get(0))
        .map_err(|e| StorageError::Database(format!("failed to count chunks: {e}")))?;
    Ok(usize::try_from(count).unwrap_or_default())
}

/// Count chunks for a specific file.
///
/// # Errors
///
/// Returns an error if the query fails.
pub fn count_chunks_for_file(conn: &Connection, file_id: &str) -> Result<usize> {
    let count: i64 = conn
        .query_row(
            "SELECT COUNT(*) FROM documents WHERE file_id = ?",
            [file_id],
            |row| row.get(0),
        )
        .map_err(|e| StorageError::Database(format!("failed to count chunks: {e}")))?;
    Ok(usize::try_from(count).unwrap_or_default())
}

/// Chunk counts grouped by file id.
///
/// # Errors
///
/// Returns an error if the query fails.
pub fn chunk_counts_by_file(conn: &Connection) -> Result<HashMap<String, usize>> {
    let mut stmt = conn
        .prepare("SELECT file_id, COUNT(*) FROM documents GROUP BY file_id")
        .map_err(|e| StorageError::Database(format!("failed to prepare query: {e}")))?;

    let rows = stmt
        .query_map([], |row| Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?)))
        .map_err(|e| StorageError::Database(format!("failed to group chunks: {e}")))?;

    let mut counts = HashMap::new();
    for row in rows {
        let (file_id, count) =
            row.map_err(|e| StorageError::Database(format!("failed to read count: {e}")))?;
        counts.insert(file_id, usize::try_from(count).unwrap_or_default());
    }
    Ok(counts)
}
