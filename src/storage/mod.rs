//! `SQLite` storage with `sqlite-vec` for vector search.
//!
//! This module provides persistent storage for:
//! - Document chunks with embeddings (the document collection)
//! - Tracked file records (the metadata collection)

mod chunks;
mod connection;
mod file_records;
mod index;
mod models;
mod schema;
mod search;
mod vector;

pub use chunks::{
    chunk_counts_by_file, count_chunks, delete_chunks, delete_chunks_by_file_id, get_chunks,
    insert_chunk,
};
pub use connection::Database;
pub use file_records::{
    count_file_records, delete_file_record, get_file_record, list_file_records,
    upsert_file_record, MetadataStats, MetadataStore,
};
pub use index::{SqliteVectorIndex, VectorIndex};
pub use models::{ChunkFilter, ChunkMetadata, ChunkRecord, FileRecord, QueryHit};
pub use schema::{
    migrate, verify_schema, DOCUMENTS_TABLE, EMBEDDINGS_TABLE, METADATA_TABLE, SCHEMA_VERSION,
};
pub use search::search_chunks;
pub use vector::load_extension;

/// Initialize storage with migrations.
///
/// # Errors
///
/// Returns an error if sqlite-vec is unavailable or migrations fail.
pub fn init_storage(db: &Database) -> crate::Result<()> {
    db.with_conn(|conn| {
        load_extension(conn)?;
        migrate(conn)?;
        verify_schema(conn)?;

        tracing::info!("Storage initialized, schema version {SCHEMA_VERSION}");
        Ok(())
    })
}
