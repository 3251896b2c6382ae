//! Vector index abstraction and its `SQLite` implementation.
//!
//! The synchronizer only talks to [`VectorIndex`]. [`SqliteVectorIndex`]
//! keeps chunk rows and their embeddings in the shared database and swaps
//! a file's chunk set inside one transaction.

use std::collections::HashMap;
use std::sync::Arc;

use super::chunks::{
    chunk_counts_by_file, count_chunks, count_chunks_for_file, delete_chunks,
    delete_chunks_by_file_id, get_chunks, insert_chunk,
};
use super::connection::Database;
use super::models::{ChunkFilter, ChunkRecord, QueryHit};
use super::schema::{create_document_collection, drop_collection, DOCUMENTS_TABLE, EMBEDDINGS_TABLE};
use super::search::search_chunks;
use super::vector::{create_vec_table, drop_vec_table};
use crate::embeddings::Embedder;
use crate::error::StorageError;
use crate::Result;

/// Persistent collection of chunks searchable by similarity.
///
/// Implementations must be safe to share across worker tasks. Calls are
/// blocking; async callers go through `spawn_blocking`.
pub trait VectorIndex: Send + Sync {
    /// Collection name, for status output.
    fn name(&self) -> &str;

    /// Store chunks and return their ids.
    ///
    /// # Errors
    ///
    /// Returns an error if the chunks cannot be stored.
    fn add(&self, chunks: &[ChunkRecord]) -> Result<Vec<String>>;

    /// Up to `k` chunks nearest to `text`, closest first.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    fn query(&self, text: &str, k: usize) -> Result<Vec<QueryHit>>;

    /// Delete chunks by id. Unknown ids are ignored.
    ///
    /// # Errors
    ///
    /// Returns an error if the deletion fails.
    fn delete(&self, ids: &[String]) -> Result<usize>;

    /// Chunks matching `filter`.
    ///
    /// # Errors
    ///
    /// Returns an error if the lookup fails.
    fn get(&self, filter: &ChunkFilter) -> Result<Vec<ChunkRecord>>;

    /// Total number of stored chunks.
    ///
    /// # Errors
    ///
    /// Returns an error if the count fails.
    fn count(&self) -> Result<usize>;

    /// Drop every chunk and recreate the collection empty.
    ///
    /// # Errors
    ///
    /// Returns an error if the collection cannot be recreated.
    fn clear(&self) -> Result<()>;

    /// Delete every chunk matching `filter`.
    ///
    /// # Errors
    ///
    /// Returns an error if the lookup or deletion fails.
    fn delete_where(&self, filter: &ChunkFilter) -> Result<usize> {
        let ids: Vec<String> = self.get(filter)?.into_iter().map(|c| c.id).collect();
        if ids.is_empty() {
            return Ok(0);
        }
        self.delete(&ids)
    }

    /// Replace all chunks of `file_id` with `chunks`.
    ///
    /// Returns `(removed, added)`.
    ///
    /// # Errors
    ///
    /// Returns an error if the deletion or insertion fails.
    fn replace_file(&self, file_id: &str, chunks: &[ChunkRecord]) -> Result<(usize, usize)> {
        let removed = self.delete_where(&ChunkFilter::file(file_id))?;
        let added = self.add(chunks)?.len();
        Ok((removed, added))
    }

    /// Number of stored chunks per file id.
    ///
    /// # Errors
    ///
    /// Returns an error if the lookup fails.
    fn file_chunk_counts(&self) -> Result<HashMap<String, usize>> {
        let mut counts = HashMap::new();
        for chunk in self.get(&ChunkFilter::all())? {
            *counts.entry(chunk.metadata.file_id).or_default() += 1;
        }
        Ok(counts)
    }
}

/// `SQLite` + sqlite-vec backed [`VectorIndex`].
#[derive(Clone)]
pub struct SqliteVectorIndex {
    db: Database,
    embedder: Arc<dyn Embedder>,
    name: String,
}

impl SqliteVectorIndex {
    /// Open the index over an initialized database.
    ///
    /// Creates the embeddings table sized to the embedder if missing.
    ///
    /// # Errors
    ///
    /// Returns an error if the embeddings table cannot be created.
    pub fn new(db: Database, embedder: Arc<dyn Embedder>, name: impl Into<String>) -> Result<Self> {
        let dimension = embedder.dimension();
        db.with_conn(|conn| create_vec_table(conn, EMBEDDINGS_TABLE, dimension))?;

        Ok(Self {
            db,
            embedder,
            name: name.into(),
        })
    }

    fn embed_chunks(&self, chunks: &[ChunkRecord]) -> Result<Vec<Vec<f32>>> {
        let texts: Vec<String> = chunks.iter().map(|c| c.content.clone()).collect();
        let embeddings = self.embedder.embed(&texts)?;
        if embeddings.len() != chunks.len() {
            return Err(StorageError::Embedding(format!(
                "expected {} embeddings, got {}",
                chunks.len(),
                embeddings.len()
            ))
            .into());
        }
        Ok(embeddings)
    }

    fn insert_all(
        conn: &rusqlite::Connection,
        chunks: &[ChunkRecord],
        embeddings: &[Vec<f32>],
    ) -> Result<Vec<String>> {
        let mut ids = Vec::with_capacity(chunks.len());
        for (chunk, embedding) in chunks.iter().zip(embeddings) {
            insert_chunk(conn, chunk, Some(embedding))?;
            ids.push(chunk.id.clone());
        }
        Ok(ids)
    }
}

impl VectorIndex for SqliteVectorIndex {
    fn name(&self) -> &str {
        &self.name
    }

    fn add(&self, chunks: &[ChunkRecord]) -> Result<Vec<String>> {
        if chunks.is_empty() {
            return Ok(Vec::new());
        }
        let embeddings = self.embed_chunks(chunks)?;
        let ids = self
            .db
            .with_transaction(|conn| Self::insert_all(conn, chunks, &embeddings))?;

        tracing::debug!(count = ids.len(), "Added chunks");
        Ok(ids)
    }

    fn query(&self, text: &str, k: usize) -> Result<Vec<QueryHit>> {
        let embedding = self.embedder.embed_one(text)?;
        self.db.with_conn(|conn| search_chunks(conn, &embedding, k))
    }

    fn delete(&self, ids: &[String]) -> Result<usize> {
        self.db.with_transaction(|conn| delete_chunks(conn, ids))
    }

    fn get(&self, filter: &ChunkFilter) -> Result<Vec<ChunkRecord>> {
        self.db
            .with_conn(|conn| get_chunks(conn, filter.file_id.as_deref()))
    }

    fn count(&self) -> Result<usize> {
        self.db.with_conn(count_chunks)
    }

    fn clear(&self) -> Result<()> {
        let dimension = self.embedder.dimension();
        self.db.with_transaction(|conn| {
            drop_vec_table(conn, EMBEDDINGS_TABLE)?;
            drop_collection(conn, DOCUMENTS_TABLE)?;
            create_document_collection(conn)?;
            create_vec_table(conn, EMBEDDINGS_TABLE, dimension)
        })?;

        tracing::info!(collection = %self.name, "Document collection cleared");
        Ok(())
    }

    fn delete_where(&self, filter: &ChunkFilter) -> Result<usize> {
        match filter.file_id.as_deref() {
            Some(file_id) => self
                .db
                .with_transaction(|conn| delete_chunks_by_file_id(conn, file_id)),
            None => {
                let count = self.count()?;
                self.clear()?;
                Ok(count)
            }
        }
    }

    fn replace_file(&self, file_id: &str, chunks: &[ChunkRecord]) -> Result<(usize, usize)> {
        if let Some(stray) = chunks.iter().find(|c| c.file_id() != file_id) {
            return Err(crate::Error::internal(format!(
                "chunk {} belongs to {}, not {file_id}",
                stray.id,
                stray.file_id()
            )));
        }

        let embeddings = self.embed_chunks(chunks)?;
        let (removed, ids) = self.db.with_transaction(|conn| {
            let removed = delete_chunks_by_file_id(conn, file_id)?;
            let ids = Self::insert_all(conn, chunks, &embeddings)?;

            let stored = count_chunks_for_file(conn, file_id)?;
            if stored != ids.len() {
                return Err(StorageError::Database(format!(
                    "{file_id} holds {stored} chunks after swap, expected {}",
                    ids.len()
                ))
                .into());
            }
            Ok((removed, ids))
        })?;

        tracing::debug!(file_id, removed, added = ids.len(), "Replaced file chunks");
        Ok((removed, ids.len()))
    }

    fn file_chunk_counts(&self) -> Result<HashMap<String, usize>> {
        self.db.with_conn(chunk_counts_by_file)
    }
}

impl std::fmt::Debug for SqliteVectorIndex {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqliteVectorIndex")
            .field("name", &self.name)
            .field("db", &self.db)
            .field("dimension", &self.embedder.dimension())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embeddings::HashEmbedder;
    use crate::storage::models::ChunkMetadata;
    use crate::storage::schema::migrate;

    fn setup_index() -> SqliteVectorIndex {
        let db = Database::open_in_memory().unwrap();
        db.with_conn(migrate).unwrap();
        SqliteVectorIndex::new(db, Arc::new(HashEmbedder::new(64)), "documents").unwrap()
    }

    fn chunks(file_id: &str, texts: &[&str]) -> Vec<ChunkRecord> {
        texts
            .iter()
            .enumerate()
            .map(|(i, text)| {
                ChunkRecord::new(
                    *text,
                    ChunkMetadata {
                        file_id: file_id.to_string(),
                        source: format!("/docs/{file_id}.txt"),
                        chunk_id: i,
                        chunk_size: text.chars().count(),
                        page: None,
                    },
                )
            })
            .collect()
    }

    #[test]
    fn test_add_and_count() {
        let index = setup_index();
        let ids = index.add(&chunks("a", &["one", "two"])).unwrap();

        assert_eq!(ids.len(), 2);
        assert_eq!(index.count().unwrap(), 2);
        assert_eq!(index.name(), "documents");
    }

    #[test]
    fn test_add_empty() {
        let index = setup_index();
        assert!(index.add(&[]).unwrap().is_empty());
    }

    #[test]
    fn test_query_finds_relevant_chunk() {
        let index = setup_index();
        index
            .add(&chunks(
                "a",
                &["the cat sat on the mat", "quarterly revenue grew strongly"],
            ))
            .unwrap();

        let hits = index.query("revenue growth quarterly", 1).unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].content, "quarterly revenue grew strongly");
    }

    #[test]
    fn test_replace_file_swaps_chunk_set() {
        let index = setup_index();
        index.add(&chunks("a", &["old one", "old two", "old three"])).unwrap();
        index.add(&chunks("b", &["other"])).unwrap();

        let (removed, added) = index.replace_file("a", &chunks("a", &["new"])).unwrap();
        assert_eq!((removed, added), (3, 1));

        let remaining = index.get(&ChunkFilter::file("a")).unwrap();
        assert_eq!(remaining.len(), 1);
        assert_eq!(remaining[0].content, "new");
        assert_eq!(index.count().unwrap(), 2);
    }

    #[test]
    fn test_replace_file_with_no_chunks_empties_file() {
        let index = setup_index();
        index.add(&chunks("a", &["x", "y"])).unwrap();

        assert_eq!(index.replace_file("a", &[]).unwrap(), (2, 0));
        assert!(index.get(&ChunkFilter::file("a")).unwrap().is_empty());
        assert_eq!(index.file_chunk_counts().unwrap().get("a"), None);
    }

    #[test]
    fn test_replace_file_rejects_foreign_chunks() {
        let index = setup_index();
        index.add(&chunks("a", &["keep me"])).unwrap();

        assert!(index.replace_file("a", &chunks("b", &["wrong"])).is_err());
        assert_eq!(index.get(&ChunkFilter::file("a")).unwrap().len(), 1);
    }

    #[test]
    fn test_delete_where_file() {
        let index = setup_index();
        index.add(&chunks("a", &["x", "y"])).unwrap();
        index.add(&chunks("b", &["z"])).unwrap();

        assert_eq!(index.delete_where(&ChunkFilter::file("a")).unwrap(), 2);
        assert_eq!(index.delete_where(&ChunkFilter::file("a")).unwrap(), 0);
        assert_eq!(index.count().unwrap(), 1);
    }

    #[test]
    fn test_delete_by_ids() {
        let index = setup_index();
        let ids = index.add(&chunks("a", &["x", "y"])).unwrap();

        assert_eq!(index.delete(&ids[..1]).unwrap(), 1);
        assert_eq!(index.count().unwrap(), 1);
    }

    #[test]
    fn test_clear_then_reuse() {
        let index = setup_index();
        index.add(&chunks("a", &["x", "y"])).unwrap();

        index.clear().unwrap();
        assert_eq!(index.count().unwrap(), 0);
        assert!(index.query("x", 3).unwrap().is_empty());

        index.add(&chunks("a", &["z"])).unwrap();
        assert_eq!(index.count().unwrap(), 1);
    }

    #[test]
    fn test_file_chunk_counts() {
        let index = setup_index();
        index.add(&chunks("a", &["x", "y"])).unwrap();
        index.add(&chunks("b", &["z"])).unwrap();

        let counts = index.file_chunk_counts().unwrap();
        assert_eq!(counts.get("a"), Some(&2));
        assert_eq!(counts.get("b"), Some(&1));
    }
}
