//! Similarity search over the document collection.

use rusqlite::Connection;

use super::chunks::get_chunks_by_rowids;
use super::models::QueryHit;
use super::schema::EMBEDDINGS_TABLE;
use super::vector::search_similar;
use crate::Result;

/// Find the `limit` chunks nearest to `query_embedding`.
///
/// Results are ordered by distance ascending. Vector rows without a
/// matching chunk row are skipped.
///
/// # Errors
///
/// Returns an error if the search fails.
pub fn search_chunks(
    conn: &Connection,
    query_embedding: &[f32],
    limit: usize,
) -> Result<Vec<QueryHit>> {
    let candidates = search_similar(conn, EMBEDDINGS_TABLE, query_embedding, limit)?;
    if candidates.is_empty() {
        return Ok(Vec::new());
    }

    let rowids: Vec<i64> = candidates.iter().map(|(id, _)| *id).collect();
    let mut chunks = get_chunks_by_rowids(conn, &rowids)?;

    let mut hits: Vec<QueryHit> = candidates
        .into_iter()
        .filter_map(|(rowid, distance)| {
            chunks.remove(&rowid).map(|chunk| QueryHit {
                id: chunk.id,
                content: chunk.content,
                metadata: chunk.metadata,
                distance,
            })
        })
        .collect();

    hits.sort_by(|a, b| {
        a.distance
            .partial_cmp(&b.distance)
            .unwrap_or(std::cmp::Ordering::Equal)
    });

    tracing::debug!(count = hits.len(), limit, "Chunk search completed");
    Ok(hits)
}
