//! Data models for storage operations.
//!
//! This module defines the core data structures used for:
//! - Tracked file records (the metadata collection)
//! - Document chunks (the document collection)
//! - Similarity query hits

use serde::{Deserialize, Serialize};
use std::time::{SystemTime, UNIX_EPOCH};

/// Get current Unix timestamp.
pub(crate) fn now_unix() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| i64::try_from(d.as_secs()).unwrap_or(0))
        .unwrap_or(0)
}

/// Last-known state of a tracked source file.
///
/// Exactly one record exists per tracked `file_id`, and `chunk_count`
/// matches the number of chunks tagged with that id once a pass completes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileRecord {
    /// Deterministic identifier derived from the absolute path.
    pub file_id: String,

    /// Absolute path of the file.
    pub file_path: String,

    /// Final path component.
    pub file_name: String,

    /// Lower-case extension with leading dot (empty if none).
    pub extension: String,

    /// Size in bytes at last successful index.
    pub size: u64,

    /// Modification time in nanoseconds since the Unix epoch.
    pub mtime: i64,

    /// BLAKE3 hex digest of the content, if it could be computed.
    pub content_hash: Option<String>,

    /// Number of chunks stored for this file.
    pub chunk_count: usize,

    /// Unix timestamp of the last successful index.
    pub indexed_at: i64,
}

impl FileRecord {
    /// Create a new file record stamped with the current time.
    #[must_use]
    pub fn new(
        file_id: impl Into<String>,
        file_path: impl Into<String>,
        size: u64,
        mtime: i64,
        content_hash: Option<String>,
        chunk_count: usize,
    ) -> Self {
        let file_path = file_path.into();
        let path = std::path::Path::new(&file_path);
        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default();
        let extension = path
            .extension()
            .map(|e| format!(".{}", e.to_string_lossy().to_lowercase()))
            .unwrap_or_default();

        Self {
            file_id: file_id.into(),
            file_path,
            file_name,
            extension,
            size,
            mtime,
            content_hash,
            chunk_count,
            indexed_at: now_unix(),
        }
    }
}

/// Metadata carried by every stored chunk.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkMetadata {
    /// Back-reference to the owning file record. Not enforced by the store.
    pub file_id: String,

    /// Source path the chunk was loaded from.
    pub source: String,

    /// Position of the chunk within its file (0-based).
    pub chunk_id: usize,

    /// Length of the chunk content in characters.
    pub chunk_size: usize,

    /// Page number for paginated sources (0-based).
    pub page: Option<u32>,
}

/// A chunk stored in the document collection.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChunkRecord {
    /// Globally unique identifier, never reused.
    pub id: String,

    /// Text payload.
    pub content: String,

    /// Chunk metadata.
    pub metadata: ChunkMetadata,

    /// Unix timestamp when this chunk was stored.
    pub indexed_at: i64,
}

impl ChunkRecord {
    /// Create a chunk with a freshly generated id.
    #[must_use]
    pub fn new(content: impl Into<String>, metadata: ChunkMetadata) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            content: content.into(),
            metadata,
            indexed_at: now_unix(),
        }
    }

    /// Owning file id.
    #[must_use]
    pub fn file_id(&self) -> &str {
        &self.metadata.file_id
    }
}

/// A ranked similarity match.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryHit {
    /// Chunk identifier.
    pub id: String,

    /// Chunk content.
    pub content: String,

    /// Chunk metadata.
    pub metadata: ChunkMetadata,

    /// Raw distance from the query embedding (lower is closer).
    pub distance: f32,
}

/// Filter for chunk lookups and bulk deletion.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChunkFilter {
    /// Restrict to chunks of one file.
    pub file_id: Option<String>,
}

impl ChunkFilter {
    /// Match every chunk.
    #[must_use]
    pub fn all() -> Self {
        Self::default()
    }

    /// Match chunks of a single file.
    #[must_use]
    pub fn file(file_id: impl Into<String>) -> Self {
        Self {
            file_id: Some(file_id.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn metadata(file_id: &str, chunk_id: usize) -> ChunkMetadata {
        ChunkMetadata {
            file_id: file_id.to_string(),
            source: "/docs/a.txt".to_string(),
            chunk_id,
            chunk_size: 7,
            page: None,
        }
    }

    #[test]
    fn test_file_record_new() {
        let record = FileRecord::new("abc", "/docs/Report.PDF", 1024, 42, None, 3);

        assert_eq!(record.file_id, "abc");
        assert_eq!(record.file_name, "Report.PDF");
        assert_eq!(record.extension, ".pdf");
        assert_eq!(record.size, 1024);
        assert_eq!(record.mtime, 42);
        assert_eq!(record.chunk_count, 3);
        assert!(record.content_hash.is_none());
        assert!(record.indexed_at > 0);
    }

    #[test]
    fn test_file_record_without_extension() {
        let record = FileRecord::new("abc", "/docs/README", 1, 1, None, 0);
        assert_eq!(record.extension, "");
        assert_eq!(record.file_name, "README");
    }

    #[test]
    fn test_chunk_ids_are_unique() {
        let a = ChunkRecord::new("content", metadata("f", 0));
        let b = ChunkRecord::new("content", metadata("f", 0));

        assert_ne!(a.id, b.id);
        assert_eq!(a.file_id(), "f");
    }

    #[test]
    fn test_chunk_filter() {
        assert!(ChunkFilter::all().file_id.is_none());
        assert_eq!(ChunkFilter::file("x").file_id.as_deref(), Some("x"));
    }

    #[test]
    fn test_chunk_serialization() {
        let chunk = ChunkRecord::new("hello", metadata("f", 2));
        let json = serde_json::to_string(&chunk).unwrap();
        let back: ChunkRecord = serde_json::from_str(&json).unwrap();

        assert_eq!(back.id, chunk.id);
        assert_eq!(back.metadata, chunk.metadata);
    }
}
