//! Change detection.
//!
//! Compares the filesystem against the metadata store, cheapest signal
//! first: record presence, then size, then mtime, and only when all of
//! those agree, the content hash.

use std::collections::{BTreeMap, HashSet};
use std::fmt;
use std::path::{Path, PathBuf};

use super::fingerprint::{fingerprint, hash_file, identify, Fingerprint, HashState};
use crate::storage::{FileRecord, MetadataStore};
use crate::{Error, Result};

/// Classification of one file against its stored record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FileStatus {
    /// No record exists.
    New,
    /// Record exists and differs from the file.
    Modified,
    /// Record matches the file.
    Unchanged,
    /// Record exists but the file is gone from the live listing.
    Deleted,
    /// Path argument does not exist.
    NotFound,
}

impl FileStatus {
    /// Lower-case name used in reports.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::New => "new",
            Self::Modified => "modified",
            Self::Unchanged => "unchanged",
            Self::Deleted => "deleted",
            Self::NotFound => "not_found",
        }
    }

    /// Whether a normal pass must (re)index the file.
    #[must_use]
    pub const fn needs_indexing(self) -> bool {
        matches!(self, Self::New | Self::Modified)
    }
}

impl fmt::Display for FileStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Result of classifying one path.
#[derive(Debug, Clone)]
pub struct Classification {
    /// Path as given.
    pub path: PathBuf,
    pub file_id: String,
    pub status: FileStatus,
    /// Snapshot taken while classifying. Absent when the file could not
    /// be stat'ed. Carries the content hash if it was computed.
    pub fingerprint: Option<Fingerprint>,
    /// Stored record, if one was found.
    pub record: Option<FileRecord>,
}

/// Classifies files as new, modified or unchanged.
#[derive(Debug, Clone)]
pub struct ChangeDetector {
    metadata: MetadataStore,
}

impl ChangeDetector {
    /// Create a detector reading from `metadata`.
    #[must_use]
    pub const fn new(metadata: MetadataStore) -> Self {
        Self { metadata }
    }

    /// Classify a single path.
    ///
    /// Never fails: a path that vanished is [`FileStatus::NotFound`], and a
    /// stat or store read failure is logged and treated as
    /// [`FileStatus::New`] so the file is reprocessed rather than skipped.
    ///
    /// # Errors
    ///
    /// Returns an error only if the path cannot be made absolute.
    pub fn classify(&self, path: &Path) -> Result<Classification> {
        let (_, file_id) = identify(path)?;
        let mut classification = Classification {
            path: path.to_path_buf(),
            file_id,
            status: FileStatus::New,
            fingerprint: None,
            record: None,
        };

        let mut current = match fingerprint(path, false) {
            Ok(fp) => fp,
            Err(Error::NotFound(_)) => {
                classification.status = FileStatus::NotFound;
                return Ok(classification);
            }
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "Cannot stat file, treating as new");
                return Ok(classification);
            }
        };

        let stored = match self.metadata.get(&current.file_id) {
            Ok(Some(record)) => record,
            Ok(None) => {
                classification.fingerprint = Some(current);
                return Ok(classification);
            }
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "Error checking file metadata, treating as new");
                classification.fingerprint = Some(current);
                return Ok(classification);
            }
        };

        classification.status = Self::compare(&mut current, &stored);
        classification.fingerprint = Some(current);
        classification.record = Some(stored);

        tracing::trace!(
            path = %path.display(),
            status = %classification.status,
            "Classified file"
        );
        Ok(classification)
    }

    /// Compare a fresh snapshot to its stored record, hashing only when
    /// size and mtime both match. The computed hash is kept on `current`.
    fn compare(current: &mut Fingerprint, stored: &FileRecord) -> FileStatus {
        if current.size != stored.size {
            return FileStatus::Modified;
        }
        if current.mtime_ns != stored.mtime {
            return FileStatus::Modified;
        }

        current.hash = match hash_file(&current.path) {
            Ok(digest) => HashState::Computed(digest),
            Err(e) => {
                tracing::warn!(path = %current.path.display(), error = %e, "Hash unavailable, treating as modified");
                HashState::Unavailable(e.to_string())
            }
        };

        match (current.hash.digest(), stored.content_hash.as_deref()) {
            (Some(now), Some(then)) if now == then => FileStatus::Unchanged,
            _ => FileStatus::Modified,
        }
    }

    /// Classify each path independently.
    ///
    /// # Errors
    ///
    /// Returns an error if a path cannot be made absolute.
    pub fn classify_many(&self, paths: &[PathBuf]) -> Result<BTreeMap<PathBuf, Classification>> {
        let mut result = BTreeMap::new();
        for path in paths {
            result.insert(path.clone(), self.classify(path)?);
        }
        Ok(result)
    }

    /// Tracked records whose file id is not derivable from `live_paths`.
    ///
    /// # Errors
    ///
    /// Returns an error if the metadata store cannot be listed.
    pub fn deleted(&self, live_paths: &[PathBuf]) -> Result<Vec<FileRecord>> {
        let mut live_ids = HashSet::with_capacity(live_paths.len());
        for path in live_paths {
            live_ids.insert(identify(path)?.1);
        }

        Ok(self
            .metadata
            .list_all()?
            .into_iter()
            .filter(|record| !live_ids.contains(&record.file_id))
            .collect())
    }
}
