//! Pass reports, index status and audit results.

use std::collections::BTreeMap;
use std::path::PathBuf;

use super::detector::FileStatus;
use crate::storage::MetadataStats;

/// How a pass picks its work set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SyncMode {
    /// Only new and modified files.
    #[default]
    Incremental,
    /// Every candidate, regardless of classification.
    Force,
}

impl SyncMode {
    #[must_use]
    pub const fn is_force(self) -> bool {
        matches!(self, Self::Force)
    }
}

/// Result of indexing one file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileOutcome {
    pub path: PathBuf,
    pub file_id: String,
    pub status: FileStatus,
    /// Chunks stored by this call.
    pub chunks_added: usize,
    /// Stale chunks removed by this call.
    pub chunks_removed: usize,
    /// Chunks tracked for the file afterwards.
    pub chunk_count: usize,
    /// True when the file was unchanged and nothing was done.
    pub skipped: bool,
}

/// A file whose processing failed without aborting the pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileFailure {
    pub path: PathBuf,
    pub error: String,
}

/// Aggregate result of one synchronization pass.
#[derive(Debug, Clone, Default)]
pub struct SyncReport {
    pub mode: SyncMode,
    /// Number of enumerated candidates.
    pub candidates: usize,
    /// Status of each candidate that was classified or processed.
    pub statuses: BTreeMap<PathBuf, FileStatus>,
    /// Files indexed during the pass.
    pub processed: Vec<FileOutcome>,
    /// Files that failed and stay untracked (or keep their old record).
    pub failures: Vec<FileFailure>,
    /// Paths of tracked files removed because they disappeared.
    pub deleted: Vec<String>,
    pub chunks_added: usize,
    /// Chunks removed for modified and deleted files.
    pub chunks_removed: usize,
    /// Stopped early by cancellation; deletion was not run.
    pub cancelled: bool,
}

impl SyncReport {
    /// Empty report for a pass over `candidates` files.
    #[must_use]
    pub fn new(mode: SyncMode, candidates: usize) -> Self {
        Self {
            mode,
            candidates,
            ..Self::default()
        }
    }

    /// Number of candidates with `status`.
    #[must_use]
    pub fn count(&self, status: FileStatus) -> usize {
        self.statuses.values().filter(|s| **s == status).count()
    }

    /// Fold a processed file into the totals.
    pub fn record(&mut self, outcome: FileOutcome) {
        self.chunks_added += outcome.chunks_added;
        self.chunks_removed += outcome.chunks_removed;
        self.statuses.insert(outcome.path.clone(), outcome.status);
        self.processed.push(outcome);
    }

    /// No work was needed: nothing processed, deleted or failed.
    #[must_use]
    pub fn is_noop(&self) -> bool {
        self.processed.is_empty() && self.deleted.is_empty() && self.failures.is_empty()
    }
}

/// Snapshot of the index for status output.
#[derive(Debug, Clone)]
pub struct IndexStatus {
    pub collection: String,
    /// Chunks in the vector index.
    pub chunk_count: usize,
    /// Distinct file ids among stored chunks.
    pub unique_files: usize,
    /// Database location.
    pub storage: PathBuf,
    /// Metadata store aggregates.
    pub tracking: MetadataStats,
}

/// Tracked file whose recorded chunk count disagrees with the index.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CountMismatch {
    pub file_id: String,
    pub file_path: String,
    pub recorded: usize,
    pub actual: usize,
}

/// Consistency check between the metadata store and the vector index.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AuditReport {
    /// Records whose `chunk_count` differs from the stored chunks.
    pub mismatches: Vec<CountMismatch>,
    /// File ids with chunks but no record, with their chunk counts.
    pub orphaned: Vec<(String, usize)>,
    /// Records whose source file no longer exists.
    pub missing_sources: Vec<String>,
    /// Whether mismatches and orphans were repaired.
    pub repaired: bool,
}

impl AuditReport {
    /// Metadata and index agree.
    #[must_use]
    pub fn is_consistent(&self) -> bool {
        self.mismatches.is_empty() && self.orphaned.is_empty()
    }
}

/// Human-readable byte size ("0 B", "1.5 KB", "2.0 MB").
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn format_size(bytes: u64) -> String {
    const UNITS: [&str; 4] = ["B", "KB", "MB", "GB"];

    if bytes == 0 {
        return "0 B".to_string();
    }

    let mut size = bytes as f64;
    let mut unit = 0;
    while size >= 1024.0 && unit < UNITS.len() - 1 {
        size /= 1024.0;
        unit += 1;
    }

    format!("{size:.1} {}", UNITS[unit])
}
