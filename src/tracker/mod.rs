//! Incremental file tracking and index synchronization.
//!
//! This module provides:
//! - Content fingerprinting (path-derived ids, size/mtime, BLAKE3 hashes)
//! - Candidate enumeration with extension and ignore-file filtering
//! - Change detection against the metadata store
//! - The synchronizer that applies the minimal set of index mutations

mod detector;
mod filter;
mod fingerprint;
mod locks;
mod report;
mod scanner;
mod synchronizer;

pub use detector::{ChangeDetector, Classification, FileStatus};
pub use filter::FileFilter;
pub use fingerprint::{
    absolute_path, file_id_for, fingerprint, hash_file, identify, Fingerprint, HashState,
};
pub use locks::FileLocks;
pub use report::{
    format_size, AuditReport, CountMismatch, FileFailure, FileOutcome, IndexStatus, SyncMode,
    SyncReport,
};
pub use scanner::{enumerate, enumerate_with_stats, ScanStats};
pub use synchronizer::IndexSynchronizer;
