//! Index synchronization.
//!
//! Brings the vector index and metadata store in line with the filesystem:
//! new and modified files are (re)ingested, unchanged files are skipped and
//! files that disappeared are dropped from both stores.
//!
//! Files are independent units of work and are processed concurrently.
//! Each file's chunk swap runs under its per-file lock inside one storage
//! transaction, and its record is written only after the swap commits.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use futures::stream::{self, StreamExt};
use tokio_util::sync::CancellationToken;

use super::detector::{ChangeDetector, Classification, FileStatus};
use super::filter::FileFilter;
use super::fingerprint::{fingerprint, identify, Fingerprint, HashState};
use super::locks::FileLocks;
use super::report::{
    AuditReport, CountMismatch, FileFailure, FileOutcome, IndexStatus, SyncMode, SyncReport,
};
use super::scanner;
use crate::config::Config;
use crate::embeddings::HashEmbedder;
use crate::error::IngestError;
use crate::ingest::{DocumentLoader, FsDocumentLoader, TextSplitter};
use crate::storage::{
    init_storage, ChunkFilter, ChunkMetadata, ChunkRecord, Database, FileRecord, MetadataStore,
    SqliteVectorIndex, VectorIndex,
};
use crate::{Error, Result};

fn join_error(e: tokio::task::JoinError) -> Error {
    Error::internal(format!("blocking task failed: {e}"))
}

struct Inner {
    config: Config,
    index: Arc<dyn VectorIndex>,
    metadata: MetadataStore,
    detector: ChangeDetector,
    loader: Arc<dyn DocumentLoader>,
    splitter: TextSplitter,
    filter: FileFilter,
    locks: FileLocks,
}

/// Orchestrates synchronization passes.
///
/// Cheap to clone; clones share the same stores and lock table.
#[derive(Clone)]
pub struct IndexSynchronizer {
    inner: Arc<Inner>,
}

impl IndexSynchronizer {
    /// Create a synchronizer over explicit collaborators.
    #[must_use]
    pub fn new(
        config: Config,
        index: Arc<dyn VectorIndex>,
        metadata: MetadataStore,
        loader: Arc<dyn DocumentLoader>,
    ) -> Self {
        let splitter = TextSplitter::with_sizes(config.chunk_size, config.chunk_overlap);
        let filter = FileFilter::from_config(&config);
        let detector = ChangeDetector::new(metadata.clone());

        Self {
            inner: Arc::new(Inner {
                config,
                index,
                metadata,
                detector,
                loader,
                splitter,
                filter,
                locks: FileLocks::new(),
            }),
        }
    }

    /// Open the database under `config.data_dir` and wire the default
    /// collaborators: `SQLite` vector index, hash embedder, filesystem
    /// loader.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid or storage cannot
    /// be initialized.
    pub fn open(config: Config) -> Result<Self> {
        config.validate()?;

        let db = Database::open(config.database_path())?;
        init_storage(&db)?;

        let embedder = Arc::new(HashEmbedder::new(config.embedding_dim));
        let index = SqliteVectorIndex::new(db.clone(), embedder, config.collection_name.clone())?;
        let metadata = MetadataStore::new(db);

        Ok(Self::new(
            config,
            Arc::new(index),
            metadata,
            Arc::new(FsDocumentLoader::new()),
        ))
    }

    /// Active configuration.
    #[must_use]
    pub fn config(&self) -> &Config {
        &self.inner.config
    }

    /// Shared vector index handle.
    #[must_use]
    pub fn index(&self) -> Arc<dyn VectorIndex> {
        Arc::clone(&self.inner.index)
    }

    /// Metadata store handle.
    #[must_use]
    pub fn metadata(&self) -> &MetadataStore {
        &self.inner.metadata
    }

    /// Synchronize every candidate file in `dir`.
    ///
    /// When `dir` has no candidates left, every tracked file is removed
    /// before [`Error::NoDocuments`] is returned.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotFound`] or [`Error::NotADirectory`] for a bad
    /// path, [`Error::NoDocuments`] if no candidates exist, and any shared
    /// infrastructure failure. Per-file failures land in the report.
    pub async fn sync_directory(
        &self,
        dir: &Path,
        mode: SyncMode,
        cancel: &CancellationToken,
    ) -> Result<SyncReport> {
        let inner = Arc::clone(&self.inner);
        let dir_buf = dir.to_path_buf();
        let candidates = tokio::task::spawn_blocking(move || {
            scanner::enumerate(&dir_buf, &inner.filter, inner.config.recursive)
        })
        .await
        .map_err(join_error)??;

        if candidates.is_empty() {
            self.remove_all_tracked(mode, cancel).await?;
            return Err(Error::NoDocuments(dir.display().to_string()));
        }

        tracing::info!(
            path = %dir.display(),
            candidates = candidates.len(),
            force = mode.is_force(),
            "Starting synchronization pass"
        );

        self.run_pass(candidates, mode, cancel).await
    }

    /// Synchronize an explicit file list.
    ///
    /// The list is the complete live set: tracked files not named here are
    /// treated as deleted. Unsupported paths are reported as failures.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NoDocuments`] if no supported path is given (after
    /// removing every tracked file), and any shared infrastructure failure.
    pub async fn sync_files(
        &self,
        paths: &[PathBuf],
        mode: SyncMode,
        cancel: &CancellationToken,
    ) -> Result<SyncReport> {
        let mut candidates = Vec::with_capacity(paths.len());
        let mut rejected = Vec::new();

        for path in paths {
            let (absolute, _) = identify(path)?;
            match self.inner.filter.check_supported(&absolute) {
                Ok(()) => candidates.push(absolute),
                Err(e) => rejected.push(FileFailure {
                    path: absolute,
                    error: e.to_string(),
                }),
            }
        }

        candidates.sort();
        candidates.dedup();

        if candidates.is_empty() {
            self.remove_all_tracked(mode, cancel).await?;
            return Err(Error::NoDocuments(format!("{} given path(s)", paths.len())));
        }

        let mut report = self.run_pass(candidates, mode, cancel).await?;
        report.failures.extend(rejected);
        Ok(report)
    }

    /// Deletion step against an empty live set: every tracked file is gone.
    async fn remove_all_tracked(&self, mode: SyncMode, cancel: &CancellationToken) -> Result<()> {
        let mut report = SyncReport::new(mode, 0);
        self.remove_deleted(Vec::new(), cancel, &mut report).await?;
        self.inner.locks.prune();

        if !report.deleted.is_empty() {
            tracing::info!(
                deleted = report.deleted.len(),
                chunks_removed = report.chunks_removed,
                "No candidates left, removed all tracked files"
            );
        }
        Ok(())
    }

    async fn run_pass(
        &self,
        candidates: Vec<PathBuf>,
        mode: SyncMode,
        cancel: &CancellationToken,
    ) -> Result<SyncReport> {
        let mut report = SyncReport::new(mode, candidates.len());

        let work: Vec<(PathBuf, Option<Classification>)> = if mode.is_force() {
            candidates.iter().cloned().map(|p| (p, None)).collect()
        } else {
            let detector = self.inner.detector.clone();
            let paths = candidates.clone();
            let classified = tokio::task::spawn_blocking(move || detector.classify_many(&paths))
                .await
                .map_err(join_error)??;

            let mut work = Vec::new();
            for (path, classification) in classified {
                report.statuses.insert(path.clone(), classification.status);
                if classification.status.needs_indexing() {
                    work.push((path, Some(classification)));
                }
            }

            tracing::info!(
                new = report.count(FileStatus::New),
                modified = report.count(FileStatus::Modified),
                unchanged = report.count(FileStatus::Unchanged),
                "Classified candidates"
            );
            work
        };

        self.process_work(work, cancel, &mut report).await?;

        if cancel.is_cancelled() {
            report.cancelled = true;
            tracing::warn!(
                processed = report.processed.len(),
                "Synchronization cancelled, deletion step skipped"
            );
            return Ok(report);
        }

        self.remove_deleted(candidates, cancel, &mut report).await?;
        self.inner.locks.prune();

        tracing::info!(
            processed = report.processed.len(),
            chunks_added = report.chunks_added,
            chunks_removed = report.chunks_removed,
            unchanged = report.count(FileStatus::Unchanged),
            deleted = report.deleted.len(),
            failed = report.failures.len(),
            "Synchronization pass complete"
        );

        Ok(report)
    }

    async fn process_work(
        &self,
        work: Vec<(PathBuf, Option<Classification>)>,
        cancel: &CancellationToken,
        report: &mut SyncReport,
    ) -> Result<()> {
        // Cancelled on user request or on the first shared-infrastructure failure.
        let pass = cancel.child_token();
        let concurrency = self.inner.config.sync_concurrency.max(1);

        let results: Vec<(PathBuf, Result<FileOutcome>)> = stream::iter(work)
            .map(|(path, classification)| {
                let this = self.clone();
                let pass = pass.clone();
                async move {
                    if pass.is_cancelled() {
                        return (path, Err(Error::Cancelled));
                    }
                    let result = this.process_file(&path, classification).await;
                    if let Err(e) = &result {
                        if !e.is_file_local() {
                            pass.cancel();
                        }
                    }
                    (path, result)
                }
            })
            .buffer_unordered(concurrency)
            .collect()
            .await;

        let mut fatal = None;
        for (path, result) in results {
            match result {
                Ok(outcome) => report.record(outcome),
                Err(Error::Cancelled) => report.cancelled = true,
                Err(e) if e.is_file_local() => {
                    tracing::warn!(path = %path.display(), error = %e, "Skipping file");
                    report.failures.push(FileFailure {
                        path,
                        error: e.to_string(),
                    });
                }
                Err(e) => {
                    tracing::error!(path = %path.display(), error = %e, "Aborting pass");
                    fatal.get_or_insert(e);
                }
            }
        }

        report.processed.sort_by(|a, b| a.path.cmp(&b.path));
        fatal.map_or(Ok(()), Err)
    }

    async fn remove_deleted(
        &self,
        candidates: Vec<PathBuf>,
        cancel: &CancellationToken,
        report: &mut SyncReport,
    ) -> Result<()> {
        let detector = self.inner.detector.clone();
        let stale = tokio::task::spawn_blocking(move || {
            let live: Vec<PathBuf> = candidates.into_iter().filter(|p| p.is_file()).collect();
            detector.deleted(&live)
        })
        .await
        .map_err(join_error)??;

        for record in stale {
            if cancel.is_cancelled() {
                report.cancelled = true;
                break;
            }

            let removed = self.remove_file(&record.file_id).await?;
            tracing::info!(path = %record.file_path, chunks = removed, "Removed deleted file");

            report.chunks_removed += removed;
            report
                .statuses
                .insert(PathBuf::from(&record.file_path), FileStatus::Deleted);
            report.deleted.push(record.file_path);
        }

        Ok(())
    }

    async fn remove_file(&self, file_id: &str) -> Result<usize> {
        let _guard = self.inner.locks.acquire(file_id).await;
        let inner = Arc::clone(&self.inner);
        let file_id = file_id.to_string();

        tokio::task::spawn_blocking(move || {
            let removed = inner.index.delete_where(&ChunkFilter::file(&file_id))?;
            inner.metadata.delete(&file_id)?;
            Ok(removed)
        })
        .await
        .map_err(join_error)?
    }

    async fn process_file(
        &self,
        path: &Path,
        classification: Option<Classification>,
    ) -> Result<FileOutcome> {
        let (absolute, file_id) = identify(path)?;
        let _guard = self.inner.locks.acquire(&file_id).await;

        let inner = Arc::clone(&self.inner);
        tokio::task::spawn_blocking(move || inner.ingest(&absolute, &file_id, classification.as_ref()))
            .await
            .map_err(join_error)?
    }

    /// Index one file, skipping it when unchanged unless `force` is set.
    ///
    /// An unchanged file returns its recorded chunk count and does no work.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotFound`], [`Error::NotAFile`] or
    /// [`Error::UnsupportedType`] for a bad path, and any load or storage
    /// failure. The file stays untracked (or keeps its old record) on error.
    pub async fn index_single_file(&self, path: &Path, force: bool) -> Result<FileOutcome> {
        let (absolute, file_id) = identify(path)?;

        if !absolute.exists() {
            return Err(Error::NotFound(absolute.display().to_string()));
        }
        if !absolute.is_file() {
            return Err(Error::NotAFile(absolute.display().to_string()));
        }
        self.inner.filter.check_supported(&absolute)?;

        let classification = if force {
            None
        } else {
            let detector = self.inner.detector.clone();
            let target = absolute.clone();
            let classification = tokio::task::spawn_blocking(move || detector.classify(&target))
                .await
                .map_err(join_error)??;

            if classification.status == FileStatus::Unchanged {
                let chunk_count = classification
                    .record
                    .as_ref()
                    .map_or(0, |r| r.chunk_count);
                tracing::info!(path = %absolute.display(), chunks = chunk_count, "Skipping unchanged file");

                return Ok(FileOutcome {
                    path: absolute,
                    file_id,
                    status: FileStatus::Unchanged,
                    chunks_added: 0,
                    chunks_removed: 0,
                    chunk_count,
                    skipped: true,
                });
            }
            Some(classification)
        };

        let outcome = self.process_file(&absolute, classification).await;
        self.inner.locks.prune();
        outcome
    }

    /// Empty both the vector index and the metadata store.
    ///
    /// # Errors
    ///
    /// Returns an error if either collection cannot be recreated.
    pub async fn clear(&self) -> Result<()> {
        let inner = Arc::clone(&self.inner);
        tokio::task::spawn_blocking(move || {
            inner.index.clear()?;
            inner.metadata.clear()
        })
        .await
        .map_err(join_error)??;

        tracing::info!("Index cleared");
        Ok(())
    }

    /// Current index and tracking figures.
    ///
    /// # Errors
    ///
    /// Returns an error if either store cannot be read.
    pub async fn status(&self) -> Result<IndexStatus> {
        let inner = Arc::clone(&self.inner);
        tokio::task::spawn_blocking(move || {
            let counts = inner.index.file_chunk_counts()?;
            Ok(IndexStatus {
                collection: inner.index.name().to_string(),
                chunk_count: inner.index.count()?,
                unique_files: counts.len(),
                storage: inner.config.database_path(),
                tracking: inner.metadata.stats()?,
            })
        })
        .await
        .map_err(join_error)?
    }

    /// Compare recorded chunk counts against the index.
    ///
    /// # Errors
    ///
    /// Returns an error if either store cannot be read.
    pub async fn audit(&self) -> Result<AuditReport> {
        let inner = Arc::clone(&self.inner);
        tokio::task::spawn_blocking(move || inner.audit())
            .await
            .map_err(join_error)?
    }

    /// Audit, then repair: orphaned chunks are deleted, and files with a
    /// count mismatch lose their chunks and record so the next pass
    /// re-ingests them as new.
    ///
    /// # Errors
    ///
    /// Returns an error if either store cannot be read or written.
    pub async fn reconcile(&self) -> Result<AuditReport> {
        let mut report = self.audit().await?;

        for (file_id, _) in &report.orphaned {
            let _guard = self.inner.locks.acquire(file_id).await;
            let inner = Arc::clone(&self.inner);
            let file_id = file_id.clone();
            tokio::task::spawn_blocking(move || {
                inner.index.delete_where(&ChunkFilter::file(&file_id))
            })
            .await
            .map_err(join_error)??;
        }

        for mismatch in &report.mismatches {
            self.remove_file(&mismatch.file_id).await?;
        }
        self.inner.locks.prune();

        report.repaired = true;
        tracing::info!(
            orphaned = report.orphaned.len(),
            mismatched = report.mismatches.len(),
            "Index reconciled"
        );
        Ok(report)
    }
}

impl Inner {
    fn ingest(
        &self,
        path: &Path,
        file_id: &str,
        classification: Option<&Classification>,
    ) -> Result<FileOutcome> {
        self.filter.check_supported(path)?;

        let current = Self::current_fingerprint(path, classification)?;
        self.filter.check_size(path, current.size)?;

        let status = match classification {
            Some(c) => c.status,
            None => match self.metadata.get(file_id) {
                Ok(Some(_)) => FileStatus::Modified,
                Ok(None) => FileStatus::New,
                Err(e) => {
                    tracing::warn!(path = %path.display(), error = %e, "Error checking file metadata");
                    FileStatus::New
                }
            },
        };

        let documents = self.loader.load(path)?;
        if documents.is_empty() {
            return Err(IngestError::Empty(path.display().to_string()).into());
        }

        let chunks: Vec<ChunkRecord> = self
            .splitter
            .split_documents(&documents)
            .into_iter()
            .map(|chunk| {
                let chunk_size = chunk.char_len();
                ChunkRecord::new(
                    chunk.content,
                    ChunkMetadata {
                        file_id: file_id.to_string(),
                        source: chunk.source,
                        chunk_id: chunk.index,
                        chunk_size,
                        page: chunk.page,
                    },
                )
            })
            .collect();

        let (removed, added) = self.index.replace_file(file_id, &chunks)?;

        let record = FileRecord::new(
            file_id,
            current.path_string(),
            current.size,
            current.mtime_ns,
            current.hash.digest().map(String::from),
            added,
        );
        self.metadata.put(&record)?;

        tracing::info!(
            path = %path.display(),
            status = %status,
            chunks = added,
            removed,
            "Indexed file"
        );

        Ok(FileOutcome {
            path: path.to_path_buf(),
            file_id: file_id.to_string(),
            status,
            chunks_added: added,
            chunks_removed: removed,
            chunk_count: added,
            skipped: false,
        })
    }

    /// Fingerprint with hash, reusing the one computed during
    /// classification when the file's stat has not moved since.
    fn current_fingerprint(
        path: &Path,
        classification: Option<&Classification>,
    ) -> Result<Fingerprint> {
        let fresh = fingerprint(path, false)?;

        if let Some(previous) = classification.and_then(|c| c.fingerprint.as_ref()) {
            if matches!(previous.hash, HashState::Computed(_)) && previous.same_stat(&fresh) {
                return Ok(previous.clone());
            }
        }

        fingerprint(path, true)
    }

    fn audit(&self) -> Result<AuditReport> {
        let mut counts = self.index.file_chunk_counts()?;
        let records = self.metadata.list_all()?;
        let mut report = AuditReport::default();

        for record in records {
            let actual = counts.remove(&record.file_id).unwrap_or(0);
            if actual != record.chunk_count {
                report.mismatches.push(CountMismatch {
                    file_id: record.file_id.clone(),
                    file_path: record.file_path.clone(),
                    recorded: record.chunk_count,
                    actual,
                });
            }
            if !Path::new(&record.file_path).exists() {
                report.missing_sources.push(record.file_path);
            }
        }

        let mut orphaned: Vec<(String, usize)> = counts.into_iter().collect();
        orphaned.sort();
        report.orphaned = orphaned;

        tracing::debug!(
            mismatched = report.mismatches.len(),
            orphaned = report.orphaned.len(),
            missing = report.missing_sources.len(),
            "Audit complete"
        );
        Ok(report)
    }
}

impl std::fmt::Debug for IndexSynchronizer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IndexSynchronizer")
            .field("collection", &self.inner.index.name())
            .field("concurrency", &self.inner.config.sync_concurrency)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn setup(tmp: &TempDir) -> IndexSynchronizer {
        let config = Config {
            data_dir: tmp.path().join("data"),
            chunk_size: 100,
            chunk_overlap: 20,
            embedding_dim: 32,
            ..Config::default()
        };
        IndexSynchronizer::open(config).unwrap()
    }

    fn docs_dir(tmp: &TempDir) -> PathBuf {
        let dir = tmp.path().join("docs");
        fs::create_dir_all(&dir).unwrap();
        dir
    }

    #[tokio::test]
    async fn test_empty_directory_is_no_documents() {
        let tmp = TempDir::new().unwrap();
        let sync = setup(&tmp);
        let dir = docs_dir(&tmp);

        let err = sync
            .sync_directory(&dir, SyncMode::Incremental, &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, Error::NoDocuments(_)));
    }

    #[tokio::test]
    async fn test_emptied_directory_removes_tracked_files() {
        let tmp = TempDir::new().unwrap();
        let sync = setup(&tmp);
        let dir = docs_dir(&tmp);
        let path = dir.join("a.txt");
        fs::write(&path, "short note").unwrap();
        sync.sync_directory(&dir, SyncMode::Incremental, &CancellationToken::new())
            .await
            .unwrap();

        fs::remove_file(&path).unwrap();
        let err = sync
            .sync_directory(&dir, SyncMode::Incremental, &CancellationToken::new())
            .await
            .unwrap_err();

        assert!(matches!(err, Error::NoDocuments(_)));
        assert_eq!(sync.index().count().unwrap(), 0);
        assert_eq!(sync.metadata().count().unwrap(), 0);
        assert!(sync.inner.locks.is_empty());
    }

    #[tokio::test]
    async fn test_sync_files_with_nothing_supported_removes_tracked_files() {
        let tmp = TempDir::new().unwrap();
        let sync = setup(&tmp);
        let path = docs_dir(&tmp).join("a.txt");
        fs::write(&path, "short note").unwrap();
        sync.index_single_file(&path, false).await.unwrap();

        let err = sync
            .sync_files(&[], SyncMode::Incremental, &CancellationToken::new())
            .await
            .unwrap_err();

        assert!(matches!(err, Error::NoDocuments(_)));
        assert_eq!(sync.metadata().count().unwrap(), 0);
        assert_eq!(sync.index().count().unwrap(), 0);
    }

    #[tokio::test]
    async fn test_missing_directory() {
        let tmp = TempDir::new().unwrap();
        let sync = setup(&tmp);

        let err = sync
            .sync_directory(&tmp.path().join("nope"), SyncMode::Incremental, &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, Error::NotFound(_)));
    }

    #[tokio::test]
    async fn test_index_single_file_then_skip() {
        let tmp = TempDir::new().unwrap();
        let sync = setup(&tmp);
        let path = docs_dir(&tmp).join("a.txt");
        fs::write(&path, "short note").unwrap();

        let first = sync.index_single_file(&path, false).await.unwrap();
        assert_eq!(first.status, FileStatus::New);
        assert_eq!(first.chunk_count, 1);

        let second = sync.index_single_file(&path, false).await.unwrap();
        assert!(second.skipped);
        assert_eq!(second.status, FileStatus::Unchanged);
        assert_eq!(second.chunk_count, 1);
        assert_eq!(sync.index().count().unwrap(), 1);
        assert!(sync.inner.locks.is_empty());
    }

    #[tokio::test]
    async fn test_index_single_file_force_replaces() {
        let tmp = TempDir::new().unwrap();
        let sync = setup(&tmp);
        let path = docs_dir(&tmp).join("a.txt");
        fs::write(&path, "short note").unwrap();

        sync.index_single_file(&path, false).await.unwrap();
        let forced = sync.index_single_file(&path, true).await.unwrap();

        assert_eq!(forced.status, FileStatus::Modified);
        assert_eq!(forced.chunks_removed, 1);
        assert_eq!(sync.index().count().unwrap(), 1);
    }

    #[tokio::test]
    async fn test_index_single_file_rejects_bad_paths() {
        let tmp = TempDir::new().unwrap();
        let sync = setup(&tmp);
        let dir = docs_dir(&tmp);
        let docx = dir.join("a.docx");
        fs::write(&docx, "x").unwrap();

        assert!(matches!(
            sync.index_single_file(&dir.join("gone.txt"), false).await,
            Err(Error::NotFound(_))
        ));
        assert!(matches!(
            sync.index_single_file(&dir, false).await,
            Err(Error::NotAFile(_))
        ));
        assert!(matches!(
            sync.index_single_file(&docx, false).await,
            Err(Error::UnsupportedType { .. })
        ));
    }

    #[tokio::test]
    async fn test_empty_text_file_is_tracked_with_zero_chunks() {
        let tmp = TempDir::new().unwrap();
        let sync = setup(&tmp);
        let path = docs_dir(&tmp).join("empty.txt");
        fs::write(&path, "").unwrap();

        let outcome = sync.index_single_file(&path, false).await.unwrap();
        assert_eq!(outcome.chunk_count, 0);
        assert!(sync.index_single_file(&path, false).await.unwrap().skipped);
    }

    #[tokio::test]
    async fn test_oversized_file_is_skipped() {
        let tmp = TempDir::new().unwrap();
        let config = Config {
            data_dir: tmp.path().join("data"),
            max_file_size_mb: 0,
            embedding_dim: 32,
            ..Config::default()
        };
        let sync = IndexSynchronizer::open(config).unwrap();
        let dir = docs_dir(&tmp);
        fs::write(dir.join("a.txt"), "not empty").unwrap();

        let report = sync
            .sync_directory(&dir, SyncMode::Incremental, &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(report.failures.len(), 1);
        assert!(report.failures[0].error.contains("too large"));
        assert_eq!(sync.metadata().count().unwrap(), 0);
    }

    #[tokio::test]
    async fn test_cancelled_pass_skips_work_and_deletion() {
        let tmp = TempDir::new().unwrap();
        let sync = setup(&tmp);
        let dir = docs_dir(&tmp);
        fs::write(dir.join("a.txt"), "alpha").unwrap();

        let token = CancellationToken::new();
        token.cancel();
        let report = sync
            .sync_directory(&dir, SyncMode::Incremental, &token)
            .await
            .unwrap();

        assert!(report.cancelled);
        assert!(report.processed.is_empty());
        assert_eq!(sync.index().count().unwrap(), 0);
    }

    #[tokio::test]
    async fn test_sync_files_rejects_unsupported() {
        let tmp = TempDir::new().unwrap();
        let sync = setup(&tmp);
        let dir = docs_dir(&tmp);
        let txt = dir.join("a.txt");
        let docx = dir.join("b.docx");
        fs::write(&txt, "alpha").unwrap();
        fs::write(&docx, "beta").unwrap();

        let report = sync
            .sync_files(&[txt, docx], SyncMode::Incremental, &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(report.processed.len(), 1);
        assert_eq!(report.failures.len(), 1);
    }

    #[tokio::test]
    async fn test_status_and_clear() {
        let tmp = TempDir::new().unwrap();
        let sync = setup(&tmp);
        let dir = docs_dir(&tmp);
        fs::write(dir.join("a.txt"), "alpha").unwrap();
        fs::write(dir.join("b.md"), "beta").unwrap();

        sync.sync_directory(&dir, SyncMode::Incremental, &CancellationToken::new())
            .await
            .unwrap();

        let status = sync.status().await.unwrap();
        assert_eq!(status.collection, "documents");
        assert_eq!(status.chunk_count, 2);
        assert_eq!(status.unique_files, 2);
        assert_eq!(status.tracking.tracked_files, 2);
        assert_eq!(status.tracking.total_chunks, 2);
        assert!(status.storage.ends_with("ragsync.db"));

        sync.clear().await.unwrap();
        let status = sync.status().await.unwrap();
        assert_eq!(status.chunk_count, 0);
        assert_eq!(status.tracking.tracked_files, 0);
    }

    #[tokio::test]
    async fn test_audit_and_reconcile() {
        let tmp = TempDir::new().unwrap();
        let sync = setup(&tmp);
        let dir = docs_dir(&tmp);
        let path = dir.join("a.txt");
        fs::write(&path, "alpha").unwrap();
        sync.index_single_file(&path, false).await.unwrap();

        assert!(sync.audit().await.unwrap().is_consistent());

        // Orphaned chunk with no record.
        let orphan = ChunkRecord::new(
            "stray",
            ChunkMetadata {
                file_id: "orphan".into(),
                source: "/nowhere.txt".into(),
                chunk_id: 0,
                chunk_size: 5,
                page: None,
            },
        );
        sync.index().add(&[orphan]).unwrap();

        // Recorded count drifts from the index.
        let (_, file_id) = identify(&path).unwrap();
        let mut record = sync.metadata().get(&file_id).unwrap().unwrap();
        record.chunk_count = 7;
        sync.metadata().put(&record).unwrap();

        let audit = sync.audit().await.unwrap();
        assert_eq!(audit.orphaned, vec![("orphan".to_string(), 1)]);
        assert_eq!(audit.mismatches.len(), 1);
        assert_eq!(audit.mismatches[0].actual, 1);

        let repaired = sync.reconcile().await.unwrap();
        assert!(repaired.repaired);
        assert!(sync.inner.locks.is_empty());
        assert!(sync.audit().await.unwrap().is_consistent());
        assert_eq!(sync.index().count().unwrap(), 0);

        let outcome = sync.index_single_file(&path, false).await.unwrap();
        assert_eq!(outcome.status, FileStatus::New);
    }
}
