//! Directory enumeration.
//!
//! Lists candidate documents under a directory. The walk is shallow by
//! default and honours `.gitignore`/`.ignore` files when recursive.

use std::path::{Path, PathBuf};

use ignore::WalkBuilder;

use super::filter::FileFilter;
use super::fingerprint::absolute_path;
use crate::{Error, Result};

/// Enumeration statistics.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ScanStats {
    pub files_found: u64,
    pub files_accepted: u64,
    pub files_skipped: u64,
    pub errors: u64,
}

/// Enumerate candidate files in `dir`.
///
/// Returns absolute paths sorted lexicographically. Only the top level is
/// listed unless `recursive` is set.
///
/// # Errors
///
/// Returns [`Error::NotFound`] if `dir` does not exist and
/// [`Error::NotADirectory`] if it is not a directory.
pub fn enumerate(dir: &Path, filter: &FileFilter, recursive: bool) -> Result<Vec<PathBuf>> {
    let (files, _) = enumerate_with_stats(dir, filter, recursive)?;
    Ok(files)
}

/// [`enumerate`], also returning statistics.
///
/// # Errors
///
/// Same as [`enumerate`].
pub fn enumerate_with_stats(
    dir: &Path,
    filter: &FileFilter,
    recursive: bool,
) -> Result<(Vec<PathBuf>, ScanStats)> {
    let dir = absolute_path(dir)?;
    if !dir.exists() {
        return Err(Error::NotFound(dir.display().to_string()));
    }
    if !dir.is_dir() {
        return Err(Error::NotADirectory(dir.display().to_string()));
    }

    tracing::debug!(path = %dir.display(), recursive, "Enumerating documents");

    let mut stats = ScanStats::default();
    let mut files = Vec::new();

    let walker = WalkBuilder::new(&dir)
        .max_depth(if recursive { None } else { Some(1) })
        .hidden(true)
        .git_ignore(recursive)
        .git_exclude(recursive)
        .ignore(recursive)
        .parents(false)
        .require_git(false)
        .filter_entry(|entry| {
            entry.depth() == 0
                || !entry.file_type().is_some_and(|t| t.is_dir())
                || !entry
                    .file_name()
                    .to_str()
                    .is_some_and(FileFilter::is_ignored_dir)
        })
        .build();

    for entry in walker {
        match entry {
            Ok(entry) => {
                if !entry.file_type().is_some_and(|t| t.is_file()) {
                    continue;
                }
                stats.files_found += 1;

                let path = entry.into_path();
                if filter.is_candidate(&path) {
                    stats.files_accepted += 1;
                    files.push(path);
                } else {
                    stats.files_skipped += 1;
                }
            }
            Err(e) => {
                tracing::warn!(error = %e, "Error walking directory");
                stats.errors += 1;
            }
        }
    }

    files.sort();

    tracing::info!(
        path = %dir.display(),
        found = stats.files_found,
        accepted = stats.files_accepted,
        skipped = stats.files_skipped,
        errors = stats.errors,
        "Directory enumeration complete"
    );

    Ok((files, stats))
}
