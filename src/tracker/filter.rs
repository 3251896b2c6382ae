//! Candidate file filtering.

use std::path::Path;

use crate::config::Config;
use crate::{Error, Result};

/// Directories never descended into during recursive enumeration.
const IGNORED_DIRS: &[&str] = &[
    "node_modules",
    ".git",
    "__pycache__",
    ".venv",
    "venv",
    ".idea",
    ".vscode",
];

/// File names never treated as documents.
const IGNORED_FILES: &[&str] = &[".DS_Store", "Thumbs.db", "desktop.ini"];

/// Decides which files are indexing candidates.
#[derive(Debug, Clone)]
pub struct FileFilter {
    /// Lower-case extensions with leading dot.
    extensions: Vec<String>,
    max_file_size: u64,
}

impl FileFilter {
    /// Create a filter from extensions (with or without leading dot) and a
    /// size limit in bytes.
    #[must_use]
    pub fn new(extensions: &[String], max_file_size: u64) -> Self {
        let extensions = extensions
            .iter()
            .map(|e| {
                let e = e.trim().to_ascii_lowercase();
                if e.starts_with('.') {
                    e
                } else {
                    format!(".{e}")
                }
            })
            .collect();

        Self {
            extensions,
            max_file_size,
        }
    }

    /// Create a filter from configuration.
    #[must_use]
    pub fn from_config(config: &Config) -> Self {
        Self::new(&config.supported_extensions, config.max_file_size_bytes())
    }

    /// Lower-case extension with leading dot, or empty.
    #[must_use]
    pub fn extension_of(path: &Path) -> String {
        path.extension()
            .map(|e| format!(".{}", e.to_string_lossy().to_ascii_lowercase()))
            .unwrap_or_default()
    }

    /// Whether the extension is in the supported set.
    #[must_use]
    pub fn is_supported(&self, path: &Path) -> bool {
        let ext = Self::extension_of(path);
        !ext.is_empty() && self.extensions.iter().any(|e| *e == ext)
    }

    /// Whether enumeration should yield this file.
    #[must_use]
    pub fn is_candidate(&self, path: &Path) -> bool {
        self.is_supported(path) && !Self::is_default_ignored(path)
    }

    /// Reject unsupported extensions.
    ///
    /// # Errors
    ///
    /// Returns [`Error::UnsupportedType`] if the extension is not supported.
    pub fn check_supported(&self, path: &Path) -> Result<()> {
        if self.is_supported(path) {
            Ok(())
        } else {
            Err(Error::UnsupportedType {
                path: path.display().to_string(),
                extension: Self::extension_of(path),
            })
        }
    }

    /// Reject files over the size limit.
    ///
    /// # Errors
    ///
    /// Returns [`Error::FileTooLarge`] if `size` exceeds the limit.
    pub fn check_size(&self, path: &Path, size: u64) -> Result<()> {
        if size > self.max_file_size {
            Err(Error::FileTooLarge {
                path: path.display().to_string(),
                size,
                limit: self.max_file_size,
            })
        } else {
            Ok(())
        }
    }

    /// Whether a directory name is skipped during walks.
    #[must_use]
    pub fn is_ignored_dir(name: &str) -> bool {
        IGNORED_DIRS.contains(&name)
    }

    fn is_default_ignored(path: &Path) -> bool {
        let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
            return true;
        };

        // Office lock files ("~$report.docx") and editor backups.
        IGNORED_FILES.contains(&name) || name.starts_with("~$") || name.ends_with('~')
    }
}
