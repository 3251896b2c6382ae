//! Document loading.
//!
//! Turns a supported file into one or more text units. Plain text and
//! markdown load as a single unit; PDFs load one unit per page.

use std::path::Path;

use crate::error::IngestError;
use crate::{Error, Result};

/// Kind of document, decided by extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DocumentKind {
    Pdf,
    Text,
    Markdown,
}

impl DocumentKind {
    /// Detect the kind from a path's extension (case-insensitive).
    #[must_use]
    pub fn from_path(path: &Path) -> Option<Self> {
        let ext = path.extension()?.to_str()?.to_ascii_lowercase();
        match ext.as_str() {
            "pdf" => Some(Self::Pdf),
            "txt" => Some(Self::Text),
            "md" | "markdown" => Some(Self::Markdown),
            _ => None,
        }
    }
}

/// Metadata attached to a loaded text unit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DocumentMetadata {
    /// Path the unit was loaded from.
    pub source: String,

    /// 0-based page number for paginated sources.
    pub page: Option<u32>,
}

/// A loaded unit of text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Document {
    pub text: String,
    pub metadata: DocumentMetadata,
}

impl Document {
    /// Create a document unit.
    #[must_use]
    pub fn new(text: impl Into<String>, source: impl Into<String>, page: Option<u32>) -> Self {
        Self {
            text: text.into(),
            metadata: DocumentMetadata {
                source: source.into(),
                page,
            },
        }
    }
}

/// Loads files into text units.
pub trait DocumentLoader: Send + Sync {
    /// Load `path`.
    ///
    /// # Errors
    ///
    /// Returns [`IngestError::Load`] when the file cannot be parsed and
    /// [`Error::UnsupportedType`] for extensions the loader does not handle.
    fn load(&self, path: &Path) -> Result<Vec<Document>>;
}

/// Filesystem loader for PDF, plain text and markdown.
#[derive(Debug, Clone, Copy, Default)]
pub struct FsDocumentLoader;

impl FsDocumentLoader {
    /// Create a loader.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    fn load_error(path: &Path, reason: impl ToString) -> Error {
        IngestError::Load {
            path: path.display().to_string(),
            reason: reason.to_string(),
        }
        .into()
    }

    fn load_text(path: &Path, source: &str) -> Result<Vec<Document>> {
        let bytes = std::fs::read(path).map_err(|e| Self::load_error(path, e))?;
        let text = String::from_utf8(bytes).map_err(|e| Self::load_error(path, e))?;
        Ok(vec![Document::new(text, source, None)])
    }

    fn load_pdf(path: &Path, source: &str) -> Result<Vec<Document>> {
        let bytes = std::fs::read(path).map_err(|e| Self::load_error(path, e))?;
        let text =
            pdf_extract::extract_text_from_mem(&bytes).map_err(|e| Self::load_error(path, e))?;

        let pages = split_pages(&text);
        tracing::debug!(path = %path.display(), pages = pages.len(), "Loaded PDF");

        Ok(pages
            .into_iter()
            .enumerate()
            .map(|(i, page)| {
                Document::new(page, source, Some(u32::try_from(i).unwrap_or(u32::MAX)))
            })
            .collect())
    }
}

/// Split extracted PDF text on form feeds, one entry per page.
fn split_pages(text: &str) -> Vec<&str> {
    text.split('\x0c').collect()
}

impl DocumentLoader for FsDocumentLoader {
    fn load(&self, path: &Path) -> Result<Vec<Document>> {
        let source = path.display().to_string();

        match DocumentKind::from_path(path) {
            Some(DocumentKind::Pdf) => Self::load_pdf(path, &source),
            Some(DocumentKind::Text | DocumentKind::Markdown) => Self::load_text(path, &source),
            None => Err(Error::UnsupportedType {
                path: source,
                extension: path
                    .extension()
                    .map(|e| format!(".{}", e.to_string_lossy()))
                    .unwrap_or_default(),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_document_kind_from_path() {
        assert_eq!(DocumentKind::from_path(Path::new("a.pdf")), Some(DocumentKind::Pdf));
        assert_eq!(DocumentKind::from_path(Path::new("a.PDF")), Some(DocumentKind::Pdf));
        assert_eq!(DocumentKind::from_path(Path::new("a.txt")), Some(DocumentKind::Text));
        assert_eq!(
            DocumentKind::from_path(Path::new("notes.md")),
            Some(DocumentKind::Markdown)
        );
        assert_eq!(DocumentKind::from_path(Path::new("a.docx")), None);
        assert_eq!(DocumentKind::from_path(Path::new("Makefile")), None);
    }

    #[test]
    fn test_load_text() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("a.txt");
        fs::write(&path, "hello\nworld").unwrap();

        let docs = FsDocumentLoader::new().load(&path).unwrap();
        assert_eq!(docs.len(), 1);
        assert_eq!(docs[0].text, "hello\nworld");
        assert_eq!(docs[0].metadata.source, path.display().to_string());
        assert_eq!(docs[0].metadata.page, None);
    }

    #[test]
    fn test_load_invalid_utf8_is_load_error() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("bad.txt");
        fs::write(&path, [0xff, 0xfe, 0xfd]).unwrap();

        let err = FsDocumentLoader::new().load(&path).unwrap_err();
        assert!(matches!(err, Error::Ingest(IngestError::Load { .. })));
        assert!(err.is_file_local());
    }

    #[test]
    fn test_load_corrupt_pdf_is_load_error() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("broken.pdf");
        fs::write(&path, b"this is not a pdf").unwrap();

        let err = FsDocumentLoader::new().load(&path).unwrap_err();
        assert!(matches!(err, Error::Ingest(IngestError::Load { .. })));
    }

    #[test]
    fn test_load_unsupported() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("a.docx");
        fs::write(&path, "x").unwrap();

        let err = FsDocumentLoader::new().load(&path).unwrap_err();
        assert!(matches!(err, Error::UnsupportedType { .. }));
    }

    #[test]
    fn test_split_pages() {
        assert_eq!(split_pages("one\x0ctwo\x0c"), vec!["one", "two", ""]);
        assert_eq!(split_pages("single"), vec!["single"]);
    }
}
