//! Document ingestion: loading files and splitting them into chunks.

mod loader;
mod splitter;

pub use loader::{Document, DocumentKind, DocumentLoader, DocumentMetadata, FsDocumentLoader};
pub use splitter::{SplitterConfig, TextChunk, TextSplitter, DEFAULT_SEPARATORS};
