//! Recursive character text splitting.
//!
//! Splits on the first separator present in the text, recursing into
//! pieces that are still too long with the remaining separators, then
//! greedily merges small pieces back up to `chunk_size` characters with
//! `chunk_overlap` characters carried between neighbours. Separators stay
//! attached to the start of the piece that follows them.

use super::loader::Document;

/// Default separators, coarsest first.
pub const DEFAULT_SEPARATORS: &[&str] = &["\n\n", "\n", " ", ""];

/// A chunk of text produced from a loaded document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextChunk {
    /// Chunk text, trimmed.
    pub content: String,

    /// Source the chunk came from.
    pub source: String,

    /// Page of the source unit, if paginated.
    pub page: Option<u32>,

    /// Position of the chunk across the whole file (0-based).
    pub index: usize,
}

impl TextChunk {
    /// Length in characters.
    #[must_use]
    pub fn char_len(&self) -> usize {
        self.content.chars().count()
    }
}

/// Splitter configuration.
#[derive(Debug, Clone)]
pub struct SplitterConfig {
    /// Maximum chunk length in characters.
    pub chunk_size: usize,
    /// Characters shared between consecutive chunks.
    pub chunk_overlap: usize,
    /// Separators, coarsest first. An empty separator splits into characters.
    pub separators: Vec<String>,
}

impl Default for SplitterConfig {
    fn default() -> Self {
        Self {
            chunk_size: 1000,
            chunk_overlap: 200,
            separators: DEFAULT_SEPARATORS.iter().map(ToString::to_string).collect(),
        }
    }
}

/// Recursive character splitter.
#[derive(Debug, Clone)]
pub struct TextSplitter {
    config: SplitterConfig,
}

fn char_len(s: &str) -> usize {
    s.chars().count()
}

impl TextSplitter {
    /// Create a splitter with config.
    #[must_use]
    pub const fn new(config: SplitterConfig) -> Self {
        Self { config }
    }

    /// Create a splitter with the default separators.
    #[must_use]
    pub fn with_sizes(chunk_size: usize, chunk_overlap: usize) -> Self {
        Self::new(SplitterConfig {
            chunk_size,
            chunk_overlap,
            ..SplitterConfig::default()
        })
    }

    /// Configured chunk size.
    #[must_use]
    pub const fn chunk_size(&self) -> usize {
        self.config.chunk_size
    }

    /// Split every document, numbering chunks across all of them.
    #[must_use]
    pub fn split_documents(&self, documents: &[Document]) -> Vec<TextChunk> {
        let mut chunks = Vec::new();
        for doc in documents {
            for content in self.split_text(&doc.text) {
                chunks.push(TextChunk {
                    index: chunks.len(),
                    content,
                    source: doc.metadata.source.clone(),
                    page: doc.metadata.page,
                });
            }
        }
        chunks
    }

    /// Split raw text into chunks. Whitespace-only text yields nothing.
    #[must_use]
    pub fn split_text(&self, text: &str) -> Vec<String> {
        let separators: Vec<&str> = self.config.separators.iter().map(String::as_str).collect();
        self.split_recursive(text, &separators)
    }

    fn split_recursive(&self, text: &str, separators: &[&str]) -> Vec<String> {
        let mut separator = separators.last().copied().unwrap_or("");
        let mut remaining: &[&str] = &[];

        for (i, sep) in separators.iter().enumerate() {
            if sep.is_empty() {
                separator = sep;
                break;
            }
            if text.contains(sep) {
                separator = sep;
                remaining = &separators[i + 1..];
                break;
            }
        }

        let mut final_chunks = Vec::new();
        let mut good_splits: Vec<&str> = Vec::new();

        for piece in split_keep_separator(text, separator) {
            if char_len(piece) < self.config.chunk_size {
                good_splits.push(piece);
                continue;
            }

            if !good_splits.is_empty() {
                final_chunks.extend(self.merge_splits(&good_splits));
                good_splits.clear();
            }

            if remaining.is_empty() {
                final_chunks.push(piece.to_string());
            } else {
                final_chunks.extend(self.split_recursive(piece, remaining));
            }
        }

        if !good_splits.is_empty() {
            final_chunks.extend(self.merge_splits(&good_splits));
        }

        final_chunks
    }

    fn merge_splits(&self, splits: &[&str]) -> Vec<String> {
        let chunk_size = self.config.chunk_size;
        let overlap = self.config.chunk_overlap;

        let mut docs = Vec::new();
        let mut current: std::collections::VecDeque<&str> = std::collections::VecDeque::new();
        let mut total = 0usize;

        for split in splits {
            let len = char_len(split);

            if total + len > chunk_size {
                if total > chunk_size {
                    tracing::warn!(total, chunk_size, "Created a chunk longer than chunk_size");
                }
                if !current.is_empty() {
                    if let Some(doc) = join_docs(&current) {
                        docs.push(doc);
                    }
                    while total > overlap || (total + len > chunk_size && total > 0) {
                        match current.pop_front() {
                            Some(front) => total -= char_len(front),
                            None => break,
                        }
                    }
                }
            }

            current.push_back(split);
            total += len;
        }

        if let Some(doc) = join_docs(&current) {
            docs.push(doc);
        }

        docs
    }
}

impl Default for TextSplitter {
    fn default() -> Self {
        Self::new(SplitterConfig::default())
    }
}

fn join_docs(parts: &std::collections::VecDeque<&str>) -> Option<String> {
    let joined: String = parts.iter().copied().collect();
    let trimmed = joined.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

/// Split on `separator`, keeping each separator at the start of the piece
/// after it. An empty separator splits into characters. Empty pieces are
/// dropped.
fn split_keep_separator<'a>(text: &'a str, separator: &str) -> Vec<&'a str> {
    if separator.is_empty() {
        return text
            .char_indices()
            .map(|(i, c)| &text[i..i + c.len_utf8()])
            .collect();
    }

    let mut pieces = Vec::new();
    let mut start = 0;
    for (idx, _) in text.match_indices(separator) {
        pieces.push(&text[start..idx]);
        start = idx;
    }
    pieces.push(&text[start..]);

    pieces.into_iter().filter(|p| !p.is_empty()).collect()
}
