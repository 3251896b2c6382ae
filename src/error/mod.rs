//! Error types and Result aliases for ragsync.
//!
//! This module defines the error hierarchy used throughout the crate.
//! All public functions return `Result<T, Error>` or `Result<T>`.

use thiserror::Error;

/// Result type alias using ragsync's Error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for ragsync operations.
#[derive(Error, Debug)]
pub enum Error {
    /// Configuration error (including a missing credential).
    #[error("configuration error: {0}")]
    Config(String),

    /// Path argument does not exist.
    #[error("path not found: {0}")]
    NotFound(String),

    /// Path argument exists but is not a directory.
    #[error("not a directory: {0}")]
    NotADirectory(String),

    /// Path argument exists but is not a regular file.
    #[error("not a file: {0}")]
    NotAFile(String),

    /// File extension is not in the supported set.
    #[error("unsupported file type '{extension}': {path}")]
    UnsupportedType { path: String, extension: String },

    /// File exceeds the configured size limit.
    #[error("file too large ({size} bytes, limit {limit}): {path}")]
    FileTooLarge { path: String, size: u64, limit: u64 },

    /// Question or query rejected before retrieval.
    #[error("invalid query: {0}")]
    InvalidQuery(String),

    /// Enumeration produced no candidate files.
    #[error("no documents found to index in {0}")]
    NoDocuments(String),

    /// Database/storage error.
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    /// Document loading or chunking error.
    #[error("ingest error: {0}")]
    Ingest(#[from] IngestError),

    /// Language model error.
    #[error("generation error: {0}")]
    Generation(#[from] GenerationError),

    /// Operation stopped by a cancellation request.
    #[error("operation cancelled")]
    Cancelled,

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Generic internal error.
    #[error("internal error: {0}")]
    Internal(String),
}

/// Storage-specific errors.
#[derive(Error, Debug)]
pub enum StorageError {
    /// `SQLite` database error.
    #[error("database error: {0}")]
    Database(String),

    /// Schema migration error.
    #[error("migration error: {0}")]
    Migration(String),

    /// Vector operation error.
    #[error("vector error: {0}")]
    Vector(String),

    /// Embedding generation error.
    #[error("embedding error: {0}")]
    Embedding(String),
}

/// Document ingestion errors.
#[derive(Error, Debug)]
pub enum IngestError {
    /// Parser failure for one file.
    #[error("failed to load '{path}': {reason}")]
    Load { path: String, reason: String },

    /// File loaded but yielded no text.
    #[error("no content found in '{0}'")]
    Empty(String),
}

/// Language model errors.
#[derive(Error, Debug)]
pub enum GenerationError {
    /// Network or transport failure.
    #[error("transport error: {0}")]
    Transport(String),

    /// Non-success HTTP status from the API.
    #[error("API error {status}: {body}")]
    Api { status: u16, body: String },

    /// Response could not be interpreted.
    #[error("malformed response: {0}")]
    MalformedResponse(String),
}

impl Error {
    /// Create a configuration error.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create an internal error.
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    /// Whether the failure is local to one file.
    ///
    /// File-local failures are reported and the batch continues; anything
    /// else points at shared infrastructure and aborts the pass.
    #[must_use]
    pub const fn is_file_local(&self) -> bool {
        matches!(
            self,
            Self::NotFound(_)
                | Self::NotAFile(_)
                | Self::UnsupportedType { .. }
                | Self::FileTooLarge { .. }
                | Self::Ingest(_)
                | Self::Io(_)
        )
    }
}

impl GenerationError {
    /// Whether a retry could plausibly succeed.
    #[must_use]
    pub const fn is_transient(&self) -> bool {
        match self {
            Self::Transport(_) => true,
            Self::Api { status, .. } => *status == 429 || *status >= 500,
            Self::MalformedResponse(_) => false,
        }
    }
}
