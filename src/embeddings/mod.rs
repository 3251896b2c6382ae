//! Embedding generation for chunk and query text.
//!
//! The vector index only needs something implementing [`Embedder`]. The
//! bundled [`HashEmbedder`] is a local, deterministic feature-hashing model
//! that needs no network or model files.

mod hashing;

pub use hashing::HashEmbedder;

use crate::Result;

/// Default embedding dimension.
pub const DEFAULT_EMBEDDING_DIM: usize = 384;

/// Turns text into fixed-size vectors.
pub trait Embedder: Send + Sync {
    /// Output vector dimension.
    fn dimension(&self) -> usize;

    /// Embed a batch of texts, one vector per input in order.
    ///
    /// # Errors
    ///
    /// Returns an error if embedding fails.
    fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>>;

    /// Embed a single text.
    ///
    /// # Errors
    ///
    /// Returns an error if embedding fails.
    fn embed_one(&self, text: &str) -> Result<Vec<f32>> {
        self.embed(&[text.to_string()])?
            .pop()
            .ok_or_else(|| crate::Error::internal("embedder returned no vector"))
    }
}
