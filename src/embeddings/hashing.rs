//! Feature-hashing embedder.

use super::{Embedder, DEFAULT_EMBEDDING_DIM};
use crate::Result;

/// Deterministic bag-of-words embedder.
///
/// Each lower-cased alphanumeric token is hashed with BLAKE3 into one of
/// `dimension` buckets with a hash-derived sign, then the vector is
/// L2-normalized. Texts sharing vocabulary land close together, which is
/// enough for nearest-neighbour retrieval over small corpora.
#[derive(Debug, Clone)]
pub struct HashEmbedder {
    dimension: usize,
}

impl HashEmbedder {
    /// Create an embedder producing vectors of `dimension` floats.
    #[must_use]
    pub fn new(dimension: usize) -> Self {
        Self {
            dimension: dimension.max(1),
        }
    }

    #[allow(clippy::cast_possible_truncation)]
    fn embed_text(&self, text: &str) -> Vec<f32> {
        let mut embedding = vec![0.0f32; self.dimension];

        for token in text
            .split(|c: char| !c.is_alphanumeric())
            .filter(|t| !t.is_empty())
        {
            let token = token.to_lowercase();
            let hash = blake3::hash(token.as_bytes());
            let bytes = hash.as_bytes();

            let mut bucket_bytes = [0u8; 8];
            bucket_bytes.copy_from_slice(&bytes[..8]);
            let bucket = (u64::from_le_bytes(bucket_bytes) % self.dimension as u64) as usize;
            let sign = if bytes[8] & 1 == 0 { 1.0 } else { -1.0 };

            embedding[bucket] += sign;
        }

        let norm: f32 = embedding.iter().map(|x| x * x).sum::<f32>().sqrt();
        if norm > 0.0 {
            for v in &mut embedding {
                *v /= norm;
            }
        }

        embedding
    }
}

impl Default for HashEmbedder {
    fn default() -> Self {
        Self::new(DEFAULT_EMBEDDING_DIM)
    }
}

impl Embedder for HashEmbedder {
    fn dimension(&self) -> usize {
        self.dimension
    }

    fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        Ok(texts.iter().map(|t| self.embed_text(t)).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dot(a: &[f32], b: &[f32]) -> f32 {
        a.iter().zip(b).map(|(x, y)| x * y).sum()
    }

    #[test]
    fn test_deterministic_and_normalized() {
        let embedder = HashEmbedder::default();
        let a = embedder.embed_one("hello world").unwrap();
        let b = embedder.embed_one("hello world").unwrap();

        assert_eq!(a, b);
        assert_eq!(a.len(), DEFAULT_EMBEDDING_DIM);

        let norm: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 0.001);
    }

    #[test]
    fn test_case_and_punctuation_insensitive() {
        let embedder = HashEmbedder::default();
        let a = embedder.embed_one("Hello, World!").unwrap();
        let b = embedder.embed_one("hello world").unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_shared_vocabulary_is_closer() {
        let embedder = HashEmbedder::default();
        let query = embedder.embed_one("rust ownership borrowing").unwrap();
        let related = embedder.embed_one("ownership and borrowing in rust").unwrap();
        let unrelated = embedder.embed_one("banana bread recipe").unwrap();

        assert!(dot(&query, &related) > dot(&query, &unrelated));
    }

    #[test]
    fn test_empty_text_is_zero_vector() {
        let embedder = HashEmbedder::new(8);
        let v = embedder.embed_one("  ...  ").unwrap();
        assert_eq!(v, vec![0.0; 8]);
    }

    #[test]
    fn test_batch_preserves_order() {
        let embedder = HashEmbedder::new(16);
        let texts = vec!["alpha".to_string(), "beta".to_string()];
        let batch = embedder.embed(&texts).unwrap();

        assert_eq!(batch.len(), 2);
        assert_eq!(batch[0], embedder.embed_one("alpha").unwrap());
        assert_eq!(batch[1], embedder.embed_one("beta").unwrap());
    }
}
