//! Deterministic feature-hashing embedding provider.
//!
//! [`HashEmbeddingProvider`] needs no model files: lowercase word tokens and
//! boundary-marked character trigrams are hashed into a fixed number of
//! buckets and the resulting count vector is L2-normalized. Texts sharing
//! words or word fragments land close together, which is enough for offline
//! use and for tests that need stable, batch-independent vectors.

use async_trait::async_trait;

use crate::embedding::EmbeddingProvider;
use crate::error::{RagError, Result};

/// Model name of the hashing provider.
pub const HASH_MODEL_NAME: &str = "hash-ngram-v1";

/// Dimensionality used when the model name has no `:<dims>` suffix.
pub const DEFAULT_HASH_DIMENSIONS: usize = 384;

const FNV_OFFSET: u64 = 0xcbf2_9ce4_8422_2325;
const FNV_PRIME: u64 = 0x0000_0100_0000_01b3;

/// An [`EmbeddingProvider`] that hashes word and trigram features.
///
/// # Example
///
/// ```rust,ignore
/// use vault_rag::HashEmbeddingProvider;
///
/// let provider = HashEmbeddingProvider::new(256)?;
/// let embedding = provider.embed("quantum mechanics").await?;
/// assert_eq!(embedding.len(), 256);
/// ```
#[derive(Debug, Clone)]
pub struct HashEmbeddingProvider {
    dimensions: usize,
}

impl HashEmbeddingProvider {
    /// Create a provider producing vectors of `dimensions` values.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::ConfigError`] if `dimensions` is zero.
    pub fn new(dimensions: usize) -> Result<Self> {
        if dimensions == 0 {
            return Err(RagError::ConfigError(
                "hash embedding dimensions must be greater than zero".to_string(),
            ));
        }
        Ok(Self { dimensions })
    }

    /// Parse `hash-ngram-v1` or `hash-ngram-v1:<dims>`.
    ///
    /// Returns `None` if `name` does not refer to this provider.
    pub fn from_model_name(name: &str) -> Option<Result<Self>> {
        let rest = name.strip_prefix(HASH_MODEL_NAME)?;
        if rest.is_empty() {
            return Some(Self::new(DEFAULT_HASH_DIMENSIONS));
        }
        let dims = rest.strip_prefix(':')?;
        let parsed = dims.parse::<usize>().map_err(|e| {
            RagError::ConfigError(format!("invalid hash embedding dimensions '{dims}': {e}"))
        });
        Some(parsed.and_then(Self::new))
    }

    /// Compute the embedding synchronously.
    pub fn embed_sync(&self, text: &str) -> Vec<f32> {
        let mut vector = vec![0.0f32; self.dimensions];

        for word in text
            .split(|c: char| !c.is_alphanumeric())
            .filter(|w| !w.is_empty())
            .map(str::to_lowercase)
        {
            self.add_feature(&mut vector, word.as_bytes());

            let marked: Vec<char> =
                std::iter::once('#').chain(word.chars()).chain(std::iter::once('#')).collect();
            for window in marked.windows(3) {
                let trigram: String = window.iter().collect();
                self.add_feature(&mut vector, trigram.as_bytes());
            }
        }

        let norm = vector.iter().map(|x| x * x).sum::<f32>().sqrt();
        if norm > 0.0 {
            for value in &mut vector {
                *value /= norm;
            }
        }
        vector
    }

    fn add_feature(&self, vector: &mut [f32], feature: &[u8]) {
        let bucket = (fnv1a(feature) % self.dimensions as u64) as usize;
        vector[bucket] += 1.0;
    }
}

/// 64-bit FNV-1a. Persisted vectors depend on this exact output.
fn fnv1a(bytes: &[u8]) -> u64 {
    bytes.iter().fold(FNV_OFFSET, |hash, byte| (hash ^ u64::from(*byte)).wrapping_mul(FNV_PRIME))
}

#[async_trait]
impl EmbeddingProvider for HashEmbeddingProvider {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        Ok(self.embed_sync(text))
    }

    async fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>> {
        Ok(texts.iter().map(|text| self.embed_sync(text)).collect())
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }

    fn model_name(&self) -> &str {
        HASH_MODEL_NAME
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dot(a: &[f32], b: &[f32]) -> f32 {
        a.iter().zip(b).map(|(x, y)| x * y).sum()
    }

    #[test]
    fn fnv1a_matches_reference_values() {
        assert_eq!(fnv1a(b""), 0xcbf2_9ce4_8422_2325);
        assert_eq!(fnv1a(b"a"), 0xaf63_dc4c_8601_ec8c);
    }

    #[test]
    fn vectors_are_unit_length_or_zero() {
        let provider = HashEmbeddingProvider::new(64).unwrap();
        let v = provider.embed_sync("Machine learning is a branch of AI");
        assert!((dot(&v, &v) - 1.0).abs() < 1e-5);
        assert!(provider.embed_sync("").iter().all(|x| *x == 0.0));
        assert_eq!(provider.embed_sync("").len(), 64);
    }

    #[test]
    fn shared_words_score_higher() {
        let provider = HashEmbeddingProvider::new(384).unwrap();
        let query = provider.embed_sync("quantum mechanics");
        let related = provider.embed_sync("Quantum mechanics describes atoms.");
        let unrelated = provider.embed_sync("Deep learning imitates human learning.");
        assert!(dot(&query, &related) > dot(&query, &unrelated));
    }

    #[test]
    fn model_name_parsing() {
        let default = HashEmbeddingProvider::from_model_name("hash-ngram-v1").unwrap().unwrap();
        assert_eq!(default.dimensions, DEFAULT_HASH_DIMENSIONS);
        let sized = HashEmbeddingProvider::from_model_name("hash-ngram-v1:32").unwrap().unwrap();
        assert_eq!(sized.dimensions, 32);
        assert!(HashEmbeddingProvider::from_model_name("hash-ngram-v1:0").unwrap().is_err());
        assert!(HashEmbeddingProvider::from_model_name("hash-ngram-v1:x").unwrap().is_err());
        assert!(HashEmbeddingProvider::from_model_name("hash-ngram-v1x").is_none());
        assert!(HashEmbeddingProvider::from_model_name("BAAI/bge-small-en-v1.5").is_none());
    }
}
