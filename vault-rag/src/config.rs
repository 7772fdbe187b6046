//! Configuration for the retrieval pipeline.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::chunking::{ChunkStrategy, validate_window};
use crate::device::Device;
use crate::error::{RagError, Result};

/// Configuration parameters for the retrieval pipeline.
///
/// Missing fields take their [`Default`] values when deserializing.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct RagConfig {
    /// Maximum chunk size in characters.
    pub chunk_size: usize,
    /// Number of overlapping characters between consecutive chunks.
    pub chunk_overlap: usize,
    /// How documents are split into chunks.
    pub chunk_strategy: ChunkStrategy,
    /// Name of the sentence-embedding model.
    pub embedding_model_name: String,
    /// Requested compute device for embedding.
    pub device: Device,
    /// Number of texts embedded per provider call.
    pub embedding_batch_size: usize,
    /// Directory holding the persistent vector store.
    pub vector_store_path: PathBuf,
    /// Name of the collection inside the vector store.
    pub collection_name: String,
    /// Number of results returned when a caller does not specify one.
    pub top_k: usize,
    /// Upper bound on model loading and device initialisation, in seconds.
    pub model_load_timeout_secs: u64,
}

impl Default for RagConfig {
    fn default() -> Self {
        Self {
            chunk_size: 1000,
            chunk_overlap: 200,
            chunk_strategy: ChunkStrategy::Fixed,
            embedding_model_name: "BAAI/bge-small-en-v1.5".to_string(),
            device: Device::Accelerated,
            embedding_batch_size: 32,
            vector_store_path: PathBuf::from("data/vector_db"),
            collection_name: "scholars_vault".to_string(),
            top_k: 5,
            model_load_timeout_secs: 300,
        }
    }
}

impl RagConfig {
    /// Create a new builder for constructing a [`RagConfig`].
    pub fn builder() -> RagConfigBuilder {
        RagConfigBuilder::default()
    }

    /// Deserialize a configuration from JSON and validate it.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::ConfigError`] if the JSON is malformed or the
    /// resulting configuration is invalid.
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)
            .map_err(|e| RagError::ConfigError(format!("invalid configuration: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    /// Check that the parameters are consistent.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::ConfigError`] if:
    /// - `chunk_size == 0` or `chunk_overlap >= chunk_size`
    /// - `embedding_batch_size == 0`
    /// - `top_k == 0`
    /// - `model_load_timeout_secs == 0`
    /// - `embedding_model_name` or `collection_name` is blank
    pub fn validate(&self) -> Result<()> {
        validate_window(self.chunk_size, self.chunk_overlap)?;
        if self.embedding_batch_size == 0 {
            return Err(RagError::ConfigError(
                "embedding_batch_size must be greater than zero".to_string(),
            ));
        }
        if self.top_k == 0 {
            return Err(RagError::ConfigError("top_k must be greater than zero".to_string()));
        }
        if self.model_load_timeout_secs == 0 {
            return Err(RagError::ConfigError(
                "model_load_timeout_secs must be greater than zero".to_string(),
            ));
        }
        if self.embedding_model_name.trim().is_empty() {
            return Err(RagError::ConfigError("embedding_model_name must not be empty".to_string()));
        }
        if self.collection_name.trim().is_empty() {
            return Err(RagError::ConfigError("collection_name must not be empty".to_string()));
        }
        Ok(())
    }
}

/// Builder for constructing a validated [`RagConfig`].
#[derive(Debug, Clone, Default)]
pub struct RagConfigBuilder {
    config: RagConfig,
}

impl RagConfigBuilder {
    /// Set the maximum chunk size in characters.
    pub fn chunk_size(mut self, size: usize) -> Self {
        self.config.chunk_size = size;
        self
    }

    /// Set the overlap between consecutive chunks in characters.
    pub fn chunk_overlap(mut self, overlap: usize) -> Self {
        self.config.chunk_overlap = overlap;
        self
    }

    /// Set the chunking strategy.
    pub fn chunk_strategy(mut self, strategy: ChunkStrategy) -> Self {
        self.config.chunk_strategy = strategy;
        self
    }

    /// Set the embedding model name.
    pub fn embedding_model_name(mut self, name: impl Into<String>) -> Self {
        self.config.embedding_model_name = name.into();
        self
    }

    /// Set the requested compute device.
    pub fn device(mut self, device: Device) -> Self {
        self.config.device = device;
        self
    }

    /// Set the number of texts embedded per provider call.
    pub fn embedding_batch_size(mut self, size: usize) -> Self {
        self.config.embedding_batch_size = size;
        self
    }

    /// Set the directory of the persistent vector store.
    pub fn vector_store_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.vector_store_path = path.into();
        self
    }

    /// Set the collection name.
    pub fn collection_name(mut self, name: impl Into<String>) -> Self {
        self.config.collection_name = name.into();
        self
    }

    /// Set the default number of search results.
    pub fn top_k(mut self, k: usize) -> Self {
        self.config.top_k = k;
        self
    }

    /// Set the model loading timeout in seconds.
    pub fn model_load_timeout_secs(mut self, secs: u64) -> Self {
        self.config.model_load_timeout_secs = secs;
        self
    }

    /// Build the [`RagConfig`], validating that parameters are consistent.
    ///
    /// # Errors
    ///
    /// See [`RagConfig::validate`].
    pub fn build(self) -> Result<RagConfig> {
        self.config.validate()?;
        Ok(self.config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        RagConfig::default().validate().unwrap();
    }

    #[test]
    fn overlap_must_be_smaller_than_size() {
        let err = RagConfig::builder().chunk_size(100).chunk_overlap(100).build().unwrap_err();
        assert!(err.is_fatal_configuration());
    }

    #[test]
    fn json_uses_defaults_for_missing_fields() {
        let config =
            RagConfig::from_json_str(r#"{ "chunk_size": 400, "device": "fallback" }"#).unwrap();
        assert_eq!(config.chunk_size, 400);
        assert_eq!(config.chunk_overlap, 200);
        assert_eq!(config.device, Device::Fallback);
        assert_eq!(config.collection_name, "scholars_vault");
        assert_eq!(config.chunk_strategy, ChunkStrategy::Fixed);
    }

    #[test]
    fn json_selects_chunk_strategy() {
        let config = RagConfig::from_json_str(r#"{ "chunk_strategy": "recursive" }"#).unwrap();
        assert_eq!(config.chunk_strategy, ChunkStrategy::Recursive);
        assert!(RagConfig::from_json_str(r#"{ "chunk_strategy": "semantic" }"#).is_err());
    }

    #[test]
    fn json_with_invalid_window_fails_at_load() {
        let err = RagConfig::from_json_str(r#"{ "chunk_size": 100, "chunk_overlap": 150 }"#)
            .unwrap_err();
        assert!(matches!(err, RagError::ConfigError(_)));
    }

    #[test]
    fn json_with_unknown_device_fails() {
        assert!(RagConfig::from_json_str(r#"{ "device": "tpu" }"#).is_err());
    }
}
