//! Embedding generation.
//!
//! [`EmbeddingProvider`] is the seam to a concrete model. [`Embedder`] wraps a
//! provider with batching, output validation, and the device chosen at
//! startup.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info};

use crate::config::RagConfig;
use crate::device::{AcceleratorDetector, Device, resolve_device};
use crate::error::{RagError, Result};
use crate::hash::HashEmbeddingProvider;

/// The model that produced a set of vectors.
///
/// Vectors from different identities live in different vector spaces and must
/// never be compared.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ModelIdentity {
    /// The model name, e.g. `BAAI/bge-small-en-v1.5`.
    pub model_name: String,
    /// The vector dimensionality.
    pub dimensions: usize,
}

impl ModelIdentity {
    /// Create a model identity.
    pub fn new(model_name: impl Into<String>, dimensions: usize) -> Self {
        Self { model_name: model_name.into(), dimensions }
    }
}

impl fmt::Display for ModelIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "'{}' ({} dimensions)", self.model_name, self.dimensions)
    }
}

/// A provider that generates vector embeddings from text input.
///
/// The default [`embed_batch`](EmbeddingProvider::embed_batch)
/// implementation calls [`embed`](EmbeddingProvider::embed) sequentially;
/// backends that support native batching should override it. Every text,
/// including the empty string, must map to a vector of
/// [`dimensions()`](EmbeddingProvider::dimensions) values, and a text's vector
/// must not depend on the other texts in its batch.
///
/// # Example
///
/// ```rust,ignore
/// use vault_rag::EmbeddingProvider;
///
/// let provider = MyEmbeddingProvider::new();
/// let embedding = provider.embed("hello world").await?;
/// assert_eq!(embedding.len(), provider.dimensions());
/// ```
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// Generate an embedding vector for a single text input.
    async fn embed(&self, text: &str) -> Result<Vec<f32>>;

    /// Generate embedding vectors for a batch of text inputs.
    async fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>> {
        let mut results = Vec::with_capacity(texts.len());
        for text in texts {
            results.push(self.embed(text).await?);
        }
        Ok(results)
    }

    /// Return the dimensionality of embeddings produced by this provider.
    fn dimensions(&self) -> usize;

    /// Return the name of the underlying model.
    fn model_name(&self) -> &str;

    /// Return the identity recorded alongside stored vectors.
    fn identity(&self) -> ModelIdentity {
        ModelIdentity::new(self.model_name(), self.dimensions())
    }
}

/// Load a provider on the blocking thread pool, bounded by `timeout`.
///
/// Model loading may download weights and initialise a device, so it must not
/// block the async runtime or hang indefinitely.
///
/// # Errors
///
/// Returns the loader's own error, or [`RagError::ResourceError`] if the
/// loader panicked or did not finish within `timeout`.
pub async fn load_with_timeout<P, F>(
    timeout: Duration,
    load: F,
) -> Result<Arc<dyn EmbeddingProvider>>
where
    P: EmbeddingProvider + 'static,
    F: FnOnce() -> Result<P> + Send + 'static,
{
    let task = tokio::task::spawn_blocking(load);
    match tokio::time::timeout(timeout, task).await {
        Ok(Ok(Ok(provider))) => Ok(Arc::new(provider)),
        Ok(Ok(Err(e))) => Err(e),
        Ok(Err(join_error)) => {
            error!(error = %join_error, "model loading task failed");
            Err(RagError::ResourceError(format!("model loading task failed: {join_error}")))
        }
        Err(_) => {
            error!(timeout_secs = timeout.as_secs(), "model loading timed out");
            Err(RagError::ResourceError(format!("model loading did not finish within {timeout:?}")))
        }
    }
}

/// Batched, validated access to one embedding model on one device.
///
/// Construct it once at startup and share it; both ingestion and queries go
/// through the same instance so they always use the same model.
pub struct Embedder {
    provider: Arc<dyn EmbeddingProvider>,
    batch_size: usize,
    device: Device,
}

impl fmt::Debug for Embedder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Embedder")
            .field("model", &self.provider.identity())
            .field("batch_size", &self.batch_size)
            .field("device", &self.device)
            .finish()
    }
}

impl Embedder {
    /// Wrap a provider.
    ///
    /// `device` is the already-resolved device the provider runs on.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::ConfigError`] if `batch_size` is zero or the
    /// provider reports zero dimensions.
    pub fn new(
        provider: Arc<dyn EmbeddingProvider>,
        batch_size: usize,
        device: Device,
    ) -> Result<Self> {
        if batch_size == 0 {
            return Err(RagError::ConfigError(
                "embedding_batch_size must be greater than zero".to_string(),
            ));
        }
        if provider.dimensions() == 0 {
            return Err(RagError::ConfigError(format!(
                "embedding model '{}' reports zero dimensions",
                provider.model_name()
            )));
        }
        Ok(Self { provider, batch_size, device })
    }

    /// Build the embedder described by `config`.
    ///
    /// Resolves the device through `detector`, then loads the model named by
    /// `embedding_model_name`. Names starting with
    /// [`HASH_MODEL_NAME`](crate::hash::HASH_MODEL_NAME) select the built-in
    /// hashing provider; any other name is loaded with the `fastembed` backend.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::ConfigError`] for an invalid configuration or a
    /// model this build cannot load, and [`RagError::ResourceError`] if loading
    /// fails or exceeds `model_load_timeout_secs`.
    pub async fn from_config(
        config: &RagConfig,
        detector: &dyn AcceleratorDetector,
    ) -> Result<Self> {
        config.validate()?;
        let device = resolve_device(config.device, detector);
        let timeout = Duration::from_secs(config.model_load_timeout_secs);

        let provider = match HashEmbeddingProvider::from_model_name(&config.embedding_model_name) {
            Some(provider) => Arc::new(provider?) as Arc<dyn EmbeddingProvider>,
            None => load_named_model(config.embedding_model_name.clone(), device, timeout).await?,
        };

        info!(
            model = provider.model_name(),
            dimensions = provider.dimensions(),
            %device,
            batch_size = config.embedding_batch_size,
            "embedding model ready"
        );
        Self::new(provider, config.embedding_batch_size, device)
    }

    /// The identity of the wrapped model.
    pub fn identity(&self) -> ModelIdentity {
        self.provider.identity()
    }

    /// The vector dimensionality.
    pub fn dimensions(&self) -> usize {
        self.provider.dimensions()
    }

    /// The device resolved at construction.
    pub fn device(&self) -> Device {
        self.device
    }

    /// Maximum number of texts sent to the provider at once.
    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    /// Embed `texts`, returning one vector per input in the same order.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::EmbeddingError`] if the provider fails or returns the
    /// wrong number of vectors or a vector of the wrong length.
    pub async fn embed(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>> {
        let dimensions = self.provider.dimensions();
        let mut vectors = Vec::with_capacity(texts.len());

        for (batch_index, batch) in texts.chunks(self.batch_size).enumerate() {
            debug!(batch_index, batch_len = batch.len(), device = %self.device, "embedding batch");
            let batch_vectors = self.provider.embed_batch(batch).await?;

            if batch_vectors.len() != batch.len() {
                return Err(self.provider_error(format!(
                    "returned {} vectors for a batch of {} texts",
                    batch_vectors.len(),
                    batch.len()
                )));
            }
            if let Some(bad) = batch_vectors.iter().find(|v| v.len() != dimensions) {
                return Err(self.provider_error(format!(
                    "returned a vector of length {} (expected {dimensions})",
                    bad.len()
                )));
            }
            vectors.extend(batch_vectors);
        }

        Ok(vectors)
    }

    /// Embed a single query string.
    ///
    /// # Errors
    ///
    /// Same as [`embed`](Embedder::embed).
    pub async fn embed_query(&self, query: &str) -> Result<Vec<f32>> {
        let mut vectors = self.embed(&[query]).await?;
        vectors.pop().ok_or_else(|| self.provider_error("returned no vector for query".to_string()))
    }

    fn provider_error(&self, message: String) -> RagError {
        RagError::EmbeddingError { provider: self.provider.model_name().to_string(), message }
    }
}

#[cfg(feature = "fastembed")]
async fn load_named_model(
    model_name: String,
    device: Device,
    timeout: Duration,
) -> Result<Arc<dyn EmbeddingProvider>> {
    load_with_timeout(timeout, move || {
        crate::fastembed_provider::FastEmbedProvider::new(&model_name, device)
    })
    .await
}

#[cfg(not(feature = "fastembed"))]
async fn load_named_model(
    model_name: String,
    _device: Device,
    _timeout: Duration,
) -> Result<Arc<dyn EmbeddingProvider>> {
    Err(RagError::ConfigError(format!(
        "embedding model '{model_name}' requires the `fastembed` feature"
    )))
}
