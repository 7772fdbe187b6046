//! Local sentence-embedding models served by `fastembed` (ONNX runtime).
//!
//! This module is only available when the `fastembed` feature is enabled.

use std::sync::Arc;

use async_trait::async_trait;
use fastembed::{InitOptions, TextEmbedding};
use tracing::{debug, error, info};

use crate::device::Device;
use crate::embedding::EmbeddingProvider;
use crate::error::{RagError, Result};

const PROVIDER: &str = "fastembed";

/// An [`EmbeddingProvider`] running a pretrained model locally.
///
/// The model is identified by its model code, e.g. `BAAI/bge-small-en-v1.5`.
/// Weights are downloaded into the fastembed cache on first use. Inference
/// runs on the blocking thread pool.
///
/// # Example
///
/// ```rust,ignore
/// use vault_rag::{Device, FastEmbedProvider};
///
/// let provider = FastEmbedProvider::new("BAAI/bge-small-en-v1.5", Device::Fallback)?;
/// assert_eq!(provider.dimensions(), 384);
/// ```
pub struct FastEmbedProvider {
    model: Arc<TextEmbedding>,
    model_name: String,
    dimensions: usize,
}

impl FastEmbedProvider {
    /// Load `model_name` for `device`.
    ///
    /// This blocks while weights are fetched and the session is created; call
    /// it through [`load_with_timeout`](crate::embedding::load_with_timeout).
    ///
    /// # Errors
    ///
    /// Returns [`RagError::ConfigError`] for an unknown model code and
    /// [`RagError::ResourceError`] if the model cannot be initialised.
    pub fn new(model_name: &str, device: Device) -> Result<Self> {
        let info = TextEmbedding::list_supported_models()
            .into_iter()
            .find(|info| info.model_code == model_name)
            .ok_or_else(|| {
                RagError::ConfigError(format!("unsupported embedding model '{model_name}'"))
            })?;

        let options = with_device(InitOptions::new(info.model.clone()), device)
            .with_show_download_progress(false);

        info!(model = model_name, %device, "loading embedding model");
        let model = TextEmbedding::try_new(options).map_err(|e| {
            error!(model = model_name, error = %e, "failed to load embedding model");
            RagError::ResourceError(format!("failed to load embedding model '{model_name}': {e}"))
        })?;

        Ok(Self {
            model: Arc::new(model),
            model_name: model_name.to_string(),
            dimensions: info.dim,
        })
    }
}

#[cfg(feature = "cuda")]
fn with_device(options: InitOptions, device: Device) -> InitOptions {
    use ort::execution_providers::CUDAExecutionProvider;

    match device {
        Device::Accelerated => {
            options.with_execution_providers(vec![CUDAExecutionProvider::default().build()])
        }
        Device::Fallback => options,
    }
}

#[cfg(not(feature = "cuda"))]
fn with_device(options: InitOptions, _device: Device) -> InitOptions {
    options
}

#[async_trait]
impl EmbeddingProvider for FastEmbedProvider {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let results = self.embed_batch(&[text]).await?;
        results.into_iter().next().ok_or_else(|| RagError::EmbeddingError {
            provider: PROVIDER.into(),
            message: "model returned no embedding".into(),
        })
    }

    async fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        debug!(
            provider = PROVIDER,
            batch_size = texts.len(),
            model = %self.model_name,
            "embedding batch"
        );

        let model = Arc::clone(&self.model);
        let owned: Vec<String> = texts.iter().map(|t| (*t).to_string()).collect();
        let batch_len = owned.len();

        let embeddings = tokio::task::spawn_blocking(move || model.embed(owned, Some(batch_len)))
            .await
            .map_err(|e| RagError::EmbeddingError {
                provider: PROVIDER.into(),
                message: format!("inference task failed: {e}"),
            })?
            .map_err(|e| {
                error!(provider = PROVIDER, error = %e, "inference failed");
                RagError::EmbeddingError {
                    provider: PROVIDER.into(),
                    message: format!("inference failed: {e}"),
                }
            })?;

        Ok(embeddings)
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }

    fn model_name(&self) -> &str {
        &self.model_name
    }
}
