//! Retrieval pipeline orchestrator.
//!
//! The [`RagPipeline`] coordinates the ingest-and-query workflow by composing
//! one [`Embedder`], one [`VectorStore`], and a [`Chunker`].
//!
//! Each ingestion moves a document through `loaded → chunked → embedded →
//! stored`. A failing stage aborts that document only; the error names the
//! stage that was not reached and documents stored earlier are untouched.
//!
//! # Example
//!
//! ```rust,ignore
//! use vault_rag::{RagConfig, RagPipeline, default_detector};
//!
//! let pipeline = RagPipeline::open(RagConfig::default(), default_detector().as_ref()).await?;
//! pipeline.ingest(&document).await?;
//! let results = pipeline.search("search query", 5).await?;
//! ```

use std::collections::HashMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::{error, info, warn};

use crate::chunking::Chunker;
use crate::config::RagConfig;
use crate::device::AcceleratorDetector;
use crate::document::{Document, SearchFilter, SearchResult, StoredRecord};
use crate::embedding::Embedder;
use crate::error::{IngestionStage, RagError, Result};
use crate::sqlite::SqliteVectorStore;
use crate::vectorstore::{CollectionStats, VectorStore};

/// Outcome of ingesting one document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IngestionReport {
    /// The ingested document.
    pub source_id: String,
    /// Number of chunks the chunker produced.
    pub chunks_created: usize,
    /// Number of records written to the store.
    pub chunks_stored: usize,
    /// Number of records from a previous ingestion that were replaced.
    pub chunks_replaced: usize,
}

/// A document that could not be ingested as part of a batch.
#[derive(Debug)]
pub struct IngestionFailure {
    /// The document that failed.
    pub source_id: String,
    /// Why it failed.
    pub error: RagError,
}

/// Outcome of [`RagPipeline::ingest_batch`].
#[derive(Debug, Default)]
pub struct IngestionSummary {
    /// Reports for documents that were stored, in input order.
    pub reports: Vec<IngestionReport>,
    /// Documents that failed, in input order.
    pub failures: Vec<IngestionFailure>,
}

impl IngestionSummary {
    /// Total records stored across all successful documents.
    pub fn chunks_stored(&self) -> usize {
        self.reports.iter().map(|r| r.chunks_stored).sum()
    }

    /// Whether every document was ingested.
    pub fn is_complete(&self) -> bool {
        self.failures.is_empty()
    }
}

/// The retrieval pipeline orchestrator.
///
/// Holds the single embedder and vector store used for both ingestion and
/// queries, so stored chunks and queries are always embedded by the same
/// model. Ingestion is serialized per source; searches and ingestion of
/// different sources run concurrently.
pub struct RagPipeline {
    config: RagConfig,
    embedder: Embedder,
    vector_store: Arc<dyn VectorStore>,
    chunker: Arc<dyn Chunker>,
    source_locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl std::fmt::Debug for RagPipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RagPipeline")
            .field("config", &self.config)
            .field("embedder", &self.embedder)
            .field("collection", &self.vector_store.collection_name())
            .finish_non_exhaustive()
    }
}

impl RagPipeline {
    /// Create a new [`RagPipelineBuilder`].
    pub fn builder() -> RagPipelineBuilder {
        RagPipelineBuilder::default()
    }

    /// Build the embedder described by `config` and open its persistent store.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::ConfigError`] for an invalid configuration,
    /// [`RagError::ModelMismatch`] if the collection was populated by another
    /// model, and a resource error if the model or store cannot be loaded.
    pub async fn open(config: RagConfig, detector: &dyn AcceleratorDetector) -> Result<Self> {
        let embedder = Embedder::from_config(&config, detector).await?;

        let identity = embedder.identity();
        let path = config.vector_store_path.clone();
        let collection = config.collection_name.clone();
        let store = tokio::task::spawn_blocking(move || {
            SqliteVectorStore::open(&path, &collection, &identity)
        })
        .await
        .map_err(|e| RagError::ResourceError(format!("opening vector store failed: {e}")))??;

        Self::builder().config(config).embedder(embedder).vector_store(Arc::new(store)).build()
    }

    /// Return a reference to the pipeline configuration.
    pub fn config(&self) -> &RagConfig {
        &self.config
    }

    /// Return a reference to the embedder.
    pub fn embedder(&self) -> &Embedder {
        &self.embedder
    }

    /// Return a reference to the vector store.
    pub fn vector_store(&self) -> &Arc<dyn VectorStore> {
        &self.vector_store
    }

    /// Ingest a single document: chunk → embed → store.
    ///
    /// Any records previously stored for the document's ID are replaced, so
    /// ingesting an unchanged document twice leaves the store identical.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::ValidationError`] for an empty document ID and
    /// [`RagError::IngestionFailed`] naming the stage that was not reached.
    pub async fn ingest(&self, document: &Document) -> Result<IngestionReport> {
        let source_id = document.id.as_str();
        if source_id.is_empty() {
            return Err(RagError::ValidationError("document id must not be empty".to_string()));
        }

        let lock = self.source_lock(source_id).await;
        let result = {
            let _guard = lock.lock().await;
            self.ingest_locked(document).await
        };
        self.release_source_lock(source_id, lock).await;
        result
    }

    async fn ingest_locked(&self, document: &Document) -> Result<IngestionReport> {
        let source_id = document.id.as_str();
        let chunks = self
            .chunker
            .chunk(document)
            .map_err(|e| stage_failure(source_id, IngestionStage::Chunked, e))?;
        let chunks_created = chunks.len();

        let texts: Vec<&str> = chunks.iter().map(|c| c.text.as_str()).collect();
        let embeddings = self
            .embedder
            .embed(&texts)
            .await
            .map_err(|e| stage_failure(source_id, IngestionStage::Embedded, e))?;

        let records: Vec<StoredRecord> = chunks
            .into_iter()
            .zip(embeddings)
            .map(|(chunk, embedding)| StoredRecord::from_chunk(chunk, embedding))
            .collect();

        let chunks_replaced = self
            .vector_store
            .replace_source(source_id, &records)
            .await
            .map_err(|e| stage_failure(source_id, IngestionStage::Stored, e))?;

        info!(
            document.id = %source_id,
            format = %document.format,
            chunk_count = chunks_created,
            chunks_replaced,
            "ingested document"
        );

        Ok(IngestionReport {
            source_id: source_id.to_string(),
            chunks_created,
            chunks_stored: records.len(),
            chunks_replaced,
        })
    }

    /// Ingest several documents in order.
    ///
    /// A failing document is recorded in the summary and does not stop the
    /// remaining ones.
    pub async fn ingest_batch(&self, documents: &[Document]) -> IngestionSummary {
        let mut summary = IngestionSummary::default();
        for document in documents {
            match self.ingest(document).await {
                Ok(report) => summary.reports.push(report),
                Err(error) => {
                    warn!(document.id = %document.id, error = %error, "skipping document");
                    let source_id = document.id.clone();
                    summary.failures.push(IngestionFailure { source_id, error });
                }
            }
        }
        info!(
            ingested = summary.reports.len(),
            failed = summary.failures.len(),
            chunks_stored = summary.chunks_stored(),
            "batch ingestion completed"
        );
        summary
    }

    /// Return the `top_k` stored chunks most similar to `query`.
    ///
    /// Fewer results are returned when the store holds fewer records.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::ValidationError`] if `top_k` is zero, or the
    /// embedder's or store's error.
    pub async fn search(&self, query: &str, top_k: usize) -> Result<Vec<SearchResult>> {
        self.search_filtered(query, top_k, &SearchFilter::default()).await
    }

    /// Search using the configured default `top_k`.
    ///
    /// # Errors
    ///
    /// Same as [`search`](RagPipeline::search).
    pub async fn query(&self, query: &str) -> Result<Vec<SearchResult>> {
        self.search(query, self.config.top_k).await
    }

    /// Search, keeping only results accepted by `filter`.
    ///
    /// # Errors
    ///
    /// Same as [`search`](RagPipeline::search).
    pub async fn search_filtered(
        &self,
        query: &str,
        top_k: usize,
        filter: &SearchFilter,
    ) -> Result<Vec<SearchResult>> {
        if top_k == 0 {
            return Err(RagError::ValidationError("top_k must be greater than zero".to_string()));
        }

        let embedding = self.embedder.embed_query(query).await.map_err(|e| {
            error!(error = %e, "embedding failed during query");
            e
        })?;

        let results = self.vector_store.search(&embedding, top_k, filter).await.map_err(|e| {
            error!(
                collection = self.vector_store.collection_name(),
                error = %e,
                "vector store search failed"
            );
            e
        })?;

        info!(top_k, result_count = results.len(), "query completed");
        Ok(results)
    }

    /// Statistics of the underlying collection.
    ///
    /// # Errors
    ///
    /// Returns the store's error.
    pub async fn stats(&self) -> Result<CollectionStats> {
        self.vector_store.stats().await
    }

    /// Remove every stored record. Returns how many were removed.
    ///
    /// Does not wait for ingestions in flight; a document being ingested
    /// while the store is cleared may be stored afterwards.
    ///
    /// # Errors
    ///
    /// Returns the store's error.
    pub async fn clear(&self) -> Result<usize> {
        self.vector_store.clear().await
    }

    async fn source_lock(&self, source_id: &str) -> Arc<Mutex<()>> {
        let mut locks = self.source_locks.lock().await;
        Arc::clone(locks.entry(source_id.to_string()).or_default())
    }

    /// Drop the map entry once no other ingestion holds or awaits it.
    async fn release_source_lock(&self, source_id: &str, lock: Arc<Mutex<()>>) {
        let mut locks = self.source_locks.lock().await;
        // One reference in the map, one here.
        if Arc::strong_count(&lock) == 2 {
            locks.remove(source_id);
        }
    }
}

fn stage_failure(source_id: &str, stage: IngestionStage, cause: RagError) -> RagError {
    error!(document.id = %source_id, %stage, error = %cause, "ingestion aborted");
    RagError::IngestionFailed { source_id: source_id.to_string(), stage, cause: Box::new(cause) }
}

/// Builder for constructing a [`RagPipeline`].
///
/// `config`, `embedder`, and `vector_store` are required. Unless one is set,
/// the chunker is built from the configured `chunk_strategy` and window.
///
/// # Example
///
/// ```rust,ignore
/// let pipeline = RagPipeline::builder()
///     .config(RagConfig::default())
///     .embedder(embedder)
///     .vector_store(Arc::new(store))
///     .build()?;
/// ```
#[derive(Default)]
pub struct RagPipelineBuilder {
    config: Option<RagConfig>,
    embedder: Option<Embedder>,
    vector_store: Option<Arc<dyn VectorStore>>,
    chunker: Option<Arc<dyn Chunker>>,
}

impl RagPipelineBuilder {
    /// Set the pipeline configuration.
    pub fn config(mut self, config: RagConfig) -> Self {
        self.config = Some(config);
        self
    }

    /// Set the embedder.
    pub fn embedder(mut self, embedder: Embedder) -> Self {
        self.embedder = Some(embedder);
        self
    }

    /// Set the vector store backend.
    pub fn vector_store(mut self, store: Arc<dyn VectorStore>) -> Self {
        self.vector_store = Some(store);
        self
    }

    /// Replace the default chunker.
    pub fn chunker(mut self, chunker: Arc<dyn Chunker>) -> Self {
        self.chunker = Some(chunker);
        self
    }

    /// Build the [`RagPipeline`].
    ///
    /// # Errors
    ///
    /// Returns [`RagError::ConfigError`] if a required field is missing or the
    /// configuration is invalid, and [`RagError::ModelMismatch`] if the store
    /// holds vectors from a model other than the embedder's.
    pub fn build(self) -> Result<RagPipeline> {
        let config =
            self.config.ok_or_else(|| RagError::ConfigError("config is required".to_string()))?;
        config.validate()?;
        let embedder =
            self.embedder.ok_or_else(|| RagError::ConfigError("embedder is required".to_string()))?;
        let vector_store = self
            .vector_store
            .ok_or_else(|| RagError::ConfigError("vector_store is required".to_string()))?;

        let configured = embedder.identity();
        if vector_store.model_identity() != &configured {
            let collection = vector_store.collection_name().to_string();
            error!(
                %collection,
                stored = %vector_store.model_identity(),
                %configured,
                "embedding model mismatch"
            );
            return Err(RagError::ModelMismatch {
                collection,
                stored: vector_store.model_identity().clone(),
                configured,
            });
        }

        let chunker = match self.chunker {
            Some(chunker) => chunker,
            None => config.chunk_strategy.build(config.chunk_size, config.chunk_overlap)?,
        };

        Ok(RagPipeline { config, embedder, vector_store, chunker, source_locks: Mutex::default() })
    }
}
