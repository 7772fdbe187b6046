//! # vault-rag
//!
//! Local chunk-and-retrieve engine for a personal document knowledge base.
//!
//! ## Overview
//!
//! Documents are split into overlapping character windows, embedded with a
//! sentence-embedding model, and stored with their vectors in a persistent
//! collection. Queries are embedded with the same model and answered by
//! cosine-similarity search.
//!
//! - [`FixedSizeChunker`] - sliding character windows with overlap
//! - [`RecursiveChunker`] - paragraph, line and word aware splitting
//! - [`Embedder`] - batched embedding on a device fixed at startup
//! - [`SqliteVectorStore`] - persistent store that records its model identity
//! - [`InMemoryVectorStore`] - non-persistent store for tests
//! - [`RagPipeline`] - ingestion and search over the above
//! - [`LoaderRegistry`] - file loading by [`DocumentFormat`]
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use vault_rag::{LoaderRegistry, RagConfig, RagPipeline, default_detector};
//!
//! let config = RagConfig::builder().chunk_size(512).chunk_overlap(64).build()?;
//! let pipeline = RagPipeline::open(config, default_detector().as_ref()).await?;
//!
//! let documents = LoaderRegistry::with_defaults().load_directory("notes", true)?;
//! let summary = pipeline.ingest_batch(&documents).await;
//!
//! for result in pipeline.search("spaced repetition", 5).await? {
//!     println!("{:.3} {}", result.score, result.source_id);
//! }
//! ```
//!
//! ## Features
//!
//! - `fastembed` - local ONNX sentence-embedding models
//! - `cuda` - CUDA execution provider for `fastembed`

pub mod chunking;
pub mod config;
pub mod device;
pub mod document;
pub mod embedding;
pub mod error;
#[cfg(feature = "fastembed")]
pub mod fastembed_provider;
pub mod hash;
pub mod inmemory;
pub mod loader;
pub mod pipeline;
pub mod sqlite;
pub mod vectorstore;

pub use chunking::{
    ChunkStrategy, Chunker, DEFAULT_SEPARATORS, FixedSizeChunker, RecursiveChunker, chunk_text,
};
pub use config::{RagConfig, RagConfigBuilder};
#[cfg(feature = "cuda")]
pub use device::CudaDetector;
pub use device::{AcceleratorDetector, Device, NoAccelerator, default_detector, resolve_device};
pub use document::{Chunk, Document, DocumentFormat, SearchFilter, SearchResult, StoredRecord};
pub use embedding::{Embedder, EmbeddingProvider, ModelIdentity, load_with_timeout};
pub use error::{ErrorKind, IngestionStage, RagError, Result};
#[cfg(feature = "fastembed")]
pub use fastembed_provider::FastEmbedProvider;
pub use hash::{DEFAULT_HASH_DIMENSIONS, HASH_MODEL_NAME, HashEmbeddingProvider};
pub use inmemory::InMemoryVectorStore;
pub use loader::{DocumentLoader, LoaderRegistry, TextLoader};
pub use pipeline::{
    IngestionFailure, IngestionReport, IngestionSummary, RagPipeline, RagPipelineBuilder,
};
pub use sqlite::{DB_FILE_NAME, SqliteVectorStore};
pub use vectorstore::{CollectionStats, VectorStore};
