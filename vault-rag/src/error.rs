//! Error types for the `vault-rag` crate.

use std::fmt;

use thiserror::Error;

use crate::embedding::ModelIdentity;

/// Coarse classification of a [`RagError`].
///
/// Callers use this to decide whether to abort the whole process
/// (`Configuration`), reject a single call (`Validation`), or report an
/// unavailable collaborator (`Resource`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Invalid or inconsistent settings, including a model mismatch.
    Configuration,
    /// A malformed record, batch, or request argument.
    Validation,
    /// An unavailable device, model, store, or filesystem.
    Resource,
    /// A document could not be loaded from disk.
    Load,
}

/// The stages an ingestion call moves through.
///
/// A successful call ends in [`Stored`](IngestionStage::Stored). A failed call
/// reports the stage it was unable to reach.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IngestionStage {
    /// The document text is available.
    Loaded,
    /// The text has been split into chunks.
    Chunked,
    /// Every chunk has an embedding vector.
    Embedded,
    /// The records are persisted in the vector store.
    Stored,
}

impl fmt::Display for IngestionStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Loaded => "loaded",
            Self::Chunked => "chunked",
            Self::Embedded => "embedded",
            Self::Stored => "stored",
        };
        f.write_str(name)
    }
}

/// Errors that can occur in RAG operations.
#[derive(Debug, Error)]
pub enum RagError {
    /// A configuration validation error.
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// The vector store holds vectors produced by a different model.
    #[error(
        "Model mismatch in collection '{collection}': store contains {stored}, \
         but the configured embedder is {configured}"
    )]
    ModelMismatch {
        /// The collection that was opened.
        collection: String,
        /// The model identity recorded in the collection metadata.
        stored: ModelIdentity,
        /// The model identity of the configured embedder.
        configured: ModelIdentity,
    },

    /// A request argument failed validation.
    #[error("Validation error: {0}")]
    ValidationError(String),

    /// A record in an upsert batch failed validation. The batch was not applied.
    #[error("Invalid record '{chunk_id}': {reason}")]
    InvalidRecord {
        /// The ID of the offending record.
        chunk_id: String,
        /// Why the record was rejected.
        reason: String,
    },

    /// An error occurred during embedding generation.
    #[error("Embedding error ({provider}): {message}")]
    EmbeddingError {
        /// The embedding provider that produced the error.
        provider: String,
        /// A description of the failure.
        message: String,
    },

    /// An error occurred in the vector store backend.
    #[error("Vector store error ({backend}): {message}")]
    VectorStoreError {
        /// The vector store backend that produced the error.
        backend: String,
        /// A description of the failure.
        message: String,
    },

    /// A device, model, or other runtime resource is unavailable.
    #[error("Resource error: {0}")]
    ResourceError(String),

    /// A document could not be loaded.
    #[error("Failed to load document '{path}': {message}")]
    DocumentLoadError {
        /// The path that was being loaded.
        path: String,
        /// A description of the failure.
        message: String,
    },

    /// Ingestion of a single document stopped before completing.
    #[error("Ingestion of '{source_id}' failed before reaching stage '{stage}': {cause}")]
    IngestionFailed {
        /// The document whose ingestion failed.
        source_id: String,
        /// The stage that could not be reached.
        stage: IngestionStage,
        /// The underlying error.
        #[source]
        cause: Box<RagError>,
    },

    /// An error from the SQLite backend.
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// An I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl RagError {
    /// Classify this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::ConfigError(_) | Self::ModelMismatch { .. } => ErrorKind::Configuration,
            Self::ValidationError(_) | Self::InvalidRecord { .. } => ErrorKind::Validation,
            Self::EmbeddingError { .. }
            | Self::VectorStoreError { .. }
            | Self::ResourceError(_)
            | Self::Sqlite(_)
            | Self::Io(_) => ErrorKind::Resource,
            Self::DocumentLoadError { .. } => ErrorKind::Load,
            Self::IngestionFailed { cause, .. } => cause.kind(),
        }
    }

    /// Returns `true` if this error must abort the process before any work.
    pub fn is_fatal_configuration(&self) -> bool {
        self.kind() == ErrorKind::Configuration
    }
}

/// A convenience result type for RAG operations.
pub type Result<T> = std::result::Result<T, RagError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ingestion_failure_reports_cause_kind() {
        let err = RagError::IngestionFailed {
            source_id: "notes.txt".to_string(),
            stage: IngestionStage::Stored,
            cause: Box::new(RagError::InvalidRecord {
                chunk_id: "notes.txt_0".to_string(),
                reason: "empty embedding".to_string(),
            }),
        };
        assert_eq!(err.kind(), ErrorKind::Validation);
        assert!(err.to_string().contains("stage 'stored'"));
    }

    #[test]
    fn model_mismatch_is_configuration() {
        let err = RagError::ModelMismatch {
            collection: "docs".to_string(),
            stored: ModelIdentity::new("model-a", 4),
            configured: ModelIdentity::new("model-b", 4),
        };
        assert!(err.is_fatal_configuration());
        assert!(err.to_string().contains("model-a"));
    }
}
