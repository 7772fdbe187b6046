//! Vector store trait for storing and searching vector embeddings.

use std::cmp::Ordering;
use std::collections::HashSet;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::document::{SearchFilter, SearchResult, StoredRecord};
use crate::embedding::ModelIdentity;
use crate::error::{RagError, Result};

/// Summary of one collection, for statistics reporting.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CollectionStats {
    /// The collection name.
    pub collection_name: String,
    /// The model whose vectors the collection holds.
    pub model: ModelIdentity,
    /// Total number of stored records.
    pub record_count: usize,
    /// Number of distinct sources with at least one record.
    pub source_count: usize,
}

/// A storage backend for chunk embeddings with similarity search.
///
/// A store instance is bound to one collection and one [`ModelIdentity`];
/// every stored vector has that identity's dimensionality.
///
/// # Example
///
/// ```rust,ignore
/// use vault_rag::{InMemoryVectorStore, ModelIdentity, SearchFilter, VectorStore};
///
/// let store = InMemoryVectorStore::new("docs", ModelIdentity::new("hash-ngram-v1", 384));
/// store.upsert(&records).await?;
/// let results = store.search(&query_embedding, 5, &SearchFilter::default()).await?;
/// ```
#[async_trait]
pub trait VectorStore: Send + Sync {
    /// The collection this store reads and writes.
    fn collection_name(&self) -> &str;

    /// The model identity recorded for the collection.
    fn model_identity(&self) -> &ModelIdentity;

    /// Insert records, replacing any existing record with the same `chunk_id`.
    ///
    /// The batch is applied atomically: if any record fails validation the
    /// error names it and nothing is written.
    async fn upsert(&self, records: &[StoredRecord]) -> Result<()>;

    /// Return up to `top_k` records most similar to `embedding`.
    ///
    /// Results are ordered by descending cosine similarity, ties broken by
    /// ascending `chunk_id`.
    async fn search(
        &self,
        embedding: &[f32],
        top_k: usize,
        filter: &SearchFilter,
    ) -> Result<Vec<SearchResult>>;

    /// Remove every record belonging to `source_id`. Returns how many were removed.
    async fn delete_by_source(&self, source_id: &str) -> Result<usize>;

    /// Replace all records of `source_id` with `records`.
    ///
    /// Returns how many previous records were removed. The default
    /// implementation validates, deletes, then upserts; backends that can do
    /// both in one transaction should override it.
    async fn replace_source(&self, source_id: &str, records: &[StoredRecord]) -> Result<usize> {
        validate_replacement(source_id, records, self.model_identity())?;
        let removed = self.delete_by_source(source_id).await?;
        self.upsert(records).await?;
        Ok(removed)
    }

    /// Total number of stored records.
    async fn count(&self) -> Result<usize>;

    /// Remove every record in the collection, keeping its metadata.
    async fn clear(&self) -> Result<usize>;

    /// Collection statistics.
    async fn stats(&self) -> Result<CollectionStats>;
}

/// Check every record of an upsert batch before anything is written.
///
/// # Errors
///
/// Returns [`RagError::InvalidRecord`] for the first record with an empty
/// `chunk_id` or `source_id`, a vector of the wrong length, a non-finite
/// component, or a `chunk_id` repeated within the batch.
pub fn validate_batch(records: &[StoredRecord], identity: &ModelIdentity) -> Result<()> {
    let mut seen = HashSet::with_capacity(records.len());
    for record in records {
        let invalid = |reason: String| RagError::InvalidRecord {
            chunk_id: record.chunk_id.clone(),
            reason,
        };

        if record.chunk_id.is_empty() {
            return Err(invalid("chunk_id must not be empty".to_string()));
        }
        if record.source_id.is_empty() {
            return Err(invalid("source_id must not be empty".to_string()));
        }
        if record.embedding.len() != identity.dimensions {
            return Err(invalid(format!(
                "embedding has {} dimensions, collection expects {}",
                record.embedding.len(),
                identity.dimensions
            )));
        }
        if record.embedding.iter().any(|v| !v.is_finite()) {
            return Err(invalid("embedding contains a non-finite value".to_string()));
        }
        if !seen.insert(record.chunk_id.as_str()) {
            return Err(invalid("chunk_id appears more than once in the batch".to_string()));
        }
    }
    Ok(())
}

/// Check a replacement batch: every record valid and owned by `source_id`.
///
/// # Errors
///
/// Returns [`RagError::InvalidRecord`] as [`validate_batch`] does, or for a
/// record whose `source_id` differs from the one being replaced.
pub fn validate_replacement(
    source_id: &str,
    records: &[StoredRecord],
    identity: &ModelIdentity,
) -> Result<()> {
    validate_batch(records, identity)?;
    if let Some(stray) = records.iter().find(|r| r.source_id != source_id) {
        return Err(RagError::InvalidRecord {
            chunk_id: stray.chunk_id.clone(),
            reason: format!("belongs to '{}', not '{source_id}'", stray.source_id),
        });
    }
    Ok(())
}

/// Check a query vector against the collection's dimensionality.
///
/// # Errors
///
/// Returns [`RagError::ValidationError`] on a length mismatch or zero `top_k`.
pub fn validate_query(embedding: &[f32], top_k: usize, identity: &ModelIdentity) -> Result<()> {
    if top_k == 0 {
        return Err(RagError::ValidationError("top_k must be greater than zero".to_string()));
    }
    if embedding.len() != identity.dimensions {
        return Err(RagError::ValidationError(format!(
            "query embedding has {} dimensions, collection expects {}",
            embedding.len(),
            identity.dimensions
        )));
    }
    Ok(())
}

/// Compute cosine similarity between two vectors.
///
/// Returns 0.0 if either vector has zero magnitude.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    (dot / (norm_a * norm_b)).clamp(-1.0, 1.0)
}

/// Sort by descending score, then ascending `chunk_id`, and keep `top_k`.
pub fn rank(mut results: Vec<SearchResult>, top_k: usize) -> Vec<SearchResult> {
    results.sort_by(|a, b| match b.score.total_cmp(&a.score) {
        Ordering::Equal => a.chunk_id.cmp(&b.chunk_id),
        other => other,
    });
    results.truncate(top_k);
    results
}
