//! In-memory vector store using cosine similarity.
//!
//! This module provides [`InMemoryVectorStore`], a vector store backed by a
//! `HashMap` protected by a `tokio::sync::RwLock`. Nothing survives the
//! process; it is suitable for development and testing.

use std::collections::{HashMap, HashSet};

use async_trait::async_trait;
use tokio::sync::RwLock;
use tracing::debug;

use crate::document::{SearchFilter, SearchResult, StoredRecord};
use crate::embedding::ModelIdentity;
use crate::error::Result;
use crate::vectorstore::{
    CollectionStats, VectorStore, cosine_similarity, rank, validate_batch, validate_query,
    validate_replacement,
};

/// An in-memory vector store for a single collection.
///
/// Records are keyed by chunk ID. All operations are async-safe via
/// `tokio::sync::RwLock`, and each mutating call holds the write lock for its
/// whole batch.
///
/// # Example
///
/// ```rust,ignore
/// use vault_rag::{InMemoryVectorStore, ModelIdentity};
///
/// let store = InMemoryVectorStore::new("docs", ModelIdentity::new("hash-ngram-v1", 384));
/// ```
#[derive(Debug)]
pub struct InMemoryVectorStore {
    collection: String,
    identity: ModelIdentity,
    records: RwLock<HashMap<String, StoredRecord>>,
}

impl InMemoryVectorStore {
    /// Create a new empty in-memory collection.
    pub fn new(collection: impl Into<String>, identity: ModelIdentity) -> Self {
        Self { collection: collection.into(), identity, records: RwLock::new(HashMap::new()) }
    }
}

#[async_trait]
impl VectorStore for InMemoryVectorStore {
    fn collection_name(&self) -> &str {
        &self.collection
    }

    fn model_identity(&self) -> &ModelIdentity {
        &self.identity
    }

    async fn upsert(&self, records: &[StoredRecord]) -> Result<()> {
        validate_batch(records, &self.identity)?;
        let mut store = self.records.write().await;
        for record in records {
            store.insert(record.chunk_id.clone(), record.clone());
        }
        debug!(collection = %self.collection, count = records.len(), "upserted records");
        Ok(())
    }

    async fn search(
        &self,
        embedding: &[f32],
        top_k: usize,
        filter: &SearchFilter,
    ) -> Result<Vec<SearchResult>> {
        validate_query(embedding, top_k, &self.identity)?;
        let store = self.records.read().await;

        let scored: Vec<SearchResult> = store
            .values()
            .filter_map(|record| {
                let score = cosine_similarity(&record.embedding, embedding);
                filter.accepts(&record.source_id, score).then(|| SearchResult {
                    chunk_id: record.chunk_id.clone(),
                    text: record.text.clone(),
                    score,
                    source_id: record.source_id.clone(),
                    sequence_index: record.sequence_index,
                })
            })
            .collect();

        Ok(rank(scored, top_k))
    }

    async fn delete_by_source(&self, source_id: &str) -> Result<usize> {
        let mut store = self.records.write().await;
        let before = store.len();
        store.retain(|_, record| record.source_id != source_id);
        Ok(before - store.len())
    }

    async fn replace_source(&self, source_id: &str, records: &[StoredRecord]) -> Result<usize> {
        validate_replacement(source_id, records, &self.identity)?;
        let mut store = self.records.write().await;
        let before = store.len();
        store.retain(|_, record| record.source_id != source_id);
        let removed = before - store.len();
        for record in records {
            store.insert(record.chunk_id.clone(), record.clone());
        }
        Ok(removed)
    }

    async fn count(&self) -> Result<usize> {
        Ok(self.records.read().await.len())
    }

    async fn clear(&self) -> Result<usize> {
        let mut store = self.records.write().await;
        let removed = store.len();
        store.clear();
        Ok(removed)
    }

    async fn stats(&self) -> Result<CollectionStats> {
        let store = self.records.read().await;
        let sources: HashSet<&str> = store.values().map(|r| r.source_id.as_str()).collect();
        Ok(CollectionStats {
            collection_name: self.collection.clone(),
            model: self.identity.clone(),
            record_count: store.len(),
            source_count: sources.len(),
        })
    }
}
