//! Property tests for in-memory vector store search ordering.

use std::collections::HashMap;

use proptest::prelude::*;
use vault_rag::{
    InMemoryVectorStore, ModelIdentity, RagError, SearchFilter, StoredRecord, VectorStore,
};

const DIM: usize = 16;

fn identity() -> ModelIdentity {
    ModelIdentity::new("test-model", DIM)
}

/// Generate a non-zero L2-normalized embedding of the given dimension.
fn arb_normalized_embedding(dim: usize) -> impl Strategy<Value = Vec<f32>> {
    proptest::collection::vec(-1.0f32..1.0f32, dim).prop_filter_map(
        "non-zero embedding",
        |mut v| {
            let norm: f32 = v.iter().map(|x| x * x).sum::<f32>().sqrt();
            if norm < 1e-8 {
                return None;
            }
            for val in &mut v {
                *val /= norm;
            }
            Some(v)
        },
    )
}

/// Generate a record with a normalized embedding.
fn arb_record(dim: usize) -> impl Strategy<Value = StoredRecord> {
    ("[a-z]{3,8}", "[a-z ]{5,30}", "doc_[0-3]", 0usize..10, arb_normalized_embedding(dim))
        .prop_map(|(id, text, source_id, sequence_index, embedding)| StoredRecord {
            chunk_id: id,
            embedding,
            text,
            source_id,
            sequence_index,
        })
}

fn dedupe(records: Vec<StoredRecord>) -> Vec<StoredRecord> {
    let mut by_id: HashMap<String, StoredRecord> = HashMap::new();
    for record in records {
        by_id.entry(record.chunk_id.clone()).or_insert(record);
    }
    by_id.into_values().collect()
}

fn record(id: &str, source_id: &str, embedding: Vec<f32>) -> StoredRecord {
    StoredRecord {
        chunk_id: id.to_string(),
        embedding,
        text: format!("text of {id}"),
        source_id: source_id.to_string(),
        sequence_index: 0,
    }
}

fn axis(i: usize) -> Vec<f32> {
    let mut v = vec![0.0; DIM];
    v[i] = 1.0;
    v
}

/// *For any* set of records stored in an InMemoryVectorStore, searching with a
/// query embedding returns results ordered by descending cosine similarity,
/// ties broken by ascending chunk ID, and at most `top_k` of them.
mod prop_inmemory_search_ordering {
    use super::*;

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(100))]

        #[test]
        fn results_ordered_descending_and_bounded_by_top_k(
            records in proptest::collection::vec(arb_record(DIM), 1..20),
            query in arb_normalized_embedding(DIM),
            top_k in 1usize..25,
        ) {
            let rt = tokio::runtime::Runtime::new().unwrap();
            let (results, unique_count) = rt.block_on(async {
                let store = InMemoryVectorStore::new("test", identity());
                let unique = dedupe(records);
                let count = unique.len();
                store.upsert(&unique).await.unwrap();
                let results = store.search(&query, top_k, &SearchFilter::default()).await.unwrap();
                (results, count)
            });

            prop_assert_eq!(results.len(), top_k.min(unique_count));

            for window in results.windows(2) {
                prop_assert!(
                    window[0].score >= window[1].score,
                    "results not in descending order: {} < {}",
                    window[0].score,
                    window[1].score,
                );
                if window[0].score == window[1].score {
                    prop_assert!(window[0].chunk_id < window[1].chunk_id);
                }
            }
        }

        #[test]
        fn filtered_results_only_contain_requested_source(
            records in proptest::collection::vec(arb_record(DIM), 1..20),
            query in arb_normalized_embedding(DIM),
        ) {
            let rt = tokio::runtime::Runtime::new().unwrap();
            let results = rt.block_on(async {
                let store = InMemoryVectorStore::new("test", identity());
                store.upsert(&dedupe(records)).await.unwrap();
                let filter = SearchFilter::default().source("doc_1");
                store.search(&query, 50, &filter).await.unwrap()
            });

            prop_assert!(results.iter().all(|r| r.source_id == "doc_1"));
        }
    }
}

#[tokio::test]
async fn invalid_record_rejects_whole_batch() {
    let store = InMemoryVectorStore::new("test", identity());
    let batch = vec![record("a", "doc", axis(0)), record("b", "doc", vec![1.0; DIM - 1])];

    let err = store.upsert(&batch).await.unwrap_err();
    assert!(matches!(err, RagError::InvalidRecord { ref chunk_id, .. } if chunk_id == "b"));
    assert_eq!(store.count().await.unwrap(), 0);
}

#[tokio::test]
async fn upsert_replaces_existing_chunk_id() {
    let store = InMemoryVectorStore::new("test", identity());
    store.upsert(&[record("a", "doc", axis(0))]).await.unwrap();
    store.upsert(&[record("a", "doc", axis(1))]).await.unwrap();

    assert_eq!(store.count().await.unwrap(), 1);
    let results = store.search(&axis(1), 1, &SearchFilter::default()).await.unwrap();
    assert!((results[0].score - 1.0).abs() < 1e-6);
}

#[tokio::test]
async fn delete_and_replace_by_source() {
    let store = InMemoryVectorStore::new("test", identity());
    store
        .upsert(&[
            record("x_0", "x", axis(0)),
            record("x_1", "x", axis(1)),
            record("y_0", "y", axis(2)),
        ])
        .await
        .unwrap();

    let replaced = store.replace_source("x", &[record("x_0", "x", axis(3))]).await.unwrap();
    assert_eq!(replaced, 2);
    assert_eq!(store.count().await.unwrap(), 2);

    let err = store.replace_source("x", &[record("y_9", "y", axis(4))]).await.unwrap_err();
    assert!(matches!(err, RagError::InvalidRecord { .. }));
    assert_eq!(store.count().await.unwrap(), 2);

    assert_eq!(store.delete_by_source("y").await.unwrap(), 1);
    assert_eq!(store.delete_by_source("missing").await.unwrap(), 0);

    let stats = store.stats().await.unwrap();
    assert_eq!(stats.record_count, 1);
    assert_eq!(stats.source_count, 1);

    assert_eq!(store.clear().await.unwrap(), 1);
    assert_eq!(store.count().await.unwrap(), 0);
}

#[tokio::test]
async fn min_score_filter_drops_weak_matches() {
    let store = InMemoryVectorStore::new("test", identity());
    store.upsert(&[record("a", "doc", axis(0)), record("b", "doc", axis(1))]).await.unwrap();

    let filter = SearchFilter::default().min_score(0.5);
    let results = store.search(&axis(0), 10, &filter).await.unwrap();
    assert_eq!(results.len(), 1);
    assert_eq!(results[0].chunk_id, "a");
}

#[tokio::test]
async fn search_validates_query() {
    let store = InMemoryVectorStore::new("test", identity());
    assert!(matches!(
        store.search(&axis(0), 0, &SearchFilter::default()).await,
        Err(RagError::ValidationError(_))
    ));
    assert!(matches!(
        store.search(&[1.0, 0.0], 3, &SearchFilter::default()).await,
        Err(RagError::ValidationError(_))
    ));
    assert!(store.search(&axis(0), 3, &SearchFilter::default()).await.unwrap().is_empty());
}
