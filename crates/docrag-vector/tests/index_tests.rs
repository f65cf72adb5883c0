use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use docrag_core::error::{Error, Result};
use docrag_core::types::{keys, IndexedPoint, Metadata, SearchResult};
use docrag_vector::{
    CollectionInfo, Filter, IndexedField, MemoryStore, SearchRequest, VectorIndex, VectorStore,
};
use serde_json::Value;

fn payload(product: &str, doc_type: Option<&str>) -> Metadata {
    let mut p = Metadata::new();
    p.insert(keys::PRODUCT.into(), Value::from(product));
    p.insert(keys::TEXT.into(), Value::from(format!("about {product}")));
    if let Some(t) = doc_type {
        p.insert(keys::TYPE.into(), Value::from(t));
    }
    p
}

/// Unit vector at angle `theta` in the plane; cosine with [1, 0] is cos(theta).
fn at_cosine(score: f32) -> Vec<f32> {
    vec![score, (1.0 - score * score).max(0.0).sqrt()]
}

fn index_with(points: Vec<IndexedPoint>) -> VectorIndex {
    let index = VectorIndex::in_memory();
    index.create_collection("docs", 2, false).unwrap();
    index.upsert("docs", &points, 2).unwrap();
    index
}

#[test]
fn threshold_drops_low_scores() {
    let index = index_with(vec![
        IndexedPoint { id: 0, vector: at_cosine(0.95), payload: payload("RCP", None) },
        IndexedPoint { id: 1, vector: at_cosine(0.72), payload: payload("RIO", None) },
        IndexedPoint { id: 2, vector: at_cosine(0.65), payload: payload("VP4", None) },
    ]);
    let hits = index.search("docs", &[1.0, 0.0], &Filter::new(), 5, Some(0.7)).unwrap();
    let ids: Vec<u64> = hits.iter().map(|h| h.id).collect();
    assert_eq!(ids, vec![0, 1]);
    assert!(hits.iter().all(|h| h.score >= 0.7));
}

#[test]
fn top_k_caps_results_and_ties_break_by_id() {
    let points = (0..6)
        .map(|i| IndexedPoint { id: 5 - i, vector: vec![1.0, 0.0], payload: payload("RCP", None) })
        .collect();
    let index = index_with(points);
    let hits = index.search("docs", &[1.0, 0.0], &Filter::new(), 3, None).unwrap();
    let ids: Vec<u64> = hits.iter().map(|h| h.id).collect();
    assert_eq!(ids, vec![0, 1, 2]);
}

#[test]
fn top_k_keeps_the_highest_scores() {
    let scores = [0.75, 0.93, 0.81, 0.99, 0.88];
    let points = scores
        .iter()
        .enumerate()
        .map(|(i, &s)| IndexedPoint { id: i as u64, vector: at_cosine(s), payload: payload("RCP", None) })
        .collect();
    let index = index_with(points);
    let hits = index.search("docs", &[1.0, 0.0], &Filter::new(), 2, Some(0.7)).unwrap();
    let ids: Vec<u64> = hits.iter().map(|h| h.id).collect();
    assert_eq!(ids, vec![3, 1]);
    assert!((hits[0].score - 0.99).abs() < 1e-4);
    assert!((hits[1].score - 0.93).abs() < 1e-4);
}

#[test]
fn filter_is_an_and_of_equalities() {
    let index = index_with(vec![
        IndexedPoint { id: 0, vector: at_cosine(0.9), payload: payload("RCP", Some("qa")) },
        IndexedPoint { id: 1, vector: at_cosine(0.99), payload: payload("RCP", None) },
        IndexedPoint { id: 2, vector: at_cosine(0.99), payload: payload("RIO", Some("qa")) },
    ]);
    let filter = Filter::from_pairs([("product", "RCP"), ("type", "qa")]).unwrap();
    let hits = index.search("docs", &[1.0, 0.0], &filter, 5, None).unwrap();
    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0].id, 0);

    let only_product = Filter::new().and(IndexedField::Product, "RCP");
    let hits = index.search("docs", &[1.0, 0.0], &only_product, 5, None).unwrap();
    assert_eq!(hits.iter().map(|h| h.id).collect::<Vec<_>>(), vec![1, 0]);
}

#[test]
fn create_is_idempotent_and_recreate_empties() {
    let index = index_with(vec![IndexedPoint { id: 0, vector: vec![1.0, 0.0], payload: payload("RCP", None) }]);
    assert!(!index.create_collection("docs", 2, false).unwrap());
    assert_eq!(index.collection_info("docs").unwrap().unwrap().points, 1);

    assert!(index.create_collection("docs", 3, true).unwrap());
    let info = index.collection_info("docs").unwrap().unwrap();
    assert_eq!(info.points, 0);
    assert_eq!(info.dimension, 3);
}

#[test]
fn zero_dimension_and_mismatches_are_configuration_errors() {
    let index = VectorIndex::in_memory();
    assert!(index.create_collection("docs", 0, false).unwrap_err().is_configuration());

    index.create_collection("docs", 2, false).unwrap();
    let bad = IndexedPoint { id: 0, vector: vec![1.0, 0.0, 0.0], payload: Metadata::new() };
    assert!(index.upsert("docs", &[bad], 10).unwrap_err().is_configuration());
    assert!(index.search("docs", &[1.0], &Filter::new(), 1, None).unwrap_err().is_configuration());
    assert!(index.search("docs", &[1.0, 0.0], &Filter::new(), 0, None).unwrap_err().is_configuration());
}

#[test]
fn missing_collection_search_is_retrieval_error() {
    let index = VectorIndex::in_memory();
    let err = index.search("nope", &[1.0], &Filter::new(), 1, None).unwrap_err();
    assert!(matches!(err, Error::Retrieval(_)));
}

/// Delegates to a MemoryStore but fails the n-th upsert call.
struct FlakyStore {
    inner: MemoryStore,
    calls: AtomicUsize,
    fail_on: usize,
}

impl VectorStore for FlakyStore {
    fn name(&self) -> &'static str { "flaky" }
    fn ping(&self) -> Result<()> { self.inner.ping() }
    fn list_collections(&self) -> Result<Vec<String>> { self.inner.list_collections() }
    fn collection_info(&self, name: &str) -> Result<Option<CollectionInfo>> { self.inner.collection_info(name) }
    fn create_collection(&self, name: &str, dimension: usize) -> Result<()> { self.inner.create_collection(name, dimension) }
    fn drop_collection(&self, name: &str) -> Result<()> { self.inner.drop_collection(name) }
    fn upsert(&self, name: &str, points: &[IndexedPoint]) -> Result<()> {
        if self.calls.fetch_add(1, Ordering::SeqCst) == self.fail_on {
            return Err(Error::Store("disk full".into()));
        }
        self.inner.upsert(name, points)
    }
    fn search(&self, name: &str, request: &SearchRequest<'_>) -> Result<Vec<SearchResult>> {
        self.inner.search(name, request)
    }
}

#[test]
fn failed_batch_is_reported_and_earlier_batches_stay() {
    let store = Arc::new(FlakyStore { inner: MemoryStore::new(), calls: AtomicUsize::new(0), fail_on: 2 });
    let index = VectorIndex::new(store);
    index.create_collection("docs", 2, false).unwrap();
    let points: Vec<IndexedPoint> = (0..10)
        .map(|i| IndexedPoint { id: i, vector: vec![1.0, 0.0], payload: payload("RCP", None) })
        .collect();

    match index.upsert("docs", &points, 3) {
        Err(Error::Ingestion { batch, .. }) => assert_eq!(batch, 2),
        other => panic!("expected ingestion error, got {other:?}"),
    }
    assert_eq!(index.collection_info("docs").unwrap().unwrap().points, 6);
}

#[test]
fn status_lists_collections() {
    let index = index_with(vec![IndexedPoint { id: 0, vector: vec![1.0, 0.0], payload: payload("RCP", None) }]);
    let status = index.status();
    assert!(status.reachable);
    assert_eq!(status.backend, "memory");
    assert_eq!(status.collections.len(), 1);
    assert_eq!(status.collections[0].name, "docs");
}
