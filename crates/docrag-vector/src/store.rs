use serde::{Deserialize, Serialize};

use docrag_core::error::Result;
use docrag_core::types::{IndexedPoint, SearchResult};

use crate::filter::{Filter, IndexedField};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CollectionInfo {
    pub name: String,
    pub dimension: usize,
    pub points: usize,
    pub indexed_fields: Vec<IndexedField>,
}

/// One nearest-neighbour query against a collection.
#[derive(Debug, Clone, Copy)]
pub struct SearchRequest<'a> {
    pub vector: &'a [f32],
    pub filter: &'a Filter,
    pub limit: usize,
    pub score_threshold: Option<f32>,
}

/// Backend seam for the vector index. Implementations hold their own
/// connection and are shared behind `Arc`.
///
/// Backends may return more than `limit` candidates or unsorted results;
/// `VectorIndex` applies the final threshold, order and cut.
pub trait VectorStore: Send + Sync {
    fn name(&self) -> &'static str;
    fn ping(&self) -> Result<()>;
    fn list_collections(&self) -> Result<Vec<String>>;
    fn collection_info(&self, name: &str) -> Result<Option<CollectionInfo>>;
    /// Create an empty collection; cosine distance, equality indexes on `IndexedField::ALL`.
    fn create_collection(&self, name: &str, dimension: usize) -> Result<()>;
    fn drop_collection(&self, name: &str) -> Result<()>;
    /// Insert or replace points by id.
    fn upsert(&self, name: &str, points: &[IndexedPoint]) -> Result<()>;
    fn search(&self, name: &str, request: &SearchRequest<'_>) -> Result<Vec<SearchResult>>;
}

pub fn cosine(a: &[f32], b: &[f32]) -> f32 {
    let (mut dot, mut na, mut nb) = (0f32, 0f32, 0f32);
    for (x, y) in a.iter().zip(b) {
        dot += x * y;
        na += x * x;
        nb += y * y;
    }
    if na == 0.0 || nb == 0.0 {
        return 0.0;
    }
    dot / (na.sqrt() * nb.sqrt())
}
